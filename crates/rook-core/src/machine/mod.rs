//! The machine: state, embedding API and the dispatch loop
//!
//! One [`Machine`] owns a loaded program image, the object arena, the frame
//! and try-frame stacks, and the in-flight exception slots. The host drives
//! it through [`Machine::tick`] (one instruction per call) or
//! [`Machine::run`], and inspects the outcome with
//! [`Machine::exit_condition`] and [`Machine::trace`].

mod ops;

use crate::arena::Arena;
use crate::foreign::{ForeignFunction, ForeignRegistry};
use crate::frame::{Frame, RegisterSel, DEFAULT_REGISTER_COUNT};
use crate::object::Object;
use crate::registers::{Mask, RegisterSet, Slot, SlotKind};
use crate::tryframe::TryFrame;
use crate::{VmError, VmResult};
use rook_bytecode::{BytecodeReader, Opcode, ProgramImage, ENTRY_FUNCTION, OPERAND_INDIRECT};
use rustc_hash::FxHashMap;
use std::io::Write;
use std::rc::Rc;
use tracing::{debug, trace};

/// Which byte image the current code stream (and its jump offsets) lives in
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageRef {
    /// The main program image
    #[default]
    Main,
    /// A linked module's image
    Module(String),
}

/// What a handler tells the dispatch loop to do with the instruction pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Advance past the consumed operands
    Advance,
    /// Transfer control within the current jump-base image
    Goto(usize),
    /// The machine finished (halt, or final `end`)
    Stop,
}

/// How `call` resolved a function name
pub(crate) enum CallTarget {
    /// Bytecode at `address` inside `image`
    Bytecode {
        /// Entry offset
        address: usize,
        /// Image the function lives in
        image: ImageRef,
    },
    /// A registered foreign function
    Foreign(ForeignFunction),
}

/// Termination outcome, as reported by [`Machine::exit_condition`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCondition {
    /// Process return code
    pub code: i64,
    /// Type of the uncaught exception, when one terminated the run
    pub exception_type: Option<String>,
    /// Message of the uncaught exception
    pub message: Option<String>,
}

/// One occupied register in a [`FrameTrace`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDump {
    /// Register index
    pub index: usize,
    /// Type name of the held object
    pub type_name: String,
    /// String form of the held object
    pub value: String,
}

/// Snapshot of one frame, for diagnostics
#[derive(Debug, Clone)]
pub struct FrameTrace {
    /// Function the frame executes
    pub function_name: String,
    /// Occupied local registers
    pub registers: Vec<SlotDump>,
    /// Local register count
    pub registers_size: usize,
    /// Occupied argument slots
    pub arguments: Vec<SlotDump>,
    /// Argument slot count
    pub arguments_size: usize,
}

/// The Rook virtual machine
pub struct Machine {
    // Program image and address tables
    image: Rc<Vec<u8>>,
    image_size: usize,
    entry_offset: usize,
    functions: FxHashMap<String, usize>,
    blocks: FxHashMap<String, usize>,
    linked_modules: FxHashMap<String, Rc<Vec<u8>>>,
    linked_functions: FxHashMap<String, (String, usize)>,
    linked_blocks: FxHashMap<String, (String, usize)>,
    foreign: ForeignRegistry,

    // Live state
    pub(crate) arena: Arena,
    pub(crate) globals: RegisterSet,
    pub(crate) statics: FxHashMap<String, RegisterSet>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) tryframes: Vec<TryFrame>,
    pub(crate) pending_frame: Option<Frame>,
    pub(crate) pending_tryframe: Option<TryFrame>,
    pub(crate) tmp: Option<Slot>,
    pub(crate) thrown: Option<Slot>,
    pub(crate) caught: Option<Slot>,

    // Execution cursor
    pub(crate) ip: usize,
    pub(crate) jump_base: ImageRef,
    instruction_counter: u64,
    pub(crate) finished: bool,
    pub(crate) return_code: i64,
    pub(crate) return_exception_type: Option<String>,
    pub(crate) return_message: Option<String>,

    arguments: Vec<String>,
    pub(crate) out: Box<dyn Write>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// Create a machine with no program loaded
    pub fn new() -> Self {
        Self {
            image: Rc::new(Vec::new()),
            image_size: 0,
            entry_offset: 0,
            functions: FxHashMap::default(),
            blocks: FxHashMap::default(),
            linked_modules: FxHashMap::default(),
            linked_functions: FxHashMap::default(),
            linked_blocks: FxHashMap::default(),
            foreign: ForeignRegistry::new(),
            arena: Arena::new(),
            globals: RegisterSet::new(DEFAULT_REGISTER_COUNT),
            statics: FxHashMap::default(),
            frames: Vec::new(),
            tryframes: Vec::new(),
            pending_frame: None,
            pending_tryframe: None,
            tmp: None,
            thrown: None,
            caught: None,
            ip: 0,
            jump_base: ImageRef::Main,
            instruction_counter: 0,
            finished: false,
            return_code: 0,
            return_exception_type: None,
            return_message: None,
            arguments: Vec::new(),
            out: Box::new(std::io::stdout()),
        }
    }

    // ===== Embedding API =====

    /// Load the main byte image; its full length becomes the executable
    /// size until [`Machine::bytes`] narrows it
    pub fn load(&mut self, bytecode: Vec<u8>) -> &mut Self {
        self.image_size = bytecode.len();
        self.image = Rc::new(bytecode);
        self
    }

    /// Set the executable size of the loaded image
    pub fn bytes(&mut self, size: usize) -> &mut Self {
        self.image_size = size;
        self
    }

    /// Set the offset execution starts at
    pub fn eoffset(&mut self, offset: usize) -> &mut Self {
        self.entry_offset = offset;
        self
    }

    /// Map a function name to its entry offset in the main image
    pub fn map_function(&mut self, name: &str, offset: usize) -> &mut Self {
        self.functions.insert(name.to_string(), offset);
        self
    }

    /// Map a block name to its entry offset in the main image
    pub fn map_block(&mut self, name: &str, offset: usize) -> &mut Self {
        self.blocks.insert(name.to_string(), offset);
        self
    }

    /// Load a decoded [`ProgramImage`]: bytecode, both address tables, and
    /// the `__entry` offset when mapped
    pub fn load_image(&mut self, image: ProgramImage) -> &mut Self {
        debug!(
            functions = image.functions.len(),
            blocks = image.blocks.len(),
            bytes = image.bytecode.len(),
            "loading program image"
        );
        if let Some(offset) = image.entry_offset() {
            self.entry_offset = offset;
        }
        for (name, offset) in &image.functions {
            self.functions.insert(name.clone(), *offset);
        }
        for (name, offset) in &image.blocks {
            self.blocks.insert(name.clone(), *offset);
        }
        self.image_size = image.bytecode.len();
        self.image = Rc::new(image.bytecode);
        self
    }

    /// Import a linked module: its image plus its function and block
    /// tables, resolvable by `call`, `try` and `catch`
    pub fn link_module(&mut self, name: &str, image: ProgramImage) -> &mut Self {
        for (function, offset) in &image.functions {
            self.linked_functions
                .insert(function.clone(), (name.to_string(), *offset));
        }
        for (block, offset) in &image.blocks {
            self.linked_blocks
                .insert(block.clone(), (name.to_string(), *offset));
        }
        self.linked_modules
            .insert(name.to_string(), Rc::new(image.bytecode));
        debug!(module = name, "linked module");
        self
    }

    /// Register one foreign function
    pub fn register_foreign(&mut self, name: &str, function: ForeignFunction) -> &mut Self {
        self.foreign.register(name, function);
        self
    }

    /// Register a module's whole foreign export table
    pub fn install_foreign(&mut self, table: &[(&str, ForeignFunction)]) -> &mut Self {
        self.foreign.install(table);
        self
    }

    /// Set the command-line argument vector `iframe` wires into register 1
    pub fn set_arguments(&mut self, arguments: Vec<String>) -> &mut Self {
        self.arguments = arguments;
        self
    }

    /// Replace the sink `print`/`echo` write to (stdout by default)
    pub fn set_output(&mut self, out: Box<dyn Write>) -> &mut Self {
        self.out = out;
        self
    }

    /// Push the entry frame, wiring the argument vector into register 1
    pub fn iframe(&mut self) -> VmResult<()> {
        let mut frame = Frame::prepare(0, None);
        frame.function_name = ENTRY_FUNCTION.to_string();
        let argv: Vec<Object> = self
            .arguments
            .iter()
            .cloned()
            .map(Object::String)
            .collect();
        frame.registers.set(&mut self.arena, 1, Object::Vector(argv))?;
        self.frames.push(frame);
        Ok(())
    }

    /// Point the instruction pointer at the executable offset
    pub fn begin(&mut self) {
        self.ip = self.entry_offset;
        self.jump_base = ImageRef::Main;
        self.finished = false;
    }

    /// Monotonic tick count
    pub fn counter(&self) -> u64 {
        self.instruction_counter
    }

    /// Execute one instruction (or one unwinding step).
    ///
    /// Returns the next instruction pointer, or `None` once the machine has
    /// terminated — normally, or with the error state recorded for
    /// [`Machine::exit_condition`]. After any completed tick the machine is
    /// consistent and may simply not be ticked again.
    pub fn tick(&mut self) -> Option<usize> {
        if self.finished {
            return None;
        }
        self.instruction_counter += 1;

        if self.thrown.is_some() {
            return match self.unwind() {
                Ok(true) => Some(self.ip),
                Ok(false) => None,
                Err(error) => {
                    self.fail(error);
                    None
                }
            };
        }

        let previous_ip = self.ip;
        match self.step() {
            Ok((_, Flow::Stop)) => None,
            Ok((opcode, _)) => {
                if self.thrown.is_none() {
                    if !self.ip_valid() {
                        self.fail(VmError::InvalidAddress(self.ip));
                        return None;
                    }
                    if self.ip == previous_ip && opcode != Opcode::End {
                        let hint = if opcode == Opcode::Call {
                            " (check for a self-recursing call)"
                        } else {
                            ""
                        };
                        self.fail(VmError::InstructionUnchanged {
                            opcode: opcode.name(),
                            offset: previous_ip,
                            hint,
                        });
                        return None;
                    }
                }
                Some(self.ip)
            }
            Err(error) => match error.to_thrown() {
                Ok(object) => {
                    trace!(kind = object.type_name(), "handler error becomes exception");
                    self.set_thrown_object(object);
                    Some(self.ip)
                }
                Err(fatal) => {
                    self.fail(fatal);
                    None
                }
            },
        }
    }

    /// `iframe`, `begin`, then tick to completion; returns the exit code
    pub fn run(&mut self) -> VmResult<i64> {
        self.iframe()?;
        self.begin();
        while self.tick().is_some() {}
        Ok(self.return_code)
    }

    /// The recorded termination outcome
    pub fn exit_condition(&self) -> ExitCondition {
        ExitCondition {
            code: self.return_code,
            exception_type: self.return_exception_type.clone(),
            message: self.return_message.clone(),
        }
    }

    /// Snapshot of the current frame stack, entry frame first
    pub fn trace(&self) -> Vec<FrameTrace> {
        self.frames
            .iter()
            .map(|frame| FrameTrace {
                function_name: frame.function_name.clone(),
                registers: self.dump_set(&frame.registers),
                registers_size: frame.registers.size(),
                arguments: self.dump_set(&frame.arguments),
                arguments_size: frame.arguments.size(),
            })
            .collect()
    }

    /// Clone the object in a live frame's local register, for inspection
    /// by debuggers and tests
    pub fn frame_register(&self, frame: usize, register: usize) -> Option<Object> {
        let frame = self.frames.get(frame)?;
        frame
            .registers
            .object(&self.arena, register)
            .ok()
            .map(Object::deep_copy)
    }

    /// The live frames (entry frame first)
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The object arena
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    fn dump_set(&self, set: &RegisterSet) -> Vec<SlotDump> {
        set.occupied()
            .into_iter()
            .filter_map(|index| {
                set.object(&self.arena, index).ok().map(|object| SlotDump {
                    index,
                    type_name: object.type_name().to_string(),
                    value: object.to_string(),
                })
            })
            .collect()
    }

    // ===== Fetch / decode / dispatch =====

    fn code_and_limit(&self) -> VmResult<(Rc<Vec<u8>>, usize)> {
        match &self.jump_base {
            ImageRef::Main => Ok((Rc::clone(&self.image), self.image_size)),
            ImageRef::Module(name) => {
                let code = self.linked_modules.get(name).ok_or_else(|| {
                    VmError::Internal(format!("unknown linked module: {name}"))
                })?;
                Ok((Rc::clone(code), code.len()))
            }
        }
    }

    fn ip_valid(&self) -> bool {
        let limit = match &self.jump_base {
            ImageRef::Main => self.image_size,
            ImageRef::Module(name) => self
                .linked_modules
                .get(name)
                .map(|code| code.len())
                .unwrap_or(0),
        };
        self.ip < limit
    }

    fn step(&mut self) -> VmResult<(Opcode, Flow)> {
        let (code, limit) = self.code_and_limit()?;
        if self.ip >= limit {
            return Err(VmError::InvalidAddress(self.ip));
        }
        let byte = code[self.ip];
        let opcode = Opcode::from_u8(byte).ok_or(VmError::UnknownOpcode {
            byte,
            offset: self.ip,
        })?;
        let mut reader = BytecodeReader::at(code.as_slice(), self.ip + 1);

        let flow = self.execute(opcode, &mut reader)?;
        match flow {
            Flow::Advance => self.ip = reader.position(),
            Flow::Goto(target) => self.ip = target,
            Flow::Stop => {}
        }
        Ok((opcode, flow))
    }

    fn execute(&mut self, opcode: Opcode, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        use Opcode::*;
        match opcode {
            Izero => self.op_izero(reader),
            Istore => self.op_istore(reader),
            Iadd => self.op_iadd(reader),
            Isub => self.op_isub(reader),
            Imul => self.op_imul(reader),
            Idiv => self.op_idiv(reader),
            Iinc => self.op_iinc(reader),
            Idec => self.op_idec(reader),
            Ilt => self.op_ilt(reader),
            Ilte => self.op_ilte(reader),
            Igt => self.op_igt(reader),
            Igte => self.op_igte(reader),
            Ieq => self.op_ieq(reader),
            Fstore => self.op_fstore(reader),
            Fadd => self.op_fadd(reader),
            Fsub => self.op_fsub(reader),
            Fmul => self.op_fmul(reader),
            Fdiv => self.op_fdiv(reader),
            Flt => self.op_flt(reader),
            Flte => self.op_flte(reader),
            Fgt => self.op_fgt(reader),
            Fgte => self.op_fgte(reader),
            Feq => self.op_feq(reader),
            Bstore => self.op_bstore(reader),
            Itof => self.op_itof(reader),
            Ftoi => self.op_ftoi(reader),
            Strstore => self.op_strstore(reader),
            Vec => self.op_vec(reader),
            Vinsert => self.op_vinsert(reader),
            Vpush => self.op_vpush(reader),
            Vpop => self.op_vpop(reader),
            Vat => self.op_vat(reader),
            Vlen => self.op_vlen(reader),
            Not => self.op_not(reader),
            And => self.op_and(reader),
            Or => self.op_or(reader),
            Move => self.op_move(reader),
            Copy => self.op_copy(reader),
            Ref => self.op_ref(reader),
            Swap => self.op_swap(reader),
            Free => self.op_free(reader),
            Empty => self.op_empty(reader),
            Isnull => self.op_isnull(reader),
            Ress => self.op_ress(reader),
            Tmpri => self.op_tmpri(reader),
            Tmpro => self.op_tmpro(reader),
            Print => self.op_print(reader),
            Echo => self.op_echo(reader),
            Frame => self.op_frame(reader),
            Param => self.op_param(reader),
            Paref => self.op_paref(reader),
            Arg => self.op_arg(reader),
            Call => self.op_call(reader),
            End => self.op_end(reader),
            Jump => self.op_jump(reader),
            Branch => self.op_branch(reader),
            Halt => self.op_halt(reader),
            Pass => self.op_pass(reader),
            Nop => self.op_nop(reader),
            Tryframe => self.op_tryframe(reader),
            Catch => self.op_catch(reader),
            Pull => self.op_pull(reader),
            Try => self.op_try(reader),
            Throw => self.op_throw(reader),
            Leave => self.op_leave(reader),
        }
    }

    // ===== Operand access =====

    /// Read one int operand: flag byte plus i32, with register-indirection
    /// resolved through the current register set
    pub(crate) fn int_operand(&self, reader: &mut BytecodeReader<'_>) -> VmResult<i64> {
        let flag = reader.read_u8()?;
        let value = reader.read_i32()? as i64;
        if flag == OPERAND_INDIRECT {
            let index = value as usize;
            self.uregset_ref()?
                .object(&self.arena, index)?
                .as_integer()
        } else {
            Ok(value)
        }
    }

    /// Read an int operand and interpret it as a register index
    pub(crate) fn register_operand(&self, reader: &mut BytecodeReader<'_>) -> VmResult<usize> {
        Ok(self.int_operand(reader)? as usize)
    }

    /// Read an int operand and interpret it as an optional register index
    /// (negative means "no register")
    pub(crate) fn target_operand(
        &self,
        reader: &mut BytecodeReader<'_>,
    ) -> VmResult<Option<usize>> {
        let value = self.int_operand(reader)?;
        Ok(if value < 0 { None } else { Some(value as usize) })
    }

    // ===== Register-set access =====

    pub(crate) fn current_frame(&self) -> VmResult<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| VmError::Internal("no active frame".into()))
    }

    pub(crate) fn current_frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::Internal("no active frame".into()))
    }

    /// The register set the current frame exposes, read-only
    pub(crate) fn uregset_ref(&self) -> VmResult<&RegisterSet> {
        let frame = self.current_frame()?;
        match frame.sel {
            RegisterSel::Local => Ok(&frame.registers),
            RegisterSel::Global => Ok(&self.globals),
            RegisterSel::Static => self
                .statics
                .get(&frame.function_name)
                .ok_or_else(|| VmError::Internal("static register set not initialised".into())),
        }
    }

    /// The register set the current frame exposes, paired with the arena
    pub(crate) fn regs_and_arena(&mut self) -> VmResult<(&mut RegisterSet, &mut Arena)> {
        let sel = self.current_frame()?.sel;
        match sel {
            RegisterSel::Local => {
                let frame = self
                    .frames
                    .last_mut()
                    .ok_or_else(|| VmError::Internal("no active frame".into()))?;
                Ok((&mut frame.registers, &mut self.arena))
            }
            RegisterSel::Global => Ok((&mut self.globals, &mut self.arena)),
            RegisterSel::Static => {
                let name = self.current_frame()?.function_name.clone();
                let regs = self.statics.get_mut(&name).ok_or_else(|| {
                    VmError::Internal("static register set not initialised".into())
                })?;
                Ok((regs, &mut self.arena))
            }
        }
    }

    // ===== Name resolution =====

    pub(crate) fn resolve_function(&self, name: &str) -> VmResult<CallTarget> {
        if let Some(offset) = self.functions.get(name) {
            return Ok(CallTarget::Bytecode {
                address: *offset,
                image: ImageRef::Main,
            });
        }
        if let Some((module, offset)) = self.linked_functions.get(name) {
            return Ok(CallTarget::Bytecode {
                address: *offset,
                image: ImageRef::Module(module.clone()),
            });
        }
        if let Some(function) = self.foreign.get(name) {
            return Ok(CallTarget::Foreign(function));
        }
        Err(VmError::UnknownFunction(name.to_string()))
    }

    pub(crate) fn resolve_block(&self, name: &str) -> VmResult<(usize, ImageRef)> {
        if let Some(offset) = self.blocks.get(name) {
            return Ok((*offset, ImageRef::Main));
        }
        if let Some((module, offset)) = self.linked_blocks.get(name) {
            return Ok((*offset, ImageRef::Module(module.clone())));
        }
        Err(VmError::UnknownBlock(name.to_string()))
    }

    // ===== Exception plumbing =====

    /// Release a slot the machine holds outside any register set
    pub(crate) fn release_loose_slot(&mut self, slot: Slot) -> VmResult<()> {
        match slot.kind {
            SlotKind::Owning => self.arena.disown(slot.entry),
            SlotKind::Borrowed => self.arena.release_borrow(slot.entry),
        }
    }

    fn set_thrown_object(&mut self, object: Object) {
        let entry = self.arena.alloc(object);
        self.thrown = Some(Slot {
            entry,
            kind: SlotKind::Owning,
            mask: Mask::Keep,
        });
    }

    /// One unwinding step: find a catcher for the thrown object, discarding
    /// frames and try frames as needed. Returns `true` when a handler was
    /// entered, `false` when the exception is uncaught and the machine has
    /// terminated.
    fn unwind(&mut self) -> VmResult<bool> {
        let slot = self
            .thrown
            .take()
            .ok_or_else(|| VmError::Internal("unwind without thrown object".into()))?;
        let type_name = self.arena.object(slot.entry)?.type_name().to_string();

        let matched = self
            .tryframes
            .iter()
            .rposition(|tf| tf.catcher_for(&type_name).is_some());

        let Some(index) = matched else {
            let message = self.arena.object(slot.entry)?.to_string();
            debug!(kind = %type_name, %message, "uncaught exception");
            self.return_code = 1;
            self.return_exception_type = Some(type_name);
            self.return_message = Some(message);
            // The frame stack stays intact for trace extraction; the
            // thrown object remains the machine's property.
            self.thrown = Some(slot);
            self.finished = true;
            return Ok(false);
        };

        // Discard handler scopes above the matching one; it stays on the
        // stack so the handler's `leave` can pop it.
        self.tryframes.truncate(index + 1);

        let depth = self.tryframes[index].associated_frame;
        while self.frames.len() > depth + 1 {
            if let Some(mut frame) = self.frames.pop() {
                trace!(function = %frame.function_name, "unwinding frame");
                frame.release(&mut self.arena)?;
            }
        }

        let catcher = self.tryframes[index]
            .catcher_for(&type_name)
            .ok_or_else(|| VmError::Internal("catcher vanished during unwind".into()))?;
        debug!(kind = %type_name, block = %catcher.block_name, "exception caught");
        self.ip = catcher.block_address;
        self.jump_base = catcher.image.clone();

        if let Some(previous) = self.caught.replace(slot) {
            self.release_loose_slot(previous)?;
        }
        Ok(true)
    }

    fn fail(&mut self, error: VmError) {
        debug!(%error, "fatal machine error");
        self.return_code = 1;
        self.return_exception_type = Some(error.exception_tag().to_string());
        self.return_message = Some(error.to_string());
        self.finished = true;
    }
}
