//! Frame and call handlers: frame, param, paref, arg, call, end

use crate::foreign::ForeignCall;
use crate::frame::Frame;
use crate::machine::{CallTarget, Flow, Machine};
use crate::registers::{Mask, Slot, SlotKind};
use crate::{VmError, VmResult};
use rook_bytecode::BytecodeReader;
use tracing::{debug, trace};

/// Bounds failures on the prepared argument set surface as argument errors
fn as_argument_bounds(error: VmError) -> VmError {
    match error {
        VmError::RegisterBounds { index, size } => VmError::ArgumentBounds { index, size },
        other => other,
    }
}

enum ArgValue {
    Reference(crate::arena::ArenaIndex),
    Copy(crate::object::Object),
}

impl Machine {
    /// `frame <count> <return-reg>` buffers a call-preparation record
    pub(crate) fn op_frame(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let argument_count = self.int_operand(reader)?;
        let return_register = self.target_operand(reader)?;
        if self.pending_frame.is_some() {
            return Err(VmError::PendingFrameExists);
        }
        self.pending_frame = Some(Frame::prepare(argument_count.max(0) as usize, return_register));
        Ok(Flow::Advance)
    }

    /// `param <slot> <reg>` passes by value: a deep copy of the caller's
    /// register lands in the pending frame's argument slot
    pub(crate) fn op_param(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let slot_index = self.register_operand(reader)?;
        let source = self.register_operand(reader)?;
        let object = {
            let (regs, arena) = self.regs_and_arena()?;
            regs.object(arena, source)?.deep_copy()
        };
        let pending = self.pending_frame.as_mut().ok_or(VmError::NoPendingFrame)?;
        pending
            .arguments
            .set(&mut self.arena, slot_index, object)
            .map_err(as_argument_bounds)?;
        Ok(Flow::Advance)
    }

    /// `paref <slot> <reg>` passes by reference: the callee's argument slot
    /// becomes a borrow of the caller's register
    pub(crate) fn op_paref(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let slot_index = self.register_operand(reader)?;
        let source = self.register_operand(reader)?;
        let entry = self.uregset_ref()?.entry_of(source)?;
        let pending = self.pending_frame.as_ref().ok_or(VmError::NoPendingFrame)?;
        if slot_index >= pending.arguments.size() {
            return Err(VmError::ArgumentBounds {
                index: slot_index,
                size: pending.arguments.size(),
            });
        }
        self.arena.borrow(entry)?;
        let slot = Slot {
            entry,
            kind: SlotKind::Borrowed,
            mask: Mask::Move,
        };
        let pending = self.pending_frame.as_mut().ok_or(VmError::NoPendingFrame)?;
        pending
            .arguments
            .put_slot(&mut self.arena, slot_index, slot)
            .map_err(as_argument_bounds)?;
        Ok(Flow::Advance)
    }

    /// `arg <slot> <reg>` fetches an argument of the current frame:
    /// by-value arguments are copied, by-reference arguments alias
    pub(crate) fn op_arg(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let slot_index = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let value = {
            let frame = self.current_frame()?;
            let arguments = &frame.arguments;
            if arguments.is_null(slot_index).map_err(as_argument_bounds)? {
                return Err(VmError::NullRegister(slot_index));
            }
            if arguments.is_reference(slot_index)? {
                ArgValue::Reference(arguments.entry_of(slot_index)?)
            } else {
                ArgValue::Copy(arguments.object(&self.arena, slot_index)?.deep_copy())
            }
        };
        match value {
            ArgValue::Reference(entry) => {
                self.arena.borrow(entry)?;
                let slot = Slot {
                    entry,
                    kind: SlotKind::Borrowed,
                    mask: Mask::Move,
                };
                let (regs, arena) = self.regs_and_arena()?;
                regs.put_slot(arena, target, slot)?;
            }
            ArgValue::Copy(object) => {
                let (regs, arena) = self.regs_and_arena()?;
                regs.set(arena, target, object)?;
            }
        }
        Ok(Flow::Advance)
    }

    /// `call "<name>" <return-reg>` commits the pending frame to a bytecode
    /// function, or invokes a foreign function directly
    pub(crate) fn op_call(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let name = reader.read_cstr()?.to_string();
        let return_register = self.target_operand(reader)?;
        match self.resolve_function(&name)? {
            CallTarget::Bytecode { address, image } => {
                let mut frame = self.pending_frame.take().ok_or(VmError::NoPendingFrame)?;
                frame.function_name = name.clone();
                frame.return_register = return_register;
                frame.return_address = reader.position();
                frame.return_image = self.jump_base.clone();
                trace!(function = %name, address, "call");
                self.frames.push(frame);
                self.jump_base = image;
                Ok(Flow::Goto(address))
            }
            CallTarget::Foreign(function) => {
                let mut frame = self.pending_frame.take().ok_or(VmError::NoPendingFrame)?;
                frame.function_name = name.clone();
                trace!(function = %name, "foreign call");
                let result = {
                    let mut call = ForeignCall {
                        arena: &mut self.arena,
                        frame: &mut frame,
                        globals: &mut self.globals,
                    };
                    function(&mut call)
                };
                match result {
                    Ok(returned) => {
                        let value = match returned {
                            Some(object) => Some(object),
                            None if !frame.registers.is_null(0)? => {
                                Some(frame.registers.take_object(&mut self.arena, 0)?)
                            }
                            None => None,
                        };
                        frame.release(&mut self.arena)?;
                        if let (Some(object), Some(register)) = (value, return_register) {
                            let (regs, arena) = self.regs_and_arena()?;
                            regs.set(arena, register, object)?;
                        }
                        Ok(Flow::Advance)
                    }
                    Err(error) => {
                        frame.release(&mut self.arena)?;
                        Err(error)
                    }
                }
            }
        }
    }

    /// `end` terminates the current frame: the by-convention return slot
    /// (register 0) travels to the caller's designated register, the frame
    /// is destroyed, and execution resumes at the return address. The final
    /// `end` halts the machine with register 0 projected as the exit code.
    pub(crate) fn op_end(&mut self, _reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::Internal("end with no frame".into()))?;

        let return_slot = match frame.return_register {
            Some(_) if !frame.registers.is_null(0)? => Some(frame.registers.take_slot(0)?),
            _ => None,
        };

        if self.frames.is_empty() {
            let code = frame
                .registers
                .object(&self.arena, 0)
                .ok()
                .and_then(|object| object.as_integer().ok())
                .unwrap_or(0);
            if let Some(slot) = return_slot {
                self.release_loose_slot(slot)?;
            }
            frame.release(&mut self.arena)?;
            self.return_code = code;
            self.finished = true;
            debug!(code, "frame stack empty, machine stopping");
            return Ok(Flow::Stop);
        }

        frame.release(&mut self.arena)?;
        if let (Some(slot), Some(register)) = (return_slot, frame.return_register) {
            let (regs, arena) = self.regs_and_arena()?;
            regs.put_slot(arena, register, slot)?;
        }
        trace!(function = %frame.function_name, resume = frame.return_address, "return");
        self.jump_base = frame.return_image.clone();
        Ok(Flow::Goto(frame.return_address))
    }
}
