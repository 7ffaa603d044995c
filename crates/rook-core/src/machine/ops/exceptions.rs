//! Exception handlers: tryframe, catch, pull, try, throw, leave
//!
//! The unwinding itself lives on the machine (it runs at tick start, not
//! as an instruction); these handlers manage the try-frame lifecycle and
//! the thrown/caught hand-off slots.

use crate::machine::{Flow, Machine};
use crate::registers::Mask;
use crate::tryframe::{Catcher, TryFrame};
use crate::{VmError, VmResult};
use rook_bytecode::BytecodeReader;
use tracing::trace;

impl Machine {
    /// `tryframe` opens a pending handler scope
    pub(crate) fn op_tryframe(&mut self, _reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        if self.pending_tryframe.is_some() {
            return Err(VmError::PendingTryFrameExists);
        }
        self.pending_tryframe = Some(TryFrame::new());
        Ok(Flow::Advance)
    }

    /// `catch "<type>" "<block>"` registers a handler on the pending scope
    pub(crate) fn op_catch(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let type_name = reader.read_cstr()?.to_string();
        let block_name = reader.read_cstr()?.to_string();
        let (block_address, image) = self.resolve_block(&block_name)?;
        let pending = self
            .pending_tryframe
            .as_mut()
            .ok_or(VmError::NoPendingTryFrame)?;
        pending.add_catcher(Catcher {
            type_name,
            block_name,
            block_address,
            image,
        });
        Ok(Flow::Advance)
    }

    /// `pull <reg>` moves the caught object into a register
    pub(crate) fn op_pull(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        {
            let regs = self.uregset_ref()?;
            if target >= regs.size() {
                return Err(VmError::RegisterBounds {
                    index: target,
                    size: regs.size(),
                });
            }
        }
        let slot = self.caught.take().ok_or(VmError::NoCaughtObject)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.put_slot(arena, target, slot)?;
        Ok(Flow::Advance)
    }

    /// `try "<block>"` commits the pending scope and enters the guarded
    /// block
    pub(crate) fn op_try(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let block_name = reader.read_cstr()?.to_string();
        let (address, image) = self.resolve_block(&block_name)?;
        let depth = self.frames.len();
        if depth == 0 {
            return Err(VmError::Internal("try with no active frame".into()));
        }
        let mut tryframe = self
            .pending_tryframe
            .take()
            .ok_or(VmError::NoPendingTryFrame)?;
        tryframe.block_name = block_name;
        tryframe.return_address = reader.position();
        tryframe.return_image = self.jump_base.clone();
        tryframe.associated_frame = depth - 1;
        trace!(block = %tryframe.block_name, address, "entering guarded block");
        self.tryframes.push(tryframe);
        self.jump_base = image;
        Ok(Flow::Goto(address))
    }

    /// `throw <reg>` lifts the register's object into the thrown slot;
    /// unwinding starts on the next tick
    pub(crate) fn op_throw(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let source = self.register_operand(reader)?;
        let slot = {
            let (regs, _) = self.regs_and_arena()?;
            regs.set_mask(source, Mask::Keep)?;
            regs.take_slot(source)?
        };
        trace!(register = source, "throw");
        if let Some(previous) = self.thrown.replace(slot) {
            self.release_loose_slot(previous)?;
        }
        Ok(Flow::Advance)
    }

    /// `leave` pops the innermost handler scope and resumes after its `try`
    pub(crate) fn op_leave(&mut self, _reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let tryframe = self.tryframes.pop().ok_or(VmError::BadLeave)?;
        self.jump_base = tryframe.return_image.clone();
        Ok(Flow::Goto(tryframe.return_address))
    }
}
