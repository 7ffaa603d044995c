//! Register-manipulation handlers: move, copy, ref, swap, free, empty,
//! ress, tmpri, tmpro

use crate::frame::{RegisterSel, DEFAULT_REGISTER_COUNT};
use crate::machine::{Flow, Machine};
use crate::registers::RegisterSet;
use crate::{VmError, VmResult};
use rook_bytecode::BytecodeReader;

impl Machine {
    pub(crate) fn op_move(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let src = self.register_operand(reader)?;
        let dst = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.move_reg(arena, src, dst)?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_copy(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let src = self.register_operand(reader)?;
        let dst = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.copy_reg(arena, src, dst)?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_ref(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let src = self.register_operand(reader)?;
        let dst = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.reference(arena, src, dst)?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_swap(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let a = self.register_operand(reader)?;
        let b = self.register_operand(reader)?;
        let (regs, _) = self.regs_and_arena()?;
        regs.swap(a, b)?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_free(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.free(arena, target)?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_empty(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.clear(arena, target)?;
        Ok(Flow::Advance)
    }

    /// `ress "<name>"` switches the register set the frame exposes; the
    /// per-function static set is created on first use
    pub(crate) fn op_ress(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let name = reader.read_cstr()?;
        let sel = match name {
            "local" => RegisterSel::Local,
            "static" => RegisterSel::Static,
            "global" => RegisterSel::Global,
            other => return Err(VmError::UnknownRegisterSet(other.to_string())),
        };
        if sel == RegisterSel::Static {
            let function = self.current_frame()?.function_name.clone();
            self.statics
                .entry(function)
                .or_insert_with(|| RegisterSet::new(DEFAULT_REGISTER_COUNT));
        }
        self.current_frame_mut()?.sel = sel;
        Ok(Flow::Advance)
    }

    /// `tmpri <reg>` moves the register into the machine temporary slot
    pub(crate) fn op_tmpri(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let source = self.register_operand(reader)?;
        let (regs, _) = self.regs_and_arena()?;
        let slot = regs.take_slot(source)?;
        if let Some(previous) = self.tmp.replace(slot) {
            self.release_loose_slot(previous)?;
        }
        Ok(Flow::Advance)
    }

    /// `tmpro <reg>` moves the temporary slot back into a register
    pub(crate) fn op_tmpro(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
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
        let slot = self.tmp.take().ok_or(VmError::EmptyTmp)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.put_slot(arena, target, slot)?;
        Ok(Flow::Advance)
    }
}
