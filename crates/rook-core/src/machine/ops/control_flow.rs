//! Control-flow handlers: jump, branch, halt, pass, nop

use crate::machine::{Flow, Machine};
use crate::VmResult;
use rook_bytecode::BytecodeReader;
use tracing::debug;

impl Machine {
    pub(crate) fn op_jump(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = reader.read_u32()? as usize;
        Ok(Flow::Goto(target))
    }

    pub(crate) fn op_branch(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let condition = self.register_operand(reader)?;
        let if_true = reader.read_u32()? as usize;
        let if_false = reader.read_u32()? as usize;
        let (regs, arena) = self.regs_and_arena()?;
        let taken = regs.object(arena, condition)?.to_bool();
        Ok(Flow::Goto(if taken { if_true } else { if_false }))
    }

    /// `halt` stops the loop; the entry frame's register 0 projects the
    /// exit code when it holds an Integer
    pub(crate) fn op_halt(&mut self, _reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.return_code = self
            .frames
            .first()
            .and_then(|frame| frame.registers.object(&self.arena, 0).ok())
            .and_then(|object| object.as_integer().ok())
            .unwrap_or(0);
        self.finished = true;
        debug!(code = self.return_code, "halt");
        Ok(Flow::Stop)
    }

    pub(crate) fn op_pass(&mut self, _reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        Ok(Flow::Advance)
    }

    pub(crate) fn op_nop(&mut self, _reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        Ok(Flow::Advance)
    }
}
