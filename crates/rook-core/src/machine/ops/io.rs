//! Output handlers: print, echo

use crate::machine::{Flow, Machine};
use crate::{VmError, VmResult};
use rook_bytecode::BytecodeReader;
use std::io::Write;

impl Machine {
    fn write_register(
        &mut self,
        reader: &mut BytecodeReader<'_>,
        newline: bool,
    ) -> VmResult<Flow> {
        let source = self.register_operand(reader)?;
        let text = {
            let (regs, arena) = self.regs_and_arena()?;
            regs.object(arena, source)?.to_string()
        };
        let result = if newline {
            writeln!(self.out, "{}", text)
        } else {
            write!(self.out, "{}", text)
        };
        result.map_err(|e| VmError::Internal(format!("output error: {e}")))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_print(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.write_register(reader, true)
    }

    pub(crate) fn op_echo(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.write_register(reader, false)
    }
}
