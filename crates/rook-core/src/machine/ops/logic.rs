//! Boolean logic handlers: not, and, or, isnull

use crate::machine::{Flow, Machine};
use crate::object::Object;
use crate::VmResult;
use rook_bytecode::BytecodeReader;

impl Machine {
    /// `not <reg>` negates the register's boolean projection in place
    pub(crate) fn op_not(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let value = regs.object(arena, target)?.to_bool();
        regs.set(arena, target, Object::Boolean(!value))?;
        Ok(Flow::Advance)
    }

    fn bool_binary(
        &mut self,
        reader: &mut BytecodeReader<'_>,
        op: fn(bool, bool) -> bool,
    ) -> VmResult<Flow> {
        let a = self.register_operand(reader)?;
        let b = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let lhs = regs.object(arena, a)?.to_bool();
        let rhs = regs.object(arena, b)?.to_bool();
        regs.set(arena, target, Object::Boolean(op(lhs, rhs)))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_and(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.bool_binary(reader, |a, b| a && b)
    }

    pub(crate) fn op_or(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.bool_binary(reader, |a, b| a || b)
    }

    /// `isnull <src> <dst>` stores whether `src` is an empty slot
    pub(crate) fn op_isnull(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let src = self.register_operand(reader)?;
        let dst = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let empty = regs.is_null(src)?;
        regs.set(arena, dst, Object::Boolean(empty))?;
        Ok(Flow::Advance)
    }
}
