//! Comparison handlers; results are Boolean objects

use crate::machine::{Flow, Machine};
use crate::object::Object;
use crate::VmResult;
use rook_bytecode::BytecodeReader;

impl Machine {
    fn int_compare(
        &mut self,
        reader: &mut BytecodeReader<'_>,
        op: fn(i64, i64) -> bool,
    ) -> VmResult<Flow> {
        let a = self.register_operand(reader)?;
        let b = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let lhs = regs.object(arena, a)?.as_integer()?;
        let rhs = regs.object(arena, b)?.as_integer()?;
        regs.set(arena, target, Object::Boolean(op(lhs, rhs)))?;
        Ok(Flow::Advance)
    }

    fn float_compare(
        &mut self,
        reader: &mut BytecodeReader<'_>,
        op: fn(f64, f64) -> bool,
    ) -> VmResult<Flow> {
        let a = self.register_operand(reader)?;
        let b = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let lhs = regs.object(arena, a)?.as_float()?;
        let rhs = regs.object(arena, b)?.as_float()?;
        regs.set(arena, target, Object::Boolean(op(lhs, rhs)))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_ilt(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_compare(reader, |a, b| a < b)
    }

    pub(crate) fn op_ilte(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_compare(reader, |a, b| a <= b)
    }

    pub(crate) fn op_igt(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_compare(reader, |a, b| a > b)
    }

    pub(crate) fn op_igte(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_compare(reader, |a, b| a >= b)
    }

    pub(crate) fn op_ieq(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_compare(reader, |a, b| a == b)
    }

    pub(crate) fn op_flt(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_compare(reader, |a, b| a < b)
    }

    pub(crate) fn op_flte(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_compare(reader, |a, b| a <= b)
    }

    pub(crate) fn op_fgt(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_compare(reader, |a, b| a > b)
    }

    pub(crate) fn op_fgte(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_compare(reader, |a, b| a >= b)
    }

    pub(crate) fn op_feq(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_compare(reader, |a, b| a == b)
    }
}
