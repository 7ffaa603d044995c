//! Arithmetic and conversion handlers: integer, float, itof/ftoi

use crate::machine::{Flow, Machine};
use crate::object::Object;
use crate::{VmError, VmResult};
use rook_bytecode::BytecodeReader;

impl Machine {
    /// Three-operand integer arithmetic: `op <a> <b> <result>`
    pub(super) fn int_binary(
        &mut self,
        reader: &mut BytecodeReader<'_>,
        op: fn(i64, i64) -> VmResult<i64>,
    ) -> VmResult<Flow> {
        let a = self.register_operand(reader)?;
        let b = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let lhs = regs.object(arena, a)?.as_integer()?;
        let rhs = regs.object(arena, b)?.as_integer()?;
        regs.set(arena, target, Object::Integer(op(lhs, rhs)?))?;
        Ok(Flow::Advance)
    }

    /// Three-operand float arithmetic: `op <a> <b> <result>`
    pub(super) fn float_binary(
        &mut self,
        reader: &mut BytecodeReader<'_>,
        op: fn(f64, f64) -> f64,
    ) -> VmResult<Flow> {
        let a = self.register_operand(reader)?;
        let b = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let lhs = regs.object(arena, a)?.as_float()?;
        let rhs = regs.object(arena, b)?.as_float()?;
        regs.set(arena, target, Object::Float(op(lhs, rhs)))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_iadd(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_binary(reader, |a, b| Ok(a.wrapping_add(b)))
    }

    pub(crate) fn op_isub(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_binary(reader, |a, b| Ok(a.wrapping_sub(b)))
    }

    pub(crate) fn op_imul(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_binary(reader, |a, b| Ok(a.wrapping_mul(b)))
    }

    pub(crate) fn op_idiv(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_binary(reader, |a, b| {
            if b == 0 {
                Err(VmError::Arithmetic("integer division by zero"))
            } else {
                Ok(a.wrapping_div(b))
            }
        })
    }

    pub(crate) fn op_iinc(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_in_place(reader, |v| v.wrapping_add(1))
    }

    pub(crate) fn op_idec(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.int_in_place(reader, |v| v.wrapping_sub(1))
    }

    fn int_in_place(
        &mut self,
        reader: &mut BytecodeReader<'_>,
        op: fn(i64) -> i64,
    ) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let value = regs.object(arena, target)?.as_integer()?;
        regs.set(arena, target, Object::Integer(op(value)))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_fadd(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_binary(reader, |a, b| a + b)
    }

    pub(crate) fn op_fsub(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_binary(reader, |a, b| a - b)
    }

    pub(crate) fn op_fmul(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_binary(reader, |a, b| a * b)
    }

    pub(crate) fn op_fdiv(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        self.float_binary(reader, |a, b| a / b)
    }

    pub(crate) fn op_itof(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let src = self.register_operand(reader)?;
        let dst = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let value = regs.object(arena, src)?.as_integer()?;
        regs.set(arena, dst, Object::Float(value as f64))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_ftoi(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let src = self.register_operand(reader)?;
        let dst = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let value = regs.object(arena, src)?.as_float()?;
        regs.set(arena, dst, Object::Integer(value as i64))?;
        Ok(Flow::Advance)
    }
}
