//! Store handlers: izero, istore, fstore, bstore, strstore

use crate::machine::{Flow, Machine};
use crate::object::Object;
use crate::VmResult;
use rook_bytecode::BytecodeReader;

impl Machine {
    pub(crate) fn op_izero(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.set(arena, target, Object::Integer(0))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_istore(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let value = reader.read_i64()?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.set(arena, target, Object::Integer(value))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_fstore(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let value = reader.read_f64()?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.set(arena, target, Object::Float(value))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_bstore(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let value = reader.read_u8()?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.set(arena, target, Object::Byte(value))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_strstore(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let value = reader.read_cstr()?.to_string();
        let (regs, arena) = self.regs_and_arena()?;
        regs.set(arena, target, Object::String(value))?;
        Ok(Flow::Advance)
    }
}
