//! Vector handlers: vec, vinsert, vpush, vpop, vat, vlen

use crate::machine::{Flow, Machine};
use crate::object::Object;
use crate::{VmError, VmResult};
use rook_bytecode::BytecodeReader;

/// Resolve a possibly-negative position against `len`; negative positions
/// count from the end (-1 is the last element). `allow_end` admits the
/// one-past-last position (`vinsert` appends there).
fn resolve_position(position: i64, len: usize, allow_end: bool) -> VmResult<usize> {
    let resolved = if position < 0 {
        position + len as i64
    } else {
        position
    };
    let limit = if allow_end { len as i64 } else { len as i64 - 1 };
    if resolved < 0 || resolved > limit {
        return Err(VmError::VectorBounds {
            index: position,
            len,
        });
    }
    Ok(resolved as usize)
}

impl Machine {
    pub(crate) fn op_vec(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        regs.set(arena, target, Object::Vector(Vec::new()))?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_vinsert(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let vector = self.register_operand(reader)?;
        let source = self.register_operand(reader)?;
        let position = self.int_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let object = regs.take_object(arena, source)?;
        let items = regs.object_mut(arena, vector)?.as_vector_mut()?;
        let index = resolve_position(position, items.len(), true)?;
        items.insert(index, object);
        Ok(Flow::Advance)
    }

    pub(crate) fn op_vpush(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let vector = self.register_operand(reader)?;
        let source = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let object = regs.take_object(arena, source)?;
        regs.object_mut(arena, vector)?.as_vector_mut()?.push(object);
        Ok(Flow::Advance)
    }

    pub(crate) fn op_vpop(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let vector = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let position = self.int_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let object = {
            let items = regs.object_mut(arena, vector)?.as_vector_mut()?;
            let index = resolve_position(position, items.len(), false)?;
            items.remove(index)
        };
        regs.set(arena, target, object)?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_vat(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let vector = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let position = self.int_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let object = {
            let items = regs.object(arena, vector)?.as_vector()?;
            let index = resolve_position(position, items.len(), false)?;
            items[index].deep_copy()
        };
        regs.set(arena, target, object)?;
        Ok(Flow::Advance)
    }

    pub(crate) fn op_vlen(&mut self, reader: &mut BytecodeReader<'_>) -> VmResult<Flow> {
        let vector = self.register_operand(reader)?;
        let target = self.register_operand(reader)?;
        let (regs, arena) = self.regs_and_arena()?;
        let len = regs.object(arena, vector)?.as_vector()?.len();
        regs.set(arena, target, Object::Integer(len as i64))?;
        Ok(Flow::Advance)
    }
}
