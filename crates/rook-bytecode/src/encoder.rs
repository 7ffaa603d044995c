//! Bytecode encoding and decoding utilities
//!
//! `BytecodeWriter` emits instructions into a binary buffer; `BytecodeReader`
//! is the single decode point used by the image loader and by the machine's
//! operand fetch.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Unterminated string operand
    #[error("unterminated string operand at offset {0}")]
    UnterminatedString(usize),
}

/// Operand flag byte: the i32 payload is the value itself.
pub const OPERAND_DIRECT: u8 = 0;
/// Operand flag byte: the i32 payload names a register holding the value.
pub const OPERAND_INDIRECT: u8 = 1;

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary
/// buffer. The per-opcode helpers cover the direct-operand forms; indirect
/// operands are composed from [`BytecodeWriter::operand_indirect`].
#[derive(Default)]
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Current offset (length of bytecode emitted so far)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Primitive emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float (little-endian)
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a zero-terminated UTF-8 string
    pub fn emit_cstr(&mut self, value: &str) {
        self.buffer.extend_from_slice(value.as_bytes());
        self.buffer.push(0);
    }

    /// Emit an opcode byte
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit a direct int operand (flag byte + i32)
    pub fn operand(&mut self, value: i32) {
        self.emit_u8(OPERAND_DIRECT);
        self.emit_i32(value);
    }

    /// Emit a register-indirect int operand (flag byte + register index)
    pub fn operand_indirect(&mut self, register: i32) {
        self.emit_u8(OPERAND_INDIRECT);
        self.emit_i32(register);
    }

    // ===== Integer instructions =====

    /// Emit IZERO
    pub fn emit_izero(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Izero);
        self.operand(reg);
    }

    /// Emit ISTORE
    pub fn emit_istore(&mut self, reg: i32, value: i64) {
        self.emit_opcode(Opcode::Istore);
        self.operand(reg);
        self.emit_i64(value);
    }

    fn emit_three(&mut self, opcode: Opcode, a: i32, b: i32, result: i32) {
        self.emit_opcode(opcode);
        self.operand(a);
        self.operand(b);
        self.operand(result);
    }

    /// Emit IADD
    pub fn emit_iadd(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Iadd, a, b, result);
    }

    /// Emit ISUB
    pub fn emit_isub(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Isub, a, b, result);
    }

    /// Emit IMUL
    pub fn emit_imul(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Imul, a, b, result);
    }

    /// Emit IDIV
    pub fn emit_idiv(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Idiv, a, b, result);
    }

    /// Emit IINC
    pub fn emit_iinc(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Iinc);
        self.operand(reg);
    }

    /// Emit IDEC
    pub fn emit_idec(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Idec);
        self.operand(reg);
    }

    /// Emit ILT
    pub fn emit_ilt(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Ilt, a, b, result);
    }

    /// Emit ILTE
    pub fn emit_ilte(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Ilte, a, b, result);
    }

    /// Emit IGT
    pub fn emit_igt(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Igt, a, b, result);
    }

    /// Emit IGTE
    pub fn emit_igte(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Igte, a, b, result);
    }

    /// Emit IEQ
    pub fn emit_ieq(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Ieq, a, b, result);
    }

    // ===== Float instructions =====

    /// Emit FSTORE
    pub fn emit_fstore(&mut self, reg: i32, value: f64) {
        self.emit_opcode(Opcode::Fstore);
        self.operand(reg);
        self.emit_f64(value);
    }

    /// Emit FADD
    pub fn emit_fadd(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Fadd, a, b, result);
    }

    /// Emit FSUB
    pub fn emit_fsub(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Fsub, a, b, result);
    }

    /// Emit FMUL
    pub fn emit_fmul(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Fmul, a, b, result);
    }

    /// Emit FDIV
    pub fn emit_fdiv(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Fdiv, a, b, result);
    }

    /// Emit FLT
    pub fn emit_flt(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Flt, a, b, result);
    }

    /// Emit FLTE
    pub fn emit_flte(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Flte, a, b, result);
    }

    /// Emit FGT
    pub fn emit_fgt(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Fgt, a, b, result);
    }

    /// Emit FGTE
    pub fn emit_fgte(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Fgte, a, b, result);
    }

    /// Emit FEQ
    pub fn emit_feq(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Feq, a, b, result);
    }

    // ===== Byte, conversions, strings =====

    /// Emit BSTORE
    pub fn emit_bstore(&mut self, reg: i32, value: u8) {
        self.emit_opcode(Opcode::Bstore);
        self.operand(reg);
        self.emit_u8(value);
    }

    /// Emit ITOF
    pub fn emit_itof(&mut self, src: i32, dst: i32) {
        self.emit_opcode(Opcode::Itof);
        self.operand(src);
        self.operand(dst);
    }

    /// Emit FTOI
    pub fn emit_ftoi(&mut self, src: i32, dst: i32) {
        self.emit_opcode(Opcode::Ftoi);
        self.operand(src);
        self.operand(dst);
    }

    /// Emit STRSTORE
    pub fn emit_strstore(&mut self, reg: i32, value: &str) {
        self.emit_opcode(Opcode::Strstore);
        self.operand(reg);
        self.emit_cstr(value);
    }

    // ===== Vector instructions =====

    /// Emit VEC
    pub fn emit_vec(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Vec);
        self.operand(reg);
    }

    /// Emit VINSERT
    pub fn emit_vinsert(&mut self, vec: i32, src: i32, position: i32) {
        self.emit_opcode(Opcode::Vinsert);
        self.operand(vec);
        self.operand(src);
        self.operand(position);
    }

    /// Emit VPUSH
    pub fn emit_vpush(&mut self, vec: i32, src: i32) {
        self.emit_opcode(Opcode::Vpush);
        self.operand(vec);
        self.operand(src);
    }

    /// Emit VPOP (position -1 pops the last element)
    pub fn emit_vpop(&mut self, vec: i32, dst: i32, position: i32) {
        self.emit_opcode(Opcode::Vpop);
        self.operand(vec);
        self.operand(dst);
        self.operand(position);
    }

    /// Emit VAT
    pub fn emit_vat(&mut self, vec: i32, dst: i32, position: i32) {
        self.emit_opcode(Opcode::Vat);
        self.operand(vec);
        self.operand(dst);
        self.operand(position);
    }

    /// Emit VLEN
    pub fn emit_vlen(&mut self, vec: i32, dst: i32) {
        self.emit_opcode(Opcode::Vlen);
        self.operand(vec);
        self.operand(dst);
    }

    // ===== Boolean logic =====

    /// Emit NOT
    pub fn emit_not(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Not);
        self.operand(reg);
    }

    /// Emit AND
    pub fn emit_and(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::And, a, b, result);
    }

    /// Emit OR
    pub fn emit_or(&mut self, a: i32, b: i32, result: i32) {
        self.emit_three(Opcode::Or, a, b, result);
    }

    // ===== Register manipulation =====

    /// Emit MOVE
    pub fn emit_move(&mut self, src: i32, dst: i32) {
        self.emit_opcode(Opcode::Move);
        self.operand(src);
        self.operand(dst);
    }

    /// Emit COPY
    pub fn emit_copy(&mut self, src: i32, dst: i32) {
        self.emit_opcode(Opcode::Copy);
        self.operand(src);
        self.operand(dst);
    }

    /// Emit REF
    pub fn emit_ref(&mut self, src: i32, dst: i32) {
        self.emit_opcode(Opcode::Ref);
        self.operand(src);
        self.operand(dst);
    }

    /// Emit SWAP
    pub fn emit_swap(&mut self, a: i32, b: i32) {
        self.emit_opcode(Opcode::Swap);
        self.operand(a);
        self.operand(b);
    }

    /// Emit FREE
    pub fn emit_free(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Free);
        self.operand(reg);
    }

    /// Emit EMPTY
    pub fn emit_empty(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Empty);
        self.operand(reg);
    }

    /// Emit ISNULL
    pub fn emit_isnull(&mut self, src: i32, dst: i32) {
        self.emit_opcode(Opcode::Isnull);
        self.operand(src);
        self.operand(dst);
    }

    /// Emit RESS
    pub fn emit_ress(&mut self, set_name: &str) {
        self.emit_opcode(Opcode::Ress);
        self.emit_cstr(set_name);
    }

    /// Emit TMPRI
    pub fn emit_tmpri(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Tmpri);
        self.operand(reg);
    }

    /// Emit TMPRO
    pub fn emit_tmpro(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Tmpro);
        self.operand(reg);
    }

    // ===== Output =====

    /// Emit PRINT
    pub fn emit_print(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Print);
        self.operand(reg);
    }

    /// Emit ECHO
    pub fn emit_echo(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Echo);
        self.operand(reg);
    }

    // ===== Frames and calls =====

    /// Emit FRAME
    pub fn emit_frame(&mut self, argument_count: i32, return_reg: i32) {
        self.emit_opcode(Opcode::Frame);
        self.operand(argument_count);
        self.operand(return_reg);
    }

    /// Emit PARAM
    pub fn emit_param(&mut self, slot: i32, reg: i32) {
        self.emit_opcode(Opcode::Param);
        self.operand(slot);
        self.operand(reg);
    }

    /// Emit PAREF
    pub fn emit_paref(&mut self, slot: i32, reg: i32) {
        self.emit_opcode(Opcode::Paref);
        self.operand(slot);
        self.operand(reg);
    }

    /// Emit ARG
    pub fn emit_arg(&mut self, slot: i32, reg: i32) {
        self.emit_opcode(Opcode::Arg);
        self.operand(slot);
        self.operand(reg);
    }

    /// Emit CALL
    pub fn emit_call(&mut self, function: &str, return_reg: i32) {
        self.emit_opcode(Opcode::Call);
        self.emit_cstr(function);
        self.operand(return_reg);
    }

    /// Emit END
    pub fn emit_end(&mut self) {
        self.emit_opcode(Opcode::End);
    }

    // ===== Control flow =====

    /// Emit JUMP
    pub fn emit_jump(&mut self, target: u32) {
        self.emit_opcode(Opcode::Jump);
        self.emit_u32(target);
    }

    /// Emit BRANCH
    pub fn emit_branch(&mut self, reg: i32, if_true: u32, if_false: u32) {
        self.emit_opcode(Opcode::Branch);
        self.operand(reg);
        self.emit_u32(if_true);
        self.emit_u32(if_false);
    }

    /// Emit HALT
    pub fn emit_halt(&mut self) {
        self.emit_opcode(Opcode::Halt);
    }

    /// Emit PASS
    pub fn emit_pass(&mut self) {
        self.emit_opcode(Opcode::Pass);
    }

    /// Emit NOP
    pub fn emit_nop(&mut self) {
        self.emit_opcode(Opcode::Nop);
    }

    // ===== Exception handling =====

    /// Emit TRYFRAME
    pub fn emit_tryframe(&mut self) {
        self.emit_opcode(Opcode::Tryframe);
    }

    /// Emit CATCH
    pub fn emit_catch(&mut self, type_name: &str, block_name: &str) {
        self.emit_opcode(Opcode::Catch);
        self.emit_cstr(type_name);
        self.emit_cstr(block_name);
    }

    /// Emit PULL
    pub fn emit_pull(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Pull);
        self.operand(reg);
    }

    /// Emit TRY
    pub fn emit_try(&mut self, block_name: &str) {
        self.emit_opcode(Opcode::Try);
        self.emit_cstr(block_name);
    }

    /// Emit THROW
    pub fn emit_throw(&mut self, reg: i32) {
        self.emit_opcode(Opcode::Throw);
        self.operand(reg);
    }

    /// Emit LEAVE
    pub fn emit_leave(&mut self) {
        self.emit_opcode(Opcode::Leave);
    }
}

/// Bytecode reader positioned over a byte slice
///
/// Tracks its own offset; every read fails with [`DecodeError::UnexpectedEnd`]
/// rather than panicking when the stream is truncated.
pub struct BytecodeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a reader over `bytes` starting at offset 0
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Create a reader over `bytes` starting at `pos`
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    /// Current offset into the underlying slice
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left in the stream
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Whether the reader has consumed the whole slice
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEnd(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(buf))
    }

    /// Read a 64-bit float (little-endian)
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    /// Read `count` raw bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        self.take(count)
    }

    /// Read a zero-terminated UTF-8 string, consuming the terminator
    pub fn read_cstr(&mut self) -> Result<&'a str, DecodeError> {
        let start = self.pos;
        let nul = self.bytes[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or(DecodeError::UnterminatedString(start))?;
        let slice = &self.bytes[start..start + nul];
        self.pos = start + nul + 1;
        std::str::from_utf8(slice).map_err(|_| DecodeError::InvalidUtf8(start))
    }
}
