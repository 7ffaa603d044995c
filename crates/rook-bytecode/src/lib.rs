//! Rook VM instruction set and image format
//!
//! This crate defines everything the VM core and the toolchain agree on:
//! - the dense opcode set and its frozen numeric assignment,
//! - operand encoding (writer) and decoding (reader),
//! - the program image: bytecode plus function/block address tables, with
//!   its on-disk framing.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod encoder;
pub mod image;
pub mod opcode;

pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError, OPERAND_DIRECT, OPERAND_INDIRECT};
pub use image::{ImageBuilder, ImageError, ProgramImage, ENTRY_FUNCTION};
pub use opcode::Opcode;
