//! Program image format
//!
//! A compiled program is a flat byte image plus two name→offset tables: one
//! for functions, one for catch/try blocks. The on-disk framing (all
//! integers little-endian):
//!
//! ```text
//! [u16]   function_table_size_bytes
//! [bytes] function_table: repeated { NUL-terminated name, [u16] offset }
//! [u16]   block_table_size_bytes
//! [bytes] block_table:    repeated { NUL-terminated name, [u16] offset }
//! [u16]   bytecode_size_bytes
//! [bytes] bytecode
//! ```

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

/// Name of the function executed when the machine starts
pub const ENTRY_FUNCTION: &str = "__entry";

/// Image encoding/decoding errors
#[derive(Debug, Error)]
pub enum ImageError {
    /// Decode error
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A table or the bytecode exceeds the u16 framing limit
    #[error("{0} section exceeds the 64 KiB framing limit ({1} bytes)")]
    SectionTooLarge(&'static str, usize),

    /// Bytes left over after the bytecode section
    #[error("{0} trailing bytes after the bytecode section")]
    TrailingBytes(usize),

    /// A table entry points past the end of the bytecode
    #[error("{kind} {name:?} maps to offset {offset}, beyond bytecode of {size} bytes")]
    OffsetOutOfRange {
        /// "function" or "block"
        kind: &'static str,
        /// The mapped name
        name: String,
        /// The out-of-range offset
        offset: usize,
        /// Bytecode size
        size: usize,
    },

    /// File could not be read
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// A loaded program: immutable bytecode plus its address tables
#[derive(Debug, Clone, Default)]
pub struct ProgramImage {
    /// The flat bytecode
    pub bytecode: Vec<u8>,
    /// Function entry offsets by name
    pub functions: FxHashMap<String, usize>,
    /// Block entry offsets by name
    pub blocks: FxHashMap<String, usize>,
}

impl ProgramImage {
    /// Create an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the `__entry` function, when mapped
    pub fn entry_offset(&self) -> Option<usize> {
        self.functions.get(ENTRY_FUNCTION).copied()
    }

    /// Decode an image from its on-disk framing
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let mut reader = BytecodeReader::new(bytes);

        let functions = Self::read_table(&mut reader)?;
        let blocks = Self::read_table(&mut reader)?;

        let code_size = reader.read_u16()? as usize;
        let bytecode = reader.read_bytes(code_size)?.to_vec();
        if !reader.is_at_end() {
            return Err(ImageError::TrailingBytes(reader.remaining()));
        }

        let image = Self {
            bytecode,
            functions,
            blocks,
        };
        image.check_offsets()?;
        Ok(image)
    }

    /// Read and decode an image file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Encode the image into its on-disk framing
    ///
    /// Table entries are written in name order so the output is
    /// deterministic.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let mut out = BytecodeWriter::new();
        Self::write_table(&mut out, "function table", &self.functions)?;
        Self::write_table(&mut out, "block table", &self.blocks)?;

        if self.bytecode.len() > u16::MAX as usize {
            return Err(ImageError::SectionTooLarge("bytecode", self.bytecode.len()));
        }
        out.emit_u16(self.bytecode.len() as u16);
        for byte in &self.bytecode {
            out.emit_u8(*byte);
        }
        Ok(out.into_bytes())
    }

    fn read_table(reader: &mut BytecodeReader<'_>) -> Result<FxHashMap<String, usize>, ImageError> {
        let size = reader.read_u16()? as usize;
        let section = reader.read_bytes(size)?;
        let mut entries = FxHashMap::default();
        let mut inner = BytecodeReader::new(section);
        while !inner.is_at_end() {
            let name = inner.read_cstr()?.to_string();
            let offset = inner.read_u16()? as usize;
            entries.insert(name, offset);
        }
        Ok(entries)
    }

    fn write_table(
        out: &mut BytecodeWriter,
        label: &'static str,
        table: &FxHashMap<String, usize>,
    ) -> Result<(), ImageError> {
        let mut section = BytecodeWriter::new();
        let mut names: Vec<&String> = table.keys().collect();
        names.sort();
        for name in names {
            section.emit_cstr(name);
            section.emit_u16(table[name] as u16);
        }
        let section = section.into_bytes();
        if section.len() > u16::MAX as usize {
            return Err(ImageError::SectionTooLarge(label, section.len()));
        }
        out.emit_u16(section.len() as u16);
        for byte in &section {
            out.emit_u8(*byte);
        }
        Ok(())
    }

    fn check_offsets(&self) -> Result<(), ImageError> {
        let size = self.bytecode.len();
        for (kind, table) in [("function", &self.functions), ("block", &self.blocks)] {
            for (name, offset) in table {
                if *offset >= size && size > 0 {
                    return Err(ImageError::OffsetOutOfRange {
                        kind,
                        name: name.clone(),
                        offset: *offset,
                        size,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Incrementally assembles a [`ProgramImage`]
///
/// Marks function and block entry points at the writer's current offset, so
/// code is laid out in emission order:
///
/// ```
/// use rook_bytecode::ImageBuilder;
///
/// let mut builder = ImageBuilder::new();
/// builder.begin_function("__entry");
/// builder.code().emit_istore(0, 5);
/// builder.code().emit_end();
/// let image = builder.finish();
/// assert_eq!(image.entry_offset(), Some(0));
/// ```
#[derive(Default)]
pub struct ImageBuilder {
    writer: BytecodeWriter,
    functions: FxHashMap<String, usize>,
    blocks: FxHashMap<String, usize>,
}

impl ImageBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a function entry at the current offset
    pub fn begin_function(&mut self, name: &str) -> &mut Self {
        self.functions.insert(name.to_string(), self.writer.offset());
        self
    }

    /// Mark a block entry at the current offset
    pub fn begin_block(&mut self, name: &str) -> &mut Self {
        self.blocks.insert(name.to_string(), self.writer.offset());
        self
    }

    /// The underlying instruction writer
    pub fn code(&mut self) -> &mut BytecodeWriter {
        &mut self.writer
    }

    /// Current bytecode offset (the address of the next instruction)
    pub fn offset(&self) -> usize {
        self.writer.offset()
    }

    /// Finish and produce the image
    pub fn finish(self) -> ProgramImage {
        ProgramImage {
            bytecode: self.writer.into_bytes(),
            functions: self.functions,
            blocks: self.blocks,
        }
    }
}
