//! Rook VM core runtime
//!
//! This crate provides the virtual machine core:
//! - the object model (a tagged sum of the value variants),
//! - the object arena and aliasing-aware register sets,
//! - call frames, try frames and the calling convention,
//! - the fetch/decode/dispatch loop and all opcode handlers,
//! - structured exception handling with cross-frame unwinding,
//! - the foreign (native) function ABI.
//!
//! The machine is strictly single-threaded; every handler runs to
//! completion within one [`Machine::tick`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod arena;
pub mod foreign;
pub mod frame;
pub mod machine;
pub mod object;
pub mod registers;
pub mod tryframe;

pub use arena::{Arena, ArenaIndex};
pub use foreign::{ForeignCall, ForeignFunction, ForeignRegistry};
pub use frame::{Frame, RegisterSel, DEFAULT_REGISTER_COUNT};
pub use machine::{ExitCondition, FrameTrace, ImageRef, Machine, SlotDump};
pub use object::{Closure, ExceptionObject, Object};
pub use registers::{Mask, RegisterSet, Slot, SlotKind};
pub use tryframe::{Catcher, TryFrame};

use rook_bytecode::DecodeError;

/// VM execution errors
///
/// Two classes share this enum. *Typed* errors (bounds, null reads, type
/// mismatches, calling-convention misuse) convert to catchable Exception
/// objects and unwind through try/catch. *Structural* errors (unknown
/// opcode, bad address, non-progress, truncated operands) are fatal: the
/// machine cannot trust its own state to continue.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Register index outside the register set
    #[error("register {index} out of bounds (size {size})")]
    RegisterBounds {
        /// The out-of-bounds index
        index: usize,
        /// The register-set size
        size: usize,
    },

    /// Read from an empty register
    #[error("read from empty register {0}")]
    NullRegister(usize),

    /// Typed-operation downcast failure
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the handler required
        expected: &'static str,
        /// Type actually held
        found: String,
    },

    /// Arithmetic failure
    #[error("arithmetic error: {0}")]
    Arithmetic(&'static str),

    /// `free` through a reference slot
    #[error("cannot free register {0}: slot is a reference")]
    ReferenceFree(usize),

    /// `free` of an object other slots still borrow
    #[error("cannot free register {0}: references to it still exist")]
    AliasedFree(usize),

    /// `frame` while a pending frame is already buffered
    #[error("new frame requested while last one is unused")]
    PendingFrameExists,

    /// `param`/`paref`/`call` without a pending frame
    #[error("no pending frame")]
    NoPendingFrame,

    /// `tryframe` while a pending try frame is already buffered
    #[error("new try frame requested while last one is unused")]
    PendingTryFrameExists,

    /// `catch`/`try` without a pending try frame
    #[error("no pending try frame")]
    NoPendingTryFrame,

    /// `pull` with no caught object waiting
    #[error("no caught object to pull")]
    NoCaughtObject,

    /// `tmpro` with an empty temporary slot
    #[error("temporary register is empty")]
    EmptyTmp,

    /// Vector access outside the element range
    #[error("vector index {index} out of range (length {len})")]
    VectorBounds {
        /// The requested position
        index: i64,
        /// The vector length
        len: usize,
    },

    /// `leave` with no try frame entered
    #[error("bad leave: no block has been entered")]
    BadLeave,

    /// Argument slot outside the prepared frame
    #[error("argument slot {index} out of bounds (size {size})")]
    ArgumentBounds {
        /// The out-of-bounds slot
        index: usize,
        /// The argument-set size
        size: usize,
    },

    /// Unresolvable function name at `call`
    #[error("call to undefined function: {0}")]
    UnknownFunction(String),

    /// Unresolvable block name at `try`/`catch`
    #[error("undefined block: {0}")]
    UnknownBlock(String),

    /// `ress` with a name other than local/static/global
    #[error("unknown register set: {0}")]
    UnknownRegisterSet(String),

    /// Byte not in the dispatch table (fatal)
    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode {
        /// The undecodable byte
        byte: u8,
        /// Its offset in the image
        offset: usize,
    },

    /// Instruction pointer left the image (fatal)
    #[error("instruction pointer {0} outside the bytecode image")]
    InvalidAddress(usize),

    /// A handler failed to advance the instruction pointer (fatal)
    #[error("instruction did not advance: {opcode} at offset {offset}{hint}")]
    InstructionUnchanged {
        /// Mnemonic of the stuck instruction
        opcode: &'static str,
        /// Its offset in the image
        offset: usize,
        /// Extra diagnostic, e.g. for a self-recursing call
        hint: &'static str,
    },

    /// Truncated or malformed operands (fatal)
    #[error("bytecode decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Machine invariant violation (fatal)
    #[error("internal error: {0}")]
    Internal(String),
}

impl VmError {
    /// Whether this error terminates the machine instead of unwinding
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VmError::UnknownOpcode { .. }
                | VmError::InvalidAddress(_)
                | VmError::InstructionUnchanged { .. }
                | VmError::Decode(_)
                | VmError::Internal(_)
        )
    }

    /// The exception type tag a catcher matches this error under; for
    /// fatal errors this names the failure in `exit_condition` diagnostics
    pub fn exception_tag(&self) -> &'static str {
        match self {
            VmError::RegisterBounds { .. } => "RegisterBoundsError",
            VmError::NullRegister(_) => "NullRegisterRead",
            VmError::TypeMismatch { .. } => "TypeError",
            VmError::Arithmetic(_) => "ArithmeticError",
            VmError::VectorBounds { .. } => "VectorBoundsError",
            VmError::UnknownOpcode { .. } => "UnknownOpcode",
            VmError::InvalidAddress(_) => "InvalidBytecodeAddress",
            VmError::InstructionUnchanged { .. } => "InstructionUnchangedError",
            VmError::Decode(_) => "DecodeError",
            VmError::Internal(_) => "InternalError",
            _ => "Exception",
        }
    }

    /// Convert a typed error into the Object a catcher can receive.
    ///
    /// Returns the error unchanged when it is structural.
    pub fn to_thrown(self) -> Result<Object, VmError> {
        if self.is_fatal() {
            Err(self)
        } else {
            let tag = self.exception_tag();
            Ok(Object::Exception(ExceptionObject::tagged(
                tag,
                self.to_string(),
            )))
        }
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
