//! Call frames
//!
//! A frame is one call activation: its local register set, the argument set
//! the caller prepared, the register the caller expects the return value
//! in, and where to resume in the caller.

use crate::arena::Arena;
use crate::machine::ImageRef;
use crate::registers::RegisterSet;
use crate::VmResult;

/// Local register count allocated for every frame (and for each lazily
/// created static set)
pub const DEFAULT_REGISTER_COUNT: usize = 16;

/// Which of the frame's three register sets handlers currently address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterSel {
    /// The frame's own registers
    #[default]
    Local,
    /// The per-function static set
    Static,
    /// The machine-wide global set
    Global,
}

/// A call activation
#[derive(Debug)]
pub struct Frame {
    /// Name of the function this frame executes
    pub function_name: String,
    /// Local registers
    pub registers: RegisterSet,
    /// Arguments the caller prepared with `param`/`paref`
    pub arguments: RegisterSet,
    /// Caller register receiving the return value, when one is expected
    pub return_register: Option<usize>,
    /// Offset to resume at in the caller
    pub return_address: usize,
    /// Image the return address is relative to
    pub return_image: ImageRef,
    /// Register set currently exposed to handlers (`ress`)
    pub sel: RegisterSel,
}

impl Frame {
    /// Allocate a call-preparation record: `argument_count` argument slots
    /// and the caller's return-target register. The function name and
    /// return address are filled in when `call` commits the frame.
    pub fn prepare(argument_count: usize, return_register: Option<usize>) -> Self {
        Self {
            function_name: String::new(),
            registers: RegisterSet::new(DEFAULT_REGISTER_COUNT),
            arguments: RegisterSet::new(argument_count),
            return_register,
            return_address: 0,
            return_image: ImageRef::Main,
            sel: RegisterSel::Local,
        }
    }

    /// Release both register sets (frame teardown)
    pub fn release(&mut self, arena: &mut Arena) -> VmResult<()> {
        self.registers.release_all(arena)?;
        self.arguments.release_all(arena)
    }
}
