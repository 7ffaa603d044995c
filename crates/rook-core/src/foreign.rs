//! Foreign (native) function ABI
//!
//! Loadable modules expose Rust functions the bytecode can `call` by name.
//! A foreign function receives the prepared frame (its arguments populated
//! by `param`/`paref`), the object arena, and the machine's global register
//! set. It either returns an object or writes one into register 0 of the
//! frame — both reach the caller's return register.

use crate::arena::Arena;
use crate::frame::Frame;
use crate::object::Object;
use crate::registers::RegisterSet;
use crate::VmResult;
use rustc_hash::FxHashMap;

/// Everything a foreign function may touch during one call
pub struct ForeignCall<'a> {
    /// The object arena
    pub arena: &'a mut Arena,
    /// The prepared call frame; `arguments` carries the caller's
    /// `param`/`paref` slots, `registers` is scratch (slot 0 doubles as the
    /// return convention)
    pub frame: &'a mut Frame,
    /// The machine-wide global register set
    pub globals: &'a mut RegisterSet,
}

impl ForeignCall<'_> {
    /// Number of argument slots the caller prepared
    pub fn argument_count(&self) -> usize {
        self.frame.arguments.size()
    }

    /// Read argument `index` (through the referent for `paref` arguments)
    pub fn argument(&self, index: usize) -> VmResult<&Object> {
        self.frame.arguments.object(self.arena, index)
    }

    /// Write through argument `index`, mutating the caller's register when
    /// the argument was passed by reference
    pub fn set_argument(&mut self, index: usize, object: Object) -> VmResult<()> {
        self.frame.arguments.set(self.arena, index, object)
    }
}

/// A foreign function callable from bytecode
pub type ForeignFunction = fn(&mut ForeignCall<'_>) -> VmResult<Option<Object>>;

/// Registry of foreign functions indexed by symbolic name
///
/// Modules register their exports here; `call` consults the registry after
/// the local and linked function tables.
#[derive(Default)]
pub struct ForeignRegistry {
    handlers: FxHashMap<String, ForeignFunction>,
}

impl ForeignRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a foreign function by name
    pub fn register(&mut self, name: &str, handler: ForeignFunction) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Register a module's whole export table
    pub fn install(&mut self, table: &[(&str, ForeignFunction)]) {
        for (name, handler) in table {
            self.register(name, *handler);
        }
    }

    /// Look up a handler by name
    pub fn get(&self, name: &str) -> Option<ForeignFunction> {
        self.handlers.get(name).copied()
    }

    /// Whether a handler is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ForeignRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignRegistry")
            .field("count", &self.handlers.len())
            .finish()
    }
}
