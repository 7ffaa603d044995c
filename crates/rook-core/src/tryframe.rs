//! Try frames and catchers
//!
//! A try frame is a handler scope inside one or more frames. It is created
//! pending by `tryframe`, populated by `catch`, committed by `try` (which
//! records the resume address and the frame-stack depth it guards), and
//! destroyed by `leave` or consumed by a successful match during unwinding.

use crate::machine::ImageRef;
use rustc_hash::FxHashMap;

/// The binding `exception type name → handler block`
#[derive(Debug, Clone)]
pub struct Catcher {
    /// Exception type this catcher matches
    pub type_name: String,
    /// Name of the handler block
    pub block_name: String,
    /// Resolved entry offset of the handler block
    pub block_address: usize,
    /// Image the handler block lives in
    pub image: ImageRef,
}

/// A handler scope on the try-frame stack
#[derive(Debug, Default)]
pub struct TryFrame {
    /// Name of the guarded block
    pub block_name: String,
    /// Frame-stack depth of the frame the `try` executed in; unwinding
    /// discards frames above it before entering a handler
    pub associated_frame: usize,
    /// Offset `leave` resumes at
    pub return_address: usize,
    /// Image the return address is relative to
    pub return_image: ImageRef,
    /// Registered catchers by exception type name
    pub catchers: FxHashMap<String, Catcher>,
}

impl TryFrame {
    /// Create an empty pending try frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a catcher, replacing any previous one for the same type
    pub fn add_catcher(&mut self, catcher: Catcher) {
        self.catchers.insert(catcher.type_name.clone(), catcher);
    }

    /// The catcher matching `type_name`, if registered
    pub fn catcher_for(&self, type_name: &str) -> Option<&Catcher> {
        self.catchers.get(type_name)
    }
}
