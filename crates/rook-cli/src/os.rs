//! The `os` foreign module
//!
//! A small export table demonstrating the foreign ABI end-to-end. The CLI
//! installs it before running; embedders can do the same with
//! `Machine::install_foreign(os::EXPORTS)`.

use rook_core::{ForeignCall, ForeignFunction, Object, VmError, VmResult};

fn string_argument(call: &ForeignCall<'_>, index: usize) -> VmResult<String> {
    match call.argument(index)? {
        Object::String(s) => Ok(s.clone()),
        other => Err(VmError::TypeMismatch {
            expected: "String",
            found: other.type_name().to_string(),
        }),
    }
}

/// `os::system(command: String) -> Integer` — run a shell command and
/// return its exit status (-1 when no status is available)
fn system(call: &mut ForeignCall<'_>) -> VmResult<Option<Object>> {
    let command = string_argument(call, 0)?;
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .status();
    let code = status.ok().and_then(|s| s.code()).unwrap_or(-1) as i64;
    Ok(Some(Object::Integer(code)))
}

/// `os::getenv(name: String) -> String` — environment variable value, or
/// the empty string when unset
fn getenv(call: &mut ForeignCall<'_>) -> VmResult<Option<Object>> {
    let name = string_argument(call, 0)?;
    Ok(Some(Object::String(
        std::env::var(name).unwrap_or_default(),
    )))
}

/// The module's export table
pub const EXPORTS: &[(&str, ForeignFunction)] = &[("os::system", system), ("os::getenv", getenv)];
