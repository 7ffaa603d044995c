//! Object model: the tagged sum of all value variants
//!
//! The machine treats objects opaquely through the capability set
//! (`type_name`, `Display`, `repr`, `to_bool`, `deep_copy`); typed opcode
//! handlers narrow by pattern-matching on the variant.

use crate::registers::RegisterSet;
use crate::{VmError, VmResult};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A runtime value
#[derive(Debug, Clone)]
pub enum Object {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit IEEE-754 float
    Float(f64),
    /// Unsigned 8-bit byte
    Byte(u8),
    /// Boolean
    Boolean(bool),
    /// UTF-8 string
    String(String),
    /// Ordered sequence of objects (tree-owned)
    Vector(Vec<Object>),
    /// A function name bound to a captured register set
    Closure(Closure),
    /// An exception: type tag plus message
    Exception(ExceptionObject),
}

impl Object {
    /// The type name used by typed handlers and catcher matching
    pub fn type_name(&self) -> &str {
        match self {
            Object::Integer(_) => "Integer",
            Object::Float(_) => "Float",
            Object::Byte(_) => "Byte",
            Object::Boolean(_) => "Boolean",
            Object::String(_) => "String",
            Object::Vector(_) => "Vector",
            Object::Closure(_) => "Closure",
            Object::Exception(e) => e.tag(),
        }
    }

    /// Source-style representation (strings are quoted)
    pub fn repr(&self) -> String {
        match self {
            Object::String(s) => format!("{:?}", s),
            Object::Vector(items) => {
                let inner: Vec<String> = items.iter().map(Object::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            other => other.to_string(),
        }
    }

    /// Boolean projection, used by `branch`, `not`, `and`, `or`
    pub fn to_bool(&self) -> bool {
        match self {
            Object::Integer(i) => *i != 0,
            Object::Float(f) => *f != 0.0,
            Object::Byte(b) => *b != 0,
            Object::Boolean(b) => *b,
            Object::String(s) => !s.is_empty(),
            Object::Vector(items) => !items.is_empty(),
            Object::Closure(_) => true,
            Object::Exception(_) => true,
        }
    }

    /// A true clone for every variant except Closure, whose captured
    /// register set stays shared with the creator.
    pub fn deep_copy(&self) -> Object {
        // Vector elements are tree-owned plain objects, so the derived
        // clone is already deep. Closure's Rc clone is the documented
        // shared-capture semantic.
        self.clone()
    }

    /// Narrow to Integer
    pub fn as_integer(&self) -> VmResult<i64> {
        match self {
            Object::Integer(i) => Ok(*i),
            other => Err(type_mismatch("Integer", other)),
        }
    }

    /// Narrow to Float
    pub fn as_float(&self) -> VmResult<f64> {
        match self {
            Object::Float(f) => Ok(*f),
            other => Err(type_mismatch("Float", other)),
        }
    }

    /// Narrow to Byte
    pub fn as_byte(&self) -> VmResult<u8> {
        match self {
            Object::Byte(b) => Ok(*b),
            other => Err(type_mismatch("Byte", other)),
        }
    }

    /// Narrow to a Vector view
    pub fn as_vector(&self) -> VmResult<&Vec<Object>> {
        match self {
            Object::Vector(items) => Ok(items),
            other => Err(type_mismatch("Vector", other)),
        }
    }

    /// Narrow to a mutable Vector view
    pub fn as_vector_mut(&mut self) -> VmResult<&mut Vec<Object>> {
        match self {
            Object::Vector(items) => Ok(items),
            other => Err(type_mismatch("Vector", other)),
        }
    }
}

fn type_mismatch(expected: &'static str, found: &Object) -> VmError {
    VmError::TypeMismatch {
        expected,
        found: found.type_name().to_string(),
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(i) => write!(f, "{}", i),
            Object::Float(v) => write!(f, "{}", v),
            Object::Byte(b) => write!(f, "{}", b),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::String(s) => f.write_str(s),
            Object::Vector(items) => {
                let inner: Vec<String> = items.iter().map(Object::repr).collect();
                write!(f, "[{}]", inner.join(", "))
            }
            Object::Closure(c) => write!(f, "Closure: {}", c.function_name),
            Object::Exception(e) => f.write_str(e.message()),
        }
    }
}

/// A captured register set bound to a function name
///
/// The capture is shared, not copied: the closure's registers keep aliasing
/// the creator's registers (through the arena) for as long as the creator
/// keeps them alive, and `deep_copy` of a Closure shares the same capture.
#[derive(Debug, Clone)]
pub struct Closure {
    /// Name of the function the closure enters when called
    pub function_name: String,
    /// The captured register set
    pub registers: Rc<RefCell<RegisterSet>>,
}

impl Closure {
    /// Bind `function_name` to a captured register set
    pub fn new(function_name: impl Into<String>, registers: RegisterSet) -> Self {
        Self {
            function_name: function_name.into(),
            registers: Rc::new(RefCell::new(registers)),
        }
    }
}

/// An exception value: a type tag catchers match on, plus a message
#[derive(Debug, Clone)]
pub struct ExceptionObject {
    tag: String,
    message: String,
}

impl ExceptionObject {
    /// A plain exception with the default tag
    pub fn new(message: impl Into<String>) -> Self {
        Self::tagged("Exception", message)
    }

    /// An exception with an explicit type tag
    pub fn tagged(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// The type tag catchers match on
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Object::Integer(1).type_name(), "Integer");
        assert_eq!(Object::Float(0.5).type_name(), "Float");
        assert_eq!(Object::Byte(7).type_name(), "Byte");
        assert_eq!(Object::Boolean(true).type_name(), "Boolean");
        assert_eq!(Object::String("x".into()).type_name(), "String");
        assert_eq!(Object::Vector(vec![]).type_name(), "Vector");
        assert_eq!(
            Object::Exception(ExceptionObject::new("boom")).type_name(),
            "Exception"
        );
        assert_eq!(
            Object::Exception(ExceptionObject::tagged("OsError", "boom")).type_name(),
            "OsError"
        );
    }

    #[test]
    fn test_boolean_projection() {
        assert!(Object::Integer(-3).to_bool());
        assert!(!Object::Integer(0).to_bool());
        assert!(!Object::Float(0.0).to_bool());
        assert!(Object::Float(0.1).to_bool());
        assert!(!Object::String(String::new()).to_bool());
        assert!(Object::String("x".into()).to_bool());
        assert!(!Object::Vector(vec![]).to_bool());
        assert!(Object::Vector(vec![Object::Integer(1)]).to_bool());
    }

    #[test]
    fn test_display_and_repr() {
        assert_eq!(Object::Integer(42).to_string(), "42");
        assert_eq!(Object::Boolean(true).to_string(), "true");
        assert_eq!(Object::String("hi".into()).to_string(), "hi");
        assert_eq!(Object::String("hi".into()).repr(), "\"hi\"");
        let v = Object::Vector(vec![Object::Integer(1), Object::String("a".into())]);
        assert_eq!(v.to_string(), "[1, \"a\"]");
    }

    #[test]
    fn test_deep_copy_vector_is_independent() {
        let original = Object::Vector(vec![Object::Integer(1)]);
        let mut copied = original.deep_copy();
        copied.as_vector_mut().unwrap().push(Object::Integer(2));
        assert_eq!(original.as_vector().unwrap().len(), 1);
        assert_eq!(copied.as_vector().unwrap().len(), 2);
    }

    #[test]
    fn test_closure_copy_shares_capture() {
        let closure = Closure::new("adder", RegisterSet::new(4));
        let object = Object::Closure(closure);
        let copied = object.deep_copy();
        match (&object, &copied) {
            (Object::Closure(a), Object::Closure(b)) => {
                assert!(Rc::ptr_eq(&a.registers, &b.registers));
                assert_eq!(a.function_name, b.function_name);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_narrowing_errors() {
        let err = Object::String("x".into()).as_integer().unwrap_err();
        assert!(matches!(err, VmError::TypeMismatch { expected: "Integer", .. }));
    }
}
