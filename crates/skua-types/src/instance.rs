//! Runtime object handles
//!
//! Literal expressions embed runtime objects into constant computations.
//! The flow-graph builder treats these as opaque operands; only the type
//! system looks inside (to classify a literal for compile-time
//! instance-of decisions).

use crate::types::TypeArguments;

/// An opaque handle to a runtime object
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    Null,
    Bool(bool),
    /// Small integer.
    Smi(i64),
    Double(f64),
    Str(String),
    /// A type-argument vector reified as a runtime object, as embedded by
    /// the instantiated-type-arguments path.
    TypeArgs(TypeArguments),
}

impl Instance {
    pub fn is_null(&self) -> bool {
        matches!(self, Instance::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Instance::Str(s.into())
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instance::Null => write!(f, "null"),
            Instance::Bool(b) => write!(f, "{}", b),
            Instance::Smi(v) => write!(f, "{}", v),
            Instance::Double(v) => write!(f, "{}", v),
            Instance::Str(s) => write!(f, "\"{}\"", s.escape_default()),
            Instance::TypeArgs(args) => write!(f, "<{}>", args),
        }
    }
}
