//! Runtime error types for the reference evaluator.
//!
//! A [`RuntimeError`] means the evaluator could not run a definition (a
//! missing function, a value of the wrong shape). A value that merely fails
//! validation is not an error; it is a [`ValidationFailure`].

use std::fmt;

use serde::{Deserialize, Serialize};

use typesynth_core::id::QualifiedName;

use crate::defs::FunctionKind;

/// Errors produced while evaluating definitions.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum RuntimeError {
    #[error("no {kind} function for '{name}'")]
    FunctionNotFound {
        name: QualifiedName,
        kind: FunctionKind,
    },

    #[error("no host {kind} method registered for '{name}'")]
    HostNotRegistered { name: QualifiedName, kind: String },

    #[error("host method of '{name}' failed: {message}")]
    Host { name: QualifiedName, message: String },

    #[error("no callback bound for type parameter '{param}'")]
    MissingCallback { param: String },

    #[error("dangling address {addr}, heap size {size}")]
    DanglingAddress { addr: usize, size: usize },

    #[error("type mismatch at runtime: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("missing field '{field}'")]
    MissingField { field: String },

    #[error("value cannot be projected: {reason}")]
    Projection { reason: String },

    #[error("unknown type '{name}'")]
    UnknownType { name: QualifiedName },

    #[error("recursion depth limit ({limit}) exceeded")]
    RecursionLimitExceeded { limit: usize },
}

/// First failed check of a validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Path relative to the validated value; empty for the value itself.
    pub path: String,
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Re-roots the failure under `prefix`.
    pub fn prefixed(self, prefix: &str) -> Self {
        ValidationFailure {
            path: join_path(prefix, &self.path),
            reason: self.reason,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

/// Joins path segments: `A` + `X` is `A.X`, `B` + `[2]` is `B[2]`.
pub fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else if segment.is_empty() {
        prefix.to_string()
    } else if segment.starts_with('[') {
        format!("{}{}", prefix, segment)
    } else {
        format!("{}.{}", prefix, segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_join_with_dots_and_brackets() {
        assert_eq!(join_path("", "A"), "A");
        assert_eq!(join_path("B", "[2]"), "B[2]");
        assert_eq!(join_path("Inner", "X"), "Inner.X");
        assert_eq!(join_path("M", ""), "M");
        let f = ValidationFailure::new("X", "state und not allowed").prefixed("Inner");
        assert_eq!(f.to_string(), "Inner.X: state und not allowed");
    }
}
