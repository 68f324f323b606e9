//! Core error types for typesynth-core.
//!
//! [`CoreError`] covers universe construction (duplicate names, package
//! loading). [`SynthError`] is the per-root-type diagnostic shared by every
//! pipeline stage; [`FailureLog`] collects them per root so unrelated types
//! keep synthesizing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directive::AnnotationError;
use crate::id::{FieldPath, QualifiedName};
use crate::types::{Capability, Presence, WrapperKind};

/// Errors produced while assembling a universe.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two entries share a qualified name.
    #[error("duplicate type name: '{name}'")]
    DuplicateType { name: QualifiedName },

    /// A package loader failed.
    #[error("failed to load package '{package}': {reason}")]
    PackageLoad { package: String, reason: String },

    /// The bounded worker pool could not be created.
    #[error("worker pool: {reason}")]
    WorkerPool { reason: String },
}

/// Which stage of the taxonomy a [`SynthError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Resolution,
    Structural,
    Annotation,
    Classification,
    Generation,
}

/// A fatal diagnostic for one root type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum SynthError {
    /// A referenced type is not declared in the universe.
    #[error("unresolved type '{type_name}' at {path}")]
    UnresolvedType { type_name: String, path: FieldPath },

    /// Aliases that resolve to each other.
    #[error("alias cycle through '{name}'")]
    AliasCycle { name: QualifiedName },

    /// Records embedding each other by value with no indirection.
    #[error(
        "direct self-reference without indirection: {}",
        .members.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" -> ")
    )]
    DirectCycle { members: Vec<QualifiedName> },

    /// A malformed or inconsistent directive.
    #[error("invalid directive at {path}: {reason}")]
    Annotation {
        path: FieldPath,
        reason: AnnotationError,
    },

    /// A field type matches no synthesis strategy.
    #[error("no synthesis strategy for {path}: {detail}")]
    NoStrategy { path: FieldPath, detail: String },

    /// A field requires a capability its type does not declare.
    #[error("{path}: type '{type_name}' declares no {capability} method")]
    MissingCapability {
        path: FieldPath,
        type_name: String,
        capability: Capability,
    },

    /// A field depends on a type that failed earlier.
    #[error("{path}: depends on failed type '{dependency}'")]
    DependencyFailed {
        path: FieldPath,
        dependency: QualifiedName,
    },

    /// A constraint names a state its wrapper cannot represent.
    #[error("{path}: state '{state}' is outside the range of {wrapper}")]
    StateOutOfRange {
        path: FieldPath,
        state: Presence,
        wrapper: WrapperKind,
    },
}

impl SynthError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SynthError::UnresolvedType { .. } | SynthError::AliasCycle { .. } => {
                ErrorCategory::Resolution
            }
            SynthError::DirectCycle { .. } => ErrorCategory::Structural,
            SynthError::Annotation { .. } => ErrorCategory::Annotation,
            SynthError::NoStrategy { .. }
            | SynthError::MissingCapability { .. }
            | SynthError::DependencyFailed { .. } => ErrorCategory::Classification,
            SynthError::StateOutOfRange { .. } => ErrorCategory::Generation,
        }
    }
}

/// Diagnostics collected per root type.
///
/// Serialized as a list of `{root, errors}` entries in root order, since
/// JSON object keys cannot carry a qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<FailureEntry>", from = "Vec<FailureEntry>")]
pub struct FailureLog {
    failures: BTreeMap<QualifiedName, Vec<SynthError>>,
}

/// One serialized [`FailureLog`] entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub root: QualifiedName,
    pub errors: Vec<SynthError>,
}

impl From<FailureLog> for Vec<FailureEntry> {
    fn from(log: FailureLog) -> Self {
        log.failures
            .into_iter()
            .map(|(root, errors)| FailureEntry { root, errors })
            .collect()
    }
}

impl From<Vec<FailureEntry>> for FailureLog {
    fn from(entries: Vec<FailureEntry>) -> Self {
        let mut log = FailureLog::new();
        for entry in entries {
            log.failures.entry(entry.root).or_default().extend(entry.errors);
        }
        log
    }
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, root: QualifiedName, error: SynthError) {
        self.failures.entry(root).or_default().push(error);
    }

    pub fn contains(&self, root: &QualifiedName) -> bool {
        self.failures.contains_key(root)
    }

    pub fn get(&self, root: &QualifiedName) -> Option<&[SynthError]> {
        self.failures.get(root).map(|v| v.as_slice())
    }

    pub fn merge(&mut self, other: FailureLog) {
        for (root, errors) in other.failures {
            self.failures.entry(root).or_default().extend(errors);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QualifiedName, &Vec<SynthError>)> {
        self.failures.iter()
    }

    /// Number of failed root types.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_cycle_message_lists_members() {
        let err = SynthError::DirectCycle {
            members: vec![QualifiedName::new("m", "A"), QualifiedName::new("m", "B")],
        };
        assert_eq!(
            err.to_string(),
            "direct self-reference without indirection: m.A -> m.B"
        );
        assert_eq!(err.category(), ErrorCategory::Structural);
    }

    #[test]
    fn failure_log_groups_by_root() {
        let mut log = FailureLog::new();
        let a = QualifiedName::new("m", "A");
        log.record(
            a.clone(),
            SynthError::UnresolvedType {
                type_name: "m.X".into(),
                path: FieldPath::root(&a).child("x"),
            },
        );
        log.record(
            a.clone(),
            SynthError::NoStrategy {
                path: FieldPath::root(&a).child("f"),
                detail: "opaque(func())".into(),
            },
        );
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(&a).unwrap().len(), 2);
        assert!(!log.contains(&QualifiedName::new("m", "B")));
    }

    #[test]
    fn failure_log_serializes_as_json_entries() {
        let mut log = FailureLog::new();
        let a = QualifiedName::new("m", "A");
        log.record(
            a.clone(),
            SynthError::DirectCycle {
                members: vec![a.clone()],
            },
        );
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json[0]["root"]["name"], "A");
        let back: FailureLog = serde_json::from_value(json).unwrap();
        assert_eq!(back, log);
    }
}
