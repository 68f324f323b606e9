//! Code synthesis for typesynth.
//!
//! This crate turns classified type plans into structured definitions for
//! four families of transformations and hands them to an [`Emitter`].
//!
//! # Modules
//!
//! - [`defs`] -- Definition model and the emitter sink
//! - [`clone`] -- Deep-copy functions
//! - [`plain`] -- Plain companion types and projections
//! - [`patch`] -- Sparse-update companion types and their operations
//! - [`validator`] -- Constraint checking functions
//! - [`synth`] -- The synthesis pipeline
//! - [`runtime`] -- Reference evaluator for emitted definitions

pub mod clone;
pub mod defs;
pub mod error;
pub mod patch;
pub mod plain;
pub mod runtime;
pub mod synth;
pub mod validator;

pub use defs::{Definition, Emitter, FunctionDef, FunctionKind, Item, Signature, TypeDecl, VecEmitter};
pub use error::CodegenError;
pub use synth::{synthesize, SkipReason, Skipped, SynthesisReport};

use std::fmt;

use serde::{Deserialize, Serialize};

/// A family of synthesized transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Clone,
    Plain,
    Patch,
    Validator,
}

impl Family {
    pub const ALL: [Family; 4] = [Family::Clone, Family::Plain, Family::Patch, Family::Validator];
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Family::Clone => "clone",
            Family::Plain => "plain",
            Family::Patch => "patch",
            Family::Validator => "validator",
        };
        f.write_str(s)
    }
}

/// Options controlling the synthesis pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthOptions {
    /// Families to synthesize, emitted in this order per type.
    pub families: Vec<Family>,

    /// Worker threads for per-unit synthesis.
    /// `0` means one per available CPU.
    pub workers: usize,

    /// Suffix of plain companion type names.
    pub plain_suffix: String,

    /// Suffix of patch companion type names.
    pub patch_suffix: String,
}

impl Default for SynthOptions {
    fn default() -> Self {
        SynthOptions {
            families: Family::ALL.to_vec(),
            workers: 0,
            plain_suffix: "Plain".to_string(),
            patch_suffix: "Patch".to_string(),
        }
    }
}

impl SynthOptions {
    pub fn enabled(&self, family: Family) -> bool {
        self.families.contains(&family)
    }

    /// Resolved worker count, at least one.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Rejects option sets that would produce clashing names.
    pub fn validate(&self) -> Result<(), CodegenError> {
        if self.plain_suffix.is_empty() || self.patch_suffix.is_empty() {
            return Err(CodegenError::Options(
                "companion suffixes must not be empty".into(),
            ));
        }
        for (i, family) in self.families.iter().enumerate() {
            if self.families[..i].contains(family) {
                return Err(CodegenError::Options(format!(
                    "family '{}' is listed more than once",
                    family
                )));
            }
        }
        if self.plain_suffix == self.patch_suffix {
            return Err(CodegenError::Options(format!(
                "plain and patch suffix are both '{}'",
                self.plain_suffix
            )));
        }
        Ok(())
    }
}
