//! Codegen error types.
//!
//! Per-type problems are not errors here: they are collected in the
//! [`crate::SynthesisReport`] failure log. These variants stop the whole run.

/// Errors that abort a synthesis run.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// Inconsistent [`crate::SynthOptions`].
    #[error("invalid options: {0}")]
    Options(String),

    /// The bounded worker pool could not be created.
    #[error("worker pool: {0}")]
    WorkerPool(String),
}
