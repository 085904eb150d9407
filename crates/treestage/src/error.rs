//! Typed errors surfaced by the staging core.

use thiserror::Error;

use crate::tensor::TensorSpec;

pub type StageResult<T> = Result<T, StageError>;

/// Staging error surfaced to callers. All variants are synchronous and
/// deterministic; retrying an operation reproduces the same error.
#[derive(Debug, Error)]
pub enum StageError {
    /// A field held a host value the structural classification cannot stage.
    #[error("field '{path}' holds an unsupported host value of type {type_name}")]
    UnsupportedField { path: String, type_name: String },

    /// A leaf-value collection does not have one entry per canonical leaf.
    #[error("leaf values length mismatch: expected {expected}, got {got}")]
    LeafCountMismatch { expected: usize, got: usize },

    /// A leaf value disagrees with the structural spec recorded for its slot.
    #[error("leaf '{path}' expects {expected:?}, got {got:?}")]
    LeafSpecMismatch {
        path: String,
        expected: TensorSpec,
        got: TensorSpec,
    },

    /// A graph definition failed structural validation, e.g. after
    /// deserializing bytes that were never produced by `split`.
    #[error("malformed graph definition: {reason}")]
    MalformedDef { reason: String },

    /// A key was pulled from an RNG stream that was never seeded.
    #[error("rng stream '{name}' has no seeded key")]
    UnseededStream { name: String },
}
