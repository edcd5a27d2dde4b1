//! Separation error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during stem separation
///
/// Configuration and contract errors abort a run immediately. Degenerate
/// numeric conditions (near-zero overlap-add weights) are never reported here,
/// they are handled in place by the transform and the driver.
#[derive(Error, Debug)]
pub enum SeparationError {
    // Configuration
    #[error("Inference engine not ready: load a model before separating")]
    EngineNotLoaded,

    #[error("Model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Backend initialization failed: {0}")]
    BackendInitFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Model contract
    #[error("Model output missing: {0}")]
    MissingOutput(String),

    #[error("Ambiguous model output: {first} and {second} both match the {branch} pattern")]
    AmbiguousOutput {
        branch: &'static str,
        first: String,
        second: String,
    },

    #[error("Unexpected shape for {name}: expected {expected}, got {got:?}")]
    UnexpectedShape {
        name: String,
        expected: String,
        got: Vec<usize>,
    },

    // Caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Runtime
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeparationError {
    /// True for errors caused by the model not honouring the tensor contract
    pub fn is_contract_error(&self) -> bool {
        matches!(
            self,
            Self::MissingOutput(_) | Self::AmbiguousOutput { .. } | Self::UnexpectedShape { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SeparationError>;
