//! Session options for the ONNX Runtime engine

use demix_core::ModelSignature;
use ort::session::builder::GraphOptimizationLevel;
use serde::{Deserialize, Serialize};

/// Graph optimization applied when building a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    Disable,
    Basic,
    Extended,
    #[default]
    All,
}

impl From<OptimizationLevel> for GraphOptimizationLevel {
    fn from(level: OptimizationLevel) -> Self {
        match level {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
            OptimizationLevel::All => GraphOptimizationLevel::Level3,
        }
    }
}

/// Configuration for [`OrtEngine`](crate::OrtEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrtConfig {
    pub optimization: OptimizationLevel,

    /// Intra-op threads, 0 lets ONNX Runtime decide
    pub intra_threads: usize,

    /// Try compiled-in GPU execution providers before the CPU
    pub use_gpu: bool,

    /// Input/output names of the exported model
    pub signature: ModelSignature,
}

impl Default for OrtConfig {
    fn default() -> Self {
        Self {
            optimization: OptimizationLevel::All,
            intra_threads: 0,
            use_gpu: true, // Try GPU, fall back to CPU
            signature: ModelSignature::default(),
        }
    }
}

impl OrtConfig {
    /// Name shown in logs for the configured execution target
    pub fn provider_name(&self) -> &'static str {
        if !self.use_gpu {
            return "CPU";
        }
        if cfg!(feature = "cuda") {
            "CUDA"
        } else if cfg!(feature = "directml") {
            "DirectML"
        } else {
            "CPU"
        }
    }
}
