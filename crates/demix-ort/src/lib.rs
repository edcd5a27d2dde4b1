//! ONNX Runtime backend for demix-core
//!
//! [`OrtEngine`] implements [`demix_core::InferenceEngine`] on top of the
//! `ort` crate. Sessions run on tokio's blocking pool; a session is shared
//! behind a mutex, so concurrent segments queue for it.
//!
//! ```ignore
//! let mut engine = OrtEngine::new(OrtConfig::default());
//! engine.load_model_from_file("htdemucs.onnx")?;
//! let separator = Separator::new(engine, SeparationConfig::default())?;
//! ```

mod config;
mod engine;

pub use config::{OptimizationLevel, OrtConfig};
pub use engine::OrtEngine;
