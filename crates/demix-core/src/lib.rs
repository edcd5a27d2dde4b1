//! Segmented music source separation
//!
//! Splits a stereo recording into overlapping fixed-length segments, packs
//! each one into the waveform and spectrogram tensors a hybrid
//! time/frequency separation model (htdemucs) expects, runs the model through
//! an [`InferenceEngine`] and crossfades the per-track outputs back into
//! full-length stems.
//!
//! The model itself is not part of this crate. `demix-ort` provides an ONNX
//! Runtime engine; tests and other runtimes implement the trait directly.

pub mod audio;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod packing;
pub mod transform;

pub use audio::{Stem, StemData, StereoBuffer};
pub use config::{load_config, save_config, ModelGeometry, SeparationConfig};
pub use driver::{ProgressCallback, SeparationProgress, Separator};
pub use engine::{
    InferenceEngine, ModelInput, ModelOutput, ModelSignature, NamedTensors, OutputBinding, Tensor,
};
pub use error::{Result, SeparationError};
