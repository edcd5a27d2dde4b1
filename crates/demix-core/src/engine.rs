//! Inference engine contract
//!
//! The neural network lives behind [`InferenceEngine`]. An engine receives the
//! packed [`ModelInput`] for one segment and returns every output tensor under
//! its name. The driver then turns those into a tagged [`ModelOutput`] using
//! the [`ModelSignature`] the engine declares, so a model variant that happens
//! to emit two tensors of the same rank cannot silently swap branches.
//!
//! ```ignore
//! impl InferenceEngine for MyEngine {
//!     fn name(&self) -> &str { "my-engine" }
//!     fn signature(&self) -> &ModelSignature { &self.signature }
//!     async fn infer(&self, input: ModelInput) -> Result<NamedTensors> {
//!         // run the network on input.waveform / input.spectrogram
//!     }
//! }
//! ```

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::config::ModelGeometry;
use crate::error::{Result, SeparationError};
pub use crate::packing::ModelInput;

/// Dense row-major `f32` tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that `data` fills `shape` exactly
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(SeparationError::InvalidInput(format!(
                "tensor shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Output tensors of one inference call, keyed by output name
pub type NamedTensors = Vec<(String, Tensor)>;

/// How one output branch is located among an engine's named outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputBinding {
    /// The branch is the output with this name
    Named(String),
    /// The branch is the single output matching the branch's shape pattern
    MatchShape,
    /// The model does not produce this branch
    Absent,
}

/// Declared input/output names of a separation model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSignature {
    /// Input receiving the `[1, 2, samples]` waveform
    pub waveform_input: String,
    /// Input receiving the `[1, 4, bins, frames]` spectrogram, if the model takes one
    pub spectrogram_input: Option<String>,
    /// Time-domain branch `[1, tracks, 2, samples]`
    pub time_output: OutputBinding,
    /// Frequency-domain branch `[1, tracks, 4, bins, frames]`
    pub frequency_output: OutputBinding,
}

impl Default for ModelSignature {
    fn default() -> Self {
        Self {
            waveform_input: "input".to_string(),
            spectrogram_input: Some("x".to_string()),
            time_output: OutputBinding::MatchShape,
            frequency_output: OutputBinding::MatchShape,
        }
    }
}

impl ModelSignature {
    /// Reject signatures that can never yield a time-domain branch
    pub fn validate(&self) -> Result<()> {
        if self.waveform_input.is_empty() {
            return Err(SeparationError::InvalidConfig(
                "waveform input name is empty".into(),
            ));
        }
        if self.time_output == OutputBinding::Absent {
            return Err(SeparationError::InvalidConfig(
                "the time-domain output branch is mandatory".into(),
            ));
        }
        Ok(())
    }
}

/// Branch of the model output, with the shape pattern that identifies it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Time,
    Frequency,
}

impl Branch {
    fn label(self) -> &'static str {
        match self {
            Self::Time => "time-domain",
            Self::Frequency => "frequency-domain",
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            Self::Time => "[1, tracks, 2, samples]",
            Self::Frequency => "[1, tracks, 4, bins, frames]",
        }
    }

    /// Rank and channel-axis size of the branch (channel axis is index 2)
    fn matches(self, shape: &[usize]) -> bool {
        match self {
            Self::Time => shape.len() == 4 && shape[2] == 2,
            Self::Frequency => shape.len() == 5 && shape[2] == 4,
        }
    }
}

/// The two model output branches of one segment
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// `[1, tracks, 2, samples]`
    pub time_domain: Tensor,
    /// `[1, tracks, 4, bins, frames]`, when the model produces it
    pub frequency_domain: Option<Tensor>,
}

impl ModelOutput {
    /// Pick both branches out of an engine's named outputs
    ///
    /// # Errors
    /// - `MissingOutput` when the time-domain branch (or a frequency branch the
    ///   signature names explicitly) is not among the outputs
    /// - `AmbiguousOutput` when shape matching finds more than one candidate
    /// - `UnexpectedShape` when a named output does not fit its branch pattern
    pub fn select(mut outputs: NamedTensors, signature: &ModelSignature) -> Result<Self> {
        let time_domain = take_branch(&mut outputs, &signature.time_output, Branch::Time)?
            .ok_or_else(|| SeparationError::MissingOutput("time-domain output branch".into()))?;
        let frequency_domain =
            take_branch(&mut outputs, &signature.frequency_output, Branch::Frequency)?;

        if !outputs.is_empty() {
            let ignored: Vec<&str> = outputs.iter().map(|(name, _)| name.as_str()).collect();
            log::debug!("Ignoring unused model outputs: {:?}", ignored);
        }

        Ok(Self {
            time_domain,
            frequency_domain,
        })
    }

    /// Number of tracks in the time-domain branch
    pub fn track_count(&self) -> usize {
        self.time_domain.shape()[1]
    }

    /// Samples per channel in the time-domain branch
    pub fn samples(&self) -> usize {
        self.time_domain.shape()[3]
    }
}

fn take_branch(
    outputs: &mut NamedTensors,
    binding: &OutputBinding,
    branch: Branch,
) -> Result<Option<Tensor>> {
    let position = match binding {
        OutputBinding::Absent => return Ok(None),
        OutputBinding::Named(name) => {
            let position = outputs.iter().position(|(n, _)| n == name).ok_or_else(|| {
                SeparationError::MissingOutput(format!("{} output '{}'", branch.label(), name))
            })?;
            let shape = outputs[position].1.shape();
            if !branch.matches(shape) {
                return Err(SeparationError::UnexpectedShape {
                    name: name.clone(),
                    expected: branch.pattern().to_string(),
                    got: shape.to_vec(),
                });
            }
            position
        }
        OutputBinding::MatchShape => {
            let mut candidates = outputs
                .iter()
                .enumerate()
                .filter(|(_, (_, tensor))| branch.matches(tensor.shape()));
            let Some((position, (first, _))) = candidates.next() else {
                return Ok(None);
            };
            if let Some((_, (second, _))) = candidates.next() {
                return Err(SeparationError::AmbiguousOutput {
                    branch: branch.label(),
                    first: first.clone(),
                    second: second.clone(),
                });
            }
            position
        }
    };

    Ok(Some(outputs.remove(position).1))
}

impl ModelGeometry {
    /// Shape of the waveform input tensor
    pub fn waveform_shape(&self) -> [usize; 3] {
        [1, 2, self.training_samples]
    }

    /// Shape of the spectrogram input tensor
    pub fn spectrogram_shape(&self) -> [usize; 4] {
        [1, 4, self.spec_bins, self.spec_frames]
    }
}

/// A loaded separation model
///
/// `infer` is the only suspension point of a separation run. The driver may
/// keep several calls in flight when `max_in_flight > 1`, so implementations
/// must tolerate concurrent calls (serializing internally is fine).
pub trait InferenceEngine: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Declared input/output names
    fn signature(&self) -> &ModelSignature;

    /// Whether a model is loaded and `infer` can be called
    fn is_ready(&self) -> bool {
        true
    }

    /// Run the model on one segment
    fn infer(&self, input: ModelInput) -> impl Future<Output = Result<NamedTensors>> + Send;
}
