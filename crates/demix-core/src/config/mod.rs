//! Separation configuration types
//!
//! The numbers in [`ModelGeometry`] are shared with the trained model: the
//! preprocessing below must reproduce exactly what the network saw during
//! training. Change one only together with a matching model.
//!
//! ```ignore
//! use demix_core::config::{load_config, SeparationConfig};
//!
//! let config: SeparationConfig = load_config(&path);
//! ```

mod io;

pub use io::{load_config, save_config};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeparationError};

/// Upper bound for concurrently running inference calls
pub const MAX_IN_FLIGHT_LIMIT: usize = 8;

/// Frame offset that skips the reflect-padding frames added during preparation
pub const FRAME_OFFSET: usize = 2;

/// Numeric preprocessing contract between the pipeline and the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelGeometry {
    /// Sample rate the model was trained at
    pub sample_rate: u32,
    /// STFT frame size (power of two)
    pub fft_size: usize,
    /// STFT hop size
    pub hop_size: usize,
    /// Segment length in samples the model was trained on
    pub training_samples: usize,
    /// Spectrogram bins fed to the model (Nyquist bin dropped)
    pub spec_bins: usize,
    /// Spectrogram frames fed to the model
    pub spec_frames: usize,
    /// Fraction of each segment shared with its neighbour
    pub segment_overlap: f32,
}

impl ModelGeometry {
    /// Hybrid Transformer Demucs (htdemucs) export
    pub const HTDEMUCS: Self = Self {
        sample_rate: 44100,
        fft_size: 4096,
        hop_size: 1024,
        training_samples: 343_980,
        spec_bins: 2048,
        spec_frames: 336,
        segment_overlap: 0.25,
    };

    /// Reflect padding applied before centering: `floor(hop / 2) * 3`
    pub fn pad(&self) -> usize {
        (self.hop_size / 2) * 3
    }

    /// Centering pad of the short-time transform
    pub fn center_pad(&self) -> usize {
        self.fft_size / 2
    }

    /// Distance between segment starts
    pub fn stride(&self) -> usize {
        (self.training_samples as f64 * (1.0 - self.segment_overlap as f64)).floor() as usize
    }

    /// Segment length in seconds
    pub fn segment_secs(&self) -> f64 {
        self.training_samples as f64 / self.sample_rate as f64
    }

    /// Check that the numbers describe a consistent preprocessing chain
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SeparationError::InvalidConfig(msg));

        if self.sample_rate == 0 {
            return fail("sample_rate must be positive".into());
        }
        if self.fft_size < 4 || !self.fft_size.is_power_of_two() {
            return fail(format!("fft_size {} is not a power of two >= 4", self.fft_size));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size / 2 {
            return fail(format!(
                "hop_size {} must be in 1..={}",
                self.hop_size,
                self.fft_size / 2
            ));
        }
        if self.spec_bins != self.fft_size / 2 {
            return fail(format!(
                "spec_bins {} must equal fft_size / 2 = {}",
                self.spec_bins,
                self.fft_size / 2
            ));
        }
        if self.training_samples == 0 {
            return fail("training_samples must be positive".into());
        }
        let expected_frames = self.training_samples.div_ceil(self.hop_size);
        if self.spec_frames != expected_frames {
            return fail(format!(
                "spec_frames {} must equal ceil(training_samples / hop_size) = {}",
                self.spec_frames, expected_frames
            ));
        }
        if !(0.0..1.0).contains(&self.segment_overlap) {
            return fail(format!(
                "segment_overlap {} must be in [0, 1)",
                self.segment_overlap
            ));
        }
        if self.stride() == 0 {
            return fail("segment_overlap leaves a zero stride".into());
        }
        Ok(())
    }
}

impl Default for ModelGeometry {
    fn default() -> Self {
        Self::HTDEMUCS
    }
}

/// Configuration for a separation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Preprocessing contract of the loaded model
    pub geometry: ModelGeometry,

    /// Output stem names in model output order
    pub tracks: Vec<String>,

    /// Number of segments whose inference may be in flight at once
    ///
    /// Only the engine call overlaps; tensor packing stays on the driver's task.
    pub max_in_flight: usize,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            geometry: ModelGeometry::HTDEMUCS,
            // htdemucs order: drums=0, bass=1, other=2, vocals=3
            tracks: ["drums", "bass", "other", "vocals"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_in_flight: 1,
        }
    }
}

impl SeparationConfig {
    /// Validate configuration values
    ///
    /// Clamps `max_in_flight` to a usable range and rejects inconsistent
    /// geometry or an empty track list.
    pub fn validate(&mut self) -> Result<()> {
        self.max_in_flight = self.max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT);
        self.geometry.validate()?;
        if self.tracks.is_empty() {
            return Err(SeparationError::InvalidConfig(
                "at least one output track is required".into(),
            ));
        }
        Ok(())
    }

    /// Number of output stems
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
