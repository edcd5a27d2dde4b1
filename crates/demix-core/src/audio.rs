//! Audio containers for separation input and output

use crate::error::{Result, SeparationError};

/// Planar stereo audio at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    pub sample_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    /// Create a buffer from two channels of equal length
    pub fn new(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if left.len() != right.len() {
            return Err(SeparationError::InvalidInput(format!(
                "channel lengths differ: left {} vs right {}",
                left.len(),
                right.len()
            )));
        }
        Ok(Self {
            sample_rate,
            left,
            right,
        })
    }

    /// Silent buffer of `len` samples per channel
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    /// Deinterleave `samples` with `channels` channels into stereo
    ///
    /// Mono is duplicated to both sides; extra channels beyond the first two
    /// are dropped.
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Self> {
        let channels = channels as usize;
        if channels == 0 {
            return Err(SeparationError::InvalidInput("zero channels".into()));
        }
        if samples.len() % channels != 0 {
            return Err(SeparationError::InvalidInput(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }

        let frames = samples.len() / channels;
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for frame in samples.chunks_exact(channels) {
            left.push(frame[0]);
            right.push(if channels > 1 { frame[1] } else { frame[0] });
        }

        Ok(Self {
            sample_rate,
            left,
            right,
        })
    }

    /// Interleaved `[L, R, L, R, ...]` copy
    pub fn to_interleaved(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| [l, r])
            .collect()
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }
}

/// One separated stem
#[derive(Debug, Clone, PartialEq)]
pub struct Stem {
    pub name: String,
    pub audio: StereoBuffer,
}

/// Separated stems, in model output order, all the length of the input
#[derive(Debug, Clone, PartialEq)]
pub struct StemData {
    pub sample_rate: u32,
    pub stems: Vec<Stem>,
}

impl StemData {
    /// Look up a stem by name
    pub fn get(&self, name: &str) -> Option<&StereoBuffer> {
        self.stems.iter().find(|s| s.name == name).map(|s| &s.audio)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stems.iter().map(|s| s.name.as_str())
    }

    /// Get the number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.stems.first().map_or(0, |s| s.audio.len())
    }

    /// Check if stems are empty
    pub fn is_empty(&self) -> bool {
        self.samples_per_channel() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples_per_channel() as f64 / self.sample_rate as f64
    }

    /// Sample-wise sum of all stems
    pub fn mixdown(&self) -> StereoBuffer {
        let mut mix = StereoBuffer::silence(self.samples_per_channel(), self.sample_rate);
        for stem in &self.stems {
            for (out, s) in mix.left.iter_mut().zip(&stem.audio.left) {
                *out += s;
            }
            for (out, s) in mix.right.iter_mut().zip(&stem.audio.right) {
                *out += s;
            }
        }
        mix
    }
}
