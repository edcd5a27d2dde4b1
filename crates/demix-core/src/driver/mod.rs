//! Segmented separation driver
//!
//! ## Pipeline
//!
//! ```text
//! StereoBuffer ─► SegmentPlan ─► [prepare ─► engine.infer ─► select ─► combine]
//!                                   (up to max_in_flight at once, in order)
//!                                          │
//!                                          ▼
//!                         TrackAccumulator (crossfade + weight)
//!                                          │
//!                                          ▼
//!                                 normalize ─► StemData
//! ```
//!
//! A run is a single future. Dropping it stops issuing inference calls and
//! nothing partial is returned; the first error aborts the run.
//!
//! All segments are polled on the caller's task. With `max_in_flight > 1`
//! only the engine's `infer` futures overlap; packing and the per-track
//! inverse transforms still run one at a time on that task, so the gain
//! depends on the engine offloading its work (as `demix-ort` does).

mod accumulator;
mod tiling;

pub use accumulator::TrackAccumulator;
pub use tiling::{crossfade_window, segment_count, Segment, SegmentPlan};

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::audio::{StemData, StereoBuffer};
use crate::config::SeparationConfig;
use crate::engine::{InferenceEngine, ModelOutput};
use crate::error::{Result, SeparationError};
use crate::packing::{
    prepare_model_input, reconstruct_track, unpack_frequency_output, SPEC_CHANNELS,
};

/// Progress of a separation run, reported after each segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparationProgress {
    pub completed_segments: usize,
    pub total_segments: usize,
    /// `completed_segments / total_segments`, 1.0 once done
    pub fraction: f32,
}

/// Callback for separation progress (uses Arc for cloneability)
pub type ProgressCallback = Arc<dyn Fn(SeparationProgress) + Send + Sync>;

/// Stereo tracks of one segment, in model output order
type SegmentTracks = Vec<(Vec<f32>, Vec<f32>)>;

/// Runs an [`InferenceEngine`] over audio of any length
///
/// ```ignore
/// let separator = Separator::new(engine, SeparationConfig::default())?;
/// let stems = separator.separate(&audio, None).await?;
/// let vocals = stems.get("vocals");
/// ```
pub struct Separator<E> {
    engine: E,
    config: SeparationConfig,
}

impl<E: InferenceEngine> Separator<E> {
    /// Create a separator, validating `config` and the engine's signature
    pub fn new(engine: E, mut config: SeparationConfig) -> Result<Self> {
        config.validate()?;
        engine.signature().validate()?;
        Ok(Self { engine, config })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    /// Separate `audio` into the configured tracks
    ///
    /// Every returned stem has exactly the input's length.
    ///
    /// # Errors
    /// - `EngineNotLoaded` when the engine has no model
    /// - `InvalidInput` on a sample-rate or channel-length mismatch
    /// - contract errors when the model output does not fit the geometry
    /// - whatever the engine reports from `infer`
    pub async fn separate(
        &self,
        audio: &StereoBuffer,
        progress: Option<ProgressCallback>,
    ) -> Result<StemData> {
        if !self.engine.is_ready() {
            return Err(SeparationError::EngineNotLoaded);
        }

        let geometry = &self.config.geometry;
        if audio.sample_rate != geometry.sample_rate {
            return Err(SeparationError::InvalidInput(format!(
                "audio is {} Hz, model expects {} Hz",
                audio.sample_rate, geometry.sample_rate
            )));
        }
        if audio.left.len() != audio.right.len() {
            return Err(SeparationError::InvalidInput(format!(
                "channel lengths differ: left {} vs right {}",
                audio.left.len(),
                audio.right.len()
            )));
        }

        let plan = SegmentPlan::new(audio.len(), geometry.training_samples, geometry.stride());
        log::info!(
            "Separating {:.1}s with '{}': {} segment(s) of {:.2}s, stride {}, overlap {}, {} in flight",
            audio.duration_secs(),
            self.engine.name(),
            plan.len(),
            geometry.segment_secs(),
            plan.stride,
            plan.overlap(),
            self.config.max_in_flight
        );

        let mut accumulator = TrackAccumulator::new(self.config.track_count(), audio.len());
        let mut results = stream::iter(plan.segments())
            .map(|segment| self.process_segment(audio, segment))
            .buffered(self.config.max_in_flight);

        let mut completed = 0;
        while let Some(result) = results.next().await {
            let (segment, tracks) = result?;
            let window = crossfade_window(segment.length, plan.stride);
            accumulator.accumulate(segment.start, &tracks, &window);

            completed += 1;
            log::debug!(
                "Segment {}/{} done (samples {}..{})",
                completed,
                plan.len(),
                segment.start,
                segment.end()
            );
            if let Some(ref cb) = progress {
                cb(SeparationProgress {
                    completed_segments: completed,
                    total_segments: plan.len(),
                    fraction: completed as f32 / plan.len() as f32,
                });
            }
        }

        let stems = accumulator.finish(&self.config.tracks, audio.sample_rate);
        log::info!(
            "Separation complete: {} stems x {} samples",
            stems.stems.len(),
            stems.samples_per_channel()
        );
        Ok(stems)
    }

    /// Prepare, infer and combine one segment
    async fn process_segment(
        &self,
        audio: &StereoBuffer,
        segment: Segment,
    ) -> Result<(Segment, SegmentTracks)> {
        let range = segment.start..segment.end();
        let input = prepare_model_input(
            &audio.left[range.clone()],
            &audio.right[range],
            &self.config.geometry,
        )?;

        let outputs = self.engine.infer(input).await?;
        let output = ModelOutput::select(outputs, self.engine.signature())?;
        let tracks = self.combine(output, segment.length)?;
        Ok((segment, tracks))
    }

    /// Sum the time branch and the reconstructed frequency branch per track
    ///
    /// Only the first `valid_length` samples are kept.
    fn combine(&self, output: ModelOutput, valid_length: usize) -> Result<SegmentTracks> {
        let geometry = &self.config.geometry;
        let track_count = self.config.track_count();
        let shape = output.time_domain.shape().to_vec();
        if shape[0] != 1 || shape[1] != track_count || shape[3] < valid_length {
            return Err(SeparationError::UnexpectedShape {
                name: "time-domain branch".into(),
                expected: format!("[1, {}, 2, >= {}]", track_count, valid_length),
                got: shape,
            });
        }
        let samples = shape[3];

        let frequency = match &output.frequency_domain {
            Some(tensor) => {
                let expected = [
                    1,
                    track_count,
                    SPEC_CHANNELS,
                    geometry.spec_bins,
                    geometry.spec_frames,
                ];
                if tensor.shape() != expected {
                    return Err(SeparationError::UnexpectedShape {
                        name: "frequency-domain branch".into(),
                        expected: format!("{:?}", expected),
                        got: tensor.shape().to_vec(),
                    });
                }
                let specs = unpack_frequency_output(tensor.data(), track_count, geometry)?;
                let recon = specs
                    .iter()
                    .map(|spec| reconstruct_track(spec, valid_length, geometry))
                    .collect::<Result<Vec<_>>>()?;
                Some(recon)
            }
            None => None,
        };

        let time = output.time_domain.data();
        let tracks = (0..track_count)
            .map(|t| {
                let left_base = (2 * t) * samples;
                let right_base = (2 * t + 1) * samples;
                let mut left = time[left_base..left_base + valid_length].to_vec();
                let mut right = time[right_base..right_base + valid_length].to_vec();
                if let Some((freq_left, freq_right)) = frequency.as_ref().map(|f| &f[t]) {
                    for (s, f) in left.iter_mut().zip(freq_left) {
                        *s += f;
                    }
                    for (s, f) in right.iter_mut().zip(freq_right) {
                        *s += f;
                    }
                }
                (left, right)
            })
            .collect();

        Ok(tracks)
    }
}
