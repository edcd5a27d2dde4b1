//! Tensor packing between audio segments and the model's tensor layout
//!
//! ## Model input
//!
//! ```text
//! segment ─► zero-pad/truncate to training length
//!         ─► reflect-pad (3·hop/2 left, up to a hop multiple right)
//!         ─► reflect-pad fft/2 both sides (centering)
//!         ─► STFT ─► frames [2, 2 + spec_frames), bins [0, spec_bins)
//! ```
//!
//! Both tensors are planar: waveform `[L..., R...]`, spectrogram
//! `[channel][bin][frame]` with channels L-real, L-imag, R-real, R-imag.
//!
//! ## Frequency-branch output
//!
//! The inverse path re-inserts the dropped Nyquist bin and the two padding
//! frames on each side as zeros, runs the ISTFT and slices away exactly the
//! padding applied on the way in.

use crate::config::{ModelGeometry, FRAME_OFFSET};
use crate::error::{Result, SeparationError};
use crate::transform::{analysis_transform, reflect_pad, synthesis_transform, Spectrogram};

/// Spectrogram channels per stereo signal (L-real, L-imag, R-real, R-imag)
pub const SPEC_CHANNELS: usize = 4;

/// Tensors for one inference call, derived from one segment
#[derive(Debug, Clone)]
pub struct ModelInput {
    /// Planar stereo waveform, shape `[1, 2, training_samples]`
    pub waveform: Vec<f32>,
    /// Four-channel complex spectrogram, shape `[1, 4, spec_bins, spec_frames]`
    pub spectrogram: Vec<f32>,
    /// Valid samples before zero padding
    pub original_length: usize,
    pub waveform_shape: [usize; 3],
    pub spectrogram_shape: [usize; 4],
}

/// Complex spectrogram of one output track
///
/// Each plane holds `spec_bins * spec_frames` values at `bin * spec_frames + frame`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSpectrogram {
    pub left_real: Vec<f32>,
    pub left_imag: Vec<f32>,
    pub right_real: Vec<f32>,
    pub right_imag: Vec<f32>,
}

/// Build the waveform and spectrogram tensors for one stereo segment
///
/// Channels are zero-padded or truncated to `geometry.training_samples`.
pub fn prepare_model_input(left: &[f32], right: &[f32], geometry: &ModelGeometry) -> Result<ModelInput> {
    if left.len() != right.len() {
        return Err(SeparationError::InvalidInput(format!(
            "channel lengths differ: left {} vs right {}",
            left.len(),
            right.len()
        )));
    }

    let length = geometry.training_samples;
    let copy_len = left.len().min(length);

    let mut padded_left = vec![0.0f32; length];
    let mut padded_right = vec![0.0f32; length];
    padded_left[..copy_len].copy_from_slice(&left[..copy_len]);
    padded_right[..copy_len].copy_from_slice(&right[..copy_len]);

    let stft_left = segment_spectrogram(&padded_left, geometry)?;
    let stft_right = segment_spectrogram(&padded_right, geometry)?;

    let bins = geometry.spec_bins;
    let frames = geometry.spec_frames;
    if stft_left.num_frames < FRAME_OFFSET + frames || stft_left.num_bins < bins {
        return Err(SeparationError::InvalidConfig(format!(
            "STFT yields {} frames x {} bins, model needs {} x {} after offset {}",
            stft_left.num_frames, stft_left.num_bins, frames, bins, FRAME_OFFSET
        )));
    }

    let plane = bins * frames;
    let mut spectrogram = vec![0.0f32; SPEC_CHANNELS * plane];
    for f in 0..frames {
        let src_frame = f + FRAME_OFFSET;
        for b in 0..bins {
            let src = stft_left.index(src_frame, b);
            let dst = b * frames + f;
            spectrogram[dst] = stft_left.real[src];
            spectrogram[plane + dst] = stft_left.imag[src];
            spectrogram[2 * plane + dst] = stft_right.real[src];
            spectrogram[3 * plane + dst] = stft_right.imag[src];
        }
    }

    let mut waveform = padded_left;
    waveform.extend_from_slice(&padded_right);

    Ok(ModelInput {
        waveform,
        spectrogram,
        original_length: left.len(),
        waveform_shape: geometry.waveform_shape(),
        spectrogram_shape: geometry.spectrogram_shape(),
    })
}

/// Padded STFT of one training-length channel
fn segment_spectrogram(channel: &[f32], geometry: &ModelGeometry) -> Result<Spectrogram> {
    let hop = geometry.hop_size;
    let length = channel.len();
    let pad = geometry.pad();
    let pad_right = pad + length.div_ceil(hop) * hop - length;

    let stft_input = reflect_pad(channel, pad, pad_right);
    let centered = reflect_pad(&stft_input, geometry.center_pad(), geometry.center_pad());

    analysis_transform(&centered, geometry.fft_size, hop)
}

/// Split the model's raw frequency branch into per-track spectrograms
///
/// `raw` is laid out as `[track][channel][bin][frame]` with four channels.
pub fn unpack_frequency_output(
    raw: &[f32],
    tracks: usize,
    geometry: &ModelGeometry,
) -> Result<Vec<TrackSpectrogram>> {
    let plane = geometry.spec_bins * geometry.spec_frames;
    let per_track = SPEC_CHANNELS * plane;
    if raw.len() != tracks * per_track {
        return Err(SeparationError::UnexpectedShape {
            name: "frequency branch".into(),
            expected: format!(
                "[{}, {}, {}, {}] values",
                tracks, SPEC_CHANNELS, geometry.spec_bins, geometry.spec_frames
            ),
            got: vec![raw.len()],
        });
    }

    let specs = raw
        .chunks_exact(per_track)
        .map(|track| {
            let channel = |c: usize| track[c * plane..(c + 1) * plane].to_vec();
            TrackSpectrogram {
                left_real: channel(0),
                left_imag: channel(1),
                right_real: channel(2),
                right_imag: channel(3),
            }
        })
        .collect();

    Ok(specs)
}

/// Convert one track's spectrogram back to `target_length` stereo samples
pub fn reconstruct_track(
    spec: &TrackSpectrogram,
    target_length: usize,
    geometry: &ModelGeometry,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let left = reconstruct_channel(&spec.left_real, &spec.left_imag, target_length, geometry)?;
    let right = reconstruct_channel(&spec.right_real, &spec.right_imag, target_length, geometry)?;
    Ok((left, right))
}

fn reconstruct_channel(
    real: &[f32],
    imag: &[f32],
    target_length: usize,
    geometry: &ModelGeometry,
) -> Result<Vec<f32>> {
    let bins = geometry.spec_bins;
    let frames = geometry.spec_frames;
    if real.len() != bins * frames || imag.len() != bins * frames {
        return Err(SeparationError::InvalidInput(format!(
            "track spectrogram planes have {}/{} values, expected {}",
            real.len(),
            imag.len(),
            bins * frames
        )));
    }

    // Nyquist bin and two frames each side back in as zeros
    let mut padded = Spectrogram::zeros(frames + 2 * FRAME_OFFSET, bins + 1);
    for f in 0..frames {
        for b in 0..bins {
            let src = b * frames + f;
            let dst = padded.index(f + FRAME_OFFSET, b);
            padded.real[dst] = real[src];
            padded.imag[dst] = imag[src];
        }
    }

    let hop = geometry.hop_size;
    let istft_length = (padded.num_frames - 1) * hop + geometry.fft_size;
    let signal = synthesis_transform(&padded, geometry.fft_size, hop, Some(istft_length))?;

    let offset = geometry.center_pad() + geometry.pad();
    if offset + target_length > signal.len() {
        return Err(SeparationError::InvalidInput(format!(
            "target length {} exceeds the {} samples the spectrogram covers",
            target_length,
            signal.len() - offset.min(signal.len())
        )));
    }

    Ok(signal[offset..offset + target_length].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small but self-consistent geometry so tests stay fast
    fn small_geometry() -> ModelGeometry {
        ModelGeometry {
            sample_rate: 8000,
            fft_size: 64,
            hop_size: 16,
            training_samples: 200,
            spec_bins: 32,
            spec_frames: 13,
            segment_overlap: 0.25,
        }
    }

    fn sine(len: usize, cycles_per_sample: f32, phase: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * cycles_per_sample * i as f32 + phase).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_small_geometry_is_valid() {
        small_geometry().validate().unwrap();
    }

    #[test]
    fn test_prepare_shapes_and_padding() {
        let g = small_geometry();
        let left = sine(150, 0.01, 0.0);
        let right = sine(150, 0.02, 1.0);
        let input = prepare_model_input(&left, &right, &g).unwrap();

        assert_eq!(input.original_length, 150);
        assert_eq!(input.waveform.len(), 2 * g.training_samples);
        assert_eq!(input.spectrogram.len(), 4 * g.spec_bins * g.spec_frames);

        // Planar waveform, zero-padded past the valid samples
        assert_eq!(&input.waveform[..150], left.as_slice());
        assert!(input.waveform[150..200].iter().all(|&s| s == 0.0));
        assert_eq!(&input.waveform[200..350], right.as_slice());
        assert!(input.waveform[350..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_prepare_truncates_long_input() {
        let g = small_geometry();
        let long = sine(500, 0.01, 0.0);
        let input = prepare_model_input(&long, &long, &g).unwrap();
        assert_eq!(input.original_length, 500);
        assert_eq!(&input.waveform[..200], &long[..200]);
    }

    #[test]
    fn test_prepare_uses_frame_offset() {
        let g = small_geometry();
        let left = sine(200, 0.03, 0.2);
        let right = sine(200, 0.05, 0.7);
        let input = prepare_model_input(&left, &right, &g).unwrap();

        let mut padded = left.clone();
        padded.resize(g.training_samples, 0.0);
        let stft = segment_spectrogram(&padded, &g).unwrap();
        assert_eq!(stft.num_frames, g.spec_frames + 4);

        let (b, f) = (5, 3);
        let src = stft.index(f + FRAME_OFFSET, b);
        assert_eq!(input.spectrogram[b * g.spec_frames + f], stft.real[src]);
        let plane = g.spec_bins * g.spec_frames;
        assert_eq!(input.spectrogram[plane + b * g.spec_frames + f], stft.imag[src]);
    }

    #[test]
    fn test_prepare_rejects_mismatched_channels() {
        let g = small_geometry();
        assert!(prepare_model_input(&[0.0; 10], &[0.0; 11], &g).is_err());
    }

    #[test]
    fn test_unpack_recovers_values_exactly() {
        let g = small_geometry();
        let tracks = 4;
        let (bins, frames) = (g.spec_bins, g.spec_frames);
        let value = |t: usize, c: usize, b: usize, f: usize| (t * 1_000_000 + c * 100_000 + b * 100 + f) as f32;

        let mut raw = Vec::with_capacity(tracks * 4 * bins * frames);
        for t in 0..tracks {
            for c in 0..4 {
                for b in 0..bins {
                    for f in 0..frames {
                        raw.push(value(t, c, b, f));
                    }
                }
            }
        }

        let specs = unpack_frequency_output(&raw, tracks, &g).unwrap();
        assert_eq!(specs.len(), tracks);
        for (t, spec) in specs.iter().enumerate() {
            for b in 0..bins {
                for f in 0..frames {
                    let idx = b * frames + f;
                    assert_eq!(spec.left_real[idx], value(t, 0, b, f));
                    assert_eq!(spec.left_imag[idx], value(t, 1, b, f));
                    assert_eq!(spec.right_real[idx], value(t, 2, b, f));
                    assert_eq!(spec.right_imag[idx], value(t, 3, b, f));
                }
            }
        }
    }

    #[test]
    fn test_unpack_rejects_wrong_size() {
        let g = small_geometry();
        let raw = vec![0.0; 4 * g.spec_bins * g.spec_frames * 3 + 1];
        let err = unpack_frequency_output(&raw, 3, &g).unwrap_err();
        assert!(err.is_contract_error());
    }

    #[test]
    fn test_prepare_then_reconstruct_recovers_interior() {
        let g = small_geometry();
        let left = sine(200, 0.011, 0.3);
        let right = sine(200, 0.017, 1.1);
        let input = prepare_model_input(&left, &right, &g).unwrap();

        // A model that echoes its spectrogram input as a single track
        let specs = unpack_frequency_output(&input.spectrogram, 1, &g).unwrap();
        let (out_left, out_right) = reconstruct_track(&specs[0], g.training_samples, &g).unwrap();
        assert_eq!(out_left.len(), g.training_samples);

        // Outside the zeroed padding frames reconstruction is exact up to the dropped Nyquist bin
        let offset = g.center_pad() + g.pad();
        let first = (FRAME_OFFSET - 1) * g.hop_size + g.fft_size - offset;
        let last = (g.spec_frames + FRAME_OFFSET) * g.hop_size - offset;
        assert!(first < last);
        for i in first..last {
            assert!((out_left[i] - left[i]).abs() < 1e-3, "left {}: {} vs {}", i, out_left[i], left[i]);
            assert!((out_right[i] - right[i]).abs() < 1e-3, "right {}: {} vs {}", i, out_right[i], right[i]);
        }
    }

    #[test]
    fn test_reconstruct_rejects_oversized_target() {
        let g = small_geometry();
        let plane = vec![0.0; g.spec_bins * g.spec_frames];
        let spec = TrackSpectrogram {
            left_real: plane.clone(),
            left_imag: plane.clone(),
            right_real: plane.clone(),
            right_imag: plane,
        };
        assert!(reconstruct_track(&spec, g.training_samples, &g).is_ok());
        assert!(reconstruct_track(&spec, 10_000, &g).is_err());
    }

    #[test]
    fn test_htdemucs_input_shapes() {
        let g = ModelGeometry::HTDEMUCS;
        let one_second = sine(44_100, 440.0 / 44_100.0, 0.0);
        let input = prepare_model_input(&one_second, &one_second, &g).unwrap();
        assert_eq!(input.waveform.len(), 2 * 343_980);
        assert_eq!(input.spectrogram.len(), 4 * 2048 * 336);
        assert_eq!(input.waveform_shape, [1, 2, 343_980]);
        assert_eq!(input.spectrogram_shape, [1, 4, 2048, 336]);
        assert_eq!(input.original_length, 44_100);
        assert!(input.spectrogram.iter().all(|v| v.is_finite()));
    }
}
