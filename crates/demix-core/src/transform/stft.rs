//! Short-time Fourier analysis and overlap-add synthesis

use super::fft::{forward_into, inverse_into};
use super::{check_power_of_two, hann_window};
use crate::error::{Result, SeparationError};

/// Accumulated window energy below which a sample is left undivided
pub const WEIGHT_FLOOR: f32 = 1e-8;

/// Complex spectrogram stored as parallel real/imaginary planes
///
/// Storage is frame-major: the value for `(frame, bin)` lives at
/// `frame * num_bins + bin`. Only the non-redundant bins of a real signal are
/// stored; the conjugate-symmetric upper half is rebuilt during synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub real: Vec<f32>,
    pub imag: Vec<f32>,
    pub num_frames: usize,
    pub num_bins: usize,
}

impl Spectrogram {
    /// All-zero spectrogram of the given dimensions
    pub fn zeros(num_frames: usize, num_bins: usize) -> Self {
        Self {
            real: vec![0.0; num_frames * num_bins],
            imag: vec![0.0; num_frames * num_bins],
            num_frames,
            num_bins,
        }
    }

    /// Flat index of `(frame, bin)`
    #[inline]
    pub fn index(&self, frame: usize, bin: usize) -> usize {
        frame * self.num_bins + bin
    }
}

/// Windowed short-time transform of a real signal
///
/// Frames start every `hop_size` samples, are multiplied by a Hann window of
/// `frame_size` and transformed; the `frame_size / 2 + 1` non-redundant bins
/// are kept and scaled by `1 / √frame_size`. No padding is applied here, the
/// caller pads first.
///
/// # Errors
/// `InvalidInput` when `frame_size` is not a power of two, `hop_size` is zero
/// or the signal is shorter than one frame.
pub fn analysis_transform(signal: &[f32], frame_size: usize, hop_size: usize) -> Result<Spectrogram> {
    check_power_of_two(frame_size, "STFT frame")?;
    if hop_size == 0 {
        return Err(SeparationError::InvalidInput("STFT hop size is zero".into()));
    }
    if signal.len() < frame_size {
        return Err(SeparationError::InvalidInput(format!(
            "signal of {} samples is shorter than one {}-sample frame",
            signal.len(),
            frame_size
        )));
    }

    let num_frames = (signal.len() - frame_size) / hop_size + 1;
    let num_bins = frame_size / 2 + 1;
    let window = hann_window(frame_size);
    let scale = 1.0 / (frame_size as f32).sqrt();

    let mut spec = Spectrogram::zeros(num_frames, num_bins);
    let mut windowed = vec![0.0f32; frame_size];
    let mut frame_real = vec![0.0f32; frame_size];
    let mut frame_imag = vec![0.0f32; frame_size];

    for frame in 0..num_frames {
        let start = frame * hop_size;
        for ((out, &sample), &w) in windowed
            .iter_mut()
            .zip(&signal[start..start + frame_size])
            .zip(window.iter())
        {
            *out = sample * w;
        }

        forward_into(&mut frame_real, &mut frame_imag, &windowed)?;

        let offset = frame * num_bins;
        for k in 0..num_bins {
            spec.real[offset + k] = frame_real[k] * scale;
            spec.imag[offset + k] = frame_imag[k] * scale;
        }
    }

    Ok(spec)
}

/// Inverse of [`analysis_transform`] by weighted overlap-add
///
/// Each frame's spectrum is completed by conjugate mirroring of bins
/// `1..num_bins-1` (DC and Nyquist are not mirrored), inverse transformed,
/// windowed, scaled by `√frame_size` and added at its hop offset. The result
/// is divided by the accumulated squared window wherever that exceeds
/// [`WEIGHT_FLOOR`]. `output_length` defaults to
/// `(num_frames - 1) * hop_size + frame_size`; frames reaching past it are
/// clipped.
pub fn synthesis_transform(
    spec: &Spectrogram,
    frame_size: usize,
    hop_size: usize,
    output_length: Option<usize>,
) -> Result<Vec<f32>> {
    check_power_of_two(frame_size, "ISTFT frame")?;
    if hop_size == 0 {
        return Err(SeparationError::InvalidInput("ISTFT hop size is zero".into()));
    }
    let num_bins = spec.num_bins;
    let num_frames = spec.num_frames;
    if num_bins > frame_size / 2 + 1 {
        return Err(SeparationError::InvalidInput(format!(
            "{} bins do not fit a {}-sample frame",
            num_bins, frame_size
        )));
    }
    let expected = num_frames * num_bins;
    if spec.real.len() != expected || spec.imag.len() != expected {
        return Err(SeparationError::InvalidInput(format!(
            "spectrogram planes have {}/{} values, expected {}",
            spec.real.len(),
            spec.imag.len(),
            expected
        )));
    }

    let output_length = output_length
        .unwrap_or_else(|| num_frames.saturating_sub(1) * hop_size + frame_size);
    let mut output = vec![0.0f32; output_length];
    let mut window_sum = vec![0.0f32; output_length];
    let window = hann_window(frame_size);
    let scale = (frame_size as f32).sqrt();

    let mut full_real = vec![0.0f32; frame_size];
    let mut full_imag = vec![0.0f32; frame_size];
    let mut out_real = vec![0.0f32; frame_size];
    let mut out_imag = vec![0.0f32; frame_size];

    for frame in 0..num_frames {
        let start = frame * hop_size;
        if start >= output_length {
            break;
        }

        full_real.fill(0.0);
        full_imag.fill(0.0);
        let offset = frame * num_bins;
        full_real[..num_bins].copy_from_slice(&spec.real[offset..offset + num_bins]);
        full_imag[..num_bins].copy_from_slice(&spec.imag[offset..offset + num_bins]);

        for k in 1..num_bins.saturating_sub(1) {
            full_real[frame_size - k] = full_real[k];
            full_imag[frame_size - k] = -full_imag[k];
        }

        inverse_into(&mut out_real, &mut out_imag, &full_real, &full_imag)?;

        let end = (start + frame_size).min(output_length);
        for i in 0..end - start {
            output[start + i] += out_real[i] * window[i] * scale;
            window_sum[start + i] += window[i] * window[i];
        }
    }

    for (sample, &weight) in output.iter_mut().zip(&window_sum) {
        if weight > WEIGHT_FLOOR {
            *sample /= weight;
        }
    }

    Ok(output)
}
