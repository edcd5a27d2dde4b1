//! Reflect padding

/// Extend `signal` by mirroring it around both edges, excluding the edge sample
///
/// Left pad sample `i` is `signal[min(pad_left - i, len - 1)]`, right pad
/// sample `i` is `signal[max(0, len - 2 - i)]`. Pads longer than the signal
/// saturate at the first/last valid index instead of reflecting again. An
/// empty signal pads with zeros.
pub fn reflect_pad(signal: &[f32], pad_left: usize, pad_right: usize) -> Vec<f32> {
    let len = signal.len();
    let mut output = vec![0.0f32; pad_left + len + pad_right];
    if len == 0 {
        return output;
    }

    for (i, out) in output[..pad_left].iter_mut().enumerate() {
        *out = signal[(pad_left - i).min(len - 1)];
    }

    output[pad_left..pad_left + len].copy_from_slice(signal);

    for (i, out) in output[pad_left + len..].iter_mut().enumerate() {
        *out = signal[(len as isize - 2 - i as isize).max(0) as usize];
    }

    output
}
