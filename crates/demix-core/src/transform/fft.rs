//! Iterative radix-2 Cooley-Tukey FFT

use std::sync::Arc;

use super::{check_power_of_two, CoefficientCache};
use crate::error::{Result, SeparationError};

/// Transform direction, selects the sign of the twiddle angle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Angle `-2π·k/n`
    Forward,
    /// Angle `+2π·k/n`, output scaled by `1/n`
    Inverse,
}

/// cos/sin of the twiddle angles for one transform length
struct Twiddles {
    real: Vec<f32>,
    imag: Vec<f32>,
}

impl Twiddles {
    fn compute(n: usize, direction: Direction) -> Self {
        let sign = match direction {
            Direction::Forward => -1.0,
            Direction::Inverse => 1.0,
        };
        let (real, imag) = (0..n / 2)
            .map(|k| {
                let angle = sign * 2.0 * std::f64::consts::PI * k as f64 / n as f64;
                (angle.cos() as f32, angle.sin() as f32)
            })
            .unzip();
        Self { real, imag }
    }
}

static TWIDDLES: CoefficientCache<(usize, Direction), Twiddles> = CoefficientCache::new();

fn twiddles(n: usize, direction: Direction) -> Arc<Twiddles> {
    TWIDDLES.get_or_compute((n, direction), || Arc::new(Twiddles::compute(n, direction)))
}

/// Index of `i` with its lowest `bits` bits reversed
fn bit_reverse(i: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    i.reverse_bits() >> (usize::BITS - bits)
}

/// In-place butterfly passes over bit-reversed input
fn butterflies(real: &mut [f32], imag: &mut [f32], twiddles: &Twiddles) {
    let n = real.len();
    let mut size = 2;
    while size <= n {
        let half = size / 2;
        let step = n / size;
        for start in (0..n).step_by(size) {
            for j in 0..half {
                let k = j * step;
                let (tr, ti) = (twiddles.real[k], twiddles.imag[k]);
                let a = start + j;
                let b = a + half;

                let odd_re = real[b] * tr - imag[b] * ti;
                let odd_im = real[b] * ti + imag[b] * tr;
                let (even_re, even_im) = (real[a], imag[a]);

                real[a] = even_re + odd_re;
                imag[a] = even_im + odd_im;
                real[b] = even_re - odd_re;
                imag[b] = even_im - odd_im;
            }
        }
        size *= 2;
    }
}

fn check_lengths(n: usize, others: &[usize]) -> Result<()> {
    if others.iter().any(|&len| len != n) {
        return Err(SeparationError::InvalidInput(format!(
            "FFT buffers must all have length {}, got {:?}",
            n, others
        )));
    }
    Ok(())
}

/// Forward FFT of a real buffer into caller-provided output buffers
///
/// All three buffers must share the same power-of-two length.
pub fn forward_into(real_out: &mut [f32], imag_out: &mut [f32], input: &[f32]) -> Result<()> {
    let n = input.len();
    check_power_of_two(n, "FFT")?;
    check_lengths(n, &[real_out.len(), imag_out.len()])?;

    let bits = n.trailing_zeros();
    for i in 0..n {
        real_out[i] = input[bit_reverse(i, bits)];
        imag_out[i] = 0.0;
    }

    butterflies(real_out, imag_out, &twiddles(n, Direction::Forward));
    Ok(())
}

/// Inverse FFT into caller-provided output buffers, scaled by `1/n`
pub fn inverse_into(
    real_out: &mut [f32],
    imag_out: &mut [f32],
    real_in: &[f32],
    imag_in: &[f32],
) -> Result<()> {
    let n = real_in.len();
    check_power_of_two(n, "IFFT")?;
    check_lengths(n, &[imag_in.len(), real_out.len(), imag_out.len()])?;

    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = bit_reverse(i, bits);
        real_out[i] = real_in[j];
        imag_out[i] = imag_in[j];
    }

    butterflies(real_out, imag_out, &twiddles(n, Direction::Inverse));

    let scale = 1.0 / n as f32;
    for (re, im) in real_out.iter_mut().zip(imag_out.iter_mut()) {
        *re *= scale;
        *im *= scale;
    }
    Ok(())
}

/// Complex DFT of a real signal whose length is a power of two
///
/// Returns `(real, imag)`, both of the input length.
pub fn forward_transform(signal: &[f32]) -> Result<(Vec<f32>, Vec<f32>)> {
    let mut real = vec![0.0f32; signal.len()];
    let mut imag = vec![0.0f32; signal.len()];
    forward_into(&mut real, &mut imag, signal)?;
    Ok((real, imag))
}

/// Inverse DFT of a complex spectrum, returns `(real, imag)`
pub fn inverse_transform(real: &[f32], imag: &[f32]) -> Result<(Vec<f32>, Vec<f32>)> {
    let mut real_out = vec![0.0f32; real.len()];
    let mut imag_out = vec![0.0f32; real.len()];
    inverse_into(&mut real_out, &mut imag_out, real, imag)?;
    Ok((real_out, imag_out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use realfft::RealFftPlanner;

    /// Deterministic broadband test signal
    fn test_signal(n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32;
                (t * 0.37).sin() * 0.6 + (t * 1.91).cos() * 0.3 + ((i * 7919) % 13) as f32 * 0.01
            })
            .collect()
    }

    #[test]
    fn test_bit_reverse() {
        assert_eq!(bit_reverse(0b001, 3), 0b100);
        assert_eq!(bit_reverse(0b110, 3), 0b011);
        assert_eq!(bit_reverse(5, 0), 0);
    }

    #[test]
    fn test_impulse_has_flat_spectrum() {
        let mut impulse = vec![0.0f32; 16];
        impulse[0] = 1.0;
        let (re, im) = forward_transform(&impulse).unwrap();
        for k in 0..16 {
            assert!((re[k] - 1.0).abs() < 1e-6);
            assert!(im[k].abs() < 1e-6);
        }
    }

    #[test]
    fn test_roundtrip_all_sizes() {
        for bits in 0..=12 {
            let n = 1usize << bits;
            let signal = test_signal(n);
            let (re, im) = forward_transform(&signal).unwrap();
            let (back, back_im) = inverse_transform(&re, &im).unwrap();

            for i in 0..n {
                assert!(
                    (back[i] - signal[i]).abs() < 1e-4,
                    "n={} sample {}: {} vs {}",
                    n,
                    i,
                    back[i],
                    signal[i]
                );
                assert!(back_im[i].abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_matches_realfft() {
        let n = 1024;
        let signal = test_signal(n);
        let (re, im) = forward_transform(&signal).unwrap();

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let mut input = signal.clone();
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut input, &mut spectrum).unwrap();

        for (k, c) in spectrum.iter().enumerate() {
            assert!((re[k] - c.re).abs() < 1e-2, "bin {} re {} vs {}", k, re[k], c.re);
            assert!((im[k] - c.im).abs() < 1e-2, "bin {} im {} vs {}", k, im[k], c.im);
        }

        // Upper half is the conjugate mirror of the lower half
        for k in 1..n / 2 {
            assert!((re[n - k] - re[k]).abs() < 1e-2);
            assert!((im[n - k] + im[k]).abs() < 1e-2);
        }
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(matches!(
            forward_transform(&[0.0; 12]),
            Err(SeparationError::InvalidInput(_))
        ));
        assert!(forward_transform(&[]).is_err());
        assert!(inverse_transform(&[0.0; 8], &[0.0; 4]).is_err());
    }

    #[test]
    fn test_twiddles_cached_per_direction() {
        let fwd = twiddles(32, Direction::Forward);
        let inv = twiddles(32, Direction::Inverse);
        assert!(!Arc::ptr_eq(&fwd, &inv));
        assert!(Arc::ptr_eq(&fwd, &twiddles(32, Direction::Forward)));
        // Same cosines, opposite sines
        for k in 0..16 {
            assert!((fwd.real[k] - inv.real[k]).abs() < 1e-7);
            assert!((fwd.imag[k] + inv.imag[k]).abs() < 1e-7);
        }
    }
}
