//! Cached Hann windows

use std::sync::Arc;

use super::CoefficientCache;

static HANN_WINDOWS: CoefficientCache<usize, [f32]> = CoefficientCache::new();

/// Periodic Hann window `0.5 * (1 - cos(2π·i / size))`
///
/// The same window is used for analysis and synthesis.
pub fn hann_window(size: usize) -> Arc<[f32]> {
    HANN_WINDOWS.get_or_compute(size, || {
        let window: Vec<f32> = (0..size)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / size as f64;
                (0.5 * (1.0 - phase.cos())) as f32
            })
            .collect();
        Arc::from(window)
    })
}
