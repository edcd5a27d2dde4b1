//! Fourier transform engine
//!
//! Radix-2 FFT, Hann-windowed short-time analysis/synthesis with overlap-add
//! and reflect padding. The conventions here (window shape, `1/√N` analysis
//! scaling, reflection indices) match the preprocessing the separation model
//! was trained with and are not configurable.
//!
//! Twiddle tables and windows are memoized process-wide by size. Entries are
//! computed once, never invalidated and shared read-only, so concurrent
//! transforms need no coordination beyond the cache lock.

mod fft;
mod pad;
mod stft;
mod window;

pub use fft::{forward_into, forward_transform, inverse_into, inverse_transform, Direction};
pub use pad::reflect_pad;
pub use stft::{analysis_transform, synthesis_transform, Spectrogram, WEIGHT_FLOOR};
pub use window::hann_window;

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Result, SeparationError};

/// Append-only memo of precomputed coefficients keyed by size
pub(crate) struct CoefficientCache<K, V: ?Sized> {
    entries: RwLock<BTreeMap<K, Arc<V>>>,
}

impl<K: Ord + Copy, V: ?Sized> CoefficientCache<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Return the cached entry for `key`, computing it on first use
    ///
    /// Two threads racing on the same key may both compute; the first insert
    /// wins and both callers receive the same `Arc`.
    pub(crate) fn get_or_compute(&self, key: K, compute: impl FnOnce() -> Arc<V>) -> Arc<V> {
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(hit);
        }

        let value = compute();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key).or_insert(value))
    }
}

/// Reject transform lengths the radix-2 kernel cannot handle
pub(crate) fn check_power_of_two(n: usize, what: &str) -> Result<()> {
    if n == 0 || !n.is_power_of_two() {
        return Err(SeparationError::InvalidInput(format!(
            "{} length {} is not a power of two",
            what, n
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_returns_shared_entry() {
        let cache: CoefficientCache<usize, [f32]> = CoefficientCache::new();
        let first = cache.get_or_compute(8, || Arc::from(vec![1.0f32; 8]));
        let second = cache.get_or_compute(8, || panic!("recomputed a cached entry"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_power_of_two_check() {
        assert!(check_power_of_two(1, "fft").is_ok());
        assert!(check_power_of_two(4096, "fft").is_ok());
        assert!(check_power_of_two(0, "fft").is_err());
        assert!(check_power_of_two(12, "fft").is_err());
    }
}
