//! Segment tiling and crossfade weights
//!
//! ```text
//! input     [=================================================]
//! segment 0 [==========/‾‾‾‾‾‾‾‾‾‾\]
//! segment 1            [/‾‾‾‾‾‾‾‾‾‾\===========]
//!                      ^^^^^^^^^^^^ shared region (window - stride)
//! ```
//!
//! Every segment gets a trapezoid: a linear ramp over `stride / 2` samples at
//! each end and flat 1.0 in between. The ramps of neighbouring segments only
//! sum to 1 when the shared region is exactly `stride / 2` long, so the driver
//! always divides by the accumulated weight afterwards.

/// One window of the input submitted to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    /// First input sample covered
    pub start: usize,
    /// Valid samples, at most the window length
    pub length: usize,
}

impl Segment {
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Fixed-stride division of an input into overlapping segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    pub total_samples: usize,
    pub window: usize,
    pub stride: usize,
    count: usize,
}

impl SegmentPlan {
    pub fn new(total_samples: usize, window: usize, stride: usize) -> Self {
        Self {
            total_samples,
            window,
            stride,
            count: segment_count(total_samples, window, stride),
        }
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Samples shared by two neighbouring segments
    pub fn overlap(&self) -> usize {
        self.window.saturating_sub(self.stride)
    }

    pub fn segment(&self, index: usize) -> Option<Segment> {
        if index >= self.count {
            return None;
        }
        let start = index * self.stride;
        Some(Segment {
            index,
            start,
            length: self.window.min(self.total_samples - start),
        })
    }

    /// Segments in increasing start order
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        (0..self.count).filter_map(move |index| self.segment(index))
    }
}

/// Segments needed to cover `total_samples`
///
/// Zero for empty input, one when the input fits a single window, otherwise
/// enough stride steps that the last window reaches the end.
pub fn segment_count(total_samples: usize, window: usize, stride: usize) -> usize {
    if total_samples == 0 {
        0
    } else if total_samples <= window || stride == 0 {
        1
    } else {
        (total_samples - window).div_ceil(stride) + 1
    }
}

/// Trapezoidal weights `min(i / (stride/2), 1, (length - i) / (stride/2))`
pub fn crossfade_window(length: usize, stride: usize) -> Vec<f32> {
    let half = stride as f64 / 2.0;
    (0..length)
        .map(|i| {
            let rise = i as f64 / half;
            let fall = (length - i) as f64 / half;
            rise.min(fall).min(1.0) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelGeometry;

    #[test]
    fn test_segment_count_edges() {
        assert_eq!(segment_count(0, 100, 75), 0);
        assert_eq!(segment_count(1, 100, 75), 1);
        assert_eq!(segment_count(100, 100, 75), 1);
        assert_eq!(segment_count(101, 100, 75), 2);
        assert_eq!(segment_count(175, 100, 75), 2);
        assert_eq!(segment_count(176, 100, 75), 3);
    }

    #[test]
    fn test_segments_cover_input() {
        let plan = SegmentPlan::new(1000, 128, 96);
        let segments: Vec<_> = plan.segments().collect();
        assert_eq!(segments.len(), plan.len());
        assert_eq!(segments[0].start, 0);
        for pair in segments.windows(2) {
            assert_eq!(pair[1].start - pair[0].start, 96);
            assert!(pair[1].start < pair[0].end());
        }
        let last = segments.last().unwrap();
        assert_eq!(last.end(), 1000);
        assert!(last.length <= 128);
        assert!(plan.segment(plan.len()).is_none());
    }

    #[test]
    fn test_ten_seconds_htdemucs() {
        let g = ModelGeometry::HTDEMUCS;
        let plan = SegmentPlan::new(441_000, g.training_samples, g.stride());
        assert_eq!(plan.stride, 257_985);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.overlap(), 85_995);

        let second = plan.segment(1).unwrap();
        assert_eq!(second.start, 257_985);
        assert_eq!(second.length, 441_000 - 257_985);
        // Shared region between the two segments
        let first = plan.segment(0).unwrap();
        assert_eq!(first.end() - second.start, 85_995);
    }

    #[test]
    fn test_one_second_is_single_short_segment() {
        let plan = SegmentPlan::new(44_100, 343_980, 257_985);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.segment(0).unwrap().length, 44_100);
    }

    #[test]
    fn test_crossfade_shape() {
        let w = crossfade_window(20, 8);
        assert_eq!(w[0], 0.0);
        assert_eq!(w[2], 0.5);
        assert_eq!(w[4], 1.0);
        assert_eq!(w[10], 1.0);
        assert_eq!(w[19], 0.25);
        assert!(w.iter().all(|&x| (0.0..=1.0).contains(&x)));
    }

    #[test]
    fn test_ramps_sum_to_one_when_overlap_is_half_stride() {
        // window 120, stride 80: shared region 40 == stride / 2
        let (window, stride) = (120, 80);
        let w = crossfade_window(window, stride);
        for i in 0..window - stride {
            let sum = w[stride + i] + w[i];
            assert!((sum - 1.0).abs() < 1e-6, "offset {}: {}", i, sum);
        }
    }
}
