//! Weighted overlap accumulation of separated segments

use crate::audio::{Stem, StemData, StereoBuffer};

/// Running per-track sums and the shared weight sum of one separation run
///
/// Every track of a segment is added with the same crossfade window, so one
/// weight buffer serves all of them. Consumed by [`finish`](Self::finish),
/// which is the only way to read the audio back.
#[derive(Debug)]
pub struct TrackAccumulator {
    tracks: Vec<(Vec<f32>, Vec<f32>)>,
    weight: Vec<f32>,
}

impl TrackAccumulator {
    pub fn new(track_count: usize, total_samples: usize) -> Self {
        Self {
            tracks: (0..track_count)
                .map(|_| (vec![0.0; total_samples], vec![0.0; total_samples]))
                .collect(),
            weight: vec![0.0; total_samples],
        }
    }

    pub fn total_samples(&self) -> usize {
        self.weight.len()
    }

    /// Add one segment's stereo tracks at `start`, scaled by `window`
    ///
    /// Samples past the end of the buffer or the track slices are skipped.
    pub fn accumulate(&mut self, start: usize, segment: &[(Vec<f32>, Vec<f32>)], window: &[f32]) {
        let end = (start + window.len()).min(self.total_samples());
        if start >= end {
            return;
        }
        let span = end - start;

        for (w_acc, &w) in self.weight[start..end].iter_mut().zip(window) {
            *w_acc += w;
        }

        for ((left_acc, right_acc), (left, right)) in self.tracks.iter_mut().zip(segment) {
            let weighted = window[..span].iter();
            for ((acc, &s), &w) in left_acc[start..end].iter_mut().zip(left).zip(weighted.clone()) {
                *acc += s * w;
            }
            for ((acc, &s), &w) in right_acc[start..end].iter_mut().zip(right).zip(weighted) {
                *acc += s * w;
            }
        }
    }

    /// Divide by the accumulated weight and hand out the stems
    ///
    /// Samples that never received weight stay 0.
    pub fn finish(self, names: &[String], sample_rate: u32) -> StemData {
        let weight = self.weight;
        let normalize = |channel: &mut Vec<f32>| {
            for (sample, &w) in channel.iter_mut().zip(&weight) {
                if w > 0.0 {
                    *sample /= w;
                } else {
                    *sample = 0.0;
                }
            }
        };

        let stems = self
            .tracks
            .into_iter()
            .zip(names)
            .map(|((mut left, mut right), name)| {
                normalize(&mut left);
                normalize(&mut right);
                Stem {
                    name: name.clone(),
                    audio: StereoBuffer {
                        sample_rate,
                        left,
                        right,
                    },
                }
            })
            .collect();

        StemData { sample_rate, stems }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::tiling::{crossfade_window, SegmentPlan};

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{}", i)).collect()
    }

    #[test]
    fn test_overlapping_constant_segments_normalize_to_constant() {
        let plan = SegmentPlan::new(300, 100, 75);
        let mut acc = TrackAccumulator::new(2, 300);
        for segment in plan.segments() {
            let window = crossfade_window(segment.length, plan.stride);
            let tracks = vec![
                (vec![0.5; segment.length], vec![-0.5; segment.length]),
                (vec![2.0; segment.length], vec![1.0; segment.length]),
            ];
            acc.accumulate(segment.start, &tracks, &window);
        }

        let stems = acc.finish(&names(2), 44100);
        let first = &stems.stems[0].audio;
        let second = &stems.stems[1].audio;
        // Sample 0 only ever gets weight 0
        assert_eq!(first.left[0], 0.0);
        for i in 1..300 {
            assert!((first.left[i] - 0.5).abs() < 1e-5, "sample {}", i);
            assert!((first.right[i] + 0.5).abs() < 1e-5);
            assert!((second.left[i] - 2.0).abs() < 1e-5);
            assert!((second.right[i] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_writes_past_end_are_clipped() {
        let mut acc = TrackAccumulator::new(1, 10);
        acc.accumulate(6, &[(vec![1.0; 8], vec![1.0; 8])], &[1.0; 8]);
        acc.accumulate(12, &[(vec![1.0; 8], vec![1.0; 8])], &[1.0; 8]);
        let stems = acc.finish(&names(1), 44100);
        assert_eq!(stems.samples_per_channel(), 10);
        assert_eq!(stems.stems[0].audio.left[..6], [0.0; 6]);
        assert_eq!(stems.stems[0].audio.left[6..], [1.0; 4]);
    }
}
