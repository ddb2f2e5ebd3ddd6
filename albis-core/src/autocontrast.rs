//! Histogram-based auto-contrast.
//!
//! Levels are found on a `log1p` histogram of the valid pixels at the
//! 0.1 % and 99.9 % percentiles, then mapped back with `expm1`. Working in
//! log space keeps a handful of very bright Bragg peaks from flattening
//! the background.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use crate::frame::Frame;
use crate::stats::{raw_max, FrameStats};

/// Lower percentile used for the black level.
pub const LOW_PERCENTILE: f64 = 0.001;
/// Upper percentile used for the white level.
pub const HIGH_PERCENTILE: f64 = 0.999;

const MIN_LOG_BINS: usize = 256;
const MAX_LOG_BINS: usize = 4096;

/// Auto-contrast window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoLevels {
    pub min: f64,
    pub max: f64,
}

impl AutoLevels {
    fn fallback(stats: Option<&FrameStats>) -> Self {
        stats.map_or(Self { min: 0.0, max: 1.0 }, |s| Self {
            min: s.min,
            max: s.max,
        })
    }
}

/// Log histogram bin count: `clamp(round(sqrt(N)) * 4, 256, 4096)`.
#[must_use]
pub fn log_histogram_bins(count: usize) -> usize {
    ((count as f64).sqrt().round() as usize * 4).clamp(MIN_LOG_BINS, MAX_LOG_BINS)
}

/// Compute the auto-contrast window of a frame.
///
/// `sat_max` overrides the inferred saturation value. When no valid
/// window can be found the range of `stats` is used, or `[0, 1]`.
#[must_use]
pub fn compute_auto_levels(
    frame: &Frame,
    sat_max: Option<f64>,
    stats: Option<&FrameStats>,
) -> AutoLevels {
    let sat_max = sat_max.or_else(|| frame.dtype().saturation_max(raw_max(frame)));
    let valid = |v: f64| v.is_finite() && v >= 0.0 && sat_max != Some(v);

    let (count, min_log, max_log) = frame.values().filter(|&v| valid(v)).fold(
        (0usize, f64::INFINITY, f64::NEG_INFINITY),
        |(n, lo, hi), v| {
            let lv = v.ln_1p();
            (n + 1, lo.min(lv), hi.max(lv))
        },
    );
    if count == 0 {
        return AutoLevels::fallback(stats);
    }

    let bins = log_histogram_bins(count);
    let last = (bins - 1) as f64;
    let range = if max_log - min_log == 0.0 {
        1.0
    } else {
        max_log - min_log
    };
    let mut hist = vec![0usize; bins];
    for v in frame.values().filter(|&v| valid(v)) {
        let idx = ((v.ln_1p() - min_log) / range * last)
            .floor()
            .clamp(0.0, last) as usize;
        hist[idx] += 1;
    }

    let low_target = count as f64 * LOW_PERCENTILE;
    let high_target = count as f64 * HIGH_PERCENTILE;
    let mut cumulative = 0usize;
    let mut low_bin = None;
    let mut high_bin = bins - 1;
    for (i, &n) in hist.iter().enumerate() {
        cumulative += n;
        if low_bin.is_none() && cumulative as f64 >= low_target {
            low_bin = Some(i);
        }
        if cumulative as f64 >= high_target {
            high_bin = i;
            break;
        }
    }
    let low_bin = low_bin.unwrap_or(0);
    if high_bin <= low_bin {
        high_bin = (low_bin + 1).min(bins - 1);
    }

    let low_log = min_log + (low_bin as f64 / last) * range;
    let high_log = min_log + (high_bin as f64 / last) * range;
    let levels = AutoLevels {
        min: low_log.exp_m1(),
        max: high_log.exp_m1(),
    };
    if !levels.min.is_finite() || !levels.max.is_finite() || levels.min >= levels.max {
        log::debug!("auto-contrast window collapsed, falling back to frame range");
        return AutoLevels::fallback(stats);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::compute_stats;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_bins_bounds() {
        assert_eq!(log_histogram_bins(1), 256);
        assert_eq!(log_histogram_bins(10_000), 400);
        assert_eq!(log_histogram_bins(100_000_000), 4096);
    }

    #[test]
    fn test_constant_frame_falls_back_to_stats() {
        let frame = Frame::new(4, 4, vec![7u16; 16]).unwrap();
        let stats = compute_stats(&frame, false);
        let levels = compute_auto_levels(&frame, None, Some(&stats));
        // A single populated bin still yields a non-empty window.
        assert!(levels.min < levels.max);
    }

    #[test]
    fn test_empty_frame_without_stats() {
        let frame = Frame::new(2, 1, vec![-1i32, -4]).unwrap();
        let levels = compute_auto_levels(&frame, None, None);
        assert_relative_eq!(levels.min, 0.0);
        assert_relative_eq!(levels.max, 1.0);
    }

    #[test]
    fn test_hot_pixel_does_not_dominate() {
        let mut data: Vec<u32> = (0..10_000).map(|i| 10 + i % 20).collect();
        data[0] = 1_000_000;
        let frame = Frame::new(100, 100, data).unwrap();
        let levels = compute_auto_levels(&frame, None, None);
        assert!(levels.max < 100.0, "max = {}", levels.max);
        assert!(levels.min >= 9.0);
    }

    #[test]
    fn test_saturated_value_excluded() {
        let mut data = vec![100u16; 1000];
        data[..10].fill(u16::MAX);
        data[500] = 200;
        let frame = Frame::new(100, 10, data).unwrap();
        let levels = compute_auto_levels(&frame, None, None);
        assert!(levels.max <= 201.0);
    }
}
