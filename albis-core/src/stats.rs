//! Frame statistics.
//!
//! [`compute_stats`] finds the display range and histogram of a frame,
//! excluding negative values and the inferred saturation value.
//! [`compute_global_stats`] produces masked summary statistics with
//! Welford's online algorithm.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use crate::frame::Frame;
use crate::mask::{Mask, MaskedValue};

/// Minimum number of histogram bins.
pub const MIN_HIST_BINS: usize = 32;
/// Maximum number of histogram bins.
pub const MAX_HIST_BINS: usize = 256;

/// Display range, saturation value and histogram of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    /// Smallest valid value.
    pub min: f64,
    /// Largest valid value.
    pub max: f64,
    /// Inferred saturation ceiling (integer dtypes only).
    pub sat_max: Option<f64>,
    /// Histogram over `[min, max]`.
    pub hist: Vec<u32>,
    /// Whether the histogram x-axis is symlog mapped.
    pub log_x: bool,
}

impl FrameStats {
    /// Result for frames without any valid value.
    #[must_use]
    pub fn degenerate(sat_max: Option<f64>) -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            sat_max,
            hist: Vec::new(),
            log_x: false,
        }
    }

    /// Number of histogram bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.hist.len()
    }

    /// Clamp a manually entered window bound into the valid range.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.min
        }
    }

    /// Map a value to an x position on an axis `width` pixels wide.
    #[must_use]
    pub fn value_to_x(&self, value: f64, width: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        let range = nonzero(self.max - self.min);
        if !self.log_x {
            return (value - self.min) / range * width;
        }
        let min_map = symlog(self.min);
        let map_range = nonzero(symlog(self.max) - min_map);
        ((symlog(value) - min_map) / map_range * width).clamp(0.0, width)
    }

    /// Inverse of [`FrameStats::value_to_x`].
    #[must_use]
    pub fn x_to_value(&self, x: f64, width: f64) -> f64 {
        let t = if width > 0.0 {
            x.clamp(0.0, width) / width
        } else {
            0.0
        };
        if !self.log_x {
            return self.min + t * (self.max - self.min);
        }
        let min_map = symlog(self.min);
        let map_range = nonzero(symlog(self.max) - min_map);
        inv_symlog(min_map + t * map_range)
    }
}

#[inline]
fn nonzero(range: f64) -> f64 {
    if range == 0.0 {
        1.0
    } else {
        range
    }
}

/// Symmetric log: `sign(v) * log10(1 + |v|)`.
#[inline]
#[must_use]
pub fn symlog(v: f64) -> f64 {
    v.signum() * v.abs().ln_1p() / std::f64::consts::LN_10
}

#[inline]
fn inv_symlog(v: f64) -> f64 {
    v.signum() * (10f64.powf(v.abs()) - 1.0)
}

/// Histogram bin count for `count` pixels: `clamp(round(sqrt(N) / 2), 32, 256)`.
#[must_use]
pub fn histogram_bins(count: usize) -> usize {
    if count == 0 {
        return MAX_HIST_BINS;
    }
    let bins = ((count as f64).sqrt() * 0.5).round() as usize;
    bins.clamp(MIN_HIST_BINS, MAX_HIST_BINS)
}

#[inline]
fn is_valid(v: f64, sat_max: Option<f64>) -> bool {
    v.is_finite() && v >= 0.0 && sat_max != Some(v)
}

/// Largest non-negative finite value, `-inf` if none.
#[must_use]
pub fn raw_max(frame: &Frame) -> f64 {
    frame
        .values()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Histogram of valid values over `[min, max]`.
///
/// Negative and saturated entries are dropped rather than clamped.
#[must_use]
pub fn compute_histogram(
    frame: &Frame,
    min: f64,
    max: f64,
    sat_max: Option<f64>,
    bins: usize,
    log_x: bool,
) -> Vec<u32> {
    let mut hist = vec![0u32; bins];
    if !min.is_finite() || !max.is_finite() || bins == 0 {
        return hist;
    }
    let range = nonzero(max - min);
    let min_map = symlog(min);
    let map_range = nonzero(symlog(max) - min_map);
    let last = (bins - 1) as f64;

    for v in frame.values().filter(|&v| is_valid(v, sat_max)) {
        let t = if log_x {
            (symlog(v) - min_map) / map_range
        } else {
            (v - min) / range
        };
        if !t.is_finite() {
            continue;
        }
        let idx = (t * last).floor().clamp(0.0, last) as usize;
        hist[idx] += 1;
    }
    hist
}

/// Compute the display range, saturation value and histogram of a frame.
#[must_use]
pub fn compute_stats(frame: &Frame, log_x: bool) -> FrameStats {
    let sat_max = frame.dtype().saturation_max(raw_max(frame));

    let (min, max) = frame
        .values()
        .filter(|&v| is_valid(v, sat_max))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !min.is_finite() || !max.is_finite() {
        log::debug!("frame has no valid values, using degenerate stats");
        return FrameStats::degenerate(sat_max);
    }

    let bins = histogram_bins(frame.len());
    let hist = compute_histogram(frame, min, max, sat_max, bins, log_x);
    FrameStats {
        min,
        max,
        sat_max,
        hist,
        log_x,
    }
}

/// Welford running statistics accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    mean: f64,
    m2: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
            m2: 0.0,
        }
    }
}

impl RunningStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample.
    #[inline]
    pub fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (v - self.mean);
    }

    /// Running mean, 0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation (`n - 1` denominator), 0 for `n <= 1`.
    #[must_use]
    pub fn std(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / (self.count - 1) as f64).sqrt()
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Masked summary statistics of a whole frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlobalStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
    /// Filled by callers that request a median.
    pub median: Option<f64>,
}

impl From<&RunningStats> for GlobalStats {
    fn from(acc: &RunningStats) -> Self {
        if acc.is_empty() {
            return Self::default();
        }
        Self {
            count: acc.count,
            sum: acc.sum,
            mean: acc.mean(),
            min: acc.min,
            max: acc.max,
            std: acc.std(),
            median: None,
        }
    }
}

/// Single-pass masked statistics.
///
/// Non-finite values are ignored. With a mask, gap pixels count as zero and
/// dead pixels are skipped. A mask whose shape differs from the frame is
/// ignored.
#[must_use]
pub fn compute_global_stats(frame: &Frame, mask: Option<&Mask>) -> GlobalStats {
    let mask = mask.filter(|m| m.matches(frame.width(), frame.height()));
    let mut acc = RunningStats::new();
    for (idx, v) in frame.values().enumerate() {
        if !v.is_finite() {
            continue;
        }
        let v = match mask {
            Some(mask) => {
                let masked = MaskedValue::apply(v, mask.bits(idx));
                if masked.skip {
                    continue;
                }
                masked.value
            }
            None => v,
        };
        acc.push(v);
    }
    GlobalStats::from(&acc)
}
