//! Local-maximum peak finder.
//!
//! Candidates are strict-left/up, non-strict-right/down 4-neighbor maxima
//! of the interior pixels. The strongest candidates are kept in a bounded
//! buffer, sorted by intensity and thinned greedily to a minimum
//! separation.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

use albis_core::mask::BAD_BITS;
use albis_core::{Frame, Mask};
use rayon::prelude::*;

/// Default number of peaks reported.
pub const DEFAULT_MAX_PEAKS: usize = 25;
/// Upper bound on the number of peaks a caller may request.
pub const MAX_PEAKS_LIMIT: usize = 500;

/// A detected peak.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peak {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
    /// Raw pixel value.
    pub intensity: f64,
}

impl Peak {
    /// Squared distance to `other` in pixels.
    #[must_use]
    pub fn distance_sq(&self, other: &Peak) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dy = self.y as i64 - other.y as i64;
        dx * dx + dy * dy
    }
}

/// Peak finder configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakFinderConfig {
    /// Maximum number of peaks to report.
    pub max_peaks: usize,
}

impl Default for PeakFinderConfig {
    fn default() -> Self {
        Self {
            max_peaks: DEFAULT_MAX_PEAKS,
        }
    }
}

impl PeakFinderConfig {
    /// Set the peak count, clamped to `1..=500`.
    #[must_use]
    pub fn with_max_peaks(mut self, max_peaks: usize) -> Self {
        self.max_peaks = max_peaks.clamp(1, MAX_PEAKS_LIMIT);
        self
    }

    /// Size of the candidate buffer: `clamp(24 * max_peaks, 128, 4096)`.
    #[must_use]
    pub fn candidate_limit(&self) -> usize {
        (self.max_peaks * 24).clamp(128, 4096)
    }
}

/// Minimum distance between accepted peaks for a frame of this size.
#[must_use]
pub fn min_separation(width: usize, height: usize) -> usize {
    ((width.min(height) as f64 * 0.004).round() as usize).max(4)
}

/// Keeps the `limit` largest candidates seen so far.
struct CandidateBuffer {
    limit: usize,
    peaks: Vec<Peak>,
    min_index: Option<usize>,
    min_value: f64,
}

impl CandidateBuffer {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            peaks: Vec::with_capacity(limit),
            min_index: None,
            min_value: f64::INFINITY,
        }
    }

    fn push(&mut self, peak: Peak) {
        if self.peaks.len() < self.limit {
            if peak.intensity < self.min_value {
                self.min_value = peak.intensity;
                self.min_index = Some(self.peaks.len());
            }
            self.peaks.push(peak);
            return;
        }
        let Some(min_index) = self.min_index else {
            return;
        };
        if peak.intensity <= self.min_value {
            return;
        }
        self.peaks[min_index] = peak;
        self.min_value = f64::INFINITY;
        self.min_index = None;
        for (i, p) in self.peaks.iter().enumerate() {
            if p.intensity < self.min_value {
                self.min_value = p.intensity;
                self.min_index = Some(i);
            }
        }
    }
}

/// Local maxima of row `y`, in column order.
fn row_candidates(frame: &Frame, mask: Option<&Mask>, y: usize) -> Vec<Peak> {
    let width = frame.width();
    let data = frame.data();
    let bad = |idx: usize| mask.is_some_and(|m| m.bits(idx) & BAD_BITS != 0);
    let neighbor = |idx: usize| -> f64 {
        if bad(idx) {
            return f64::NEG_INFINITY;
        }
        data.get(idx)
            .filter(|v| v.is_finite())
            .unwrap_or(f64::NEG_INFINITY)
    };

    let mut out = Vec::new();
    for x in 1..width - 1 {
        let idx = y * width + x;
        let Some(v) = data.get(idx) else {
            continue;
        };
        if !v.is_finite() || v <= 0.0 || bad(idx) {
            continue;
        }
        let left = neighbor(idx - 1);
        let right = neighbor(idx + 1);
        let up = neighbor(idx - width);
        let down = neighbor(idx + width);
        if v > left && v >= right && v > up && v >= down {
            out.push(Peak { x, y, intensity: v });
        }
    }
    out
}

/// Detect up to `config.max_peaks` peaks, strongest first.
///
/// Frames smaller than 3×3 yield no peaks. Pixels with any of the mask bits
/// `0x1f` set are neither candidates nor neighbors; a mask whose shape
/// differs from the frame is ignored.
#[must_use]
pub fn detect_peaks(frame: &Frame, mask: Option<&Mask>, config: &PeakFinderConfig) -> Vec<Peak> {
    let (width, height) = (frame.width(), frame.height());
    if width < 3 || height < 3 || config.max_peaks < 1 {
        return Vec::new();
    }
    let mask = mask.filter(|m| m.matches(width, height));

    let rows: Vec<Vec<Peak>> = (1..height - 1)
        .into_par_iter()
        .map(|y| row_candidates(frame, mask, y))
        .collect();

    let mut buffer = CandidateBuffer::new(config.candidate_limit());
    for peak in rows.into_iter().flatten() {
        buffer.push(peak);
    }
    let mut candidates = buffer.peaks;
    candidates.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));

    let sep = min_separation(width, height) as i64;
    let sep_sq = sep * sep;
    let mut selected: Vec<Peak> = Vec::with_capacity(config.max_peaks);
    for candidate in candidates {
        if selected.iter().all(|p| p.distance_sq(&candidate) >= sep_sq) {
            selected.push(candidate);
            if selected.len() >= config.max_peaks {
                break;
            }
        }
    }
    log::debug!(
        "peak finder kept {} of max {} (separation {sep}px)",
        selected.len(),
        config.max_peaks
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_spots(width: usize, height: usize, spots: &[(usize, usize, f32)]) -> Frame {
        let mut data = vec![1.0f32; width * height];
        for &(x, y, v) in spots {
            data[y * width + x] = v;
        }
        Frame::new(width, height, data).unwrap()
    }

    #[test]
    fn test_config_clamps() {
        assert_eq!(PeakFinderConfig::default().max_peaks, 25);
        assert_eq!(PeakFinderConfig::default().with_max_peaks(0).max_peaks, 1);
        assert_eq!(PeakFinderConfig::default().with_max_peaks(9999).max_peaks, 500);
        assert_eq!(PeakFinderConfig::default().with_max_peaks(1).candidate_limit(), 128);
        assert_eq!(PeakFinderConfig::default().with_max_peaks(500).candidate_limit(), 4096);
    }

    #[test]
    fn test_tiny_frame() {
        let frame = Frame::new(2, 2, vec![5u16; 4]).unwrap();
        assert!(detect_peaks(&frame, None, &PeakFinderConfig::default()).is_empty());
    }

    #[test]
    fn test_sorted_by_intensity() {
        let frame = frame_with_spots(32, 32, &[(5, 5, 10.0), (20, 20, 50.0), (10, 25, 30.0)]);
        let peaks = detect_peaks(&frame, None, &PeakFinderConfig::default());
        let top: Vec<_> = peaks.iter().take(3).map(|p| (p.x, p.y)).collect();
        assert_eq!(top, vec![(20, 20), (10, 25), (5, 5)]);
    }

    #[test]
    fn test_close_peaks_suppressed() {
        let frame = frame_with_spots(32, 32, &[(10, 10, 100.0), (12, 10, 90.0)]);
        let peaks = detect_peaks(&frame, None, &PeakFinderConfig::default().with_max_peaks(2));
        assert_eq!(peaks.len(), 1);
        assert_eq!((peaks[0].x, peaks[0].y), (10, 10));
    }

    #[test]
    fn test_masked_pixels_ignored() {
        let frame = frame_with_spots(16, 16, &[(8, 8, 100.0)]);
        let mut bits = vec![0u32; 256];
        bits[8 * 16 + 8] = 0x10;
        let mask = Mask::new(16, 16, bits).unwrap();
        let peaks = detect_peaks(&frame, Some(&mask), &PeakFinderConfig::default());
        assert!(peaks.iter().all(|p| (p.x, p.y) != (8, 8)));
    }

    #[test]
    fn test_plateau_reports_one_corner() {
        let frame = frame_with_spots(8, 8, &[(3, 3, 7.0), (4, 3, 7.0)]);
        let peaks = detect_peaks(&frame, None, &PeakFinderConfig::default().with_max_peaks(1));
        assert_eq!(peaks.len(), 1);
        assert_eq!((peaks[0].x, peaks[0].y), (3, 3));
    }
}
