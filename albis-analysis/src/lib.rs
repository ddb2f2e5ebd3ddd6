//! albis-analysis: Region and peak analysis for detector frames.
//!
//! This crate provides:
//! - **ROI engine** - line profiles, box projections, radial profiles and
//!   masked statistics with an exact median
//! - **Peak finder** - bounded local-maximum search with separation
//! - **Resolution geometry** - d-spacing at a pixel and ring radii
//!
#![warn(missing_docs)]

pub mod median;
pub mod peaks;
pub mod rings;
pub mod roi;

pub use median::{compute_median, quick_select};
pub use peaks::{detect_peaks, min_separation, Peak, PeakFinderConfig};
pub use rings::DetectorGeometry;
pub use roi::{
    compute_roi, Point, Profile, ProfileKind, Roi, RoiMode, RoiResult, RoiSize, RoiStats,
};

use albis_core::{compute_global_stats, Frame, GlobalStats, Mask};

/// Whole-frame statistics including the median of the contributing values.
#[must_use]
pub fn compute_global_stats_with_median(frame: &Frame, mask: Option<&Mask>) -> GlobalStats {
    let mut stats = compute_global_stats(frame, mask);
    if stats.count == 0 {
        return stats;
    }
    let mask = mask.filter(|m| m.matches(frame.width(), frame.height()));
    let values: Vec<f64> = frame
        .values()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .filter_map(|(idx, v)| match mask {
            Some(mask) => {
                let masked = albis_core::MaskedValue::apply(v, mask.bits(idx));
                (!masked.skip).then_some(masked.value)
            }
            None => Some(v),
        })
        .collect();
    stats.median = Some(compute_median(&values));
    stats
}
