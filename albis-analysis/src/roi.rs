//! Region-of-interest statistics and profiles.
//!
//! Four shapes are supported: a sampled line, an axis-aligned box with
//! column/row mean projections, a disk and an annulus with a radial
//! profile. All shapes share the same masked statistics accumulator.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

use std::fmt;
use std::str::FromStr;

use albis_core::format::format_stat;
use albis_core::{Frame, Mask, MaskedValue, RunningStats};

use crate::median::compute_median;

/// ROI shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RoiMode {
    /// No ROI; whole-frame statistics apply.
    #[default]
    None,
    /// Sampled segment between two points.
    Line,
    /// Axis-aligned rectangle spanned by two corners.
    Box,
    /// Disk centered on the start point through the end point.
    Circle,
    /// Ring between an inner and an outer radius.
    Annulus,
}

impl RoiMode {
    /// Lowercase identifier.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RoiMode::None => "none",
            RoiMode::Line => "line",
            RoiMode::Box => "box",
            RoiMode::Circle => "circle",
            RoiMode::Annulus => "annulus",
        }
    }

    /// Whether the shape is round (circle or annulus).
    #[must_use]
    pub fn is_radial(self) -> bool {
        matches!(self, RoiMode::Circle | RoiMode::Annulus)
    }
}

impl fmt::Display for RoiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(RoiMode::None),
            "line" => Ok(RoiMode::Line),
            "box" => Ok(RoiMode::Box),
            "circle" => Ok(RoiMode::Circle),
            "annulus" | "ring" => Ok(RoiMode::Annulus),
            other => Err(format!("unknown ROI mode: {other}")),
        }
    }
}

/// Image-space point in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    /// Column.
    pub x: f64,
    /// Row.
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// ROI geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Roi {
    /// Shape.
    pub mode: RoiMode,
    /// Line start, box corner, or circle center.
    pub start: Option<Point>,
    /// Line end, opposite box corner, or a point on the outer radius.
    pub end: Option<Point>,
    /// Annulus inner radius; 0 means "derive from the outer radius".
    pub inner_radius: f64,
    /// Outer radius of a circle or annulus.
    pub outer_radius: f64,
}

impl Roi {
    /// ROI of `mode` spanning `start` to `end`.
    #[must_use]
    pub fn new(mode: RoiMode, start: Point, end: Point) -> Self {
        Self {
            mode,
            start: Some(start),
            end: Some(end),
            inner_radius: 0.0,
            outer_radius: start.distance(end),
        }
    }

    /// Set the annulus inner radius.
    #[must_use]
    pub fn with_inner_radius(mut self, inner: f64) -> Self {
        self.inner_radius = inner;
        self
    }

    /// Whether both defining points are set and the mode is not `None`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.mode != RoiMode::None && self.start.is_some() && self.end.is_some()
    }

    /// Resolved `(inner, outer)` radii for round shapes on a
    /// `width` x `height` frame.
    ///
    /// Both points are first clamped to the nearest pixel inside the frame;
    /// the outer radius is `max(1, round(|end - start|))` between those
    /// pixels. A circle has no inner radius; an annulus whose inner radius
    /// is unset or not smaller than the outer one uses half of the outer
    /// radius.
    #[must_use]
    pub fn radii(&self, width: usize, height: usize) -> Option<(u32, u32)> {
        if !self.mode.is_radial() || width == 0 || height == 0 {
            return None;
        }
        let (start, end) = (self.start?, self.end?);
        let dx = clamp_px(end.x, width) as f64 - clamp_px(start.x, width) as f64;
        let dy = clamp_px(end.y, height) as f64 - clamp_px(start.y, height) as f64;
        let outer = dx.hypot(dy).round().max(1.0) as u32;
        if self.mode == RoiMode::Circle {
            return Some((0, outer));
        }
        let mut inner = self.inner_radius.round().max(0.0) as u32;
        if inner == 0 || inner >= outer {
            inner = (f64::from(outer) * 0.5).round() as u32;
        }
        Some((inner, outer))
    }
}

/// Summary statistics over the unmasked pixels of an ROI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiStats {
    /// Pixels contributing.
    pub count: usize,
    /// Sum of contributing values.
    pub sum: f64,
    /// Mean, 0 when empty.
    pub mean: f64,
    /// Minimum, `+inf` when empty.
    pub min: f64,
    /// Maximum, `-inf` when empty.
    pub max: f64,
    /// Sample standard deviation.
    pub std: f64,
    /// Median, NaN when empty.
    pub median: f64,
}

impl RoiStats {
    fn finish(acc: &RunningStats, values: &[f64]) -> Self {
        Self {
            count: acc.count,
            sum: acc.sum,
            mean: acc.mean(),
            min: acc.min,
            max: acc.max,
            std: acc.std(),
            median: compute_median(values),
        }
    }

    /// Whether no pixel contributed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Which plot a profile belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// Samples along a line.
    Line,
    /// Mean intensity per integer radius.
    Radial,
    /// Column means of a box.
    XProjection,
    /// Row means of a box.
    YProjection,
}

impl ProfileKind {
    /// Section title used in CSV export.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            ProfileKind::Line => "Line Profile",
            ProfileKind::Radial => "Radial Profile",
            ProfileKind::XProjection => "X Projection",
            ProfileKind::YProjection => "Y Projection",
        }
    }

    /// `(x, y)` axis labels.
    #[must_use]
    pub fn labels(self) -> (&'static str, &'static str) {
        match self {
            ProfileKind::Line => ("Sample", "Intensity"),
            ProfileKind::Radial => ("Radius (px)", "Intensity"),
            ProfileKind::XProjection => ("X Pixel", "Mean"),
            ProfileKind::YProjection => ("Y Pixel", "Mean"),
        }
    }
}

/// One-dimensional ROI profile with its x-axis metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Plot the profile belongs to.
    pub kind: ProfileKind,
    /// Profile values.
    pub values: Vec<f64>,
    /// X coordinate of the first value.
    pub x_start: f64,
    /// X increment per value.
    pub x_step: f64,
}

impl Profile {
    fn new(kind: ProfileKind, values: Vec<f64>, x_start: f64) -> Self {
        Self {
            kind,
            values,
            x_start,
            x_step: 1.0,
        }
    }

    /// X coordinate of value `i`.
    #[must_use]
    pub fn x_at(&self, i: usize) -> f64 {
        self.x_start + i as f64 * self.x_step
    }

    /// `(x, value)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &v)| (self.x_at(i), v))
    }
}

/// Extent of an ROI for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoiSize {
    /// Line length in pixels.
    Length(f64),
    /// Box size in pixels, inclusive.
    Rect {
        /// Columns.
        width: usize,
        /// Rows.
        height: usize,
    },
    /// Circle radius.
    Radius(u32),
    /// Annulus radii.
    Ring {
        /// Inner radius.
        inner: u32,
        /// Outer radius.
        outer: u32,
    },
}

impl fmt::Display for RoiSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoiSize::Length(len) => f.write_str(&format_stat(*len)),
            RoiSize::Rect { width, height } => write!(f, "{width} × {height}"),
            RoiSize::Radius(r) => write!(f, "{r}"),
            RoiSize::Ring { inner, outer } => write!(f, "{inner} → {outer}"),
        }
    }
}

/// Result of [`compute_roi`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoiResult {
    /// Start point clamped to the frame, in pixels.
    pub start: (usize, usize),
    /// End point clamped to the frame, in pixels.
    pub end: (usize, usize),
    /// ROI extent.
    pub size: RoiSize,
    /// Masked statistics.
    pub stats: RoiStats,
    /// Profiles produced by the shape: one for line and round shapes,
    /// the X and Y projections for a box.
    pub profiles: Vec<Profile>,
}

impl RoiResult {
    /// Profile of `kind`, if the shape produced one.
    #[must_use]
    pub fn profile(&self, kind: ProfileKind) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.kind == kind)
    }
}

/// Frame accessor applying an optional mask.
struct Sampler<'a> {
    frame: &'a Frame,
    mask: Option<&'a Mask>,
}

impl<'a> Sampler<'a> {
    fn new(frame: &'a Frame, mask: Option<&'a Mask>) -> Self {
        let mask = mask.filter(|m| m.matches(frame.width(), frame.height()));
        Self { frame, mask }
    }

    #[inline]
    fn sample(&self, x: usize, y: usize) -> Option<MaskedValue> {
        let idx = y * self.frame.width() + x;
        let value = self.frame.data().get(idx)?;
        Some(match self.mask {
            Some(mask) => MaskedValue::apply(value, mask.bits(idx)),
            None => MaskedValue { value, skip: false },
        })
    }
}

/// Collects values and running statistics for unmasked finite samples.
#[derive(Default)]
struct Accumulator {
    running: RunningStats,
    values: Vec<f64>,
}

impl Accumulator {
    /// Returns whether the sample contributed.
    #[inline]
    fn push(&mut self, sample: MaskedValue) -> bool {
        if sample.skip || !sample.value.is_finite() {
            return false;
        }
        self.running.push(sample.value);
        self.values.push(sample.value);
        true
    }

    fn finish(&self) -> RoiStats {
        RoiStats::finish(&self.running, &self.values)
    }
}

#[inline]
fn clamp_px(v: f64, len: usize) -> usize {
    v.round().clamp(0.0, (len - 1) as f64) as usize
}

/// Compute statistics and profiles for `roi` over `frame`.
///
/// Returns `None` when the ROI is incomplete or the frame is empty. A mask
/// whose shape differs from the frame is ignored.
#[must_use]
pub fn compute_roi(frame: &Frame, mask: Option<&Mask>, roi: &Roi) -> Option<RoiResult> {
    if !roi.is_complete() || frame.is_empty() {
        return None;
    }
    let (start, end) = (roi.start?, roi.end?);
    let (w, h) = (frame.width(), frame.height());
    let x0 = clamp_px(start.x, w);
    let y0 = clamp_px(start.y, h);
    let x1 = clamp_px(end.x, w);
    let y1 = clamp_px(end.y, h);
    let sampler = Sampler::new(frame, mask);

    let (size, stats, profiles) = match roi.mode {
        RoiMode::None => return None,
        RoiMode::Line => line_roi(&sampler, (x0, y0), (x1, y1)),
        RoiMode::Box => box_roi(&sampler, (x0, y0), (x1, y1)),
        RoiMode::Circle | RoiMode::Annulus => {
            let (inner, outer) = roi.radii(w, h)?;
            radial_roi(&sampler, (x0, y0), inner, outer, roi.mode)
        }
    };

    Some(RoiResult {
        start: (x0, y0),
        end: (x1, y1),
        size,
        stats,
        profiles,
    })
}

type ShapeOutput = (RoiSize, RoiStats, Vec<Profile>);

fn line_roi(sampler: &Sampler<'_>, p0: (usize, usize), p1: (usize, usize)) -> ShapeOutput {
    let (w, h) = (sampler.frame.width(), sampler.frame.height());
    let dx = p1.0 as f64 - p0.0 as f64;
    let dy = p1.1 as f64 - p0.1 as f64;
    let steps = dx.abs().max(dy.abs()) as usize;
    let mut acc = Accumulator::default();
    let mut profile = Vec::with_capacity(steps + 1);

    for i in 0..=steps {
        let t = if steps == 0 {
            0.0
        } else {
            i as f64 / steps as f64
        };
        let ix = clamp_px(p0.0 as f64 + dx * t, w);
        let iy = clamp_px(p0.1 as f64 + dy * t, h);
        let Some(sample) = sampler.sample(ix, iy) else {
            continue;
        };
        profile.push(if sample.value.is_finite() {
            sample.value
        } else {
            0.0
        });
        acc.push(sample);
    }

    (
        RoiSize::Length(dx.hypot(dy)),
        acc.finish(),
        vec![Profile::new(ProfileKind::Line, profile, 0.0)],
    )
}

fn box_roi(sampler: &Sampler<'_>, p0: (usize, usize), p1: (usize, usize)) -> ShapeOutput {
    let (left, right) = (p0.0.min(p1.0), p0.0.max(p1.0));
    let (top, bottom) = (p0.1.min(p1.1), p0.1.max(p1.1));
    let width = right - left + 1;
    let height = bottom - top + 1;
    let mut x_sum = vec![0.0; width];
    let mut y_sum = vec![0.0; height];
    let mut x_count = vec![0u32; width];
    let mut y_count = vec![0u32; height];
    let mut acc = Accumulator::default();

    for y in top..=bottom {
        for x in left..=right {
            let Some(sample) = sampler.sample(x, y) else {
                continue;
            };
            if acc.push(sample) {
                x_sum[x - left] += sample.value;
                y_sum[y - top] += sample.value;
                x_count[x - left] += 1;
                y_count[y - top] += 1;
            }
        }
    }

    let means = |sums: Vec<f64>, counts: &[u32]| -> Vec<f64> {
        sums.into_iter()
            .zip(counts)
            .map(|(s, &n)| if n > 0 { s / f64::from(n) } else { 0.0 })
            .collect()
    };

    (
        RoiSize::Rect { width, height },
        acc.finish(),
        vec![
            Profile::new(ProfileKind::XProjection, means(x_sum, &x_count), left as f64),
            Profile::new(ProfileKind::YProjection, means(y_sum, &y_count), top as f64),
        ],
    )
}

fn radial_roi(
    sampler: &Sampler<'_>,
    center: (usize, usize),
    inner: u32,
    outer: u32,
    mode: RoiMode,
) -> ShapeOutput {
    let (w, h) = (sampler.frame.width(), sampler.frame.height());
    let (cx, cy) = (center.0 as i64, center.1 as i64);
    let r = i64::from(outer);
    let left = (cx - r).max(0) as usize;
    let right = (cx + r).min(w as i64 - 1) as usize;
    let top = (cy - r).max(0) as usize;
    let bottom = (cy + r).min(h as i64 - 1) as usize;
    let inner_r2 = i64::from(inner).pow(2);
    let outer_r2 = r * r;
    let bins = outer as usize + 1;
    let mut radial_sum = vec![0.0; bins];
    let mut radial_count = vec![0u32; bins];
    let mut acc = Accumulator::default();

    for y in top..=bottom {
        let dy = y as i64 - cy;
        for x in left..=right {
            let dx = x as i64 - cx;
            let r2 = dx * dx + dy * dy;
            if r2 > outer_r2 || r2 < inner_r2 {
                continue;
            }
            let Some(sample) = sampler.sample(x, y) else {
                continue;
            };
            if acc.push(sample) {
                let bin = ((r2 as f64).sqrt().floor() as usize).min(outer as usize);
                radial_sum[bin] += sample.value;
                radial_count[bin] += 1;
            }
        }
    }

    let profile: Vec<f64> = radial_sum
        .iter()
        .zip(&radial_count)
        .map(|(&s, &n)| if n > 0 { s / f64::from(n) } else { 0.0 })
        .collect();

    let (size, display_start) = if mode == RoiMode::Annulus {
        let start = if inner > 0 {
            (inner as usize).min(profile.len() - 1)
        } else {
            0
        };
        (RoiSize::Ring { inner, outer }, start)
    } else {
        (RoiSize::Radius(outer), 0)
    };
    let display = profile[display_start..].to_vec();

    (
        size,
        acc.finish(),
        vec![Profile::new(ProfileKind::Radial, display, display_start as f64)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(width: usize, height: usize) -> Frame {
        let data: Vec<f32> = (0..width * height).map(|i| i as f32).collect();
        Frame::new(width, height, data).unwrap()
    }

    #[test]
    fn test_incomplete_roi() {
        let frame = ramp(4, 4);
        let roi = Roi {
            mode: RoiMode::Box,
            start: Some(Point::new(0.0, 0.0)),
            ..Roi::default()
        };
        assert!(compute_roi(&frame, None, &roi).is_none());
    }

    #[test]
    fn test_horizontal_line() {
        let frame = ramp(5, 3);
        let roi = Roi::new(RoiMode::Line, Point::new(0.0, 1.0), Point::new(4.0, 1.0));
        let result = compute_roi(&frame, None, &roi).unwrap();
        let profile = result.profile(ProfileKind::Line).unwrap();
        assert_eq!(profile.values, vec![5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(result.stats.count, 5);
        assert_relative_eq!(result.stats.median, 7.0);
        assert_eq!(result.size, RoiSize::Length(4.0));
    }

    #[test]
    fn test_line_keeps_masked_samples_in_profile() {
        let frame = ramp(3, 1);
        let mask = Mask::new(3, 1, vec![0, 2, 0]).unwrap();
        let roi = Roi::new(RoiMode::Line, Point::new(0.0, 0.0), Point::new(2.0, 0.0));
        let result = compute_roi(&frame, Some(&mask), &roi).unwrap();
        let profile = result.profile(ProfileKind::Line).unwrap();
        assert_eq!(profile.values, vec![0.0, 0.0, 2.0]);
        assert_eq!(result.stats.count, 2);
    }

    #[test]
    fn test_single_point_line() {
        let frame = ramp(3, 3);
        let roi = Roi::new(RoiMode::Line, Point::new(1.0, 1.0), Point::new(1.0, 1.0));
        let result = compute_roi(&frame, None, &roi).unwrap();
        assert_eq!(result.profile(ProfileKind::Line).unwrap().values, vec![4.0]);
    }

    #[test]
    fn test_box_projections() {
        let frame = ramp(4, 4);
        let roi = Roi::new(RoiMode::Box, Point::new(2.0, 2.0), Point::new(1.0, 1.0));
        let result = compute_roi(&frame, None, &roi).unwrap();
        assert_eq!(result.size, RoiSize::Rect { width: 2, height: 2 });
        let xp = result.profile(ProfileKind::XProjection).unwrap();
        assert_eq!(xp.values, vec![7.0, 8.0]);
        assert_relative_eq!(xp.x_start, 1.0);
        let yp = result.profile(ProfileKind::YProjection).unwrap();
        assert_eq!(yp.values, vec![5.5, 9.5]);
        assert_relative_eq!(result.stats.sum, 30.0);
    }

    #[test]
    fn test_box_clamped_to_frame() {
        let frame = ramp(4, 4);
        let roi = Roi::new(RoiMode::Box, Point::new(-5.0, -5.0), Point::new(10.0, 10.0));
        let result = compute_roi(&frame, None, &roi).unwrap();
        assert_eq!(result.start, (0, 0));
        assert_eq!(result.end, (3, 3));
        assert_eq!(result.stats.count, 16);
    }

    #[test]
    fn test_circle_radius_and_profile() {
        let frame = Frame::new(9, 9, vec![1u16; 81]).unwrap();
        let roi = Roi::new(RoiMode::Circle, Point::new(4.0, 4.0), Point::new(6.0, 4.0));
        assert_eq!(roi.radii(9, 9), Some((0, 2)));
        let result = compute_roi(&frame, None, &roi).unwrap();
        assert_eq!(result.size, RoiSize::Radius(2));
        // r^2 <= 4 covers 13 pixels.
        assert_eq!(result.stats.count, 13);
        let profile = result.profile(ProfileKind::Radial).unwrap();
        assert_eq!(profile.values, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_annulus_default_inner_radius() {
        let roi = Roi::new(RoiMode::Annulus, Point::new(10.0, 10.0), Point::new(10.0, 18.0));
        assert_eq!(roi.radii(32, 32), Some((4, 8)));
        let roi = roi.with_inner_radius(9.0);
        assert_eq!(roi.radii(32, 32), Some((4, 8)));
        let roi = roi.with_inner_radius(3.0);
        assert_eq!(roi.radii(32, 32), Some((3, 8)));
    }

    #[test]
    fn test_radius_measured_between_clamped_pixels() {
        let roi = Roi::new(RoiMode::Circle, Point::new(2.0, 2.0), Point::new(-6.4, 2.0));
        assert_eq!(roi.radii(20, 20), Some((0, 2)));
        assert_eq!(roi.radii(0, 20), None);

        let frame = Frame::new(20, 20, vec![1u16; 400]).unwrap();
        let result = compute_roi(&frame, None, &roi).unwrap();
        assert_eq!(result.size, RoiSize::Radius(2));
        assert_eq!(result.profile(ProfileKind::Radial).unwrap().values.len(), 3);

        let roi = Roi::new(RoiMode::Circle, Point::new(4.4, 4.0), Point::new(6.6, 4.0));
        assert_eq!(roi.radii(20, 20), Some((0, 3)));
    }

    #[test]
    fn test_annulus_profile_starts_at_inner_radius() {
        let frame = Frame::new(21, 21, vec![2.0f32; 441]).unwrap();
        let roi = Roi::new(RoiMode::Annulus, Point::new(10.0, 10.0), Point::new(16.0, 10.0))
            .with_inner_radius(2.0);
        let result = compute_roi(&frame, None, &roi).unwrap();
        let profile = result.profile(ProfileKind::Radial).unwrap();
        assert_relative_eq!(profile.x_start, 2.0);
        assert_eq!(profile.values.len(), 5);
        assert_eq!(result.size.to_string(), "2 → 6");
    }

    #[test]
    fn test_all_masked_box() {
        let frame = ramp(2, 2);
        let mask = Mask::new(2, 2, vec![2, 4, 8, 16]).unwrap();
        let roi = Roi::new(RoiMode::Box, Point::new(0.0, 0.0), Point::new(1.0, 1.0));
        let result = compute_roi(&frame, Some(&mask), &roi).unwrap();
        assert!(result.stats.is_empty());
        assert!(result.stats.median.is_nan());
        assert_eq!(
            result.profile(ProfileKind::XProjection).unwrap().values,
            vec![0.0, 0.0]
        );
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Annulus".parse::<RoiMode>().unwrap(), RoiMode::Annulus);
        assert!("polygon".parse::<RoiMode>().is_err());
    }
}
