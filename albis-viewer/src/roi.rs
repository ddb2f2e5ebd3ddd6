//! ROI drawing, hit testing and handle editing.
//!
//! Geometry lives in image pixel coordinates. Hit tests take the current
//! zoom so that handle and line tolerances stay a fixed number of screen
//! pixels.
#![allow(clippy::cast_precision_loss)]

use albis_analysis::{compute_roi, Point, Roi, RoiMode, RoiResult};
use albis_core::{Frame, Mask};

/// Handle hit radius in screen pixels.
pub const HANDLE_RADIUS_PX: f64 = 6.0;

/// Draggable part of an ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiHandle {
    /// Whole-shape translation.
    Move,
    LineStart,
    LineEnd,
    /// Box corner at `(start.x, start.y)`.
    BoxNw,
    /// Box corner at `(end.x, start.y)`.
    BoxNe,
    /// Box corner at `(end.x, end.y)`.
    BoxSe,
    /// Box corner at `(start.x, end.y)`.
    BoxSw,
    /// Circle or annulus center.
    Center,
    /// Point on the outer radius.
    Outer,
    /// Point on the annulus inner radius.
    Inner,
}

impl RoiHandle {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RoiHandle::Move => "move",
            RoiHandle::LineStart => "line-start",
            RoiHandle::LineEnd => "line-end",
            RoiHandle::BoxNw => "box-nw",
            RoiHandle::BoxNe => "box-ne",
            RoiHandle::BoxSe => "box-se",
            RoiHandle::BoxSw => "box-sw",
            RoiHandle::Center => "center",
            RoiHandle::Outer => "outer",
            RoiHandle::Inner => "inner",
        }
    }
}

/// Geometry captured when an edit drag starts.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RoiSnapshot {
    start: Point,
    end: Point,
    inner: f64,
    outer: f64,
}

#[derive(Debug, Clone, Copy)]
struct RoiEditDrag {
    handle: RoiHandle,
    origin: Point,
    snapshot: RoiSnapshot,
}

/// ROI session state: geometry, drags and the latest result.
#[derive(Debug, Default)]
pub struct RoiState {
    roi: Roi,
    drawing: bool,
    edit_drag: Option<RoiEditDrag>,
    result: Option<RoiResult>,
}

impl RoiState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> RoiMode {
        self.roi.mode
    }

    #[must_use]
    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    /// Result of the last [`RoiState::update`].
    #[must_use]
    pub fn result(&self) -> Option<&RoiResult> {
        self.result.as_ref()
    }

    /// Whether a complete ROI is defined.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.roi.is_complete()
    }

    /// Switch the ROI shape. `None` clears geometry and profiles.
    pub fn set_mode(&mut self, mode: RoiMode) {
        if mode == RoiMode::None {
            self.clear();
            self.roi.mode = RoiMode::None;
            return;
        }
        self.roi.mode = mode;
        if mode == RoiMode::Circle {
            self.roi.inner_radius = 0.0;
        }
        self.result = None;
    }

    /// Drop the geometry but keep the mode.
    pub fn clear(&mut self) {
        self.roi = Roi {
            mode: self.roi.mode,
            ..Roi::default()
        };
        self.drawing = false;
        self.edit_drag = None;
        self.result = None;
    }

    /// Begin drawing a new ROI at `point`.
    pub fn begin_draw(&mut self, point: Point) -> bool {
        if self.roi.mode == RoiMode::None {
            return false;
        }
        self.roi.start = Some(point);
        self.roi.end = Some(point);
        if self.roi.mode.is_radial() {
            self.roi.outer_radius = 0.0;
            if self.roi.mode == RoiMode::Circle {
                self.roi.inner_radius = 0.0;
            }
        }
        self.drawing = true;
        true
    }

    /// Move the free end of the ROI being drawn.
    pub fn update_draw(&mut self, point: Point) {
        if !self.drawing {
            return;
        }
        self.roi.end = Some(point);
        let Some(start) = self.roi.start else {
            return;
        };
        if self.roi.mode.is_radial() {
            let outer = start.distance(point).round().max(0.0);
            self.roi.outer_radius = outer;
            if self.roi.mode == RoiMode::Annulus
                && (self.roi.inner_radius == 0.0 || self.roi.inner_radius >= outer)
            {
                self.roi.inner_radius = (outer * 0.5).round().max(0.0);
            }
        }
    }

    /// Finish drawing.
    pub fn end_draw(&mut self) {
        self.drawing = false;
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Place a round ROI's center, keeping its radius.
    pub fn set_center(&mut self, center: Point, width: usize) {
        if !self.roi.mode.is_radial() {
            return;
        }
        let outer = self.roi.outer_radius.round().max(0.0);
        self.roi.start = Some(center);
        self.place_outer(outer, width);
    }

    /// Set the circle radius or annulus outer radius.
    pub fn set_outer_radius(&mut self, radius: f64, width: usize) {
        if !self.roi.mode.is_radial() {
            return;
        }
        if self.roi.start.is_none() {
            return;
        }
        self.place_outer(radius.round().max(0.0), width);
    }

    /// Set the annulus inner radius.
    pub fn set_inner_radius(&mut self, radius: f64) {
        if self.roi.mode != RoiMode::Annulus || self.roi.start.is_none() {
            return;
        }
        self.roi.inner_radius = radius.round().max(0.0);
    }

    fn place_outer(&mut self, outer: f64, width: usize) {
        let Some(start) = self.roi.start else {
            return;
        };
        let max_x = width.saturating_sub(1) as f64;
        let end_x = (start.x + outer).min(max_x);
        self.roi.end = Some(Point::new(end_x, start.y));
        self.roi.outer_radius = (end_x - start.x).round().max(0.0);
    }

    /// Handle under `point`, with a tolerance of [`HANDLE_RADIUS_PX`]
    /// screen pixels at `zoom`.
    #[must_use]
    pub fn handle_at(&self, point: Point, zoom: f64) -> Option<RoiHandle> {
        let (start, end) = (self.roi.start?, self.roi.end?);
        let tol = HANDLE_RADIUS_PX / zoom_or_one(zoom);
        let hit = |x: f64, y: f64| (point.x - x).abs() <= tol && (point.y - y).abs() <= tol;
        match self.roi.mode {
            RoiMode::None => None,
            RoiMode::Line => {
                if hit(start.x, start.y) {
                    Some(RoiHandle::LineStart)
                } else if hit(end.x, end.y) {
                    Some(RoiHandle::LineEnd)
                } else {
                    None
                }
            }
            RoiMode::Box => [
                (start.x, start.y, RoiHandle::BoxNw),
                (end.x, start.y, RoiHandle::BoxNe),
                (end.x, end.y, RoiHandle::BoxSe),
                (start.x, end.y, RoiHandle::BoxSw),
            ]
            .into_iter()
            .find(|&(x, y, _)| hit(x, y))
            .map(|(_, _, handle)| handle),
            RoiMode::Circle | RoiMode::Annulus => {
                if hit(start.x, start.y) {
                    return Some(RoiHandle::Center);
                }
                if hit(end.x, end.y) {
                    return Some(RoiHandle::Outer);
                }
                let inner = self.roi.inner_radius;
                if self.roi.mode == RoiMode::Annulus && inner > 0.0 {
                    let (ux, uy) = unit(start, end);
                    if hit(start.x + inner * ux, start.y + inner * uy) {
                        return Some(RoiHandle::Inner);
                    }
                }
                None
            }
        }
    }

    /// Whether `point` lies on the ROI body.
    ///
    /// Boxes test the inclusive rectangle, round shapes the outer disk and
    /// lines a band of [`HANDLE_RADIUS_PX`] screen pixels at `zoom`.
    #[must_use]
    pub fn contains(&self, point: Point, zoom: f64) -> bool {
        let (Some(start), Some(end)) = (self.roi.start, self.roi.end) else {
            return false;
        };
        match self.roi.mode {
            RoiMode::None => false,
            RoiMode::Box => {
                point.x >= start.x.min(end.x)
                    && point.x <= start.x.max(end.x)
                    && point.y >= start.y.min(end.y)
                    && point.y <= start.y.max(end.y)
            }
            RoiMode::Circle | RoiMode::Annulus => start.distance(point) <= start.distance(end),
            RoiMode::Line => {
                distance_point_to_segment(point, start, end) <= HANDLE_RADIUS_PX / zoom_or_one(zoom)
            }
        }
    }

    /// Start an edit drag. `None` means a move.
    pub fn start_edit_drag(&mut self, handle: Option<RoiHandle>, point: Point) -> bool {
        let (Some(start), Some(end)) = (self.roi.start, self.roi.end) else {
            return false;
        };
        let outer = if self.roi.outer_radius > 0.0 {
            self.roi.outer_radius
        } else {
            start.distance(end)
        };
        self.edit_drag = Some(RoiEditDrag {
            handle: handle.unwrap_or(RoiHandle::Move),
            origin: point,
            snapshot: RoiSnapshot {
                start,
                end,
                inner: self.roi.inner_radius.max(0.0),
                outer,
            },
        });
        true
    }

    /// Apply the edit drag for the pointer at `point` on a
    /// `width` x `height` frame. Offsets are measured from where the drag
    /// started, so the shape never drifts.
    pub fn update_edit_drag(&mut self, point: Point, width: usize, height: usize) {
        let Some(edit) = self.edit_drag else {
            return;
        };
        let snap = edit.snapshot;
        let mode = self.roi.mode;
        match edit.handle {
            RoiHandle::Move | RoiHandle::Center => {
                let (dx, dy) = clamp_delta(
                    mode,
                    &snap,
                    point.x - edit.origin.x,
                    point.y - edit.origin.y,
                    width,
                    height,
                );
                self.set_points(
                    Point::new(snap.start.x + dx, snap.start.y + dy),
                    Point::new(snap.end.x + dx, snap.end.y + dy),
                );
                self.roi.inner_radius = snap.inner;
                self.roi.outer_radius = snap.outer;
            }
            RoiHandle::BoxNw if mode == RoiMode::Box => self.set_points(point, snap.end),
            RoiHandle::BoxNe if mode == RoiMode::Box => self.set_points(
                Point::new(snap.start.x, point.y),
                Point::new(point.x, snap.end.y),
            ),
            RoiHandle::BoxSe if mode == RoiMode::Box => self.set_points(snap.start, point),
            RoiHandle::BoxSw if mode == RoiMode::Box => self.set_points(
                Point::new(point.x, snap.start.y),
                Point::new(snap.end.x, point.y),
            ),
            RoiHandle::LineStart if mode == RoiMode::Line => self.set_points(point, snap.end),
            RoiHandle::LineEnd if mode == RoiMode::Line => self.set_points(snap.start, point),
            RoiHandle::Outer if mode.is_radial() => {
                self.set_points(snap.start, point);
                let outer = snap.start.distance(point).round().max(0.0);
                self.roi.outer_radius = outer;
                self.roi.inner_radius = if mode == RoiMode::Circle {
                    0.0
                } else {
                    snap.inner.min(outer - 1.0).max(0.0)
                };
            }
            RoiHandle::Inner if mode == RoiMode::Annulus => {
                self.set_points(snap.start, snap.end);
                let inner = snap
                    .start
                    .distance(point)
                    .round()
                    .clamp(0.0, (snap.outer - 1.0).max(0.0));
                self.roi.outer_radius = snap.outer;
                self.roi.inner_radius = inner;
            }
            _ => {}
        }
    }

    /// End the edit drag.
    pub fn end_edit_drag(&mut self) {
        self.edit_drag = None;
    }

    /// Whether an edit drag is in progress.
    #[must_use]
    pub fn is_edit_dragging(&self) -> bool {
        self.edit_drag.is_some()
    }

    /// Handle of the edit drag in progress.
    #[must_use]
    pub fn edit_handle(&self) -> Option<RoiHandle> {
        self.edit_drag.map(|edit| edit.handle)
    }

    /// Translation `(dx, dy)` reduced so the current ROI stays inside a
    /// `width` x `height` frame. Round shapes are bounded by their outer
    /// disk.
    #[must_use]
    pub fn clamp_delta(&self, dx: f64, dy: f64, width: usize, height: usize) -> (f64, f64) {
        let (Some(start), Some(end)) = (self.roi.start, self.roi.end) else {
            return (dx, dy);
        };
        let snap = RoiSnapshot {
            start,
            end,
            inner: self.roi.inner_radius,
            outer: self.roi.outer_radius,
        };
        clamp_delta(self.roi.mode, &snap, dx, dy, width, height)
    }

    /// Recompute the ROI result on `frame`. Round shapes take the radii
    /// the statistics were computed with.
    pub fn update(&mut self, frame: &Frame, mask: Option<&Mask>) -> Option<&RoiResult> {
        if let Some((inner, outer)) = self.roi.radii(frame.width(), frame.height()) {
            self.roi.outer_radius = f64::from(outer);
            if self.roi.mode == RoiMode::Annulus {
                self.roi.inner_radius = f64::from(inner);
            }
        }
        self.result = if self.roi.is_complete() {
            compute_roi(frame, mask, &self.roi)
        } else {
            None
        };
        self.result.as_ref()
    }

    fn set_points(&mut self, start: Point, end: Point) {
        self.roi.start = Some(start);
        self.roi.end = Some(end);
    }
}

fn zoom_or_one(zoom: f64) -> f64 {
    if zoom.is_finite() && zoom > 0.0 {
        zoom
    } else {
        1.0
    }
}

fn unit(start: Point, end: Point) -> (f64, f64) {
    let len = start.distance(end);
    if len > 0.0 {
        ((end.x - start.x) / len, (end.y - start.y) / len)
    } else {
        (1.0, 0.0)
    }
}

fn clamp_delta(
    mode: RoiMode,
    snap: &RoiSnapshot,
    mut dx: f64,
    mut dy: f64,
    width: usize,
    height: usize,
) -> (f64, f64) {
    if width == 0 || height == 0 {
        return (dx, dy);
    }
    let (start, end) = (snap.start, snap.end);
    let (min_x, max_x, min_y, max_y) = if mode.is_radial() {
        let r = if snap.outer > 0.0 {
            snap.outer
        } else {
            start.distance(end)
        };
        (start.x - r, start.x + r, start.y - r, start.y + r)
    } else {
        (
            start.x.min(end.x),
            start.x.max(end.x),
            start.y.min(end.y),
            start.y.max(end.y),
        )
    };
    let right = (width - 1) as f64;
    let bottom = (height - 1) as f64;
    if min_x + dx < 0.0 {
        dx = -min_x;
    }
    if max_x + dx > right {
        dx = right - max_x;
    }
    if min_y + dy < 0.0 {
        dy = -min_y;
    }
    if max_y + dy > bottom {
        dy = bottom - max_y;
    }
    (dx, dy)
}

fn distance_point_to_segment(point: Point, a: Point, b: Point) -> f64 {
    let (vx, vy) = (b.x - a.x, b.y - a.y);
    let (wx, wy) = (point.x - a.x, point.y - a.y);
    let c1 = vx * wx + vy * wy;
    if c1 <= 0.0 {
        return wx.hypot(wy);
    }
    let c2 = vx * vx + vy * vy;
    if c2 <= c1 {
        return point.distance(b);
    }
    let t = c1 / c2;
    point.distance(Point::new(a.x + t * vx, a.y + t * vy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use albis_analysis::RoiSize;
    use approx::assert_relative_eq;

    fn state_with(mode: RoiMode, start: Point, end: Point) -> RoiState {
        let mut state = RoiState::new();
        state.set_mode(mode);
        state.begin_draw(start);
        state.update_draw(end);
        state.end_draw();
        state
    }

    #[test]
    fn test_set_mode_none_clears() {
        let mut state = state_with(RoiMode::Box, Point::new(1.0, 1.0), Point::new(4.0, 4.0));
        let frame = Frame::new(8, 8, vec![1u16; 64]).unwrap();
        assert!(state.update(&frame, None).is_some());
        state.set_mode(RoiMode::None);
        assert!(!state.is_active());
        assert!(state.result().is_none());
        assert!(!state.begin_draw(Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_annulus_draw_defaults_inner() {
        let state = state_with(RoiMode::Annulus, Point::new(10.0, 10.0), Point::new(20.0, 10.0));
        assert_relative_eq!(state.roi().outer_radius, 10.0);
        assert_relative_eq!(state.roi().inner_radius, 5.0);
    }

    #[test]
    fn test_box_handles() {
        let state = state_with(RoiMode::Box, Point::new(10.0, 10.0), Point::new(30.0, 20.0));
        assert_eq!(state.handle_at(Point::new(11.0, 9.0), 1.0), Some(RoiHandle::BoxNw));
        assert_eq!(state.handle_at(Point::new(30.0, 10.0), 1.0), Some(RoiHandle::BoxNe));
        assert_eq!(state.handle_at(Point::new(30.0, 20.0), 1.0), Some(RoiHandle::BoxSe));
        assert_eq!(state.handle_at(Point::new(10.0, 20.0), 1.0), Some(RoiHandle::BoxSw));
        assert_eq!(state.handle_at(Point::new(20.0, 15.0), 1.0), None);
        // At 4x zoom the tolerance shrinks to 1.5 image pixels.
        assert_eq!(state.handle_at(Point::new(13.0, 10.0), 4.0), None);
    }

    #[test]
    fn test_annulus_inner_handle() {
        let mut state = state_with(RoiMode::Annulus, Point::new(50.0, 50.0), Point::new(50.0, 90.0));
        state.set_inner_radius(10.0);
        assert_eq!(state.handle_at(Point::new(50.0, 50.0), 1.0), Some(RoiHandle::Center));
        assert_eq!(state.handle_at(Point::new(50.0, 90.0), 1.0), Some(RoiHandle::Outer));
        assert_eq!(state.handle_at(Point::new(51.0, 60.0), 1.0), Some(RoiHandle::Inner));
    }

    #[test]
    fn test_contains() {
        let line = state_with(RoiMode::Line, Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        assert!(line.contains(Point::new(50.0, 5.0), 1.0));
        assert!(!line.contains(Point::new(50.0, 5.0), 2.0));
        assert!(!line.contains(Point::new(110.0, 0.0), 1.0));

        let circle = state_with(RoiMode::Circle, Point::new(10.0, 10.0), Point::new(15.0, 10.0));
        assert!(circle.contains(Point::new(10.0, 14.0), 1.0));
        assert!(!circle.contains(Point::new(10.0, 16.0), 1.0));
    }

    #[test]
    fn test_move_is_clamped_to_frame() {
        let mut state = state_with(RoiMode::Box, Point::new(2.0, 2.0), Point::new(6.0, 5.0));
        assert!(state.start_edit_drag(None, Point::new(4.0, 4.0)));
        state.update_edit_drag(Point::new(-10.0, 100.0), 10, 10);
        assert_eq!(state.roi().start, Some(Point::new(0.0, 6.0)));
        assert_eq!(state.roi().end, Some(Point::new(4.0, 9.0)));
        state.end_edit_drag();
        assert!(!state.is_edit_dragging());
    }

    #[test]
    fn test_move_measured_from_drag_origin() {
        let mut state = state_with(RoiMode::Line, Point::new(2.0, 2.0), Point::new(4.0, 2.0));
        state.start_edit_drag(None, Point::new(3.0, 2.0));
        state.update_edit_drag(Point::new(4.0, 3.0), 20, 20);
        state.update_edit_drag(Point::new(5.0, 3.0), 20, 20);
        assert_eq!(state.roi().start, Some(Point::new(4.0, 3.0)));
        assert_eq!(state.roi().end, Some(Point::new(6.0, 3.0)));
    }

    #[test]
    fn test_box_corner_edit() {
        let mut state = state_with(RoiMode::Box, Point::new(10.0, 10.0), Point::new(30.0, 20.0));
        state.start_edit_drag(Some(RoiHandle::BoxNe), Point::new(30.0, 10.0));
        state.update_edit_drag(Point::new(40.0, 5.0), 100, 100);
        assert_eq!(state.roi().start, Some(Point::new(10.0, 5.0)));
        assert_eq!(state.roi().end, Some(Point::new(40.0, 20.0)));
    }

    #[test]
    fn test_outer_edit_caps_inner() {
        let mut state = state_with(RoiMode::Annulus, Point::new(50.0, 50.0), Point::new(70.0, 50.0));
        state.set_inner_radius(15.0);
        state.start_edit_drag(Some(RoiHandle::Outer), Point::new(70.0, 50.0));
        state.update_edit_drag(Point::new(58.0, 50.0), 100, 100);
        assert_relative_eq!(state.roi().outer_radius, 8.0);
        assert_relative_eq!(state.roi().inner_radius, 7.0);
    }

    #[test]
    fn test_inner_edit_keeps_outer() {
        let mut state = state_with(RoiMode::Annulus, Point::new(50.0, 50.0), Point::new(70.0, 50.0));
        state.start_edit_drag(Some(RoiHandle::Inner), Point::new(60.0, 50.0));
        state.update_edit_drag(Point::new(50.0, 85.0), 100, 100);
        assert_relative_eq!(state.roi().inner_radius, 19.0);
        assert_relative_eq!(state.roi().outer_radius, 20.0);
        assert_eq!(state.roi().end, Some(Point::new(70.0, 50.0)));

        let frame = Frame::new(100, 100, vec![1u16; 100 * 100]).unwrap();
        state.update(&frame, None);
        assert_relative_eq!(state.roi().inner_radius, 19.0);
    }

    #[test]
    fn test_round_clamp_uses_radius() {
        let state = state_with(RoiMode::Circle, Point::new(10.0, 10.0), Point::new(15.0, 10.0));
        assert_eq!(state.clamp_delta(-20.0, 0.0, 50, 50), (-5.0, 0.0));
        assert_eq!(state.clamp_delta(0.0, 100.0, 50, 50), (0.0, 34.0));
    }

    #[test]
    fn test_set_outer_radius_clamps_to_width() {
        let mut state = RoiState::new();
        state.set_mode(RoiMode::Circle);
        state.set_center(Point::new(90.0, 40.0), 100);
        state.set_outer_radius(25.0, 100);
        assert_eq!(state.roi().end, Some(Point::new(99.0, 40.0)));
        assert_relative_eq!(state.roi().outer_radius, 9.0);
        assert_eq!(state.clamp_delta(20.0, 0.0, 100, 100), (0.0, 0.0));
        assert_eq!(state.clamp_delta(-100.0, 0.0, 100, 100), (-81.0, 0.0));
    }

    #[test]
    fn test_update_syncs_radius_with_frame() {
        let mut state = state_with(RoiMode::Annulus, Point::new(2.0, 5.0), Point::new(-10.0, 5.0));
        assert_relative_eq!(state.roi().outer_radius, 12.0);
        let frame = Frame::new(20, 20, vec![1u16; 400]).unwrap();
        let result = state.update(&frame, None).unwrap();
        assert_eq!(result.size, RoiSize::Ring { inner: 1, outer: 2 });
        assert_relative_eq!(state.roi().outer_radius, 2.0);
        assert_relative_eq!(state.roi().inner_radius, 1.0);
    }
}
