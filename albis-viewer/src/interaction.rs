//! Pointer interaction state machine.
//!
//! At most one drag is active at a time. Every `begin_*` transition only
//! leaves [`Interaction::Idle`]; [`Interaction::end`] always returns to it.

use crate::roi::RoiHandle;

/// Histogram marker grab distance in pixels.
pub const HIST_GRAB_PX: f64 = 6.0;

/// Corner of the overview viewport rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    Nw,
    Ne,
    Se,
    Sw,
}

/// What an overview drag does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverviewDrag {
    /// Pan the viewport.
    Move,
    /// Resize the viewport from a corner; `keep_center` resizes about the
    /// viewport center instead of the opposite corner.
    Resize { corner: Corner, keep_center: bool },
}

/// Histogram window marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistTarget {
    Min,
    Max,
}

impl HistTarget {
    /// Marker grabbed by a press at `x`, given the marker positions.
    /// Ties go to the min marker.
    #[must_use]
    pub fn pick(x: f64, min_x: f64, max_x: f64) -> Option<Self> {
        let dist_min = (x - min_x).abs();
        let dist_max = (x - max_x).abs();
        if dist_min.min(dist_max) > HIST_GRAB_PX {
            return None;
        }
        Some(if dist_min <= dist_max {
            HistTarget::Min
        } else {
            HistTarget::Max
        })
    }
}

/// Current pointer interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    /// Scrolling the main view.
    Panning,
    /// Drawing a new ROI.
    RoiDragging,
    /// Moving or reshaping the ROI.
    RoiEditing { handle: RoiHandle },
    OverviewDragging { mode: OverviewDrag },
    HistDragging { target: HistTarget },
}

impl Interaction {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Interaction::Idle
    }

    fn enter(&mut self, next: Interaction) -> bool {
        if !self.is_idle() {
            log::debug!("ignoring {next:?} while {self:?}");
            return false;
        }
        *self = next;
        true
    }

    pub fn begin_pan(&mut self) -> bool {
        self.enter(Interaction::Panning)
    }

    pub fn begin_roi_drag(&mut self) -> bool {
        self.enter(Interaction::RoiDragging)
    }

    pub fn begin_roi_edit(&mut self, handle: RoiHandle) -> bool {
        self.enter(Interaction::RoiEditing { handle })
    }

    pub fn begin_overview_drag(&mut self, mode: OverviewDrag) -> bool {
        self.enter(Interaction::OverviewDragging { mode })
    }

    pub fn begin_hist_drag(&mut self, target: HistTarget) -> bool {
        self.enter(Interaction::HistDragging { target })
    }

    /// Return to idle, yielding the interaction that ended.
    pub fn end(&mut self) -> Interaction {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_active_drag() {
        let mut interaction = Interaction::default();
        assert!(interaction.begin_roi_edit(RoiHandle::Outer));
        assert!(!interaction.begin_pan());
        assert_eq!(
            interaction,
            Interaction::RoiEditing {
                handle: RoiHandle::Outer
            }
        );
        assert_eq!(
            interaction.end(),
            Interaction::RoiEditing {
                handle: RoiHandle::Outer
            }
        );
        assert!(interaction.is_idle());
        assert!(interaction.begin_pan());
    }

    #[test]
    fn test_end_when_idle() {
        let mut interaction = Interaction::Idle;
        assert_eq!(interaction.end(), Interaction::Idle);
    }

    #[test]
    fn test_hist_target_pick() {
        assert_eq!(HistTarget::pick(12.0, 10.0, 100.0), Some(HistTarget::Min));
        assert_eq!(HistTarget::pick(97.0, 10.0, 100.0), Some(HistTarget::Max));
        assert_eq!(HistTarget::pick(50.0, 10.0, 100.0), None);
        assert_eq!(HistTarget::pick(10.0, 10.0, 10.0), Some(HistTarget::Min));
    }

    #[test]
    fn test_overview_resize_state() {
        let mut interaction = Interaction::default();
        let mode = OverviewDrag::Resize {
            corner: Corner::Se,
            keep_center: true,
        };
        assert!(interaction.begin_overview_drag(mode));
        assert_eq!(interaction, Interaction::OverviewDragging { mode });
    }
}
