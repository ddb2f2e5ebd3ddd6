//! albis-viewer: Viewer controller for detector frames.
//!
//! This crate holds the front-end state of the viewer independent of any
//! windowing toolkit: the contrast window and palette, mask enable logic,
//! ROI drawing and editing, peak selection, latest-wins frame scheduling,
//! playback, redraw coalescing, persisted settings and CSV/PNG export.
//!

pub mod config;
pub mod error;
pub mod export;
pub mod interaction;
pub mod mask;
pub mod peaks;
pub mod roi;
pub mod schedule;
pub mod state;

pub use config::{AutoloadMode, AutoloadSettings, AutoloadTypes, UiPreferences, ViewerConfig};
pub use error::{Result, ViewerError};
pub use export::{peaks_to_csv, roi_to_csv, ExportSource};
pub use interaction::{Corner, HistTarget, Interaction, OverviewDrag};
pub use mask::{MaskOrigin, MaskState};
pub use peaks::{PeakState, SelectMode};
pub use roi::{RoiHandle, RoiState};
pub use schedule::{Coalescer, Completion, FrameScheduler, FrameTicket, Playback, Task};
pub use state::{SourceInfo, ViewerState};
