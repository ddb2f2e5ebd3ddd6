//! albis-core: Frame model and contrast pipeline for detector images.
//!
//! This crate provides the typed frame buffer, the per-pixel mask model,
//! frame statistics, histogram-based auto-contrast, palettes and the
//! value-to-palette transfer function shared by every render backend.
//!

pub mod autocontrast;
pub mod colormap;
pub mod dtype;
pub mod error;
pub mod format;
pub mod frame;
pub mod mask;
pub mod stats;
pub mod transfer;

pub use autocontrast::{compute_auto_levels, AutoLevels};
pub use colormap::{Colormap, Palette};
pub use dtype::{Dtype, DtypeKind, Endian};
pub use error::{Error, Result};
pub use format::{format_roi_tick, format_stat, format_value};
pub use frame::{parse_shape, Frame, FrameData, RowOrder, Values};
pub use mask::{Mask, MaskClass, MaskedValue};
pub use stats::{compute_global_stats, compute_stats, FrameStats, GlobalStats, RunningStats};
pub use transfer::{ContrastWindow, TransferFunction};
