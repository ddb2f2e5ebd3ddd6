//! Value-to-palette transfer function.
//!
//! Both render backends go through [`ContrastWindow::normalize`] and
//! [`ContrastWindow::palette_index`], so CPU and GPU output agree for the
//! same inputs. The GPU shader mirrors these formulas with the parameters
//! from [`ContrastWindow::shader_params`].
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use crate::colormap::{Colormap, HDR_PALETTE_SIZE};
use crate::mask::MaskClass;

/// Color of gap pixels.
pub const MASK_GAP_RGBA: [u8; 4] = [0, 0, 0, 255];
/// Color of dead, cold, hot and noisy pixels.
pub const MASK_DEAD_RGBA: [u8; 4] = [25, 50, 120, 255];

/// The foreground level times this is the top of the HDR log band.
pub const HDR_LOG_FACTOR: f64 = 10_000.0;
const HDR_LINEAR_SLOTS: f64 = 256.0;
const HDR_LOG_SLOTS: f64 = 767.0;

/// Transfer function selected by the colormap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFunction {
    /// `(v - min) / max(max - min, 1)`, clamped.
    Linear,
    /// 256 linear slots between background and foreground, 767 log slots
    /// up to `foreground * 10000`.
    AlbulaHdr,
}

impl From<Colormap> for TransferFunction {
    fn from(colormap: Colormap) -> Self {
        if colormap.is_hdr() {
            Self::AlbulaHdr
        } else {
            Self::Linear
        }
    }
}

impl TransferFunction {
    /// Shader selector value.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Linear => 0,
            Self::AlbulaHdr => 1,
        }
    }
}

/// HDR slot index in `[0, 1023]` for `value` given background/foreground.
#[must_use]
pub fn albula_hdr_index(value: f64, background: f64, foreground: f64) -> usize {
    let top = (HDR_PALETTE_SIZE - 1) as f64;
    if !value.is_finite() || !background.is_finite() || !foreground.is_finite() {
        return 0;
    }
    let log_foreground = foreground * HDR_LOG_FACTOR;
    if value <= background {
        return 0;
    }
    if value >= log_foreground {
        return HDR_PALETTE_SIZE - 1;
    }
    let idx = if value < foreground && foreground > background {
        ((value - background) * HDR_LINEAR_SLOTS / (foreground - background))
            .floor()
            .clamp(0.0, HDR_LINEAR_SLOTS - 1.0)
    } else if foreground > background && log_foreground > foreground {
        let denom = ((log_foreground - background) / (foreground - background)).ln();
        if denom > 0.0 {
            let slope = HDR_LOG_SLOTS / denom;
            let offset = -(foreground - background).ln() * slope;
            let x = (value - background).max(f64::EPSILON).ln() * slope + offset;
            (HDR_LINEAR_SLOTS + x.floor()).clamp(HDR_LINEAR_SLOTS, top)
        } else {
            HDR_LINEAR_SLOTS
        }
    } else {
        // Degenerate window: below the log band stays on the first slot.
        0.0
    };
    idx as usize
}

/// HDR transfer normalized to `[0, 1]`.
#[must_use]
pub fn map_albula_hdr_to_norm(value: f64, background: f64, foreground: f64) -> f64 {
    albula_hdr_index(value, background, foreground) as f64 / (HDR_PALETTE_SIZE - 1) as f64
}

/// Current display mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContrastWindow {
    pub min: f64,
    pub max: f64,
    pub invert: bool,
    pub colormap: Colormap,
}

impl Default for ContrastWindow {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            invert: false,
            colormap: Colormap::Gray,
        }
    }
}

impl ContrastWindow {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    #[must_use]
    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    #[must_use]
    pub fn transfer(&self) -> TransferFunction {
        self.colormap.into()
    }

    /// Window bounds with non-finite inputs replaced.
    ///
    /// A non-finite `min` becomes 0 and a non-finite `max` becomes
    /// `min + 1`.
    #[must_use]
    pub fn sanitized(&self) -> (f64, f64) {
        let min = if self.min.is_finite() { self.min } else { 0.0 };
        let max = if self.max.is_finite() {
            self.max
        } else {
            min + 1.0
        };
        (min, max)
    }

    /// Map `value` to `[0, 1]`, including inversion.
    #[must_use]
    pub fn normalize(&self, value: f64) -> f64 {
        let (min, max) = self.sanitized();
        let norm = match self.transfer() {
            TransferFunction::AlbulaHdr => map_albula_hdr_to_norm(value, min, max),
            TransferFunction::Linear => {
                let t = (value - min) / (max - min).max(1.0);
                if t.is_nan() {
                    0.0
                } else {
                    t.clamp(0.0, 1.0)
                }
            }
        };
        let norm = if self.invert { 1.0 - norm } else { norm };
        norm.clamp(0.0, 1.0)
    }

    /// Palette slot for `value` in a palette of `len` entries.
    #[inline]
    #[must_use]
    pub fn palette_index(&self, value: f64, len: usize) -> usize {
        match self.transfer() {
            TransferFunction::AlbulaHdr if len == HDR_PALETTE_SIZE => {
                let (min, max) = self.sanitized();
                let idx = albula_hdr_index(value, min, max);
                if self.invert {
                    HDR_PALETTE_SIZE - 1 - idx
                } else {
                    idx
                }
            }
            _ => palette_index(self.normalize(value), len),
        }
    }

    /// `[min, max, invert, transfer]` as passed to the GPU shader.
    #[must_use]
    pub fn shader_params(&self) -> [f32; 4] {
        let (min, max) = self.sanitized();
        [
            min as f32,
            max as f32,
            if self.invert { 1.0 } else { 0.0 },
            self.transfer().code() as f32,
        ]
    }
}

/// `floor(norm * (len - 1))`.
#[inline]
#[must_use]
pub fn palette_index(norm: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let last = (len - 1) as f64;
    (norm.clamp(0.0, 1.0) * last).floor() as usize
}

/// Fixed overlay color for masked classes; `None` for good pixels.
#[inline]
#[must_use]
pub fn mask_color(class: MaskClass) -> Option<[u8; 4]> {
    match class {
        MaskClass::Good => None,
        MaskClass::Dead => Some(MASK_DEAD_RGBA),
        MaskClass::Gap => Some(MASK_GAP_RGBA),
    }
}
