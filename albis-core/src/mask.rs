//! Per-pixel mask model.
//!
//! Mask values are bit flags: bit 0 marks detector gaps, bits 1-4 mark
//! dead or otherwise bad pixels, zero is a good pixel.

use crate::error::{Error, Result};
use crate::frame::FrameData;

/// Gap bit.
pub const GAP_BIT: u32 = 0x1;
/// Dead / bad pixel reason bits.
pub const DEAD_BITS: u32 = 0x1e;
/// Every bit that disqualifies a pixel from peak detection.
pub const BAD_BITS: u32 = GAP_BIT | DEAD_BITS;

/// Render class of a mask value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskClass {
    Good,
    Dead,
    Gap,
}

impl MaskClass {
    /// Classify raw mask bits. The gap bit wins over dead bits.
    #[inline]
    #[must_use]
    pub fn of(bits: u32) -> Self {
        if bits & GAP_BIT != 0 {
            Self::Gap
        } else if bits & DEAD_BITS != 0 {
            Self::Dead
        } else {
            Self::Good
        }
    }

    /// 8-bit class code used by the GPU mask texture.
    #[must_use]
    pub fn texture_code(self) -> u8 {
        match self {
            Self::Good => 0,
            Self::Dead => 128,
            Self::Gap => 255,
        }
    }
}

/// A value after mask application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskedValue {
    pub value: f64,
    /// Excluded from statistics entirely.
    pub skip: bool,
}

impl MaskedValue {
    /// Gap pixels read as zero, dead pixels are skipped, good pixels pass.
    #[inline]
    #[must_use]
    pub fn apply(value: f64, bits: u32) -> Self {
        match MaskClass::of(bits) {
            MaskClass::Gap => Self {
                value: 0.0,
                skip: false,
            },
            MaskClass::Dead => Self {
                value: 0.0,
                skip: true,
            },
            MaskClass::Good => Self { value, skip: false },
        }
    }
}

/// Pixel mask aligned to a `[height, width]` shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    raw: Vec<u32>,
    width: usize,
    height: usize,
}

impl Mask {
    /// Wrap raw mask bits.
    ///
    /// # Errors
    /// Returns [`Error::InvalidShape`] if `width * height` overflows and
    /// [`Error::LengthMismatch`] if `raw.len()` differs from it.
    pub fn new(width: usize, height: usize, raw: Vec<u32>) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .ok_or_else(|| Error::InvalidShape(vec![height, width]))?;
        if raw.len() != expected {
            return Err(Error::LengthMismatch {
                expected,
                actual: raw.len(),
            });
        }
        Ok(Self { raw, width, height })
    }

    /// Normalize any typed payload to `u32` classification values.
    ///
    /// Negative or fractional inputs are truncated the way an unsigned
    /// 32-bit typed array would store them.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the payload size differs from
    /// the shape.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_data(width: usize, height: usize, data: &FrameData) -> Result<Self> {
        let raw = match data {
            FrameData::U32(v) => v.clone(),
            FrameData::U8(v) => v.iter().map(|&x| u32::from(x)).collect(),
            FrameData::U16(v) => v.iter().map(|&x| u32::from(x)).collect(),
            FrameData::I16(v) => v.iter().map(|&x| i32::from(x) as u32).collect(),
            FrameData::I32(v) => v.iter().map(|&x| x as u32).collect(),
            FrameData::F32(v) => v.iter().map(|&x| (x as i64) as u32).collect(),
            FrameData::F64(v) => v.iter().map(|&x| (x as i64) as u32).collect(),
        };
        Self::new(width, height, raw)
    }

    /// Synthesize a mask from negative sentinel values.
    ///
    /// `-1` becomes a gap pixel, any other negative value gets every dead
    /// bit. Returns `None` when the data holds no negative values.
    #[must_use]
    pub fn from_negative_values(width: usize, height: usize, data: &FrameData) -> Option<Self> {
        if data.is_empty() || width.checked_mul(height) != Some(data.len()) {
            return None;
        }
        let mut has_mask = false;
        let raw = data
            .values()
            .map(|v| {
                if v.is_finite() && v < 0.0 {
                    has_mask = true;
                    if v == -1.0 {
                        GAP_BIT
                    } else {
                        DEAD_BITS
                    }
                } else {
                    0
                }
            })
            .collect();
        has_mask.then_some(Self { raw, width, height })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Shape as `[height, width]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    #[must_use]
    pub fn raw(&self) -> &[u32] {
        &self.raw
    }

    /// Bits at linear index `idx`.
    #[inline]
    #[must_use]
    pub fn bits(&self, idx: usize) -> u32 {
        self.raw.get(idx).copied().unwrap_or(0)
    }

    /// Whether this mask covers a `width x height` frame exactly.
    #[must_use]
    pub fn matches(&self, width: usize, height: usize) -> bool {
        self.width == width
            && self.height == height
            && width.checked_mul(height) == Some(self.raw.len())
    }

    /// Align to a frame shape, transposing when the mask is stored as the
    /// exact transpose of the frame.
    ///
    /// # Errors
    /// Returns [`Error::MaskShape`] if the mask is neither the frame shape
    /// nor its transpose.
    pub fn align_to(self, width: usize, height: usize) -> Result<Self> {
        if self.matches(width, height) {
            return Ok(self);
        }
        if self.height == width && self.width == height {
            log::debug!(
                "transposing mask {}x{} to match frame {}x{}",
                self.width,
                self.height,
                width,
                height
            );
            let mut transposed = vec![0u32; width * height];
            for y in 0..height {
                for x in 0..width {
                    transposed[y * width + x] = self.raw[x * height + y];
                }
            }
            return Ok(Self {
                raw: transposed,
                width,
                height,
            });
        }
        Err(Error::MaskShape {
            mask: (self.height, self.width),
            frame: (height, width),
        })
    }

    /// Class of the pixel at `idx`.
    #[inline]
    #[must_use]
    pub fn class(&self, idx: usize) -> MaskClass {
        MaskClass::of(self.bits(idx))
    }

    /// Count pixels per class as `(good, dead, gap)`.
    #[must_use]
    pub fn class_counts(&self) -> (usize, usize, usize) {
        self.raw
            .iter()
            .fold((0, 0, 0), |(good, dead, gap), &bits| match MaskClass::of(bits) {
                MaskClass::Good => (good + 1, dead, gap),
                MaskClass::Dead => (good, dead + 1, gap),
                MaskClass::Gap => (good, dead, gap + 1),
            })
    }
}
