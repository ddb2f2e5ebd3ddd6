//! Buffer preparation for the GPU backend.
//!
//! Values and mask codes are stored bottom-up, so row `y` of the image is
//! row `height - 1 - y` of the buffer. Mask class codes are 8-bit
//! (`0` good, `128` dead, `255` gap) packed four per 32-bit word. Palette
//! entries are packed RGBA words.

use albis_core::{Frame, Mask, MaskClass, Palette, RowOrder};

/// Pack RGBA bytes into one little-endian word.
#[inline]
#[must_use]
pub fn pack_rgba(rgba: [u8; 4]) -> u32 {
    u32::from_le_bytes(rgba)
}

/// Frame values as `f32`, rows reversed.
#[must_use]
pub fn flip_values(frame: &Frame) -> Vec<f32> {
    let values = frame.data().as_f32();
    let width = frame.width();
    let height = frame.height();
    let mut out = Vec::with_capacity(values.len());
    for y in 0..height {
        let src = RowOrder::BottomUp.storage_row(y, height) * width;
        out.extend_from_slice(&values[src..src + width]);
    }
    out
}

/// Mask class codes, rows reversed, four per word.
#[must_use]
pub fn pack_mask_codes(mask: &Mask) -> Vec<u32> {
    let width = mask.width();
    let height = mask.height();
    let mut words = vec![0u32; (width * height).div_ceil(4).max(1)];
    for y in 0..height {
        let src_row = RowOrder::BottomUp.storage_row(y, height);
        for x in 0..width {
            let code = u32::from(MaskClass::of(mask.bits(src_row * width + x)).texture_code());
            let dst = y * width + x;
            words[dst / 4] |= code << ((dst % 4) * 8);
        }
    }
    words
}

/// Palette as packed RGBA words.
#[must_use]
pub fn pack_palette(palette: &Palette) -> Vec<u32> {
    palette.colors().iter().copied().map(pack_rgba).collect()
}

/// Unpack rendered words into RGBA bytes.
#[must_use]
pub fn unpack_rgba(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
