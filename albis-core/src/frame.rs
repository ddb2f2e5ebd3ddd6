//! Typed frame buffer.
//!
//! A [`Frame`] owns one 2-D detector image as a typed, row-major array with
//! the origin at the top-left. Payloads decode from raw bytes plus a dtype
//! tag and a shape header, the convention used by the backend `frame`,
//! `image` and `mask` endpoints.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use std::borrow::Cow;

use crate::dtype::{Dtype, Endian};
use crate::error::{Error, Result};

/// Row addressing convention.
///
/// CPU consumers index rows top-down as stored. The GPU upload path stores
/// textures bottom-up, so a row `y` there lives at `height - 1 - y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    #[default]
    TopDown,
    BottomUp,
}

impl RowOrder {
    /// Storage row for logical row `y` in an image of `height` rows.
    #[inline]
    #[must_use]
    pub fn storage_row(self, y: usize, height: usize) -> usize {
        match self {
            Self::TopDown => y,
            Self::BottomUp => height - 1 - y,
        }
    }
}

/// Typed pixel storage.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! decode_chunks {
    ($bytes:expr, $endian:expr, $ty:ty) => {{
        const N: usize = std::mem::size_of::<$ty>();
        $bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut buf = [0u8; N];
                buf.copy_from_slice(chunk);
                match $endian {
                    Endian::Little => <$ty>::from_le_bytes(buf),
                    Endian::Big => <$ty>::from_be_bytes(buf),
                }
            })
            .collect::<Vec<$ty>>()
    }};
}

impl FrameData {
    /// Decode a byte payload. Trailing bytes that do not fill an element
    /// are ignored.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], dtype: Dtype, endian: Endian) -> Self {
        match dtype {
            Dtype::U8 => Self::U8(bytes.to_vec()),
            Dtype::U16 => Self::U16(decode_chunks!(bytes, endian, u16)),
            Dtype::U32 => Self::U32(decode_chunks!(bytes, endian, u32)),
            Dtype::I16 => Self::I16(decode_chunks!(bytes, endian, i16)),
            Dtype::I32 => Self::I32(decode_chunks!(bytes, endian, i32)),
            Dtype::F32 => Self::F32(decode_chunks!(bytes, endian, f32)),
            Dtype::F64 => Self::F64(decode_chunks!(bytes, endian, f64)),
        }
    }

    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::U8(_) => Dtype::U8,
            Self::U16(_) => Dtype::U16,
            Self::U32(_) => Dtype::U32,
            Self::I16(_) => Dtype::I16,
            Self::I32(_) => Dtype::I32,
            Self::F32(_) => Dtype::F32,
            Self::F64(_) => Dtype::F64,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `idx` widened to `f64`.
    #[inline]
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<f64> {
        match self {
            Self::U8(v) => v.get(idx).map(|&x| f64::from(x)),
            Self::U16(v) => v.get(idx).map(|&x| f64::from(x)),
            Self::U32(v) => v.get(idx).map(|&x| f64::from(x)),
            Self::I16(v) => v.get(idx).map(|&x| f64::from(x)),
            Self::I32(v) => v.get(idx).map(|&x| f64::from(x)),
            Self::F32(v) => v.get(idx).map(|&x| f64::from(x)),
            Self::F64(v) => v.get(idx).copied(),
        }
    }

    /// Iterate all elements widened to `f64`.
    #[must_use]
    pub fn values(&self) -> Values<'_> {
        Values { data: self, idx: 0 }
    }

    /// Single-precision view for GPU upload; borrows when already `f32`.
    #[must_use]
    pub fn as_f32(&self) -> Cow<'_, [f32]> {
        match self {
            Self::F32(v) => Cow::Borrowed(v.as_slice()),
            Self::U8(v) => Cow::Owned(v.iter().map(|&x| f32::from(x)).collect()),
            Self::U16(v) => Cow::Owned(v.iter().map(|&x| f32::from(x)).collect()),
            Self::I16(v) => Cow::Owned(v.iter().map(|&x| f32::from(x)).collect()),
            Self::U32(v) => Cow::Owned(v.iter().map(|&x| x as f32).collect()),
            Self::I32(v) => Cow::Owned(v.iter().map(|&x| x as f32).collect()),
            Self::F64(v) => Cow::Owned(v.iter().map(|&x| x as f32).collect()),
        }
    }
}

/// Iterator over frame elements as `f64`.
#[derive(Debug, Clone)]
pub struct Values<'a> {
    data: &'a FrameData,
    idx: usize,
}

impl Iterator for Values<'_> {
    type Item = f64;

    #[inline]
    fn next(&mut self) -> Option<f64> {
        let value = self.data.get(self.idx)?;
        self.idx += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len().saturating_sub(self.idx);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Values<'_> {}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for FrameData {
                fn from(v: Vec<$ty>) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_vec!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i16 => I16,
    i32 => I32,
    f32 => F32,
    f64 => F64,
);

/// Parse a comma-separated shape header. Malformed headers yield an empty
/// shape.
#[must_use]
pub fn parse_shape(header: &str) -> Vec<usize> {
    let header = header.trim();
    if header.is_empty() {
        return Vec::new();
    }
    header
        .split(',')
        .map(|part| part.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .unwrap_or_default()
}

/// One 2-D detector image.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    data: FrameData,
}

impl Frame {
    /// Wrap typed data as a `width x height` frame.
    ///
    /// # Errors
    /// Returns [`Error::InvalidShape`] if `width * height` overflows and
    /// [`Error::LengthMismatch`] if the element count differs from it.
    pub fn new(width: usize, height: usize, data: impl Into<FrameData>) -> Result<Self> {
        let data = data.into();
        let expected = width
            .checked_mul(height)
            .ok_or_else(|| Error::InvalidShape(vec![height, width]))?;
        if data.len() != expected {
            return Err(Error::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Decode a payload with a `[height, width]` (or `[.., height, width]`)
    /// shape.
    ///
    /// # Errors
    /// Returns [`Error::InvalidShape`] for shapes with fewer than two
    /// dimensions or whose byte size overflows, and
    /// [`Error::PayloadLength`] if the payload is too short.
    pub fn from_bytes(bytes: &[u8], dtype: Dtype, endian: Endian, shape: &[usize]) -> Result<Self> {
        if shape.len() < 2 {
            return Err(Error::InvalidShape(shape.to_vec()));
        }
        let height = shape[shape.len() - 2];
        let width = shape[shape.len() - 1];
        let (expected, byte_len) = width
            .checked_mul(height)
            .and_then(|n| Some((n, n.checked_mul(dtype.size())?)))
            .ok_or_else(|| Error::InvalidShape(shape.to_vec()))?;
        if bytes.len() < byte_len {
            return Err(Error::PayloadLength {
                bytes: bytes.len(),
                expected,
                dtype: dtype.as_str(),
            });
        }
        let data = FrameData::from_bytes(&bytes[..byte_len], dtype, endian);
        Self::new(width, height, data)
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    #[must_use]
    pub fn data(&self) -> &FrameData {
        &self.data
    }

    /// Linear index of `(x, y)` under the given row order.
    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, y: usize, order: RowOrder) -> usize {
        order.storage_row(y, self.height) * self.width + x
    }

    /// Value at `(x, y)` with top-down rows, `None` out of bounds.
    #[inline]
    #[must_use]
    pub fn value(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(self.index(x, y, RowOrder::TopDown))
    }

    /// Iterate all values in storage order.
    #[must_use]
    pub fn values(&self) -> Values<'_> {
        self.data.values()
    }

    /// Frame center in pixel coordinates.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_u16_little_endian() {
        let bytes = [1u8, 0, 0, 1, 255, 255, 2, 0];
        let frame = Frame::from_bytes(&bytes, Dtype::U16, Endian::Little, &[2, 2]).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.values().collect::<Vec<_>>(), vec![1.0, 256.0, 65535.0, 2.0]);
    }

    #[test]
    fn test_decode_big_endian() {
        let bytes = [0u8, 1, 1, 0];
        let data = FrameData::from_bytes(&bytes, Dtype::U16, Endian::Big);
        assert_eq!(data, FrameData::U16(vec![1, 256]));
    }

    #[test]
    fn test_short_payload_rejected() {
        let err = Frame::from_bytes(&[0u8; 6], Dtype::U16, Endian::Little, &[2, 2]);
        assert!(matches!(err, Err(Error::PayloadLength { .. })));
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let huge = 1usize << (usize::BITS / 2);
        let err = Frame::from_bytes(&[0u8; 4], Dtype::U16, Endian::Little, &[huge, huge]);
        assert!(matches!(err, Err(Error::InvalidShape(_))));

        let err = Frame::from_bytes(&[0u8; 4], Dtype::U32, Endian::Little, &[1, usize::MAX / 2]);
        assert!(matches!(err, Err(Error::InvalidShape(_))));

        let err = Frame::new(usize::MAX, 2, vec![0u16; 4]);
        assert!(matches!(err, Err(Error::InvalidShape(_))));
    }

    #[test]
    fn test_stack_shape_uses_last_two_dims() {
        let frame = Frame::from_bytes(&[0u8; 6], Dtype::U8, Endian::Little, &[1, 2, 3]).unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
    }

    #[test]
    fn test_parse_shape() {
        assert_eq!(parse_shape("512, 1024"), vec![512, 1024]);
        assert!(parse_shape("").is_empty());
        assert!(parse_shape("12,abc").is_empty());
    }

    #[test]
    fn test_as_f32_borrows_float_data() {
        let data = FrameData::F32(vec![1.0, 2.0]);
        assert!(matches!(data.as_f32(), Cow::Borrowed(_)));
        let data = FrameData::U16(vec![1, 2]);
        assert_eq!(&*data.as_f32(), &[1.0, 2.0]);
    }

    #[test]
    fn test_row_order_index() {
        let frame = Frame::new(3, 2, vec![0u8, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(frame.index(1, 0, RowOrder::TopDown), 1);
        assert_eq!(frame.index(1, 0, RowOrder::BottomUp), 4);
        assert_eq!(frame.value(2, 1), Some(5.0));
        assert_eq!(frame.value(3, 0), None);
    }
}
