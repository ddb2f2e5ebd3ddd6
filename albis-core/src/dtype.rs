//! Element type tags for frame and mask payloads.
//!
//! The backend labels binary payloads with numpy-style tags (`<u2`, `|u1`,
//! `<f4`). Short tags (`u16`) and long names (`uint16`, `float32`) are
//! accepted as well. Anything unrecognized decodes as unsigned 32-bit.

use std::fmt;
use std::str::FromStr;

/// Numeric family of a dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtypeKind {
    Unsigned,
    Signed,
    Float,
}

/// Byte order of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dtype {
    U8,
    U16,
    #[default]
    U32,
    I16,
    I32,
    F32,
    F64,
}

/// Candidate bit depths for saturation detection.
const SATURATION_BITS: [u32; 5] = [4, 8, 12, 16, 32];

impl Dtype {
    /// Parse a dtype tag, returning `None` for unknown tags.
    #[must_use]
    pub fn parse(tag: &str) -> Option<(Self, Endian)> {
        let tag = tag.trim();
        if tag.is_empty() {
            return None;
        }
        let (endian, body) = match tag.as_bytes()[0] {
            b'<' | b'|' | b'=' => (Endian::Little, &tag[1..]),
            b'>' => (Endian::Big, &tag[1..]),
            _ => (Endian::Little, tag),
        };
        let lower = body.to_ascii_lowercase();
        let dtype = match lower.as_str() {
            "u1" | "u8" | "uint8" | "b" => Self::U8,
            "u2" | "u16" | "uint16" => Self::U16,
            "u4" | "u32" | "uint32" => Self::U32,
            "i2" | "i16" | "int16" => Self::I16,
            "i4" | "i32" | "int32" => Self::I32,
            "f4" | "f32" | "float32" => Self::F32,
            "f8" | "f64" | "float64" => Self::F64,
            _ => return None,
        };
        Some((dtype, endian))
    }

    /// Parse a dtype tag, falling back to little-endian `u32`.
    #[must_use]
    pub fn parse_or_default(tag: Option<&str>) -> (Self, Endian) {
        match tag.and_then(Self::parse) {
            Some(parsed) => parsed,
            None => {
                if let Some(tag) = tag {
                    log::warn!("unknown dtype tag {tag:?}, decoding as u32");
                }
                (Self::U32, Endian::Little)
            }
        }
    }

    /// Numeric family.
    #[must_use]
    pub fn kind(self) -> DtypeKind {
        match self {
            Self::U8 | Self::U16 | Self::U32 => DtypeKind::Unsigned,
            Self::I16 | Self::I32 => DtypeKind::Signed,
            Self::F32 | Self::F64 => DtypeKind::Float,
        }
    }

    /// Storage width in bits.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 | Self::F32 => 32,
            Self::F64 => 64,
        }
    }

    /// Storage width in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Whether values of this dtype are integers.
    #[must_use]
    pub fn is_integer(self) -> bool {
        self.kind() != DtypeKind::Float
    }

    /// Largest representable value, `None` for floats.
    #[must_use]
    pub fn max_value(self) -> Option<f64> {
        match self.kind() {
            DtypeKind::Unsigned => Some(2f64.powi(self.bits() as i32) - 1.0),
            DtypeKind::Signed => Some(2f64.powi(self.bits() as i32 - 1) - 1.0),
            DtypeKind::Float => None,
        }
    }

    /// Infer the saturation ceiling from the largest observed valid value.
    ///
    /// Picks the candidate `2^b - 1` (b in 4, 8, 12, 16, 32, not wider than
    /// the dtype) that equals `raw_max`; otherwise the dtype maximum. Float
    /// dtypes and non-finite maxima never saturate.
    #[must_use]
    pub fn saturation_max(self, raw_max: f64) -> Option<f64> {
        if !raw_max.is_finite() {
            return None;
        }
        let dtype_max = self.max_value()?;
        let bits = self.bits();
        SATURATION_BITS
            .iter()
            .filter(|&&b| b <= bits)
            .map(|&b| 2f64.powi(b as i32) - 1.0)
            .find(|&cand| cand == raw_max)
            .or(Some(dtype_max))
    }

    /// Short tag (`u16`, `f32`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Numpy-style little-endian tag (`<u2`).
    #[must_use]
    pub fn numpy_tag(self) -> &'static str {
        match self {
            Self::U8 => "|u1",
            Self::U16 => "<u2",
            Self::U32 => "<u4",
            Self::I16 => "<i2",
            Self::I32 => "<i4",
            Self::F32 => "<f4",
            Self::F64 => "<f8",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .map(|(dtype, _)| dtype)
            .ok_or_else(|| format!("unknown dtype: {s}"))
    }
}
