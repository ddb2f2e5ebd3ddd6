//! Colormap definitions and palette construction.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Entries in a regular palette.
pub const PALETTE_SIZE: usize = 256;
/// Entries in the albulaHdr palette: 256 linear slots plus 768 log slots.
pub const HDR_PALETTE_SIZE: usize = 1024;

type Rgb = [u8; 3];

const VIRIDIS: &[Rgb] = &[
    [68, 1, 84],
    [59, 82, 139],
    [33, 145, 140],
    [94, 201, 97],
    [253, 231, 37],
];
const MAGMA: &[Rgb] = &[
    [0, 0, 4],
    [53, 15, 83],
    [132, 32, 102],
    [196, 66, 74],
    [251, 135, 53],
    [252, 253, 191],
];
const INFERNO: &[Rgb] = &[
    [0, 0, 4],
    [51, 13, 81],
    [120, 28, 109],
    [190, 55, 84],
    [249, 101, 49],
    [252, 255, 164],
];
const CIVIDIS: &[Rgb] = &[
    [0, 32, 76],
    [40, 77, 117],
    [92, 125, 127],
    [147, 173, 112],
    [207, 223, 108],
    [253, 231, 37],
];
const TURBO: &[Rgb] = &[
    [48, 18, 59],
    [50, 127, 216],
    [63, 195, 160],
    [189, 211, 57],
    [249, 143, 8],
    [179, 21, 22],
];

/// Available colormaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Colormap {
    /// Black to white.
    #[default]
    Gray,
    /// Black to red to yellow to white.
    Heat,
    Viridis,
    Magma,
    Inferno,
    Cividis,
    Turbo,
    /// Blue to yellow to red.
    BlueYellowRed,
    /// Gamma-compressed blue-white ramp.
    AlbisHdr,
    /// Linear greyscale below the foreground level, log red/yellow/white above.
    AlbulaHdr,
}

impl Colormap {
    pub const ALL: [Colormap; 10] = [
        Colormap::Gray,
        Colormap::Heat,
        Colormap::Viridis,
        Colormap::Magma,
        Colormap::Inferno,
        Colormap::Cividis,
        Colormap::Turbo,
        Colormap::BlueYellowRed,
        Colormap::AlbisHdr,
        Colormap::AlbulaHdr,
    ];

    /// Identifier used in settings and on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Colormap::Gray => "gray",
            Colormap::Heat => "heat",
            Colormap::Viridis => "viridis",
            Colormap::Magma => "magma",
            Colormap::Inferno => "inferno",
            Colormap::Cividis => "cividis",
            Colormap::Turbo => "turbo",
            Colormap::BlueYellowRed => "blueYellowRed",
            Colormap::AlbisHdr => "albisHdr",
            Colormap::AlbulaHdr => "albulaHdr",
        }
    }

    /// Whether this colormap uses the HDR transfer function.
    #[must_use]
    pub fn is_hdr(self) -> bool {
        self == Colormap::AlbulaHdr
    }

    /// Number of palette slots.
    #[must_use]
    pub fn palette_size(self) -> usize {
        if self.is_hdr() {
            HDR_PALETTE_SIZE
        } else {
            PALETTE_SIZE
        }
    }

    /// Color of palette slot `index` out of `size`.
    fn slot(self, index: usize, size: usize) -> [u8; 4] {
        let t = index as f64 / (size - 1) as f64;
        let [r, g, b] = match self {
            Colormap::Gray => {
                let v = unit_to_u8(t);
                [v, v, v]
            }
            Colormap::Heat => {
                let tt = t * 3.0;
                [
                    unit_to_u8(tt.min(1.0)),
                    unit_to_u8((tt - 1.0).max(0.0)),
                    unit_to_u8((tt - 2.0).max(0.0)),
                ]
            }
            Colormap::Viridis => mix_stops(VIRIDIS, t),
            Colormap::Magma => mix_stops(MAGMA, t),
            Colormap::Inferno => mix_stops(INFERNO, t),
            Colormap::Cividis => mix_stops(CIVIDIS, t),
            Colormap::Turbo => mix_stops(TURBO, t),
            Colormap::BlueYellowRed => [
                unit_to_u8(t * 1.2),
                unit_to_u8(1.2 - (t - 0.5).abs() * 2.0),
                unit_to_u8(1.0 - t * 1.2),
            ],
            Colormap::AlbisHdr => {
                let gamma = t.powf(0.7);
                [
                    unit_to_u8(gamma * 1.1),
                    unit_to_u8(gamma * 0.9 + t * 0.3),
                    unit_to_u8((1.0 - gamma) * 0.4 + t * 0.6),
                ]
            }
            Colormap::AlbulaHdr => albula_slot(index),
        };
        [r, g, b, 255]
    }
}

/// Scale `[0, 1]` to a byte, clamping out-of-range input.
#[inline]
fn unit_to_u8(v: f64) -> u8 {
    (255.0 * v.clamp(0.0, 1.0)).round() as u8
}

/// Linear interpolation between evenly spaced color stops.
fn mix_stops(stops: &[Rgb], t: f64) -> Rgb {
    let last = stops.len() - 1;
    let scaled = t.clamp(0.0, 1.0) * last as f64;
    let idx = (scaled.floor() as usize).min(last);
    let frac = scaled - idx as f64;
    let a = stops[idx];
    let b = stops[(idx + 1).min(last)];
    let lerp = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * frac).round() as u8;
    [lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2])]
}

fn albula_slot(index: usize) -> Rgb {
    if index < 256 {
        let v = (255 - index) as u8;
        return [v, v, v];
    }
    let log = index - 256;
    if log < 256 {
        [log as u8, 0, 0]
    } else if log < 512 {
        [255, (log - 256) as u8, 0]
    } else {
        [255, 255, (log - 512).min(255) as u8]
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Colormap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Colormap::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownColormap(s.to_string()))
    }
}

/// RGBA lookup table for one colormap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colormap: Colormap,
    colors: Vec<[u8; 4]>,
}

impl Palette {
    /// Build the lookup table for `colormap`.
    #[must_use]
    pub fn build(colormap: Colormap) -> Self {
        let size = colormap.palette_size();
        let colors = (0..size).map(|i| colormap.slot(i, size)).collect();
        Self { colormap, colors }
    }

    #[must_use]
    pub fn colormap(&self) -> Colormap {
        self.colormap
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    /// Color at `index`, clamped to the last slot.
    #[inline]
    #[must_use]
    pub fn color(&self, index: usize) -> [u8; 4] {
        self.colors[index.min(self.colors.len() - 1)]
    }

    /// Palette flattened to RGBA bytes.
    #[must_use]
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.colors.iter().flatten().copied().collect()
    }
}

impl From<Colormap> for Palette {
    fn from(colormap: Colormap) -> Self {
        Self::build(colormap)
    }
}
