//! Response header decoding.
//!
//! Binary endpoints (`frame`, `preview`, `image`, `mask`, `simplon/monitor`)
//! answer with the raw little-endian payload and describe it in headers:
//! `X-Dtype` carries a dtype tag, `X-Shape` a comma-separated shape. Image
//! and SIMPLON responses add optional geometry headers.

use std::collections::HashMap;
use std::hash::BuildHasher;

use albis_analysis::rings::energy_from_wavelength;
use albis_analysis::DetectorGeometry;
use albis_core::{parse_shape, Dtype, Endian, Frame, FrameData, Mask};

use crate::Result;

pub const DTYPE: &str = "X-Dtype";
pub const SHAPE: &str = "X-Shape";
pub const FRAME: &str = "X-Frame";
pub const PREVIEW: &str = "X-Preview";
pub const MASK_PATH: &str = "X-Mask-Path";

/// Case-insensitive header access over whatever map a transport returns.
pub trait HeaderLookup {
    fn header(&self, name: &str) -> Option<&str>;

    /// Header parsed as a finite float. Empty or malformed values are `None`.
    fn header_f64(&self, name: &str) -> Option<f64> {
        let raw = self.header(name)?.trim();
        if raw.is_empty() {
            return None;
        }
        raw.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl<S: BuildHasher> HeaderLookup for HashMap<String, String, S> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }
}

impl HeaderLookup for [(String, String)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl HeaderLookup for Vec<(String, String)> {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

/// Payload description of a binary frame or mask response.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadHeaders {
    pub dtype: Dtype,
    pub endian: Endian,
    pub shape: Vec<usize>,
    /// Frame index echoed by the `frame` endpoint.
    pub frame: Option<usize>,
    /// Set when the backend sent a downsampled preview.
    pub preview: bool,
    /// Dataset path the mask was read from.
    pub mask_path: Option<String>,
}

impl PayloadHeaders {
    /// Read the payload headers.
    ///
    /// A missing or unknown dtype decodes as `u32`; a malformed shape
    /// becomes empty.
    pub fn from_headers<H: HeaderLookup + ?Sized>(headers: &H) -> Self {
        let (dtype, endian) = Dtype::parse_or_default(headers.header(DTYPE));
        let shape = headers.header(SHAPE).map(parse_shape).unwrap_or_default();
        let frame = headers
            .header(FRAME)
            .and_then(|raw| raw.trim().parse::<usize>().ok());
        let preview = headers
            .header(PREVIEW)
            .is_some_and(|raw| matches!(raw.trim(), "1" | "true" | "True"));
        let mask_path = headers
            .header(MASK_PATH)
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(str::to_string);
        Self {
            dtype,
            endian,
            shape,
            frame,
            preview,
            mask_path,
        }
    }

    /// Decode a frame payload.
    ///
    /// A shape with fewer than two dimensions yields an empty frame.
    ///
    /// # Errors
    /// Returns an error if the payload is shorter than the shape requires.
    pub fn decode_frame(&self, bytes: &[u8]) -> Result<Frame> {
        if self.shape.len() < 2 {
            log::warn!(
                "frame payload has unusable shape {:?}; showing an empty frame",
                self.shape
            );
            let empty = FrameData::from_bytes(&[], self.dtype, self.endian);
            return Ok(Frame::new(0, 0, empty)?);
        }
        Ok(Frame::from_bytes(bytes, self.dtype, self.endian, &self.shape)?)
    }

    /// Decode a mask payload to `u32` classification bits.
    ///
    /// # Errors
    /// Returns an error if the payload does not hold a 2-D mask.
    pub fn decode_mask(&self, bytes: &[u8]) -> Result<Mask> {
        let frame = Frame::from_bytes(bytes, self.dtype, self.endian, &self.shape)?;
        Ok(Mask::from_data(frame.width(), frame.height(), frame.data())?)
    }
}

fn geometry_from_headers<H: HeaderLookup + ?Sized>(headers: &H, prefix: &str) -> DetectorGeometry {
    let field = |name: &str| headers.header_f64(&format!("{prefix}-{name}"));
    let energy_ev = field("Energy-Ev").or_else(|| {
        field("Wavelength-A")
            .filter(|w| *w > 0.0)
            .and_then(energy_from_wavelength)
    });
    DetectorGeometry {
        distance_mm: field("DetectorDistance-MM"),
        pixel_size_um: field("PixelSize-UM"),
        energy_ev,
        center_x_px: field("BeamCenter-X"),
        center_y_px: field("BeamCenter-Y"),
    }
}

/// Geometry carried by `X-Image-*` headers of the `image` endpoint.
///
/// The energy falls back to `12398.4193 / wavelength` when only the
/// wavelength is present.
pub fn image_geometry<H: HeaderLookup + ?Sized>(headers: &H) -> DetectorGeometry {
    geometry_from_headers(headers, "X-Image")
}

/// Metadata attached to a SIMPLON monitor frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimplonMeta {
    pub series: String,
    pub image: String,
    pub date: String,
    pub threshold_ev: Option<f64>,
    pub geometry: DetectorGeometry,
}

impl SimplonMeta {
    pub fn from_headers<H: HeaderLookup + ?Sized>(headers: &H) -> Self {
        let text = |name: &str| headers.header(name).unwrap_or_default().to_string();
        Self {
            series: text("X-Simplon-Series"),
            image: text("X-Simplon-Image"),
            date: text("X-Simplon-Date"),
            threshold_ev: headers.header_f64("X-Simplon-Threshold-Ev"),
            geometry: geometry_from_headers(headers, "X-Simplon"),
        }
    }

    /// Short label such as `series 12 · image 340`.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.series.is_empty(), self.image.is_empty()) {
            (false, false) => format!("series {} · image {}", self.series, self.image),
            (false, true) => format!("series {}", self.series),
            (true, false) => format!("image {}", self.image),
            (true, true) => String::new(),
        }
    }
}

/// Cache key of a mask: the file path, suffixed with `#threshold` when the
/// dataset holds more than one threshold.
#[must_use]
pub fn mask_key(file: &str, threshold: usize, threshold_count: usize) -> String {
    if threshold_count > 1 {
        format!("{file}#{threshold}")
    } else {
        file.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_payload_headers() {
        let h = headers(&[
            ("x-dtype", "<u2"),
            ("X-Shape", "2,3"),
            ("X-Frame", "7"),
            ("X-Mask-Path", "/entry/instrument/detector/pixel_mask"),
        ]);
        let meta = PayloadHeaders::from_headers(&h);
        assert_eq!(meta.dtype, Dtype::U16);
        assert_eq!(meta.shape, vec![2, 3]);
        assert_eq!(meta.frame, Some(7));
        assert!(!meta.preview);
        assert_eq!(
            meta.mask_path.as_deref(),
            Some("/entry/instrument/detector/pixel_mask")
        );
    }

    #[test]
    fn test_decode_frame() {
        let h = headers(&[("X-Dtype", "<u2"), ("X-Shape", "2,2")]);
        let meta = PayloadHeaders::from_headers(&h);
        let bytes: Vec<u8> = [1u16, 2, 3, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        let frame = meta.decode_frame(&bytes).unwrap();
        assert_eq!((frame.width(), frame.height()), (2, 2));
        assert_eq!(frame.value(1, 1), Some(4.0));
    }

    #[test]
    fn test_malformed_shape_gives_empty_frame() {
        let h = headers(&[("X-Dtype", "<u2"), ("X-Shape", "two,by,two")]);
        let meta = PayloadHeaders::from_headers(&h);
        let frame = meta.decode_frame(&[0u8; 8]).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_missing_dtype_defaults_to_u32() {
        let h = headers(&[("X-Shape", "1,1")]);
        let meta = PayloadHeaders::from_headers(&h);
        assert_eq!(meta.dtype, Dtype::U32);
    }

    #[test]
    fn test_short_payload_is_error() {
        let h = headers(&[("X-Dtype", "<u4"), ("X-Shape", "4,4")]);
        let meta = PayloadHeaders::from_headers(&h);
        assert!(meta.decode_frame(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_decode_mask() {
        let h = headers(&[("X-Dtype", "|u1"), ("X-Shape", "1,3")]);
        let meta = PayloadHeaders::from_headers(&h);
        let mask = meta.decode_mask(&[0, 1, 2]).unwrap();
        assert_eq!(mask.raw(), &[0, 1, 2]);
    }

    #[test]
    fn test_image_geometry_wavelength_fallback() {
        let h = headers(&[
            ("X-Image-DetectorDistance-MM", "150.5"),
            ("X-Image-PixelSize-UM", "75"),
            ("X-Image-Wavelength-A", "1.0"),
            ("X-Image-BeamCenter-X", ""),
        ]);
        let geometry = image_geometry(&h);
        assert_eq!(geometry.distance_mm, Some(150.5));
        assert_eq!(geometry.pixel_size_um, Some(75.0));
        assert!((geometry.energy_ev.unwrap() - 12_398.419_3).abs() < 1e-6);
        assert_eq!(geometry.center_x_px, None);
    }

    #[test]
    fn test_simplon_meta() {
        let h = headers(&[
            ("X-Simplon-Series", "12"),
            ("X-Simplon-Image", "340"),
            ("X-Simplon-Energy-Ev", "12400"),
            ("X-Simplon-BeamCenter-X", "1024.5"),
        ]);
        let meta = SimplonMeta::from_headers(&h);
        assert_eq!(meta.label(), "series 12 · image 340");
        assert_eq!(meta.geometry.energy_ev, Some(12_400.0));
        assert_eq!(meta.geometry.center_x_px, Some(1024.5));
        assert!(meta.date.is_empty());
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("/data/a.h5", 1, 2), "/data/a.h5#1");
        assert_eq!(mask_key("/data/a.h5", 0, 1), "/data/a.h5");
    }
}
