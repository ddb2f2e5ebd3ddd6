//! Single-frame TIFF files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use albis_core::{Frame, FrameData};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::ColorType;

use crate::{Error, Result};

/// Read the first image of a grayscale TIFF.
///
/// 8/16/32-bit unsigned and signed samples and 32/64-bit floats are kept at
/// their native type; 8-bit signed samples widen to `i16`.
///
/// # Errors
/// Returns an error for unreadable files, non-grayscale images and 64-bit
/// integer samples.
#[allow(clippy::cast_possible_truncation)]
pub fn read_tiff<P: AsRef<Path>>(path: P) -> Result<Frame> {
    let file = BufReader::new(File::open(path.as_ref())?);
    let mut decoder = Decoder::new(file)?;

    let colortype = decoder.colortype()?;
    if !matches!(colortype, ColorType::Gray(_)) {
        return Err(Error::InvalidFormat(format!(
            "unsupported TIFF color type {colortype:?}; expected grayscale"
        )));
    }

    let (width, height) = decoder.dimensions()?;
    let data = match decoder.read_image()? {
        DecodingResult::U8(v) => FrameData::U8(v),
        DecodingResult::U16(v) => FrameData::U16(v),
        DecodingResult::U32(v) => FrameData::U32(v),
        DecodingResult::I8(v) => FrameData::I16(v.into_iter().map(i16::from).collect()),
        DecodingResult::I16(v) => FrameData::I16(v),
        DecodingResult::I32(v) => FrameData::I32(v),
        DecodingResult::F32(v) => FrameData::F32(v),
        DecodingResult::F64(v) => FrameData::F64(v),
        _ => {
            return Err(Error::InvalidFormat(
                "64-bit integer TIFF samples are not supported".to_string(),
            ))
        }
    };
    log::debug!(
        "read TIFF {} ({width}x{height}, {})",
        path.as_ref().display(),
        data.dtype()
    );
    Ok(Frame::new(width as usize, height as usize, data)?)
}

/// Write a frame as a single-image grayscale TIFF at its native sample type.
///
/// # Errors
/// Returns an error if the file cannot be created or encoded.
#[allow(clippy::cast_possible_truncation)]
pub fn write_tiff<P: AsRef<Path>>(path: P, frame: &Frame) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;
    let (w, h) = (frame.width() as u32, frame.height() as u32);
    match frame.data() {
        FrameData::U8(v) => encoder.write_image::<colortype::Gray8>(w, h, v)?,
        FrameData::U16(v) => encoder.write_image::<colortype::Gray16>(w, h, v)?,
        FrameData::U32(v) => encoder.write_image::<colortype::Gray32>(w, h, v)?,
        FrameData::I16(v) => encoder.write_image::<colortype::GrayI16>(w, h, v)?,
        FrameData::I32(v) => encoder.write_image::<colortype::GrayI32>(w, h, v)?,
        FrameData::F32(v) => encoder.write_image::<colortype::Gray32Float>(w, h, v)?,
        FrameData::F64(v) => encoder.write_image::<colortype::Gray64Float>(w, h, v)?,
    }
    Ok(())
}
