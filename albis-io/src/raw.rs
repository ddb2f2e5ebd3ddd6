//! Memory-mapped raw frame stacks.
//!
//! A raw file is a headerless sequence of frames with a known dtype and
//! frame shape, optionally preceded by a fixed-size header.

use std::fs::File;
use std::path::{Path, PathBuf};

use albis_core::{Dtype, Endian, Frame};
use memmap2::Mmap;

use crate::{Error, Result};

/// Layout of a raw frame file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLayout {
    pub dtype: Dtype,
    pub endian: Endian,
    pub width: usize,
    pub height: usize,
    /// Bytes skipped before the first frame.
    pub header_bytes: usize,
}

impl RawLayout {
    #[must_use]
    pub fn new(dtype: Dtype, width: usize, height: usize) -> Self {
        Self {
            dtype,
            endian: Endian::Little,
            width,
            height,
            header_bytes: 0,
        }
    }

    #[must_use]
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    #[must_use]
    pub fn with_header_bytes(mut self, header_bytes: usize) -> Self {
        self.header_bytes = header_bytes;
        self
    }

    /// Bytes per frame, or 0 when the shape overflows.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.dtype.size()))
            .unwrap_or(0)
    }
}

/// A memory-mapped raw frame file.
pub struct MappedFrameReader {
    mmap: Mmap,
    path: PathBuf,
    layout: RawLayout,
}

impl MappedFrameReader {
    /// Opens a raw file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or holds no complete
    /// frame.
    pub fn open<P: AsRef<Path>>(path: P, layout: RawLayout) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| Error::MmapError(format!("{}: {e}", path.as_ref().display())))?;
        let reader = Self {
            mmap,
            path: path.as_ref().to_path_buf(),
            layout,
        };
        if layout.frame_bytes() == 0 || reader.frame_count() == 0 {
            return Err(Error::InvalidFormat(format!(
                "{} holds no complete {}x{} {} frame",
                reader.path.display(),
                layout.width,
                layout.height,
                layout.dtype
            )));
        }
        Ok(reader)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn layout(&self) -> RawLayout {
        self.layout
    }

    /// Number of complete frames in the file. Trailing partial frames are
    /// ignored.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        let frame_bytes = self.layout.frame_bytes();
        if frame_bytes == 0 {
            return 0;
        }
        self.mmap.len().saturating_sub(self.layout.header_bytes) / frame_bytes
    }

    /// Decode frame `index`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if `index` is out of range.
    pub fn frame(&self, index: usize) -> Result<Frame> {
        let count = self.frame_count();
        if index >= count {
            return Err(Error::InvalidFormat(format!(
                "frame {index} out of range (file holds {count})"
            )));
        }
        let size = self.layout.frame_bytes();
        let start = self.layout.header_bytes + index * size;
        let bytes = &self.mmap[start..start + size];
        Ok(Frame::from_bytes(
            bytes,
            self.layout.dtype,
            self.layout.endian,
            &[self.layout.height, self.layout.width],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_stack(header: &[u8], values: &[u16]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(header).unwrap();
        for v in values {
            file.write_all(&v.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_frames_from_stack() {
        let values: Vec<u16> = (0..12).collect();
        let file = write_stack(&[], &values);
        let reader = MappedFrameReader::open(file.path(), RawLayout::new(Dtype::U16, 3, 2)).unwrap();
        assert_eq!(reader.frame_count(), 2);
        let second = reader.frame(1).unwrap();
        assert_eq!(second.value(0, 0), Some(6.0));
        assert_eq!(second.value(2, 1), Some(11.0));
        assert!(reader.frame(2).is_err());
    }

    #[test]
    fn test_header_and_partial_tail() {
        let values: Vec<u16> = (0..5).collect();
        let file = write_stack(&[0xAA; 4], &values);
        let layout = RawLayout::new(Dtype::U16, 2, 2).with_header_bytes(4);
        let reader = MappedFrameReader::open(file.path(), layout).unwrap();
        assert_eq!(reader.frame_count(), 1);
        assert_eq!(reader.frame(0).unwrap().value(1, 1), Some(3.0));
    }

    #[test]
    fn test_overflowing_layout_rejected() {
        let file = write_stack(&[], &[1, 2, 3, 4]);
        let layout = RawLayout::new(Dtype::U16, usize::MAX, 2);
        assert_eq!(layout.frame_bytes(), 0);
        assert!(matches!(
            MappedFrameReader::open(file.path(), layout),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_too_small_file() {
        let file = write_stack(&[], &[1, 2]);
        let layout = RawLayout::new(Dtype::U16, 4, 4);
        assert!(matches!(
            MappedFrameReader::open(file.path(), layout),
            Err(Error::InvalidFormat(_))
        ));
    }
}
