//! Local file sources.

use std::path::Path;

use albis_core::Frame;

use crate::raw::{MappedFrameReader, RawLayout};
use crate::tiff::read_tiff;
use crate::{Error, Result};

/// Datasets tried, in order, when an HDF5 file is opened without one.
pub const DEFAULT_DATASETS: [&str; 2] = ["/entry/data", "/entry/data/data"];

/// File family, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Hdf5,
    Tiff,
    /// CBF or EDF; decoded by the backend only.
    HeaderImage,
    Raw,
}

impl FileKind {
    #[must_use]
    pub fn of(path: &Path) -> Self {
        let lower = path.to_string_lossy().to_lowercase();
        if lower.ends_with(".h5") || lower.ends_with(".hdf5") || lower.ends_with(".nxs") {
            Self::Hdf5
        } else if lower.ends_with(".tif") || lower.ends_with(".tiff") {
            Self::Tiff
        } else if lower.ends_with(".cbf") || lower.ends_with(".cbf.gz") || lower.ends_with(".edf")
        {
            Self::HeaderImage
        } else {
            Self::Raw
        }
    }

    /// Whether frames of this kind carry a mask dataset.
    #[must_use]
    pub fn has_mask(self) -> bool {
        self == Self::Hdf5
    }
}

/// What to read from a local file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalRequest {
    pub dataset: Option<String>,
    pub index: usize,
    pub threshold: usize,
    /// Required for raw files.
    pub raw: Option<RawLayout>,
}

impl LocalRequest {
    #[must_use]
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_raw_layout(mut self, layout: RawLayout) -> Self {
        self.raw = Some(layout);
        self
    }
}

/// Read one frame from a local file.
///
/// # Errors
/// Returns an error if the file cannot be decoded, or its kind needs a
/// backend (CBF, EDF) or a feature that is not compiled in.
pub fn read_local_frame(path: &Path, request: &LocalRequest) -> Result<Frame> {
    match FileKind::of(path) {
        FileKind::Tiff => read_tiff(path),
        FileKind::Raw => {
            let layout = request.raw.ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "{} needs an explicit dtype and shape",
                    path.display()
                ))
            })?;
            MappedFrameReader::open(path, layout)?.frame(request.index)
        }
        FileKind::HeaderImage => Err(Error::InvalidFormat(format!(
            "{} can only be decoded by the backend",
            path.display()
        ))),
        FileKind::Hdf5 => read_hdf5_frame(path, request),
    }
}

#[cfg(feature = "hdf5")]
fn read_hdf5_frame(path: &Path, request: &LocalRequest) -> Result<Frame> {
    let stack = open_hdf5_stack(path, request.dataset.as_deref())?;
    stack.read_frame(request.index, request.threshold)
}

#[cfg(not(feature = "hdf5"))]
fn read_hdf5_frame(path: &Path, _request: &LocalRequest) -> Result<Frame> {
    Err(Error::InvalidFormat(format!(
        "{}: built without HDF5 support",
        path.display()
    )))
}

/// Open the requested dataset, or the first default dataset that exists.
///
/// # Errors
/// Returns an error if no candidate dataset can be opened.
#[cfg(feature = "hdf5")]
pub fn open_hdf5_stack(path: &Path, dataset: Option<&str>) -> Result<crate::hdf5::Hdf5Stack> {
    use crate::hdf5::Hdf5Stack;

    if let Some(dataset) = dataset {
        return Hdf5Stack::open(path, dataset);
    }
    let mut last_err = None;
    for candidate in DEFAULT_DATASETS {
        match Hdf5Stack::open(path, candidate) {
            Ok(stack) => return Ok(stack),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::InvalidFormat("no dataset".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use albis_core::Dtype;
    use std::io::Write;

    #[test]
    fn test_file_kind() {
        assert_eq!(FileKind::of(Path::new("/d/scan_master.H5")), FileKind::Hdf5);
        assert_eq!(FileKind::of(Path::new("img_0001.tiff")), FileKind::Tiff);
        assert_eq!(FileKind::of(Path::new("x.cbf.gz")), FileKind::HeaderImage);
        assert_eq!(FileKind::of(Path::new("dump.bin")), FileKind::Raw);
        assert!(FileKind::Hdf5.has_mask());
        assert!(!FileKind::Tiff.has_mask());
    }

    #[test]
    fn test_raw_requires_layout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        let request = LocalRequest::default();
        assert!(read_local_frame(file.path(), &request).is_err());

        let request = request.with_raw_layout(RawLayout::new(Dtype::U8, 4, 4));
        let frame = read_local_frame(file.path(), &request).unwrap();
        assert_eq!(frame.len(), 16);
    }

    #[test]
    fn test_cbf_is_backend_only() {
        let result = read_local_frame(Path::new("frame.cbf"), &LocalRequest::default());
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }
}
