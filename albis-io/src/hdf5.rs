//! HDF5/NeXus frame stacks and pixel masks.
//!
//! A stack is either a single 2-D, 3-D (`frame, y, x`) or 4-D
//! (`frame, threshold, y, x`) dataset, or a group of `data_NNNNNN`
//! segments (the layout of linked master files) read as one stack.

use crate::api::Metadata;
use crate::{Error, Result};
use albis_core::{Dtype, Frame, FrameData, Mask};
use hdf5::types::{FloatSize, H5Type, IntSize, TypeDescriptor};
use hdf5::{Dataset, File};
use ndarray::{s, Array2};
use std::path::Path;

/// Candidate mask datasets, in lookup order.
pub const MASK_PATHS: [&str; 6] = [
    "/entry/instrument/detector/detectorSpecific/pixel_mask",
    "/entry/instrument/detector/pixel_mask",
    "/entry/instrument/detector/detectorSpecific/bad_pixel_mask",
    "/entry/instrument/detector/bad_pixel_mask",
    "/entry/instrument/detector/pixel_mask_applied",
    "/entry/instrument/detector/detectorSpecific/pixel_mask_applied",
];

fn threshold_group(threshold: usize) -> String {
    format!(
        "/entry/instrument/detector/threshold_{}_channel",
        threshold + 1
    )
}

struct Segment {
    dataset: Dataset,
    frames: usize,
}

/// A frame stack inside an open HDF5 file.
pub struct Hdf5Stack {
    file: File,
    path: String,
    segments: Vec<Segment>,
    shape: Vec<usize>,
    linked: bool,
}

fn linked_member_index(name: &str) -> Option<u64> {
    name.strip_prefix("data_")?.parse::<u64>().ok()
}

impl Hdf5Stack {
    /// Open `dataset` inside the file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, or the path names
    /// neither an image dataset nor a group of linked segments.
    pub fn open<P: AsRef<Path>>(path: P, dataset: &str) -> Result<Self> {
        let file = File::open(path)?;
        let direct = file.dataset(dataset).ok();
        let linked = direct.is_none();
        let (segments, shape) = if let Some(ds) = direct {
            let shape = ds.shape();
            if !(2..=4).contains(&shape.len()) {
                return Err(Error::InvalidFormat(format!(
                    "{dataset} is not a 2-D, 3-D or 4-D dataset"
                )));
            }
            let frames = if shape.len() == 2 { 1 } else { shape[0] };
            (vec![Segment { dataset: ds, frames }], shape)
        } else {
            Self::linked_segments(&file, dataset)?
        };
        log::debug!("opened HDF5 stack {dataset} with shape {shape:?}");
        Ok(Self {
            file,
            path: dataset.to_string(),
            segments,
            shape,
            linked,
        })
    }

    fn linked_segments(file: &File, group_path: &str) -> Result<(Vec<Segment>, Vec<usize>)> {
        let group = file.group(group_path)?;
        let mut names: Vec<(u64, String)> = group
            .member_names()?
            .into_iter()
            .filter_map(|name| linked_member_index(&name).map(|idx| (idx, name)))
            .collect();
        names.sort_unstable();

        let mut segments = Vec::new();
        let mut tail: Option<Vec<usize>> = None;
        let mut total = 0;
        for (_, name) in names {
            let Ok(ds) = group.dataset(&name) else {
                log::warn!("skipping unreadable segment {group_path}/{name}");
                continue;
            };
            let shape = ds.shape();
            if !(3..=4).contains(&shape.len()) || shape[0] == 0 {
                continue;
            }
            let seg_tail = shape[1..].to_vec();
            if tail.as_ref().is_some_and(|t| *t != seg_tail) {
                log::warn!("segment {name} shape {shape:?} does not match the stack");
                continue;
            }
            tail = Some(seg_tail);
            total += shape[0];
            segments.push(Segment {
                dataset: ds,
                frames: shape[0],
            });
        }

        let Some(tail) = tail else {
            return Err(Error::InvalidFormat(format!(
                "{group_path} holds no image dataset"
            )));
        };
        let mut shape = vec![total];
        shape.extend(tail);
        Ok((segments, shape))
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        if self.shape.len() >= 3 {
            self.shape[0]
        } else {
            1
        }
    }

    #[must_use]
    pub fn threshold_count(&self) -> usize {
        if self.shape.len() == 4 {
            self.shape[1]
        } else {
            1
        }
    }

    /// Read frame `index` of threshold channel `threshold`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for out-of-range indices or
    /// unsupported element types.
    pub fn read_frame(&self, index: usize, threshold: usize) -> Result<Frame> {
        if index >= self.frame_count() {
            return Err(Error::InvalidFormat(format!(
                "frame index {index} out of range ({} frames)",
                self.frame_count()
            )));
        }
        if threshold >= self.threshold_count() {
            return Err(Error::InvalidFormat(format!(
                "threshold index {threshold} out of range ({} thresholds)",
                self.threshold_count()
            )));
        }

        let mut local = index;
        let mut selected = None;
        for segment in &self.segments {
            if local < segment.frames {
                selected = Some(segment);
                break;
            }
            local -= segment.frames;
        }
        let segment = selected
            .ok_or_else(|| Error::InvalidFormat(format!("frame index {index} out of range")))?;

        let ds = &segment.dataset;
        let data = match element_dtype(ds)? {
            Dtype::U8 => FrameData::U8(read_plane(ds, local, threshold)?),
            Dtype::U16 => FrameData::U16(read_plane(ds, local, threshold)?),
            Dtype::U32 => FrameData::U32(read_plane(ds, local, threshold)?),
            Dtype::I16 => FrameData::I16(read_plane(ds, local, threshold)?),
            Dtype::I32 => FrameData::I32(read_plane(ds, local, threshold)?),
            Dtype::F32 => FrameData::F32(read_plane(ds, local, threshold)?),
            Dtype::F64 => FrameData::F64(read_plane(ds, local, threshold)?),
        };
        let n = self.shape.len();
        Ok(Frame::new(self.shape[n - 1], self.shape[n - 2], data)?)
    }

    /// Describe the stack the way the metadata endpoint does.
    ///
    /// # Errors
    /// Returns an error for unsupported element types.
    pub fn metadata(&self) -> Result<Metadata> {
        let dtype = match self.segments.first() {
            Some(segment) => element_dtype(&segment.dataset)?,
            None => Dtype::default(),
        };
        Ok(Metadata {
            path: self.path.clone(),
            shape: self.shape.clone(),
            dtype: dtype.numpy_tag().to_string(),
            ndim: self.shape.len(),
            chunks: None,
            maxshape: None,
            linked_stack: self.linked,
            threshold_energies: (self.shape.len() == 4).then(|| self.threshold_energies()),
        })
    }

    /// Energy of each threshold channel, when recorded.
    #[must_use]
    pub fn threshold_energies(&self) -> Vec<Option<f64>> {
        (0..self.threshold_count())
            .map(|idx| {
                let key = format!("{}/threshold_energy", threshold_group(idx));
                self.file
                    .dataset(&key)
                    .and_then(|ds| ds.read_raw::<f64>())
                    .ok()
                    .and_then(|values| values.first().copied())
            })
            .collect()
    }

    /// The pixel mask that applies to this stack.
    ///
    /// # Errors
    /// Returns an error if a mask dataset exists but cannot be read.
    pub fn read_mask(&self, threshold: Option<usize>) -> Result<Option<(Mask, String)>> {
        read_mask(&self.file, threshold)
    }
}

/// Frame dtype for a dataset's element type. Narrow signed integers widen
/// to `i16`, 64-bit integers to `f64`.
fn element_dtype(ds: &Dataset) -> Result<Dtype> {
    let dtype = match ds.dtype()?.to_descriptor()? {
        TypeDescriptor::Unsigned(IntSize::U1) => Dtype::U8,
        TypeDescriptor::Unsigned(IntSize::U2) => Dtype::U16,
        TypeDescriptor::Unsigned(IntSize::U4) => Dtype::U32,
        TypeDescriptor::Integer(IntSize::U1 | IntSize::U2) => Dtype::I16,
        TypeDescriptor::Integer(IntSize::U4) => Dtype::I32,
        TypeDescriptor::Float(FloatSize::U4) => Dtype::F32,
        TypeDescriptor::Float(FloatSize::U8)
        | TypeDescriptor::Integer(IntSize::U8)
        | TypeDescriptor::Unsigned(IntSize::U8) => Dtype::F64,
        other => {
            return Err(Error::InvalidFormat(format!(
                "unsupported element type {other:?} in {}",
                ds.name()
            )))
        }
    };
    Ok(dtype)
}

/// Read one `(y, x)` plane; the dataset library converts to `T`.
fn read_plane<T: H5Type + Copy>(ds: &Dataset, index: usize, threshold: usize) -> Result<Vec<T>> {
    let plane: Array2<T> = match ds.ndim() {
        4 => ds.read_slice_2d(s![index, threshold, .., ..])?,
        3 => ds.read_slice_2d(s![index, .., ..])?,
        _ => ds.read_2d()?,
    };
    Ok(plane.iter().copied().collect())
}

/// Find and read the 2-D pixel mask of `file`.
///
/// The threshold-specific mask wins over the shared candidates. Returns the
/// mask with the dataset path it came from, or `None` when no candidate
/// exists.
///
/// # Errors
/// Returns an error if a candidate exists but cannot be read.
pub fn read_mask(file: &File, threshold: Option<usize>) -> Result<Option<(Mask, String)>> {
    let threshold_key = threshold.map(|t| format!("{}/pixel_mask", threshold_group(t)));
    let candidates = threshold_key
        .iter()
        .map(String::as_str)
        .chain(MASK_PATHS.iter().copied());

    for path in candidates {
        let Ok(ds) = file.dataset(path) else {
            continue;
        };
        let shape = ds.shape();
        if shape.len() != 2 {
            continue;
        }
        let raw = ds.read_raw::<u32>()?;
        let mask = Mask::new(shape[1], shape[0], raw)?;
        log::debug!("read pixel mask {path} ({}x{})", shape[1], shape[0]);
        return Ok(Some((mask, path.to_string())));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};
    use tempfile::tempdir;

    fn ensure_groups(file: &File, path: &str) {
        let mut current = String::new();
        for part in path.trim_matches('/').split('/') {
            current.push('/');
            current.push_str(part);
            if file.group(&current).is_err() {
                file.create_group(&current).unwrap();
            }
        }
    }

    #[test]
    fn test_read_3d_stack() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stack.h5");
        {
            let file = File::create(&path).unwrap();
            ensure_groups(&file, "/entry/data");
            let data = Array3::from_shape_fn((3, 2, 4), |(f, y, x)| (f * 100 + y * 10 + x) as u16);
            file.new_dataset_builder()
                .with_data(&data)
                .create("/entry/data/data")
                .unwrap();
        }
        let stack = Hdf5Stack::open(&path, "/entry/data/data").unwrap();
        assert_eq!(stack.frame_count(), 3);
        assert_eq!(stack.threshold_count(), 1);
        let frame = stack.read_frame(2, 0).unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 2));
        assert_eq!(frame.value(3, 1), Some(213.0));
        assert!(stack.read_frame(3, 0).is_err());
        let meta = stack.metadata().unwrap();
        assert_eq!(meta.shape, vec![3, 2, 4]);
        assert_eq!(meta.frame_count(), 3);
        assert!(!meta.linked_stack);
    }

    #[test]
    fn test_read_4d_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thr.h5");
        {
            let file = File::create(&path).unwrap();
            let data = Array4::from_shape_fn((2, 2, 2, 2), |(f, t, y, x)| {
                (f * 1000 + t * 100 + y * 10 + x) as u32
            });
            file.new_dataset_builder()
                .with_data(&data)
                .create("data")
                .unwrap();
        }
        let stack = Hdf5Stack::open(&path, "data").unwrap();
        assert_eq!(stack.threshold_count(), 2);
        let frame = stack.read_frame(1, 1).unwrap();
        assert_eq!(frame.value(1, 0), Some(1101.0));
    }

    #[test]
    fn test_linked_segments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.h5");
        {
            let file = File::create(&path).unwrap();
            ensure_groups(&file, "/entry/data");
            let group = file.group("/entry/data").unwrap();
            for (name, base) in [("data_000002", 10u16), ("data_000001", 0u16)] {
                let data = Array3::from_shape_fn((2, 1, 2), |(f, _, x)| base + (f * 2 + x) as u16);
                group
                    .new_dataset_builder()
                    .with_data(&data)
                    .create(name)
                    .unwrap();
            }
        }
        let stack = Hdf5Stack::open(&path, "/entry/data").unwrap();
        assert!(stack.is_linked());
        assert_eq!(stack.frame_count(), 4);
        assert_eq!(stack.read_frame(1, 0).unwrap().value(1, 0), Some(3.0));
        assert_eq!(stack.read_frame(2, 0).unwrap().value(0, 0), Some(10.0));
    }

    #[test]
    fn test_mask_lookup_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mask.h5");
        {
            let file = File::create(&path).unwrap();
            ensure_groups(&file, "/entry/instrument/detector/threshold_2_channel");
            let shared = ndarray::arr2(&[[0u32, 1], [0, 0]]);
            file.new_dataset_builder()
                .with_data(&shared)
                .create(MASK_PATHS[1])
                .unwrap();
            let specific = ndarray::arr2(&[[2u32, 0], [0, 0]]);
            file.new_dataset_builder()
                .with_data(&specific)
                .create("/entry/instrument/detector/threshold_2_channel/pixel_mask")
                .unwrap();
        }
        let file = File::open(&path).unwrap();
        let (mask, source) = read_mask(&file, Some(1)).unwrap().unwrap();
        assert_eq!(mask.raw(), &[2, 0, 0, 0]);
        assert!(source.contains("threshold_2_channel"));

        let (mask, source) = read_mask(&file, None).unwrap().unwrap();
        assert_eq!(mask.raw(), &[0, 1, 0, 0]);
        assert_eq!(source, MASK_PATHS[1]);
    }
}
