//! CSV and PNG export.

use std::fmt::Write as _;
use std::path::Path;

use albis_analysis::{Peak, ProfileKind, RoiMode, RoiResult};
use albis_render::RgbaImage;

use crate::{Result, ViewerError};

/// Where an export comes from: the open file, frame and threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSource<'a> {
    pub file: Option<&'a str>,
    pub frame_index: usize,
    pub threshold: usize,
    pub threshold_count: usize,
}

impl<'a> ExportSource<'a> {
    #[must_use]
    pub fn new(file: Option<&'a str>, frame_index: usize) -> Self {
        Self {
            file,
            frame_index,
            threshold: 0,
            threshold_count: 1,
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize, threshold_count: usize) -> Self {
        self.threshold = threshold;
        self.threshold_count = threshold_count;
        self
    }

    /// `{base}_frame_{n}` plus `_thr{k}` for multi-threshold data, with
    /// 1-based frame and threshold numbers.
    fn stem(&self, fallback: &str) -> String {
        let base = self
            .file
            .filter(|f| !f.is_empty())
            .map_or_else(|| fallback.to_string(), base_name);
        let mut stem = format!("{base}_frame_{}", self.frame_index + 1);
        if self.threshold_count > 1 {
            let _ = write!(stem, "_thr{}", self.threshold + 1);
        }
        stem
    }

    /// File name for a peak list export.
    #[must_use]
    pub fn peak_csv_name(&self) -> String {
        format!("{}_peaks.csv", self.stem("peaks"))
    }

    /// File name for an ROI export.
    #[must_use]
    pub fn roi_csv_name(&self, mode: RoiMode) -> String {
        format!("{}_roi_{}.csv", self.stem("roi"), mode.name())
    }
}

/// File name without directory or last extension.
fn base_name(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() => name[..dot].to_string(),
        _ => name.to_string(),
    }
}

fn csv_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

/// Peak list as `x,y,intensity` rows.
///
/// # Errors
/// Returns [`ViewerError::NothingToExport`] for an empty list.
pub fn peaks_to_csv(peaks: &[Peak]) -> Result<String> {
    if peaks.is_empty() {
        return Err(ViewerError::NothingToExport("no peaks"));
    }
    let mut rows = vec!["x,y,intensity".to_string()];
    rows.extend(
        peaks
            .iter()
            .map(|p| format!("{},{},{}", p.x, p.y, csv_number(p.intensity))),
    );
    Ok(rows.join("\n"))
}

/// ROI profiles as CSV sections.
///
/// Each section is a `# Title` line, an `x,y` label row and one row per
/// sample. Box ROIs always emit both projection sections.
///
/// # Errors
/// Returns [`ViewerError::NothingToExport`] when there is no ROI or no
/// profile data.
#[allow(clippy::cast_precision_loss)]
pub fn roi_to_csv(mode: RoiMode, result: Option<&RoiResult>) -> Result<String> {
    let Some(result) = result.filter(|_| mode != RoiMode::None) else {
        return Err(ViewerError::NothingToExport("no ROI"));
    };
    let mut lines: Vec<String> = Vec::new();
    let mut section = |kind: ProfileKind, values: &[f64], x_start: f64, x_step: f64| {
        let (x_label, y_label) = kind.labels();
        let x_step = if x_step.is_finite() && x_step != 0.0 {
            x_step
        } else {
            1.0
        };
        lines.push(format!("# {}", kind.title()));
        lines.push(format!("{x_label},{y_label}"));
        lines.extend(values.iter().enumerate().map(|(i, &v)| {
            format!(
                "{},{}",
                csv_number(x_start + i as f64 * x_step),
                csv_number(v)
            )
        }));
        lines.push(String::new());
    };

    for kind in [ProfileKind::Line, ProfileKind::Radial] {
        if let Some(p) = result.profile(kind).filter(|p| !p.values.is_empty()) {
            section(kind, &p.values, p.x_start, p.x_step);
        }
    }
    for kind in [ProfileKind::XProjection, ProfileKind::YProjection] {
        match result.profile(kind) {
            Some(p) if !p.values.is_empty() => section(kind, &p.values, p.x_start, p.x_step),
            _ if mode == RoiMode::Box => section(kind, &[], 0.0, 1.0),
            _ => {}
        }
    }

    if lines.is_empty() {
        return Err(ViewerError::NothingToExport("no ROI profile data"));
    }
    Ok(lines.join("\n"))
}

/// Write `contents` to `path`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_text<P: AsRef<Path>>(path: P, contents: &str) -> Result<()> {
    std::fs::write(path.as_ref(), contents)?;
    log::info!("exported {}", path.as_ref().display());
    Ok(())
}

/// Save a rendered frame as PNG.
///
/// # Errors
/// Returns an error if the image cannot be encoded or written.
pub fn write_png<P: AsRef<Path>>(path: P, image: &RgbaImage) -> Result<()> {
    image.save_with_format(path.as_ref(), image::ImageFormat::Png)?;
    log::info!(
        "exported {}x{} PNG {}",
        image.width(),
        image.height(),
        path.as_ref().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use albis_analysis::{compute_roi, Point, Roi};
    use albis_core::Frame;
    use tempfile::tempdir;

    #[test]
    fn test_file_names() {
        let source = ExportSource::new(Some("/data/run/lyso_001_master.h5"), 4);
        assert_eq!(source.peak_csv_name(), "lyso_001_master_frame_5_peaks.csv");
        let multi = source.with_threshold(1, 2);
        assert_eq!(
            multi.roi_csv_name(RoiMode::Annulus),
            "lyso_001_master_frame_5_thr2_roi_annulus.csv"
        );
        let none = ExportSource::new(None, 0);
        assert_eq!(none.peak_csv_name(), "peaks_frame_1_peaks.csv");
        assert_eq!(none.roi_csv_name(RoiMode::Line), "roi_frame_1_roi_line.csv");
    }

    #[test]
    fn test_peak_csv() {
        let peaks = [
            Peak {
                x: 3,
                y: 4,
                intensity: 100.0,
            },
            Peak {
                x: 10,
                y: 2,
                intensity: 7.5,
            },
        ];
        assert_eq!(
            peaks_to_csv(&peaks).unwrap(),
            "x,y,intensity\n3,4,100\n10,2,7.5"
        );
        assert!(matches!(
            peaks_to_csv(&[]),
            Err(ViewerError::NothingToExport(_))
        ));
    }

    #[test]
    fn test_line_roi_csv() {
        let frame = Frame::new(4, 1, vec![1u16, 2, 3, 4]).unwrap();
        let roi = Roi::new(RoiMode::Line, Point::new(0.0, 0.0), Point::new(3.0, 0.0));
        let result = compute_roi(&frame, None, &roi);
        let csv = roi_to_csv(RoiMode::Line, result.as_ref()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "# Line Profile");
        assert_eq!(lines[1], "Sample,Intensity");
        assert_eq!(&lines[2..6], &["0,1", "1,2", "2,3", "3,4"]);
        assert!(csv.ends_with('\n'));
    }

    #[test]
    fn test_box_roi_csv_has_projections() {
        let frame = Frame::new(4, 4, vec![2u16; 16]).unwrap();
        let roi = Roi::new(RoiMode::Box, Point::new(1.0, 1.0), Point::new(2.0, 3.0));
        let result = compute_roi(&frame, None, &roi);
        let csv = roi_to_csv(RoiMode::Box, result.as_ref()).unwrap();
        assert!(csv.contains("# X Projection\nX Pixel,Mean\n"));
        assert!(csv.contains("# Y Projection\nY Pixel,Mean\n"));
        assert!(!csv.contains("# Line Profile"));
    }

    #[test]
    fn test_no_roi() {
        assert!(roi_to_csv(RoiMode::None, None).is_err());
        assert!(roi_to_csv(RoiMode::Box, None).is_err());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/b/c.tar.gz"), "c.tar");
        assert_eq!(base_name("frame"), "frame");
    }

    #[test]
    fn test_png_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        write_png(&path, &image).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (3, 2));
        assert_eq!(back.get_pixel(2, 1).0, [10, 20, 30, 255]);
    }
}
