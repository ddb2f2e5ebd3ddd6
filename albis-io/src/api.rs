//! JSON payloads of the backend API.

use albis_analysis::DetectorGeometry;
use serde::{Deserialize, Serialize};

/// `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl Health {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// One dataset found while walking an HDF5 file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub path: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    #[serde(default)]
    pub ndim: usize,
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub chunks: Option<Vec<usize>>,
    #[serde(default)]
    pub maxshape: Option<Vec<Option<usize>>>,
    /// 2-D to 4-D numeric dataset.
    #[serde(default)]
    pub image: bool,
}

/// `GET /api/datasets?file=`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<DatasetInfo>,
}

impl DatasetsResponse {
    /// Image datasets, largest first, with the linked `/entry/data` stack
    /// (or else the first `/entry/data/data*` dataset) promoted to the front.
    #[must_use]
    pub fn image_candidates(&self) -> Vec<&DatasetInfo> {
        let mut candidates: Vec<&DatasetInfo> =
            self.datasets.iter().filter(|d| d.image).collect();
        candidates.sort_by(|a, b| b.size.cmp(&a.size));
        let primary = candidates
            .iter()
            .position(|d| d.path == "/entry/data")
            .or_else(|| {
                candidates
                    .iter()
                    .position(|d| d.path.contains("/entry/data/data"))
            });
        if let Some(idx) = primary {
            let item = candidates.remove(idx);
            candidates.insert(0, item);
        }
        candidates
    }
}

/// `GET /api/metadata?file=&dataset=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub path: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    #[serde(default)]
    pub ndim: usize,
    #[serde(default)]
    pub chunks: Option<Vec<usize>>,
    #[serde(default)]
    pub maxshape: Option<Vec<Option<usize>>>,
    #[serde(default)]
    pub linked_stack: bool,
    #[serde(default)]
    pub threshold_energies: Option<Vec<Option<f64>>>,
}

impl Metadata {
    /// Frames along the first axis of a 3-D or 4-D stack, otherwise one.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        match self.shape.len() {
            3 | 4 => self.shape[0],
            _ => 1,
        }
    }

    /// Threshold channels along the second axis of a 4-D stack.
    #[must_use]
    pub fn threshold_count(&self) -> usize {
        if self.shape.len() == 4 {
            self.shape[1]
        } else {
            1
        }
    }

    /// Energy of threshold `idx`, when the file records it.
    #[must_use]
    pub fn threshold_energy(&self, idx: usize) -> Option<f64> {
        if self.shape.len() != 4 {
            return None;
        }
        self.threshold_energies.as_ref()?.get(idx).copied().flatten()
    }

    /// Frame `(height, width)`.
    #[must_use]
    pub fn frame_shape(&self) -> Option<(usize, usize)> {
        let n = self.shape.len();
        (n >= 2).then(|| (self.shape[n - 2], self.shape[n - 1]))
    }
}

/// `GET /api/analysis/params?file=&dataset=`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    #[serde(default)]
    pub distance_mm: Option<f64>,
    #[serde(default)]
    pub pixel_size_um: Option<f64>,
    #[serde(default)]
    pub energy_ev: Option<f64>,
    #[serde(default)]
    pub center_x_px: Option<f64>,
    #[serde(default)]
    pub center_y_px: Option<f64>,
    #[serde(default)]
    pub shape: Option<Vec<usize>>,
}

impl From<AnalysisParams> for DetectorGeometry {
    fn from(params: AnalysisParams) -> Self {
        let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
        Self {
            distance_mm: finite(params.distance_mm),
            pixel_size_um: finite(params.pixel_size_um),
            energy_ev: finite(params.energy_ev),
            center_x_px: finite(params.center_x_px),
            center_y_px: finite(params.center_y_px),
        }
    }
}

/// Series-sum mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesSumMode {
    #[default]
    All,
    Step,
    Nth,
    Range,
}

/// Reduction applied across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesSumOperation {
    #[default]
    Sum,
    Mean,
    Median,
}

/// Body of `POST /api/analysis/series-sum/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSumRequest {
    pub file: String,
    pub dataset: String,
    pub mode: SeriesSumMode,
    pub step: usize,
    pub operation: SeriesSumOperation,
    pub normalize_frame: Option<usize>,
    pub range_start: Option<usize>,
    pub range_end: Option<usize>,
    pub output_path: Option<String>,
    pub format: String,
    pub apply_mask: bool,
}

impl SeriesSumRequest {
    #[must_use]
    pub fn new(file: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            dataset: dataset.into(),
            mode: SeriesSumMode::All,
            step: 10,
            operation: SeriesSumOperation::Sum,
            normalize_frame: None,
            range_start: None,
            range_end: None,
            output_path: None,
            format: "hdf5".to_string(),
            apply_mask: true,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SeriesSumMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step.max(1);
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: SeriesSumOperation) -> Self {
        self.operation = operation;
        self
    }

    #[must_use]
    pub fn with_range(mut self, start: usize, end: usize) -> Self {
        self.range_start = Some(start.min(end));
        self.range_end = Some(start.max(end));
        self
    }

    #[must_use]
    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Reply of the series-sum start endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSumJob {
    pub job_id: String,
    pub status: String,
}

/// Polled series-sum job state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesSumStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SeriesSumStatus {
    /// Reported status, `running` when absent.
    #[must_use]
    pub fn state(&self) -> &str {
        self.status.as_deref().unwrap_or("running")
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state(), "queued" | "running")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_counts() {
        let json = r#"{"path":"/entry/data","shape":[100,2,512,1024],"dtype":"uint32",
            "ndim":4,"chunks":null,"maxshape":[null,2,512,1024],"linked_stack":true,
            "threshold_energies":[6000.0,null]}"#;
        let meta: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.frame_count(), 100);
        assert_eq!(meta.threshold_count(), 2);
        assert_eq!(meta.threshold_energy(0), Some(6000.0));
        assert_eq!(meta.threshold_energy(1), None);
        assert_eq!(meta.frame_shape(), Some((512, 1024)));
    }

    #[test]
    fn test_metadata_single_frame() {
        let json = r#"{"path":"/img","shape":[64,64],"dtype":"uint16"}"#;
        let meta: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.frame_count(), 1);
        assert_eq!(meta.threshold_count(), 1);
    }

    #[test]
    fn test_image_candidates_order() {
        let json = r#"{"datasets":[
            {"path":"/entry/data/data_000001","shape":[10,4,4],"dtype":"uint16","ndim":3,"size":160,"image":true},
            {"path":"/entry/big","shape":[20,4,4],"dtype":"uint16","ndim":3,"size":320,"image":true},
            {"path":"/entry/names","shape":[3],"dtype":"|S8","ndim":1,"size":3,"image":false}
        ]}"#;
        let response: DatasetsResponse = serde_json::from_str(json).unwrap();
        let order: Vec<&str> = response
            .image_candidates()
            .iter()
            .map(|d| d.path.as_str())
            .collect();
        assert_eq!(order, vec!["/entry/data/data_000001", "/entry/big"]);
    }

    #[test]
    fn test_analysis_params_into_geometry() {
        let json = r#"{"distance_mm":120.0,"pixel_size_um":75.0,"energy_ev":null,
            "center_x_px":512.0,"center_y_px":null,"shape":[1024,1024]}"#;
        let params: AnalysisParams = serde_json::from_str(json).unwrap();
        let geometry = DetectorGeometry::from(params).with_default_center(1024, 1024);
        assert_eq!(geometry.distance_mm, Some(120.0));
        assert_eq!(geometry.energy_ev, None);
        assert_eq!(geometry.center_y_px, Some(512.0));
    }

    #[test]
    fn test_series_sum_request_body() {
        let request = SeriesSumRequest::new("/data/a.h5", "/entry/data");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["mode"], "all");
        assert_eq!(value["step"], 10);
        assert_eq!(value["operation"], "sum");
        assert_eq!(value["format"], "hdf5");
        assert_eq!(value["apply_mask"], true);
        assert!(value["range_start"].is_null());
    }

    #[test]
    fn test_series_sum_status() {
        let status: SeriesSumStatus =
            serde_json::from_str(r#"{"status":"done","progress":1.0,"outputs":["/o/a.h5"]}"#)
                .unwrap();
        assert!(!status.is_running());
        assert_eq!(status.outputs.len(), 1);
        let empty: SeriesSumStatus = serde_json::from_str("{}").unwrap();
        assert!(empty.is_running());
    }
}
