//! Blocking client for the viewer backend API.

use std::time::Duration;

use albis_analysis::DetectorGeometry;
use albis_core::{Frame, Mask};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::api::{
    AnalysisParams, DatasetsResponse, Health, Metadata, SeriesSumJob, SeriesSumRequest,
    SeriesSumStatus,
};
use crate::header::{image_geometry, HeaderLookup, PayloadHeaders, SimplonMeta};
use crate::{Error, Result, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, HEALTH_TIMEOUT};

impl HeaderLookup for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            health_timeout: HEALTH_TIMEOUT,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Which frame of a stack to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    pub file: String,
    pub dataset: String,
    pub index: usize,
    /// Threshold channel, sent only for multi-threshold stacks.
    pub threshold: Option<usize>,
}

impl FrameRequest {
    #[must_use]
    pub fn new(file: impl Into<String>, dataset: impl Into<String>, index: usize) -> Self {
        Self {
            file: file.into(),
            dataset: dataset.into(),
            index,
            threshold: None,
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize, threshold_count: usize) -> Self {
        self.threshold = (threshold_count > 1).then_some(threshold);
        self
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("file", self.file.clone()),
            ("dataset", self.dataset.clone()),
            ("index", self.index.to_string()),
        ];
        if let Some(threshold) = self.threshold {
            query.push(("threshold", threshold.to_string()));
        }
        query
    }
}

/// Binary payload plus the headers describing it.
#[derive(Debug, Clone)]
pub struct Payload {
    pub meta: PayloadHeaders,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Payload {
    fn read(response: Response) -> Result<Self> {
        let headers = response.headers().clone();
        let meta = PayloadHeaders::from_headers(&headers);
        let body = response.bytes()?.to_vec();
        Ok(Self {
            meta,
            headers,
            body,
        })
    }

    /// # Errors
    /// Returns an error if the body does not match the declared shape.
    pub fn frame(&self) -> Result<Frame> {
        self.meta.decode_frame(&self.body)
    }

    /// # Errors
    /// Returns an error if the body does not hold a 2-D mask.
    pub fn mask(&self) -> Result<Mask> {
        self.meta.decode_mask(&self.body)
    }

    /// Geometry from `X-Image-*` headers.
    #[must_use]
    pub fn image_geometry(&self) -> DetectorGeometry {
        image_geometry(&self.headers)
    }

    #[must_use]
    pub fn simplon(&self) -> SimplonMeta {
        SimplonMeta::from_headers(&self.headers)
    }
}

/// Blocking API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
    health_client: Client,
}

impl ApiClient {
    /// Build a client.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let health_client = Client::builder().timeout(config.health_timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            health_client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send(request: RequestBuilder, url: &str) -> Result<Response> {
        log::debug!("request {url}");
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.url(path);
        let response = Self::send(self.client.get(&url).query(query), &url)?;
        let body = response.bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn get_payload(&self, path: &str, query: &[(&str, String)]) -> Result<Payload> {
        let url = self.url(path);
        let response = Self::send(self.client.get(&url).query(query), &url)?;
        Payload::read(response)
    }

    /// Probe `health` with the short health timeout.
    ///
    /// # Errors
    /// Returns an error if the backend is unreachable or unhealthy.
    pub fn health(&self) -> Result<Health> {
        let url = self.url("health");
        let response = Self::send(self.health_client.get(&url), &url)?;
        let body = response.bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn datasets(&self, file: &str) -> Result<DatasetsResponse> {
        self.get_json("datasets", &[("file", file.to_string())])
    }

    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn metadata(&self, file: &str, dataset: &str) -> Result<Metadata> {
        self.get_json(
            "metadata",
            &[("file", file.to_string()), ("dataset", dataset.to_string())],
        )
    }

    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn analysis_params(&self, file: &str, dataset: &str) -> Result<AnalysisParams> {
        self.get_json(
            "analysis/params",
            &[("file", file.to_string()), ("dataset", dataset.to_string())],
        )
    }

    /// Fetch one full-resolution frame.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn frame(&self, request: &FrameRequest) -> Result<Payload> {
        self.get_payload("frame", &request.query())
    }

    /// Fetch a downsampled preview no larger than `max_size` on either side.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn preview(&self, request: &FrameRequest, max_size: usize) -> Result<Payload> {
        let mut query = request.query();
        query.push(("max_size", max_size.clamp(64, 4096).to_string()));
        self.get_payload("preview", &query)
    }

    /// Fetch the pixel mask of `file`.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn mask(&self, file: &str, threshold: Option<usize>) -> Result<Payload> {
        let mut query = vec![("file", file.to_string())];
        if let Some(threshold) = threshold {
            query.push(("threshold", threshold.to_string()));
        }
        self.get_payload("mask", &query)
    }

    /// Fetch a single-image file (TIFF, CBF, EDF) decoded by the backend.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn image(&self, file: &str, index: usize) -> Result<Payload> {
        self.get_payload(
            "image",
            &[("file", file.to_string()), ("index", index.to_string())],
        )
    }

    /// Poll the SIMPLON monitor. `None` when the detector has no new frame.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn simplon_monitor(
        &self,
        detector_url: &str,
        version: &str,
        timeout_ms: u64,
    ) -> Result<Option<Payload>> {
        let url = self.url("simplon/monitor");
        let query = [
            ("url", detector_url.to_string()),
            ("version", version.to_string()),
            ("timeout", timeout_ms.to_string()),
            ("enable", "1".to_string()),
        ];
        let response = Self::send(self.client.get(&url).query(&query), &url)?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Payload::read(response).map(Some)
    }

    /// Queue a series-sum job.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn series_sum_start(&self, request: &SeriesSumRequest) -> Result<SeriesSumJob> {
        let url = self.url("analysis/series-sum/start");
        let response = Self::send(self.client.post(&url).json(request), &url)?;
        let body = response.bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn series_sum_status(&self, job_id: &str) -> Result<SeriesSumStatus> {
        self.get_json(
            "analysis/series-sum/status",
            &[("job_id", job_id.to_string())],
        )
    }
}
