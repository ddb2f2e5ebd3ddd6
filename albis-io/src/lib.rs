//! albis-io: Wire decoding, backend client and local frame sources.
//!
//! This crate decodes the binary frame/mask responses of the viewer
//! backend, provides typed JSON API payloads and a blocking HTTP client,
//! and reads frames from local TIFF, raw and HDF5 files.
//!

use std::time::Duration;

pub mod api;
#[cfg(feature = "http")]
pub mod client;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod header;
pub mod local;
pub mod raw;
pub mod tiff;

pub use api::{
    AnalysisParams, DatasetInfo, DatasetsResponse, Health, Metadata, SeriesSumJob,
    SeriesSumRequest, SeriesSumStatus,
};
#[cfg(feature = "http")]
pub use client::{ApiClient, ClientConfig, FrameRequest, Payload};
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use self::hdf5::{read_mask, Hdf5Stack};
pub use header::{image_geometry, mask_key, HeaderLookup, PayloadHeaders, SimplonMeta};
#[cfg(feature = "hdf5")]
pub use local::open_hdf5_stack;
pub use local::{read_local_frame, FileKind, LocalRequest};
pub use raw::{MappedFrameReader, RawLayout};
pub use self::tiff::{read_tiff, write_tiff};

/// Backend API root used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
/// Timeout for ordinary requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the health probe.
pub const HEALTH_TIMEOUT: Duration = Duration::from_millis(1500);
