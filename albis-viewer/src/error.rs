//! Error types for albis-viewer.

use thiserror::Error;

/// Result type alias for viewer operations.
pub type Result<T> = std::result::Result<T, ViewerError>;

/// Errors raised by the viewer controller.
#[derive(Error, Debug)]
pub enum ViewerError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame or mask model error.
    #[error(transparent)]
    Core(#[from] albis_core::Error),

    /// Frame source or backend error.
    #[error(transparent)]
    Source(#[from] albis_io::Error),

    /// Render backend error.
    #[error(transparent)]
    Render(#[from] albis_render::RenderError),

    /// Settings file error.
    #[error("settings error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image encoding error.
    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),

    /// Operation needs a loaded frame.
    #[error("no frame loaded")]
    NoFrame,

    /// Nothing to export.
    #[error("nothing to export: {0}")]
    NothingToExport(&'static str),
}
