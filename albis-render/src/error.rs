//! Error types for albis-render.

use thiserror::Error;

/// Errors that can occur while rendering a frame.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Frame is larger than the GPU can address.
    #[error("Frame exceeds max texture size {max}px")]
    TextureTooLarge { max: u32 },

    /// Palette has no entries.
    #[error("palette is empty")]
    EmptyPalette,

    /// No usable GPU adapter or device.
    #[error("GPU unavailable: {0}")]
    GpuUnavailable(String),

    /// Shader module or pipeline creation failed.
    #[error("shader pipeline failed: {0}")]
    Shader(String),

    /// Reading the rendered image back from the GPU failed.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] albis_core::Error),
}

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;
