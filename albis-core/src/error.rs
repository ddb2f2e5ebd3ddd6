//! Error types for albis-core.

use thiserror::Error;

/// Result type alias for albis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for frame and mask handling.
#[derive(Error, Debug)]
pub enum Error {
    /// Payload byte length does not match the declared shape and dtype.
    #[error("payload of {bytes} bytes does not hold {expected} elements of {dtype}")]
    PayloadLength {
        bytes: usize,
        expected: usize,
        dtype: &'static str,
    },

    /// Shape header does not describe a 2-D frame.
    #[error("invalid frame shape: {0:?}")]
    InvalidShape(Vec<usize>),

    /// Element count does not match `width * height`.
    #[error("expected {expected} pixels, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Mask shape is neither the frame shape nor its transpose.
    #[error("mask shape {mask:?} does not match frame {frame:?}")]
    MaskShape {
        mask: (usize, usize),
        frame: (usize, usize),
    },

    /// Unknown colormap name.
    #[error("unknown colormap: {0}")]
    UnknownColormap(String),
}
