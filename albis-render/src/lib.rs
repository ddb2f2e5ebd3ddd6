//! albis-render: False-color rendering of detector frames.
//!
//! Two interchangeable [`Renderer`] backends turn a frame, an optional mask,
//! a contrast window and a palette into an RGBA image:
//! - [`CpuRenderer`] - row-parallel pixel loop
//! - `GpuRenderer` - wgpu compute shader (feature `gpu`)
//!
//! Both evaluate the transfer function from `albis_core::transfer`, so the
//! same inputs give the same palette slots on either path.
//!

mod cpu;
pub mod error;
#[cfg(feature = "gpu")]
mod gpu;
mod select;
pub mod upload;

use std::fmt;

use albis_core::{ContrastWindow, Frame, Mask, Palette};
pub use image::RgbaImage;

pub use cpu::CpuRenderer;
pub use error::{RenderError, Result};
#[cfg(feature = "gpu")]
pub use gpu::GpuRenderer;
pub use select::{select_renderer, Backend, RendererSelection};

/// Which backend produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Gpu,
    Cpu,
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererKind::Gpu => write!(f, "gpu"),
            RendererKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// A frame with its optional mask, as handed to a renderer.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub frame: &'a Frame,
    /// Ignored unless its shape matches the frame.
    pub mask: Option<&'a Mask>,
}

impl<'a> FrameView<'a> {
    #[must_use]
    pub fn new(frame: &'a Frame) -> Self {
        Self { frame, mask: None }
    }

    #[must_use]
    pub fn with_mask(mut self, mask: Option<&'a Mask>) -> Self {
        self.mask = mask;
        self
    }

    /// The mask, if it matches the frame shape.
    #[must_use]
    pub fn aligned_mask(&self) -> Option<&'a Mask> {
        self.mask
            .filter(|m| m.matches(self.frame.width(), self.frame.height()))
    }
}

/// Contrast window plus the palette it indexes into.
#[derive(Debug, Clone, Copy)]
pub struct ContrastParams<'a> {
    pub window: ContrastWindow,
    pub palette: &'a Palette,
}

/// A rendering backend.
pub trait Renderer: Send {
    /// Backend kind.
    fn kind(&self) -> RendererKind;

    /// Render `view` with `params` into a top-down RGBA image.
    ///
    /// # Errors
    ///
    /// Returns an error when the palette is empty or the backend cannot
    /// process a frame of this size.
    fn render(&mut self, view: FrameView<'_>, params: ContrastParams<'_>) -> Result<RgbaImage>;
}

/// Convert frame dimensions to image dimensions.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn image_size(frame: &Frame) -> (u32, u32) {
    (frame.width() as u32, frame.height() as u32)
}
