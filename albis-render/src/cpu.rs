//! CPU rendering backend.

use albis_core::transfer::mask_color;
use albis_core::MaskClass;
use rayon::prelude::*;

use crate::error::{RenderError, Result};
use crate::{image_size, ContrastParams, FrameView, Renderer, RendererKind, RgbaImage};

/// Renders rows in parallel on the rayon thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuRenderer;

impl CpuRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for CpuRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Cpu
    }

    fn render(&mut self, view: FrameView<'_>, params: ContrastParams<'_>) -> Result<RgbaImage> {
        let palette = params.palette;
        if palette.is_empty() {
            return Err(RenderError::EmptyPalette);
        }
        let frame = view.frame;
        let mask = view.aligned_mask();
        let window = params.window;
        let width = frame.width();
        let (img_w, img_h) = image_size(frame);
        let mut pixels = vec![0u8; frame.len() * 4];
        if width == 0 {
            return RgbaImage::from_raw(img_w, img_h, pixels)
                .ok_or(RenderError::Readback("image buffer size mismatch".into()));
        }

        pixels
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let idx = y * width + x;
                    let class = mask.map_or(MaskClass::Good, |m| m.class(idx));
                    let rgba = mask_color(class).unwrap_or_else(|| {
                        let value = frame.data().get(idx).unwrap_or(f64::NAN);
                        palette.color(window.palette_index(value, palette.len()))
                    });
                    px.copy_from_slice(&rgba);
                }
            });

        RgbaImage::from_raw(img_w, img_h, pixels)
            .ok_or(RenderError::Readback("image buffer size mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use albis_core::{Colormap, ContrastWindow, Frame, Mask, Palette};

    #[test]
    fn test_gray_ramp() {
        let frame = Frame::new(2, 1, vec![0u8, 255]).unwrap();
        let palette = Palette::build(Colormap::Gray);
        let params = ContrastParams {
            window: ContrastWindow::new(0.0, 255.0),
            palette: &palette,
        };
        let img = CpuRenderer::new()
            .render(FrameView::new(&frame), params)
            .unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_mask_colors_override_palette() {
        let frame = Frame::new(3, 1, vec![10u16, 10, 10]).unwrap();
        let mask = Mask::new(3, 1, vec![0, 1, 4]).unwrap();
        let palette = Palette::build(Colormap::Gray);
        let params = ContrastParams {
            window: ContrastWindow::new(0.0, 10.0),
            palette: &palette,
        };
        let view = FrameView::new(&frame).with_mask(Some(&mask));
        let img = CpuRenderer::new().render(view, params).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(2, 0).0, [25, 50, 120, 255]);
    }

    #[test]
    fn test_mismatched_mask_ignored() {
        let frame = Frame::new(2, 2, vec![1.0f32; 4]).unwrap();
        let mask = Mask::new(4, 1, vec![1; 4]).unwrap();
        let palette = Palette::build(Colormap::Gray);
        let params = ContrastParams {
            window: ContrastWindow::new(0.0, 1.0),
            palette: &palette,
        };
        let view = FrameView::new(&frame).with_mask(Some(&mask));
        let img = CpuRenderer::new().render(view, params).unwrap();
        assert!(img.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }
}
