use albis_core::{Colormap, ContrastWindow, Frame, Mask, Palette};
use albis_render::{ContrastParams, CpuRenderer, FrameView, Renderer};

#[test]
fn test_end_to_end_gray_4x4() {
    let frame = Frame::new(4, 4, (1u16..=16).collect::<Vec<_>>()).unwrap();
    let palette = Palette::build(Colormap::Gray);
    let params = ContrastParams {
        window: ContrastWindow::new(1.0, 16.0),
        palette: &palette,
    };
    let img = CpuRenderer::new()
        .render(FrameView::new(&frame), params)
        .unwrap();

    assert_eq!(img.dimensions(), (4, 4));
    assert_eq!(img.get_pixel(3, 3).0, [255, 255, 255, 255]);
    assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
    let second = img.get_pixel(1, 0).0;
    assert!(second[0] > 0 && second[0] < 32);
}

#[test]
fn test_inverted_hdr_render() {
    let frame = Frame::new(3, 1, vec![0.0f32, 50.0, 1e9]).unwrap();
    let palette = Palette::build(Colormap::AlbulaHdr);
    let params = ContrastParams {
        window: ContrastWindow::new(0.0, 100.0)
            .with_colormap(Colormap::AlbulaHdr)
            .with_invert(true),
        palette: &palette,
    };
    let img = CpuRenderer::new()
        .render(FrameView::new(&frame), params)
        .unwrap();
    // Slot 0 (white) inverts to slot 1023 (white), slot 1023 to slot 0.
    assert_eq!(img.get_pixel(0, 0).0, palette.color(1023));
    assert_eq!(img.get_pixel(1, 0).0, palette.color(1023 - 128));
    assert_eq!(img.get_pixel(2, 0).0, palette.color(0));
}

#[test]
fn test_masked_render_is_row_aligned() {
    let frame = Frame::new(2, 2, vec![1u8, 2, 3, 4]).unwrap();
    let mask = Mask::new(2, 2, vec![0, 0, 1, 0]).unwrap();
    let palette = Palette::build(Colormap::Viridis);
    let params = ContrastParams {
        window: ContrastWindow::new(0.0, 4.0).with_colormap(Colormap::Viridis),
        palette: &palette,
    };
    let img = CpuRenderer::new()
        .render(FrameView::new(&frame).with_mask(Some(&mask)), params)
        .unwrap();
    assert_eq!(img.get_pixel(0, 1).0, [0, 0, 0, 255]);
    assert_ne!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
}
