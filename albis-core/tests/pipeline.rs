use albis_core::transfer::palette_index;
use albis_core::{
    compute_auto_levels, compute_global_stats, compute_stats, Colormap, ContrastWindow, Dtype,
    Endian, Frame, Mask, Palette,
};
use approx::assert_relative_eq;

fn u16_frame(width: usize, height: usize, values: &[u16]) -> Frame {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    Frame::from_bytes(&bytes, Dtype::U16, Endian::Little, &[height, width]).unwrap()
}

#[test]
fn test_stats_exclude_12bit_saturation() {
    let mut values: Vec<u16> = (0..64).map(|i| i * 3).collect();
    values[10] = 4095;
    values[20] = 4095;
    let frame = u16_frame(8, 8, &values);
    let stats = compute_stats(&frame, false);

    assert_eq!(stats.sat_max, Some(4095.0));
    assert_relative_eq!(stats.max, 189.0);
    assert_relative_eq!(stats.min, 0.0);
    assert_eq!(stats.hist.iter().sum::<u32>(), 62);
}

#[test]
fn test_auto_levels_within_data_range() {
    let patterns: [Vec<u16>; 3] = [
        (0..400).map(|i| (i * 7 % 1000) as u16).collect(),
        (0..400).map(|i| if i % 50 == 0 { 30_000 } else { 5 + (i % 9) as u16 }).collect(),
        (0..400).map(|i| (i / 20) as u16 + 1).collect(),
    ];
    for values in &patterns {
        let frame = u16_frame(20, 20, values);
        let stats = compute_stats(&frame, false);
        let levels = compute_auto_levels(&frame, None, Some(&stats));
        let lo = f64::from(*values.iter().min().unwrap());
        let hi = f64::from(*values.iter().max().unwrap());
        assert!(levels.min <= levels.max);
        assert!(levels.min >= lo - 1e-9, "{} < {lo}", levels.min);
        assert!(levels.max <= hi + 1e-9, "{} > {hi}", levels.max);
    }
}

#[test]
fn test_mask_exclusion_semantics() {
    let frame = Frame::new(2, 2, vec![1u32, 2, 3, 4]).unwrap();
    let mask = Mask::new(2, 2, vec![0, 1, 0, 0x1e]).unwrap();
    let stats = compute_global_stats(&frame, Some(&mask));

    assert_eq!(stats.count, 3);
    assert_relative_eq!(stats.sum, 4.0);
    assert_relative_eq!(stats.max, 3.0);
    assert_relative_eq!(stats.min, 0.0);
}

#[test]
fn test_gray_palette_round_trip() {
    let palette = Palette::build(Colormap::Gray);
    let window = ContrastWindow::new(12.0, 480.0);

    assert_relative_eq!(window.normalize(12.0), 0.0);
    assert_relative_eq!(window.normalize(480.0), 1.0);
    assert_eq!(palette.color(window.palette_index(12.0, palette.len())), [0, 0, 0, 255]);
    assert_eq!(
        palette.color(window.palette_index(480.0, palette.len())),
        [255, 255, 255, 255]
    );
}

#[test]
fn test_end_to_end_gray_4x4() {
    let values: Vec<u16> = (1..=16).collect();
    let frame = u16_frame(4, 4, &values);
    let stats = compute_stats(&frame, false);
    assert_relative_eq!(stats.min, 1.0);
    assert_relative_eq!(stats.max, 16.0);

    let levels = compute_auto_levels(&frame, None, Some(&stats));
    assert_relative_eq!(levels.min, 1.0, max_relative = 1e-9);
    assert_relative_eq!(levels.max, 16.0, max_relative = 1e-9);

    let window = ContrastWindow::new(stats.min, stats.max).with_colormap(Colormap::Gray);
    let palette = Palette::build(window.colormap);

    let white = palette.color(window.palette_index(16.0, palette.len()));
    assert_eq!(white, [255, 255, 255, 255]);

    // The window starts at the smallest value, so 1 sits on the black slot
    // and the next value up is the first visible shade.
    assert_eq!(window.palette_index(1.0, palette.len()), 0);
    let dark = palette.color(window.palette_index(2.0, palette.len()));
    assert!(dark[0] > 0 && dark[0] < 64, "{dark:?}");
}

#[test]
fn test_palette_index_matches_hdr_slots() {
    let window = ContrastWindow::new(0.0, 100.0).with_colormap(Colormap::AlbulaHdr);
    let palette = Palette::build(window.colormap);
    assert_eq!(window.palette_index(50.0, palette.len()), 128);
    assert_eq!(palette_index(1.0, palette.len()), 1023);
}
