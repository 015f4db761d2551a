// tests/test_render.rs — Render stage: falloff shape, first-frame safety.

use stippler::render::{self, brightness, threshold, RenderInputs};
use stippler::image::Image;
use stippler::{CpuBackend, Frame, RenderMode, StageBackend, StippleConfig};

#[test]
fn falloff_boundary() {
    let t = threshold(3.125, 0.5, 1.0);
    assert!((t - 1.5625).abs() < 1e-6);
    assert_eq!(brightness(0.0, t), 1.0);
    assert_eq!(brightness(t, t), 0.0);
    assert_eq!(brightness(t * 2.0, t), 0.0);
    let mid = brightness(t * 0.5, t);
    assert!((mid - 0.875).abs() < 1e-6);
}

#[test]
fn heaviest_site_gets_full_radius() {
    assert_eq!(threshold(3.125, 0.8, 0.8), 3.125);
    assert_eq!(threshold(3.125, 0.0, 0.8), 0.0);
}

#[test]
fn zero_global_max_renders_dark_without_nan() {
    let t = threshold(3.125, 0.0, 0.0);
    assert!(t.is_finite());
    assert_eq!(brightness(0.0, t), 0.0);
    assert_eq!(brightness(5.0, t), 0.0);
}

#[test]
fn first_frame_before_any_reduction_is_dark() {
    let cfg = StippleConfig { site_count: 8, ..StippleConfig::for_frame(16, 12) };
    let mut b = CpuBackend::new(&cfg).unwrap();
    let frame = Frame::uniform(16, 12, [0.2; 3]);
    let img = b.render(&frame).unwrap();
    assert_eq!(img.dimensions(), (16, 12));
    assert!(img.pixels().all(|p| p.0 == [0, 0, 0, 255]));
}

#[test]
fn all_white_first_frame_is_dark() {
    let cfg = StippleConfig { site_count: 8, ..StippleConfig::for_frame(16, 12) };
    let mut b = CpuBackend::new(&cfg).unwrap();
    let frame = Frame::uniform(16, 12, [1.0; 3]);
    b.clear_accumulators().unwrap();
    b.assign(&frame).unwrap();
    b.reduce().unwrap();
    let img = b.render(&frame).unwrap();
    assert!(img.pixels().all(|p| p.0 == [0, 0, 0, 255]));
}

#[test]
fn disc_is_bright_at_site_and_fades_out() {
    let frame = Frame::uniform(9, 1, [0.5; 3]);
    let positions = [[4.0, 0.0]];
    let index_map = Image::<u32>::new(9, 1);
    let img = render::render(&RenderInputs {
        frame: &frame,
        positions: &positions,
        avg_weights: &[1.0],
        global_max: 1.0,
        index_map: &index_map,
        falloff: 3.0,
        mode: RenderMode::Grayscale,
    });
    let row: Vec<u8> = (0..9).map(|x| img.get_pixel(x, 0).0[0]).collect();
    assert_eq!(row[4], 255);
    assert!(row[3] > row[2] && row[2] > row[1]);
    assert_eq!(row[3], row[5]);
    // dist 3 == threshold → 0
    assert_eq!(row[1], 0);
    assert_eq!(row[0], 0);
}
