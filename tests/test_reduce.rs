// tests/test_reduce.rs — Reduction stage through the CPU backend.

use stippler::{CpuBackend, Frame, StageBackend, StippleConfig};

fn config(w: u32, h: u32) -> StippleConfig {
    StippleConfig {
        threads: Some(2),
        ..StippleConfig::for_frame(w, h)
    }
}

#[test]
fn site_outside_the_frame_keeps_its_position() {
    // No pixel is nearer to (100, 100) than to (1, 1) in a 4×4 frame.
    let mut b = CpuBackend::with_positions(&config(4, 4), vec![[1.0, 1.0], [100.0, 100.0]]).unwrap();
    let frame = Frame::uniform(4, 4, [0.0; 3]);
    b.clear_accumulators().unwrap();
    b.assign(&frame).unwrap();
    let summary = b.reduce().unwrap();

    let snap = b.snapshot().unwrap();
    assert_eq!(snap.accum_counts[1], 0);
    assert_eq!(snap.positions[1], [100.0, 100.0]);
    assert_eq!(snap.avg_weights[1], 0.0);
    assert_eq!(summary.active_sites, 1);
}

#[test]
fn weightless_region_keeps_its_site() {
    // Left half black (weight 1), right half white (weight 0).
    let frame = Frame::from_fn(8, 2, |x, _| if x < 4 { [0.0; 3] } else { [1.0; 3] });
    let mut b = CpuBackend::with_positions(&config(8, 2), vec![[1.0, 0.0], [6.0, 1.0]]).unwrap();
    b.clear_accumulators().unwrap();
    b.assign(&frame).unwrap();
    b.reduce().unwrap();

    let snap = b.snapshot().unwrap();
    assert!(snap.accum_counts[1] > 0, "site owns pixels");
    assert_eq!(snap.accum_weights[1], 0);
    assert_eq!(snap.positions[1], [6.0, 1.0]);
    assert_eq!(snap.avg_weights[1], 0.0);
    // The weighted site moves to the centre of the black half.
    assert!((snap.positions[0][0] - 1.5).abs() < 1e-3);
    assert!((snap.positions[0][1] - 0.5).abs() < 1e-3);
    assert!((snap.avg_weights[0] - 1.0).abs() < 1e-6);
    assert!((snap.global_max - 1.0).abs() < 1e-6);
}

#[test]
fn all_white_frame_leaves_every_site_idle() {
    let cfg = StippleConfig { site_count: 12, ..config(16, 16) };
    let mut b = CpuBackend::new(&cfg).unwrap();
    let before = b.snapshot().unwrap().positions;
    b.clear_accumulators().unwrap();
    b.assign(&Frame::uniform(16, 16, [1.0; 3])).unwrap();
    let summary = b.reduce().unwrap();

    assert_eq!(summary.active_sites, 0);
    assert_eq!(summary.global_max, 0.0);
    assert_eq!(b.snapshot().unwrap().positions, before);
}

#[test]
fn global_max_is_the_heaviest_average() {
    // Two columns: black on the left, mid gray on the right.
    let frame = Frame::from_fn(2, 4, |x, _| if x == 0 { [0.0; 3] } else { [0.6; 3] });
    let mut b = CpuBackend::with_positions(&config(2, 4), vec![[0.0, 1.0], [1.0, 1.0]]).unwrap();
    b.clear_accumulators().unwrap();
    b.assign(&frame).unwrap();
    let summary = b.reduce().unwrap();

    let snap = b.snapshot().unwrap();
    let max = snap.avg_weights.iter().cloned().fold(0.0f32, f32::max);
    assert_eq!(summary.global_max, max);
    assert_eq!(snap.global_max, max);
    assert!((max - 1.0).abs() < 1e-6);
    assert!((snap.avg_weights[1] - 102.0 / 255.0).abs() < 1e-6);
}
