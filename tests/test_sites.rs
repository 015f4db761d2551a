// tests/test_sites.rs — Seeding, site store and fixed-point accumulation.

use stippler::fixed::{self, FixedPoint};
use stippler::rng::{self, cyrb128};
use stippler::sites::SiteStore;
use stippler::{ConfigError, StippleConfig};

// ===== Seeding =====

#[test]
fn seeding_is_deterministic() {
    let a = rng::seed_positions("42", 2000, 640, 480);
    let b = rng::seed_positions("42", 2000, 640, 480);
    assert_eq!(a, b);
    assert_ne!(a, rng::seed_positions("43", 2000, 640, 480));
}

#[test]
fn seed_42_known_answer() {
    assert_eq!(cyrb128("42")[0], 2814168319);
    let p = rng::seed_positions("42", 3, 640, 480);
    assert_eq!(p, vec![[428.0, 320.0], [611.0, 460.0], [45.0, 398.0]]);
}

#[test]
fn seeded_positions_are_integer_and_in_frame() {
    for p in rng::seed_positions("stipple", 5000, 37, 11) {
        assert!(p[0] >= 0.0 && p[0] < 37.0 && p[0].fract() == 0.0, "{p:?}");
        assert!(p[1] >= 0.0 && p[1] < 11.0 && p[1].fract() == 0.0, "{p:?}");
    }
}

#[test]
fn site_store_follows_config_seed() {
    let cfg = StippleConfig {
        site_count: 16,
        initial_seed: "abc".into(),
        ..StippleConfig::for_frame(64, 48)
    };
    let store = SiteStore::seeded(&cfg);
    assert_eq!(store.len(), 16);
    assert_eq!(store.positions(), rng::seed_positions("abc", 16, 64, 48).as_slice());
    assert!(store.avg_weights().iter().all(|&w| w == 0.0));
    assert_eq!(store.global_max(), 0.0);
}

// ===== Fixed point =====

#[test]
fn fixed_point_round_trip_is_within_one_step() {
    for precision in [1u32, 10, 1000, 65_536] {
        let fp = FixedPoint::new(precision);
        let bound = 1.0 / precision as f64;
        let mut v = 0.0f32;
        while v < 640.0 {
            let err = (fp.decode(fp.encode(v)) - v as f64).abs();
            assert!(err < bound, "precision {precision}: {v} -> err {err}");
            v += 0.37;
        }
    }
}

#[test]
fn contribution_scales_coordinate_by_quantized_weight() {
    let fp = FixedPoint::new(1000);
    assert_eq!(fp.contribution(639, 255), 639_000);
    assert_eq!(fp.contribution(639, 0), 0);
    assert_eq!(fp.contribution(0, 255), 0);
    // 10 · (51/255) · 1000 = 2000
    assert_eq!(fp.contribution(10, 51), 2000);
}

#[test]
fn capacity_check_rejects_overflowing_precision() {
    assert!(fixed::check_capacity(640, 480, 1000).is_ok());
    let err = fixed::check_capacity(640, 480, 10_000_000).unwrap_err();
    assert!(matches!(err, ConfigError::AccumulatorOverflow { .. }), "{err}");
}
