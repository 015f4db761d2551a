// reduce.rs — Reduction stage: accumulators → centroids, average weights,
// global maximum.
//
// One task per site. The only shared write is GlobalMax, kept as the bit
// pattern of a non-negative f32 in an `AtomicU32`: for non-negative IEEE-754
// values, integer order on the bits equals float order, so `fetch_max`
// implements a float max without a lock.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::fixed::{decode_weight, FixedPoint};
use crate::sites::{AccumulatedSite, Centroids, SiteStore};

/// New position and average weight of one site.
///
/// `None` for an idle site (no weight accumulated); the caller keeps the
/// previous position and uses an average weight of 0.
#[inline]
pub fn centroid(s: AccumulatedSite, fixed: FixedPoint) -> Option<([f32; 2], f32)> {
    if s.weight == 0 {
        return None;
    }
    let wsum = decode_weight(s.weight);
    let cx = fixed.decode(s.x) as f32;
    let cy = fixed.decode(s.y) as f32;
    let avg = wsum / s.count.max(1) as f32;
    Some(([cx / wsum, cy / wsum], avg))
}

/// Run the reduction stage. Reads the accumulators of `store`; the result is
/// committed separately with [`SiteStore::apply_centroids`].
pub fn reduce(store: &SiteStore, fixed: FixedPoint) -> Centroids {
    let global_max = AtomicU32::new(0f32.to_bits());
    let acc = store.accumulators();

    let (positions, avg_weights): (Vec<[f32; 2]>, Vec<f32>) = store
        .positions()
        .par_iter()
        .enumerate()
        .map(|(i, &old)| match centroid(acc.load(i), fixed) {
            Some((pos, avg)) => {
                global_max.fetch_max(avg.to_bits(), Ordering::Relaxed);
                (pos, avg)
            }
            None => (old, 0.0),
        })
        .unzip();

    Centroids {
        positions,
        avg_weights,
        global_max: f32::from_bits(global_max.into_inner()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_site_keeps_position() {
        let store = SiteStore::from_positions(vec![[2.5, 3.5], [0.0, 0.0]]);
        store.reset_accumulators();
        store.accumulators().add(1, 1000, 2000, 255);
        let c = reduce(&store, FixedPoint::new(1000));
        assert_eq!(c.positions[0], [2.5, 3.5]);
        assert_eq!(c.avg_weights[0], 0.0);
        assert_eq!(c.positions[1], [1.0, 2.0]);
    }

    #[test]
    fn global_max_is_largest_average() {
        let store = SiteStore::from_positions(vec![[0.0, 0.0]; 3]);
        store.reset_accumulators();
        let acc = store.accumulators();
        // Site 0: two pixels at half weight. Site 1: one full pixel.
        acc.add(0, 0, 0, 128);
        acc.add(0, 0, 0, 127);
        acc.add(1, 0, 0, 255);
        let c = reduce(&store, FixedPoint::new(1000));
        assert!((c.avg_weights[0] - 0.5).abs() < 1e-6);
        assert!((c.avg_weights[1] - 1.0).abs() < 1e-6);
        assert_eq!(c.avg_weights[2], 0.0);
        assert!((c.global_max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn all_idle_frame_leaves_global_max_zero() {
        let store = SiteStore::from_positions(vec![[1.0, 1.0]; 4]);
        store.reset_accumulators();
        let c = reduce(&store, FixedPoint::new(1000));
        assert_eq!(c.global_max, 0.0);
        assert!(c.avg_weights.iter().all(|&a| a == 0.0));
    }

    #[test]
    fn float_bits_order_like_floats() {
        let vals = [0.0f32, 1e-6, 0.25, 0.5, 0.999, 1.0];
        for pair in vals.windows(2) {
            assert!(pair[0].to_bits() < pair[1].to_bits());
        }
    }
}
