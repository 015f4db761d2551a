// assign.rs — Assignment stage: nearest site per pixel + weighted accumulation.
//
// One logical task per pixel. Each task scans every site in increasing index
// order and keeps the first one at minimal squared distance (strict `<`), so
// ties always resolve to the lowest index regardless of scheduling. It then
// writes its own index-map slot and folds itself into the winner's
// accumulators with commutative atomic adds.
//
// Rows are the unit of rayon work: each worker owns a disjoint `&mut` row of
// the index map, and shares the accumulators through `&Accumulators`.
//
// Cost is O(W·H·N). The accumulators must have been cleared (and the clear
// must have completed) before this stage starts.

use rayon::prelude::*;

use crate::fixed::FixedPoint;
use crate::image::Image;
use crate::sites::Accumulators;

/// Index of the site nearest to `(x, y)`.
///
/// Squared Euclidean distance, lowest index wins ties.
///
/// # Panics
/// Panics if `positions` is empty.
#[inline]
pub fn nearest_site(positions: &[[f32; 2]], x: f32, y: f32) -> u32 {
    assert!(!positions.is_empty(), "nearest_site needs at least one site");
    let mut best = 0u32;
    let mut best_d2 = f32::MAX;
    for (i, p) in positions.iter().enumerate() {
        let dx = p[0] - x;
        let dy = p[1] - y;
        let d2 = dx * dx + dy * dy;
        if d2 < best_d2 {
            best_d2 = d2;
            best = i as u32;
        }
    }
    best
}

/// Run the assignment stage over a whole frame.
///
/// # Arguments
/// * `weights`   — quantized weight codes, one per pixel.
/// * `positions` — read-only site positions for this frame.
/// * `acc`       — cleared accumulators, one slot per site.
/// * `index_map` — output, same dimensions as `weights`.
/// * `fixed`     — fixed-point scale for coordinate sums.
///
/// # Panics
/// Panics if the index map and weight map differ in size or if the
/// accumulator count differs from the site count.
pub fn assign(
    weights: &Image<u8>,
    positions: &[[f32; 2]],
    acc: &Accumulators,
    index_map: &mut Image<u32>,
    fixed: FixedPoint,
) {
    check_shapes(weights, index_map);
    assert_eq!(acc.len(), positions.len(), "one accumulator per site");

    let w = index_map.width();
    let stride = index_map.stride();
    index_map
        .as_mut_slice()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let codes = weights.row(y);
            for (x, slot) in row[..w].iter_mut().enumerate() {
                let i = nearest_site(positions, x as f32, y as f32);
                *slot = i;
                let code = codes[x];
                acc.add(
                    i as usize,
                    fixed.contribution(x as u32, code),
                    fixed.contribution(y as u32, code),
                    code,
                );
            }
        });
}

/// Recompute the index map from `positions` without touching any
/// accumulator.
pub fn refresh_index_map(positions: &[[f32; 2]], index_map: &mut Image<u32>) {
    let w = index_map.width();
    let stride = index_map.stride();
    index_map
        .as_mut_slice()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, slot) in row[..w].iter_mut().enumerate() {
                *slot = nearest_site(positions, x as f32, y as f32);
            }
        });
}

fn check_shapes(weights: &Image<u8>, index_map: &Image<u32>) {
    assert!(
        weights.width() == index_map.width() && weights.height() == index_map.height(),
        "index map {}×{} does not match weight map {}×{}",
        index_map.width(),
        index_map.height(),
        weights.width(),
        weights.height(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::SiteStore;

    #[test]
    fn nearest_prefers_lowest_index_on_tie() {
        // (1,0) is exactly 1 away from both sites.
        let sites = [[0.0, 0.0], [2.0, 0.0]];
        assert_eq!(nearest_site(&sites, 1.0, 0.0), 0);
        let swapped = [[2.0, 0.0], [0.0, 0.0]];
        assert_eq!(nearest_site(&swapped, 1.0, 0.0), 0);
        assert_eq!(nearest_site(&sites, 1.5, 0.0), 1);
    }

    #[test]
    fn duplicate_sites_resolve_to_first() {
        let sites = [[3.0, 3.0], [3.0, 3.0], [3.0, 3.0]];
        assert_eq!(nearest_site(&sites, 0.0, 0.0), 0);
    }

    #[test]
    fn assign_counts_every_pixel_once() {
        let store = SiteStore::from_positions(vec![[0.0, 0.0], [7.0, 0.0], [0.0, 5.0]]);
        let weights = Image::<u8>::from_vec(8, 6, vec![255; 48]);
        let mut map = Image::<u32>::new(8, 6);
        store.reset_accumulators();
        assign(&weights, store.positions(), store.accumulators(), &mut map, FixedPoint::new(1000));

        let snap = store.snapshot();
        assert_eq!(snap.total_count(), 48);
        assert_eq!(snap.accum_weights.iter().map(|&w| w as u64).sum::<u64>(), 48 * 255);
        for (x, y, i) in map.pixels() {
            assert_eq!(i, nearest_site(store.positions(), x as f32, y as f32));
        }
    }

    #[test]
    fn accumulated_coordinates_are_fixed_point_sums() {
        // Single site owns a 3×1 strip with full weight: Σx = 0+1+2.
        let store = SiteStore::from_positions(vec![[1.0, 0.0]]);
        let weights = Image::<u8>::from_vec(3, 1, vec![255; 3]);
        let mut map = Image::<u32>::new(3, 1);
        store.reset_accumulators();
        assign(&weights, store.positions(), store.accumulators(), &mut map, FixedPoint::new(1000));
        let s = store.accumulators().load(0);
        assert_eq!(s.x, 3000);
        assert_eq!(s.y, 0);
        assert_eq!(s.count, 3);
    }

    #[test]
    fn refresh_matches_assign_partition() {
        let positions = vec![[1.0, 1.0], [4.0, 2.0]];
        let store = SiteStore::from_positions(positions.clone());
        let weights = Image::<u8>::from_vec(6, 4, vec![10; 24]);
        let mut a = Image::<u32>::new(6, 4);
        let mut b = Image::<u32>::new(6, 4);
        store.reset_accumulators();
        assign(&weights, &positions, store.accumulators(), &mut a, FixedPoint::new(1000));
        refresh_index_map(&positions, &mut b);
        assert_eq!(a.as_slice(), b.as_slice());
    }
}
