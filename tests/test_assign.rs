// tests/test_assign.rs — Assignment stage: partition, tie-break, accumulation.

use stippler::assign::{self, nearest_site};
use stippler::fixed::FixedPoint;
use stippler::image::Image;
use stippler::rng;
use stippler::sites::SiteStore;

fn gradient_weights(w: usize, h: usize) -> Image<u8> {
    let data = (0..w * h).map(|i| ((i * 7) % 256) as u8).collect();
    Image::from_vec(w, h, data)
}

#[test]
fn partition_is_total() {
    let (w, h) = (64, 48);
    let weights = gradient_weights(w, h);
    let store = SiteStore::from_positions(rng::seed_positions("42", 50, w as u32, h as u32));
    let mut index_map = Image::<u32>::new(w, h);

    assign::assign(&weights, store.positions(), store.accumulators(), &mut index_map, FixedPoint::new(1000));

    assert!(index_map.as_slice().iter().all(|&i| (i as usize) < store.len()));
    let snap = store.snapshot();
    assert_eq!(snap.total_count(), (w * h) as u64);
    let code_sum: u64 = weights.as_slice().iter().map(|&c| c as u64).sum();
    let acc_sum: u64 = snap.accum_weights.iter().map(|&c| c as u64).sum();
    assert_eq!(acc_sum, code_sum);

    // Every pixel is counted by the site the index map names.
    let mut counts = vec![0u32; store.len()];
    for &i in index_map.as_slice() {
        counts[i as usize] += 1;
    }
    assert_eq!(counts, snap.accum_counts);
}

#[test]
fn equidistant_pixels_go_to_lowest_index() {
    // Pixel (1, 0) is exactly between the two sites.
    let sites = [[2.0, 0.0], [0.0, 0.0]];
    assert_eq!(nearest_site(&sites, 1.0, 0.0), 0);
    let sites = [[0.0, 0.0], [2.0, 0.0]];
    assert_eq!(nearest_site(&sites, 1.0, 0.0), 0);
}

#[test]
fn tie_break_is_stable_across_runs() {
    // Coincident sites: only the first can ever own pixels.
    let positions = vec![[3.0, 3.0], [3.0, 3.0], [3.0, 3.0]];
    let weights = Image::from_vec(8, 8, vec![200u8; 64]);
    let mut first = None;
    for _ in 0..5 {
        let store = SiteStore::from_positions(positions.clone());
        let mut index_map = Image::<u32>::new(8, 8);
        assign::assign(&weights, store.positions(), store.accumulators(), &mut index_map, FixedPoint::new(1000));
        assert!(index_map.as_slice().iter().all(|&i| i == 0));
        let snap = store.snapshot();
        assert_eq!(snap.accum_counts, vec![64, 0, 0]);
        match &first {
            None => first = Some(snap),
            Some(f) => assert_eq!(f, &snap),
        }
    }
}

#[test]
fn refresh_does_not_accumulate() {
    let store = SiteStore::from_positions(vec![[0.0, 0.0], [5.0, 5.0]]);
    let mut index_map = Image::<u32>::new(6, 6);
    assign::refresh_index_map(store.positions(), &mut index_map);
    assert_eq!(index_map.get(0, 0), 0);
    assert_eq!(index_map.get(5, 5), 1);
    assert_eq!(store.snapshot().total_count(), 0);
}
