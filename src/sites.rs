// sites.rs — Site store: positions, per-frame accumulators, reduction output.
//
// OWNERSHIP
// ─────────
// Positions, average weights and the global maximum change exactly once per
// frame, in `apply_centroids(&mut self, ..)`. Assignment and render borrow
// the store immutably, so the borrow checker already guarantees they see a
// consistent snapshot and can never observe a half-applied reduction.
//
// The accumulators are the only state written concurrently. They are atomics
// touched exclusively through `fetch_add` (and `store(0)` in the clear
// stage), so contended writers need no lock and the final sums do not depend
// on task order.
//
//   accum_x, accum_y   AtomicU64   fixed-point Σ coord · w_q · PRECISION
//   accum_weight       AtomicU32   Σ weight code
//   accum_count        AtomicU32   pixels owned this frame

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use rayon::prelude::*;

use crate::config::StippleConfig;
use crate::rng;

/// Per-site atomic accumulators for one frame.
pub struct Accumulators {
    pub(crate) x: Vec<AtomicU64>,
    pub(crate) y: Vec<AtomicU64>,
    pub(crate) weight: Vec<AtomicU32>,
    pub(crate) count: Vec<AtomicU32>,
}

impl Accumulators {
    fn new(n: usize) -> Self {
        Accumulators {
            x: (0..n).map(|_| AtomicU64::new(0)).collect(),
            y: (0..n).map(|_| AtomicU64::new(0)).collect(),
            weight: (0..n).map(|_| AtomicU32::new(0)).collect(),
            count: (0..n).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.count.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count.is_empty()
    }

    /// Fold one pixel into site `i`.
    #[inline]
    pub(crate) fn add(&self, i: usize, cx: u32, cy: u32, code: u8) {
        self.x[i].fetch_add(cx as u64, Ordering::Relaxed);
        self.y[i].fetch_add(cy as u64, Ordering::Relaxed);
        self.weight[i].fetch_add(code as u32, Ordering::Relaxed);
        self.count[i].fetch_add(1, Ordering::Relaxed);
    }

    /// Current sums for site `i`.
    #[inline]
    pub fn load(&self, i: usize) -> AccumulatedSite {
        AccumulatedSite {
            x: self.x[i].load(Ordering::Relaxed),
            y: self.y[i].load(Ordering::Relaxed),
            weight: self.weight[i].load(Ordering::Relaxed),
            count: self.count[i].load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of one site's accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccumulatedSite {
    pub x: u64,
    pub y: u64,
    pub weight: u32,
    pub count: u32,
}

/// Output of the reduction stage, committed with [`SiteStore::apply_centroids`].
#[derive(Debug, Clone, PartialEq)]
pub struct Centroids {
    pub positions: Vec<[f32; 2]>,
    pub avg_weights: Vec<f32>,
    pub global_max: f32,
}

/// Copy of everything a test or a caller may want to inspect after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSnapshot {
    pub positions: Vec<[f32; 2]>,
    pub avg_weights: Vec<f32>,
    pub global_max: f32,
    pub accum_weights: Vec<u32>,
    pub accum_counts: Vec<u32>,
}

impl SiteSnapshot {
    pub fn site_count(&self) -> usize {
        self.positions.len()
    }

    /// Σ accum_count. Equals the pixel count after any assignment.
    pub fn total_count(&self) -> u64 {
        self.accum_counts.iter().map(|&c| c as u64).sum()
    }

    /// Sites that owned positive weight in the last frame.
    pub fn active_sites(&self) -> usize {
        self.accum_weights.iter().filter(|&&w| w > 0).count()
    }
}

/// The N sites of one pipeline.
pub struct SiteStore {
    positions: Vec<[f32; 2]>,
    avg_weights: Vec<f32>,
    global_max: f32,
    accum: Accumulators,
}

impl SiteStore {
    /// Seed `config.site_count` sites from `config.initial_seed`.
    pub fn seeded(config: &StippleConfig) -> Self {
        Self::from_positions(rng::seed_positions(
            &config.initial_seed,
            config.site_count as usize,
            config.width,
            config.height,
        ))
    }

    /// Start from an explicit layout.
    ///
    /// # Panics
    /// Panics if `positions` is empty.
    pub fn from_positions(positions: Vec<[f32; 2]>) -> Self {
        assert!(!positions.is_empty(), "a site store needs at least one site");
        let n = positions.len();
        SiteStore {
            positions,
            avg_weights: vec![0.0; n],
            global_max: 0.0,
            accum: Accumulators::new(n),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[[f32; 2]] {
        &self.positions
    }

    pub fn avg_weights(&self) -> &[f32] {
        &self.avg_weights
    }

    pub fn global_max(&self) -> f32 {
        self.global_max
    }

    pub fn accumulators(&self) -> &Accumulators {
        &self.accum
    }

    /// Zero every accumulator. Returns only after all stores finished.
    pub fn reset_accumulators(&self) {
        let a = &self.accum;
        (0..a.len()).into_par_iter().for_each(|i| {
            a.x[i].store(0, Ordering::Relaxed);
            a.y[i].store(0, Ordering::Relaxed);
            a.weight[i].store(0, Ordering::Relaxed);
            a.count[i].store(0, Ordering::Relaxed);
        });
    }

    /// Commit one reduction.
    ///
    /// # Panics
    /// Panics if the centroid arrays do not have one entry per site.
    pub fn apply_centroids(&mut self, centroids: Centroids) {
        assert_eq!(centroids.positions.len(), self.len(), "one position per site");
        assert_eq!(centroids.avg_weights.len(), self.len(), "one avg weight per site");
        self.positions = centroids.positions;
        self.avg_weights = centroids.avg_weights;
        self.global_max = centroids.global_max;
    }

    pub fn snapshot(&self) -> SiteSnapshot {
        let (accum_weights, accum_counts) = (0..self.len())
            .map(|i| {
                let s = self.accum.load(i);
                (s.weight, s.count)
            })
            .unzip();
        SiteSnapshot {
            positions: self.positions.clone(),
            avg_weights: self.avg_weights.clone(),
            global_max: self.global_max,
            accum_weights,
            accum_counts,
        }
    }
}
