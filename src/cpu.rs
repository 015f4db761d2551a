// cpu.rs — CPU stipple backend: rayon stages over std atomics.
//
// This is the reference implementation. Every stage is a `par_iter` run
// inside `ThreadPool::install`, which returns only after every task has
// finished, so each method call is a full barrier.

use image::RgbaImage;
use tracing::{debug, info};

use crate::assign;
use crate::backend::{check_frame_size, ReduceSummary, StageBackend};
use crate::config::StippleConfig;
use crate::error::{ConfigError, StageError};
use crate::fixed::FixedPoint;
use crate::frame::Frame;
use crate::image::Image;
use crate::reduce;
use crate::render::{self, RenderInputs};
use crate::sites::{SiteSnapshot, SiteStore};

/// CPU implementation of [`StageBackend`].
pub struct CpuBackend {
    config: StippleConfig,
    fixed: FixedPoint,
    pool: rayon::ThreadPool,
    store: SiteStore,
    weights: Image<u8>,
    index_map: Image<u32>,
}

impl CpuBackend {
    /// Validate `config`, seed the sites and build the worker pool.
    pub fn new(config: &StippleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::build(config.clone(), SiteStore::seeded(config))
    }

    /// Start from explicit site positions instead of the seeded layout.
    /// `config.site_count` is replaced by `positions.len()`.
    pub fn with_positions(config: &StippleConfig, positions: Vec<[f32; 2]>) -> Result<Self, ConfigError> {
        let config = config.with_site_count(positions.len())?;
        Self::build(config, SiteStore::from_positions(positions))
    }

    fn build(config: StippleConfig, store: SiteStore) -> Result<Self, ConfigError> {
        let pool = build_thread_pool(config.threads)?;
        info!(
            sites = config.site_count,
            width = config.width,
            height = config.height,
            threads = pool.current_num_threads(),
            "cpu backend ready"
        );
        let (w, h) = (config.width as usize, config.height as usize);
        Ok(CpuBackend {
            fixed: FixedPoint::new(config.fixed_point_precision),
            pool,
            store,
            weights: Image::new(w, h),
            index_map: Image::new(w, h),
            config,
        })
    }

    /// Borrow the site store directly.
    pub fn store(&self) -> &SiteStore {
        &self.store
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl StageBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn config(&self) -> &StippleConfig {
        &self.config
    }

    fn clear_accumulators(&mut self) -> Result<(), StageError> {
        let store = &self.store;
        self.pool.install(|| store.reset_accumulators());
        Ok(())
    }

    fn assign(&mut self, frame: &Frame) -> Result<(), StageError> {
        check_frame_size(&self.config, frame)?;
        let Self {
            config,
            fixed,
            pool,
            store,
            weights,
            index_map,
        } = self;
        pool.install(|| {
            *weights = frame.weight_map(config.weight_mode);
            assign::assign(weights, store.positions(), store.accumulators(), index_map, *fixed);
        });
        Ok(())
    }

    fn reduce(&mut self) -> Result<ReduceSummary, StageError> {
        let store = &self.store;
        let fixed = self.fixed;
        let centroids = self.pool.install(|| reduce::reduce(store, fixed));
        let summary = ReduceSummary {
            active_sites: centroids.avg_weights.iter().filter(|&&a| a > 0.0).count(),
            global_max: centroids.global_max,
        };
        self.store.apply_centroids(centroids);
        debug!(active = summary.active_sites, global_max = summary.global_max, "cpu reduce");
        Ok(summary)
    }

    fn refresh_index_map(&mut self) -> Result<(), StageError> {
        let Self {
            pool,
            store,
            index_map,
            ..
        } = self;
        pool.install(|| assign::refresh_index_map(store.positions(), index_map));
        Ok(())
    }

    fn render(&mut self, frame: &Frame) -> Result<RgbaImage, StageError> {
        check_frame_size(&self.config, frame)?;
        let inputs = RenderInputs {
            frame,
            positions: self.store.positions(),
            avg_weights: self.store.avg_weights(),
            global_max: self.store.global_max(),
            index_map: &self.index_map,
            falloff: self.config.falloff,
            mode: self.config.render_mode,
        };
        Ok(self.pool.install(|| render::render(&inputs)))
    }

    fn snapshot(&self) -> Result<SiteSnapshot, StageError> {
        Ok(self.store.snapshot())
    }

    fn index_map(&self) -> Result<Image<u32>, StageError> {
        Ok(self.index_map.clone())
    }
}

fn build_thread_pool(threads: Option<usize>) -> Result<rayon::ThreadPool, ConfigError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ConfigError::ThreadPool(format!("failed to build rayon thread pool: {e}")))
}
