// backend.rs — The stage interface shared by the CPU and GPU pipelines.
//
// A backend owns everything that lives across frames: the site store, the
// last weight map and the index map. The controller drives it one stage at a
// time and each call returns only once the stage has fully completed, so
// consecutive calls are separated by a full barrier:
//
//   clear_accumulators → assign(frame) → reduce → [refresh_index_map] → render(frame)
//
// Every stage method is fallible with `StageError`. The CPU backend never
// fails a stage after construction; the GPU backend fails when a readback
// is lost.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::config::StippleConfig;
use crate::cpu::CpuBackend;
use crate::error::{BackendError, StageError};
use crate::frame::Frame;
use crate::gpu::device::GpuDevice;
use crate::gpu::stipple::GpuStippleBackend;
use crate::image::Image;
use crate::sites::SiteSnapshot;

/// What the reduction stage reports back to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReduceSummary {
    /// Sites that accumulated positive weight this frame.
    pub active_sites: usize,
    pub global_max: f32,
}

/// One stipple pipeline implementation.
pub trait StageBackend {
    /// Short name for logs ("cpu", "gpu").
    fn name(&self) -> &'static str;

    fn config(&self) -> &StippleConfig;

    /// Zero all per-site accumulators.
    fn clear_accumulators(&mut self) -> Result<(), StageError>;

    /// Nearest-site assignment and weighted accumulation over `frame`.
    fn assign(&mut self, frame: &Frame) -> Result<(), StageError>;

    /// Recompute centroids, average weights and the global maximum, and
    /// commit them as the new site state.
    fn reduce(&mut self) -> Result<ReduceSummary, StageError>;

    /// Rebuild the index map from the current positions (no accumulation).
    fn refresh_index_map(&mut self) -> Result<(), StageError>;

    /// Draw the stipple image for `frame` from the committed site state.
    fn render(&mut self, frame: &Frame) -> Result<RgbaImage, StageError>;

    /// Copy of the site state and the last frame's accumulators.
    fn snapshot(&self) -> Result<SiteSnapshot, StageError>;

    /// Copy of the current index map.
    fn index_map(&self) -> Result<Image<u32>, StageError>;
}

impl<B: StageBackend + ?Sized> StageBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn config(&self) -> &StippleConfig {
        (**self).config()
    }
    fn clear_accumulators(&mut self) -> Result<(), StageError> {
        (**self).clear_accumulators()
    }
    fn assign(&mut self, frame: &Frame) -> Result<(), StageError> {
        (**self).assign(frame)
    }
    fn reduce(&mut self) -> Result<ReduceSummary, StageError> {
        (**self).reduce()
    }
    fn refresh_index_map(&mut self) -> Result<(), StageError> {
        (**self).refresh_index_map()
    }
    fn render(&mut self, frame: &Frame) -> Result<RgbaImage, StageError> {
        (**self).render(frame)
    }
    fn snapshot(&self) -> Result<SiteSnapshot, StageError> {
        (**self).snapshot()
    }
    fn index_map(&self) -> Result<Image<u32>, StageError> {
        (**self).index_map()
    }
}

/// Available backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// rayon over std atomics. Always available.
    #[default]
    Cpu,
    /// wgpu compute kernels.
    Gpu,
}

/// Create a backend for `config`.
pub fn create_backend(
    kind: BackendKind,
    config: &StippleConfig,
) -> Result<Box<dyn StageBackend>, BackendError> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(CpuBackend::new(config)?)),
        BackendKind::Gpu => {
            let gpu = GpuDevice::new()?;
            Ok(Box::new(GpuStippleBackend::new(gpu, config)?))
        }
    }
}

/// Fail unless `frame` has the dimensions the backend was built for.
pub(crate) fn check_frame_size(config: &StippleConfig, frame: &Frame) -> Result<(), StageError> {
    if frame.width() == config.width && frame.height() == config.height {
        Ok(())
    } else {
        Err(StageError::FrameSize {
            expected_w: config.width,
            expected_h: config.height,
            actual_w: frame.width(),
            actual_h: frame.height(),
        })
    }
}
