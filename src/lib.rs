// stippler: weighted Voronoi stippling on the CPU and on wgpu compute.
//
// Each frame runs one weighted Lloyd step over a fixed set of sites and
// renders the result as soft discs:
//
//   clear → assign (pixel → nearest site, accumulate) → reduce (centroids)
//         → render (discs sized by mean weight)
//
// Sites persist across frames, so a static input converges toward a
// weighted centroidal Voronoi tessellation and a moving input is tracked.

pub mod image;
pub mod config;
pub mod error;
pub mod fixed;
pub mod rng;
pub mod frame;
pub mod sites;
pub mod assign;
pub mod reduce;
pub mod render;
pub mod backend;
pub mod cpu;
pub mod source;
pub mod surface;
pub mod pipeline;
pub mod reference;
pub mod gpu;

pub use backend::{create_backend, BackendKind, ReduceSummary, StageBackend};
pub use config::{Backpressure, IndexMapPolicy, RenderMode, StippleConfig, WeightMode};
pub use cpu::CpuBackend;
pub use error::{BackendError, ConfigError, FrameError, PresentError, StageError};
pub use frame::Frame;
pub use pipeline::{PipelineState, RunOutcome, StipplePipeline, TriggerHandle, TriggerKind, TriggerOutcome};
pub use source::{FrameSource, FnSource, ImageSequence, StaticFrame};
pub use surface::{LatestFrame, PngSequence, Surface};
