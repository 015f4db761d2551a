// error.rs — Error taxonomy for the stipple pipeline.
//
//   ConfigError   fatal, raised before any frame runs
//   StageError    fatal, a stage could not complete (GPU readback lost)
//   FrameError    transient, the frame is skipped and the controller stays Idle
//   PresentError  transient, the rendered image is lost but the run completes
//
//   BackendError  fatal, backend construction (config or device)
//
// Device initialization errors live in `gpu::device::GpuError`.

use crate::gpu::device::GpuError;

/// Invalid or unrepresentable configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("site_count must be at least 1")]
    NoSites,

    #[error("frame dimensions must be non-zero (got {width}×{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("fixed_point_precision must be at least 1")]
    ZeroPrecision,

    #[error("falloff must be finite and positive (got {0})")]
    InvalidFalloff(f32),

    #[error("queue_depth must be at least 1")]
    ZeroQueueDepth,

    #[error("threads must be at least 1 when set")]
    ZeroThreads,

    #[error("accumulator overflow: {what} needs {required}, limit is {limit}")]
    AccumulatorOverflow {
        what: &'static str,
        required: u128,
        limit: u128,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("failed to read config {path}: {message}")]
    Io { path: String, message: String },
}

/// The frame source could not supply a frame for this trigger.
#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("frame source not ready")]
    NotReady,

    #[error("frame is {actual_w}×{actual_h}, pipeline expects {expected_w}×{expected_h}")]
    DimensionMismatch {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },

    #[error("frame source exhausted")]
    Exhausted,

    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
}

/// The surface rejected a rendered image.
#[derive(thiserror::Error, Debug)]
pub enum PresentError {
    #[error("surface closed")]
    Closed,

    #[error("failed to write frame: {0}")]
    Write(#[from] image::ImageError),

    #[error("surface i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pipeline stage failed to complete.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("render output has {actual} bytes, expected {expected}")]
    OutputSize { expected: usize, actual: usize },

    #[error("backend was built for {expected_w}×{expected_h} frames, got {actual_w}×{actual_h}")]
    FrameSize {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },
}

/// A backend could not be created.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_descriptive() {
        let e = ConfigError::EmptyFrame { width: 0, height: 4 };
        assert!(e.to_string().contains("0×4"));

        let e = FrameError::DimensionMismatch {
            expected_w: 640,
            expected_h: 480,
            actual_w: 320,
            actual_h: 240,
        };
        assert!(e.to_string().contains("320×240"));
        assert!(e.to_string().contains("640×480"));

        let e = StageError::OutputSize { expected: 16, actual: 8 };
        assert!(e.to_string().contains("expected 16"));
    }

    #[test]
    fn overflow_names_the_accumulator() {
        let e = ConfigError::AccumulatorOverflow {
            what: "weight sum",
            required: 10,
            limit: 5,
        };
        assert!(e.to_string().starts_with("accumulator overflow: weight sum"));
    }
}
