// config.rs — Pipeline configuration.
//
// One `StippleConfig` drives both backends and the controller. It is plain
// data with serde derives so it can be loaded from JSON and overridden from
// the command line; `validate()` runs before any backend allocates.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fixed;

/// How a pixel's color becomes its weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// `w = 1 − (R+G+B)/3`. Dark regions attract sites.
    #[default]
    Darkness,
    /// `w = (R+G+B)/3`. Bright regions attract sites.
    Brightness,
}

impl WeightMode {
    /// Weight of one RGB pixel with channels in [0, 1].
    #[inline]
    pub fn weight(self, rgb: [f32; 3]) -> f32 {
        let mean = (rgb[0] + rgb[1] + rgb[2]) / 3.0;
        match self {
            WeightMode::Darkness => 1.0 - mean,
            WeightMode::Brightness => mean,
        }
    }
}

/// How the render stage colors a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RenderMode {
    /// Gray discs on black.
    #[default]
    Grayscale,
    /// Gray discs over the untouched input frame.
    Passthrough,
    /// Discs in `color` on black.
    Tinted { color: [f32; 3] },
}

impl RenderMode {
    /// Numeric code shared with the render kernel.
    pub fn code(&self) -> u32 {
        match self {
            RenderMode::Grayscale => 0,
            RenderMode::Passthrough => 1,
            RenderMode::Tinted { .. } => 2,
        }
    }

    pub fn tint(&self) -> [f32; 3] {
        match self {
            RenderMode::Tinted { color } => *color,
            _ => [1.0, 1.0, 1.0],
        }
    }
}

/// Which ownership partition the render stage draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexMapPolicy {
    /// Reuse the map computed by Assignment, before Reduction moved the
    /// sites. Positions are one step ahead of the partition.
    #[default]
    Lagged,
    /// Recompute the map from the new positions after Reduction.
    Refreshed,
}

/// What happens to triggers that arrive while the pipeline cannot take them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// Keep up to `queue_depth` pending triggers; overflow supersedes the
    /// oldest pending one.
    #[default]
    Queue,
    /// Drop every trigger that arrives while a run is in flight.
    DropWhileBusy,
}

/// Full configuration of a stipple pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StippleConfig {
    /// Number of sites N. Fixed for the lifetime of a backend.
    pub site_count: u32,
    /// Fixed-point scale for coordinate sums.
    pub fixed_point_precision: u32,
    /// Seed string for the initial layout.
    pub initial_seed: String,
    /// Disc radius (pixels) of the heaviest site.
    pub falloff: f32,
    pub width: u32,
    pub height: u32,
    pub weight_mode: WeightMode,
    pub render_mode: RenderMode,
    pub index_map_policy: IndexMapPolicy,
    pub backpressure: Backpressure,
    /// Pending-trigger capacity.
    pub queue_depth: usize,
    /// CPU worker threads. `None` uses every core.
    pub threads: Option<usize>,
}

impl Default for StippleConfig {
    fn default() -> Self {
        StippleConfig {
            site_count: 2000,
            fixed_point_precision: 1000,
            initial_seed: "42".to_string(),
            falloff: 800.0 / 256.0,
            width: 640,
            height: 480,
            weight_mode: WeightMode::default(),
            render_mode: RenderMode::default(),
            index_map_policy: IndexMapPolicy::default(),
            backpressure: Backpressure::default(),
            queue_depth: 1,
            threads: None,
        }
    }
}

impl StippleConfig {
    /// Default configuration for a `width × height` frame.
    pub fn for_frame(width: u32, height: u32) -> Self {
        StippleConfig {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Copy of this config sized for `count` explicit site positions,
    /// validated.
    pub fn with_site_count(&self, count: usize) -> Result<Self, ConfigError> {
        let site_count = u32::try_from(count).map_err(|_| ConfigError::AccumulatorOverflow {
            what: "site_count",
            required: count as u128,
            limit: u32::MAX as u128,
        })?;
        let config = StippleConfig { site_count, ..self.clone() };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no backend can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_count == 0 {
            return Err(ConfigError::NoSites);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        if self.fixed_point_precision == 0 {
            return Err(ConfigError::ZeroPrecision);
        }
        if !self.falloff.is_finite() || self.falloff <= 0.0 {
            return Err(ConfigError::InvalidFalloff(self.falloff));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        fixed::check_capacity(self.width, self.height, self.fixed_point_precision)
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
