// THEORY:
// Every tunable of the engine lives in one serde tree that mirrors the engine's
// structure: a detector section and a tracker section. Each struct carries
// `#[serde(default)]`, so a configuration file only names what it changes and
// `{}` is a complete, working configuration. Values are range-checked once, at
// construction, so the per-frame code never has to.

use crate::core_modules::cost_scale::ScaleKind;
use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration: one section for the detector, one for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub blob_detector: DetectorConfig,
    pub tracker: TrackerConfig,
}

impl Config {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.blob_detector.validate()?;
        self.tracker.validate()
    }
}

/// Parameters of the blob detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Side of the square morphological kernel, in pixels.
    pub kernel: u8,
    /// Subtraction scores above this value count as foreground.
    pub thresh: u8,
    /// Smallest accepted bounding-box area, inclusive.
    pub min_area: u32,
    /// Largest accepted bounding-box area, inclusive.
    pub max_area: u32,
    /// Parameters shared by the stable and adaptive subtraction models.
    pub subtractor: SubtractorConfig,
    /// Fixed learning rate for the adaptive model. `None` lets it pick its own.
    pub adaptive_learning_rate: Option<f32>,
    /// Colour signature settings.
    pub color: ColorConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kernel: 5,
            thresh: 100,
            min_area: 2500,
            max_area: 1_000_000,
            subtractor: SubtractorConfig::default(),
            adaptive_learning_rate: None,
            color: ColorConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kernel == 0 {
            return Err(VisionError::InvalidConfig("kernel size must be at least 1".into()));
        }
        if self.min_area > self.max_area {
            return Err(VisionError::InvalidConfig(format!(
                "min_area {} exceeds max_area {}",
                self.min_area, self.max_area
            )));
        }
        if let Some(rate) = self.adaptive_learning_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(VisionError::InvalidConfig(format!(
                    "adaptive_learning_rate {rate} outside 0..=1"
                )));
            }
        }
        self.subtractor.validate()?;
        self.color.validate()
    }
}

/// Per-pixel Gaussian background model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtractorConfig {
    /// Number of frames the automatic learning rate averages over once warmed up.
    pub history: u32,
    /// Squared Mahalanobis distance beyond which a pixel is not background.
    pub var_threshold: f32,
    /// Variance given to a freshly initialised pixel.
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Mark darker-but-proportional pixels with `shadow_value` instead of 255.
    pub detect_shadows: bool,
    /// Lowest brightness ratio still considered a shadow.
    pub shadow_tau: f32,
    pub shadow_value: u8,
}

impl Default for SubtractorConfig {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 16.0,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            detect_shadows: true,
            shadow_tau: 0.5,
            shadow_value: 127,
        }
    }
}

impl SubtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history == 0 {
            return Err(VisionError::InvalidConfig("history must be at least 1".into()));
        }
        if !(self.var_min > 0.0 && self.var_min <= self.var_max) {
            return Err(VisionError::InvalidConfig(format!(
                "variance bounds {}..{} are not a positive range",
                self.var_min, self.var_max
            )));
        }
        if self.var_threshold.is_nan() || self.var_threshold <= 0.0 || !self.var_init.is_finite() {
            return Err(VisionError::InvalidConfig(
                "var_threshold and var_init must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.shadow_tau) {
            return Err(VisionError::InvalidConfig(format!(
                "shadow_tau {} outside 0..1",
                self.shadow_tau
            )));
        }
        Ok(())
    }
}

/// Colour signature parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Bins per RGB channel.
    pub bins: u8,
    /// Margin by which a dominant channel must exceed the other two.
    pub min_diff: i32,
    /// Tolerance within which two channels count as balanced.
    pub max_diff: i32,
    /// Share of eligible pixels a category needs to be reported.
    pub threshold: f64,
    /// Report the white and black corners.
    pub include_neutrals: bool,
    /// Honour the exclusion mask passed by the detector.
    pub masked: bool,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            bins: 2,
            min_diff: 1,
            max_diff: 0,
            threshold: 0.02,
            include_neutrals: true,
            masked: true,
        }
    }
}

impl ColorConfig {
    /// Three bins per channel, hues only, no masking.
    pub fn coarse_hues() -> Self {
        Self {
            bins: 3,
            min_diff: 1,
            max_diff: 1,
            threshold: 0.02,
            include_neutrals: false,
            masked: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(2..=8).contains(&self.bins) {
            return Err(VisionError::InvalidConfig(format!(
                "colour bins {} outside 2..=8",
                self.bins
            )));
        }
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(VisionError::InvalidConfig(format!(
                "colour threshold {} outside 0..1",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// One weighted comparator in the tracker's cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub kind: ScaleKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl ScaleConfig {
    pub fn new(kind: ScaleKind, weight: f64) -> Self {
        Self {
            kind,
            weight,
            enabled: true,
        }
    }
}

/// Parameters of the frame-to-frame tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Comparators, evaluated in this order.
    pub scales: Vec<ScaleConfig>,
    /// Unmatched tracks at or beyond this age are dropped.
    pub max_age: u32,
    /// Optimal-assignment pairs at or above this cost are rejected.
    pub cost_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            scales: vec![
                ScaleConfig::new(ScaleKind::Size, 1.0),
                ScaleConfig::new(ScaleKind::Distance, 1.0),
                ScaleConfig::new(ScaleKind::Color, 1.0),
                ScaleConfig::new(ScaleKind::Age, 1.0),
                ScaleConfig::new(ScaleKind::Direction, 1.0),
            ],
            max_age: 5,
            cost_threshold: 0.3,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        let mut total = 0.0;
        for scale in self.scales.iter().filter(|s| s.enabled) {
            if !scale.weight.is_finite() || scale.weight < 0.0 {
                return Err(VisionError::InvalidConfig(format!(
                    "{:?} scale has weight {} (must be finite and non-negative)",
                    scale.kind, scale.weight
                )));
            }
            total += scale.weight;
        }
        if total <= 0.0 {
            return Err(VisionError::InvalidConfig(
                "tracker needs at least one enabled scale with positive weight".into(),
            ));
        }
        if !self.cost_threshold.is_finite() {
            return Err(VisionError::InvalidConfig(format!(
                "cost_threshold {} is not finite",
                self.cost_threshold
            )));
        }
        Ok(())
    }
}
