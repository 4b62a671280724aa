// THEORY:
// A cost scale compares a live track with a candidate blob along one axis and
// returns a penalty in `[0, weight]` (distance alone may exceed its weight for
// very long jumps). The tracker combines all enabled scales into one weighted
// RMS cost:
//
//     cost = sqrt( sum(c_i^2) / sum(w_i) )
//
// so one strong disagreement outweighs several mild ones. The set of scales is
// closed: configuration picks and weights them, nothing is loaded dynamically.

use crate::config::ScaleConfig;
use crate::core_modules::blob::Blob;
use crate::core_modules::geometry::{bearing, normalize_angle};
use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};

/// Size of the colour alphabet compared by the colour scale.
const COLOR_CATEGORIES: f64 = 8.0;
/// Normaliser for long jumps, roughly the diagonal of a full trap image.
const DISTANCE_SCALE: f64 = 4405.0;
/// Longest segment of the per-scale breakdown string.
const SEGMENT_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    Size,
    Distance,
    Color,
    Age,
    Direction,
}

impl ScaleKind {
    /// Single-letter code used in the weights breakdown.
    pub fn code(self) -> &'static str {
        match self {
            ScaleKind::Size => "S",
            ScaleKind::Distance => "D",
            ScaleKind::Color => "C",
            ScaleKind::Age => "A",
            ScaleKind::Direction => "B",
        }
    }
}

/// A weighted comparator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub kind: ScaleKind,
    pub weight: f64,
}

impl Scale {
    pub fn new(kind: ScaleKind, weight: f64) -> Self {
        Self { kind, weight }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Penalty for binding `blob` to `track`.
    pub fn cost(&self, track: &Blob, blob: &Blob) -> f64 {
        self.weight
            * match self.kind {
                ScaleKind::Size => size_penalty(track.size, blob.size),
                ScaleKind::Distance => distance_penalty(track, blob),
                ScaleKind::Color => track.colors.hamming(&blob.colors) as f64 / COLOR_CATEGORIES,
                ScaleKind::Age => track.age.min(5) as f64 / 5.0,
                ScaleKind::Direction => direction_penalty(track, blob),
            }
    }
}

fn size_penalty(a: u32, b: u32) -> f64 {
    let (small, large) = if a < b { (a, b) } else { (b, a) };
    if small == 0 {
        return 1.0;
    }
    let ratio = large as f64 / small as f64;
    if ratio > 4.0 { 1.0 } else { (ratio - 1.0) / 3.0 }
}

fn distance_penalty(track: &Blob, blob: &Blob) -> f64 {
    let d = track.center.distance(&blob.center);
    if d < 25.0 {
        0.0
    } else if track.rect.contains_strictly(&blob.center) || d < 100.0 {
        0.01
    } else if d < 250.0 {
        0.02
    } else {
        d / DISTANCE_SCALE
    }
}

fn direction_penalty(track: &Blob, blob: &Blob) -> f64 {
    let Some(previous) = track.direction else {
        return 0.0;
    };
    let Some(current) = bearing(&track.center, &blob.center) else {
        return 0.0;
    };
    normalize_angle(previous - current).abs() / 180.0
}

/// The configured, enabled scales and their combined cost.
#[derive(Debug, Clone)]
pub struct CostModel {
    scales: Vec<Scale>,
    total_weight: f64,
}

impl CostModel {
    pub fn from_config(configs: &[ScaleConfig]) -> Result<Self> {
        let mut scales = Vec::new();
        for config in configs.iter().filter(|c| c.enabled) {
            if !config.weight.is_finite() || config.weight < 0.0 {
                return Err(VisionError::InvalidConfig(format!(
                    "{:?} scale has weight {}",
                    config.kind, config.weight
                )));
            }
            scales.push(Scale::new(config.kind, config.weight));
        }
        Self::new(scales)
    }

    pub fn new(scales: Vec<Scale>) -> Result<Self> {
        let total_weight: f64 = scales.iter().map(|s| s.weight).sum();
        if total_weight.is_nan() || total_weight <= 0.0 {
            return Err(VisionError::InvalidConfig(
                "cost model needs a positive total weight".into(),
            ));
        }
        Ok(Self {
            scales,
            total_weight,
        })
    }

    /// Combined cost of binding `blob` to `track` and its per-scale breakdown,
    /// e.g. `"S:0.0066;D:0;C:0.125"`.
    pub fn compare(&self, track: &Blob, blob: &Blob) -> (f64, String) {
        let mut squares = 0.0;
        let mut segments = Vec::with_capacity(self.scales.len());
        for scale in &self.scales {
            let cost = scale.cost(track, blob);
            squares += cost * cost;
            let mut segment = format!("{}:{}", scale.code(), cost);
            segment.truncate(SEGMENT_LEN);
            segments.push(segment);
        }
        ((squares / self.total_weight).sqrt(), segments.join(";"))
    }
}
