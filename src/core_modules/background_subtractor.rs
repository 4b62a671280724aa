// THEORY:
// A running per-pixel background model. Every pixel keeps a Gaussian estimate
// (mean and variance) of its background intensity; a new frame is scored pixel
// by pixel against it. The detector keeps two of these with different learning
// rates: one frozen after seeding, which finds everything that differs from the
// long-ago baseline, and one that keeps adapting, which finds only what changed
// recently.
//
// Key architectural principles:
// 1.  **Seed on first contact**: The first frame applied initialises the model,
//     whatever learning rate was requested, and scores as all background.
// 2.  **Three-level scores**: 0 for background, `shadow_value` for pixels that are
//     darker than the model by a bounded ratio, 255 for foreground. Callers
//     binarise with their own threshold.
// 3.  **Explicit learning rate**: `Frozen` never updates, `Fixed` blends with a
//     constant weight, `Automatic` starts fast and slows down towards `1/history`.

use crate::config::SubtractorConfig;
use crate::error::{Result, VisionError};
use image::{GrayImage, Luma};

/// How strongly a frame pulls the model towards itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningRate {
    /// Score only; the model is never updated.
    Frozen,
    /// Blend with a constant weight in `0..=1`.
    Fixed(f32),
    /// `1 / min(2n, history)` where `n` is the number of frames seen so far.
    Automatic,
}

#[derive(Debug, Clone)]
pub struct BackgroundSubtractor {
    config: SubtractorConfig,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
}

impl BackgroundSubtractor {
    pub fn new(config: &SubtractorConfig) -> Self {
        Self {
            config: config.clone(),
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.frames_seen > 0
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Scores `frame` against the model, then updates the model with `rate`.
    pub fn apply(&mut self, frame: &GrayImage, rate: LearningRate) -> Result<GrayImage> {
        if !self.is_initialized() {
            self.seed(frame);
            return Ok(GrayImage::new(frame.width(), frame.height()));
        }
        if frame.dimensions() != (self.width, self.height) {
            return Err(VisionError::FrameSizeMismatch {
                expected: (self.width, self.height),
                actual: frame.dimensions(),
            });
        }

        let alpha = self.alpha(rate);
        let mut scores = GrayImage::new(self.width, self.height);

        for ((pixel, score), (mean, variance)) in frame
            .pixels()
            .zip(scores.pixels_mut())
            .zip(self.mean.iter_mut().zip(self.variance.iter_mut()))
        {
            let value = pixel[0] as f32;
            let diff = value - *mean;
            let d2 = diff * diff;

            *score = Luma([classify(&self.config, value, *mean, *variance, d2)]);

            if alpha > 0.0 {
                *mean += alpha * diff;
                *variance = (*variance + alpha * (d2 - *variance))
                    .clamp(self.config.var_min, self.config.var_max);
            }
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        Ok(scores)
    }

    fn seed(&mut self, frame: &GrayImage) {
        self.width = frame.width();
        self.height = frame.height();
        self.mean = frame.pixels().map(|p| p[0] as f32).collect();
        let initial = self.config.var_init.clamp(self.config.var_min, self.config.var_max);
        self.variance = vec![initial; self.mean.len()];
        self.frames_seen = 1;
    }

    fn alpha(&self, rate: LearningRate) -> f32 {
        match rate {
            LearningRate::Frozen => 0.0,
            LearningRate::Fixed(alpha) => alpha.clamp(0.0, 1.0),
            LearningRate::Automatic => {
                let span = (2 * self.frames_seen as u64).min(self.config.history as u64).max(1);
                1.0 / span as f32
            }
        }
    }
}

fn classify(config: &SubtractorConfig, value: f32, mean: f32, variance: f32, d2: f32) -> u8 {
    if d2 < config.var_threshold * variance {
        return 0;
    }
    if config.detect_shadows && mean > 0.0 {
        let ratio = value / mean;
        if ratio >= config.shadow_tau && ratio < 1.0 {
            return config.shadow_value;
        }
    }
    255
}
