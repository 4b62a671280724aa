// THEORY:
// The background model is a one-time estimate of ambient brightness across the
// trap surface, built from the first frame of a run. A single frame carries a
// vignette or a lighting gradient from one side; folding the image onto its own
// reflections and keeping the darker value flattens that directional bias into a
// symmetric "floor". After construction the model is read-only.
//
// Construction steps:
// 1.  Grayscale, then a 5x5 box blur to suppress sensor noise.
// 2.  Fold vertically: every pixel takes the darker of itself and its mirror
//     across the horizontal axis.
// 3.  Fold horizontally the same way.
// 4.  Blur again to smooth the seams left by the folds.

use image::{GrayImage, RgbImage, imageops};
use imageproc::filter::box_filter;
use tracing::info;

/// Radius of the 5x5 averaging kernel.
const BLUR_RADIUS: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct BackgroundModel {
    floor: Option<GrayImage>,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the illumination floor from `frame`. Later calls are ignored.
    pub fn initialize(&mut self, frame: &RgbImage) {
        if self.floor.is_some() {
            return;
        }
        let gray = imageops::grayscale(frame);
        self.floor = Some(Self::fold_floor(&gray));
        info!(
            width = frame.width(),
            height = frame.height(),
            "background model initialised"
        );
    }

    fn fold_floor(gray: &GrayImage) -> GrayImage {
        let mut floor = box_filter(gray, BLUR_RADIUS, BLUR_RADIUS);
        let mirrored = imageops::flip_vertical(&floor);
        darken_with(&mut floor, &mirrored);
        let mirrored = imageops::flip_horizontal(&floor);
        darken_with(&mut floor, &mirrored);
        box_filter(&floor, BLUR_RADIUS, BLUR_RADIUS)
    }

    pub fn is_initialized(&self) -> bool {
        self.floor.is_some()
    }

    /// The floor image, once built.
    pub fn image(&self) -> Option<&GrayImage> {
        self.floor.as_ref()
    }

    /// Background brightness at `(x, y)`, clamped to the image edge. Returns 0
    /// until the model has been initialised.
    pub fn illumination_at(&self, x: i32, y: i32) -> u8 {
        let Some(floor) = &self.floor else {
            return 0;
        };
        let x = x.clamp(0, floor.width() as i32 - 1) as u32;
        let y = y.clamp(0, floor.height() as i32 - 1) as u32;
        floor.get_pixel(x, y)[0]
    }
}

/// Replaces every pixel of `target` that is brighter than its counterpart in `other`.
fn darken_with(target: &mut GrayImage, other: &GrayImage) {
    for (dst, src) in target.pixels_mut().zip(other.pixels()) {
        if src[0] < dst[0] {
            dst[0] = src[0];
        }
    }
}
