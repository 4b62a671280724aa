// THEORY:
// The blob detector turns one still frame into a list of candidate objects. It
// compares every frame against two background subtraction models:
//
// - the **stable** model is seeded from the illumination floor and never learns
//   again, so its mask holds everything that differs from the start of the run;
// - the **adaptive** model keeps learning, so its mask holds only what differs
//   from the last few frames.
//
// Regions are discovered in the stable mask. The adaptive mask only answers
// "did this region change recently?".
//
// Per-frame steps:
// 1.  Seed the background model and both subtraction models on the first frame.
// 2.  Score the grayscale frame against each model and binarise the scores.
// 3.  Close then open each mask to drop speckle and fill pinholes.
// 4.  Take the bounding rectangles of the external contours and keep those whose
//     area lies in `[min_area, max_area]`.
// 5.  Package every stable rectangle into a `Blob` with crop, size, colour
//     signature, illumination and the changed flag.

use crate::config::DetectorConfig;
use crate::core_modules::background_model::BackgroundModel;
use crate::core_modules::background_subtractor::{BackgroundSubtractor, LearningRate};
use crate::core_modules::blob::Blob;
use crate::core_modules::color_signature::ColorSignature;
use crate::core_modules::geometry::Rect;
use crate::error::{Result, VisionError};
use image::{GrayImage, RgbImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::contrast::{ThresholdType, threshold};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, dilate, open};
use tracing::debug;

/// A binarised foreground mask. Object pixels are stored as 0 and empty pixels
/// as 255.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    image: GrayImage,
}

impl BinaryMask {
    /// Binarises subtraction scores: anything above `thresh` becomes object.
    /// The result is then closed and opened with a square kernel of radius `radius`.
    pub fn from_scores(scores: &GrayImage, thresh: u8, radius: u8) -> Self {
        let binary = threshold(scores, thresh, ThresholdType::BinaryInverted);
        let cleaned = open(&close(&binary, Norm::LInf, radius), Norm::LInf, radius);
        Self { image: cleaned }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The raw mask image, in object-is-zero form.
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel_checked(x, y).is_some_and(|p| p[0] < 255)
    }

    /// Number of object pixels inside `rect`, which must lie within the mask.
    pub fn foreground_count(&self, rect: &Rect) -> u32 {
        let mut count = 0;
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                if self.is_foreground(x as u32, y as u32) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Copies the mask pixels under `rect`.
    pub fn crop(&self, rect: &Rect) -> GrayImage {
        imageops::crop_imm(
            &self.image,
            rect.x as u32,
            rect.y as u32,
            rect.width as u32,
            rect.height as u32,
        )
        .to_image()
    }

    /// Bounding rectangles of the outermost object regions, including regions
    /// that touch the image border.
    pub fn external_rects(&self) -> Vec<Rect> {
        // Contour tracing needs a background ring, or border regions come back as holes.
        let mut inverted = self.image.clone();
        imageops::invert(&mut inverted);
        let mut objects = GrayImage::new(self.width() + 2, self.height() + 2);
        imageops::replace(&mut objects, &inverted, 1, 1);

        find_contours::<i32>(&objects)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let min_x = c.points.iter().map(|p| p.x).min()?;
                let max_x = c.points.iter().map(|p| p.x).max()?;
                let min_y = c.points.iter().map(|p| p.y).min()?;
                let max_y = c.points.iter().map(|p| p.y).max()?;
                Some(Rect::new(min_x - 1, min_y - 1, max_x - min_x + 1, max_y - min_y + 1))
            })
            .collect()
    }
}

pub struct BlobDetector {
    config: DetectorConfig,
    background: BackgroundModel,
    stable: BackgroundSubtractor,
    adaptive: BackgroundSubtractor,
    colors: ColorSignature,
    frame_id: u64,
}

impl BlobDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            background: BackgroundModel::new(),
            stable: BackgroundSubtractor::new(&config.subtractor),
            adaptive: BackgroundSubtractor::new(&config.subtractor),
            colors: ColorSignature::new(&config.color),
            frame_id: 1,
        })
    }

    /// Id that the next processed frame will carry.
    pub fn next_frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Detects blobs in a packed RGB8 buffer of `width` x `height` pixels.
    pub fn detect_raw(
        &mut self,
        buffer: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(Vec<Blob>, BinaryMask)> {
        let frame = Self::frame_from_raw(buffer, width, height)?;
        self.detect(&frame)
    }

    /// Wraps a packed RGB8 buffer of `width` x `height` pixels as an image.
    pub fn frame_from_raw(buffer: &[u8], width: u32, height: u32) -> Result<RgbImage> {
        let expected = width as usize * height as usize * 3;
        let size_error = || VisionError::BufferSize {
            expected,
            actual: buffer.len(),
        };
        if buffer.len() != expected {
            return Err(size_error());
        }
        RgbImage::from_raw(width, height, buffer.to_vec()).ok_or_else(size_error)
    }

    /// Detects blobs in `frame` and returns them with the stable mask.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<(Vec<Blob>, BinaryMask)> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::EmptyFrame { width, height });
        }

        // --- 1. Seed on first frame ---
        if !self.background.is_initialized() {
            self.background.initialize(frame);
            if let Some(floor) = self.background.image() {
                self.stable.apply(floor, LearningRate::Frozen)?;
                self.adaptive.apply(floor, LearningRate::Frozen)?;
            }
        }

        // --- 2. Score and binarise ---
        let gray = imageops::grayscale(frame);
        let adaptive_rate = match self.config.adaptive_learning_rate {
            Some(alpha) => LearningRate::Fixed(alpha),
            None => LearningRate::Automatic,
        };
        let stable_scores = self.stable.apply(&gray, LearningRate::Frozen)?;
        let adaptive_scores = self.adaptive.apply(&gray, adaptive_rate)?;

        let radius = self.config.kernel / 2;
        let mask = BinaryMask::from_scores(&stable_scores, self.config.thresh, radius);
        let recent = BinaryMask::from_scores(&adaptive_scores, self.config.thresh, radius);

        // --- 3. Regions ---
        let rects = self.accept_areas(mask.external_rects());
        let recent_rects = self.accept_areas(recent.external_rects());

        // --- 4. Package blobs ---
        let blobs: Vec<Blob> = rects
            .into_iter()
            .map(|rect| self.build_blob(frame, &mask, rect, &recent_rects))
            .collect();

        debug!(
            frame_id = self.frame_id,
            blobs = blobs.len(),
            recent_regions = recent_rects.len(),
            "frame processed"
        );
        self.frame_id += 1;
        Ok((blobs, mask))
    }

    fn accept_areas(&self, rects: Vec<Rect>) -> Vec<Rect> {
        let min = self.config.min_area as i64;
        let max = self.config.max_area as i64;
        rects
            .into_iter()
            .filter(|r| (min..=max).contains(&r.area()))
            .collect()
    }

    fn build_blob(&self, frame: &RgbImage, mask: &BinaryMask, rect: Rect, recent: &[Rect]) -> Blob {
        let mut blob = Blob::from_rect(rect, frame.width(), frame.height());
        let crop = blob.crop;
        blob.image_id = self.frame_id;
        blob.crop_image = imageops::crop_imm(
            frame,
            crop.x as u32,
            crop.y as u32,
            crop.width as u32,
            crop.height as u32,
        )
        .to_image();
        blob.size = mask.foreground_count(&crop);

        let exclude = dilate(&mask.crop(&crop), Norm::LInf, self.config.kernel / 2);
        blob.colors = self.colors.classify(&blob.crop_image, Some(&exclude));
        blob.illumination = self.background.illumination_at(blob.center.x, blob.center.y);
        blob.changed = recent.iter().any(|r| rect.intersects(r));
        blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn config() -> DetectorConfig {
        DetectorConfig {
            min_area: 100,
            ..DetectorConfig::default()
        }
    }

    fn empty_frame() -> RgbImage {
        RgbImage::from_pixel(200, 200, Rgb([200, 200, 200]))
    }

    fn frame_with_square(x: u32, y: u32, side: u32) -> RgbImage {
        let mut frame = empty_frame();
        for yy in y..y + side {
            for xx in x..x + side {
                frame.put_pixel(xx, yy, Rgb([20, 20, 20]));
            }
        }
        frame
    }

    #[test]
    fn empty_scene_yields_no_blobs() {
        let mut detector = BlobDetector::new(&config()).unwrap();
        let (blobs, mask) = detector.detect(&empty_frame()).unwrap();
        assert!(blobs.is_empty());
        assert_eq!(mask.foreground_count(&Rect::new(0, 0, 200, 200)), 0);
        let (blobs, _) = detector.detect(&empty_frame()).unwrap();
        assert!(blobs.is_empty());
    }

    #[test]
    fn new_dark_square_becomes_one_blob() {
        let mut detector = BlobDetector::new(&config()).unwrap();
        detector.detect(&empty_frame()).unwrap();
        let (blobs, mask) = detector.detect(&frame_with_square(80, 80, 30)).unwrap();

        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        assert_eq!(blob.image_id, 2);
        assert_eq!(blob.rect, Rect::new(80, 80, 30, 30));
        assert_eq!((blob.center.x, blob.center.y), (95, 95));
        assert_eq!(blob.crop, Rect::new(65, 65, 60, 60));
        assert_eq!(blob.crop_image.dimensions(), (60, 60));
        assert_eq!(blob.size, 900);
        assert!(blob.changed);
        assert_eq!(blob.colors.to_string(), "K");
        assert_eq!(blob.illumination, 200);
        assert_eq!(blob.id, 0);
        assert_eq!(blob.track_id, None);
        assert!(mask.is_foreground(95, 95));
        assert!(!mask.is_foreground(10, 10));
    }

    #[test]
    fn crop_near_the_edge_is_clamped() {
        let mut detector = BlobDetector::new(&config()).unwrap();
        detector.detect(&empty_frame()).unwrap();
        let (blobs, _) = detector.detect(&frame_with_square(175, 175, 20)).unwrap();
        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        assert_eq!(blob.crop, Rect::new(165, 165, 35, 35));
        assert!(blob.crop.fits_within(200, 200));
        assert!(blob.size as i64 <= blob.crop.area());
    }

    #[test]
    fn object_on_the_left_edge_is_detected() {
        let mut detector = BlobDetector::new(&config()).unwrap();
        detector.detect(&empty_frame()).unwrap();
        let (blobs, _) = detector.detect(&frame_with_square(0, 80, 20)).unwrap();

        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        assert_eq!(blob.rect, Rect::new(0, 80, 20, 20));
        assert_eq!((blob.center.x, blob.center.y), (10, 90));
        assert_eq!(blob.crop, Rect::new(0, 70, 40, 40));
        assert_eq!(blob.crop_image.dimensions(), (40, 40));
        assert_eq!(blob.size, 400);
        assert!(blob.changed);
    }

    #[test]
    fn object_in_the_top_left_corner_is_detected() {
        let mut detector = BlobDetector::new(&config()).unwrap();
        detector.detect(&empty_frame()).unwrap();
        let (blobs, mask) = detector.detect(&frame_with_square(0, 0, 20)).unwrap();

        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        assert_eq!(blob.rect, Rect::new(0, 0, 20, 20));
        assert_eq!(blob.crop, Rect::new(0, 0, 40, 40));
        assert!(blob.crop.fits_within(200, 200));
        assert_eq!(blob.size, 400);
        assert!(blob.changed);
        assert!(mask.is_foreground(0, 0));
    }

    #[test]
    fn external_rects_cover_every_border() {
        let mut scores = GrayImage::new(50, 50);
        for &(x, y) in &[(0u32, 0u32), (0, 20), (20, 20), (42, 42), (42, 0)] {
            for yy in y..y + 8 {
                for xx in x..x + 8 {
                    scores.put_pixel(xx, yy, image::Luma([255]));
                }
            }
        }
        let mask = BinaryMask::from_scores(&scores, 100, 1);
        let mut rects = mask.external_rects();
        rects.sort_by_key(|r| (r.y, r.x));
        assert_eq!(
            rects,
            vec![
                Rect::new(0, 0, 8, 8),
                Rect::new(42, 0, 8, 8),
                Rect::new(0, 20, 8, 8),
                Rect::new(20, 20, 8, 8),
                Rect::new(42, 42, 8, 8),
            ]
        );
    }

    #[test]
    fn area_limits_are_inclusive() {
        let exact = DetectorConfig {
            min_area: 900,
            max_area: 900,
            ..DetectorConfig::default()
        };
        let mut detector = BlobDetector::new(&exact).unwrap();
        detector.detect(&empty_frame()).unwrap();
        let (blobs, _) = detector.detect(&frame_with_square(80, 80, 30)).unwrap();
        assert_eq!(blobs.len(), 1);

        let too_small = DetectorConfig {
            min_area: 901,
            ..DetectorConfig::default()
        };
        let mut detector = BlobDetector::new(&too_small).unwrap();
        detector.detect(&empty_frame()).unwrap();
        let (blobs, _) = detector.detect(&frame_with_square(80, 80, 30)).unwrap();
        assert!(blobs.is_empty());
    }

    #[test]
    fn lingering_object_stops_being_changed() {
        let mut detector = BlobDetector::new(&config()).unwrap();
        detector.detect(&empty_frame()).unwrap();
        let frame = frame_with_square(80, 80, 30);
        let (first, _) = detector.detect(&frame).unwrap();
        assert!(first[0].changed);

        let mut last = Vec::new();
        for _ in 0..80 {
            last = detector.detect(&frame).unwrap().0;
        }
        assert_eq!(last.len(), 1);
        assert!(!last[0].changed);
    }

    #[test]
    fn malformed_frames_fail_fast() {
        let mut detector = BlobDetector::new(&config()).unwrap();
        assert!(matches!(
            detector.detect(&RgbImage::new(0, 10)),
            Err(VisionError::EmptyFrame { .. })
        ));
        assert!(matches!(
            detector.detect_raw(&[0u8; 10], 2, 2),
            Err(VisionError::BufferSize { expected: 12, actual: 10 })
        ));

        detector.detect(&empty_frame()).unwrap();
        assert!(matches!(
            detector.detect(&RgbImage::new(100, 100)),
            Err(VisionError::FrameSizeMismatch { .. })
        ));
    }

    #[test]
    fn raw_buffer_matches_image_path() {
        let mut detector = BlobDetector::new(&config()).unwrap();
        let empty = empty_frame();
        detector.detect_raw(empty.as_raw(), 200, 200).unwrap();
        let frame = frame_with_square(40, 60, 30);
        let (blobs, _) = detector.detect_raw(frame.as_raw(), 200, 200).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].rect, Rect::new(40, 60, 30, 30));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = DetectorConfig {
            kernel: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            BlobDetector::new(&bad),
            Err(VisionError::InvalidConfig(_))
        ));
    }
}
