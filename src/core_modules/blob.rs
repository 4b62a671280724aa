// THEORY:
// The `Blob` is the single record that flows through the whole engine. The
// detector creates one per foreground region in a frame; the tracker then binds
// it to a track identity. A track has no separate representation: a track *is*
// its most recent blob, so the list the tracker returns is simply a list of
// blobs carrying a `track_id`.
//
// Key architectural principles:
// 1.  **Self-contained snapshot**: A blob owns its crop pixels and every derived
//     measurement. Nothing inside it points back into the frame or the detector,
//     so the caller can keep or drop it freely between frames.
// 2.  **Per-frame annotations**: `cost`, `weights` and `direction` describe how the
//     blob was bound in the frame it was detected in. They are recomputed when the
//     track is matched again, not accumulated.
// 3.  **Invariants**: the crop rectangle always lies inside the image and is never
//     empty, and `size` never exceeds the crop area.

use crate::core_modules::color_signature::Signature;
use crate::core_modules::geometry::{Point, Rect};
use image::RgbImage;

/// One detection in one frame, and, once bound by the tracker, the current state of a track.
#[derive(Debug, Clone)]
pub struct Blob {
    /// The frame this blob was detected in (0 when unknown).
    pub image_id: u64,
    /// The raw bounding rectangle of the contour.
    pub rect: Rect,
    /// Centroid of `rect`, truncated to whole pixels.
    pub center: Point,
    /// `rect` padded by half its size on each side, clamped to the image.
    pub crop: Rect,
    /// The frame pixels under `crop`.
    pub crop_image: RgbImage,
    /// Foreground pixel count inside `crop`.
    pub size: u32,
    /// Dominant colour categories of the object.
    pub colors: Signature,
    /// Background brightness at the centroid.
    pub illumination: u8,
    /// True when the region also differs from the most recent frames, not only from the baseline.
    pub changed: bool,
    /// Detection id handed out to interesting blobs; 0 until assigned.
    pub id: u64,
    /// Persistent identity assigned by the tracker.
    pub track_id: Option<u64>,
    /// Frames since this track was last freshly detected; 0 means detected this frame.
    pub age: u32,
    /// Age of the track this blob replaced.
    pub delay: u32,
    /// Assignment cost; `None` for blobs that spawned a new track.
    pub cost: Option<f64>,
    /// Per-scale breakdown of `cost` for diagnostics.
    pub weights: String,
    /// Bearing in degrees from the previous position, when the movement was long enough.
    pub direction: Option<f64>,
}

impl Blob {
    /// Builds a blob for `rect` in an image of the given size. Crop pixels are left
    /// black; the detector fills them from the frame.
    pub fn from_rect(rect: Rect, image_width: u32, image_height: u32) -> Self {
        let crop = rect.expanded_crop(image_width, image_height);
        Self {
            image_id: 0,
            rect,
            center: rect.center(),
            crop,
            crop_image: RgbImage::new(crop.width.max(0) as u32, crop.height.max(0) as u32),
            size: 0,
            colors: Signature::default(),
            illumination: 0,
            changed: false,
            id: 0,
            track_id: None,
            age: 0,
            delay: 0,
            cost: None,
            weights: String::new(),
            direction: None,
        }
    }

    /// Area of the raw bounding rectangle.
    pub fn box_area(&self) -> i64 {
        self.rect.area()
    }
}
