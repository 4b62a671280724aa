// THEORY:
// The `pipeline` module is the top-level API of the engine. It wires the blob
// detector and the tracker into one per-frame call and owns the caller-side
// state the core components deliberately do not keep: the live track list and
// the detection id counter.
//
// Per-frame stages:
// 1.  Detection: the frame becomes a list of blobs and a foreground mask.
// 2.  Interest filter: an external predicate decides which blobs are worth
//     tracking. Rejected blobs are dropped and keep detection id 0.
// 3.  Id assignment: each kept blob gets the next detection id, starting at 1.
// 4.  Tracking: the tracker reconciles the kept blobs with the live tracks.

use crate::config::Config;
use crate::core_modules::blob::Blob;
use crate::core_modules::blob_detector::{BinaryMask, BlobDetector};
use crate::core_modules::tracker::Tracker;
use crate::error::Result;
use image::RgbImage;
use tracing::debug;

/// Decides whether a detected blob should be tracked.
pub trait InterestFilter {
    fn is_interesting(&self, frame: &RgbImage, blob: &Blob) -> bool;
}

impl<F> InterestFilter for F
where
    F: Fn(&RgbImage, &Blob) -> bool,
{
    fn is_interesting(&self, frame: &RgbImage, blob: &Blob) -> bool {
        self(frame, blob)
    }
}

/// Keeps every blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl InterestFilter for AcceptAll {
    fn is_interesting(&self, _frame: &RgbImage, _blob: &Blob) -> bool {
        true
    }
}

/// Outcome of one processed frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_id: u64,
    /// Blobs found by the detector before filtering.
    pub detected: usize,
    /// Blobs that passed the interest filter and were handed to the tracker.
    pub interesting: usize,
    /// Live tracks after this frame.
    pub tracks: Vec<Blob>,
    /// Tracks that died this frame.
    pub dead_tracks: Vec<Blob>,
}

pub struct VisionPipeline<F: InterestFilter = AcceptAll> {
    detector: BlobDetector,
    tracker: Tracker,
    filter: F,
    tracks: Vec<Blob>,
    next_blob_id: u64,
    last_mask: Option<BinaryMask>,
}

impl VisionPipeline<AcceptAll> {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_filter(config, AcceptAll)
    }
}

impl<F: InterestFilter> VisionPipeline<F> {
    pub fn with_filter(config: &Config, filter: F) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detector: BlobDetector::new(&config.blob_detector)?,
            tracker: Tracker::new(&config.tracker)?,
            filter,
            tracks: Vec::new(),
            next_blob_id: 1,
            last_mask: None,
        })
    }

    /// Runs detection, filtering and tracking on one frame.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<FrameReport> {
        let frame_id = self.detector.next_frame_id();

        // --- 1. Detection ---
        let (blobs, mask) = self.detector.detect(frame)?;
        let detected = blobs.len();

        // --- 2. Interest filter and 3. id assignment ---
        let mut kept = Vec::with_capacity(detected);
        for mut blob in blobs {
            if self.filter.is_interesting(frame, &blob) {
                blob.id = self.next_blob_id;
                self.next_blob_id += 1;
                kept.push(blob);
            }
        }
        let interesting = kept.len();

        // --- 4. Tracking ---
        let previous = std::mem::take(&mut self.tracks);
        let (tracks, dead_tracks) = self.tracker.manage_tracks(previous, kept);
        self.tracks = tracks;
        self.last_mask = Some(mask);

        debug!(
            frame_id,
            detected,
            interesting,
            tracks = self.tracks.len(),
            dead = dead_tracks.len(),
            "pipeline frame"
        );

        Ok(FrameReport {
            frame_id,
            detected,
            interesting,
            tracks: self.tracks.clone(),
            dead_tracks,
        })
    }

    /// Same as `process_frame` for a packed RGB8 buffer.
    pub fn process_raw(&mut self, buffer: &[u8], width: u32, height: u32) -> Result<FrameReport> {
        let frame = BlobDetector::frame_from_raw(buffer, width, height)?;
        self.process_frame(&frame)
    }

    /// Live tracks after the last processed frame.
    pub fn tracks(&self) -> &[Blob] {
        &self.tracks
    }

    /// Stable foreground mask of the last processed frame.
    pub fn last_mask(&self) -> Option<&BinaryMask> {
        self.last_mask.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VisionError;
    use image::Rgb;

    fn config() -> Config {
        let mut config = Config::default();
        config.blob_detector.min_area = 100;
        config
    }

    fn frame(squares: &[(u32, u32)]) -> RgbImage {
        let mut frame = RgbImage::from_pixel(160, 120, Rgb([210, 210, 210]));
        for &(x, y) in squares {
            for yy in y..y + 20 {
                for xx in x..x + 20 {
                    frame.put_pixel(xx, yy, Rgb([30, 30, 30]));
                }
            }
        }
        frame
    }

    #[test]
    fn ids_and_tracks_follow_a_moving_object() {
        let mut pipeline = VisionPipeline::new(&config()).unwrap();
        let first = pipeline.process_frame(&frame(&[])).unwrap();
        assert_eq!(first.frame_id, 1);
        assert_eq!(first.detected, 0);
        assert!(first.tracks.is_empty());

        let second = pipeline.process_frame(&frame(&[(40, 40)])).unwrap();
        assert_eq!(second.tracks.len(), 1);
        assert_eq!(second.tracks[0].id, 1);
        assert_eq!(second.tracks[0].track_id, Some(1));

        let third = pipeline.process_frame(&frame(&[(41, 41)])).unwrap();
        assert_eq!(third.tracks.len(), 1);
        assert_eq!(third.tracks[0].id, 2);
        assert_eq!(third.tracks[0].track_id, Some(1));
        assert_eq!(third.tracks[0].weights, "HighOverlap");
        assert!(pipeline.last_mask().is_some());
    }

    #[test]
    fn raw_buffers_go_through_the_detector_checks() {
        let mut pipeline = VisionPipeline::new(&config()).unwrap();
        let first = pipeline.process_raw(frame(&[]).as_raw(), 160, 120).unwrap();
        assert_eq!(first.frame_id, 1);

        assert!(matches!(
            pipeline.process_raw(&[0u8; 5], 160, 120),
            Err(VisionError::BufferSize {
                expected: 57_600,
                actual: 5
            })
        ));

        let report = pipeline.process_raw(frame(&[(40, 40)]).as_raw(), 160, 120).unwrap();
        assert_eq!(report.frame_id, 2);
        assert_eq!(report.tracks.len(), 1);
    }

    #[test]
    fn rejected_blobs_are_not_tracked() {
        let reject_left = |_: &RgbImage, blob: &Blob| blob.center.x > 80;
        let mut pipeline = VisionPipeline::with_filter(&config(), reject_left).unwrap();
        pipeline.process_frame(&frame(&[])).unwrap();
        let report = pipeline.process_frame(&frame(&[(10, 50), (120, 50)])).unwrap();
        assert_eq!(report.detected, 2);
        assert_eq!(report.interesting, 1);
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks[0].id, 1);
        assert!(report.tracks[0].center.x > 80);
    }

    #[test]
    fn vanished_object_is_reported_dead_after_max_age() {
        let mut pipeline = VisionPipeline::new(&config()).unwrap();
        pipeline.process_frame(&frame(&[])).unwrap();
        pipeline.process_frame(&frame(&[(60, 60)])).unwrap();

        let mut dead = Vec::new();
        for _ in 0..6 {
            let report = pipeline.process_frame(&frame(&[])).unwrap();
            dead.extend(report.dead_tracks);
        }
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].track_id, Some(1));
        assert!(pipeline.tracks().is_empty());
    }
}
