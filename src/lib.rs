// THEORY:
// This file is the entry point for the `moth_vision` library crate. It exposes
// the detection-and-tracking engine for fixed-camera insect trap image
// sequences: background-subtraction blob detection followed by a
// multi-feature, cost-based tracker.
//
// Most callers only need the `VisionPipeline` facade and the `Config` tree.
// The building blocks under `core_modules` stay public for callers that want to
// run the detector and the tracker separately and thread the track list
// themselves.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{ColorConfig, Config, DetectorConfig, ScaleConfig, SubtractorConfig, TrackerConfig};
pub use core_modules::blob::Blob;
pub use core_modules::blob_detector::{BinaryMask, BlobDetector};
pub use core_modules::color_signature::{ColorCategory, ColorSignature, Signature};
pub use core_modules::cost_scale::{CostModel, Scale, ScaleKind};
pub use core_modules::geometry::{Point, Rect};
pub use core_modules::tracker::{Tracker, high_overlap};
pub use error::{Result, VisionError};
pub use parallel_pipeline::StreamPool;
pub use pipeline::{AcceptAll, FrameReport, InterestFilter, VisionPipeline};
