// THEORY:
// One error type for the whole engine. Configuration problems surface once, at
// construction time; malformed frames fail fast at the detector boundary. The
// ordinary "nothing happened this frame" outcomes (no contours, no blobs, an
// empty side of the assignment matrix) are never errors and never reach here.

use thiserror::Error;

/// Errors produced by the detection and tracking engine.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("empty frame ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("frame is {actual:?} but the background model was built from {expected:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("stream {0} is not part of this pool")]
    UnknownStream(usize),

    #[error("stream worker stopped before answering")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, VisionError>;
