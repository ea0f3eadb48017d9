// src/error.rs
//
// Fatal errors surface at startup (bad config, missing wiring). Everything
// that can go wrong tick to tick is a `Degradation` value instead.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing required wiring: {0}")]
    MissingWiring(&'static str),

    #[error("frame shape mismatch: {width}x{height} with {len} pixels")]
    FrameShape {
        width: usize,
        height: usize,
        len: usize,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
}

/// Non-fatal condition absorbed within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Degradation {
    /// Capture failed or no frame has cleared the latency stage yet
    NoFrame,
    /// Frame scanned, no qualifying lane pixels
    NoDetection,
    /// Obstacle reported dead ahead, resolved by steering left
    SensorConflict,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::NoFrame => "NO_FRAME",
            Degradation::NoDetection => "NO_DETECTION",
            Degradation::SensorConflict => "SENSOR_CONFLICT",
        }
    }

    /// NoFrame and NoDetection both mean "hold the previous command".
    pub fn holds_command(&self) -> bool {
        matches!(self, Degradation::NoFrame | Degradation::NoDetection)
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
