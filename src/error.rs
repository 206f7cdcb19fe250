//! Error taxonomy for tracking, calibration and duty-map handling.

use thiserror::Error;

use crate::grid::GridCell;

/// Result type alias used across the library.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors surfaced to the caller.
///
/// Actuator transport failures are deliberately absent: they are swallowed and
/// logged by [`crate::actuator::ActuatorLink`].
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("background calibration failed: {0}")]
    CalibrationFailed(String),

    #[error("malformed duty map: {0}")]
    MalformedDutyMap(String),

    #[error("duty ratio {value} is outside [-1, 1]")]
    DutyOutOfRange { value: f64 },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(
        "detection out of range: cell ({col}, {row}), centroid ({x:.1}, {y:.1}), size {width}x{height}"
    )]
    OutOfRangeDetection {
        col: i64,
        row: i64,
        x: f64,
        y: f64,
        width: i32,
        height: i32,
    },

    #[error("starting cell {cell} lies outside the {width}x{height} duty map")]
    StartCellOutOfRange {
        cell: GridCell,
        width: usize,
        height: usize,
    },

    #[error("frame size mismatch: expected {expected:?}, got {actual:?}")]
    FrameSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("tracking worker panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl TrackerError {
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedDutyMap(msg.into())
    }

    pub fn calibration<S: Into<String>>(msg: S) -> Self {
        Self::CalibrationFailed(msg.into())
    }
}
