//! Error types at component boundaries.
//! Nothing here is fatal: callers log and keep their previous state.

use crate::geometry::BoardRegion;

/// Board localization failed; the caller keeps its prior calibration.
#[derive(thiserror::Error, Debug)]
pub enum LocalizeError {
    #[error("frame {width}x{height} is too small to hold a chessboard (min {min}x{min})")]
    FrameTooSmall { width: u32, height: u32, min: u32 },
    #[error("no board-like geometry found")]
    NoGeometry,
    #[error("image processing failed: {0}")]
    ImageProcessing(String),
}

/// A board snapshot could not be taken from a frame.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("region {0:?} is degenerate")]
    DegenerateRegion(BoardRegion),
    #[error("region {region:?} does not fit a {width}x{height} frame")]
    RegionOutOfFrame {
        region: BoardRegion,
        width: u32,
        height: u32,
    },
    #[error("cells of a {size}px board are too small to sample")]
    EmptyCell { size: u32 },
}

/// Reading or writing the persisted calibration failed.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed calibration file: {0}")]
    Format(#[from] serde_json::Error),
}

/// A calibration request was rejected before touching any state.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("manual region {0:?} is degenerate or runs past the pixel range")]
    InvalidRegion(BoardRegion),
    #[error("manual region size {size} is below the {minimum}px minimum board")]
    RegionTooSmall { size: u32, minimum: u32 },
}
