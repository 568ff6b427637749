//! Boardsight: watches a chessboard rendered by another app, finds it on screen,
//! and turns frame-to-frame changes into moves.
//!
//! Pipeline per cycle: screen frame → [`calibrate::CalibrationController`] makes sure a
//! board region exists → [`diff::BoardSnapshot`] of that region →
//! [`diff::FrameDifferencer`] → [`diff::DetectedMove`] → engine / executor collaborators.

pub mod calibrate;
pub mod capture;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod execute;
pub mod geometry;
pub mod imaging;
pub mod locate;
pub mod logging;
pub mod watch;

use serde::{Deserialize, Serialize};

pub use calibrate::{Calibration, CalibrationController, CalibrationSource};
pub use diff::{BoardSnapshot, CellState, DetectedMove, FrameDifferencer};
pub use geometry::{BoardRegion, Orientation, to_pixel, to_square};
pub use locate::{BoardLocalizer, Localization};

/// A side of the board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerSide {
    #[default]
    White,
    Black,
}

impl PlayerSide {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerSide::White => "white",
            PlayerSide::Black => "black",
        }
    }
}

impl std::fmt::Display for PlayerSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlayerSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(PlayerSide::White),
            "black" | "b" => Ok(PlayerSide::Black),
            other => anyhow::bail!("Invalid side '{}'. Choose 'white' or 'black'.", other),
        }
    }
}
