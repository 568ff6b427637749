//! Move execution.
//! Realizing a move on screen (taps, drags) belongs to whoever implements [`MoveExecutor`].
//! The built-in [`ConsoleExecutor`] only prints where the two taps would land.

use anyhow::{Result, bail};
use tracing::info;

use crate::calibrate::Calibration;
use crate::diff::DetectedMove;
use crate::geometry::to_pixel;

/// Screen points for a move: press on `from`, release on `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TapPlan {
    pub from: (u32, u32),
    pub to: (u32, u32),
}

impl TapPlan {
    pub fn new(mv: &DetectedMove, calibration: &Calibration) -> Result<Self> {
        if !calibration.is_usable() {
            bail!("Cannot place move {} without a calibrated board", mv);
        }
        Ok(Self {
            from: to_pixel(mv.from, &calibration.region, calibration.orientation),
            to: to_pixel(mv.to, &calibration.region, calibration.orientation),
        })
    }
}

/// Carries out the engine's moves on screen. Called from a blocking task.
pub trait MoveExecutor: Send + Sync + 'static {
    fn execute(&self, mv: &DetectedMove, calibration: &Calibration) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleExecutor;

impl MoveExecutor for ConsoleExecutor {
    fn execute(&self, mv: &DetectedMove, calibration: &Calibration) -> Result<()> {
        let plan = TapPlan::new(mv, calibration)?;
        info!("Executing {} as taps {:?} -> {:?}", mv, plan.from, plan.to);
        println!(
            "Play {}: tap ({}, {}) then ({}, {})",
            mv, plan.from.0, plan.from.1, plan.to.0, plan.to.1
        );
        Ok(())
    }
}
