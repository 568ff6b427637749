//! Calibration module.
//! Single authority for "where is the board and which way does it face".
//!
//! The controller owns the persisted triple (region, orientation, source). A manually
//! confirmed calibration is sticky: automatic passes never replace or downgrade it, and
//! localization does not even run while one is in effect. Only another manual
//! confirmation (or an explicit `forget`) changes it.
//!
//! The store is re-read before every automatic decision, so a confirmation made through
//! another path (the CLI, another process) takes effect on the next cycle.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::CalibrationStore;
use crate::diff::MIN_CELL_PX;
use crate::error::{CalibrationError, StoreError};
use crate::geometry::{BoardRegion, Orientation};
use crate::locate::{BoardLocalizer, Locate};

/// Where the current calibration came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    #[default]
    Unset,
    AutoDetected,
    ManuallyConfirmed,
}

impl std::fmt::Display for CalibrationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationSource::Unset => write!(f, "unset"),
            CalibrationSource::AutoDetected => write!(f, "auto-detected"),
            CalibrationSource::ManuallyConfirmed => write!(f, "manually confirmed"),
        }
    }
}

/// The persisted configuration unit. Serialized flat:
/// `{ origin_x, origin_y, size, pieces_flipped, source }`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(flatten)]
    pub region: BoardRegion,
    #[serde(flatten)]
    pub orientation: Orientation,
    pub source: CalibrationSource,
}

impl Calibration {
    pub fn is_manual(&self) -> bool {
        self.source == CalibrationSource::ManuallyConfirmed
    }

    pub fn is_usable(&self) -> bool {
        self.region.is_addressable()
    }
}

pub struct CalibrationController<S, L = BoardLocalizer> {
    store: S,
    locator: L,
    current: Calibration,
    // in-memory calibration has not reached the store yet
    unsaved: bool,
}

impl<S: CalibrationStore, L: Locate> CalibrationController<S, L> {
    /// Creates the controller and loads whatever is persisted.
    pub fn new(store: S, locator: L) -> Self {
        let mut controller = Self {
            store,
            locator,
            current: Calibration::default(),
            unsaved: false,
        };
        controller.reload();
        controller
    }

    pub fn current(&self) -> Calibration {
        self.current
    }

    /// Re-reads the persisted triple. Never lets a stored non-manual calibration replace
    /// an in-memory manual one, and never lets stale disk state overwrite a calibration
    /// that failed to save, unless the disk holds a manual confirmation.
    pub fn reload(&mut self) {
        let stored = match with_retry("load", || self.store.load()) {
            Ok(Some(stored)) => stored,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to load calibration: {}. Keeping in-memory state.", e);
                return;
            }
        };
        if stored == self.current {
            return;
        }
        if self.current.is_manual() && !stored.is_manual() {
            warn!(
                "Stored calibration is {} but a manual one is in effect; keeping manual",
                stored.source
            );
            return;
        }
        if self.unsaved && !stored.is_manual() {
            debug!("Ignoring stale stored calibration while a newer one is unsaved");
            return;
        }
        info!(
            "Calibration reloaded: {:?} flipped={} ({})",
            stored.region, stored.orientation.pieces_flipped, stored.source
        );
        self.current = stored;
        self.unsaved = false;
    }

    /// Returns the calibration to use for `frame`, localizing the board only when no
    /// manual calibration is in effect. `None` only when nothing usable exists at all.
    pub fn ensure_calibrated(&mut self, frame: &RgbaImage) -> Option<Calibration> {
        if self.unsaved {
            self.persist();
        }
        self.reload();

        let (width, height) = frame.dimensions();
        if self.current.is_manual() && self.current.is_usable() {
            if !self.current.region.fits(width, height) {
                warn!(
                    "Manual region {:?} does not fit the {}x{} frame; recalibrate manually",
                    self.current.region, width, height
                );
            }
            return Some(self.current);
        }

        match self.locator.locate(frame) {
            Ok(found) => {
                let next = Calibration {
                    region: found.region,
                    orientation: found.orientation,
                    source: CalibrationSource::AutoDetected,
                };
                if next != self.current {
                    info!(
                        "Board auto-detected via {}: {:?} flipped={}",
                        found.strategy, next.region, next.orientation.pieces_flipped
                    );
                    self.current = next;
                    self.persist();
                }
                Some(self.current)
            }
            Err(e) => {
                warn!("Board localization failed: {}", e);
                self.current.is_usable().then_some(self.current)
            }
        }
    }

    /// Accepts a user-supplied region. Always wins over whatever was there before.
    /// Rejects regions whose edges overflow or whose cells are too small to sample.
    pub fn confirm_manual(
        &mut self,
        region: BoardRegion,
        reference_side_at_bottom: bool,
    ) -> Result<Calibration, CalibrationError> {
        if !region.is_addressable() {
            return Err(CalibrationError::InvalidRegion(region));
        }
        let minimum = 8 * MIN_CELL_PX;
        if region.size < minimum {
            return Err(CalibrationError::RegionTooSmall {
                size: region.size,
                minimum,
            });
        }
        self.current = Calibration {
            region,
            orientation: Orientation {
                pieces_flipped: !reference_side_at_bottom,
            },
            source: CalibrationSource::ManuallyConfirmed,
        };
        info!(
            "Manual calibration confirmed: {:?} flipped={}",
            region, self.current.orientation.pieces_flipped
        );
        self.persist();
        Ok(self.current)
    }

    /// Drops the calibration entirely (explicit user action).
    pub fn forget(&mut self) {
        self.current = Calibration::default();
        info!("Calibration cleared");
        self.persist();
    }

    fn persist(&mut self) {
        let calibration = self.current;
        match with_retry("save", || self.store.save(&calibration)) {
            Ok(()) => self.unsaved = false,
            Err(e) => {
                error!("Failed to save calibration: {}. Will retry next cycle.", e);
                self.unsaved = true;
            }
        }
    }
}

/// One retry, then give up.
fn with_retry<T>(what: &str, mut op: impl FnMut() -> Result<T, StoreError>) -> Result<T, StoreError> {
    match op() {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("Calibration {} failed ({}), retrying once", what, e);
            op()
        }
    }
}
