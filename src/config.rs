//! Config module.
//! Two files live in the config directory:
//! - `config.json`: detection tunables (thresholds, timings, engine endpoint). Missing or
//!   broken files fall back to defaults so a bad edit never stops the watcher.
//! - `calibration.json`: the persisted calibration triple (region, orientation, source),
//!   always written whole through a temp file + atomic rename.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::PlayerSide;
use crate::calibrate::Calibration;
use crate::error::StoreError;

pub const CONFIG_FILE: &str = "config.json";
pub const CALIBRATION_FILE: &str = "calibration.json";
const CONFIG_DIR_ENV: &str = "BOARDSIGHT_CONFIG_DIR";

// *************** Tunables ***************

/// Frame differencing thresholds. Values are 0-255 intensity units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// A cell counts as changed only when its mean absolute difference is strictly above this
    pub sensitivity: f32,
    /// Std-dev change (either sign) needed to call a changed cell vacated or newly occupied
    pub texture_delta: f32,
    /// Std-dev above which a cell is considered to hold a piece
    pub occupied_std_dev: f32,
    /// Fraction of the cell trimmed from each side before sampling (grid lines, highlights)
    pub cell_inset: f32,
    /// More changed cells than this is treated as an animation or re-render
    pub max_changed_cells: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            sensitivity: 18.0,
            texture_delta: 6.0,
            occupied_std_dev: 14.0,
            cell_inset: 0.12,
            max_changed_cells: 4,
        }
    }
}

/// Board localization parameters. Pixel values are in the downscaled analysis image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocateConfig {
    pub analysis_max_dimension: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_vote_threshold: u32,
    pub hough_suppression_radius: u32,
    /// Minimum segment length as a fraction of the shorter frame side
    pub min_line_length: f32,
    pub angle_tolerance_deg: f32,
    /// Plausibility: board side must be at least this fraction of the shorter frame side
    pub min_board_fraction: f32,
    /// Texture scan: board width as a fraction of screen width (horizontally centred)
    pub scan_board_width: f32,
    /// Texture scan search window, as fractions of screen height
    pub scan_top: f32,
    pub scan_bottom: f32,
    pub scan_step_px: u32,
    /// Minimum variance for a scanned offset to count as a board
    pub variance_noise_floor: f64,
    /// Heuristic default board top when nothing clears the noise floor
    pub default_top: f32,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            analysis_max_dimension: 800,
            canny_low: 40.0,
            canny_high: 100.0,
            hough_vote_threshold: 120,
            hough_suppression_radius: 8,
            min_line_length: 0.25,
            angle_tolerance_deg: 5.0,
            min_board_fraction: 0.3,
            scan_board_width: 0.9,
            scan_top: 0.15,
            scan_bottom: 0.35,
            scan_step_px: 4,
            variance_noise_floor: 150.0,
            default_top: 0.25,
        }
    }
}

/// Polling loop and remote engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
    /// Wait after a synthetic move before taking a fresh baseline
    pub settle_ms: u64,
    pub engine_url: String,
    pub engine_color: PlayerSide,
    pub request_timeout_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            settle_ms: 400,
            engine_url: "http://127.0.0.1:5000".to_string(),
            engine_color: PlayerSide::Black,
            request_timeout_secs: 30,
        }
    }
}

/// Everything in `config.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub diff: DiffConfig,
    pub locate: LocateConfig,
    pub watch: WatchConfig,
}

/// Resolves the config directory: explicit flag, then `BOARDSIGHT_CONFIG_DIR`,
/// then the platform config dir, then `./.boardsight`.
pub fn config_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .map(|d| d.join("boardsight"))
        .unwrap_or_else(|| PathBuf::from(".boardsight"))
}

/// Loads `config.json` from `dir`, or defaults.
pub fn load_tunables(dir: &Path) -> Tunables {
    let path = dir.join(CONFIG_FILE);
    match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(tunables) => {
                info!("Config loaded from {}", path.display());
                tunables
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                Tunables::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found. Using default config.", path.display());
            Tunables::default()
        }
        Err(e) => {
            warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            Tunables::default()
        }
    }
}

// *************** Calibration Store ***************

/// Durable home of the calibration triple. Implementations must write it as one unit.
pub trait CalibrationStore {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<Calibration>, StoreError>;
    fn save(&self, calibration: &Calibration) -> Result<(), StoreError>;
}

/// `calibration.json` in the config directory.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CALIBRATION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStore for JsonFileStore {
    fn load(&self) -> Result<Option<Calibration>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, calibration: &Calibration) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Same directory so the rename stays on one filesystem
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), calibration)?;
        tmp.as_file_mut().write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!("Calibration written to {}", self.path.display());
        Ok(())
    }
}
