//! Screen capture module
//! Frames come from `xcap` (primary display) or from screenshot files on disk.
//! This crate only reads frames; cropping to the board happens in `diff`.
//! Permissions note: On macOS, grant "Screen & System Audio Recording" permission to the
//! terminal in System Settings > Privacy & Security.

use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use image::RgbaImage;
use tracing::{debug, trace};
use xcap::Monitor;

/// One full-screen raster.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbaImage,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Time since the frame was grabbed.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// Produces frames on demand.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Primary monitor via `xcap`.
/// Debug: set `DEBUG_CAPTURE=1` to save every frame to `screenshots/debug_frame.png`.
#[derive(Debug, Default)]
pub struct ScreenCapture;

impl ScreenCapture {
    pub fn new() -> Self {
        Self
    }
}

impl FrameSource for ScreenCapture {
    fn next_frame(&mut self) -> Result<Frame> {
        let start = Instant::now();

        let monitors = Monitor::all().context("Failed to enumerate monitors")?;
        let primary_monitor = monitors.first().context("No monitors found")?;

        let image = primary_monitor.capture_image().context(
            "Failed to capture image. On macOS, ensure the terminal has Screen Recording permission in System Settings > Privacy & Security > Screen & System Audio Recording",
        )?;
        if image.dimensions() == (0, 0) {
            bail!("Captured empty screenshot - possible permission issue or no display");
        }

        if env::var_os("DEBUG_CAPTURE").is_some() {
            fs::create_dir_all("screenshots").context("Failed to create screenshots/ debug directory")?;
            image
                .save("screenshots/debug_frame.png")
                .context("Failed to save debug frame to screenshots/")?;
        }

        trace!("Capture latency: {:?}", start.elapsed());

        Ok(Frame {
            image,
            captured_at: start,
        })
    }
}

/// Screenshots on disk, played back in order. The last one repeats once the list runs out.
#[derive(Debug)]
pub struct ImageFileSource {
    pending: VecDeque<PathBuf>,
    last: Option<RgbaImage>,
}

impl ImageFileSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            pending: paths.into_iter().map(Into::into).collect(),
            last: None,
        }
    }
}

impl FrameSource for ImageFileSource {
    fn next_frame(&mut self) -> Result<Frame> {
        if let Some(path) = self.pending.pop_front() {
            let image = load_frame(&path)?;
            debug!("Loaded frame {} ({}x{})", path.display(), image.width(), image.height());
            self.last = Some(image);
        }
        match &self.last {
            Some(image) => Ok(Frame::new(image.clone())),
            None => bail!("No screenshot files to read"),
        }
    }
}

/// Reads any image format `image` understands as an RGBA frame.
pub fn load_frame(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open screenshot {}", path.display()))?
        .to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        bail!("Screenshot {} is empty", path.display());
    }
    Ok(image)
}
