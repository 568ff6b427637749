//! Board localization from a single full-screen frame, with no prior state.
//!
//! Primary path is geometric: Canny edges → Hough lines → measured segments, keeping
//! near-horizontal and near-vertical ones; the outermost segments bound the board.
//! When that result is implausibly small, a texture scan over a centred band picks the
//! vertical offset whose 8x8 cell means vary the most (alternating squares). If nothing
//! clears the noise floor, a fixed heuristic region is returned so callers always get
//! something usable.
//!
//! All work happens on a downscaled grayscale copy; results are scaled back to frame pixels.

use image::{GrayImage, Luma, RgbaImage};
use imageproc::definitions::Image;
use imageproc::edges::canny;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use tracing::{debug, trace};

use crate::config::LocateConfig;
use crate::error::LocalizeError;
use crate::geometry::{BoardRegion, Orientation};
use crate::imaging::{self, Rect};

/// Frames smaller than this cannot hold a readable board.
pub const MIN_FRAME_DIMENSION: u32 = 64;
const MIN_ANALYSIS_DIMENSION: u32 = 16;
const SEGMENT_GAP_TOLERANCE: u32 = 6;

/// How a region was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocateStrategy {
    Geometric,
    TextureScan,
    HeuristicDefault,
}

impl std::fmt::Display for LocateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocateStrategy::Geometric => write!(f, "geometric (line detection)"),
            LocateStrategy::TextureScan => write!(f, "texture scan"),
            LocateStrategy::HeuristicDefault => write!(f, "heuristic default"),
        }
    }
}

/// A best-guess board placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Localization {
    pub region: BoardRegion,
    pub orientation: Orientation,
    pub strategy: LocateStrategy,
}

/// Anything that can find a board in a frame.
pub trait Locate {
    fn locate(&self, frame: &RgbaImage) -> Result<Localization, LocalizeError>;
}

#[derive(Clone, Debug, Default)]
pub struct BoardLocalizer {
    config: LocateConfig,
}

impl Locate for BoardLocalizer {
    fn locate(&self, frame: &RgbaImage) -> Result<Localization, LocalizeError> {
        BoardLocalizer::locate(self, frame)
    }
}

impl BoardLocalizer {
    pub fn new(config: LocateConfig) -> Self {
        Self { config }
    }

    pub fn locate(&self, frame: &RgbaImage) -> Result<Localization, LocalizeError> {
        let (width, height) = frame.dimensions();
        if width < MIN_FRAME_DIMENSION || height < MIN_FRAME_DIMENSION {
            return Err(LocalizeError::FrameTooSmall {
                width,
                height,
                min: MIN_FRAME_DIMENSION,
            });
        }

        let gray = imaging::luma(frame);
        let (analysis, scale) = imaging::downscale(&gray, self.config.analysis_max_dimension);
        if analysis.width() < MIN_ANALYSIS_DIMENSION || analysis.height() < MIN_ANALYSIS_DIMENSION {
            return Err(LocalizeError::ImageProcessing(format!(
                "analysis image {}x{} is too small; raise analysis_max_dimension",
                analysis.width(),
                analysis.height()
            )));
        }

        let (analysis_region, strategy) = match self.geometric_pass(&analysis) {
            Some(region) => (region, LocateStrategy::Geometric),
            None => self.texture_scan(&analysis),
        };

        let region = scale_to_frame(analysis_region, scale, width, height);
        if region.is_degenerate() {
            return Err(LocalizeError::NoGeometry);
        }

        let orientation = detect_orientation(&gray, &region);
        debug!(
            "Board located via {}: {:?}, flipped={}",
            strategy, region, orientation.pieces_flipped
        );
        Ok(Localization {
            region,
            orientation,
            strategy,
        })
    }

    /// Line-based localization on an analysis image. `None` when no plausible square is found.
    pub fn geometric_pass(&self, gray: &GrayImage) -> Option<BoardRegion> {
        let cfg = &self.config;
        let (width, height) = gray.dimensions();
        let shorter = width.min(height) as f32;

        let edges = canny(gray, cfg.canny_low, cfg.canny_high);
        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold: cfg.hough_vote_threshold,
                suppression_radius: cfg.hough_suppression_radius,
            },
        );
        trace!("Hough produced {} lines", lines.len());

        let min_length = shorter * cfg.min_line_length;
        let mut top = f32::INFINITY;
        let mut bottom = f32::NEG_INFINITY;
        let mut left = f32::INFINITY;
        let mut right = f32::NEG_INFINITY;
        let (mut horizontals, mut verticals) = (0usize, 0usize);

        for line in &lines {
            let Some(segment) = measure_segment(&edges, line) else {
                continue;
            };
            if segment.length() < min_length {
                continue;
            }
            match segment.axis(cfg.angle_tolerance_deg) {
                Some(Axis::Horizontal) => {
                    horizontals += 1;
                    top = top.min(segment.y0.min(segment.y1));
                    bottom = bottom.max(segment.y0.max(segment.y1));
                }
                Some(Axis::Vertical) => {
                    verticals += 1;
                    left = left.min(segment.x0.min(segment.x1));
                    right = right.max(segment.x0.max(segment.x1));
                }
                None => {}
            }
        }
        debug!(
            "Geometric pass: {} horizontal, {} vertical segments",
            horizontals, verticals
        );
        if horizontals < 2 || verticals < 2 {
            return None;
        }

        let size = (right - left).min(bottom - top);
        if size < shorter * cfg.min_board_fraction {
            debug!(
                "Geometric board {:.0}px below plausibility ({:.0}px), falling back",
                size,
                shorter * cfg.min_board_fraction
            );
            return None;
        }

        Some(BoardRegion::new(
            left.max(0.0).round() as u32,
            top.max(0.0).round() as u32,
            size.round() as u32,
        ))
    }

    /// Texture scan over a horizontally centred band. Always returns a region.
    pub fn texture_scan(&self, gray: &GrayImage) -> (BoardRegion, LocateStrategy) {
        let cfg = &self.config;
        let (width, height) = gray.dimensions();
        let size = ((width as f32 * cfg.scan_board_width).round() as u32)
            .min(width)
            .min(height)
            .max(8);
        let x0 = (width - size) / 2;
        let max_y = height - size;

        let first = ((height as f32 * cfg.scan_top).round() as u32).min(max_y);
        let last = ((height as f32 * cfg.scan_bottom).round() as u32).min(max_y);
        let step = cfg.scan_step_px.max(1);

        let table = imaging::summed_area(gray);
        let mut best: Option<(u32, f64)> = None;
        let mut y = first;
        while y <= last {
            if let Some(score) = cell_mean_variance(&table, x0, y, size) {
                trace!("Texture scan y={} variance={:.1}", y, score);
                if score > cfg.variance_noise_floor && best.is_none_or(|(_, s)| score > s) {
                    best = Some((y, score));
                }
            }
            y += step;
        }

        match best {
            Some((y, score)) => {
                debug!("Texture scan picked y={} (variance {:.1})", y, score);
                (BoardRegion::new(x0, y, size), LocateStrategy::TextureScan)
            }
            None => {
                let y = ((height as f32 * cfg.default_top).round() as u32).min(max_y);
                debug!("Texture scan found nothing above the noise floor; using default y={}", y);
                (BoardRegion::new(x0, y, size), LocateStrategy::HeuristicDefault)
            }
        }
    }
}

/// Variance of the 64 cell means of a candidate board at `(x0, y0)`.
fn cell_mean_variance(table: &Image<Luma<u64>>, x0: u32, y0: u32, size: u32) -> Option<f64> {
    let cell = size / 8;
    if cell == 0 {
        return None;
    }
    let mut means = [0f64; 64];
    for row in 0..8 {
        for col in 0..8 {
            means[(row * 8 + col) as usize] =
                imaging::area_mean(table, Rect::new(x0 + col * cell, y0 + row * cell, cell, cell))?;
        }
    }
    let avg = means.iter().sum::<f64>() / 64.0;
    Some(means.iter().map(|m| (m - avg).powi(2)).sum::<f64>() / 64.0)
}

/// Brighter of the bottom-two-rank band and top-two-rank band is taken as the light side.
/// Any sampling problem means "not flipped".
pub fn detect_orientation(gray: &GrayImage, region: &BoardRegion) -> Orientation {
    let band = region.cell_size() * 2;
    if band == 0 || !region.fits(gray.width(), gray.height()) {
        return Orientation::default();
    }
    let top = Rect::new(region.origin_x, region.origin_y, region.size, band);
    let bottom = Rect::new(
        region.origin_x,
        region.origin_y + region.size - band,
        region.size,
        band,
    );
    match (imaging::patch_stats(gray, top), imaging::patch_stats(gray, bottom)) {
        (Some(top), Some(bottom)) => {
            trace!("Orientation bands: top={:.1} bottom={:.1}", top.mean, bottom.mean);
            Orientation {
                pieces_flipped: top.mean > bottom.mean,
            }
        }
        _ => Orientation::default(),
    }
}

fn scale_to_frame(region: BoardRegion, scale: f32, width: u32, height: u32) -> BoardRegion {
    let x = ((region.origin_x as f32 * scale).round() as u32).min(width);
    let y = ((region.origin_y as f32 * scale).round() as u32).min(height);
    let size = ((region.size as f32 * scale).round() as u32)
        .min(width - x)
        .min(height - y);
    BoardRegion::new(x, y, size)
}

// *************** Segments ***************

enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

impl Segment {
    fn length(&self) -> f32 {
        ((self.x1 - self.x0).powi(2) + (self.y1 - self.y0).powi(2)).sqrt()
    }

    /// Direction angle in [0, 180) classified against the tolerance.
    fn axis(&self, tolerance_deg: f32) -> Option<Axis> {
        let angle = (self.y1 - self.y0)
            .atan2(self.x1 - self.x0)
            .to_degrees()
            .rem_euclid(180.0);
        if angle <= tolerance_deg || angle >= 180.0 - tolerance_deg {
            Some(Axis::Horizontal)
        } else if (angle - 90.0).abs() <= tolerance_deg {
            Some(Axis::Vertical)
        } else {
            None
        }
    }
}

/// Walks a Hough line across the edge map and returns its longest run of edge pixels,
/// bridging gaps up to `SEGMENT_GAP_TOLERANCE`.
fn measure_segment(edges: &GrayImage, line: &PolarLine) -> Option<Segment> {
    let (width, height) = edges.dimensions();
    let theta = (line.angle_in_degrees as f32).to_radians();
    let (sin_t, cos_t) = theta.sin_cos();
    // foot of the normal, and the direction along the line
    let (px, py) = (line.r * cos_t, line.r * sin_t);
    let (dx, dy) = (-sin_t, cos_t);

    let diag = ((width as f32).powi(2) + (height as f32).powi(2)).sqrt();
    let steps = (2.0 * diag).ceil() as i32;

    let is_edge = |x: f32, y: f32| {
        // one pixel of slack across the line for rounding
        (-1..=1).any(|k| {
            let sx = (x + k as f32 * cos_t).round();
            let sy = (y + k as f32 * sin_t).round();
            sx >= 0.0
                && sy >= 0.0
                && (sx as u32) < width
                && (sy as u32) < height
                && edges.get_pixel(sx as u32, sy as u32)[0] > 0
        })
    };

    let mut best: Option<(f32, f32)> = None;
    let mut run: Option<(f32, f32)> = None;
    for i in 0..=steps {
        let t = -diag + i as f32;
        if !is_edge(px + t * dx, py + t * dy) {
            continue;
        }
        run = match run {
            Some((start, last)) if t - last <= (SEGMENT_GAP_TOLERANCE + 1) as f32 => Some((start, t)),
            Some(done) => {
                best = longer(best, done);
                Some((t, t))
            }
            None => Some((t, t)),
        };
    }
    if let Some(done) = run {
        best = longer(best, done);
    }

    let (t0, t1) = best?;
    if t1 <= t0 {
        return None;
    }
    Some(Segment {
        x0: px + t0 * dx,
        y0: py + t0 * dy,
        x1: px + t1 * dx,
        y1: py + t1 * dy,
    })
}

fn longer(best: Option<(f32, f32)>, candidate: (f32, f32)) -> Option<(f32, f32)> {
    match best {
        Some((s, e)) if e - s >= candidate.1 - candidate.0 => Some((s, e)),
        _ => Some(candidate),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;

    pub const BACKGROUND: u8 = 40;
    pub const LIGHT: u8 = 235;
    pub const DARK: u8 = 120;

    /// A plain screen with a checkerboard at `region`, light square at the top-left.
    pub fn board_frame(width: u32, height: u32, region: BoardRegion) -> RgbaImage {
        let cell = region.size / 8;
        RgbaImage::from_fn(width, height, |x, y| {
            if !region.contains(x, y) {
                return Rgba([BACKGROUND, BACKGROUND, BACKGROUND, 255]);
            }
            let col = ((x - region.origin_x) / cell).min(7);
            let row = ((y - region.origin_y) / cell).min(7);
            let v = if (col + row) % 2 == 0 { LIGHT } else { DARK };
            Rgba([v, v, v, 255])
        })
    }

    /// Paints a filled disc in the middle of a screen cell.
    pub fn paint_piece(frame: &mut RgbaImage, region: BoardRegion, col: u32, row: u32, shade: u8) {
        let cell = region.size / 8;
        let cx = region.origin_x + col * cell + cell / 2;
        let cy = region.origin_y + row * cell + cell / 2;
        let radius = (cell / 3) as i64;
        for y in cy - radius as u32..=cy + radius as u32 {
            for x in cx - radius as u32..=cx + radius as u32 {
                let (ddx, ddy) = (x as i64 - cx as i64, y as i64 - cy as i64);
                if ddx * ddx + ddy * ddy <= radius * radius {
                    frame.put_pixel(x, y, Rgba([shade, shade, shade, 255]));
                }
            }
        }
    }

    fn assert_close(a: BoardRegion, b: BoardRegion, tolerance: u32) {
        assert!(
            a.origin_x.abs_diff(b.origin_x) <= tolerance
                && a.origin_y.abs_diff(b.origin_y) <= tolerance
                && a.size.abs_diff(b.size) <= tolerance,
            "{a:?} not within {tolerance}px of {b:?}"
        );
    }

    #[test]
    fn test_locate_geometric_board() {
        let truth = BoardRegion::new(45, 400, 800);
        let frame = board_frame(900, 1600, truth);
        let found = BoardLocalizer::default().locate(&frame).unwrap();
        assert_eq!(found.strategy, LocateStrategy::Geometric);
        assert_close(found.region, truth, 12);
        assert!(found.region.fits(900, 1600));
    }

    #[test]
    fn test_small_geometry_falls_back_to_texture_scan() {
        // a tiny board is below the plausibility threshold
        let frame = board_frame(900, 1600, BoardRegion::new(400, 100, 96));
        let localizer = BoardLocalizer::default();
        let analysis = imaging::downscale(&imaging::luma(&frame), 800).0;
        assert!(localizer.geometric_pass(&analysis).is_none());

        let found = localizer.locate(&frame).unwrap();
        assert_ne!(found.strategy, LocateStrategy::Geometric);
        assert!(!found.region.is_degenerate());
        assert!(found.region.fits(900, 1600));
    }

    #[test]
    fn test_texture_scan_finds_centred_board() {
        let config = LocateConfig::default();
        let (width, height) = (400u32, 800u32);
        let size = (width as f32 * config.scan_board_width).round() as u32;
        let truth = BoardRegion::new((width - size) / 2, 200, size);
        let gray = imaging::luma(&board_frame(width, height, truth));

        let (region, strategy) = BoardLocalizer::new(config).texture_scan(&gray);
        assert_eq!(strategy, LocateStrategy::TextureScan);
        assert_eq!(region.origin_x, truth.origin_x);
        assert_eq!(region.size, truth.size);
        assert!(region.origin_y.abs_diff(200) <= 4, "{region:?}");
    }

    #[test]
    fn test_blank_frame_gets_heuristic_default() {
        let frame = RgbaImage::from_pixel(1080, 1920, Rgba([30, 30, 30, 255]));
        let found = BoardLocalizer::default().locate(&frame).unwrap();
        assert_eq!(found.strategy, LocateStrategy::HeuristicDefault);
        assert!(found.region.fits(1080, 1920));
        assert!(!found.region.is_degenerate());
        assert_eq!(found.orientation, Orientation::default());
    }

    #[test]
    fn test_tiny_frame_is_rejected() {
        let frame = RgbaImage::new(32, 900);
        assert!(matches!(
            BoardLocalizer::default().locate(&frame),
            Err(LocalizeError::FrameTooSmall { .. })
        ));
    }

    #[test]
    fn test_orientation_from_piece_brightness() {
        let region = BoardRegion::new(0, 0, 400);
        let mut frame = board_frame(400, 400, region);
        for col in 0..8 {
            for row in [0, 1] {
                paint_piece(&mut frame, region, col, row, 15);
            }
            for row in [6, 7] {
                paint_piece(&mut frame, region, col, row, 250);
            }
        }
        let gray = imaging::luma(&frame);
        assert_eq!(detect_orientation(&gray, &region), Orientation::WHITE_AT_BOTTOM);

        let flipped = image::imageops::flip_vertical(&gray);
        assert_eq!(detect_orientation(&flipped, &region), Orientation::BLACK_AT_BOTTOM);
    }

    #[test]
    fn test_orientation_defaults_on_bad_region() {
        let gray = GrayImage::from_pixel(100, 100, Luma([200]));
        assert_eq!(
            detect_orientation(&gray, &BoardRegion::new(50, 50, 100)),
            Orientation::default()
        );
        assert_eq!(detect_orientation(&gray, &BoardRegion::UNSET), Orientation::default());
    }

    #[test]
    fn test_segment_axis_classification() {
        let horizontal = Segment { x0: 0.0, y0: 10.0, x1: 100.0, y1: 14.0 };
        let vertical = Segment { x0: 10.0, y0: 100.0, x1: 14.0, y1: 0.0 };
        let diagonal = Segment { x0: 0.0, y0: 0.0, x1: 100.0, y1: 100.0 };
        assert!(matches!(horizontal.axis(5.0), Some(Axis::Horizontal)));
        assert!(matches!(vertical.axis(5.0), Some(Axis::Vertical)));
        assert!(diagonal.axis(5.0).is_none());
    }
}
