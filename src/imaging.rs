//! Small raster helpers shared by the localizer and the differencer.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, sum_image_pixels};

/// Single-channel intensity image of a frame.
pub fn luma(frame: &RgbaImage) -> GrayImage {
    imageops::grayscale(frame)
}

/// Downscales so the longer side is at most `max_dimension`.
/// Returns the image and the factor to multiply analysis coordinates by to get frame coordinates.
pub fn downscale(gray: &GrayImage, max_dimension: u32) -> (GrayImage, f32) {
    let longest = gray.width().max(gray.height());
    if max_dimension == 0 || longest <= max_dimension {
        return (gray.clone(), 1.0);
    }
    let scale = longest as f32 / max_dimension as f32;
    let w = ((gray.width() as f32 / scale).round() as u32).max(1);
    let h = ((gray.height() as f32 / scale).round() as u32).max(1);
    (imageops::resize(gray, w, h, FilterType::Triangle), scale)
}

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Shrinks by `fraction` of the width/height on every side; never below 1x1.
    pub fn inset(&self, fraction: f32) -> Rect {
        let dx = (self.width as f32 * fraction.clamp(0.0, 0.49)) as u32;
        let dy = (self.height as f32 * fraction.clamp(0.0, 0.49)) as u32;
        Rect::new(
            self.x + dx,
            self.y + dy,
            (self.width - 2 * dx).max(1),
            (self.height - 2 * dy).max(1),
        )
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

/// Mean and standard deviation of intensity over a patch.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PatchStats {
    pub mean: f32,
    pub std_dev: f32,
}

/// `None` when the rectangle is empty or leaves the image.
pub fn patch_stats(img: &GrayImage, rect: Rect) -> Option<PatchStats> {
    if !rect.fits(img.width(), img.height()) {
        return None;
    }
    let mut sum = 0u64;
    let mut sum_sq = 0u64;
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            let v = img.get_pixel(x, y)[0] as u64;
            sum += v;
            sum_sq += v * v;
        }
    }
    let n = rect.area() as f64;
    let mean = sum as f64 / n;
    let variance = (sum_sq as f64 / n - mean * mean).max(0.0);
    Some(PatchStats {
        mean: mean as f32,
        std_dev: variance.sqrt() as f32,
    })
}

/// Mean absolute per-pixel difference between the same rectangle of two equally sized images.
pub fn mean_abs_diff(a: &GrayImage, b: &GrayImage, rect: Rect) -> Option<f32> {
    if a.dimensions() != b.dimensions() || !rect.fits(a.width(), a.height()) {
        return None;
    }
    let mut total = 0u64;
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            total += a.get_pixel(x, y)[0].abs_diff(b.get_pixel(x, y)[0]) as u64;
        }
    }
    Some((total as f64 / rect.area() as f64) as f32)
}

/// Summed-area table of `img` for constant-time rectangle means.
pub fn summed_area(img: &GrayImage) -> Image<Luma<u64>> {
    integral_image::<_, u64>(img)
}

/// Mean over `rect` of the image `table` was built from.
/// `None` when it is empty or leaves the image.
pub fn area_mean(table: &Image<Luma<u64>>, rect: Rect) -> Option<f64> {
    // one extra zero row and column
    let (width, height) = (table.width().saturating_sub(1), table.height().saturating_sub(1));
    if !rect.fits(width, height) {
        return None;
    }
    let total = sum_image_pixels(
        table,
        rect.x,
        rect.y,
        rect.x + rect.width - 1,
        rect.y + rect.height - 1,
    )[0];
    Some(total as f64 / rect.area() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_mean_matches_patch_stats() {
        let img = GrayImage::from_fn(37, 23, |x, y| Luma([((x * 7 + y * 13) % 251) as u8]));
        let table = summed_area(&img);
        for rect in [Rect::new(0, 0, 37, 23), Rect::new(3, 5, 10, 7), Rect::new(36, 22, 1, 1)] {
            let expected = patch_stats(&img, rect).unwrap().mean as f64;
            let got = area_mean(&table, rect).unwrap();
            assert!((expected - got).abs() < 1e-3, "{rect:?}: {expected} vs {got}");
        }
        assert!(area_mean(&table, Rect::new(30, 0, 8, 1)).is_none());
        assert!(area_mean(&table, Rect::new(0, 0, 0, 4)).is_none());
    }

    #[test]
    fn test_patch_stats_uniform() {
        let img = GrayImage::from_pixel(10, 10, Luma([120]));
        let stats = patch_stats(&img, Rect::new(2, 2, 5, 5)).unwrap();
        assert_eq!(stats.mean, 120.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_patch_stats_two_tone() {
        // half 0, half 200 → mean 100, std 100
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 200 }]));
        let stats = patch_stats(&img, Rect::new(0, 0, 10, 10)).unwrap();
        assert!((stats.mean - 100.0).abs() < 1e-4);
        assert!((stats.std_dev - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_patch_stats_out_of_bounds() {
        let img = GrayImage::new(10, 10);
        assert!(patch_stats(&img, Rect::new(8, 8, 5, 5)).is_none());
        assert!(patch_stats(&img, Rect::new(0, 0, 0, 5)).is_none());
    }

    #[test]
    fn test_mean_abs_diff() {
        let a = GrayImage::from_pixel(8, 8, Luma([100]));
        let b = GrayImage::from_pixel(8, 8, Luma([90]));
        assert_eq!(mean_abs_diff(&a, &b, Rect::new(0, 0, 8, 8)), Some(10.0));
        assert_eq!(mean_abs_diff(&b, &a, Rect::new(0, 0, 8, 8)), Some(10.0));
        assert_eq!(mean_abs_diff(&a, &GrayImage::new(4, 4), Rect::new(0, 0, 4, 4)), None);
    }

    #[test]
    fn test_inset() {
        let r = Rect::new(100, 100, 100, 100).inset(0.1);
        assert_eq!(r, Rect::new(110, 110, 80, 80));
        assert_eq!(Rect::new(0, 0, 3, 3).inset(0.45), Rect::new(1, 1, 1, 1));
    }

    #[test]
    fn test_downscale() {
        let img = GrayImage::new(1600, 900);
        let (small, scale) = downscale(&img, 800);
        assert_eq!(small.dimensions(), (800, 450));
        assert_eq!(scale, 2.0);

        let (same, scale) = downscale(&img, 2000);
        assert_eq!(same.dimensions(), (1600, 900));
        assert_eq!(scale, 1.0);
    }
}
