//! Board geometry: where the board sits on screen and which way it faces.
//! Maps algebraic squares to on-screen pixel centres and back.
//! Files (a-h) never mirror; only the rank axis flips with orientation.

use serde::{Deserialize, Serialize};
use shakmaty::Square;

/// Square area of the screen believed to hold the 8x8 board, in full-screen pixels.
/// `size == 0` means "uncalibrated".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardRegion {
    pub origin_x: u32,
    pub origin_y: u32,
    /// Width and height of the board (the board is square on screen)
    pub size: u32,
}

impl BoardRegion {
    pub const fn new(origin_x: u32, origin_y: u32, size: u32) -> Self {
        Self { origin_x, origin_y, size }
    }

    /// The "not calibrated" region.
    pub const UNSET: Self = Self::new(0, 0, 0);

    pub fn is_degenerate(&self) -> bool {
        self.size == 0
    }

    /// Non-degenerate, and its far edges are representable pixel coordinates.
    pub fn is_addressable(&self) -> bool {
        !self.is_degenerate()
            && self.origin_x.checked_add(self.size).is_some()
            && self.origin_y.checked_add(self.size).is_some()
    }

    /// Non-degenerate and entirely inside a `width` x `height` frame.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        !self.is_degenerate()
            && self.origin_x.checked_add(self.size).is_some_and(|r| r <= width)
            && self.origin_y.checked_add(self.size).is_some_and(|b| b <= height)
    }

    /// Side length of one cell. Integer pixels; any remainder strip belongs to the last rank/file.
    pub fn cell_size(&self) -> u32 {
        self.size / 8
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.origin_x
            && y >= self.origin_y
            && x - self.origin_x < self.size
            && y - self.origin_y < self.size
    }
}

/// Which side of the board faces the bottom of the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Orientation {
    /// `false`: White's ranks 1-2 are at the bottom of the screen.
    pub pieces_flipped: bool,
}

impl Orientation {
    pub const WHITE_AT_BOTTOM: Self = Self { pieces_flipped: false };
    pub const BLACK_AT_BOTTOM: Self = Self { pieces_flipped: true };

    /// Screen cell `(col, row)` of a square, row 0 at the top of the screen.
    pub fn screen_cell(&self, square: Square) -> (u32, u32) {
        let index = u32::from(square);
        let (file, rank) = (index % 8, index / 8);
        let row = if self.pieces_flipped { rank } else { 7 - rank };
        (file, row)
    }

    /// Square shown at screen cell `(col, row)`; `None` off the 8x8 grid.
    pub fn square_at(&self, col: u32, row: u32) -> Option<Square> {
        if col > 7 || row > 7 {
            return None;
        }
        let rank = if self.pieces_flipped { row } else { 7 - row };
        Some(Square::new(rank * 8 + col))
    }
}

/// Pixel centre of `square` on screen.
pub fn to_pixel(square: Square, region: &BoardRegion, orientation: Orientation) -> (u32, u32) {
    let cell = region.cell_size();
    let (col, row) = orientation.screen_cell(square);
    (
        region.origin_x + col * cell + cell / 2,
        region.origin_y + row * cell + cell / 2,
    )
}

/// Square under a screen pixel; `None` when the pixel is outside the region.
pub fn to_square(pixel: (u32, u32), region: &BoardRegion, orientation: Orientation) -> Option<Square> {
    let (x, y) = pixel;
    let cell = region.cell_size();
    if cell == 0 || !region.contains(x, y) {
        return None;
    }
    let col = ((x - region.origin_x) / cell).min(7);
    let row = ((y - region.origin_y) / cell).min(7);
    orientation.square_at(col, row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    #[test]
    fn test_scenario_white_at_bottom() {
        let region = BoardRegion::new(0, 0, 800);
        let o = Orientation::WHITE_AT_BOTTOM;
        // centre = origin + index * cell + cell / 2, cell = 100
        // e-file is column 4, rank 2 is screen row 6
        assert_eq!(to_pixel(sq("e2"), &region, o), (450, 650));
        assert_eq!(to_pixel(sq("e4"), &region, o), (450, 450));
        assert_eq!(to_pixel(sq("a8"), &region, o), (50, 50));
        assert_eq!(to_pixel(sq("h1"), &region, o), (750, 750));
        // two ranks apart on screen, same column
        let (x2, y2) = to_pixel(sq("e2"), &region, o);
        let (x4, y4) = to_pixel(sq("e4"), &region, o);
        assert_eq!(x2, x4);
        assert_eq!(y2 - y4, 200);
    }

    #[test]
    fn test_flipped_puts_rank_one_on_top() {
        let region = BoardRegion::new(100, 40, 800);
        let o = Orientation::BLACK_AT_BOTTOM;
        assert_eq!(to_pixel(sq("a1"), &region, o), (150, 90));
        assert_eq!(to_pixel(sq("h8"), &region, o), (850, 790));
    }

    #[test]
    fn test_round_trip_all_squares_both_orientations() {
        let regions = [
            BoardRegion::new(0, 0, 800),
            BoardRegion::new(37, 412, 1003),
            BoardRegion::new(5, 9, 64),
        ];
        for region in &regions {
            for o in [Orientation::WHITE_AT_BOTTOM, Orientation::BLACK_AT_BOTTOM] {
                for index in 0..64 {
                    let square = Square::new(index);
                    let pixel = to_pixel(square, region, o);
                    assert_eq!(to_square(pixel, region, o), Some(square), "{square} {region:?} {o:?}");
                }
            }
        }
    }

    #[test]
    fn test_file_never_mirrors() {
        let region = BoardRegion::new(12, 34, 640);
        for index in 0..64 {
            let square = Square::new(index);
            let (x_white, _) = to_pixel(square, &region, Orientation::WHITE_AT_BOTTOM);
            let (x_black, _) = to_pixel(square, &region, Orientation::BLACK_AT_BOTTOM);
            assert_eq!(x_white, x_black, "{square}");
        }
    }

    #[test]
    fn test_to_square_outside_region() {
        let region = BoardRegion::new(100, 100, 800);
        let o = Orientation::default();
        assert_eq!(to_square((99, 500), &region, o), None);
        assert_eq!(to_square((500, 900), &region, o), None);
        assert_eq!(to_square((900, 500), &region, o), None);
        assert_eq!(to_square((100, 100), &region, o), Some(sq("a8")));
        assert_eq!(to_square((899, 899), &region, o), Some(sq("h1")));
    }

    #[test]
    fn test_remainder_strip_maps_to_last_cell() {
        // 803 / 8 = 100, last 3 px still belong to the region
        let region = BoardRegion::new(0, 0, 803);
        assert_eq!(to_square((802, 802), &region, Orientation::default()), Some(sq("h1")));
    }

    #[test]
    fn test_degenerate_region() {
        assert_eq!(to_square((0, 0), &BoardRegion::UNSET, Orientation::default()), None);
        assert!(BoardRegion::UNSET.is_degenerate());
        assert!(!BoardRegion::UNSET.fits(1920, 1080));
    }

    #[test]
    fn test_addressable_rejects_overflowing_edges() {
        assert!(BoardRegion::new(100, 200, 800).is_addressable());
        assert!(BoardRegion::new(u32::MAX - 800, 0, 800).is_addressable());
        assert!(!BoardRegion::new(u32::MAX - 10, 0, 800).is_addressable());
        assert!(!BoardRegion::new(0, u32::MAX, 64).is_addressable());
        assert!(!BoardRegion::UNSET.is_addressable());
    }

    #[test]
    fn test_fits_frame() {
        let region = BoardRegion::new(100, 200, 800);
        assert!(region.fits(900, 1000));
        assert!(!region.fits(899, 1000));
        assert!(!region.fits(900, 999));
        assert!(!BoardRegion::new(u32::MAX, 0, 10).fits(u32::MAX, 10));
    }
}
