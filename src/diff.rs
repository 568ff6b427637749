//! Frame differencing: two successive board snapshots in, zero or more moves out.
//!
//! Each of the 64 cells is compared by mean absolute pixel difference (the change gate,
//! strict `>` against `DiffConfig::sensitivity`) and by the change in intensity std-dev
//! (texture lost → piece left, texture gained → piece arrived). Vacated cells are paired
//! greedily with the nearest newly occupied cell.
//!
//! Castling and en passant are recognised from cell patterns only, with no legality
//! checks: a best-effort heuristic, not a rules engine.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use image::{GrayImage, RgbaImage, imageops};
use shakmaty::Square;
use tracing::{debug, trace};

use crate::config::DiffConfig;
use crate::error::SnapshotError;
use crate::geometry::{BoardRegion, Orientation};
use crate::imaging::{self, PatchStats, Rect};

/// Cells narrower than this cannot be sampled meaningfully.
pub const MIN_CELL_PX: u32 = 4;
// Central patch used to tell light pieces from dark ones
const PIECE_CORE_INSET: f32 = 0.3;

// *************** Snapshot ***************

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CellState {
    #[default]
    Empty,
    OccupiedWhite,
    OccupiedBlack,
}

impl CellState {
    pub fn is_occupied(self) -> bool {
        self != CellState::Empty
    }

    fn symbol(self) -> char {
        match self {
            CellState::Empty => '.',
            CellState::OccupiedWhite => 'P',
            CellState::OccupiedBlack => 'p',
        }
    }
}

/// 8x8 view of the board region at one instant. Cells are stored in screen order
/// (row-major, top-left first), tagged with the geometry they were taken under.
#[derive(Clone, Debug)]
pub struct BoardSnapshot {
    region: BoardRegion,
    orientation: Orientation,
    board: GrayImage,
    cell_rects: [Rect; 64],
    stats: [PatchStats; 64],
    states: [CellState; 64],
}

impl BoardSnapshot {
    /// Crops `region` out of a full-screen frame.
    pub fn capture(
        frame: &RgbaImage,
        region: BoardRegion,
        orientation: Orientation,
        config: &DiffConfig,
    ) -> Result<Self, SnapshotError> {
        if region.is_degenerate() {
            return Err(SnapshotError::DegenerateRegion(region));
        }
        if !region.fits(frame.width(), frame.height()) {
            return Err(SnapshotError::RegionOutOfFrame {
                region,
                width: frame.width(),
                height: frame.height(),
            });
        }
        let crop = imageops::crop_imm(frame, region.origin_x, region.origin_y, region.size, region.size)
            .to_image();
        Self::from_board_image(imageops::grayscale(&crop), region, orientation, config)
    }

    /// Builds a snapshot from an already cropped `size` x `size` grayscale board.
    pub fn from_board_image(
        board: GrayImage,
        region: BoardRegion,
        orientation: Orientation,
        config: &DiffConfig,
    ) -> Result<Self, SnapshotError> {
        if region.is_degenerate() || board.dimensions() != (region.size, region.size) {
            return Err(SnapshotError::DegenerateRegion(region));
        }
        let cell = region.cell_size();
        if cell < MIN_CELL_PX {
            return Err(SnapshotError::EmptyCell { size: region.size });
        }

        let mut cell_rects = [Rect::new(0, 0, 0, 0); 64];
        let mut stats = [PatchStats::default(); 64];
        let mut states = [CellState::Empty; 64];
        for index in 0..64 {
            let (col, row) = (index as u32 % 8, index as u32 / 8);
            let rect = Rect::new(col * cell, row * cell, cell, cell).inset(config.cell_inset);
            let sample = imaging::patch_stats(&board, rect).ok_or(SnapshotError::EmptyCell { size: region.size })?;
            cell_rects[index] = rect;
            stats[index] = sample;
            states[index] = classify_cell(&board, rect, sample, config);
        }

        Ok(Self {
            region,
            orientation,
            board,
            cell_rects,
            stats,
            states,
        })
    }

    pub fn region(&self) -> BoardRegion {
        self.region
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Whether two snapshots were taken under the same geometry and can be compared.
    pub fn same_geometry(&self, other: &BoardSnapshot) -> bool {
        self.region == other.region
            && self.orientation == other.orientation
            && self.board.dimensions() == other.board.dimensions()
    }

    pub fn cell_state(&self, square: Square) -> CellState {
        let (col, row) = self.orientation.screen_cell(square);
        self.states[(row * 8 + col) as usize]
    }

    pub fn occupied_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_occupied()).count()
    }

    /// Screen-order text rendering, one line per screen row.
    pub fn ascii(&self) -> String {
        self.states
            .chunks(8)
            .map(|row| row.iter().map(|s| s.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn classify_cell(board: &GrayImage, rect: Rect, sample: PatchStats, config: &DiffConfig) -> CellState {
    if sample.std_dev <= config.occupied_std_dev {
        return CellState::Empty;
    }
    match imaging::patch_stats(board, rect.inset(PIECE_CORE_INSET)) {
        Some(core) if core.mean > sample.mean => CellState::OccupiedWhite,
        _ => CellState::OccupiedBlack,
    }
}

// *************** Cell comparison ***************

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Texture decreased: a piece left
    Vacated,
    /// Texture increased: a piece arrived
    Occupied,
    /// Changed, but the texture signal is inconclusive; logged only
    Ambiguous,
}

/// A cell whose mean difference cleared the sensitivity threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellChange {
    pub col: u32,
    pub row: u32,
    pub square: Square,
    pub kind: ChangeKind,
    pub mean_diff: f32,
    pub std_delta: f32,
}

impl CellChange {
    fn scan_index(&self) -> u32 {
        self.row * 8 + self.col
    }

    fn manhattan(&self, other: &CellChange) -> u32 {
        self.col.abs_diff(other.col) + self.row.abs_diff(other.row)
    }
}

/// Changed cells between two snapshots of the same geometry, in scan order.
pub fn compare(previous: &BoardSnapshot, current: &BoardSnapshot, config: &DiffConfig) -> Vec<CellChange> {
    let mut changes = Vec::new();
    for index in 0..64 {
        let rect = current.cell_rects[index];
        let Some(mean_diff) = imaging::mean_abs_diff(&previous.board, &current.board, rect) else {
            continue;
        };
        if mean_diff <= config.sensitivity {
            continue;
        }

        let std_delta = current.stats[index].std_dev - previous.stats[index].std_dev;
        let kind = if std_delta < -config.texture_delta {
            ChangeKind::Vacated
        } else if std_delta > config.texture_delta {
            ChangeKind::Occupied
        } else {
            ChangeKind::Ambiguous
        };

        let (col, row) = (index as u32 % 8, index as u32 / 8);
        let Some(square) = current.orientation.square_at(col, row) else {
            continue;
        };
        if kind == ChangeKind::Ambiguous {
            debug!(
                "Cell {} changed (diff {:.1}) but texture delta {:.1} is inconclusive",
                square, mean_diff, std_delta
            );
        }
        changes.push(CellChange {
            col,
            row,
            square,
            kind,
            mean_diff,
            std_delta,
        });
    }
    changes
}

// *************** Moves ***************

/// A move read off the screen. `special` marks castling / en passant guesses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DetectedMove {
    pub from: Square,
    pub to: Square,
    pub special: bool,
}

impl DetectedMove {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            special: false,
        }
    }
}

impl fmt::Display for DetectedMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

impl FromStr for DetectedMove {
    type Err = anyhow::Error;

    /// UCI text such as `e2e4` or `e7e8q`; the promotion piece is accepted and dropped.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            bail!("Not a UCI move: '{}'", s);
        }
        if s.len() == 5 && !matches!(&s[4..], "q" | "r" | "b" | "n") {
            bail!("Bad promotion piece in '{}'", s);
        }
        let from: Square = s[0..2].parse().with_context(|| format!("Bad from-square in '{}'", s))?;
        let to: Square = s[2..4].parse().with_context(|| format!("Bad to-square in '{}'", s))?;
        if from == to {
            bail!("Null move '{}'", s);
        }
        Ok(Self::new(from, to))
    }
}

/// Turns changed cells into moves. 0, 1, or more than `max_changed_cells` changes yield nothing.
pub fn synthesize_moves(changes: &[CellChange], config: &DiffConfig) -> Vec<DetectedMove> {
    let changed = changes.len();
    if changed < 2 || changed > config.max_changed_cells {
        debug!("{} changed cells: no move this cycle", changed);
        return Vec::new();
    }
    let special = changed > 2;
    if special {
        if let Some(mv) = castling(changes).or_else(|| en_passant(changes)) {
            return vec![mv];
        }
    }

    let vacated: Vec<&CellChange> = changes.iter().filter(|c| c.kind == ChangeKind::Vacated).collect();
    let arrived: Vec<&CellChange> = changes.iter().filter(|c| c.kind == ChangeKind::Occupied).collect();

    let mut moves = Vec::new();
    let mut vacated_used = vec![false; vacated.len()];
    // ambiguous cells were logged by `compare` and take no part in pairing
    pair_nearest(&vacated, &arrived, &mut vacated_used, special, &mut moves);

    for (cell, used) in vacated.iter().zip(&vacated_used) {
        if !used {
            debug!("Vacated {} has no partner", cell.square);
        }
    }
    moves
}

/// Greedy pairing: shortest Manhattan distance first, ties by scan order of the vacated
/// cell, then of the destination.
fn pair_nearest(
    vacated: &[&CellChange],
    targets: &[&CellChange],
    vacated_used: &mut [bool],
    special: bool,
    moves: &mut Vec<DetectedMove>,
) {
    let mut candidates: Vec<(u32, u32, u32, usize, usize)> = Vec::new();
    for (vi, from) in vacated.iter().enumerate() {
        if vacated_used[vi] {
            continue;
        }
        for (ti, to) in targets.iter().enumerate() {
            candidates.push((from.manhattan(to), from.scan_index(), to.scan_index(), vi, ti));
        }
    }
    candidates.sort_unstable();

    let mut target_used = vec![false; targets.len()];
    for (distance, _, _, vi, ti) in candidates {
        if vacated_used[vi] || target_used[ti] {
            continue;
        }
        vacated_used[vi] = true;
        target_used[ti] = true;
        trace!("Paired {} -> {} (distance {})", vacated[vi].square, targets[ti].square, distance);
        moves.push(DetectedMove {
            from: vacated[vi].square,
            to: targets[ti].square,
            special,
        });
    }
}

fn file_of(square: Square) -> u32 {
    u32::from(square) % 8
}

/// Four changes on one screen row: king leaves the e-file and a rook leaves a corner,
/// both reappearing on the king's castling side. Reported as the king move.
fn castling(changes: &[CellChange]) -> Option<DetectedMove> {
    if changes.len() != 4 || changes.iter().any(|c| c.row != changes[0].row) {
        return None;
    }
    let king = changes.iter().find(|c| file_of(c.square) == 4 && c.kind == ChangeKind::Vacated)?;
    let mut files: Vec<u32> = changes.iter().map(|c| file_of(c.square)).collect();
    files.sort_unstable();
    let to_file = match files.as_slice() {
        [4, 5, 6, 7] => 6,
        [0, 2, 3, 4] => 2,
        _ => return None,
    };
    let to = changes.iter().find(|c| file_of(c.square) == to_file)?;
    debug!("Castling pattern: {} -> {}", king.square, to.square);
    Some(DetectedMove {
        from: king.square,
        to: to.square,
        special: true,
    })
}

/// Three changes: a pawn leaves, lands diagonally, and the pawn it passed vanishes from
/// the square beside where it started.
fn en_passant(changes: &[CellChange]) -> Option<DetectedMove> {
    if changes.len() != 3 {
        return None;
    }
    let landed = changes.iter().find(|c| c.kind == ChangeKind::Occupied)?;
    let vacated: Vec<&CellChange> = changes.iter().filter(|c| c.kind == ChangeKind::Vacated).collect();
    let [a, b] = vacated.as_slice() else {
        return None;
    };
    for (from, captured) in [(a, b), (b, a)] {
        let diagonal = from.col.abs_diff(landed.col) == 1 && from.row.abs_diff(landed.row) == 1;
        let beside = captured.row == from.row && captured.col == landed.col;
        if diagonal && beside {
            debug!("En passant pattern: {} -> {}", from.square, landed.square);
            return Some(DetectedMove {
                from: from.square,
                to: landed.square,
                special: true,
            });
        }
    }
    None
}

// *************** Differencer ***************

/// Holds the rolling baseline. The first snapshot after a reset is only stored.
#[derive(Debug, Default)]
pub struct FrameDifferencer {
    config: DiffConfig,
    baseline: Option<BoardSnapshot>,
}

impl FrameDifferencer {
    pub fn new(config: DiffConfig) -> Self {
        Self {
            config,
            baseline: None,
        }
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self) -> Option<&BoardSnapshot> {
        self.baseline.as_ref()
    }

    /// Drops the baseline; the next snapshot becomes the new one silently.
    pub fn reset_baseline(&mut self) {
        if self.baseline.take().is_some() {
            debug!("Baseline discarded");
        }
    }

    /// Compares against the baseline, then keeps `snapshot` as the next baseline.
    pub fn observe(&mut self, snapshot: BoardSnapshot) -> Vec<DetectedMove> {
        let moves = match &self.baseline {
            None => {
                debug!("Establishing baseline ({} occupied cells)", snapshot.occupied_count());
                Vec::new()
            }
            Some(previous) if !previous.same_geometry(&snapshot) => {
                debug!("Board geometry changed; re-establishing baseline");
                Vec::new()
            }
            Some(previous) => {
                let changes = compare(previous, &snapshot, &self.config);
                trace!("{} changed cells", changes.len());
                synthesize_moves(&changes, &self.config)
            }
        };
        self.baseline = Some(snapshot);
        moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::tests::{board_frame, paint_piece};
    use image::Luma;

    const REGION: BoardRegion = BoardRegion::new(0, 0, 400);

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn snapshot(frame: &RgbaImage) -> BoardSnapshot {
        BoardSnapshot::capture(frame, REGION, Orientation::WHITE_AT_BOTTOM, &DiffConfig::default()).unwrap()
    }

    fn change(col: u32, row: u32, kind: ChangeKind) -> CellChange {
        CellChange {
            col,
            row,
            square: Orientation::WHITE_AT_BOTTOM.square_at(col, row).unwrap(),
            kind,
            mean_diff: 50.0,
            std_delta: 0.0,
        }
    }

    #[test]
    fn test_baseline_reset_then_single_move() {
        let before = board_frame(400, 400, REGION);
        let mut start = before.clone();
        paint_piece(&mut start, REGION, 4, 6, 15); // e2
        let mut after = before.clone();
        paint_piece(&mut after, REGION, 4, 4, 15); // e4

        let mut differ = FrameDifferencer::default();
        differ.reset_baseline();
        assert!(differ.observe(snapshot(&start)).is_empty());
        assert!(differ.has_baseline());
        assert!(differ.observe(snapshot(&start)).is_empty());

        let moves = differ.observe(snapshot(&after));
        assert_eq!(moves, vec![DetectedMove::new(sq("e2"), sq("e4"))]);
        assert_eq!(moves[0].to_string(), "e2e4");
    }

    #[test]
    fn test_unchanged_board_updates_baseline() {
        let mut first = board_frame(400, 400, REGION);
        paint_piece(&mut first, REGION, 0, 0, 15);
        // every pixel a little brighter: distinct frames, but well under the sensitivity
        let mut second = first.clone();
        for pixel in second.pixels_mut() {
            for channel in &mut pixel.0[..3] {
                *channel = channel.saturating_add(5);
            }
        }
        let expected = snapshot(&second);
        assert_ne!(snapshot(&first).board, expected.board);

        let mut differ = FrameDifferencer::default();
        differ.observe(snapshot(&first));
        assert!(differ.observe(snapshot(&second)).is_empty());
        let baseline = differ.baseline().unwrap();
        assert_eq!(baseline.board, expected.board);
        assert_eq!(baseline.occupied_count(), 1);
    }

    #[test]
    fn test_flipped_board_maps_to_black_squares() {
        let base = board_frame(400, 400, REGION);
        let mut start = base.clone();
        paint_piece(&mut start, REGION, 4, 6, 15);
        let mut after = base.clone();
        paint_piece(&mut after, REGION, 4, 4, 15);

        let config = DiffConfig::default();
        let flipped = Orientation::BLACK_AT_BOTTOM;
        let mut differ = FrameDifferencer::new(config.clone());
        differ.observe(BoardSnapshot::capture(&start, REGION, flipped, &config).unwrap());
        let moves = differ.observe(BoardSnapshot::capture(&after, REGION, flipped, &config).unwrap());
        assert_eq!(moves, vec![DetectedMove::new(sq("e7"), sq("e5"))]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let region = BoardRegion::new(0, 0, 80);
        let config = DiffConfig {
            sensitivity: 10.0,
            ..DiffConfig::default()
        };
        let flat = GrayImage::from_pixel(80, 80, Luma([100]));
        let with_cell = |v: u8| {
            GrayImage::from_fn(80, 80, |x, y| Luma([if x < 10 && y < 10 { v } else { 100 }]))
        };
        let o = Orientation::default();
        let base = BoardSnapshot::from_board_image(flat, region, o, &config).unwrap();

        let at = BoardSnapshot::from_board_image(with_cell(110), region, o, &config).unwrap();
        assert!(compare(&base, &at, &config).is_empty());

        let above = BoardSnapshot::from_board_image(with_cell(111), region, o, &config).unwrap();
        let changes = compare(&base, &above, &config);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].square, sq("a8"));
        assert_eq!(changes[0].kind, ChangeKind::Ambiguous);
    }

    #[test]
    fn test_vacated_pairs_with_nearest_and_stray_is_dropped() {
        let config = DiffConfig::default();
        // b2 vacated, b5 arrived (distance 3), h8 vacated with no partner
        let changes = vec![
            change(7, 0, ChangeKind::Vacated),
            change(1, 3, ChangeKind::Occupied),
            change(1, 6, ChangeKind::Vacated),
        ];
        let moves = synthesize_moves(&changes, &config);
        assert_eq!(moves.len(), 1);
        assert_eq!((moves[0].from, moves[0].to), (sq("b2"), sq("b5")));
        assert!(moves[0].special);
    }

    #[test]
    fn test_too_few_or_too_many_changes() {
        let config = DiffConfig::default();
        assert!(synthesize_moves(&[], &config).is_empty());
        assert!(synthesize_moves(&[change(0, 0, ChangeKind::Vacated)], &config).is_empty());
        let many: Vec<CellChange> = (0..5).map(|c| change(c, 2, ChangeKind::Vacated)).collect();
        assert!(synthesize_moves(&many, &config).is_empty());
    }

    #[test]
    fn test_ties_break_in_scan_order() {
        let config = DiffConfig::default();
        // both targets are 1 away from the vacated cell; the earlier one in scan order wins
        let changes = vec![
            change(3, 3, ChangeKind::Occupied),
            change(3, 4, ChangeKind::Vacated),
            change(2, 4, ChangeKind::Occupied),
        ];
        let moves = synthesize_moves(&changes, &config);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].to, sq("d5"));
    }

    #[test]
    fn test_ambiguous_cell_is_never_a_destination() {
        let config = DiffConfig::default();
        let changes = vec![change(3, 3, ChangeKind::Ambiguous), change(4, 4, ChangeKind::Vacated)];
        assert!(synthesize_moves(&changes, &config).is_empty());

        // the occupied cell is still paired when an ambiguous one sits closer
        let changes = vec![
            change(3, 4, ChangeKind::Ambiguous),
            change(4, 4, ChangeKind::Vacated),
            change(4, 1, ChangeKind::Occupied),
        ];
        let moves = synthesize_moves(&changes, &config);
        assert_eq!(moves.len(), 1);
        assert_eq!((moves[0].from, moves[0].to), (sq("e4"), sq("e7")));
    }

    #[test]
    fn test_kingside_castling_pattern() {
        let config = DiffConfig::default();
        let changes = vec![
            change(4, 7, ChangeKind::Vacated),
            change(5, 7, ChangeKind::Occupied),
            change(6, 7, ChangeKind::Occupied),
            change(7, 7, ChangeKind::Vacated),
        ];
        let moves = synthesize_moves(&changes, &config);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].to_string(), "e1g1");
        assert!(moves[0].special);
    }

    #[test]
    fn test_queenside_castling_pattern() {
        let changes = vec![
            change(0, 0, ChangeKind::Vacated),
            change(2, 0, ChangeKind::Occupied),
            change(3, 0, ChangeKind::Occupied),
            change(4, 0, ChangeKind::Vacated),
        ];
        let moves = synthesize_moves(&changes, &DiffConfig::default());
        assert_eq!(moves[0].to_string(), "e8c8");
    }

    #[test]
    fn test_en_passant_pattern() {
        // e5xd6: e5 vacated, d5 (captured) vacated, d6 arrived
        let changes = vec![
            change(3, 2, ChangeKind::Occupied),
            change(3, 3, ChangeKind::Vacated),
            change(4, 3, ChangeKind::Vacated),
        ];
        let moves = synthesize_moves(&changes, &DiffConfig::default());
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].to_string(), "e5d6");
        assert!(moves[0].special);
    }

    #[test]
    fn test_geometry_change_rebaselines() {
        let frame = board_frame(480, 480, BoardRegion::new(0, 0, 480));
        let config = DiffConfig::default();
        let mut differ = FrameDifferencer::new(config.clone());
        let o = Orientation::default();
        differ.observe(BoardSnapshot::capture(&frame, BoardRegion::new(0, 0, 400), o, &config).unwrap());
        let moved = BoardSnapshot::capture(&frame, BoardRegion::new(40, 40, 400), o, &config).unwrap();
        assert!(differ.observe(moved).is_empty());
        assert_eq!(differ.baseline().unwrap().region(), BoardRegion::new(40, 40, 400));
    }

    #[test]
    fn test_capture_rejects_bad_regions() {
        let frame = RgbaImage::new(200, 200);
        let config = DiffConfig::default();
        let o = Orientation::default();
        assert_eq!(
            BoardSnapshot::capture(&frame, BoardRegion::UNSET, o, &config).unwrap_err(),
            SnapshotError::DegenerateRegion(BoardRegion::UNSET)
        );
        assert!(matches!(
            BoardSnapshot::capture(&frame, BoardRegion::new(100, 100, 150), o, &config),
            Err(SnapshotError::RegionOutOfFrame { .. })
        ));
        assert!(matches!(
            BoardSnapshot::capture(&frame, BoardRegion::new(0, 0, 16), o, &config),
            Err(SnapshotError::EmptyCell { .. })
        ));
    }

    #[test]
    fn test_cell_states() {
        let mut frame = board_frame(400, 400, REGION);
        // both on dark squares
        paint_piece(&mut frame, REGION, 4, 5, 250); // light piece on e3
        paint_piece(&mut frame, REGION, 4, 1, 15); // dark piece on e7
        let snap = snapshot(&frame);
        assert_eq!(snap.cell_state(sq("e3")), CellState::OccupiedWhite);
        assert_eq!(snap.cell_state(sq("e7")), CellState::OccupiedBlack);
        assert_eq!(snap.cell_state(sq("e4")), CellState::Empty);
        assert_eq!(snap.occupied_count(), 2);
        let ascii = snap.ascii();
        assert_eq!(ascii.lines().nth(1).unwrap(), "....p...");
        assert_eq!(ascii.lines().nth(5).unwrap(), "....P...");
    }

    #[test]
    fn test_parse_uci_move() {
        let mv: DetectedMove = "e2e4".parse().unwrap();
        assert_eq!((mv.from, mv.to), (sq("e2"), sq("e4")));
        let promo: DetectedMove = "e7e8q".parse().unwrap();
        assert_eq!(promo.to, sq("e8"));
        assert!("e2".parse::<DetectedMove>().is_err());
        assert!("e2e9".parse::<DetectedMove>().is_err());
        assert!("e7e8k".parse::<DetectedMove>().is_err());
        assert!("e2e2".parse::<DetectedMove>().is_err());
    }
}
