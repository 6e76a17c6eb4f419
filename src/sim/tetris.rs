//! Falling-block puzzle engine
//!
//! Mirrors the backend's `place_piece` rules. Moves, rotations and soft
//! drops are local only; the backend sees one [`Placement`] per locked piece
//! and re-derives its score and line totals.

use glam::IVec2;
use serde::{Deserialize, Serialize};

use super::{Game, Lcg, Transition};
use crate::consts::*;
use crate::error::{ConfigError, ReplayError};

/// Tetromino kinds. Discriminants are the backend's piece ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Piece {
    I = 0,
    O = 1,
    T = 2,
    S = 3,
    Z = 4,
    L = 5,
    J = 6,
}

/// `(row, col)` offsets from the top-left anchor, per piece and rotation.
static SHAPES: [[[(i32, i32); 4]; 4]; 7] = [
    // I
    [
        [(0, 0), (0, 1), (0, 2), (0, 3)],
        [(0, 0), (1, 0), (2, 0), (3, 0)],
        [(0, 0), (0, 1), (0, 2), (0, 3)],
        [(0, 0), (1, 0), (2, 0), (3, 0)],
    ],
    // O
    [
        [(0, 0), (0, 1), (1, 0), (1, 1)],
        [(0, 0), (0, 1), (1, 0), (1, 1)],
        [(0, 0), (0, 1), (1, 0), (1, 1)],
        [(0, 0), (0, 1), (1, 0), (1, 1)],
    ],
    // T
    [
        [(0, 0), (0, 1), (0, 2), (1, 1)],
        [(0, 0), (1, 0), (1, 1), (2, 0)],
        [(0, 1), (1, 0), (1, 1), (1, 2)],
        [(0, 1), (1, 0), (1, 1), (2, 1)],
    ],
    // S
    [
        [(0, 1), (0, 2), (1, 0), (1, 1)],
        [(0, 0), (1, 0), (1, 1), (2, 1)],
        [(0, 1), (0, 2), (1, 0), (1, 1)],
        [(0, 0), (1, 0), (1, 1), (2, 1)],
    ],
    // Z
    [
        [(0, 0), (0, 1), (1, 1), (1, 2)],
        [(0, 1), (1, 0), (1, 1), (2, 0)],
        [(0, 0), (0, 1), (1, 1), (1, 2)],
        [(0, 1), (1, 0), (1, 1), (2, 0)],
    ],
    // L
    [
        [(0, 0), (1, 0), (2, 0), (2, 1)],
        [(0, 0), (0, 1), (0, 2), (1, 0)],
        [(0, 0), (0, 1), (1, 1), (2, 1)],
        [(0, 2), (1, 0), (1, 1), (1, 2)],
    ],
    // J
    [
        [(0, 1), (1, 1), (2, 0), (2, 1)],
        [(0, 0), (1, 0), (1, 1), (1, 2)],
        [(0, 0), (0, 1), (1, 0), (2, 0)],
        [(0, 0), (0, 1), (0, 2), (1, 2)],
    ],
];

/// Backend abort codes for refused placements.
pub mod abort {
    use crate::error::ReplayError;

    pub const NOT_ACTIVE: ReplayError = ReplayError::rejected(101, "game is not active");
    pub const ALREADY_FINISHED: ReplayError = ReplayError::rejected(102, "game already finished");
    pub const INVALID_PIECE: ReplayError = ReplayError::rejected(103, "invalid piece type");
    pub const INVALID_COLUMN: ReplayError = ReplayError::rejected(104, "invalid column");
    pub const INVALID_ROTATION: ReplayError = ReplayError::rejected(105, "invalid rotation");
    /// The backend derives the landing row itself; a claimed row that
    /// disagrees is caught by the replay authority.
    pub const INVALID_PLACEMENT: ReplayError = ReplayError::rejected(903, "invalid landing position");
}

/// Column offsets tried, in order, when a rotation collides.
pub const ROTATION_KICKS: [i32; 4] = [-1, 1, -2, 2];

impl Piece {
    pub const ALL: [Piece; 7] = [
        Piece::I,
        Piece::O,
        Piece::T,
        Piece::S,
        Piece::Z,
        Piece::L,
        Piece::J,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Value written into the board when this piece locks
    pub fn cell(self) -> u8 {
        self.id() + 1
    }

    pub fn shape(self, rotation: u8) -> &'static [(i32, i32); 4] {
        &SHAPES[self as usize][(rotation % 4) as usize]
    }

    pub fn width(self, rotation: u8) -> i32 {
        self.shape(rotation).iter().map(|&(_, c)| c).max().unwrap_or(0) + 1
    }

    /// Centered spawn column
    pub fn spawn_col(self) -> i32 {
        (BOARD_W as i32 - self.width(0)) / 2
    }
}

pub type Row = [u8; BOARD_W];

/// Player intents. Gravity is driven separately through [`Game::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Left,
    Right,
    SoftDrop,
    Rotate,
    HardDrop,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetrisLevel {
    /// Bag seed handed out by the backend at game start
    pub seed: u64,
}

/// One locked piece, as replayed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub piece: Piece,
    pub rotation: u8,
    pub col: i32,
    pub row: i32,
    /// Hold was used during this piece's turn
    pub held: bool,
    pub soft_rows: u32,
    pub hard_rows: u32,
    pub lines_cleared: u32,
    /// Cumulative score after this lock
    pub score: u64,
    /// Cumulative lines after this lock
    pub lines: u32,
}

/// Payload of the final `save_game` commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub score: u64,
    pub lines: u32,
    pub level: u32,
    pub pieces_placed: u32,
}

/// Gravity interval for a level, never below the floor.
pub fn drop_interval_for(level: u32) -> u32 {
    BASE_DROP_MS
        .saturating_sub(DROP_STEP_MS.saturating_mul(level))
        .max(MIN_DROP_MS)
}

/// Complete falling-block state (deterministic, serializable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetrisState {
    /// Fixed occupancy, row 0 at the top
    pub board: Vec<Row>,
    pub current: Piece,
    pub rotation: u8,
    /// Anchor of the active piece (`x` = column, `y` = row)
    pub pos: IVec2,
    pub next: Piece,
    pub held: Option<Piece>,
    pub held_this_turn: bool,
    /// Soft-drop rows scored since the last lock
    pub soft_rows: u32,
    pub score: u64,
    pub lines: u32,
    pub level: u32,
    pub combo: u32,
    pub pieces_placed: u32,
    pub game_over: bool,
    /// Remaining bag, drawn from the end
    pub bag: Vec<Piece>,
    pub drop_interval_ms: u32,
    rng: Lcg,
}

impl TetrisState {
    pub fn new(seed: u64) -> Self {
        let mut state = Self {
            board: vec![[0; BOARD_W]; BOARD_H],
            current: Piece::I,
            rotation: 0,
            pos: IVec2::ZERO,
            next: Piece::I,
            held: None,
            held_this_turn: false,
            soft_rows: 0,
            score: 0,
            lines: 0,
            level: 0,
            combo: 0,
            pieces_placed: 0,
            game_over: false,
            bag: Vec::new(),
            drop_interval_ms: BASE_DROP_MS,
            rng: Lcg::new(seed),
        };
        let first = state.draw();
        state.next = state.draw();
        state.spawn(first);
        state
    }

    fn shuffled_bag(&mut self) -> [Piece; 7] {
        let mut bag = Piece::ALL;
        for i in (1..bag.len()).rev() {
            let j = self.rng.pick(i + 1);
            bag.swap(i, j);
        }
        bag
    }

    fn draw(&mut self) -> Piece {
        if let Some(piece) = self.bag.pop() {
            return piece;
        }
        let [rest @ .., last] = self.shuffled_bag();
        self.bag = rest.to_vec();
        last
    }

    /// Whether `piece` in `rotation` fits with its anchor at `pos`
    pub fn fits(&self, piece: Piece, rotation: u8, pos: IVec2) -> bool {
        piece.shape(rotation).iter().all(|&(dr, dc)| {
            let (r, c) = (pos.y + dr, pos.x + dc);
            r >= 0
                && c >= 0
                && (r as usize) < BOARD_H
                && (c as usize) < BOARD_W
                && self.board[r as usize][c as usize] == 0
        })
    }

    /// Board cells covered by the active piece
    pub fn active_cells(&self) -> [IVec2; 4] {
        let shape = *self.current.shape(self.rotation);
        shape.map(|(dr, dc)| self.pos + IVec2::new(dc, dr))
    }

    /// Row the active piece would land on if hard-dropped
    pub fn ghost_row(&self) -> i32 {
        let mut pos = self.pos;
        while self.fits(self.current, self.rotation, pos + IVec2::Y) {
            pos.y += 1;
        }
        pos.y
    }

    /// Translate the active piece; fails on collision or bounds.
    pub fn attempt_shift(&mut self, delta: IVec2) -> bool {
        if self.game_over {
            return false;
        }
        let target = self.pos + delta;
        if self.fits(self.current, self.rotation, target) {
            self.pos = target;
            true
        } else {
            false
        }
    }

    /// Rotate clockwise, trying [`ROTATION_KICKS`] in order after the
    /// in-place rotation. First fit wins.
    pub fn attempt_rotate(&mut self) -> bool {
        if self.game_over {
            return false;
        }
        let rotation = (self.rotation + 1) % 4;
        let offsets = std::iter::once(0).chain(ROTATION_KICKS);
        for dx in offsets {
            let target = self.pos + IVec2::new(dx, 0);
            if self.fits(self.current, rotation, target) {
                self.rotation = rotation;
                self.pos = target;
                return true;
            }
        }
        false
    }

    fn soft_drop(&mut self) -> bool {
        if !self.attempt_shift(IVec2::Y) {
            return false;
        }
        self.score += SOFT_DROP_POINTS;
        self.soft_rows += 1;
        true
    }

    /// Drop to rest and lock.
    pub fn hard_commit(&mut self) -> Option<Placement> {
        if self.game_over {
            return None;
        }
        let mut rows = 0;
        while self.fits(self.current, self.rotation, self.pos + IVec2::Y) {
            self.pos.y += 1;
            rows += 1;
        }
        Some(self.lock(rows))
    }

    /// Swap the active piece with the hold slot, once per turn.
    pub fn hold_swap(&mut self) -> bool {
        if self.game_over || self.held_this_turn {
            return false;
        }
        self.held_this_turn = true;
        match self.held.replace(self.current) {
            Some(piece) => self.spawn(piece),
            None => self.spawn_next(),
        }
        true
    }

    fn spawn(&mut self, piece: Piece) {
        self.current = piece;
        self.rotation = 0;
        self.pos = IVec2::new(piece.spawn_col(), 0);
        if !self.fits(piece, 0, self.pos) {
            log::debug!("spawn of {:?} collides, game over", piece);
            self.game_over = true;
        }
    }

    fn spawn_next(&mut self) {
        let piece = self.next;
        self.next = self.draw();
        self.spawn(piece);
    }

    /// Write the active piece into the board, clear rows, score, spawn.
    fn lock(&mut self, hard_rows: u32) -> Placement {
        self.score += hard_rows as u64 * HARD_DROP_POINTS;

        let mut placement = Placement {
            piece: self.current,
            rotation: self.rotation,
            col: self.pos.x,
            row: self.pos.y,
            held: self.held_this_turn,
            soft_rows: self.soft_rows,
            hard_rows,
            lines_cleared: 0,
            score: 0,
            lines: 0,
        };

        let value = self.current.cell();
        for cell in self.active_cells() {
            let slot = self
                .board
                .get_mut(cell.y as usize)
                .and_then(|row| row.get_mut(cell.x as usize));
            if let Some(slot) = slot {
                *slot = value;
            }
        }

        self.pieces_placed += 1;
        self.held_this_turn = false;
        self.soft_rows = 0;

        let cleared = clear_full_rows(&mut self.board);
        if cleared > 0 {
            self.combo += 1;
            let base = LINE_REWARDS[(cleared as usize).min(LINE_REWARDS.len() - 1)];
            self.score += base * (10 + self.level as u64) * self.combo as u64 / 10;
            self.lines += cleared;
            self.level = self.lines / LINES_PER_LEVEL;
            self.drop_interval_ms = drop_interval_for(self.level);
        } else {
            self.combo = 0;
        }

        self.spawn_next();

        placement.lines_cleared = cleared;
        placement.score = self.score;
        placement.lines = self.lines;
        placement
    }
}

/// Remove full rows bottom-up, shifting everything above down.
fn clear_full_rows(board: &mut Vec<Row>) -> u32 {
    let before = board.len();
    board.retain(|row| row.iter().any(|&c| c == 0));
    let cleared = before - board.len();
    for _ in 0..cleared {
        board.insert(0, [0; BOARD_W]);
    }
    cleared as u32
}

fn check(field: &'static str, claimed: u64, derived: u64) -> Result<(), ReplayError> {
    if claimed == derived {
        Ok(())
    } else {
        Err(ReplayError::Diverged {
            field,
            claimed,
            derived,
        })
    }
}

impl Game for TetrisState {
    type Level = TetrisLevel;
    type Intent = Intent;
    type Action = Placement;
    type Summary = FinalSummary;

    const NAME: &'static str = "tetris";
    const FINISHED: ReplayError = abort::ALREADY_FINISHED;

    fn start(level: &TetrisLevel) -> Result<Self, ConfigError> {
        Ok(Self::new(level.seed))
    }

    fn handle(&mut self, intent: Intent) -> Transition<Placement> {
        let moved = match intent {
            Intent::Left => self.attempt_shift(IVec2::NEG_X),
            Intent::Right => self.attempt_shift(IVec2::X),
            Intent::SoftDrop => self.soft_drop(),
            Intent::Rotate => self.attempt_rotate(),
            Intent::Hold => self.hold_swap(),
            Intent::HardDrop => {
                return match self.hard_commit() {
                    Some(placement) => Transition::Committed(placement),
                    None => Transition::Rejected,
                };
            }
        };
        if moved {
            Transition::Moved
        } else {
            Transition::Rejected
        }
    }

    fn tick(&mut self) -> Transition<Placement> {
        if self.game_over {
            return Transition::Rejected;
        }
        if self.attempt_shift(IVec2::Y) {
            Transition::Moved
        } else {
            Transition::Committed(self.lock(0))
        }
    }

    fn replay(&mut self, p: &Placement) -> Result<(), ReplayError> {
        if self.game_over {
            return Err(abort::NOT_ACTIVE);
        }
        let mut next = self.clone();
        if p.held && !next.hold_swap() {
            return Err(abort::INVALID_PIECE);
        }
        if next.game_over {
            return Err(abort::NOT_ACTIVE);
        }
        if p.piece != next.current {
            return Err(abort::INVALID_PIECE);
        }
        if p.rotation > 3 {
            return Err(abort::INVALID_ROTATION);
        }
        if p.col < 0 || p.col >= BOARD_W as i32 {
            return Err(abort::INVALID_COLUMN);
        }
        let pos = IVec2::new(p.col, p.row);
        if !next.fits(p.piece, p.rotation, pos) {
            return Err(abort::INVALID_PLACEMENT);
        }
        if next.fits(p.piece, p.rotation, pos + IVec2::Y) {
            return Err(abort::INVALID_PLACEMENT);
        }
        let travelled = if p.held {
            p.hard_rows
        } else {
            p.soft_rows + p.hard_rows
        };
        if travelled > p.row as u32 || p.soft_rows > 2 * BOARD_H as u32 {
            return Err(abort::INVALID_PLACEMENT);
        }

        next.rotation = p.rotation;
        next.pos = pos;
        next.soft_rows = p.soft_rows;
        next.score += p.soft_rows as u64 * SOFT_DROP_POINTS;
        let derived = next.lock(p.hard_rows);

        check("lines_cleared", p.lines_cleared as u64, derived.lines_cleared as u64)?;
        check("score", p.score, derived.score)?;
        check("lines", p.lines as u64, derived.lines as u64)?;

        *self = next;
        Ok(())
    }

    fn is_terminal(&self) -> bool {
        self.game_over
    }

    /// Soft-drop points of the active piece only count once it locks.
    fn summary(&self) -> FinalSummary {
        FinalSummary {
            score: self.score - self.soft_rows as u64 * SOFT_DROP_POINTS,
            lines: self.lines,
            level: self.level,
            pieces_placed: self.pieces_placed,
        }
    }

    fn tick_interval_ms(&self) -> Option<u32> {
        (!self.game_over).then_some(self.drop_interval_ms)
    }
}
