//! Box-pushing engine on a fixed 6x6 grid.

use glam::IVec2;
use serde::{Deserialize, Serialize};

use super::{Direction, Game, Transition};
use crate::error::{ConfigError, ReplayError};

pub const GRID_W: i32 = 6;
pub const GRID_H: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuzzleData {
    pub name: &'static str,
    pub walls: &'static [IVec2],
    pub boxes: &'static [IVec2],
    pub goals: &'static [IVec2],
    pub player: IVec2,
    pub max_moves: u32,
}

const fn at(x: i32, y: i32) -> IVec2 {
    IVec2::new(x, y)
}

pub static LEVELS: [PuzzleData; 5] = [
    PuzzleData {
        name: "First Steps",
        walls: &[at(1, 1), at(2, 1), at(3, 1), at(4, 1)],
        boxes: &[at(2, 3), at(3, 3)],
        goals: &[at(4, 2), at(4, 3)],
        player: at(3, 4),
        max_moves: 12,
    },
    PuzzleData {
        name: "Open Field",
        walls: &[at(2, 3)],
        boxes: &[at(3, 2), at(3, 4)],
        goals: &[at(1, 2), at(1, 4)],
        player: at(3, 5),
        max_moves: 16,
    },
    PuzzleData {
        name: "Storage Room",
        walls: &[at(2, 1), at(3, 1), at(4, 1)],
        boxes: &[at(2, 3), at(2, 4), at(2, 5)],
        goals: &[at(1, 3), at(1, 4), at(1, 5)],
        player: at(3, 5),
        max_moves: 14,
    },
    PuzzleData {
        name: "Crossroads",
        walls: &[at(3, 1), at(3, 5)],
        boxes: &[at(3, 2), at(2, 4)],
        goals: &[at(1, 2), at(4, 4)],
        player: at(2, 5),
        max_moves: 14,
    },
    PuzzleData {
        name: "The Gauntlet",
        walls: &[at(1, 1), at(3, 1), at(1, 5), at(3, 5)],
        boxes: &[at(2, 2), at(2, 3), at(2, 4)],
        goals: &[at(4, 2), at(0, 3), at(4, 4)],
        player: at(2, 5),
        max_moves: 20,
    },
];

/// Backend abort codes for refused moves.
pub mod abort {
    use crate::error::ReplayError;

    pub const INVALID_STATE: ReplayError = ReplayError::rejected(100, "invalid game state");
    pub const TOO_MANY_MOVES: ReplayError = ReplayError::rejected(103, "too many moves");
    pub const BLOCKED_BY_WALL: ReplayError = ReplayError::rejected(104, "blocked by wall");
    pub const OUT_OF_BOUNDS: ReplayError = ReplayError::rejected(105, "out of bounds");
    pub const BLOCKED_BY_BOX: ReplayError = ReplayError::rejected(106, "blocked by another box");
}

pub fn in_bounds(pos: IVec2) -> bool {
    pos.x >= 0 && pos.y >= 0 && pos.x < GRID_W && pos.y < GRID_H
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SokobanSummary {
    pub level: u8,
    pub moves: u32,
    pub solved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SokobanState {
    pub level: u8,
    pub walls: Vec<IVec2>,
    /// Box order is fixed by the level data; pushes move boxes in place.
    pub boxes: Vec<IVec2>,
    pub goals: Vec<IVec2>,
    pub player: IVec2,
    pub moves: u32,
    pub max_moves: u32,
}

impl SokobanState {
    pub fn is_solved(&self) -> bool {
        self.goals.iter().all(|g| self.boxes.contains(g))
    }

    fn is_wall(&self, pos: IVec2) -> bool {
        self.walls.contains(&pos)
    }

    fn box_at(&self, pos: IVec2) -> Option<usize> {
        self.boxes.iter().position(|b| *b == pos)
    }

    fn step(&mut self, dir: Direction) -> Result<(), ReplayError> {
        if self.is_solved() {
            return Err(abort::INVALID_STATE);
        }
        if self.moves >= self.max_moves {
            return Err(abort::TOO_MANY_MOVES);
        }
        let target = self.player + dir.delta();
        if !in_bounds(target) {
            return Err(abort::OUT_OF_BOUNDS);
        }
        if self.is_wall(target) {
            return Err(abort::BLOCKED_BY_WALL);
        }
        if let Some(idx) = self.box_at(target) {
            let beyond = target + dir.delta();
            if !in_bounds(beyond) {
                return Err(abort::OUT_OF_BOUNDS);
            }
            if self.is_wall(beyond) {
                return Err(abort::BLOCKED_BY_WALL);
            }
            if self.box_at(beyond).is_some() {
                return Err(abort::BLOCKED_BY_BOX);
            }
            self.boxes[idx] = beyond;
        }
        self.player = target;
        self.moves += 1;
        Ok(())
    }
}

impl Game for SokobanState {
    type Level = u8;
    type Intent = Direction;
    type Action = Direction;
    type Summary = SokobanSummary;

    const NAME: &'static str = "sokoban";
    const FINISHED: ReplayError = abort::INVALID_STATE;

    fn start(level: &u8) -> Result<Self, ConfigError> {
        let data = level
            .checked_sub(1)
            .and_then(|i| LEVELS.get(i as usize))
            .ok_or(ConfigError::InvalidLevel {
                level: *level,
                max: LEVELS.len() as u8,
            })?;
        if data.boxes.len() != data.goals.len() {
            return Err(ConfigError::MalformedLevel(format!(
                "{}: {} boxes for {} goals",
                data.name,
                data.boxes.len(),
                data.goals.len()
            )));
        }
        Ok(Self {
            level: *level,
            walls: data.walls.to_vec(),
            boxes: data.boxes.to_vec(),
            goals: data.goals.to_vec(),
            player: data.player,
            moves: 0,
            max_moves: data.max_moves,
        })
    }

    fn handle(&mut self, dir: Direction) -> Transition<Direction> {
        match self.step(dir) {
            Ok(()) => Transition::Committed(dir),
            Err(err) => {
                log::trace!("push {:?} rejected: {}", dir, err);
                Transition::Rejected
            }
        }
    }

    fn replay(&mut self, dir: &Direction) -> Result<(), ReplayError> {
        self.step(*dir)
    }

    fn is_terminal(&self) -> bool {
        self.is_solved() || self.moves >= self.max_moves
    }

    fn summary(&self) -> SokobanSummary {
        SokobanSummary {
            level: self.level,
            moves: self.moves,
            solved: self.is_solved(),
        }
    }
}
