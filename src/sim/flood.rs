//! Flood-fill territory engine
//!
//! Boards are fixed data shared with the backend. Each move recolors the
//! controlled region and absorbs every matching neighbor reachable from it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{Game, Transition};
use crate::error::{ConfigError, ReplayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodLevel {
    pub name: &'static str,
    pub width: usize,
    pub height: usize,
    pub colors: u8,
    pub max_moves: u32,
    pub virus_starts: &'static [usize],
    pub board: &'static [u8],
}

#[rustfmt::skip]
pub static LEVELS: [FloodLevel; 5] = [
    FloodLevel {
        name: "Patient Zero",
        width: 5, height: 5, colors: 4, max_moves: 12,
        virus_starts: &[0],
        board: &[
            0, 1, 1, 2, 3,
            1, 0, 3, 1, 2,
            2, 3, 0, 0, 1,
            3, 2, 1, 3, 0,
            0, 1, 2, 0, 3,
        ],
    },
    FloodLevel {
        name: "Outbreak",
        width: 6, height: 6, colors: 5, max_moves: 18,
        virus_starts: &[0],
        board: &[
            0, 3, 1, 4, 4, 2,
            2, 4, 2, 3, 1, 0,
            1, 1, 2, 0, 3, 4,
            3, 2, 4, 3, 1, 2,
            0, 1, 0, 4, 0, 1,
            0, 2, 2, 1, 3, 0,
        ],
    },
    FloodLevel {
        name: "Pandemic",
        width: 8, height: 8, colors: 6, max_moves: 25,
        virus_starts: &[0],
        board: &[
            0, 4, 0, 3, 2, 4, 2, 0,
            1, 3, 1, 1, 1, 2, 0, 2,
            0, 1, 0, 4, 4, 3, 2, 0,
            2, 4, 1, 4, 0, 4, 0, 5,
            3, 1, 2, 4, 1, 0, 1, 2,
            1, 0, 5, 1, 4, 1, 0, 1,
            2, 2, 2, 3, 0, 5, 4, 0,
            1, 5, 4, 2, 3, 1, 5, 3,
        ],
    },
    FloodLevel {
        name: "Contagion",
        width: 10, height: 10, colors: 6, max_moves: 27,
        virus_starts: &[0, 99],
        board: &[
            0, 5, 0, 4, 0, 3, 1, 5, 2, 3,
            1, 3, 2, 5, 5, 4, 4, 0, 1, 4,
            0, 2, 2, 3, 0, 5, 5, 1, 2, 2,
            1, 3, 1, 4, 4, 4, 3, 4, 0, 5,
            0, 2, 2, 3, 1, 4, 1, 5, 2, 3,
            0, 1, 0, 2, 5, 5, 0, 2, 0, 0,
            0, 1, 2, 3, 1, 4, 2, 3, 5, 5,
            5, 5, 5, 3, 4, 1, 1, 1, 4, 2,
            0, 1, 5, 4, 2, 1, 3, 2, 5, 2,
            2, 3, 2, 0, 5, 2, 1, 5, 1, 0,
        ],
    },
    FloodLevel {
        name: "Total Extinction",
        width: 12, height: 12, colors: 7, max_moves: 30,
        virus_starts: &[0, 11, 138],
        board: &[
            0, 5, 2, 2, 0, 0, 6, 0, 1, 5, 6, 0,
            2, 0, 6, 5, 4, 5, 0, 6, 6, 6, 2, 1,
            0, 3, 1, 3, 2, 6, 6, 5, 0, 4, 6, 6,
            0, 6, 1, 1, 3, 1, 5, 2, 4, 0, 4, 6,
            5, 2, 1, 0, 5, 4, 3, 0, 2, 5, 5, 1,
            2, 3, 1, 5, 5, 4, 5, 6, 2, 2, 3, 5,
            1, 1, 6, 0, 2, 3, 3, 6, 0, 4, 3, 1,
            5, 3, 3, 6, 1, 3, 6, 0, 1, 1, 2, 5,
            0, 2, 5, 2, 4, 6, 2, 3, 4, 4, 3, 2,
            6, 3, 6, 5, 1, 4, 2, 0, 3, 0, 2, 4,
            5, 4, 5, 3, 6, 3, 5, 3, 1, 0, 0, 6,
            6, 5, 0, 1, 0, 3, 0, 1, 2, 1, 5, 6,
        ],
    },
];

impl FloodLevel {
    pub fn get(level: u8) -> Result<&'static FloodLevel, ConfigError> {
        let data = level
            .checked_sub(1)
            .and_then(|i| LEVELS.get(i as usize))
            .ok_or(ConfigError::InvalidLevel {
                level,
                max: LEVELS.len() as u8,
            })?;
        data.validate()?;
        Ok(data)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let total = self.width * self.height;
        if self.board.len() != total {
            return Err(ConfigError::MalformedLevel(format!(
                "{}: board has {} cells, expected {}",
                self.name,
                self.board.len(),
                total
            )));
        }
        if self.virus_starts.is_empty() || self.virus_starts.iter().any(|&s| s >= total) {
            return Err(ConfigError::MalformedLevel(format!(
                "{}: virus start out of range",
                self.name
            )));
        }
        if self.board.iter().any(|&c| c >= self.colors) {
            return Err(ConfigError::MalformedLevel(format!(
                "{}: color outside palette",
                self.name
            )));
        }
        Ok(())
    }
}

/// Backend abort codes for refused color picks.
pub mod abort {
    use crate::error::ReplayError;

    pub const INVALID_COLOR: ReplayError = ReplayError::rejected(102, "invalid color choice");
    pub const NO_MOVES_REMAINING: ReplayError = ReplayError::rejected(103, "no moves remaining");
    pub const SAME_COLOR: ReplayError = ReplayError::rejected(106, "cannot pick the same color");
    pub const GAME_OVER: ReplayError = ReplayError::rejected(108, "game is over");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Active,
    Won,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloodSummary {
    pub level: u8,
    pub moves_used: u32,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloodState {
    pub level: u8,
    pub width: usize,
    pub height: usize,
    pub colors: u8,
    pub max_moves: u32,
    pub virus_starts: Vec<usize>,
    pub board: Vec<u8>,
    pub controlled: Vec<bool>,
    pub controlled_count: usize,
    pub moves_used: u32,
    pub outcome: Outcome,
}

impl FloodState {
    /// Color of the first virus start
    pub fn virus_color(&self) -> u8 {
        self.board[self.virus_starts[0]]
    }

    pub fn moves_left(&self) -> u32 {
        self.max_moves.saturating_sub(self.moves_used)
    }

    /// Cells adjacent to `idx`, in up, down, left, right order.
    fn neighbors(&self, idx: usize) -> impl Iterator<Item = usize> {
        let (w, h) = (self.width, self.height);
        let (x, y) = (idx % w, idx / w);
        [
            (y > 0).then(|| idx - w),
            (y + 1 < h).then(|| idx + w),
            (x > 0).then(|| idx - 1),
            (x + 1 < w).then(|| idx + 1),
        ]
        .into_iter()
        .flatten()
    }

    fn choose(&mut self, color: u8) -> Result<(), ReplayError> {
        if self.moves_used >= self.max_moves {
            return Err(abort::NO_MOVES_REMAINING);
        }
        if self.outcome != Outcome::Active {
            return Err(abort::GAME_OVER);
        }
        if color >= self.colors {
            return Err(abort::INVALID_COLOR);
        }
        if color == self.virus_color() {
            return Err(abort::SAME_COLOR);
        }

        let mut queue = VecDeque::new();
        for (idx, owned) in self.controlled.iter().enumerate() {
            if *owned {
                self.board[idx] = color;
                queue.push_back(idx);
            }
        }

        while let Some(idx) = queue.pop_front() {
            let absorbed: Vec<usize> = self
                .neighbors(idx)
                .filter(|&n| !self.controlled[n] && self.board[n] == color)
                .collect();
            for n in absorbed {
                self.controlled[n] = true;
                self.controlled_count += 1;
                queue.push_back(n);
            }
        }

        self.moves_used += 1;
        if self.controlled_count == self.board.len() {
            self.outcome = Outcome::Won;
        } else if self.moves_used >= self.max_moves {
            self.outcome = Outcome::Lost;
        }
        Ok(())
    }
}

impl Game for FloodState {
    type Level = u8;
    type Intent = u8;
    type Action = u8;
    type Summary = FloodSummary;

    const NAME: &'static str = "flood";
    const FINISHED: ReplayError = abort::GAME_OVER;

    fn start(level: &u8) -> Result<Self, ConfigError> {
        let data = FloodLevel::get(*level)?;
        let mut controlled = vec![false; data.board.len()];
        for &start in data.virus_starts {
            controlled[start] = true;
        }
        Ok(Self {
            level: *level,
            width: data.width,
            height: data.height,
            colors: data.colors,
            max_moves: data.max_moves,
            virus_starts: data.virus_starts.to_vec(),
            board: data.board.to_vec(),
            controlled_count: controlled.iter().filter(|c| **c).count(),
            controlled,
            moves_used: 0,
            outcome: Outcome::Active,
        })
    }

    fn handle(&mut self, color: u8) -> Transition<u8> {
        match self.choose(color) {
            Ok(()) => Transition::Committed(color),
            Err(err) => {
                log::trace!("color {} rejected: {}", color, err);
                Transition::Rejected
            }
        }
    }

    fn replay(&mut self, color: &u8) -> Result<(), ReplayError> {
        // `choose` validates before mutating
        self.choose(*color)
    }

    fn is_terminal(&self) -> bool {
        self.outcome != Outcome::Active
    }

    fn summary(&self) -> FloodSummary {
        FloodSummary {
            level: self.level,
            moves_used: self.moves_used,
            outcome: self.outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_all_level_data_is_well_formed() {
        for level in 1..=5 {
            let state = FloodState::start(&level).unwrap();
            assert_eq!(state.controlled_count, state.virus_starts.len());
        }
        assert_eq!(
            FloodState::start(&9),
            Err(ConfigError::InvalidLevel { level: 9, max: 5 })
        );
    }

    #[test]
    fn test_first_level_greedy_win() {
        let mut state = FloodState::start(&1).unwrap();
        let counts = [4, 6, 10, 14, 18, 21, 23, 25];
        for (color, expected) in [1, 2, 3, 0, 1, 2, 0, 3].into_iter().zip(counts) {
            assert_eq!(state.handle(color), Transition::Committed(color));
            assert_eq!(state.controlled_count, expected);
        }
        assert_eq!(state.outcome, Outcome::Won);
        assert_eq!(state.summary().moves_used, 8);
        assert!(state.handle(1).is_rejected());
        assert_eq!(state.replay(&1), Err(abort::GAME_OVER));
    }

    #[test]
    fn test_invalid_colors_are_soft_rejections() {
        let mut state = FloodState::start(&1).unwrap();
        let before = state.clone();
        assert_eq!(state.handle(0), Transition::Rejected);
        assert_eq!(state.handle(4), Transition::Rejected);
        assert_eq!(state, before);
        assert_eq!(
            state.replay(&0),
            Err(abort::SAME_COLOR)
        );
        assert_eq!(state.replay(&4), Err(abort::INVALID_COLOR));
        assert_eq!(abort::SAME_COLOR.abort_code(), 106);
    }

    #[test]
    fn test_running_out_of_moves_loses() {
        let mut state = FloodState::start(&1).unwrap();
        // Alternating two colors never absorbs the whole board
        for i in 0..12 {
            let color = if i % 2 == 0 { 1 } else { 2 };
            assert!(!state.handle(color).is_rejected());
            if state.is_terminal() {
                break;
            }
        }
        assert_eq!(state.outcome, Outcome::Lost);
        assert_eq!(state.moves_left(), 0);
        assert_eq!(state.replay(&3), Err(abort::NO_MOVES_REMAINING));
        assert_eq!(abort::NO_MOVES_REMAINING.abort_code(), 103);
    }

    #[test]
    fn test_multiple_viruses_share_the_first_color() {
        let mut state = FloodState::start(&4).unwrap();
        let color = (state.virus_color() + 1) % state.colors;
        state.handle(color);
        for &start in &state.virus_starts {
            assert_eq!(state.board[start], color);
        }
    }

    proptest! {
        #[test]
        fn test_prop_replay_matches_live(level in 1u8..=5, picks in prop::collection::vec(0u8..7, 0..40)) {
            let mut live = FloodState::start(&level).unwrap();
            let mut log = Vec::new();
            for color in picks {
                if let Transition::Committed(c) = live.handle(color) {
                    log.push(c);
                }
            }
            let replayed = FloodState::replay_all(&level, &log).unwrap();
            prop_assert_eq!(replayed, live);
        }
    }
}
