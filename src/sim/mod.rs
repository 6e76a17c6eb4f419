//! Deterministic simulation module
//!
//! All gameplay rules live here. This module must be pure and deterministic:
//! - Integer state only (nothing that must match the backend is a float)
//! - Seeded LCG only
//! - Stable iteration order (row-major, fixed neighbor order)
//! - No I/O, no clocks, no platform dependencies
//!
//! A rejected intent leaves the state untouched.

pub mod flood;
pub mod maze;
pub mod rng;
pub mod sokoban;
pub mod tetris;

use std::fmt::Debug;

use glam::IVec2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ReplayError};

pub use rng::Lcg;

/// Cardinal direction. Discriminants are the backend's wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    /// Grid step (`y` grows downward)
    pub fn delta(self) -> IVec2 {
        match self {
            Direction::Up => IVec2::new(0, -1),
            Direction::Right => IVec2::new(1, 0),
            Direction::Down => IVec2::new(0, 1),
            Direction::Left => IVec2::new(-1, 0),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Result of offering an intent (or a tick) to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<A> {
    /// Invalid or no-op; state is unchanged
    Rejected,
    /// State changed but there is nothing for the backend to replay yet
    Moved,
    /// State changed and `A` must be appended to the action log
    Committed(A),
}

impl<A> Transition<A> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Transition::Rejected)
    }

    pub fn action(&self) -> Option<&A> {
        match self {
            Transition::Committed(action) => Some(action),
            _ => None,
        }
    }
}

/// A deterministic engine mirrored by an authoritative backend.
///
/// The state value is the whole snapshot: continuing from a clone must
/// behave exactly like continuing from the original.
pub trait Game: Clone + Debug + PartialEq + Serialize + DeserializeOwned {
    /// Level/session identity the initial state is derived from
    type Level: Clone + Debug + PartialEq + Serialize + DeserializeOwned;
    /// Player input accepted by [`Game::handle`]
    type Intent: Clone + Debug;
    /// Log entry replayed by the backend
    type Action: Clone + Debug + PartialEq + Serialize + DeserializeOwned;
    /// Final commit payload submitted with the last batch
    type Summary: Clone + Debug + PartialEq + Serialize + DeserializeOwned;

    /// Short identifier used in save headers and logs
    const NAME: &'static str;

    /// Backend rejection for actions submitted after the final commit
    const FINISHED: ReplayError;

    fn start(level: &Self::Level) -> Result<Self, ConfigError>;

    /// Validate and apply one intent.
    fn handle(&mut self, intent: Self::Intent) -> Transition<Self::Action>;

    /// Timer-driven step (gravity). Turn-based engines never move on ticks.
    fn tick(&mut self) -> Transition<Self::Action> {
        Transition::Rejected
    }

    /// Backend-equivalent transition: re-derives the action's effect and
    /// checks any totals it claims. On error the state is unchanged.
    fn replay(&mut self, action: &Self::Action) -> Result<(), ReplayError>;

    fn is_terminal(&self) -> bool;

    fn summary(&self) -> Self::Summary;

    /// Interval between ticks, if the engine is paced.
    fn tick_interval_ms(&self) -> Option<u32> {
        None
    }

    /// Rebuild a state from its level and an ordered action list.
    fn replay_all<'a, I>(level: &Self::Level, actions: I) -> Result<Self, crate::SessionError>
    where
        I: IntoIterator<Item = &'a Self::Action>,
        Self::Action: 'a,
    {
        let mut state = Self::start(level)?;
        for action in actions {
            state.replay(action)?;
        }
        Ok(state)
    }
}
