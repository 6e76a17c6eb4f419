//! batchplay - local deterministic game engines with batched on-chain replay
//!
//! Core modules:
//! - `sim`: Deterministic engines (falling blocks, maze, flood fill, box pushing)
//! - `sync`: Action log, batch reconciler and backend boundary
//! - `session`: The caller-owned handle tying an engine to its reconciler
//! - `persistence`: Versioned save envelope for resuming a session
//! - `platform`: Fixed-step scheduler driving engine ticks
//! - `settings`: Sync thresholds loaded from JSON

pub mod error;
pub mod persistence;
pub mod platform;
pub mod session;
pub mod settings;
pub mod sim;
pub mod sync;

pub use error::{ConfigError, PersistError, ReplayError, SessionError, SubmitError, SyncError};
pub use session::Session;
pub use settings::Settings;

/// Constants shared with the authoritative backend.
///
/// These are a wire contract: the backend runs the same tables, and a batch
/// replayed with different values is rejected.
pub mod consts {
    /// LCG multiplier
    pub const LCG_A: u64 = 1_664_525;
    /// LCG increment
    pub const LCG_C: u64 = 1_013_904_223;
    /// LCG modulus 2^31, applied as a mask
    pub const LCG_MASK: u64 = 0x7fff_ffff;

    /// Level seed derivation: `level * SEED_MUL + SEED_ADD`
    pub const SEED_MUL: u64 = 31_337;
    pub const SEED_ADD: u64 = 42;

    /// Falling-block board
    pub const BOARD_W: usize = 10;
    pub const BOARD_H: usize = 20;

    /// Line-clear rewards indexed by rows cleared in one lock
    pub const LINE_REWARDS: [u64; 5] = [0, 100, 300, 500, 800];
    /// Lines per level
    pub const LINES_PER_LEVEL: u32 = 10;
    /// Gravity interval at level 0 (ms)
    pub const BASE_DROP_MS: u32 = 800;
    /// Gravity speed-up per level (ms)
    pub const DROP_STEP_MS: u32 = 60;
    /// Gravity interval floor (ms)
    pub const MIN_DROP_MS: u32 = 100;
    /// Soft drop reward per row
    pub const SOFT_DROP_POINTS: u64 = 1;
    /// Hard drop reward per row
    pub const HARD_DROP_POINTS: u64 = 2;

    /// Buffered actions that trigger the must-synchronize pause
    pub const SIGN_THRESHOLD: usize = 95;
    /// Hard cap on actions in one batched call
    pub const MAX_BATCH: usize = 100;
}

/// Seed for a procedurally generated level.
#[inline]
pub fn seed_for_level(level: u8) -> u64 {
    level as u64 * consts::SEED_MUL + consts::SEED_ADD
}

/// `ceil(value * tenths / 10)` in integers.
#[inline]
pub fn scale_tenths_ceil(value: u32, tenths: u32) -> u32 {
    (value * tenths).div_ceil(10)
}
