//! Platform abstraction layer
//!
//! Time enters the core only here. Frame callbacks report elapsed
//! milliseconds; [`FixedStep`] turns them into a bounded number of engine
//! ticks so the simulation never depends on frame rate.

use crate::error::SessionError;
use crate::session::Session;
use crate::sim::Game;

/// Ticks run per frame at most; time beyond that is dropped
pub const MAX_SUBSTEPS: u32 = 8;
/// Longest frame accepted (tab switches, debugger pauses)
pub const MAX_FRAME_MS: u32 = 250;

/// Accumulator-based fixed-step clock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedStep {
    accumulator_ms: u32,
}

impl FixedStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `dt_ms` of wall time and return how many `interval_ms` ticks
    /// are due.
    pub fn advance(&mut self, dt_ms: u32, interval_ms: u32) -> u32 {
        let interval = interval_ms.max(1);
        self.accumulator_ms += dt_ms.min(MAX_FRAME_MS);

        let due = self.accumulator_ms / interval;
        if due > MAX_SUBSTEPS {
            // Spiral of death: drop the backlog
            self.accumulator_ms = 0;
            return MAX_SUBSTEPS;
        }
        self.accumulator_ms -= due * interval;
        due
    }

    pub fn pending_ms(&self) -> u32 {
        self.accumulator_ms
    }

    pub fn reset(&mut self) {
        self.accumulator_ms = 0;
    }
}

/// Run the ticks due this frame. Stops early (and drops banked time) if
/// the session pauses for synchronization. Returns ticks run.
pub fn drive<G: Game>(
    session: &mut Session<G>,
    clock: &mut FixedStep,
    dt_ms: u32,
) -> Result<u32, SessionError> {
    let Some(interval) = session.state().tick_interval_ms() else {
        return Ok(0);
    };
    if session.is_paused() {
        clock.reset();
        return Ok(0);
    }

    let due = clock.advance(dt_ms, interval);
    let mut ran = 0;
    while ran < due {
        if session.is_paused() || session.state().is_terminal() {
            clock.reset();
            break;
        }
        session.tick()?;
        ran += 1;
    }
    Ok(ran)
}
