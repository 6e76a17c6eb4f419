//! Error taxonomy
//!
//! Invalid local intents are not errors: engines report them as
//! [`Transition::Rejected`](crate::sim::Transition::Rejected). Everything
//! here is either fatal for a level (`ConfigError`) or recoverable by
//! retrying a flush.

use thiserror::Error;

/// Level data or generator failure. Fatal for the session: no play is possible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid level {level} (expected 1..={max})")]
    InvalidLevel { level: u8, max: u8 },

    #[error("level {level}: exit is unreachable from start")]
    UnreachableExit { level: u8 },

    #[error("malformed level data: {0}")]
    MalformedLevel(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Abort codes for checks the replay authority makes on top of the
/// engine rules. Kept clear of the backend tables, which use 100..=109.
pub const DIVERGED_CODE: u64 = 900;
pub const SUMMARY_MISMATCH_CODE: u64 = 901;
pub const OUT_OF_ORDER_CODE: u64 = 902;

/// The authoritative transition refused an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// An engine rule, tagged with that game's backend abort code
    #[error("{reason} (abort code {code})")]
    Rejected { code: u64, reason: &'static str },

    #[error("claimed {field} {claimed} but replay derived {derived}")]
    Diverged {
        field: &'static str,
        claimed: u64,
        derived: u64,
    },

    #[error("final summary does not match replayed state")]
    SummaryMismatch,

    #[error("batch starts at action {got}, backend holds {expected}")]
    OutOfOrder { expected: usize, got: usize },
}

impl ReplayError {
    pub const fn rejected(code: u64, reason: &'static str) -> Self {
        ReplayError::Rejected { code, reason }
    }

    /// Code reported to the caller when a batch is refused.
    pub fn abort_code(&self) -> u64 {
        match self {
            ReplayError::Rejected { code, .. } => *code,
            ReplayError::Diverged { .. } => DIVERGED_CODE,
            ReplayError::SummaryMismatch => SUMMARY_MISMATCH_CODE,
            ReplayError::OutOfOrder { .. } => OUT_OF_ORDER_CODE,
        }
    }
}

/// Outcome of a batch submission that did not go through.
///
/// Both variants are handled the same way: the batch is restored to the
/// buffer and the caller may retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("backend rejected batch (code {code}): {message}")]
    Rejected { code: u64, message: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<ReplayError> for SubmitError {
    fn from(err: ReplayError) -> Self {
        SubmitError::Rejected {
            code: err.abort_code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("a flush is already in flight")]
    FlushInFlight,

    #[error("buffer reached the sign threshold; flush before recording more")]
    AwaitingFlush,

    #[error("buffer is full ({0} actions)")]
    BatchFull(usize),

    #[error("session already finalized")]
    Finalized,

    #[error("no flush in flight")]
    NothingInFlight,

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("play is paused until the buffer is synchronized")]
    Paused,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid save header")]
    InvalidHeader,

    #[error("incompatible save version: expected {expected}, found {found}")]
    IncompatibleVersion { expected: u32, found: u32 },

    #[error("saved log does not replay: {0}")]
    Replay(#[from] SessionError),
}
