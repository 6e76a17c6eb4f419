//! Save/load persistence
//!
//! Features:
//! - Versioned JSON envelope with a magic header
//! - Engine name check so a maze save never loads as a puzzle
//! - In-flight batches written back as buffered (assumed not applied)
//!
//! Only the level identity and the action log are stored. The state is
//! rebuilt by replay, which doubles as the integrity check.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::session::Session;
use crate::settings::Settings;
use crate::sim::Game;
use crate::sync::ActionLog;

pub const SAVE_MAGIC: &str = "BPLY";
pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SaveEnvelope<G: Game> {
    pub magic: String,
    pub version: u32,
    pub game: String,
    pub level: G::Level,
    pub log: ActionLog<G::Action>,
}

impl<G: Game> SaveEnvelope<G> {
    pub fn new(level: G::Level, log: ActionLog<G::Action>) -> Self {
        Self {
            magic: SAVE_MAGIC.to_string(),
            version: SAVE_VERSION,
            game: G::NAME.to_string(),
            level,
            log,
        }
    }

    pub fn validate(&self) -> Result<(), PersistError> {
        if self.magic != SAVE_MAGIC || self.game != G::NAME {
            return Err(PersistError::InvalidHeader);
        }
        if self.version != SAVE_VERSION {
            return Err(PersistError::IncompatibleVersion {
                expected: SAVE_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }
}

impl<G: Game> Session<G> {
    pub fn snapshot(&self) -> SaveEnvelope<G> {
        SaveEnvelope::new(self.level().clone(), self.persisted_log())
    }

    /// Validate the header and replay the saved log.
    pub fn resume(envelope: SaveEnvelope<G>, settings: &Settings) -> Result<Self, PersistError> {
        envelope.validate()?;
        Ok(Session::from_log(envelope.level, envelope.log, settings)?)
    }
}

pub fn save_to_path<G: Game>(envelope: &SaveEnvelope<G>, path: &Path) -> Result<(), PersistError> {
    let json = serde_json::to_string(envelope)?;
    fs::write(path, json)?;
    log::info!(
        "saved {} session ({} actions) to {}",
        envelope.game,
        envelope.log.len(),
        path.display()
    );
    Ok(())
}

/// Header fields, decoded before the engine-specific payload.
#[derive(Deserialize)]
struct Header {
    magic: String,
    game: String,
}

pub fn load_from_path<G: Game>(path: &Path) -> Result<SaveEnvelope<G>, PersistError> {
    let json = fs::read_to_string(path)?;
    let header: Header = serde_json::from_str(&json)?;
    if header.magic != SAVE_MAGIC || header.game != G::NAME {
        return Err(PersistError::InvalidHeader);
    }
    let envelope: SaveEnvelope<G> = serde_json::from_str(&json)?;
    envelope.validate()?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::sim::tetris::{Intent, TetrisLevel, TetrisState};
    use crate::sim::flood::FloodState;
    use crate::sync::ReplayAuthority;

    fn played_tetris() -> Session<TetrisState> {
        let mut session = Session::start(TetrisLevel { seed: 11 }, &Settings::default()).unwrap();
        for intent in [Intent::Left, Intent::HardDrop, Intent::Rotate, Intent::HardDrop] {
            session.intent(intent).unwrap();
        }
        session
    }

    #[test]
    fn test_resume_rebuilds_identical_state() {
        let mut session = played_tetris();
        let mut authority = ReplayAuthority::<TetrisState>::new(&TetrisLevel { seed: 11 }).unwrap();
        session.flush(&mut authority).unwrap();
        session.intent(Intent::HardDrop).unwrap();

        let json = serde_json::to_string(&session.snapshot()).unwrap();
        let envelope: SaveEnvelope<TetrisState> = serde_json::from_str(&json).unwrap();
        let resumed = Session::resume(envelope, &Settings::default()).unwrap();

        assert_eq!(resumed.state(), session.state());
        assert_eq!(resumed.window().synced, 2);
        assert_eq!(resumed.window().buffered, 1);
        assert_eq!(&resumed.authoritative_state().unwrap(), authority.state());
    }

    #[test]
    fn test_in_flight_batch_is_saved_as_buffered() {
        let mut session = played_tetris();
        session.begin_flush().unwrap();
        let envelope = session.snapshot();
        assert_eq!(envelope.log.synced_count(), 0);
        assert_eq!(envelope.log.buffered_count(), 2);
    }

    #[test]
    fn test_header_is_checked() {
        let mut envelope = played_tetris().snapshot();
        envelope.version = 2;
        assert!(matches!(
            Session::resume(envelope.clone(), &Settings::default()),
            Err(PersistError::IncompatibleVersion { expected: 1, found: 2 })
        ));

        envelope.version = SAVE_VERSION;
        envelope.game = "maze".into();
        assert!(matches!(envelope.validate(), Err(PersistError::InvalidHeader)));
    }

    #[test]
    fn test_tampered_log_fails_replay() {
        let mut session: Session<FloodState> = Session::start(1, &Settings::default()).unwrap();
        session.intent(1).unwrap();
        let mut envelope = session.snapshot();
        // Same color twice is illegal
        envelope.log = serde_json::from_str(r#"{"synced":[],"buffered":[1,1]}"#).unwrap();
        assert!(matches!(
            Session::resume(envelope, &Settings::default()),
            Err(PersistError::Replay(SessionError::Replay(_)))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("batchplay-save-{}.json", std::process::id()));
        let session = played_tetris();
        save_to_path(&session.snapshot(), &path).unwrap();
        let envelope = load_from_path::<TetrisState>(&path).unwrap();
        assert_eq!(envelope, session.snapshot());
        assert!(matches!(
            load_from_path::<FloodState>(&path),
            Err(PersistError::InvalidHeader)
        ));
        let _ = fs::remove_file(&path);
    }
}
