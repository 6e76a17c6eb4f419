//! Caller-owned game session
//!
//! A [`Session`] ties one engine instance to its reconciler. The
//! presentation layer holds it by value, reads [`Session::state`] and
//! [`Session::window`] to render, and drives it only through intents,
//! ticks, undo, flush and save.
//!
//! Local and authoritative state are separate: the engine's state is the
//! optimistic local view, while [`Session::authoritative_state`] is what
//! replaying the acknowledged prefix yields.

use crate::error::{SessionError, SubmitError};
use crate::settings::Settings;
use crate::sim::{Game, Transition};
use crate::sync::{ActionLog, Backend, Batch, Receipt, Reconciler, ReconciliationWindow};

type SyncOf<G> = Reconciler<<G as Game>::Action, <G as Game>::Summary>;

#[derive(Debug, Clone)]
pub struct Session<G: Game> {
    level: G::Level,
    state: G,
    sync: SyncOf<G>,
}

impl<G: Game> Session<G> {
    pub fn start(level: G::Level, settings: &Settings) -> Result<Self, SessionError> {
        let state = G::start(&level)?;
        log::info!("{} session started", G::NAME);
        Ok(Self {
            level,
            state,
            sync: Reconciler::new(settings)?,
        })
    }

    /// Rebuild from a level and a persisted log. Every action is replayed
    /// from the start, synced prefix first.
    pub fn from_log(
        level: G::Level,
        log: ActionLog<G::Action>,
        settings: &Settings,
    ) -> Result<Self, SessionError> {
        let state = G::replay_all(&level, log.iter())?;
        log::info!(
            "{} session resumed: {} synced, {} buffered",
            G::NAME,
            log.synced_count(),
            log.buffered_count()
        );
        Ok(Self {
            level,
            state,
            sync: Reconciler::resume(log, settings)?,
        })
    }

    pub fn level(&self) -> &G::Level {
        &self.level
    }

    pub fn state(&self) -> &G {
        &self.state
    }

    pub fn window(&self) -> ReconciliationWindow {
        self.sync.window()
    }

    pub fn log(&self) -> &ActionLog<G::Action> {
        self.sync.log()
    }

    /// Log to persist: an in-flight batch counts as not applied.
    pub fn persisted_log(&self) -> ActionLog<G::Action> {
        self.sync.snapshot_log()
    }

    /// Simulation must not advance: the buffer awaits a flush.
    pub fn is_paused(&self) -> bool {
        self.sync.must_sync() || self.sync.is_pending()
    }

    fn apply(
        &mut self,
        step: impl FnOnce(&mut G) -> Transition<G::Action>,
    ) -> Result<Transition<G::Action>, SessionError> {
        if self.is_paused() {
            return Err(SessionError::Paused);
        }
        self.sync.can_record()?;
        let transition = step(&mut self.state);
        if let Transition::Committed(action) = &transition {
            self.sync.record(action.clone())?;
        }
        Ok(transition)
    }

    /// Offer a player intent. Rejections are soft (`Ok(Rejected)`).
    pub fn intent(&mut self, intent: G::Intent) -> Result<Transition<G::Action>, SessionError> {
        self.apply(|state| state.handle(intent))
    }

    /// Advance the engine clock by one step.
    pub fn tick(&mut self) -> Result<Transition<G::Action>, SessionError> {
        self.apply(|state| state.tick())
    }

    /// Undo the newest buffered action by replaying everything before it
    /// from a fresh start. Returns the removed action, if any.
    pub fn undo(&mut self) -> Result<Option<G::Action>, SessionError> {
        if self.sync.is_pending() {
            return Err(SessionError::Paused);
        }
        let log = self.sync.log();
        if log.buffered_count() == 0 {
            return Ok(None);
        }
        let keep = log.len() - 1;
        let rebuilt = G::replay_all(&self.level, log.iter().take(keep))?;
        let action = self.sync.retract()?;
        self.state = rebuilt;
        Ok(action)
    }

    pub fn flush<B>(&mut self, backend: &mut B) -> Result<usize, SessionError>
    where
        B: Backend<G::Action, G::Summary>,
    {
        Ok(self.sync.flush(backend)?)
    }

    /// Final flush of the remainder plus the summary commit.
    pub fn save<B>(&mut self, backend: &mut B) -> Result<usize, SessionError>
    where
        B: Backend<G::Action, G::Summary>,
    {
        let summary = self.state.summary();
        let sent = self.sync.save(backend, summary)?;
        log::info!("{} session saved", G::NAME);
        Ok(sent)
    }

    /// First half of an async flush; see [`Reconciler::begin_flush`].
    pub fn begin_flush(&mut self) -> Result<Option<Batch<G::Action, G::Summary>>, SessionError> {
        Ok(self.sync.begin_flush()?)
    }

    pub fn complete_flush(
        &mut self,
        result: Result<Receipt, SubmitError>,
    ) -> Result<usize, SessionError> {
        Ok(self.sync.complete_flush(result)?)
    }

    /// State the backend holds: the synced prefix replayed from the start.
    pub fn authoritative_state(&self) -> Result<G, SessionError> {
        G::replay_all(&self.level, self.sync.log().synced())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, DIVERGED_CODE, SyncError};
    use crate::sim::flood::FloodState;
    use crate::sim::maze::{MazeLevel, MazeState};
    use crate::sim::tetris::{Intent, TetrisLevel, TetrisState};
    use crate::sync::{Fault, ReplayAuthority, SyncPhase};
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    fn small(threshold: usize) -> Settings {
        Settings {
            sign_threshold: threshold,
            max_batch: threshold + 5,
            ..Settings::default()
        }
    }

    #[test]
    fn test_threshold_pauses_play_until_flushed() {
        let level = MazeLevel { level: 1 };
        let mut session: Session<MazeState> = Session::start(level.clone(), &small(4)).unwrap();
        let mut authority = ReplayAuthority::<MazeState>::new(&level).unwrap();
        let path = session
            .state()
            .maze
            .path(session.state().maze.start, session.state().maze.exit)
            .unwrap();

        for &dir in &path[..4] {
            session.intent(dir).unwrap();
        }
        assert!(session.is_paused());
        let before = session.state().clone();
        assert_eq!(session.intent(path[4]), Err(SessionError::Paused));
        assert_eq!(session.state(), &before);

        assert_eq!(session.flush(&mut authority).unwrap(), 4);
        assert!(!session.is_paused());
        assert_eq!(authority.state(), session.state());
        assert_eq!(&session.authoritative_state().unwrap(), authority.state());
    }

    #[test]
    fn test_failed_flush_keeps_play_paused_and_retries() {
        let level = MazeLevel { level: 1 };
        let mut session: Session<MazeState> = Session::start(level.clone(), &small(2)).unwrap();
        let mut authority = ReplayAuthority::<MazeState>::new(&level).unwrap();
        let path = session
            .state()
            .maze
            .path(session.state().maze.start, session.state().maze.exit)
            .unwrap();
        session.intent(path[0]).unwrap();
        session.intent(path[1]).unwrap();

        authority.inject(Fault::Transport);
        assert!(matches!(
            session.flush(&mut authority),
            Err(SessionError::Sync(SyncError::Submit(SubmitError::Transport(_))))
        ));
        let window = session.window();
        assert_eq!((window.buffered, window.synced), (2, 0));
        assert!(window.must_sync);
        assert!(session.is_paused());
        assert_eq!(authority.applied(), 0);

        assert_eq!(session.flush(&mut authority).unwrap(), 2);
        assert_eq!(session.window().synced, 2);
        assert!(!session.is_paused());
    }

    #[test]
    fn test_rejected_intents_are_not_recorded() {
        let mut session: Session<FloodState> = Session::start(1, &Settings::default()).unwrap();
        assert_eq!(session.intent(0).unwrap(), Transition::Rejected);
        assert_eq!(session.window().buffered, 0);
        assert_eq!(session.intent(1).unwrap(), Transition::Committed(1));
        assert_eq!(session.window().buffered, 1);
    }

    #[test]
    fn test_undo_replays_all_but_last() {
        let mut session: Session<FloodState> = Session::start(1, &Settings::default()).unwrap();
        session.intent(1).unwrap();
        let after_one = session.state().clone();
        session.intent(2).unwrap();

        assert_eq!(session.undo().unwrap(), Some(2));
        assert_eq!(session.state(), &after_one);
        assert_eq!(session.window().buffered, 1);

        assert_eq!(session.undo().unwrap(), Some(1));
        assert_eq!(session.state(), &FloodState::start(&1).unwrap());
        assert_eq!(session.undo().unwrap(), None);
    }

    #[test]
    fn test_undo_never_touches_synced_actions() {
        let mut session: Session<FloodState> = Session::start(1, &Settings::default()).unwrap();
        let mut authority = ReplayAuthority::<FloodState>::new(&1).unwrap();
        session.intent(1).unwrap();
        session.flush(&mut authority).unwrap();
        let synced = session.state().clone();
        assert_eq!(session.undo().unwrap(), None);
        assert_eq!(session.state(), &synced);
    }

    #[test]
    fn test_async_flush_pauses_until_resolved() {
        let mut session: Session<FloodState> = Session::start(1, &Settings::default()).unwrap();
        session.intent(1).unwrap();
        let batch = session.begin_flush().unwrap().unwrap();
        assert_eq!(batch.actions, vec![1]);
        assert_eq!(session.intent(2), Err(SessionError::Paused));
        assert_eq!(session.undo(), Err(SessionError::Paused));

        let mut authority = ReplayAuthority::<FloodState>::new(&1).unwrap();
        let result = authority.submit(&batch);
        assert_eq!(session.complete_flush(result).unwrap(), 1);
        assert!(session.intent(2).is_ok());
    }

    #[test]
    fn test_save_commits_summary_and_finalizes() {
        let mut session: Session<FloodState> = Session::start(1, &Settings::default()).unwrap();
        let mut authority = ReplayAuthority::<FloodState>::new(&1).unwrap();
        for color in [1, 2, 3, 0, 1, 2, 0, 3] {
            session.intent(color).unwrap();
        }
        assert!(session.state().is_terminal());
        assert_eq!(session.save(&mut authority).unwrap(), 8);
        assert!(authority.is_finalized());
        assert_eq!(session.window().phase, SyncPhase::Finalized);
        assert_eq!(
            session.intent(1),
            Err(SessionError::Sync(SyncError::Finalized))
        );
    }

    #[test]
    fn test_tampered_action_is_rejected_and_restored() {
        let level = TetrisLevel { seed: 5 };
        let mut session: Session<TetrisState> = Session::start(level.clone(), &Settings::default()).unwrap();
        let mut authority = ReplayAuthority::<TetrisState>::new(&level).unwrap();
        session.intent(Intent::HardDrop).unwrap();

        // Forge the next batch by hand
        let mut batch = session.begin_flush().unwrap().unwrap();
        batch.actions[0].score += 10;
        let result = authority.submit(&batch);
        assert!(matches!(
            result,
            Err(SubmitError::Rejected { code: DIVERGED_CODE, .. })
        ));
        assert!(session.complete_flush(result).is_err());
        assert_eq!(session.window().buffered, 1);

        assert_eq!(session.flush(&mut authority).unwrap(), 1);
        assert_eq!(authority.state(), session.state());
    }

    #[test]
    fn test_tetris_autoplay_stays_in_lockstep_with_authority() {
        let level = TetrisLevel { seed: 31_379 };
        let settings = small(3);
        let mut session: Session<TetrisState> = Session::start(level.clone(), &settings).unwrap();
        let mut authority = ReplayAuthority::<TetrisState>::new(&level).unwrap();
        let mut rng = Pcg32::seed_from_u64(7);
        let mut failures = 0;
        let mut injected = false;

        for _ in 0..5000 {
            if session.state().is_terminal() {
                break;
            }
            if session.is_paused() {
                if !injected {
                    authority.inject(Fault::Reject);
                    injected = true;
                }
                match session.flush(&mut authority) {
                    Ok(_) => assert_eq!(
                        &session.authoritative_state().unwrap(),
                        authority.state()
                    ),
                    Err(_) => failures += 1,
                }
                continue;
            }
            let intent = match rng.random_range(0..8) {
                0 | 1 => Intent::Left,
                2 | 3 => Intent::Right,
                4 => Intent::Rotate,
                5 => Intent::Hold,
                6 => Intent::SoftDrop,
                _ => Intent::HardDrop,
            };
            if rng.random_range(0..4) == 0 {
                session.tick().unwrap();
            } else {
                session.intent(intent).unwrap();
            }
        }

        session.save(&mut authority).unwrap();
        assert_eq!(failures, 1);
        // Local-only moves after the last lock never reach the authority
        assert_eq!(authority.state().summary(), session.state().summary());
        assert_eq!(&session.authoritative_state().unwrap(), authority.state());
        assert_eq!(session.window().synced, session.log().len());
    }

    #[test]
    fn test_resumed_session_matches_original() {
        let level = MazeLevel { level: 2 };
        let mut session: Session<MazeState> = Session::start(level.clone(), &small(50)).unwrap();
        let path = session
            .state()
            .maze
            .path(session.state().maze.start, session.state().maze.exit)
            .unwrap();
        for &dir in &path[..10] {
            session.intent(dir).unwrap();
        }
        let resumed: Session<MazeState> =
            Session::from_log(level, session.persisted_log(), &small(50)).unwrap();
        assert_eq!(resumed.state(), session.state());
        assert_eq!(resumed.window(), session.window());
        assert_eq!(resumed.log().buffered().count(), 10);
    }

    #[test]
    fn test_threshold_above_batch_cap_is_refused() {
        let settings = Settings {
            sign_threshold: 10,
            max_batch: 3,
            ..Settings::default()
        };
        assert!(matches!(
            Session::<FloodState>::start(1, &settings),
            Err(SessionError::Config(ConfigError::InvalidSettings(_)))
        ));
        assert!(matches!(
            Session::<FloodState>::from_log(1, ActionLog::new(), &settings),
            Err(SessionError::Config(ConfigError::InvalidSettings(_)))
        ));

        let zero = Settings {
            sign_threshold: 0,
            ..Settings::default()
        };
        assert!(Session::<FloodState>::start(1, &zero).is_err());
    }
}
