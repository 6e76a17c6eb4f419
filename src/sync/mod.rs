//! Action log and batch reconciliation
//!
//! The reconciler decouples "the player is playing" from "the backend has
//! acknowledged play". Committed actions are buffered locally and shipped
//! as one atomic batch; a failed batch is put back at the front of the
//! buffer so nothing the player did is lost.
//!
//! Flushing is split in two phases so an async caller can hold the batch
//! across an await point:
//!
//! ```text
//! begin_flush() -> Batch --(network)--> complete_flush(result)
//! ```
//!
//! At most one batch is in flight. Everything here is single-owner and
//! synchronous; the only suspending step belongs to the caller.

pub mod backend;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SubmitError, SyncError};
use crate::settings::Settings;

pub use backend::{Backend, Fault, Receipt, ReplayAuthority};

/// Ordered action history: the acknowledged prefix plus the local tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog<A> {
    synced: Vec<A>,
    buffered: VecDeque<A>,
}

impl<A> Default for ActionLog<A> {
    fn default() -> Self {
        Self {
            synced: Vec::new(),
            buffered: VecDeque::new(),
        }
    }
}

impl<A> ActionLog<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synced(&self) -> &[A] {
        &self.synced
    }

    pub fn buffered(&self) -> impl Iterator<Item = &A> {
        self.buffered.iter()
    }

    pub fn synced_count(&self) -> usize {
        self.synced.len()
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    pub fn len(&self) -> usize {
        self.synced.len() + self.buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every action in replay order.
    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.synced.iter().chain(self.buffered.iter())
    }

    fn push(&mut self, action: A) {
        self.buffered.push_back(action);
    }

    fn pop(&mut self) -> Option<A> {
        self.buffered.pop_back()
    }

    fn drain_front(&mut self, n: usize) -> Vec<A> {
        let n = n.min(self.buffered.len());
        self.buffered.drain(..n).collect()
    }

    /// Put a failed batch back ahead of anything recorded since.
    fn restore_front(&mut self, actions: Vec<A>) {
        for action in actions.into_iter().rev() {
            self.buffered.push_front(action);
        }
    }

    fn acknowledge(&mut self, actions: Vec<A>) {
        self.synced.extend(actions);
    }
}

/// One atomic submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch<A, S> {
    /// Synced count when the batch was cut; the backend's expected cursor
    pub first_index: usize,
    pub actions: Vec<A>,
    /// Final summary commit, present only on the save variant
    pub finalize: Option<S>,
}

impl<A, S> Batch<A, S> {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Nothing buffered
    Idle,
    /// Actions buffered, below threshold or after a failed flush
    Buffering,
    /// Threshold reached or a batch is in flight; records are refused
    AwaitingFlush,
    /// Save batch accepted; the session is closed
    Finalized,
}

/// Read-only view of the reconciler counters for status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationWindow {
    pub buffered: usize,
    pub synced: usize,
    pub in_flight: usize,
    /// A batch is awaiting its result
    pub pending: bool,
    /// Play must pause until a flush succeeds
    pub must_sync: bool,
    pub phase: SyncPhase,
    pub last_error: Option<SubmitError>,
}

#[derive(Debug, Clone)]
pub struct Reconciler<A, S> {
    log: ActionLog<A>,
    in_flight: Option<Batch<A, S>>,
    sign_threshold: usize,
    max_batch: usize,
    /// The threshold signal fired and has not been cleared by a success
    signalled: bool,
    must_sync: bool,
    phase: SyncPhase,
    last_error: Option<SubmitError>,
}

impl<A: Clone, S: Clone> Reconciler<A, S> {
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        Self::resume(ActionLog::new(), settings)
    }

    /// Rebuild around a persisted log, re-raising the signal if the buffer
    /// is already at threshold. Settings the signal could never honor are
    /// refused.
    pub fn resume(log: ActionLog<A>, settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut sync = Self {
            log,
            in_flight: None,
            sign_threshold: settings.sign_threshold,
            max_batch: settings.max_batch,
            signalled: false,
            must_sync: false,
            phase: SyncPhase::Idle,
            last_error: None,
        };
        sync.settle();
        Ok(sync)
    }

    pub fn log(&self) -> &ActionLog<A> {
        &self.log
    }

    /// The log with any in-flight batch folded back into the buffer.
    pub fn snapshot_log(&self) -> ActionLog<A> {
        let mut log = self.log.clone();
        if let Some(batch) = &self.in_flight {
            log.restore_front(batch.actions.clone());
        }
        log
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn must_sync(&self) -> bool {
        self.must_sync
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn window(&self) -> ReconciliationWindow {
        ReconciliationWindow {
            buffered: self.log.buffered_count(),
            synced: self.log.synced_count(),
            in_flight: self.in_flight.as_ref().map_or(0, Batch::len),
            pending: self.in_flight.is_some(),
            must_sync: self.must_sync,
            phase: self.phase,
            last_error: self.last_error.clone(),
        }
    }

    /// Whether [`record`](Self::record) would accept an action right now.
    pub fn can_record(&self) -> Result<(), SyncError> {
        if self.phase == SyncPhase::Finalized {
            return Err(SyncError::Finalized);
        }
        if self.in_flight.is_some() {
            return Err(SyncError::FlushInFlight);
        }
        if self.phase == SyncPhase::AwaitingFlush {
            return Err(SyncError::AwaitingFlush);
        }
        if self.log.buffered_count() >= self.max_batch {
            return Err(SyncError::BatchFull(self.max_batch));
        }
        Ok(())
    }

    /// Append a committed action.
    ///
    /// Returns `true` exactly when this record raised the must-synchronize
    /// signal. The signal fires once per threshold crossing and is only
    /// re-armed by a successful flush.
    pub fn record(&mut self, action: A) -> Result<bool, SyncError> {
        self.can_record()?;
        self.log.push(action);
        self.phase = SyncPhase::Buffering;

        let buffered = self.log.buffered_count();
        log::debug!(
            "recorded action: {} buffered / threshold {}",
            buffered,
            self.sign_threshold
        );

        if !self.signalled && buffered >= self.sign_threshold {
            self.signalled = true;
            self.must_sync = true;
            self.phase = SyncPhase::AwaitingFlush;
            log::info!("buffer reached {} actions, must synchronize", buffered);
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop the newest buffered action. Acknowledged actions never move.
    pub fn retract(&mut self) -> Result<Option<A>, SyncError> {
        if self.phase == SyncPhase::Finalized {
            return Err(SyncError::Finalized);
        }
        if self.in_flight.is_some() {
            return Err(SyncError::FlushInFlight);
        }
        let action = self.log.pop();
        if self.log.buffered_count() < self.sign_threshold {
            self.signalled = false;
            self.must_sync = false;
        }
        self.settle();
        Ok(action)
    }

    fn cut(&mut self, finalize: Option<S>) -> Batch<A, S> {
        let first_index = self.log.synced_count();
        let actions = self.log.drain_front(self.max_batch);
        let batch = Batch {
            first_index,
            actions,
            finalize,
        };
        self.in_flight = Some(batch.clone());
        self.phase = SyncPhase::AwaitingFlush;
        log::info!(
            "flush begin: {} actions from #{}{}",
            batch.len(),
            first_index,
            if batch.finalize.is_some() { " (final)" } else { "" }
        );
        batch
    }

    /// Cut the next batch. `None` when there is nothing to send, which
    /// counts as an immediate success.
    pub fn begin_flush(&mut self) -> Result<Option<Batch<A, S>>, SyncError> {
        if self.phase == SyncPhase::Finalized {
            return Err(SyncError::Finalized);
        }
        if self.in_flight.is_some() {
            return Err(SyncError::FlushInFlight);
        }
        if self.log.buffered_count() == 0 {
            self.signalled = false;
            self.must_sync = false;
            self.last_error = None;
            self.phase = SyncPhase::Idle;
            return Ok(None);
        }
        Ok(Some(self.cut(None)))
    }

    /// Cut the terminal batch: the whole remainder plus `summary`.
    pub fn begin_save(&mut self, summary: S) -> Result<Batch<A, S>, SyncError> {
        if self.phase == SyncPhase::Finalized {
            return Err(SyncError::Finalized);
        }
        if self.in_flight.is_some() {
            return Err(SyncError::FlushInFlight);
        }
        if self.log.buffered_count() > self.max_batch {
            return Err(SyncError::BatchFull(self.max_batch));
        }
        Ok(self.cut(Some(summary)))
    }

    /// Resolve the in-flight batch. Returns the number of actions
    /// acknowledged; on failure the batch is back in the buffer.
    pub fn complete_flush(&mut self, result: Result<Receipt, SubmitError>) -> Result<usize, SyncError> {
        let batch = self.in_flight.take().ok_or(SyncError::NothingInFlight)?;

        let result = result.and_then(|receipt| {
            if receipt.accepted == batch.len() {
                Ok(receipt)
            } else {
                Err(SubmitError::Transport(format!(
                    "receipt acknowledged {} of {} actions",
                    receipt.accepted,
                    batch.len()
                )))
            }
        });

        match result {
            Ok(_) => {
                let count = batch.len();
                let finalized = batch.finalize.is_some();
                self.log.acknowledge(batch.actions);
                self.last_error = None;
                self.signalled = false;
                self.must_sync = false;
                if finalized {
                    self.phase = SyncPhase::Finalized;
                } else {
                    self.settle();
                }
                log::info!(
                    "flush ok: {} actions, {} synced total",
                    count,
                    self.log.synced_count()
                );
                Ok(count)
            }
            Err(err) => {
                log::warn!("flush failed, restoring {} actions: {}", batch.len(), err);
                self.log.restore_front(batch.actions);
                self.last_error = Some(err.clone());
                self.phase = SyncPhase::Buffering;
                Err(SyncError::Submit(err))
            }
        }
    }

    /// Blocking flush through `backend`.
    pub fn flush<B: Backend<A, S>>(&mut self, backend: &mut B) -> Result<usize, SyncError> {
        match self.begin_flush()? {
            Some(batch) => {
                let result = backend.submit(&batch);
                self.complete_flush(result)
            }
            None => Ok(0),
        }
    }

    /// Blocking save through `backend`.
    pub fn save<B: Backend<A, S>>(&mut self, backend: &mut B, summary: S) -> Result<usize, SyncError> {
        let batch = self.begin_save(summary)?;
        let result = backend.submit(&batch);
        self.complete_flush(result)
    }

    /// Recompute phase and signal from the buffer size.
    fn settle(&mut self) {
        let buffered = self.log.buffered_count();
        if !self.signalled && buffered >= self.sign_threshold {
            self.signalled = true;
            self.must_sync = true;
        }
        self.phase = if self.must_sync && self.last_error.is_none() {
            SyncPhase::AwaitingFlush
        } else if buffered == 0 {
            SyncPhase::Idle
        } else {
            SyncPhase::Buffering
        };
    }
}
