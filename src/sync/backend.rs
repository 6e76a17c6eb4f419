//! Backend boundary
//!
//! [`Backend`] is the only I/O seam of the core. [`ReplayAuthority`] is an
//! in-process authority that re-executes every batch with the same engine,
//! the way the on-chain contract does.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::Batch;
use crate::error::{ConfigError, ReplayError, SubmitError};
use crate::sim::Game;

/// Acknowledgement of an accepted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub accepted: usize,
}

pub trait Backend<A, S> {
    /// Apply `batch` atomically: all of it or none of it.
    fn submit(&mut self, batch: &Batch<A, S>) -> Result<Receipt, SubmitError>;
}

/// Failure injected ahead of the next submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Transport,
    Reject,
}

/// Abort code used for injected rejections
pub const INJECTED_REJECT_CODE: u64 = 1;

#[derive(Debug, Clone)]
pub struct ReplayAuthority<G: Game> {
    state: G,
    applied: usize,
    finalized: bool,
    faults: VecDeque<Fault>,
    submissions: usize,
}

impl<G: Game> ReplayAuthority<G> {
    pub fn new(level: &G::Level) -> Result<Self, ConfigError> {
        Ok(Self {
            state: G::start(level)?,
            applied: 0,
            finalized: false,
            faults: VecDeque::new(),
            submissions: 0,
        })
    }

    /// State the authority currently holds
    pub fn state(&self) -> &G {
        &self.state
    }

    /// Number of actions applied so far
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn submissions(&self) -> usize {
        self.submissions
    }

    pub fn inject(&mut self, fault: Fault) {
        self.faults.push_back(fault);
    }

    fn apply(&self, batch: &Batch<G::Action, G::Summary>) -> Result<G, ReplayError> {
        if self.finalized {
            return Err(G::FINISHED);
        }
        if batch.first_index != self.applied {
            return Err(ReplayError::OutOfOrder {
                expected: self.applied,
                got: batch.first_index,
            });
        }
        let mut next = self.state.clone();
        for action in &batch.actions {
            next.replay(action)?;
        }
        if let Some(summary) = &batch.finalize {
            if *summary != next.summary() {
                return Err(ReplayError::SummaryMismatch);
            }
        }
        Ok(next)
    }
}

impl<G: Game> Backend<G::Action, G::Summary> for ReplayAuthority<G> {
    fn submit(&mut self, batch: &Batch<G::Action, G::Summary>) -> Result<Receipt, SubmitError> {
        self.submissions += 1;
        if let Some(fault) = self.faults.pop_front() {
            log::warn!("{}: injected {:?} fault", G::NAME, fault);
            return Err(match fault {
                Fault::Transport => SubmitError::Transport("connection reset".into()),
                Fault::Reject => SubmitError::Rejected {
                    code: INJECTED_REJECT_CODE,
                    message: "injected rejection".into(),
                },
            });
        }

        match self.apply(batch) {
            Ok(next) => {
                self.state = next;
                self.applied += batch.len();
                self.finalized = batch.finalize.is_some();
                log::debug!(
                    "{}: accepted {} actions, {} applied",
                    G::NAME,
                    batch.len(),
                    self.applied
                );
                Ok(Receipt {
                    accepted: batch.len(),
                })
            }
            Err(err) => {
                log::warn!("{}: rejected batch at #{}: {}", G::NAME, batch.first_index, err);
                Err(err.into())
            }
        }
    }
}
