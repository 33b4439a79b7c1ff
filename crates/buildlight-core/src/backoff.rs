//! Bounded retry backoff for build watchers

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay table in seconds. The Nth consecutive failure waits `BACKOFF_SECS[N]`;
/// running off the end of the table is exhaustion.
pub const BACKOFF_SECS: [u64; 18] = [
    1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 253, 600, 1000, 2000, 4000, 10000,
];

/// What to do once a watcher has used up the whole backoff table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Stop the engine so a process supervisor can restart it fresh
    #[default]
    Terminate,
    /// Log the outage and leave the watcher idle until the next reconciliation
    Idle,
}

/// Outcome of asking for a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay
    Wait(Duration),
    /// A retry is already scheduled; this request is ignored
    AlreadyPending,
    /// No table entry left
    Exhausted { failures: usize },
}

/// Retry bookkeeping for one watcher
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    index: usize,
    pending: bool,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and decide when to retry.
    ///
    /// Ignored while a retry is pending; call [`RetryState::fired`] when the
    /// scheduled retry starts.
    pub fn request(&mut self) -> RetryDecision {
        if self.pending {
            return RetryDecision::AlreadyPending;
        }
        self.index = (self.index + 1).min(BACKOFF_SECS.len());
        match BACKOFF_SECS.get(self.index) {
            Some(&secs) => {
                self.pending = true;
                RetryDecision::Wait(Duration::from_secs(secs))
            }
            None => RetryDecision::Exhausted {
                failures: self.index,
            },
        }
    }

    /// Delay of the retry currently scheduled, if any
    pub fn pending_delay(&self) -> Option<Duration> {
        if !self.pending {
            return None;
        }
        BACKOFF_SECS
            .get(self.index)
            .map(|&secs| Duration::from_secs(secs))
    }

    /// The scheduled retry is starting
    pub fn fired(&mut self) {
        self.pending = false;
    }

    /// A fetch succeeded
    pub fn reset(&mut self) {
        self.index = 0;
        self.pending = false;
    }

    /// Consecutive failures recorded since the last reset
    pub fn failures(&self) -> usize {
        self.index
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
