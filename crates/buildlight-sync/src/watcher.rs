//! Build watcher - keeps one device in step with one build
//!
//! A watcher fetches the current status, then follows the live update stream.
//! Fetch failures back off through [`BACKOFF_SECS`](buildlight_core::BACKOFF_SECS);
//! a failing stream is escalated to the reconciler, which rebuilds every
//! watcher. Everything the watcher wants to show is sent to the reconciler as
//! a [`SyncEvent`] tagged with the watcher's generation.

use buildlight_core::{
    BuildId, BuildStatus, Generation, HardwareIdentity, RetryDecision, RetryState, BACKOFF_SECS,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::api::{BuildSource, LiveEvent};
use crate::error::ApiError;
use crate::event::SyncEvent;

/// Default time the updating color is held before the resolved status
pub const DEFAULT_DWELL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    RetryWait,
}

impl std::fmt::Display for WatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::RetryWait => "retry_wait",
        };
        f.write_str(name)
    }
}

pub struct Watcher<S: BuildSource> {
    generation: Generation,
    identity: HardwareIdentity,
    build: BuildId,
    source: Arc<S>,
    events: UnboundedSender<SyncEvent>,
    dwell: Duration,
    idle_timeout: Option<Duration>,
    retry: RetryState,
}

impl<S: BuildSource> Watcher<S> {
    pub fn new(
        generation: Generation,
        identity: HardwareIdentity,
        build: BuildId,
        source: Arc<S>,
        events: UnboundedSender<SyncEvent>,
    ) -> Self {
        Self {
            generation,
            identity,
            build,
            source,
            events,
            dwell: DEFAULT_DWELL,
            idle_timeout: None,
            retry: RetryState::new(),
        }
    }

    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    /// Treat a live stream that stays silent for `limit` as failed
    pub fn with_idle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.idle_timeout = limit;
        self
    }

    /// Drive the watcher until its stream fails or its retries run out
    pub async fn run(mut self) {
        loop {
            self.set_state(WatcherState::Connecting);
            self.report(BuildStatus::Connecting);

            match self.source.fetch_status(&self.build).await {
                Ok(raw) => {
                    self.retry.reset();
                    info!(device = %self.identity, build = %self.build, status = %raw, "Fetched build status");
                    self.render(&raw);

                    self.set_state(WatcherState::Streaming);
                    let error = self.stream_updates().await;
                    warn!(device = %self.identity, build = %self.build, error = %error, "Live stream failed");
                    self.emit(SyncEvent::StreamFailed {
                        generation: self.generation,
                        identity: self.identity.clone(),
                        error: error.to_string(),
                    });
                    return;
                }
                Err(e) => {
                    warn!(device = %self.identity, build = %self.build, error = %e, "Build status fetch failed");
                    if !self.wait_for_retry().await {
                        return;
                    }
                }
            }
        }
    }

    /// Sleep out the next backoff delay. Returns false once retries are exhausted.
    async fn wait_for_retry(&mut self) -> bool {
        let delay = match self.retry.request() {
            RetryDecision::Wait(delay) => {
                debug!(
                    device = %self.identity,
                    build = %self.build,
                    failures = self.retry.failures(),
                    delay_secs = delay.as_secs(),
                    "Scheduling retry"
                );
                delay
            }
            // the scheduled retry still owns the delay; never refetch early
            RetryDecision::AlreadyPending => {
                let delay = self
                    .retry
                    .pending_delay()
                    .unwrap_or(Duration::from_secs(BACKOFF_SECS[1]));
                debug!(device = %self.identity, delay_secs = delay.as_secs(), "Retry already pending");
                delay
            }
            RetryDecision::Exhausted { failures } => {
                error!(device = %self.identity, build = %self.build, failures, "Retries exhausted");
                self.set_state(WatcherState::Idle);
                self.emit(SyncEvent::BackoffExhausted {
                    generation: self.generation,
                    identity: self.identity.clone(),
                    build: self.build.clone(),
                    failures,
                });
                return false;
            }
        };

        self.set_state(WatcherState::RetryWait);
        sleep(delay).await;
        self.retry.fired();
        true
    }

    /// Follow the live stream, returning the error that ended it
    async fn stream_updates(&self) -> ApiError {
        let mut stream = match self.source.subscribe(&self.build).await {
            Ok(stream) => stream,
            Err(e) => return e,
        };

        loop {
            let next = match self.idle_timeout {
                Some(limit) => match timeout(limit, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => return ApiError::StreamIdle(limit),
                },
                None => stream.next().await,
            };

            match next {
                Some(Ok(LiveEvent::Update(raw))) => {
                    info!(device = %self.identity, build = %self.build, status = %raw, "Build status changed");
                    self.render(&raw);
                }
                Some(Ok(LiveEvent::Other(_))) => {}
                Some(Err(e)) => return e,
                None => return ApiError::StreamClosed,
            }
        }
    }

    /// Show updating now and the resolved status once the dwell has passed
    fn render(&self, raw: &str) {
        self.report(BuildStatus::Updating);

        let settled = SyncEvent::Status {
            generation: self.generation,
            identity: self.identity.clone(),
            status: BuildStatus::from_remote(raw),
        };
        let events = self.events.clone();
        let dwell = self.dwell;
        tokio::spawn(async move {
            sleep(dwell).await;
            let _ = events.send(settled);
        });
    }

    fn report(&self, status: BuildStatus) {
        self.emit(SyncEvent::Status {
            generation: self.generation,
            identity: self.identity.clone(),
            status,
        });
    }

    fn set_state(&self, state: WatcherState) {
        self.emit(SyncEvent::State {
            generation: self.generation,
            identity: self.identity.clone(),
            state,
        });
    }

    fn emit(&self, event: SyncEvent) {
        // the reconciler going away ends the engine anyway
        let _ = self.events.send(event);
    }
}

/// A running watcher. Dropping the session aborts the task, which closes its
/// subscription and cancels a pending retry.
#[derive(Debug)]
pub struct WatcherSession {
    build: BuildId,
    task: JoinHandle<()>,
}

impl WatcherSession {
    pub fn spawn<S: BuildSource>(watcher: Watcher<S>) -> Self {
        let build = watcher.build.clone();
        let task = tokio::spawn(watcher.run());
        Self { build, task }
    }

    pub fn build(&self) -> &BuildId {
        &self.build
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatcherSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}
