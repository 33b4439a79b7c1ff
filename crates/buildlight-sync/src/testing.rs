//! Scriptable build source for engine tests

use buildlight_core::BuildId;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::api::{BuildSource, LiveEvent, UpdateStream};
use crate::error::ApiError;

type LiveSender = mpsc::UnboundedSender<Result<LiveEvent, ApiError>>;

#[derive(Default)]
struct Inner {
    statuses: HashMap<BuildId, String>,
    fail_always: HashSet<BuildId>,
    fail_next: HashMap<BuildId, usize>,
    refuse_subscribe: HashSet<BuildId>,
    fetches: HashMap<BuildId, usize>,
    subscribers: HashMap<BuildId, Vec<LiveSender>>,
}

/// In-memory [`BuildSource`]; unknown builds report `"passed"`
#[derive(Default)]
pub struct FakeSource {
    inner: Mutex<Inner>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, build: &str, raw: &str) {
        self.inner
            .lock()
            .unwrap()
            .statuses
            .insert(BuildId::new(build), raw.to_string());
    }

    pub fn fail_always(&self, build: &str) {
        self.inner.lock().unwrap().fail_always.insert(BuildId::new(build));
    }

    pub fn fail_next(&self, build: &str, count: usize) {
        self.inner
            .lock()
            .unwrap()
            .fail_next
            .insert(BuildId::new(build), count);
    }

    pub fn refuse_subscribe(&self, build: &str) {
        self.inner
            .lock()
            .unwrap()
            .refuse_subscribe
            .insert(BuildId::new(build));
    }

    pub fn fetches(&self, build: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .fetches
            .get(&BuildId::new(build))
            .copied()
            .unwrap_or(0)
    }

    /// Open subscriptions whose reader is still alive
    pub fn live_subscribers(&self, build: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let senders = inner.subscribers.entry(BuildId::new(build)).or_default();
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }

    /// Deliver an item to every open subscription of `build`
    pub fn push(&self, build: &str, item: Result<LiveEvent, ApiError>) {
        let mut inner = self.inner.lock().unwrap();
        let senders = inner.subscribers.entry(BuildId::new(build)).or_default();
        senders.retain(|tx| !tx.is_closed());
        match senders.as_slice() {
            [tx] => {
                let _ = tx.send(item);
            }
            other => panic!("expected one subscriber for {build}, found {}", other.len()),
        }
    }

    pub fn push_update(&self, build: &str, raw: &str) {
        self.push(build, Ok(LiveEvent::Update(raw.to_string())));
    }

    /// End every open stream of `build` as if the server hung up
    pub fn close_streams(&self, build: &str) {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .remove(&BuildId::new(build));
    }
}

fn unavailable(build: &BuildId) -> ApiError {
    ApiError::Status {
        url: format!("fake://builds/{build}"),
        status: 503,
    }
}

impl BuildSource for FakeSource {
    async fn fetch_status(&self, build: &BuildId) -> Result<String, ApiError> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().unwrap();
        *inner.fetches.entry(build.clone()).or_default() += 1;

        if inner.fail_always.contains(build) {
            return Err(unavailable(build));
        }
        if let Some(remaining) = inner.fail_next.get_mut(build) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(unavailable(build));
            }
        }
        Ok(inner
            .statuses
            .get(build)
            .cloned()
            .unwrap_or_else(|| "passed".to_string()))
    }

    async fn subscribe(&self, build: &BuildId) -> Result<UpdateStream, ApiError> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().unwrap();
        if inner.refuse_subscribe.contains(build) {
            return Err(unavailable(build));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.entry(build.clone()).or_default().push(tx);
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }
}
