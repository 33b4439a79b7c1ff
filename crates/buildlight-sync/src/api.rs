//! Remote build status API
//!
//! Two endpoints are consumed:
//! 1. `GET {base}/builds/{id}` - JSON record with `current_status`
//! 2. `GET {base}/live/{id}` - Server-Sent Events; `update` events carry JSON
//!    with `currentStatus`

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use buildlight_core::BuildId;

use crate::error::ApiError;
use crate::sse::{SseDecoder, SseEvent};

/// SSE event name carrying status updates
pub const UPDATE_EVENT: &str = "update";

/// One item from a live subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Raw remote status from an `update` event
    Update(String),
    /// Any other traffic on the stream
    Other(String),
}

/// Live subscription; ends when the server closes the stream
pub type UpdateStream = BoxStream<'static, Result<LiveEvent, ApiError>>;

/// Where build watchers get status from
pub trait BuildSource: Send + Sync + 'static {
    /// Fetch the raw current status of a build
    fn fetch_status(&self, build: &BuildId) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Open the live update stream for a build
    fn subscribe(&self, build: &BuildId) -> impl Future<Output = Result<UpdateStream, ApiError>> + Send;
}

#[derive(Deserialize)]
struct BuildRecord {
    current_status: String,
}

#[derive(Deserialize)]
struct LiveUpdate {
    #[serde(rename = "currentStatus")]
    current_status: String,
}

/// HTTP client for the build API
pub struct BuildApi {
    client: reqwest::Client,
    base: String,
    request_timeout: Duration,
}

impl BuildApi {
    /// Create a client for the API at `base` (e.g. `http://ci.example.com/api`).
    ///
    /// `request_timeout` bounds the status fetch and every connection
    /// attempt; live streams have no overall timeout.
    pub fn new(base: impl Into<String>, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn build_url(&self, build: &BuildId) -> String {
        format!("{}/builds/{}", self.base, build)
    }

    pub fn live_url(&self, build: &BuildId) -> String {
        format!("{}/live/{}", self.base, build)
    }
}

impl BuildSource for BuildApi {
    async fn fetch_status(&self, build: &BuildId) -> Result<String, ApiError> {
        let url = self.build_url(build);
        debug!(url = %url, "Fetching build status");

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        let record: BuildRecord =
            serde_json::from_slice(&body).map_err(|source| ApiError::Decode { url, source })?;
        Ok(record.current_status)
    }

    async fn subscribe(&self, build: &BuildId) -> Result<UpdateStream, ApiError> {
        let url = self.live_url(build);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        info!(url = %url, "Subscribed to live build updates");
        Ok(live_events(response.bytes_stream(), build.clone()))
    }
}

/// Decode a body byte stream into live events
fn live_events<S, B>(body: S, build: BuildId) -> UpdateStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), VecDeque::<SseEvent>::new());

    stream::unfold(Some(state), |state| async move {
        let (mut body, mut decoder, mut ready) = state?;
        loop {
            if let Some(event) = ready.pop_front() {
                return Some((Ok(event), Some((body, decoder, ready))));
            }
            match body.next().await {
                Some(Ok(chunk)) => match decoder.feed(chunk.as_ref()) {
                    Ok(events) => ready.extend(events),
                    // no resync after an oversized line; end the stream here
                    Err(e) => return Some((Err(ApiError::from(e)), None)),
                },
                Some(Err(e)) => {
                    return Some((Err(ApiError::Transport(e)), Some((body, decoder, ready))))
                }
                None => return None,
            }
        }
    })
    .filter_map(move |item| {
        let result = match item {
            Ok(event) => classify(&build, event).map(Ok),
            Err(e) => Some(Err(e)),
        };
        futures_util::future::ready(result)
    })
    .boxed()
}

fn classify(build: &BuildId, event: SseEvent) -> Option<LiveEvent> {
    if event.event != UPDATE_EVENT {
        debug!(build = %build, event = %event.event, data = %event.data, "Live event");
        return Some(LiveEvent::Other(event.event));
    }

    match serde_json::from_str::<LiveUpdate>(&event.data) {
        Ok(update) => {
            debug!(
                build = %build,
                id = ?event.id,
                status = %update.current_status,
                "Live status update"
            );
            Some(LiveEvent::Update(update.current_status))
        }
        Err(e) => {
            warn!(build = %build, error = %e, data = %event.data, "Malformed live update, skipping");
            None
        }
    }
}
