use buildlight_core::{BuildId, HardwareIdentity};
use std::time::Duration;
use thiserror::Error;

use crate::sse::LineTooLong;

/// Failures talking to the remote build API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid build record from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Live stream closed by server")]
    StreamClosed,

    #[error("No live event for {0:?}")]
    StreamIdle(Duration),

    #[error("Unreadable live stream: {0}")]
    Sse(#[from] LineTooLong),
}

/// Fatal engine errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Gave up on build {build} for device {identity} after {failures} consecutive failures")]
    BackoffExhausted {
        identity: HardwareIdentity,
        build: BuildId,
        failures: usize,
    },

    #[error("Reconciler event channel closed")]
    ChannelClosed,
}
