//! Events delivered to the reconciler

use buildlight_core::{BuildId, BuildStatus, Generation, HardwareIdentity};

use crate::watcher::WatcherState;

/// Completion of some asynchronous work, tagged with the generation it
/// was started under
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The change monitor saw the hardware topology change
    TopologyChanged { generation: Generation },
    /// A device should show a status
    Status {
        generation: Generation,
        identity: HardwareIdentity,
        status: BuildStatus,
    },
    /// A watcher moved to another state
    State {
        generation: Generation,
        identity: HardwareIdentity,
        state: WatcherState,
    },
    /// A live subscription failed
    StreamFailed {
        generation: Generation,
        identity: HardwareIdentity,
        error: String,
    },
    /// A watcher ran out of retries
    BackoffExhausted {
        generation: Generation,
        identity: HardwareIdentity,
        build: BuildId,
        failures: usize,
    },
}

impl SyncEvent {
    pub fn generation(&self) -> Generation {
        match self {
            Self::TopologyChanged { generation }
            | Self::Status { generation, .. }
            | Self::State { generation, .. }
            | Self::StreamFailed { generation, .. }
            | Self::BackoffExhausted { generation, .. } => *generation,
        }
    }
}
