//! Identity and status types shared by the registry, watchers and daemon

use serde::{Deserialize, Serialize};

/// Raw remote status that renders as passed; every other value renders as failed
pub const PASSED_MARKER: &str = "passed";

/// Stable identity of a physical indicator, as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareIdentity(pub String);

impl HardwareIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HardwareIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a build/job in the remote build system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub String);

impl BuildId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display-oriented build status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Fetching the initial status
    Connecting,
    /// Last known result was a pass
    Passed,
    /// Last known result was anything but a pass
    Failed,
    /// A status update just arrived and is being shown
    Updating,
}

impl BuildStatus {
    /// Classify a raw remote status string.
    ///
    /// Only the literal `"passed"` marker is a pass.
    pub fn from_remote(raw: &str) -> Self {
        if raw == PASSED_MARKER {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Updating => "updating",
        };
        f.write_str(name)
    }
}

/// Reconciliation cycle counter.
///
/// Every asynchronous completion carries the generation it was started
/// under and is dropped on arrival when a newer cycle has begun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
