//! Read-only view of the current reconciliation cycle for the status API

use buildlight_core::{BuildId, BuildStatus, Generation, HardwareIdentity, Rgb};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::watcher::WatcherState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub identity: HardwareIdentity,
    /// `None` when no build is configured for the device
    pub build: Option<BuildId>,
    pub state: WatcherState,
    pub status: Option<BuildStatus>,
    pub color: Option<Rgb>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BoardSnapshot {
    pub generation: Generation,
    /// Attached devices in slot order
    pub devices: Vec<DeviceView>,
}

impl BoardSnapshot {
    pub fn device(&self, identity: &str) -> Option<&DeviceView> {
        self.devices
            .iter()
            .find(|device| device.identity.as_str() == identity)
    }
}

/// Shared board; clones read the same state
#[derive(Debug, Clone, Default)]
pub struct Board {
    inner: Arc<RwLock<BoardSnapshot>>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> BoardSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn generation(&self) -> Generation {
        self.inner.read().await.generation
    }

    /// Start a new cycle with no devices
    pub(crate) async fn reset(&self, generation: Generation) {
        let mut board = self.inner.write().await;
        board.generation = generation;
        board.devices.clear();
    }

    pub(crate) async fn attach(&self, identity: HardwareIdentity, build: Option<BuildId>, color: Rgb) {
        self.inner.write().await.devices.push(DeviceView {
            identity,
            build,
            state: WatcherState::Idle,
            status: None,
            color: Some(color),
            updated_at: Utc::now(),
        });
    }

    pub(crate) async fn set_state(&self, identity: &HardwareIdentity, state: WatcherState) {
        self.update(identity, |device| device.state = state).await;
    }

    pub(crate) async fn set_status(&self, identity: &HardwareIdentity, status: BuildStatus, color: Rgb) {
        self.update(identity, |device| {
            device.status = Some(status);
            device.color = Some(color);
        })
        .await;
    }

    async fn update(&self, identity: &HardwareIdentity, apply: impl FnOnce(&mut DeviceView)) {
        let mut board = self.inner.write().await;
        if let Some(device) = board.devices.iter_mut().find(|device| &device.identity == identity) {
            apply(device);
            device.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reset_clears_devices() {
        let board = Board::new();
        board.reset(Generation(1)).await;
        board
            .attach(HardwareIdentity::new("dev-1"), Some(BuildId::new("web")), Rgb::BLACK)
            .await;
        board
            .set_status(&HardwareIdentity::new("dev-1"), BuildStatus::Passed, Rgb::GREEN)
            .await;
        board
            .set_state(&HardwareIdentity::new("dev-1"), WatcherState::Streaming)
            .await;

        let snapshot = board.snapshot().await;
        let device = snapshot.device("dev-1").unwrap();
        assert_eq!(device.status, Some(BuildStatus::Passed));
        assert_eq!(device.color, Some(Rgb::GREEN));
        assert_eq!(device.state, WatcherState::Streaming);

        board.reset(Generation(2)).await;
        assert_eq!(board.generation().await, Generation(2));
        assert!(board.snapshot().await.devices.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_json_shape() {
        let board = Board::new();
        board.reset(Generation(4)).await;
        board.attach(HardwareIdentity::new("dev-9"), None, Rgb::BLACK).await;

        let json = serde_json::to_value(board.snapshot().await).unwrap();
        assert_eq!(json["generation"], 4);
        assert_eq!(json["devices"][0]["identity"], "dev-9");
        assert_eq!(json["devices"][0]["build"], serde_json::Value::Null);
        assert_eq!(json["devices"][0]["state"], "idle");
        assert_eq!(json["devices"][0]["color"], "#000000");
    }
}
