//! Buildlight Sync - Keeps indicator devices in step with their builds
//!
//! This crate contains the engine of the daemon:
//! - The device registry and its topology change monitor
//! - The build API client and Server-Sent Events decoder
//! - Per-device build watchers with bounded retry backoff
//! - The reconciler that rebinds every device when the hardware changes

pub mod api;
pub mod board;
pub mod error;
pub mod event;
pub mod reconcile;
pub mod registry;
pub mod sse;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use api::{BuildApi, BuildSource, LiveEvent, UpdateStream, UPDATE_EVENT};
pub use board::{Board, BoardSnapshot, DeviceView};
pub use error::{ApiError, SyncError};
pub use event::SyncEvent;
pub use reconcile::{Incoming, Reconciler, SyncSettings};
pub use registry::{ChangeMonitor, DeviceRegistry, DiscoveredDevice, Enumeration, TopologyChange};
pub use sse::{LineTooLong, SseDecoder, SseEvent, MAX_LINE_BYTES};
pub use watcher::{Watcher, WatcherSession, WatcherState, DEFAULT_DWELL};
