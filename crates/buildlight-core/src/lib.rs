//! Buildlight Core - Shared types for the build indicator daemon
//!
//! This crate provides the foundational types for the Buildlight system:
//! - Hardware identities, build identifiers and display statuses
//! - The identity-to-build binding table loaded from configuration
//! - Colors and the status palette
//! - The bounded retry backoff used by build watchers

pub mod backoff;
pub mod binding;
pub mod color;
pub mod device;

pub use backoff::{ExhaustionPolicy, RetryDecision, RetryState, BACKOFF_SECS};
pub use binding::{BindingError, BuildBindings, DeviceBinding};
pub use color::{ColorError, Palette, Rgb};
pub use device::{BuildId, BuildStatus, Generation, HardwareIdentity, PASSED_MARKER};
