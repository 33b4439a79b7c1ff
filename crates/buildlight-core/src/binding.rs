//! Build bindings - maps hardware identities to build identifiers
//!
//! Bindings come from an ordered list of single-entry records in the
//! configuration file:
//!
//! ```toml
//! devices = [
//!   { "BS000123-3.0" = "frontend-main" },
//!   { "BS000456-3.0" = "backend-main" },
//! ]
//! ```
//!
//! The table is loaded once and never changes for the lifetime of the
//! process, so lookups are plain linear scans with no caching.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::device::{BuildId, HardwareIdentity};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BindingError {
    #[error("Device binding must have exactly one entry, found {0}")]
    EntryCount(usize),
    #[error("Device binding for {0:?} has an empty build id")]
    EmptyBuild(String),
}

/// One `{identity = build}` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct DeviceBinding {
    pub identity: HardwareIdentity,
    pub build: BuildId,
}

impl DeviceBinding {
    pub fn new(identity: impl Into<String>, build: impl Into<String>) -> Self {
        Self {
            identity: HardwareIdentity::new(identity),
            build: BuildId::new(build),
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for DeviceBinding {
    type Error = BindingError;

    fn try_from(record: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        if record.len() != 1 {
            return Err(BindingError::EntryCount(record.len()));
        }
        let (identity, build) = record
            .into_iter()
            .next()
            .ok_or(BindingError::EntryCount(0))?;
        if build.is_empty() {
            return Err(BindingError::EmptyBuild(identity));
        }
        Ok(Self::new(identity, build))
    }
}

impl From<DeviceBinding> for BTreeMap<String, String> {
    fn from(binding: DeviceBinding) -> Self {
        BTreeMap::from([(binding.identity.0, binding.build.0)])
    }
}

/// Immutable identity-to-build lookup table
#[derive(Debug, Clone, Default)]
pub struct BuildBindings {
    records: Vec<DeviceBinding>,
}

impl BuildBindings {
    pub fn new(records: Vec<DeviceBinding>) -> Self {
        Self { records }
    }

    /// Resolve the build bound to `identity`; the first matching record wins
    pub fn resolve(&self, identity: &HardwareIdentity) -> Option<&BuildId> {
        self.records
            .iter()
            .find(|record| &record.identity == identity)
            .map(|record| &record.build)
    }

    pub fn records(&self) -> &[DeviceBinding] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
