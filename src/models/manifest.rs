//! Persisted locator → fingerprint mapping.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::models::FingerprintRecord;

/// Last-known fingerprint of every locator ever observed.
///
/// Entries are only added or replaced; nothing is removed across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, FingerprintRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locator: &str) -> Option<&FingerprintRecord> {
        self.entries.get(locator)
    }

    /// Insert or replace the record for a locator.
    pub fn upsert(&mut self, locator: impl Into<String>, record: FingerprintRecord) {
        self.entries.insert(locator.into(), record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries whose last check failed.
    pub fn error_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_error()).count()
    }

    /// Most recent check time across all entries.
    pub fn last_checked(&self) -> Option<DateTime<Local>> {
        self.entries.values().filter_map(|r| r.observed_at).max()
    }
}
