// src/models/mod.rs

//! Domain models for the monitor application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod fingerprint;
mod manifest;
mod page;
mod verdict;

// Re-export all public types
pub use config::{
    Config, DetectionConfig, DiscoveryConfig, EmailConfig, FingerprintConfig, HttpConfig,
    MonitoredPage, NotifyConfig, PathsConfig, RunConfig,
};
pub use fingerprint::{FingerprintRecord, ProbeOutcome};
pub use manifest::Manifest;
pub use page::{Candidate, PageScan};
pub use verdict::{ChangeVerdict, DetectionReport, Evidence, ProbeFailure, RunResult};
