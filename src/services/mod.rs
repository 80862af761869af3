//! Service layer for the monitor application.
//!
//! This module contains the I/O collaborators of a run:
//! - Document fingerprinting (`HttpFingerprintSource`)
//! - Page discovery (`HtmlDiscovery`)
//! - Email notification (`EmailNotifier`)

mod discovery;
mod fingerprint;
mod notifier;

pub use discovery::{DiscoveryAdapter, HtmlDiscovery, LinkPolicy};
pub use fingerprint::{FingerprintSource, HttpFingerprintSource};
pub use notifier::{
    ChangeReport, EmailNotifier, FileAttachment, Notifier, changes_html, no_changes_html,
};
