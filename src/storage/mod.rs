//! Persistence for the monitor's state and operational artifacts.
//!
//! ```text
//! storage/
//! ├── config.toml               # Monitor configuration
//! ├── manifest_arquivos.json    # Last-known fingerprint per locator
//! ├── _status_tail.txt          # Status artifact, overwritten every run
//! └── logs/
//!     └── monitor_YYYYMMDD.log
//! ```

pub mod local;
pub mod status;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Manifest;

pub use local::LocalManifestStore;
pub use status::{StatusCode, StatusReport};

/// Durable home of the manifest between runs.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Load the manifest. Absent or unreadable state yields an empty one.
    async fn load(&self) -> Result<Manifest>;

    /// Persist the complete manifest, replacing the previous state.
    async fn save(&self, manifest: &Manifest) -> Result<()>;
}
