//! Local filesystem manifest store.
//!
//! The manifest is a single pretty-printed JSON object keyed by locator,
//! compatible with existing `manifest_arquivos.json` files. Saves go through
//! a sibling temp file and a rename so a crash never leaves a torn manifest.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::Manifest;
use crate::storage::ManifestStore;

/// Manifest stored as a JSON file on local disk.
#[derive(Debug, Clone)]
pub struct LocalManifestStore {
    path: PathBuf,
}

impl LocalManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl ManifestStore for LocalManifestStore {
    async fn load(&self) -> Result<Manifest> {
        let Some(bytes) = self.read_bytes().await? else {
            log::info!("No manifest at {}, starting empty", self.path.display());
            return Ok(Manifest::new());
        };

        match serde_json::from_slice::<Manifest>(&bytes) {
            Ok(manifest) => {
                log::info!("Loaded manifest with {} entries", manifest.len());
                Ok(manifest)
            }
            Err(e) => {
                log::warn!(
                    "Manifest {} is unreadable ({}), starting empty",
                    self.path.display(),
                    e
                );
                Ok(Manifest::new())
            }
        }
    }

    async fn save(&self, manifest: &Manifest) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        self.write_bytes(&bytes).await?;
        log::info!(
            "Saved manifest with {} entries to {}",
            manifest.len(),
            self.path.display()
        );
        Ok(())
    }
}
