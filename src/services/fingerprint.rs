// src/services/fingerprint.rs

//! Fingerprint source.
//!
//! Obtains cheap change validators for a document: the `ETag`,
//! `Last-Modified` and `Content-Length` of a HEAD response, or, when the
//! server exposes none of them, a SHA-256 of the first bytes fetched with a
//! range request.

use async_trait::async_trait;
use chrono::Local;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, LAST_MODIFIED, RANGE};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{Config, FingerprintConfig, FingerprintRecord, ProbeOutcome};
use crate::utils::http::{RetryPolicy, create_raw_client};

/// Produces a fingerprint for a resource locator.
#[async_trait]
pub trait FingerprintSource: Send + Sync {
    /// Probe a locator. Never fails: failures are a terminal outcome.
    async fn probe(&self, locator: &str) -> ProbeOutcome;
}

/// Hash of a resource's leading bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContentPrefix {
    hash: String,
    final_url: String,
}

/// HTTP-backed fingerprint source.
pub struct HttpFingerprintSource {
    client: Client,
    retry: RetryPolicy,
    config: FingerprintConfig,
}

impl HttpFingerprintSource {
    pub fn new(client: Client, retry: RetryPolicy, config: FingerprintConfig) -> Self {
        Self {
            client,
            retry,
            config,
        }
    }

    /// Build a source with its own non-decoding client from the application config.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            create_raw_client(&config.http)?,
            RetryPolicy::from_config(&config.http),
            config.fingerprint.clone(),
        ))
    }

    /// Attempt 1: validators from a HEAD request.
    async fn metadata(&self, locator: &str) -> Result<FingerprintRecord> {
        let response = self
            .retry
            .send(
                self.client
                    .head(locator)
                    .header(ACCEPT_ENCODING, "identity"),
            )
            .await?
            .error_for_status()?;
        let headers = response.headers();

        Ok(FingerprintRecord {
            validator: header_text(headers, ETAG),
            modified_at: header_text(headers, LAST_MODIFIED),
            size: header_text(headers, CONTENT_LENGTH),
            final_locator: Some(response.url().to_string()),
            status: Some(response.status().as_u16()),
            observed_at: Some(Local::now()),
            ..Default::default()
        })
    }

    /// Attempt 2: hash of the first `prefix_bytes` bytes.
    async fn content_prefix(&self, locator: &str) -> Result<ContentPrefix> {
        let limit = self.config.prefix_bytes.max(1);
        let request = self
            .client
            .get(locator)
            .header(RANGE, format!("bytes=0-{}", limit - 1))
            .header(ACCEPT_ENCODING, "identity");
        let mut response = self.retry.send(request).await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(AppError::probe(
                locator,
                format!("range request returned {status}"),
            ));
        }
        let final_url = response.url().to_string();

        // Servers ignoring Range send the whole body; stop at the limit.
        let mut prefix = Vec::with_capacity(limit);
        while prefix.len() < limit {
            let Some(chunk) = response.chunk().await? else {
                break;
            };
            let take = (limit - prefix.len()).min(chunk.len());
            prefix.extend_from_slice(&chunk[..take]);
        }

        Ok(ContentPrefix {
            hash: hex::encode(Sha256::digest(&prefix)),
            final_url,
        })
    }
}

#[async_trait]
impl FingerprintSource for HttpFingerprintSource {
    async fn probe(&self, locator: &str) -> ProbeOutcome {
        let metadata = match self.metadata(locator).await {
            Ok(record) if record.has_strong_validators() => return ProbeOutcome::Strong(record),
            other => other,
        };

        if !self.config.content_prefix_fallback {
            let reason = match metadata {
                Ok(_) => "no validators exposed".to_string(),
                Err(e) => e.to_string(),
            };
            return ProbeOutcome::failed(format!("HEAD fail: {reason}"));
        }

        if let Err(e) = &metadata {
            log::debug!("HEAD failed for {}: {}. Trying range probe.", locator, e);
        }

        match self.content_prefix(locator).await {
            Ok(prefix) => {
                let base = metadata.unwrap_or_default();
                ProbeOutcome::Weak(FingerprintRecord {
                    final_locator: base.final_locator.or(Some(prefix.final_url)),
                    content_prefix_hash: Some(prefix.hash),
                    status: base.status,
                    observed_at: Some(Local::now()),
                    ..Default::default()
                })
            }
            Err(e) => ProbeOutcome::failed(format!("HEAD/Range fail: {e}")),
        }
    }
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
