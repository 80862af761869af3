//! Fingerprint records and probe outcomes.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};

/// Last-known state of a monitored document.
///
/// Field names on disk match the manifest written by earlier monitor versions,
/// so an existing `manifest_arquivos.json` loads unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerprintRecord {
    /// Strong entity tag (`ETag`)
    #[serde(rename = "etag", default)]
    pub validator: Option<String>,

    /// Server-supplied `Last-Modified`, kept verbatim
    #[serde(rename = "last_modified", default)]
    pub modified_at: Option<String>,

    /// Raw `Content-Length` header value
    #[serde(rename = "content_length", default)]
    pub size: Option<String>,

    /// Locator after redirects
    #[serde(rename = "final_url", default)]
    pub final_locator: Option<String>,

    /// SHA-256 of the first bytes, only when no validator was exposed
    #[serde(rename = "partial_fp", default)]
    pub content_prefix_hash: Option<String>,

    /// HTTP status of the metadata probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(rename = "checked_at", default, deserialize_with = "lenient_timestamp")]
    pub observed_at: Option<DateTime<Local>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FingerprintRecord {
    /// Whether the server exposed any of the strong validators.
    pub fn has_strong_validators(&self) -> bool {
        self.validator.is_some() || self.modified_at.is_some() || self.size.is_some()
    }

    /// Whether this record carries a usable observation.
    pub fn is_observation(&self) -> bool {
        self.error.is_none() && (self.has_strong_validators() || self.content_prefix_hash.is_some())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Mark a previously stored record as failed, keeping its stale data.
    pub fn into_failed(self, error: impl Into<String>, at: DateTime<Local>) -> Self {
        Self {
            error: Some(error.into()),
            observed_at: Some(at),
            ..self
        }
    }
}

/// Accept RFC 3339 timestamps and the offset-less ISO form of older manifests.
/// Anything else decodes as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Local>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Local)));
    }
    match NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Ok(Local.from_local_datetime(&naive).earliest()),
        Err(e) => {
            log::debug!("Ignoring unreadable checked_at {:?}: {}", raw, e);
            Ok(None)
        }
    }
}

/// Terminal state of a probe's fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Metadata probe exposed at least one strong validator.
    Strong(FingerprintRecord),
    /// Only a content-prefix hash is available.
    Weak(FingerprintRecord),
    /// No usable observation.
    Failed { error: String, at: DateTime<Local> },
}

impl ProbeOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            at: Local::now(),
        }
    }

    /// The observation, if the probe produced one.
    pub fn observation(&self) -> Option<&FingerprintRecord> {
        match self {
            Self::Strong(record) | Self::Weak(record) => Some(record),
            Self::Failed { .. } => None,
        }
    }

    /// Short name of the terminal state, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Strong(_) => "strong",
            Self::Weak(_) => "weak",
            Self::Failed { .. } => "failed",
        }
    }

    /// Convert into a record, failures becoming error records.
    pub fn into_record(self) -> FingerprintRecord {
        match self {
            Self::Strong(record) | Self::Weak(record) => record,
            Self::Failed { error, at } => FingerprintRecord::default().into_failed(error, at),
        }
    }
}
