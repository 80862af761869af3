//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client and retry settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Fingerprint probe settings
    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    /// Change detection settings
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Link discovery rules
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Pages to monitor
    #[serde(default = "defaults::pages")]
    pub pages: Vec<MonitoredPage>,

    /// Report delivery policy
    #[serde(default)]
    pub notify: NotifyConfig,

    /// SMTP transport and recipients
    #[serde(default)]
    pub email: EmailConfig,

    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Per-run overrides
    #[serde(default)]
    pub run: RunConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.connect_timeout_secs == 0 || self.http.read_timeout_secs == 0 {
            return Err(AppError::validation("http timeouts must be > 0"));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::validation("http.max_concurrent must be > 0"));
        }
        if self.fingerprint.prefix_bytes == 0 {
            return Err(AppError::validation("fingerprint.prefix_bytes must be > 0"));
        }
        if self.discovery.extensions.is_empty() {
            return Err(AppError::validation("discovery.extensions is empty"));
        }
        if self.pages.is_empty() {
            return Err(AppError::validation("No pages defined"));
        }
        for page in &self.pages {
            url::Url::parse(&page.url)
                .map_err(|e| AppError::validation(format!("Invalid page URL {}: {e}", page.url)))?;
        }
        if let Some(date) = &self.run.reference_date {
            chrono::NaiveDate::parse_from_str(date, "%d/%m/%Y").map_err(|_| {
                AppError::validation(format!("run.reference_date must be dd/mm/yyyy: {date}"))
            })?;
        }
        if self.notify.max_single_attachment_bytes > self.notify.max_total_attachment_bytes {
            return Err(AppError::validation(
                "notify.max_single_attachment_bytes exceeds max_total_attachment_bytes",
            ));
        }
        Ok(())
    }

    /// Resolve the manifest path against the storage directory.
    pub fn manifest_path(&self, base: &Path) -> PathBuf {
        base.join(&self.paths.manifest_file)
    }

    /// Resolve the status artifact path against the storage directory.
    pub fn status_path(&self, base: &Path) -> PathBuf {
        base.join(&self.paths.status_file)
    }

    /// Resolve the log directory against the storage directory.
    pub fn log_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.paths.log_dir)
    }

    /// Resolve the optional logo path against the storage directory.
    pub fn logo_path(&self, base: &Path) -> Option<PathBuf> {
        self.notify.logo_path.as_ref().map(|p| base.join(p))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            fingerprint: FingerprintConfig::default(),
            detection: DetectionConfig::default(),
            discovery: DiscoveryConfig::default(),
            pages: defaults::pages(),
            notify: NotifyConfig::default(),
            email: EmailConfig::default(),
            paths: PathsConfig::default(),
            run: RunConfig::default(),
        }
    }
}

/// HTTP client and transport retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Connect timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub read_timeout_secs: u64,

    /// Timeout for loading a monitored page
    #[serde(default = "defaults::page_timeout")]
    pub page_timeout_secs: u64,

    /// Retries for idempotent requests on transient statuses
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Backoff factor in milliseconds (delay = factor * 2^(n-1))
    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor_ms: u64,

    /// Maximum probes in flight
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            connect_timeout_secs: defaults::timeout(),
            read_timeout_secs: defaults::timeout(),
            page_timeout_secs: defaults::page_timeout(),
            max_retries: defaults::max_retries(),
            backoff_factor_ms: defaults::backoff_factor(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Fingerprint probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Hash a content prefix when the server exposes no validators
    #[serde(default = "defaults::enabled")]
    pub content_prefix_fallback: bool,

    /// Number of leading bytes requested for the prefix hash
    #[serde(default = "defaults::prefix_bytes")]
    pub prefix_bytes: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            content_prefix_fallback: true,
            prefix_bytes: defaults::prefix_bytes(),
        }
    }
}

/// Change detection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Record but do not report new files on the very first run
    #[serde(default)]
    pub quiet_baseline: bool,
}

/// Link discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Keep only links under the "current version" path segment
    #[serde(default = "defaults::enabled")]
    pub only_current: bool,

    /// Path segment marking current documents
    #[serde(default = "defaults::current_segment")]
    pub current_segment: String,

    /// URL substrings that exclude a link
    #[serde(default = "defaults::exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Document extensions worth tracking
    #[serde(default = "defaults::extensions")]
    pub extensions: Vec<String>,

    /// Selector for category headings preceding the links
    #[serde(default = "defaults::category_selector")]
    pub category_selector: String,

    /// Category used when no heading precedes a link
    #[serde(default = "defaults::default_category")]
    pub default_category: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            only_current: true,
            current_segment: defaults::current_segment(),
            exclude_patterns: defaults::exclude_patterns(),
            extensions: defaults::extensions(),
            category_selector: defaults::category_selector(),
            default_category: defaults::default_category(),
        }
    }
}

/// A page monitored for document changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitoredPage {
    /// Page URL
    pub url: String,

    /// Short label used in reports (e.g., "DDR - 2011")
    pub label: String,
}

/// Report delivery policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Send a report even when nothing changed
    #[serde(default = "defaults::enabled")]
    pub send_when_no_changes: bool,

    /// Subject template, `{date}` is replaced by the reference date
    #[serde(default = "defaults::subject")]
    pub subject: String,

    /// Attach the changed files to the report
    #[serde(default = "defaults::enabled")]
    pub attach_changed_files: bool,

    #[serde(default = "defaults::max_attachments")]
    pub max_attachments: usize,

    #[serde(default = "defaults::max_single_attachment")]
    pub max_single_attachment_bytes: u64,

    #[serde(default = "defaults::max_total_attachment")]
    pub max_total_attachment_bytes: u64,

    /// Logo embedded inline in the report (relative to the storage dir)
    #[serde(default)]
    pub logo_path: Option<PathBuf>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            send_when_no_changes: true,
            subject: defaults::subject(),
            attach_changed_files: true,
            max_attachments: defaults::max_attachments(),
            max_single_attachment_bytes: defaults::max_single_attachment(),
            max_total_attachment_bytes: defaults::max_total_attachment(),
            logo_path: None,
        }
    }
}

/// SMTP transport and recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Sender address; falls back to `user`
    #[serde(default)]
    pub from: Option<String>,

    /// Recipients, as a list or a comma-separated string
    #[serde(default, deserialize_with = "recipients")]
    pub to: Vec<String>,

    #[serde(default)]
    pub user: Option<String>,

    /// Prefer `MONITOR_SMTP_PASSWORD` over storing this in the file
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default = "defaults::smtp_host")]
    pub host: String,

    #[serde(default = "defaults::smtp_port")]
    pub port: u16,

    /// Implicit TLS (SMTPS)
    #[serde(default = "defaults::enabled")]
    pub ssl: bool,

    /// Upgrade a plain connection with STARTTLS
    #[serde(default)]
    pub starttls: bool,
}

impl EmailConfig {
    /// Environment variable that overrides the configured password.
    pub const PASSWORD_ENV: &'static str = "MONITOR_SMTP_PASSWORD";

    /// Sender address, falling back to the login user.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().or(self.user.as_deref())
    }

    /// Password from the environment, or from the file.
    pub fn resolved_password(&self) -> Option<String> {
        std::env::var(Self::PASSWORD_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| self.password.clone())
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from: None,
            to: Vec::new(),
            user: None,
            password: None,
            host: defaults::smtp_host(),
            port: defaults::smtp_port(),
            ssl: true,
            starttls: false,
        }
    }
}

fn recipients<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Recipients {
        List(Vec<String>),
        Joined(String),
    }

    let list = match Recipients::deserialize(deserializer)? {
        Recipients::List(list) => list,
        Recipients::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(list
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// File locations, relative to the storage directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::manifest_file")]
    pub manifest_file: PathBuf,

    #[serde(default = "defaults::status_file")]
    pub status_file: PathBuf,

    #[serde(default = "defaults::log_dir")]
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            manifest_file: defaults::manifest_file(),
            status_file: defaults::status_file(),
            log_dir: defaults::log_dir(),
        }
    }
}

/// Per-run overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Fixed reference date (dd/mm/yyyy) instead of today
    #[serde(default)]
    pub reference_date: Option<String>,
}

mod defaults {
    use std::path::PathBuf;

    use super::MonitoredPage;

    pub fn enabled() -> bool {
        true
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "FINAUD-Monitor/1.0 (+https://local)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn page_timeout() -> u64 {
        60
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn backoff_factor() -> u64 {
        500
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Fingerprint defaults
    pub fn prefix_bytes() -> usize {
        1024
    }

    // Discovery defaults
    pub fn current_segment() -> String {
        "/atual/".into()
    }
    pub fn exclude_patterns() -> Vec<String> {
        vec![
            "versoes_anteriores".into(),
            "anteriores".into(),
            "historico".into(),
        ]
    }
    pub fn extensions() -> Vec<String> {
        vec![
            "pdf".into(),
            "xls".into(),
            "xlsx".into(),
            "xsd".into(),
            "zip".into(),
        ]
    }
    pub fn category_selector() -> String {
        "h3#categoria".into()
    }
    pub fn default_category() -> String {
        "Sem categoria".into()
    }

    pub fn pages() -> Vec<MonitoredPage> {
        [
            ("leiautedocumentoDDR2011", "DDR - 2011"),
            ("leiautedocumentoDRM", "DRM - 2060"),
            ("leiautedoc2061", "DLO - 2061"),
            ("leiautedoc2062", "DLI - 2062"),
            ("leiaute_drl2160", "DRL - 2160"),
        ]
        .into_iter()
        .map(|(slug, label)| MonitoredPage {
            url: format!("https://www.bcb.gov.br/estabilidadefinanceira/{slug}"),
            label: label.to_string(),
        })
        .collect()
    }

    // Notify defaults
    pub fn subject() -> String {
        "📢 Atenção: Atualização na página de Leiautes do Bacen na data: {date}".into()
    }
    pub fn max_attachments() -> usize {
        8
    }
    pub fn max_single_attachment() -> u64 {
        4 * 1024 * 1024
    }
    pub fn max_total_attachment() -> u64 {
        18 * 1024 * 1024
    }

    // Email defaults
    pub fn smtp_host() -> String {
        "smtp.gmail.com".into()
    }
    pub fn smtp_port() -> u16 {
        465
    }

    // Path defaults
    pub fn manifest_file() -> PathBuf {
        PathBuf::from("manifest_arquivos.json")
    }
    pub fn status_file() -> PathBuf {
        PathBuf::from("_status_tail.txt")
    }
    pub fn log_dir() -> PathBuf {
        PathBuf::from("logs")
    }
}
