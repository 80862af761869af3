//! Change verdicts and run results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single reason for judging a locator changed, in rule priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    ValidatorChanged,
    ModifiedAtChanged,
    SizeChanged,
    FinalLocatorChanged,
    ContentPrefixChanged,
    NewlyObserved,
}

impl Evidence {
    /// Human-readable reason as shown to operators.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::ValidatorChanged => "etag mudou",
            Self::ModifiedAtChanged => "last_modified mudou",
            Self::SizeChanged => "content_length mudou",
            Self::FinalLocatorChanged => "final_url mudou",
            Self::ContentPrefixChanged => "partial_fp mudou",
            Self::NewlyObserved => "novo arquivo observado",
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Conclusion that a locator changed meaningfully since the last run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeVerdict {
    pub locator: String,
    pub evidence: Vec<Evidence>,
    pub category: String,
}

impl ChangeVerdict {
    /// Evidence joined for logs and reports.
    pub fn evidence_summary(&self) -> String {
        self.evidence
            .iter()
            .map(Evidence::describe)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A locator whose probe produced no usable observation this run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeFailure {
    pub locator: String,
    pub error: String,
}

/// Output of a detection pass.
#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    pub verdicts: Vec<ChangeVerdict>,
    pub failures: Vec<ProbeFailure>,
    /// Locators evaluated, after deduplication
    pub checked: usize,
}

/// Aggregate outcome of one monitor run. Derived, never persisted.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    /// Reference date the page markers were matched against
    pub reference_date: String,
    /// Labels of pages listing the reference date
    pub pages_with_date: Vec<String>,
    pub pages_scanned: usize,
    pub verdicts: Vec<ChangeVerdict>,
    pub failures: Vec<ProbeFailure>,
    /// Notifications delivered (0 or 1 for the email notifier)
    pub delivered: usize,
    pub recipients: Vec<String>,
    pub elapsed: Duration,
}

impl RunResult {
    /// File names of the changed documents, in verdict order.
    pub fn changed_file_names(&self) -> Vec<String> {
        self.verdicts
            .iter()
            .map(|v| crate::utils::filename_from_url(&v.locator))
            .collect()
    }
}
