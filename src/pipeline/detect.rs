//! Change detection over fingerprints.
//!
//! Compares each freshly probed fingerprint with the manifest entry from the
//! previous run and decides whether the document changed, recording the
//! reasons in rule priority order:
//!
//! 1. `etag` differs
//! 2. `last_modified` differs
//! 3. `content_length` differs
//! 4. `final_url` differs
//! 5. content prefix hash differs, only when 1-3 have no data
//! 6. locator never observed before
//!
//! Every probed locator is written back to the manifest, changed or not.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};

use crate::models::{
    Candidate, ChangeVerdict, Config, DetectionConfig, DetectionReport, Evidence,
    FingerprintRecord, Manifest, ProbeFailure, ProbeOutcome,
};
use crate::services::FingerprintSource;

/// Outcome of checking one locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    Changed(ChangeVerdict),
    Unchanged,
    /// Probe failed; neither changed nor unchanged.
    Unknown(ProbeFailure),
}

/// Decides whether monitored documents changed since the last run.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    config: DetectionConfig,
    max_concurrent: usize,
}

impl ChangeDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            max_concurrent: 1,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.detection.clone()).with_concurrency(config.http.max_concurrent)
    }

    /// Allow up to `max_concurrent` probes in flight. Evaluation stays sequential.
    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Apply the rule set to one observation.
    ///
    /// `first_run` is true when the manifest was empty at the start of the
    /// run; with a quiet baseline, new locators are then not reported.
    pub fn evaluate(
        &self,
        locator: &str,
        category: &str,
        current: &FingerprintRecord,
        stored: Option<&FingerprintRecord>,
        first_run: bool,
    ) -> Option<ChangeVerdict> {
        // An entry that only ever recorded failures has nothing to compare.
        let evidence = match stored.filter(|s| has_data(s)) {
            Some(stored) => changed_fields(current, stored),
            None if first_run && self.config.quiet_baseline => {
                log::debug!("Baseline recorded for {}", locator);
                Vec::new()
            }
            None => vec![Evidence::NewlyObserved],
        };

        if evidence.is_empty() {
            return None;
        }
        Some(ChangeVerdict {
            locator: locator.to_string(),
            evidence,
            category: category.to_string(),
        })
    }

    /// Evaluate a probe outcome and upsert the manifest entry.
    pub fn check(
        &self,
        manifest: &mut Manifest,
        candidate: &Candidate,
        outcome: ProbeOutcome,
        first_run: bool,
    ) -> Assessment {
        let locator = candidate.locator.as_str();

        let mut current = match outcome {
            ProbeOutcome::Strong(record) | ProbeOutcome::Weak(record) => record,
            ProbeOutcome::Failed { error, at } => {
                log::warn!("Probe failed for {}: {}", locator, error);
                let record = manifest
                    .get(locator)
                    .cloned()
                    .unwrap_or_default()
                    .into_failed(error.clone(), at);
                manifest.upsert(locator, record);
                return Assessment::Unknown(ProbeFailure {
                    locator: locator.to_string(),
                    error,
                });
            }
        };

        let stored = manifest.get(locator);
        let verdict = self.evaluate(locator, &candidate.category, &current, stored, first_run);
        if current.content_prefix_hash.is_none() {
            current.content_prefix_hash = stored.and_then(|s| s.content_prefix_hash.clone());
        }
        manifest.upsert(locator, current);

        match verdict {
            Some(verdict) => Assessment::Changed(verdict),
            None => Assessment::Unchanged,
        }
    }

    /// Probe every candidate and check it against the manifest.
    ///
    /// Duplicate locators are checked once, keeping the first category.
    pub async fn run(
        &self,
        source: &dyn FingerprintSource,
        manifest: &mut Manifest,
        candidates: &[Candidate],
    ) -> DetectionReport {
        let first_run = manifest.is_empty();
        if first_run {
            log::info!("Manifest is empty: first run");
        }

        let mut seen = HashSet::new();
        let unique: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| seen.insert(c.locator.as_str()))
            .collect();

        let mut report = DetectionReport {
            checked: unique.len(),
            ..DetectionReport::default()
        };

        // Probes overlap; results arrive in discovery order.
        let mut probes = stream::iter(unique)
            .map(|candidate| async move {
                let outcome = source.probe(&candidate.locator).await;
                (candidate, outcome)
            })
            .buffered(self.max_concurrent);

        while let Some((candidate, outcome)) = probes.next().await {
            log::debug!("Probed {} ({})", candidate.locator, outcome.kind());
            match self.check(manifest, candidate, outcome, first_run) {
                Assessment::Changed(verdict) => {
                    log::info!(
                        "Change detected: {} | {}",
                        verdict.locator,
                        verdict.evidence_summary()
                    );
                    report.verdicts.push(verdict);
                }
                Assessment::Unchanged => {}
                Assessment::Unknown(failure) => report.failures.push(failure),
            }
        }

        report
    }
}

fn has_data(record: &FingerprintRecord) -> bool {
    record.has_strong_validators()
        || record.final_locator.is_some()
        || record.content_prefix_hash.is_some()
}

/// Rules 1-5, in priority order.
fn changed_fields(current: &FingerprintRecord, stored: &FingerprintRecord) -> Vec<Evidence> {
    let comparable = [
        (Evidence::ValidatorChanged, &current.validator, &stored.validator),
        (Evidence::ModifiedAtChanged, &current.modified_at, &stored.modified_at),
        (Evidence::SizeChanged, &current.size, &stored.size),
        (Evidence::FinalLocatorChanged, &current.final_locator, &stored.final_locator),
    ];

    let mut evidence: Vec<Evidence> = comparable
        .into_iter()
        .filter(|(_, now, before)| now.is_some() && now != before)
        .map(|(evidence, _, _)| evidence)
        .collect();

    // The prefix hash only speaks when the server exposed no validators.
    if !current.has_strong_validators()
        && current.content_prefix_hash.is_some()
        && current.content_prefix_hash != stored.content_prefix_hash
    {
        evidence.push(Evidence::ContentPrefixChanged);
    }

    evidence
}
