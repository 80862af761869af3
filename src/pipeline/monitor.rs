// src/pipeline/monitor.rs

//! One monitor run: discover, detect, persist, notify.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Local;

use crate::error::Result;
use crate::models::{Candidate, Config, RunResult};
use crate::pipeline::ChangeDetector;
use crate::services::{ChangeReport, DiscoveryAdapter, FingerprintSource, Notifier};
use crate::storage::ManifestStore;

/// Environment override for the reference date, used for replaying a day.
pub const TEST_DATE_ENV: &str = "MONITOR_TEST_DATE";

/// Date the page markers are matched against: configured, then
/// `MONITOR_TEST_DATE`, then today.
pub fn reference_date(config: &Config) -> String {
    config
        .run
        .reference_date
        .clone()
        .or_else(|| std::env::var(TEST_DATE_ENV).ok().filter(|d| !d.trim().is_empty()))
        .map(|d| d.trim().to_string())
        .unwrap_or_else(|| Local::now().format("%d/%m/%Y").to_string())
}

/// Run the monitor once.
///
/// Page failures are logged and skipped and delivery failures are logged;
/// failing to persist the manifest aborts the run.
pub async fn run_monitor(
    config: &Config,
    discovery: &dyn DiscoveryAdapter,
    source: &dyn FingerprintSource,
    store: &dyn ManifestStore,
    notifier: &dyn Notifier,
) -> Result<RunResult> {
    let started = Instant::now();
    let date = reference_date(config);
    log::info!(
        "Starting monitor run for {} ({} page(s))",
        date,
        config.pages.len()
    );

    let mut result = RunResult {
        reference_date: date.clone(),
        ..RunResult::default()
    };

    let mut candidates = Vec::new();
    let mut categories: HashMap<String, String> = HashMap::new();
    for page in &config.pages {
        let scan = match discovery.scan(page).await {
            Ok(scan) => scan,
            Err(e) => {
                log::warn!("Failed to process page {} ({}): {}", page.label, page.url, e);
                continue;
            }
        };
        result.pages_scanned += 1;

        if scan.lists_date(&date) {
            log::info!("{} lists the reference date {}", page.label, date);
            result.pages_with_date.push(page.label.clone());
        }
        for link in &scan.links {
            let category = categories
                .entry(link.clone())
                .or_insert_with(|| {
                    scan.category_of(link)
                        .unwrap_or(config.discovery.default_category.as_str())
                        .to_string()
                })
                .clone();
            candidates.push(Candidate::new(link.clone(), category));
        }
    }
    log::info!("Discovered {} document link(s)", candidates.len());

    let mut manifest = store.load().await?;
    let detector = ChangeDetector::from_config(config);
    let report = detector.run(source, &mut manifest, &candidates).await;
    store.save(&manifest).await?;

    log::info!(
        "Checked {} document(s): {} changed, {} failed",
        report.checked,
        report.verdicts.len(),
        report.failures.len()
    );

    let change_report = ChangeReport {
        reference_date: date,
        verdicts: report.verdicts,
    };
    result.recipients = notifier.recipients();
    result.delivered = match notifier.notify(&change_report).await {
        Ok(delivered) => delivered,
        Err(e) => {
            log::error!("Failed to send report: {}", e);
            0
        }
    };

    result.verdicts = change_report.verdicts;
    result.failures = report.failures;
    result.elapsed = started.elapsed();
    log::info!("Monitor run finished in {:.1?}", result.elapsed);
    Ok(result)
}
