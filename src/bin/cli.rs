//! Leiaute Monitor CLI
//!
//! Entry point invoked by the scheduler, once per monitoring run.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Parser, Subcommand};
use leiaute_monitor::{
    error::Result,
    models::{Config, EmailConfig, RunResult},
    pipeline,
    services::{EmailNotifier, FingerprintSource, HtmlDiscovery, HttpFingerprintSource},
    storage::{LocalManifestStore, ManifestStore, StatusReport},
};

/// Leiaute Monitor - Bacen document change watcher
#[derive(Parser, Debug)]
#[command(
    name = "leiaute-monitor",
    version,
    about = "Watches Bacen leiaute pages for new or changed documents"
)]
struct Cli {
    /// Path to storage directory holding config, manifest and logs
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitor once and write the status artifact
    Run,

    /// Print the fingerprint of each document, without touching state
    Probe {
        /// Document URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Validate configuration file
    Validate,

    /// Show manifest statistics
    Info,
}

/// Log lines go to stderr and to the daily log file.
struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = &mut self.file {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        Ok(())
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, log_path: &Path) {
    let file = match open_log_file(log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", log_path.display(), e);
            None
        }
    };

    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .target(env_logger::Target::Pipe(Box::new(Tee { file })))
        .init();
}

/// Daily log file under the configured log directory.
fn log_path(storage_dir: &Path, config_path: &Path) -> PathBuf {
    let log_dir = Config::load(config_path)
        .map(|c| c.log_dir(storage_dir))
        .unwrap_or_else(|_| Config::default().log_dir(storage_dir));
    log_dir.join(format!("monitor_{}.log", Local::now().format("%Y%m%d")))
}

async fn run(config: &Config, storage_dir: &Path) -> Result<RunResult> {
    config.validate()?;

    let discovery = HtmlDiscovery::from_config(config)?;
    let source = HttpFingerprintSource::from_config(config)?;
    let store = LocalManifestStore::new(config.manifest_path(storage_dir));
    let notifier = EmailNotifier::from_config(config, storage_dir)?;

    pipeline::run_monitor(config, &discovery, &source, &store, &notifier).await
}

/// `run` command: a config that cannot be read fails the run instead of
/// falling back to defaults. Either way the status artifact is written.
async fn run_and_report(storage_dir: &Path, config_path: &Path, log_path: &Path) -> Result<()> {
    let loaded = Config::load(config_path);
    let status_path = match &loaded {
        Ok(config) => config.status_path(storage_dir),
        Err(_) => Config::default().status_path(storage_dir),
    };

    let outcome = match loaded {
        Ok(config) => run(&config, storage_dir).await.map(|result| (config, result)),
        Err(e) => Err(e),
    };

    match outcome {
        Ok((config, result)) => {
            let labels: Vec<String> = config.pages.iter().map(|p| p.label.clone()).collect();
            log::info!("Documents changed: {}", result.verdicts.len());
            for name in result.changed_file_names() {
                log::info!(" - {}", name);
            }
            log::info!("Emails sent: {}", result.delivered);

            StatusReport::from_run(&result, &labels, log_path)
                .write(&status_path)
                .await
        }
        Err(e) => {
            log::error!("Monitor run failed: {}", e);
            if let Err(status_error) = StatusReport::failure(&e, log_path)
                .write(&status_path)
                .await
            {
                log::error!("Failed to write status artifact: {}", status_error);
            }
            Err(e)
        }
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.storage_dir.join("config.toml");
    let log_path = log_path(&cli.storage_dir, &config_path);
    init_logging(cli.verbose, &log_path);

    let config = Config::load_or_default(&config_path);
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    match cli.command {
        Command::Run => run_and_report(&cli.storage_dir, &config_path, &log_path).await?,

        Command::Probe { urls } => {
            let source = HttpFingerprintSource::from_config(&config)?;
            for url in urls {
                let outcome = source.probe(&url).await;
                log::info!("{} -> {}", url, outcome.kind());
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "url": url,
                        "outcome": outcome.kind(),
                        "record": outcome.into_record(),
                    }))?
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = Config::load(&config_path).and_then(|c| c.validate()) {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({} pages)", config.pages.len());
            if config.email.to.is_empty() {
                log::warn!("No recipients configured; reports will not be sent");
            }
            if config.email.resolved_password().is_none() {
                log::warn!(
                    "No SMTP password set (use {})",
                    EmailConfig::PASSWORD_ENV
                );
            }
        }

        Command::Info => {
            let store = LocalManifestStore::new(config.manifest_path(&cli.storage_dir));
            log::info!("Storage directory: {}", cli.storage_dir.display());
            if !store.path().exists() {
                log::info!("No manifest found yet.");
                return Ok(());
            }

            let manifest = store.load().await?;
            log::info!("Manifest: {}", store.path().display());
            log::info!("Tracked documents: {}", manifest.len());
            log::info!("Entries with errors: {}", manifest.error_count());
            match manifest.last_checked() {
                Some(at) => log::info!("Last check: {}", at.format("%d/%m/%Y %H:%M:%S")),
                None => log::info!("Last check: never"),
            }
        }
    }

    log::info!("Done!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leiaute_monitor::error::AppError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn malformed_config_fails_run_with_error_status() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[[pages]\nurl = ").unwrap();
        let log_path = tmp.path().join("logs/monitor.log");

        let result = run_and_report(tmp.path(), &config_path, &log_path).await;
        assert!(matches!(result, Err(AppError::Toml(_))));

        let status =
            std::fs::read_to_string(Config::default().status_path(tmp.path())).unwrap();
        assert!(status.contains("ERRO"), "{status}");
    }

    #[tokio::test]
    async fn missing_config_fails_run() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        let log_path = tmp.path().join("logs/monitor.log");

        let result = run_and_report(tmp.path(), &config_path, &log_path).await;
        assert!(matches!(result, Err(AppError::Io(_))));
        assert!(Config::default().status_path(tmp.path()).exists());
    }
}
