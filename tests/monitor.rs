//! End-to-end monitor runs against a mock leiaute site.

use std::sync::Mutex;

use async_trait::async_trait;
use leiaute_monitor::error::Result;
use leiaute_monitor::models::{Config, Evidence, HttpConfig, MonitoredPage, RunConfig, RunResult};
use leiaute_monitor::pipeline::run_monitor;
use leiaute_monitor::services::{ChangeReport, HtmlDiscovery, HttpFingerprintSource, Notifier};
use leiaute_monitor::storage::{LocalManifestStore, ManifestStore, StatusCode, StatusReport};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingNotifier {
    reports: Mutex<Vec<ChangeReport>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &ChangeReport) -> Result<usize> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(1)
    }

    fn recipients(&self) -> Vec<String> {
        vec!["ops@example.com".into()]
    }
}

const PAGE: &str = r#"
<html><body>
  <table><tr><td>DDR</td><td>02/09/2025</td></tr></table>
  <h3 id="categoria">Leiautes</h3>
  <p><a href="/content/Atual/Leiaute%20DDR.pdf">Leiaute</a></p>
  <h3 id="categoria">Schemas</h3>
  <p><a href="/content/Atual/ddr.xsd">XSD</a></p>
  <p><a href="/content/versoes_anteriores/ddr_v1.pdf">v1</a></p>
</body></html>
"#;

async fn mount_site(server: &MockServer, etag: &str) {
    Mock::given(method("GET"))
        .and(path("/leiaute/ddr"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/content/Atual/Leiaute%20DDR.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", etag))
        .mount(server)
        .await;
    // No metadata for the schema: only the range probe works.
    Mock::given(method("HEAD"))
        .and(path("/content/Atual/ddr.xsd"))
        .respond_with(ResponseTemplate::new(405))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/content/Atual/ddr.xsd"))
        .respond_with(ResponseTemplate::new(206).set_body_string("<xsd:schema/>"))
        .mount(server)
        .await;
}

fn config(server: &MockServer) -> Config {
    Config {
        http: HttpConfig {
            max_retries: 0,
            ..HttpConfig::default()
        },
        pages: vec![
            MonitoredPage {
                url: format!("{}/leiaute/ddr", server.uri()),
                label: "DDR - 2011".into(),
            },
            MonitoredPage {
                url: format!("{}/leiaute/missing", server.uri()),
                label: "DRM - 2060".into(),
            },
        ],
        run: RunConfig {
            reference_date: Some("02/09/2025".into()),
        },
        ..Config::default()
    }
}

async fn run_once(
    config: &Config,
    store: &LocalManifestStore,
    notifier: &RecordingNotifier,
) -> RunResult {
    let discovery = HtmlDiscovery::from_config(config).unwrap();
    let source = HttpFingerprintSource::from_config(config).unwrap();
    run_monitor(config, &discovery, &source, store, notifier)
        .await
        .unwrap()
}

#[tokio::test]
async fn detects_new_then_unchanged_then_changed() {
    let server = MockServer::start().await;
    mount_site(&server, "\"v1\"").await;

    let tmp = TempDir::new().unwrap();
    let config = config(&server);
    let store = LocalManifestStore::new(config.manifest_path(tmp.path()));
    let notifier = RecordingNotifier::default();

    // First run: both documents are new.
    let first = run_once(&config, &store, &notifier).await;
    assert_eq!(first.pages_scanned, 1);
    assert_eq!(first.pages_with_date, vec!["DDR - 2011"]);
    assert_eq!(first.verdicts.len(), 2);
    assert!(first.failures.is_empty());
    assert_eq!(first.verdicts[0].category, "Leiautes");
    assert_eq!(first.verdicts[1].category, "Schemas");
    assert!(
        first
            .verdicts
            .iter()
            .all(|v| v.evidence == vec![Evidence::NewlyObserved])
    );
    assert_eq!(
        first.changed_file_names(),
        vec!["Leiaute DDR.pdf", "ddr.xsd"]
    );

    let manifest = store.load().await.unwrap();
    assert_eq!(manifest.len(), 2);
    let schema = manifest
        .get(&format!("{}/content/Atual/ddr.xsd", server.uri()))
        .unwrap();
    assert!(schema.content_prefix_hash.is_some());
    assert!(schema.validator.is_none());

    // Second run: nothing changed.
    let second = run_once(&config, &store, &notifier).await;
    assert!(second.verdicts.is_empty());

    // The server publishes a new revision of the PDF.
    server.reset().await;
    mount_site(&server, "\"v2\"").await;

    let third = run_once(&config, &store, &notifier).await;
    assert_eq!(third.verdicts.len(), 1);
    assert!(third.verdicts[0].locator.ends_with("Leiaute%20DDR.pdf"));
    assert_eq!(third.verdicts[0].evidence[0], Evidence::ValidatorChanged);

    let reports = notifier.reports.lock().unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports[1].verdicts.is_empty());
    assert_eq!(reports[2].reference_date, "02/09/2025");

    let status = StatusReport::from_run(&third, &["DDR - 2011".into()], "logs/monitor.log");
    assert_eq!(status.code, StatusCode::Ok);
    assert!(status.headline.starts_with("1 leiaute novo, 1 documento alterado"));
}

#[tokio::test]
async fn unreachable_documents_are_recorded_as_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/leiaute/ddr"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let mut config = config(&server);
    config.run.reference_date = Some("03/09/2025".into());
    let store = LocalManifestStore::new(config.manifest_path(tmp.path()));
    let notifier = RecordingNotifier::default();

    let result = run_once(&config, &store, &notifier).await;

    assert!(result.verdicts.is_empty());
    assert!(result.pages_with_date.is_empty());
    assert_eq!(result.failures.len(), 2);
    assert!(result.failures[0].error.starts_with("HEAD/Range fail:"));

    let manifest = store.load().await.unwrap();
    assert_eq!(manifest.error_count(), 2);

    let status = StatusReport::from_run(&result, &["DDR - 2011".into()], "log");
    assert_eq!(status.code, StatusCode::Ok);
    assert!(status.headline.starts_with("Nenhuma alteração detectada"));
}
