// src/services/discovery.rs

//! Discovery adapter.
//!
//! Reads a monitored leiaute page and extracts the date markers listed in
//! its tables, the document links it offers and the category heading each
//! link sits under.

use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, DiscoveryConfig, MonitoredPage, PageScan};
use crate::utils::http::{RetryPolicy, create_client, fetch_page};
use crate::utils::resolve_url;

/// Extracts candidate documents from a monitored page.
#[async_trait]
pub trait DiscoveryAdapter: Send + Sync {
    async fn scan(&self, page: &MonitoredPage) -> Result<PageScan>;
}

/// Which document links are worth tracking.
#[derive(Debug, Clone)]
pub struct LinkPolicy {
    only_current: bool,
    current_segment: String,
    exclude_patterns: Vec<String>,
    extension: Regex,
}

impl LinkPolicy {
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        let alternatives = config
            .extensions
            .iter()
            .map(|ext| regex::escape(ext.trim_start_matches('.')))
            .collect::<Vec<_>>()
            .join("|");
        let extension = Regex::new(&format!(r"(?i)\.({alternatives})$"))
            .map_err(|e| AppError::config(format!("invalid extension list: {e}")))?;

        Ok(Self {
            only_current: config.only_current,
            current_segment: config.current_segment.to_lowercase(),
            exclude_patterns: config
                .exclude_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            extension,
        })
    }

    /// Whether an href points at an allow-listed document type.
    pub fn is_document(&self, href: &str) -> bool {
        self.extension.is_match(href.trim())
    }

    /// Whether an absolute document URL passes the current/exclusion rules.
    pub fn accepts(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        if self.only_current && !lower.contains(&self.current_segment) {
            return false;
        }
        !self.exclude_patterns.iter().any(|p| lower.contains(p))
    }
}

/// Discovery over static HTML fetched with the shared client.
pub struct HtmlDiscovery {
    client: Client,
    retry: RetryPolicy,
    timeout_secs: u64,
    policy: LinkPolicy,
    category: Selector,
    default_category: String,
    date_pattern: Regex,
    cells: Selector,
    anchors: Selector,
}

impl HtmlDiscovery {
    pub fn new(
        client: Client,
        retry: RetryPolicy,
        timeout_secs: u64,
        config: &DiscoveryConfig,
    ) -> Result<Self> {
        Ok(Self {
            client,
            retry,
            timeout_secs,
            policy: LinkPolicy::from_config(config)?,
            category: Self::parse_selector(&config.category_selector)?,
            default_category: config.default_category.clone(),
            date_pattern: Regex::new(r"^\d{2}/\d{2}/\d{4}$")
                .map_err(|e| AppError::config(e.to_string()))?,
            cells: Self::parse_selector("td")?,
            anchors: Self::parse_selector("a[href]")?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            create_client(&config.http)?,
            RetryPolicy::from_config(&config.http),
            config.http.page_timeout_secs,
            &config.discovery,
        )
    }

    /// Extract dates, links and categories from a parsed page.
    pub fn extract(&self, document: &Html, base: &Url) -> PageScan {
        let mut scan = PageScan::default();

        scan.dates = document
            .select(&self.cells)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .filter(|text| self.date_pattern.is_match(text))
            .collect();

        let mut seen = HashSet::new();
        for anchor in document.select(&self.anchors) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !self.policy.is_document(href) {
                continue;
            }

            let link = resolve_url(base, href.trim());
            if !self.policy.accepts(&link) || !seen.insert(link.clone()) {
                continue;
            }

            scan.categories
                .insert(link.clone(), self.category_for(anchor));
            scan.links.push(link);
        }

        scan
    }

    /// Nearest preceding category heading of the anchor or any ancestor.
    fn category_for(&self, anchor: ElementRef<'_>) -> String {
        let mut node = Some(*anchor);
        while let Some(current) = node {
            for sibling in current.prev_siblings() {
                if let Some(element) = ElementRef::wrap(sibling) {
                    if self.category.matches(&element) {
                        let text = element.text().collect::<String>();
                        let text = text.trim();
                        if text.is_empty() {
                            return self.default_category.clone();
                        }
                        return text.to_string();
                    }
                }
            }
            node = current.parent();
        }
        self.default_category.clone()
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

#[async_trait]
impl DiscoveryAdapter for HtmlDiscovery {
    async fn scan(&self, page: &MonitoredPage) -> Result<PageScan> {
        let base = Url::parse(&page.url)
            .map_err(|e| AppError::discovery(format!("invalid page URL {}: {e}", page.url)))?;
        let document = fetch_page(&self.client, &self.retry, &page.url, self.timeout_secs).await?;
        let scan = self.extract(&document, &base);
        log::info!(
            "Scanned {}: {} date(s), {} document link(s)",
            page.label,
            scan.dates.len(),
            scan.links.len()
        );
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <html><body>
          <table>
            <tr><td>Versão</td><td> 02/09/2025 </td></tr>
            <tr><td>Anterior</td><td>15/01/2024</td></tr>
            <tr><td>2025-09-02</td></tr>
          </table>
          <div class="bloco">
            <h3 id="categoria">Leiautes</h3>
            <p><a href="/content/Atual/DDR.pdf">DDR</a></p>
            <p><a href="/content/Atual/DDR.XSD">Schema</a></p>
            <h3 id="categoria">Planilhas</h3>
            <ul><li><a href="/content/Atual/Tabela%20DRM.xlsx">Tabela</a></li></ul>
            <a href="/content/Atual/DDR.pdf">DDR again</a>
          </div>
          <a href="/content/versoes_anteriores/Atual/old.pdf">Old</a>
          <a href="/content/Historico/doc.zip">History</a>
          <a href="/content/Atual/page.html">Page</a>
          <a href="/content/Outros/manual.pdf">Not current</a>
          <a href="https://cdn.example.com/atual/loose.zip">Loose</a>
        </body></html>
    "#;

    fn discovery(config: &DiscoveryConfig) -> HtmlDiscovery {
        HtmlDiscovery::new(
            create_client(&HttpConfig::default()).unwrap(),
            RetryPolicy::none(),
            5,
            config,
        )
        .unwrap()
    }

    fn scan(html: &str, config: &DiscoveryConfig) -> PageScan {
        let base = Url::parse("https://www.bcb.gov.br/estabilidadefinanceira/leiaute").unwrap();
        discovery(config).extract(&Html::parse_document(html), &base)
    }

    #[test]
    fn test_extracts_date_cells() {
        let result = scan(PAGE, &DiscoveryConfig::default());
        assert_eq!(result.dates, vec!["02/09/2025", "15/01/2024"]);
        assert!(result.lists_date("02/09/2025"));
        assert!(!result.lists_date("03/09/2025"));
    }

    #[test]
    fn test_link_policy_filters_and_dedupes() {
        let result = scan(PAGE, &DiscoveryConfig::default());
        assert_eq!(
            result.links,
            vec![
                "https://www.bcb.gov.br/content/Atual/DDR.pdf",
                "https://www.bcb.gov.br/content/Atual/DDR.XSD",
                "https://www.bcb.gov.br/content/Atual/Tabela%20DRM.xlsx",
                "https://cdn.example.com/atual/loose.zip",
            ]
        );
    }

    #[test]
    fn test_only_current_toggle() {
        let config = DiscoveryConfig {
            only_current: false,
            ..Default::default()
        };
        let result = scan(PAGE, &config);
        assert!(
            result
                .links
                .contains(&"https://www.bcb.gov.br/content/Outros/manual.pdf".to_string())
        );
        assert!(result.links.iter().all(|l| !l.contains("versoes_anteriores")));
        assert!(result.links.iter().all(|l| !l.to_lowercase().contains("historico")));
    }

    #[test]
    fn test_category_from_nearest_heading() {
        let result = scan(PAGE, &DiscoveryConfig::default());
        assert_eq!(
            result.category_of("https://www.bcb.gov.br/content/Atual/DDR.pdf"),
            Some("Leiautes")
        );
        assert_eq!(
            result.category_of("https://www.bcb.gov.br/content/Atual/Tabela%20DRM.xlsx"),
            Some("Planilhas")
        );
        assert_eq!(
            result.category_of("https://cdn.example.com/atual/loose.zip"),
            Some("Sem categoria")
        );
    }

    #[test]
    fn test_link_policy_extensions() {
        let policy = LinkPolicy::from_config(&DiscoveryConfig::default()).unwrap();
        assert!(policy.is_document("/Atual/a.PDF"));
        assert!(policy.is_document("/Atual/a.xls"));
        assert!(policy.is_document("/Atual/a.xsd"));
        assert!(!policy.is_document("/Atual/a.pdf?download=1"));
        assert!(!policy.is_document("/Atual/a.docx"));
        assert!(policy.accepts("https://x/ATUAL/a.pdf"));
        assert!(!policy.accepts("https://x/atual/anteriores/a.pdf"));
    }

    #[tokio::test]
    async fn test_scan_fetches_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leiaute/ddr"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let page = MonitoredPage {
            url: format!("{}/leiaute/ddr", server.uri()),
            label: "DDR - 2011".into(),
        };
        let result = discovery(&DiscoveryConfig::default())
            .scan(&page)
            .await
            .unwrap();

        assert_eq!(result.dates.len(), 2);
        assert_eq!(
            result.links[0],
            format!("{}/content/Atual/DDR.pdf", server.uri())
        );
    }

    #[tokio::test]
    async fn test_scan_reports_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let page = MonitoredPage {
            url: format!("{}/leiaute/missing", server.uri()),
            label: "X".into(),
        };
        let result = discovery(&DiscoveryConfig::default()).scan(&page).await;
        assert!(matches!(result, Err(AppError::Http(_))));
    }
}
