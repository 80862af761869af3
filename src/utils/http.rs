// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use scraper::Html;

use crate::error::Result;
use crate::models::HttpConfig;

fn client_builder(config: &HttpConfig) -> ClientBuilder {
    Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs))
}

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &HttpConfig) -> Result<Client> {
    Ok(client_builder(config).build()?)
}

/// Client that never decodes response bodies.
///
/// Decoding drops `Content-Length` and rewrites the bytes, so fingerprints
/// must see the representation exactly as the server sent it.
pub fn create_raw_client(config: &HttpConfig) -> Result<Client> {
    Ok(client_builder(config)
        .no_gzip()
        .no_brotli()
        .no_deflate()
        .build()?)
}

/// Fetch a page with a custom timeout and parse it as HTML.
pub async fn fetch_page(
    client: &Client,
    retry: &RetryPolicy,
    url: &str,
    timeout_secs: u64,
) -> Result<Html> {
    let request = client.get(url).timeout(Duration::from_secs(timeout_secs));
    let text = retry.send(request).await?.error_for_status()?.text().await?;
    Ok(Html::parse_document(&text))
}

/// Transport-level retry for idempotent requests.
///
/// Retries transient statuses and connect/timeout errors with exponential
/// backoff. Every other status, 404 included, is returned as-is.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_factor: Duration,
    statuses: Vec<StatusCode>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: Duration) -> Self {
        Self {
            max_retries,
            backoff_factor,
            statuses: vec![
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.backoff_factor_ms),
        )
    }

    /// A policy that sends each request exactly once.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn should_retry_status(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status)
    }

    /// Delay before the given retry (1-based): `factor * 2^(retry-1)`.
    pub fn delay(&self, retry: u32) -> Duration {
        let power = retry.saturating_sub(1).min(16);
        self.backoff_factor.saturating_mul(1 << power)
    }

    /// Send a request, retrying while the policy allows.
    pub async fn send(&self, request: RequestBuilder) -> reqwest::Result<Response> {
        let mut retries = 0;
        loop {
            // Requests with streaming bodies cannot be replayed.
            let Some(attempt) = request.try_clone() else {
                return request.send().await;
            };

            match attempt.send().await {
                Ok(response)
                    if retries < self.max_retries && self.should_retry_status(response.status()) =>
                {
                    log::debug!(
                        "Retrying {} after status {}",
                        response.url(),
                        response.status()
                    );
                }
                Err(error) if retries < self.max_retries && (error.is_timeout() || error.is_connect()) => {
                    log::debug!("Retrying after transport error: {}", error);
                }
                outcome => return outcome,
            }

            retries += 1;
            tokio::time::sleep(self.delay(retries)).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn transient_statuses_only() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(policy.should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!policy.should_retry_status(StatusCode::NOT_FOUND));
        assert!(!policy.should_retry_status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = create_client(&HttpConfig::default()).unwrap();
        let response = fast_policy()
            .send(client.get(format!("{}/doc.pdf", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn does_not_retry_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_client(&HttpConfig::default()).unwrap();
        let response = fast_policy()
            .send(client.head(format!("{}/gone.pdf", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let client = create_client(&HttpConfig::default()).unwrap();
        let response = fast_policy()
            .send(client.get(format!("{}/busy", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
