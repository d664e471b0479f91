use std::time::Duration;

use reqwest::StatusCode;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::{debug, warn};

use crate::config::ClientSettings;
use crate::error::{Error, Result};
use crate::key::RecordKey;
use crate::parser::{self, Notice};

const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A detail page body for one key.
#[derive(Debug, Clone)]
pub struct Page {
    pub key: RecordKey,
    pub html: String,
}

/// What the remote source said about one key.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Loaded(Page),
    NotFound,
    NotYetSubmitted,
}

impl PageOutcome {
    pub fn classify(key: RecordKey, html: String) -> Self {
        match parser::detect_notice(&html) {
            Some(Notice::NotFound) => PageOutcome::NotFound,
            Some(Notice::NotYetSubmitted) => PageOutcome::NotYetSubmitted,
            None => PageOutcome::Loaded(Page { key, html }),
        }
    }
}

/// Fetches detail pages. Any error returned is fatal to the crawl.
#[allow(async_fn_in_trait)]
pub trait PageClient {
    async fn load(&self, key: &RecordKey) -> Result<PageOutcome>;
}

pub fn detail_url(base_url: &str, key: &RecordKey) -> String {
    format!(
        "{}/{}casedetails?CaseType={}",
        base_url.trim_end_matches('/'),
        key.record_type,
        key
    )
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt))
}

/// The site is slow to serve the first case of a range after a cold start.
async fn warm_up(key: &RecordKey, delay: Duration) {
    if key.sequence == 1 && !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

// ── Direct HTTP ──

pub struct HttpPageClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    warmup: Duration,
}

impl HttpPageClient {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("eapps_scraper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(HttpPageClient {
            http,
            base_url: settings.base_url.clone(),
            max_retries: settings.max_retries,
            warmup: Duration::from_millis(settings.warmup_delay_ms),
        })
    }

    /// `None` when the server answers 404.
    async fn fetch(&self, url: &str) -> std::result::Result<Option<String>, reqwest::Error> {
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        response.error_for_status()?.text().await.map(Some)
    }
}

fn is_retryable(e: &reqwest::Error) -> bool {
    e.is_timeout()
        || e.is_connect()
        || e
            .status()
            .is_some_and(|s| s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
}

impl PageClient for HttpPageClient {
    async fn load(&self, key: &RecordKey) -> Result<PageOutcome> {
        warm_up(key, self.warmup).await;
        let url = detail_url(&self.base_url, key);

        let mut attempt = 0;
        loop {
            match self.fetch(&url).await {
                Ok(Some(html)) => {
                    debug!(%key, bytes = html.len(), "fetched");
                    return Ok(PageOutcome::classify(*key, html));
                }
                Ok(None) => {
                    debug!(%key, "404 from server");
                    return Ok(PageOutcome::NotFound);
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    let wait = backoff(attempt);
                    warn!(
                        "Request for {} failed (attempt {}/{}): {}, backing off {:.1}s",
                        key,
                        attempt + 1,
                        self.max_retries,
                        e,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(Error::Transport {
                        key: key.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

// ── Rendered via spider.cloud ──

/// Fetches through a rendering service for when the site needs scripts to
/// run before the detail tables exist.
pub struct RenderedPageClient {
    spider: Spider,
    base_url: String,
    max_retries: u32,
    warmup: Duration,
}

impl RenderedPageClient {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let api_key = std::env::var("SPIDER_API_KEY")
            .map_err(|_| Error::Config("SPIDER_API_KEY environment variable must be set".into()))?;
        let spider = Spider::new(Some(api_key))
            .map_err(|e| Error::Config(format!("Failed to create Spider client: {}", e)))?;
        Ok(RenderedPageClient {
            spider,
            base_url: settings.base_url.clone(),
            max_retries: settings.max_retries,
            warmup: Duration::from_millis(settings.warmup_delay_ms),
        })
    }

    async fn render(&self, url: &str) -> std::result::Result<String, String> {
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };
        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| e.to_string())?;

        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        if let Some(status) = first.and_then(|obj| obj.get("status")).and_then(|s| s.as_i64()) {
            if status == 429 || status >= 500 {
                return Err(format!("upstream status {}", status));
            }
        }

        first
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| "No content in spider response".to_string())
    }
}

fn should_retry(message: &str) -> bool {
    ["429", "rate", "500", "502", "503"]
        .iter()
        .any(|m| message.contains(m))
}

impl PageClient for RenderedPageClient {
    async fn load(&self, key: &RecordKey) -> Result<PageOutcome> {
        warm_up(key, self.warmup).await;
        let url = detail_url(&self.base_url, key);

        let mut attempt = 0;
        loop {
            match self.render(&url).await {
                Ok(html) => return Ok(PageOutcome::classify(*key, html)),
                Err(message) if attempt < self.max_retries && should_retry(&message) => {
                    let wait = backoff(attempt);
                    warn!(
                        "Rate limited on {} (attempt {}/{}), backing off {:.1}s",
                        key,
                        attempt + 1,
                        self.max_retries,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(message) => {
                    return Err(Error::Rendered {
                        key: key.to_string(),
                        message,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_url_embeds_type_and_key() {
        let key: RecordKey = "PA/00010/20".parse().unwrap();
        assert_eq!(
            detail_url("https://www.pa.org.mt/", &key),
            "https://www.pa.org.mt/PAcasedetails?CaseType=PA/00010/20"
        );
    }

    #[test]
    fn classify_maps_notices_to_signals() {
        let key: RecordKey = "RG/00002/19".parse().unwrap();
        let nf = std::fs::read_to_string("tests/fixtures/not_found.html").unwrap();
        let ns = std::fs::read_to_string("tests/fixtures/not_submitted.html").unwrap();
        let rec = std::fs::read_to_string("tests/fixtures/record.html").unwrap();
        assert!(matches!(PageOutcome::classify(key, nf), PageOutcome::NotFound));
        assert!(matches!(PageOutcome::classify(key, ns), PageOutcome::NotYetSubmitted));
        assert!(matches!(PageOutcome::classify(key, rec), PageOutcome::Loaded(p) if p.key == key));
    }

    #[test]
    fn retry_on_rate_limit_messages_only() {
        assert!(should_retry("upstream status 429"));
        assert!(should_retry("502 Bad Gateway"));
        assert!(!should_retry("No content in spider response"));
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_millis(2000));
        assert_eq!(backoff(2), Duration::from_millis(8000));
    }

    /// Answer one connection with a canned response; returns the base URL.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn direct_client(base_url: String) -> HttpPageClient {
        HttpPageClient::new(&ClientSettings {
            kind: crate::config::ClientKind::Direct,
            base_url,
            max_retries: 0,
            warmup_delay_ms: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn http_404_counts_as_not_found() {
        let base = serve_once("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let key: RecordKey = "PA/00002/20".parse().unwrap();
        let outcome = direct_client(base).load(&key).await.unwrap();
        assert!(matches!(outcome, PageOutcome::NotFound));
    }

    #[tokio::test]
    async fn server_error_without_retries_is_fatal() {
        let base = serve_once("HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let key: RecordKey = "PA/00002/20".parse().unwrap();
        let err = direct_client(base).load(&key).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }
}
