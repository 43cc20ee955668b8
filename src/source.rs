use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, info, warn};

use crate::model::CatalogEntry;
use crate::parser::catalog::resolve_catalog;
use crate::retry::{retry_if, RetryPolicy};

const MAX_ATTEMPTS: u32 = 4;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("bible_publisher/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
struct FetchError {
    status: Option<StatusCode>,
    message: String,
}

impl FetchError {
    /// Rate limits, server errors and network failures are worth retrying.
    fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Fetches source pages over HTTP.
pub struct SourceClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl SourceClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(SourceClient {
            http,
            retry: RetryPolicy::exponential(MAX_ATTEMPTS, Duration::from_millis(BASE_BACKOFF_MS)),
        })
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let result = retry_if(&self.retry, FetchError::is_transient, |attempt| async move {
            if attempt > 1 {
                warn!("Retrying {} (attempt {}/{})", url, attempt, self.retry.max_attempts);
            }
            self.fetch_once(url).await
        })
        .await;

        result.map_err(|failure| {
            anyhow!(
                "Failed to fetch {} after {} attempts: {}",
                url,
                failure.attempts,
                failure.error
            )
        })
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, FetchError> {
        let network = |e: reqwest::Error| FetchError {
            status: None,
            message: e.to_string(),
        };
        let response = self.http.get(url).send().await.map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError {
                status: Some(status),
                message: format!("GET {}", url),
            });
        }
        let body = response.text().await.map_err(network)?;
        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }
}

/// Anything that can return the HTML behind a URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

#[async_trait]
impl PageSource for SourceClient {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.fetch_with_retry(url).await
    }
}

/// Fetch and resolve the book catalog, with chapter links made absolute.
pub async fn fetch_catalog<S>(source: &S, catalog_url: &str) -> Result<Vec<CatalogEntry>>
where
    S: PageSource + ?Sized,
{
    info!("Fetching catalog: {}", catalog_url);
    let html = source.fetch_html(catalog_url).await?;
    let entries = resolve_catalog(&html).context("Unexpected catalog page")?;
    let entries = absolutize_links(catalog_url, entries)?;
    info!(
        "Catalog lists {} books, {} chapters",
        entries.len(),
        entries.iter().map(|e| e.chapter_urls.len()).sum::<usize>()
    );
    Ok(entries)
}

fn absolutize_links(base: &str, entries: Vec<CatalogEntry>) -> Result<Vec<CatalogEntry>> {
    let base = Url::parse(base).with_context(|| format!("Invalid catalog URL {}", base))?;
    entries
        .into_iter()
        .map(|mut entry| {
            entry.chapter_urls = entry
                .chapter_urls
                .iter()
                .map(|href| {
                    base.join(href)
                        .map(String::from)
                        .with_context(|| format!("{}: bad chapter link {}", entry.name, href))
                })
                .collect::<Result<_>>()?;
            Ok(entry)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Testament;

    #[test]
    fn relative_links_resolved_against_catalog() {
        let entries = vec![CatalogEntry {
            testament: Testament::Old,
            name: "Genesis".into(),
            chapter_urls: vec![
                "/passage/?search=Genesis%201&version=KJV".into(),
                "https://example.org/gen/2".into(),
            ],
        }];
        let resolved =
            absolutize_links("https://www.biblegateway.com/versions/KJV/", entries).unwrap();
        assert_eq!(
            resolved[0].chapter_urls,
            vec![
                "https://www.biblegateway.com/passage/?search=Genesis%201&version=KJV",
                "https://example.org/gen/2",
            ]
        );
    }

    #[test]
    fn invalid_base_url() {
        assert!(absolutize_links("not a url", vec![]).is_err());
    }

    #[test]
    fn transient_statuses() {
        let err = |status: Option<StatusCode>| FetchError {
            status,
            message: String::new(),
        };
        assert!(err(None).is_transient());
        assert!(err(Some(StatusCode::TOO_MANY_REQUESTS)).is_transient());
        assert!(err(Some(StatusCode::BAD_GATEWAY)).is_transient());
        assert!(!err(Some(StatusCode::NOT_FOUND)).is_transient());
    }
}
