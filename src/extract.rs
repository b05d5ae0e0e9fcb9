//! Link extraction from a single web page.
//!
//! The extractor fetches one page (with the same retry policy the download
//! engine uses), parses it as HTML, and returns the deduplicated, validated
//! file links whose path ends with one of the requested extensions. It never
//! follows links off the page; zero matches is a success, not an error.

use std::collections::HashSet;
use std::time::Duration;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::download::{FailureType, RetryDecision, RetryPolicy, classify_status, parse_retry_after};
use crate::link::FileLink;
use crate::user_agent::BROWSER_USER_AGENT;

/// Errors from one extraction call.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page URL or extension set is unusable; never retried.
    #[error("invalid input: {detail}")]
    InvalidInput {
        /// What was wrong.
        detail: String,
    },

    /// Page retrieval failed after exhausting the retry policy.
    #[error("failed to fetch {url}: {detail}")]
    Fetch {
        /// The page URL.
        url: String,
        /// Last error text.
        detail: String,
    },

    /// A successful response whose body could not be read for parsing.
    /// Distinct from "zero links found", which is a success.
    #[error("failed to read page body from {url}: {source}")]
    Parsing {
        /// The page URL.
        url: String,
        /// The underlying body-read error.
        #[source]
        source: reqwest::Error,
    },
}

impl ExtractError {
    fn invalid_input(detail: impl Into<String>) -> Self {
        Self::InvalidInput {
            detail: detail.into(),
        }
    }

    fn fetch(url: &Url, detail: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.to_string(),
            detail: detail.into(),
        }
    }
}

/// One failed fetch attempt, classified for the retry loop.
struct FetchFailure {
    failure_type: FailureType,
    retry_after: Option<Duration>,
    error: ExtractError,
}

/// Extracts qualifying file links from a single page.
///
/// Holds its own HTTP client (pages and file transfers have different
/// lifetimes and should not share a pool) and the shared retry policy.
#[derive(Debug)]
pub struct LinkExtractor {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl LinkExtractor {
    /// Creates an extractor with the configured timeouts and retry policy.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .gzip(true)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            policy: RetryPolicy::with_max_attempts(config.retry_attempts),
        }
    }

    /// Fetches `page_url` and returns its qualifying links in document
    /// order, first occurrence winning on duplicates.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::InvalidInput`] for a non-http(s) or hostless page
    ///   URL, or an empty extension set
    /// - [`ExtractError::Fetch`] when the page cannot be retrieved after
    ///   retries
    /// - [`ExtractError::Parsing`] when the body of a successful response
    ///   cannot be read
    pub async fn extract(
        &self,
        page_url: &str,
        extensions: &[String],
    ) -> Result<Vec<FileLink>, ExtractError> {
        let page_url = page_url.trim();
        if page_url.is_empty() {
            return Err(ExtractError::invalid_input("page URL is empty"));
        }
        if extensions.is_empty() {
            return Err(ExtractError::invalid_input("no file extensions given"));
        }

        let base = Url::parse(page_url)
            .map_err(|e| ExtractError::invalid_input(format!("{page_url}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(ExtractError::invalid_input(format!(
                "{page_url}: expected an absolute http(s) URL"
            )));
        }

        info!(url = %base, ?extensions, "extracting links");
        let body = self.fetch_page(&base).await?;
        let links = links_from_html(&body, &base, extensions);
        info!(url = %base, found = links.len(), "extraction complete");
        Ok(links)
    }

    /// Fetches the page body, retrying transient failures per the shared
    /// policy.
    async fn fetch_page(&self, page_url: &Url) -> Result<String, ExtractError> {
        let mut attempt = 0u32;
        loop {
            match self.try_fetch(page_url).await {
                Ok(body) => return Ok(body),
                Err(failure) => {
                    match self.policy.should_retry(failure.failure_type, attempt) {
                        RetryDecision::Retry {
                            delay: backoff_delay,
                            attempt: next_attempt,
                        } => {
                            let delay = failure.retry_after.unwrap_or(backoff_delay);
                            warn!(
                                url = %page_url,
                                attempt = next_attempt,
                                delay_ms = delay.as_millis(),
                                error = %failure.error,
                                "retrying page fetch"
                            );
                            tokio::time::sleep(delay).await;
                            attempt = next_attempt;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(url = %page_url, %reason, "not retrying page fetch");
                            return Err(failure.error);
                        }
                    }
                }
            }
        }
    }

    /// One fetch attempt, mapping failures into the shared classification.
    async fn try_fetch(&self, page_url: &Url) -> Result<String, FetchFailure> {
        let response = self
            .client
            .get(page_url.clone())
            .send()
            .await
            .map_err(|e| FetchFailure {
                failure_type: FailureType::Transient,
                retry_after: None,
                error: ExtractError::fetch(page_url, e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(FetchFailure {
                failure_type: classify_status(status.as_u16()),
                retry_after,
                error: ExtractError::fetch(page_url, format!("HTTP {status}")),
            });
        }

        response.text().await.map_err(|source| FetchFailure {
            failure_type: FailureType::Permanent,
            retry_after: None,
            error: ExtractError::Parsing {
                url: page_url.to_string(),
                source,
            },
        })
    }
}

/// Walks the document's anchors and collects qualifying links.
///
/// Malformed HTML still yields a partial DOM here, which is fine; anything
/// that fails to resolve or validate is silently discarded.
#[allow(clippy::expect_used)]
fn links_from_html(html: &str, base: &Url, extensions: &[String]) -> Vec<FileLink> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("static selector is valid");

    // SeenSet: dedup is scoped to this one extraction call.
    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&anchors) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        let lower = href.to_ascii_lowercase();
        if lower.starts_with('#') || lower.starts_with("javascript:") || lower.starts_with("mailto:")
        {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            debug!(href, "discarding unresolvable href");
            continue;
        };
        let Some(link) = FileLink::from_url(resolved) else {
            debug!(href, "discarding invalid link");
            continue;
        };
        if !extensions.iter().any(|ext| link.path_has_extension(ext)) {
            continue;
        }
        // Membership is checked before emission; first occurrence wins.
        if seen.insert(link.as_str().to_string()) {
            links.push(link);
        }
    }

    links
}
