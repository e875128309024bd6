use async_trait::async_trait;
use chrono::DateTime;
use futures::StreamExt;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_items, ParseResult, RawItem};
use crate::storage::Validators;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Errors that can occur during feed fetching operations.
///
/// Any of these skips the feed for the current cycle; they never abort the
/// sync of other feeds.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a status other than 2xx or 304
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded its timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// A feed body that changed since the presented validators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedFeed {
    /// Items in delivered order (most recent first, as upstream sends them)
    pub items: Vec<RawItem>,
    /// Entity tag to present next time, if the server sent one
    pub etag: Option<String>,
    /// `Last-Modified` as Unix seconds, if the server sent a parsable one
    pub modified: Option<i64>,
}

impl FetchedFeed {
    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            modified: self.modified,
        }
    }
}

/// Result of a conditional fetch that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Upstream reports no change since the presented validators
    NotModified,
    Modified(FetchedFeed),
}

/// Source of feed content that honors cache validators.
#[async_trait]
pub trait ConditionalFetcher: Send + Sync {
    async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchOutcome, FetchError>;
}

/// Tuning for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries for 429, 5xx and truncated bodies
    pub max_retries: u32,
    /// First retry delay; doubles on each further retry up to one minute
    pub retry_base_delay: Duration,
    pub max_feed_size: usize,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            max_feed_size: MAX_FEED_SIZE,
        }
    }
}

impl FetcherOptions {
    /// Delay before the zero-based `retry`, capped at one minute.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(MAX_RETRY_DELAY)
    }

    /// Longest one fetch can take: each attempt may spend `timeout` on the
    /// response head and again on the body, plus every retry delay.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        let requests = self.timeout.saturating_mul(2).saturating_mul(attempts);

        // Past 32 doublings every delay sits at the cap
        let stepped = self.max_retries.min(32);
        let delays = (0..stepped)
            .fold(Duration::ZERO, |total, retry| total.saturating_add(self.retry_delay(retry)))
            .saturating_add(
                self.retry_delay(u32::MAX)
                    .saturating_mul(self.max_retries - stepped),
            );
        requests.saturating_add(delays)
    }
}

/// Conditional HTTP fetcher over `reqwest`.
///
/// Sends `If-None-Match` / `If-Modified-Since` when validators are known and
/// maps `304 Not Modified` to [`FetchOutcome::NotModified`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetcherOptions,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, options: FetcherOptions) -> Self {
        Self { client, options }
    }

    async fn fetch_bytes(
        &self,
        url: &str,
        validators: &Validators,
    ) -> Result<Option<(Vec<u8>, Option<String>, Option<i64>)>, FetchError> {
        let mut retry_count = 0;

        loop {
            let mut request = self.client.get(url);
            if let Some(etag) = &validators.etag {
                request = request.header(IF_NONE_MATCH, etag.as_str());
            }
            if let Some(since) = validators.modified.and_then(format_http_date) {
                request = request.header(IF_MODIFIED_SINCE, since);
            }

            let response = tokio::time::timeout(self.options.timeout, request.send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;
            let status = response.status();

            if status == StatusCode::NOT_MODIFIED {
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= self.options.max_retries {
                    return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                        FetchError::RateLimited(self.options.max_retries)
                    } else {
                        FetchError::HttpStatus(status.as_u16())
                    });
                }

                let delay = self.options.retry_delay(retry_count);
                tracing::warn!(
                    feed = %url,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Feed server unavailable, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // 4xx and other non-success statuses fail immediately
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let etag = header_string(&response, ETAG);
            let modified = header_string(&response, LAST_MODIFIED)
                .as_deref()
                .and_then(parse_http_date);

            match tokio::time::timeout(
                self.options.timeout,
                read_limited_bytes(response, self.options.max_feed_size),
            )
            .await
            .map_err(|_| FetchError::Timeout)?
            {
                Ok(bytes) => return Ok(Some((bytes, etag, modified))),
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= self.options.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }

                    let delay = self.options.retry_delay(retry_count);
                    tracing::debug!(
                        feed = %url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ConditionalFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchOutcome, FetchError> {
        let Some((bytes, etag, modified)) = self.fetch_bytes(url, validators).await? else {
            return Ok(FetchOutcome::NotModified);
        };

        let ParseResult { items, skipped } =
            parse_items(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        if skipped > 0 {
            tracing::warn!(feed = %url, skipped = skipped, "Untitled items skipped");
        }

        Ok(FetchOutcome::Modified(FetchedFeed {
            items,
            etag,
            modified,
        }))
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Formats Unix seconds as an HTTP date (`Fri, 15 Mar 2024 10:00:00 GMT`).
pub(crate) fn format_http_date(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Parses an HTTP date header into Unix seconds.
pub(crate) fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp())
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
