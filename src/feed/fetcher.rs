use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `Accept` header sent with every request, feed types first.
pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.7";

/// `User-Agent` identifying the aggregator to feed hosts.
pub const USER_AGENT: &str = concat!(
    "feeder/",
    env!("CARGO_PKG_VERSION"),
    " (personal feed aggregator)"
);

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving content over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection refused, TLS, reset)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request did not complete before its timeout or deadline
    #[error("request timed out")]
    Timeout,
    /// Server answered with something other than 200 OK
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the 10MB size limit
    #[error("response too large")]
    ResponseTooLarge,
    /// Connection closed before `Content-Length` bytes arrived
    #[error("incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// True for transport failures, timeouts included. False for failures
    /// where the server did answer (status, size).
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Timeout | FetchError::IncompleteResponse { .. }
        )
    }
}

/// Outcome of a HEAD request: what the server claims about a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub status: u16,
    /// Media type with parameters removed, lowercased (`text/html`)
    pub content_type: Option<String>,
}

/// HTTP client for feed content.
///
/// Every request carries [`FEED_ACCEPT`] and [`USER_AGENT`], runs under a
/// bounded timeout, and buffers the whole body in memory. Dropping a pending
/// future aborts the request and releases the connection.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Fetcher {
    /// Build a fetcher with its own client.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client, timeout })
    }

    /// GET `url` and return the full body. Only `200 OK` succeeds.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] / [`FetchError::Timeout`] when the server
    ///   could not be reached in time
    /// - [`FetchError::HttpStatus`] for any status other than 200
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`]
    ///   for bodies that exceed 10MB or arrive truncated
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_until(url, Instant::now() + self.timeout).await
    }

    /// Like [`fetch`](Self::fetch) but gives up at `deadline` instead of
    /// after the configured timeout.
    pub async fn fetch_until(&self, url: &str, deadline: Instant) -> Result<Vec<u8>, FetchError> {
        tokio::time::timeout_at(deadline, self.get_body(url))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    /// HEAD `url` and report status and declared content type.
    ///
    /// Any HTTP status is returned as a [`Probe`]; only transport failures
    /// are errors.
    pub async fn head(&self, url: &str) -> Result<Probe, FetchError> {
        let response = tokio::time::timeout(
            self.timeout,
            self.client.head(url).header(ACCEPT, FEED_ACCEPT).send(),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type);

        Ok(Probe {
            status: response.status().as_u16(),
            content_type,
        })
    }

    async fn get_body(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

/// Strip parameters from a `Content-Type` value: `Text/HTML; charset=utf-8`
/// becomes `text/html`.
pub(crate) fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
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
