use thiserror::Error;

use super::discovery::{discover, DiscoveryError};
use super::fetcher::Fetcher;

/// Content types that mean "this URL already is a feed".
pub const FEED_CONTENT_TYPES: [&str; 4] = [
    "application/rss+xml",
    "application/atom+xml",
    "application/xml",
    "text/xml",
];

/// Errors that can occur while turning a user-supplied URL into a feed URL.
#[derive(Debug, Error)]
pub enum LocateError {
    /// The URL answered with something that is neither a feed nor a page
    #[error("unsupported content type {0:?}: not a feed or an HTML page")]
    UnsupportedContentType(String),
    /// The URL is an HTML page but no feed could be discovered from it
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Resolve a user-supplied URL to the URL of an actual feed.
///
/// Sends a HEAD request and classifies the declared content type:
///
/// - feed types ([`FEED_CONTENT_TYPES`]): `user_url` is returned unchanged
/// - `text/html`: the page is scanned for an advertised feed
/// - anything else: [`LocateError::UnsupportedContentType`]
///
/// When the probe itself fails, answers with a status other than 200, or
/// declares no content type, `user_url` is returned unchanged and the reason
/// is logged; a later fetch of that URL reports the real problem.
pub async fn resolve(fetcher: &Fetcher, user_url: &str) -> Result<String, LocateError> {
    let probe = match fetcher.head(user_url).await {
        Ok(probe) => probe,
        Err(e) => {
            tracing::warn!(url = %user_url, error = %e, "Probe failed, using URL as feed URL");
            return Ok(user_url.to_owned());
        }
    };

    if probe.status != 200 {
        tracing::warn!(
            url = %user_url,
            status = probe.status,
            "Probe returned non-200, using URL as feed URL"
        );
        return Ok(user_url.to_owned());
    }

    let Some(content_type) = probe.content_type.filter(|ct| !ct.is_empty()) else {
        tracing::debug!(url = %user_url, "Probe declared no content type, using URL as feed URL");
        return Ok(user_url.to_owned());
    };

    if FEED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Ok(user_url.to_owned());
    }

    if content_type == "text/html" {
        let feed_url = discover(fetcher, user_url).await?;
        tracing::info!(page = %user_url, feed = %feed_url, "Resolved page to feed");
        return Ok(feed_url);
    }

    Err(LocateError::UnsupportedContentType(content_type))
}
