use scraper::{ElementRef, Html};
use thiserror::Error;
use url::Url;

use super::fetcher::{media_type, FetchError, Fetcher};

/// Link types that identify a syndication feed.
const FEED_LINK_TYPES: [&str; 2] = ["application/rss+xml", "application/atom+xml"];

/// Errors that can occur during feed discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The page URL itself could not be parsed
    #[error("invalid page URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The page could not be retrieved
    #[error("failed to fetch page: {0}")]
    Fetch(#[from] FetchError),
    /// The page has no `<link rel="alternate">` pointing to RSS or Atom
    #[error("no feed found: page has no RSS/Atom alternate link")]
    NoFeedFound,
    /// The advertised feed link cannot be resolved to an absolute URL
    #[error("feed link {href:?} cannot be resolved: {source}")]
    InvalidHref {
        href: String,
        #[source]
        source: url::ParseError,
    },
}

/// Find the feed a web page advertises.
///
/// Fetches `page_url`, scans it for the first `<link rel="alternate">` with
/// an RSS or Atom `type`, and returns its `href` resolved against
/// `page_url`.
///
/// # Errors
///
/// Returns [`DiscoveryError::NoFeedFound`] when the page advertises no
/// feed, or the fetch/URL error that prevented looking.
pub async fn discover(fetcher: &Fetcher, page_url: &str) -> Result<String, DiscoveryError> {
    let base = Url::parse(page_url)?;
    let bytes = fetcher.fetch(page_url).await?;
    let html = String::from_utf8_lossy(&bytes);

    let href = find_feed_href(&html).ok_or(DiscoveryError::NoFeedFound)?;
    let resolved = base
        .join(&href)
        .map_err(|source| DiscoveryError::InvalidHref {
            href: href.clone(),
            source,
        })?;

    tracing::debug!(page = %page_url, feed = %resolved, "Discovered feed link");
    Ok(resolved.to_string())
}

/// Scan an HTML document depth-first and return the `href` of the first
/// feed `<link>`, unresolved. Stops at the first match.
pub fn find_feed_href(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find_map(|element| {
            let el = element.value();
            if !el.name().eq_ignore_ascii_case("link") {
                return None;
            }
            let is_alternate = el
                .attr("rel")
                .is_some_and(|rel| {
                    rel.split_ascii_whitespace()
                        .any(|token| token.eq_ignore_ascii_case("alternate"))
                });
            let is_feed = el
                .attr("type")
                .is_some_and(|t| FEED_LINK_TYPES.contains(&media_type(t).as_str()));
            if !(is_alternate && is_feed) {
                return None;
            }
            el.attr("href")
                .map(str::trim)
                .filter(|href| !href.is_empty())
                .map(str::to_owned)
        })
}
