use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link, Text};
use feed_rs::parser;
use thiserror::Error;

use crate::util::{single_line, strip_control_chars};

/// Feed content could not be read as RSS, Atom or JSON Feed.
#[derive(Debug, Error)]
#[error("unreadable feed: {0}")]
pub struct ParseError(#[from] parser::ParseFeedError);

/// A parsed feed document.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    /// Channel title, if the feed declares a non-empty one
    pub title: Option<String>,
    /// Entries in document order
    pub entries: Vec<ParsedEntry>,
}

/// One entry as the feed declares it, before any fallback is applied.
///
/// Empty strings mean "not present in the source".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub guid: String,
    pub published: Option<DateTime<Utc>>,
}

/// Parse raw feed bytes.
///
/// Entries without a declared id get their first link as id (or nothing),
/// never a synthesized hash, so identity stays derivable from the source.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let feed = parser::Builder::new()
        .id_generator(link_as_id)
        .build()
        .parse(bytes)?;

    let title = feed
        .title
        .map(|t| single_line(&strip_control_chars(&t.content)))
        .filter(|t| !t.is_empty());

    let entries = feed.entries.into_iter().map(into_entry).collect();

    Ok(ParsedFeed { title, entries })
}

fn link_as_id(links: &[Link], _title: &Option<Text>, _uri: Option<&str>) -> String {
    links.first().map(|l| l.href.clone()).unwrap_or_default()
}

fn into_entry(entry: Entry) -> ParsedEntry {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_owned())
        .unwrap_or_default();

    let title = entry
        .title
        .map(|t| single_line(&strip_control_chars(&t.content)))
        .unwrap_or_default();

    ParsedEntry {
        title,
        link,
        description: entry.summary.map(|s| s.content).unwrap_or_default(),
        content: entry.content.and_then(|c| c.body).unwrap_or_default(),
        guid: entry.id.trim().to_owned(),
        published: entry.published.or(entry.updated),
    }
}
