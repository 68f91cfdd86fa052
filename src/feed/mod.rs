//! Feed ingestion pipeline.
//!
//! A user-supplied URL flows through these stages, one feed at a time:
//!
//! - [`locator`] - HEAD probe deciding whether a URL is a feed or a page
//! - [`discovery`] - scans an HTML page for its `<link rel="alternate">` feed
//! - [`fetcher`] - bounded HTTP GET with feed `Accept` headers
//! - [`parser`] - RSS/Atom/JSON parsing via the `feed-rs` crate
//! - [`reconcile`] - merges parsed entries into known items without duplicates
//!
//! # Example
//!
//! ```ignore
//! let fetcher = Fetcher::new(DEFAULT_TIMEOUT)?;
//! let feed_url = resolve(&fetcher, "https://example.com/blog/").await?;
//! let parsed = parse_feed(&fetcher.fetch(&feed_url).await?)?;
//! feed.merge_entries(parsed.entries, 100, Utc::now());
//! ```

pub mod discovery;
pub mod fetcher;
pub mod locator;
pub mod parser;
pub mod reconcile;

pub use discovery::{discover, DiscoveryError};
pub use fetcher::{FetchError, Fetcher, Probe, DEFAULT_TIMEOUT, USER_AGENT};
pub use locator::{resolve, LocateError};
pub use parser::{parse_feed, ParseError, ParsedEntry, ParsedFeed};
pub use reconcile::merge;
