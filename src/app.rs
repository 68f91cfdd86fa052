use chrono::Utc;
use std::io::{self, Write};
use thiserror::Error;

use crate::feed::{parse_feed, resolve, FetchError, Fetcher, LocateError, ParseError};
use crate::storage::{Database, DatabaseError, Feed};
use crate::util::{strip_control_chars, validate_url, UrlValidationError};

// ============================================================================
// Error Types
// ============================================================================

/// A pipeline failure, tagged with the URL of the feed it happened to.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: UrlValidationError,
    },

    #[error("{url}: cannot locate feed: {source}")]
    Locate {
        url: String,
        #[source]
        source: LocateError,
    },

    #[error("{url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("{url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    #[error("{url}: {source}")]
    Storage {
        url: String,
        #[source]
        source: DatabaseError,
    },
}

impl FeedError {
    /// The feed URL this failure belongs to.
    pub fn url(&self) -> &str {
        match self {
            FeedError::InvalidUrl { url, .. }
            | FeedError::Locate { url, .. }
            | FeedError::Fetch { url, .. }
            | FeedError::Parse { url, .. }
            | FeedError::Storage { url, .. } => url,
        }
    }

    /// True when the feed host could not be reached in time.
    pub fn is_network(&self) -> bool {
        matches!(self, FeedError::Fetch { source, .. } if source.is_network())
    }

    /// True for a duplicate feed URL or item GUID.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, FeedError::Storage { source, .. } if source.is_already_exists())
    }
}

// ============================================================================
// App
// ============================================================================

/// Tunables the pipeline needs at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Candidate cap per fetch and retention count for trim.
    pub max_items: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self { max_items: 100 }
    }
}

/// Outcome of fetching one stored feed.
#[derive(Debug)]
pub struct FetchReport {
    pub feed_id: i64,
    pub url: String,
    /// Number of new items on success.
    pub result: Result<usize, FeedError>,
}

/// The aggregator: the fetcher and the store, wired together.
///
/// Feeds are processed one at a time. Every operation returns its outcome
/// to the caller; nothing is retried.
pub struct App {
    db: Database,
    fetcher: Fetcher,
    settings: Settings,
}

impl App {
    pub fn new(db: Database, fetcher: Fetcher, settings: Settings) -> Self {
        Self {
            db,
            fetcher,
            settings,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Subscribe to a feed.
    ///
    /// The URL may point at the feed itself or at a page advertising it. The
    /// feed is fetched once so its title can be recorded (the URL stands in
    /// when it has none); its entries are left for the next fetch.
    pub async fn add(&self, user_url: &str) -> Result<Feed, FeedError> {
        let url = validate_url(user_url)
            .map_err(|source| FeedError::InvalidUrl {
                url: user_url.trim().to_string(),
                source,
            })?
            .to_string();

        let feed_url = resolve(&self.fetcher, &url)
            .await
            .map_err(|source| FeedError::Locate {
                url: url.clone(),
                source,
            })?;

        let bytes = self
            .fetcher
            .fetch(&feed_url)
            .await
            .map_err(|source| FeedError::Fetch {
                url: feed_url.clone(),
                source,
            })?;
        let parsed = parse_feed(&bytes).map_err(|source| FeedError::Parse {
            url: feed_url.clone(),
            source,
        })?;

        let title = parsed.title.unwrap_or_else(|| feed_url.clone());
        let mut feed = Feed::new(feed_url, title);
        if let Err(source) = self.db.save_feed(&mut feed).await {
            return Err(FeedError::Storage {
                url: feed.url,
                source,
            });
        }

        tracing::info!(feed = %feed.url, title = %feed.title, "Feed added");
        Ok(feed)
    }

    /// Fetch `feed`, merge its new entries and save them.
    ///
    /// `feed.items` must hold the feed's stored items so known GUIDs are
    /// recognised. Returns the number of new items. On any failure nothing
    /// is written.
    pub async fn fetch_feed(&self, feed: &mut Feed) -> Result<usize, FeedError> {
        let bytes = self
            .fetcher
            .fetch(&feed.url)
            .await
            .map_err(|source| FeedError::Fetch {
                url: feed.url.clone(),
                source,
            })?;
        let parsed = parse_feed(&bytes).map_err(|source| FeedError::Parse {
            url: feed.url.clone(),
            source,
        })?;

        let added = feed.merge_entries(parsed.entries, self.settings.max_items as usize, Utc::now());
        if added > 0 {
            if let Err(source) = self.db.save_feed(feed).await {
                return Err(FeedError::Storage {
                    url: feed.url.clone(),
                    source,
                });
            }
        }

        tracing::info!(feed = %feed.url, new_items = added, "Feed fetched");
        Ok(added)
    }

    /// Fetch every stored feed in turn. A failing feed is logged and
    /// reported; the others are still fetched.
    pub async fn fetch_all(&self) -> Result<Vec<FetchReport>, DatabaseError> {
        let feeds = self.db.feeds_with_items().await?;
        let mut reports = Vec::with_capacity(feeds.len());

        for mut feed in feeds {
            let result = self.fetch_feed(&mut feed).await;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "Feed fetch failed");
            }
            reports.push(FetchReport {
                feed_id: feed.id.unwrap_or_default(),
                url: feed.url,
                result,
            });
        }

        Ok(reports)
    }

    pub async fn list(&self) -> Result<Vec<Feed>, DatabaseError> {
        self.db.all_feeds().await
    }

    pub async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        self.db.delete_feed(id).await
    }

    pub async fn unread(&self) -> Result<Vec<Feed>, DatabaseError> {
        self.db.unread_items().await
    }

    pub async fn mark_all_read(&self) -> Result<u64, DatabaseError> {
        self.db.mark_all_read().await
    }

    /// Apply the retention count to every feed, then compact the database.
    /// A feed that fails to trim is logged and skipped. Returns how many
    /// items were deleted.
    ///
    /// Trimmed GUIDs are forgotten: an entry the feed still lists is stored
    /// again, unread, by the next fetch.
    pub async fn trim(&self) -> Result<u64, DatabaseError> {
        let mut deleted = 0;
        for feed in self.db.all_feeds().await? {
            let Some(id) = feed.id else { continue };
            match self.db.trim_feed_items(id, self.settings.max_items).await {
                Ok(n) => deleted += n,
                Err(e) => tracing::warn!(feed = %feed.url, error = %e, "Trim failed"),
            }
        }
        self.db.vacuum().await?;
        Ok(deleted)
    }

    /// Feed URLs in id order.
    pub async fn export(&self) -> Result<Vec<String>, DatabaseError> {
        Ok(self.db.all_feeds().await?.into_iter().map(|f| f.url).collect())
    }

    /// Add every URL in `list` (one per line, blank lines ignored). Stops at
    /// the first URL that cannot be added; feeds added before it stay.
    pub async fn import(&self, list: &str) -> Result<Vec<Feed>, FeedError> {
        let mut added = Vec::new();
        for url in list.lines().map(str::trim).filter(|l| !l.is_empty()) {
            added.push(self.add(url).await?);
        }
        Ok(added)
    }

    pub async fn close(self) {
        self.db.close().await;
    }
}

// ============================================================================
// Output
// ============================================================================

/// Write feeds as `id: title (url)` lines.
pub fn write_feed_list(feeds: &[Feed], out: &mut impl Write) -> io::Result<()> {
    for feed in feeds {
        writeln!(
            out,
            "{}: {} ({})",
            feed.id.unwrap_or_default(),
            strip_control_chars(&feed.title),
            strip_control_chars(&feed.url)
        )?;
    }
    Ok(())
}

/// Write unread items grouped under their feed, skipping feeds with none.
pub fn write_unread(feeds: &[Feed], out: &mut impl Write) -> io::Result<()> {
    let mut first = true;
    for feed in feeds.iter().filter(|f| f.unread_count() > 0) {
        if !first {
            writeln!(out)?;
        }
        first = false;

        writeln!(out, "{}", strip_control_chars(&feed.title))?;
        for item in feed.items.iter().filter(|i| !i.read) {
            writeln!(
                out,
                "  {}  {}",
                item.published.format("%Y-%m-%d"),
                strip_control_chars(&item.title)
            )?;
            if !item.link.is_empty() {
                writeln!(out, "      {}", strip_control_chars(&item.link))?;
            }
        }
    }
    Ok(())
}
