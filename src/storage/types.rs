use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A unique constraint rejected the write (duplicate feed URL or item GUID)
    #[error("{what} already exists: {value}")]
    AlreadyExists { what: &'static str, value: String },

    /// No row with this id
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },

    /// Another feeder process holds the database lock
    #[error("The database is locked by another feeder process. Please wait for it to finish and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, recognising SQLite lock contention.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5) and SQLITE_LOCKED (6)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }

    /// Like [`from_sqlx`](Self::from_sqlx), but a unique violation becomes
    /// [`DatabaseError::AlreadyExists`] naming the offending value.
    pub(crate) fn conflict(err: sqlx::Error, what: &'static str, value: &str) -> Self {
        match err.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => DatabaseError::AlreadyExists {
                what,
                value: value.to_owned(),
            },
            _ => Self::from_sqlx(err),
        }
    }

    /// True for the duplicate-URL / duplicate-GUID condition.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, DatabaseError::AlreadyExists { .. })
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub url: String,
    pub title: String,
}

impl FeedRow {
    pub(crate) fn into_feed(self, items: Vec<Item>) -> Feed {
        Feed {
            id: Some(self.id),
            url: self.url,
            title: self.title,
            items,
        }
    }
}

/// Internal row type for item queries. `published` is stored as unix seconds.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub content: String,
    pub guid: String,
    pub published: i64,
    pub read: bool,
}

impl ItemRow {
    pub(crate) fn into_item(self) -> Item {
        Item {
            id: Some(self.id),
            feed_id: Some(self.feed_id),
            title: self.title,
            link: self.link,
            content: self.content,
            guid: self.guid,
            published: DateTime::from_timestamp(self.published, 0).unwrap_or_default(),
            read: self.read,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed, identified by its URL.
///
/// `id` is `None` until the feed is first saved. `items` holds whatever the
/// query that produced this value loaded; it is not necessarily every
/// stored item.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: Option<i64>,
    pub url: String,
    pub title: String,
    pub items: Vec<Item>,
}

impl Feed {
    /// An unsaved feed with no items.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            title: title.into(),
            items: Vec::new(),
        }
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|item| !item.read).count()
    }
}

/// One syndicated entry, identified by its GUID across the whole store.
///
/// Items without an `id` are new and get inserted by the next
/// [`save_feed`](super::Database::save_feed).
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: Option<i64>,
    pub feed_id: Option<i64>,
    pub title: String,
    pub link: String,
    pub content: String,
    pub guid: String,
    pub published: DateTime<Utc>,
    pub read: bool,
}
