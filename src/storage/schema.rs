use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

/// Path that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Every statement the schema consists of, applied in order.
///
/// Identity rules live here and nowhere else: a feed URL appears once, an item
/// GUID appears once in the whole store, and deleting a feed deletes its items.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS feeds (
        id INTEGER PRIMARY KEY,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        link TEXT NOT NULL,
        content TEXT NOT NULL,
        guid TEXT NOT NULL UNIQUE,
        published INTEGER NOT NULL,
        read INTEGER NOT NULL DEFAULT 0
    )
    "#,
    // Unread listing and retention trim both walk a feed's items newest first
    "CREATE INDEX IF NOT EXISTS idx_items_feed_published ON items(feed_id, published DESC)",
    "CREATE INDEX IF NOT EXISTS idx_items_read ON items(read)",
];

// ============================================================================
// Database
// ============================================================================

/// Handle to the SQLite store. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// Pass [`IN_MEMORY`] for a throwaway database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Locked` if another feeder process holds the
    /// database, `DatabaseError::Migration` if the schema cannot be applied,
    /// and `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let in_memory = path == IN_MEMORY;

        #[cfg(unix)]
        if !in_memory {
            restrict_permissions(std::path::Path::new(path));
        }

        // Foreign keys are a per-connection setting, so they go on the
        // options every pooled connection is opened with.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database lives and dies with its connection.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::Other(e) => DatabaseError::Migration(e.to_string()),
            other => other,
        })?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Apply [`SCHEMA`] inside one transaction.
    ///
    /// Every statement is `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op. A failure rolls the whole migration back.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await
    }

    /// Reclaim space left behind by deletes.
    pub async fn vacuum(&self) -> Result<(), DatabaseError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection. Further queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Keep the database readable by its owner only: pre-create a missing file
/// with mode 0600, or tighten an existing one.
#[cfg(unix)]
fn restrict_permissions(db_path: &std::path::Path) {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    if db_path.exists() {
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(db_path, perms) {
            tracing::warn!(path = %db_path.display(), error = %e, "Failed to set database file permissions");
        }
    } else if db_path.parent().is_some_and(|p| p.as_os_str().is_empty() || p.exists()) {
        // If creation fails, SQLite reports the error at connect time.
        let _ = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(db_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_creates_schema() {
        let db = Database::open(IN_MEMORY).await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(names, ["feeds", "items"]);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let db = Database::open(IN_MEMORY).await.unwrap();
        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);

        let orphan = sqlx::query(
            "INSERT INTO items (feed_id, title, link, content, guid, published) VALUES (99, '', '', '', 'g', 0)",
        )
        .execute(&db.pool)
        .await;
        assert!(orphan.is_err());
    }

    #[tokio::test]
    async fn test_reopen_file_database_is_idempotent() {
        let dir = std::env::temp_dir().join(format!("feeder-schema-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("reopen.db");
        let path = path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        sqlx::query("INSERT INTO feeds (url, title, created_at) VALUES ('u', 't', 0)")
            .execute(&db.pool)
            .await
            .unwrap();
        db.close().await;

        let db = Database::open(path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
        db.close().await;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        std::fs::remove_dir_all(&dir).ok();
    }
}
