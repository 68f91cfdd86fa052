use super::schema::Database;
use super::types::{DatabaseError, Feed};

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Every feed in id order with only its unread items, newest first.
    pub async fn unread_items(&self) -> Result<Vec<Feed>, DatabaseError> {
        self.feeds_loading(true).await
    }

    /// Flip every unread item to read. Returns how many changed.
    pub async fn mark_all_read(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("UPDATE items SET read = 1 WHERE read = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Keep the `max` most recently published items of a feed and delete the
    /// rest. Ties on `published` keep the newer row. Returns how many were
    /// deleted; a feed with `max` items or fewer is left alone. A `max` of
    /// zero means unlimited and deletes nothing. Deleted GUIDs are not
    /// remembered.
    pub async fn trim_feed_items(&self, feed_id: i64, max: u32) -> Result<u64, DatabaseError> {
        if max == 0 {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM items
            WHERE feed_id = ?
              AND id NOT IN (
                  SELECT id FROM items
                  WHERE feed_id = ?
                  ORDER BY published DESC, id DESC
                  LIMIT ?
              )
            "#,
        )
        .bind(feed_id)
        .bind(feed_id)
        .bind(max)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::debug!(feed_id, deleted, "Trimmed feed history");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed, Item, IN_MEMORY};
    use chrono::{DateTime, TimeZone, Utc};

    async fn test_db() -> Database {
        Database::open(IN_MEMORY).await.unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn item(guid: String, published: DateTime<Utc>) -> Item {
        Item {
            id: None,
            feed_id: None,
            title: guid.clone(),
            link: format!("https://example.com/{guid}"),
            content: String::new(),
            guid,
            published,
            read: false,
        }
    }

    /// Save a feed with `n` items published at 1..=n seconds, inserted in
    /// scrambled order so trim cannot rely on insertion order.
    async fn feed_with_items(db: &Database, name: &str, n: i64) -> Feed {
        let mut feed = Feed::new(format!("https://{name}.example/feed"), name);
        for i in 0..n {
            let published = 1 + (i * 37) % n;
            feed.items.push(item(format!("{name}-{published}"), at(published)));
        }
        db.save_feed(&mut feed).await.unwrap();
        feed
    }

    #[tokio::test]
    async fn test_trim_keeps_most_recent() {
        let db = test_db().await;
        let feed = feed_with_items(&db, "big", 120).await;
        let feed_id = feed.id.unwrap();

        let deleted = db.trim_feed_items(feed_id, 100).await.unwrap();
        assert_eq!(deleted, 20);

        let kept = db.feed_by_id(feed_id).await.unwrap().items;
        assert_eq!(kept.len(), 100);
        let oldest_kept = kept.iter().map(|i| i.published).min().unwrap();
        assert_eq!(oldest_kept, at(21));
    }

    #[tokio::test]
    async fn test_trim_small_feed_is_noop() {
        let db = test_db().await;
        let feed = feed_with_items(&db, "small", 50).await;

        let deleted = db.trim_feed_items(feed.id.unwrap(), 100).await.unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(db.feed_by_id(feed.id.unwrap()).await.unwrap().items.len(), 50);
    }

    #[tokio::test]
    async fn test_trim_zero_is_unlimited() {
        let db = test_db().await;
        let feed = feed_with_items(&db, "unbounded", 20).await;

        let deleted = db.trim_feed_items(feed.id.unwrap(), 0).await.unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(db.feed_by_id(feed.id.unwrap()).await.unwrap().items.len(), 20);
    }

    #[tokio::test]
    async fn test_trim_only_touches_one_feed() {
        let db = test_db().await;
        let a = feed_with_items(&db, "a", 10).await;
        let b = feed_with_items(&db, "b", 10).await;

        db.trim_feed_items(a.id.unwrap(), 3).await.unwrap();

        assert_eq!(db.feed_by_id(a.id.unwrap()).await.unwrap().items.len(), 3);
        assert_eq!(db.feed_by_id(b.id.unwrap()).await.unwrap().items.len(), 10);
    }

    #[tokio::test]
    async fn test_unread_items_newest_first() {
        let db = test_db().await;
        let feed = feed_with_items(&db, "f", 5).await;

        let unread = db.unread_items().await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, feed.id);
        let published: Vec<_> = unread[0].items.iter().map(|i| i.published.timestamp()).collect();
        assert_eq!(published, [5, 4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_mark_all_read_clears_unread() {
        let db = test_db().await;
        feed_with_items(&db, "a", 3).await;
        feed_with_items(&db, "b", 2).await;

        assert_eq!(db.mark_all_read().await.unwrap(), 5);
        assert_eq!(db.mark_all_read().await.unwrap(), 0);

        let unread = db.unread_items().await.unwrap();
        assert_eq!(unread.len(), 2);
        assert!(unread.iter().all(|f| f.items.is_empty()));

        // Read state survives a reload
        let all = db.feeds_with_items().await.unwrap();
        assert!(all.iter().flat_map(|f| &f.items).all(|i| i.read));
    }

    #[tokio::test]
    async fn test_new_item_after_mark_is_only_unread() {
        let db = test_db().await;
        let mut feed = feed_with_items(&db, "f", 3).await;
        db.mark_all_read().await.unwrap();

        feed.items.push(item("f-new".to_string(), at(10)));
        db.save_feed(&mut feed).await.unwrap();

        let unread = db.unread_items().await.unwrap();
        assert_eq!(unread[0].items.len(), 1);
        assert_eq!(unread[0].items[0].guid, "f-new");
    }
}
