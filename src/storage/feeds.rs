use chrono::Utc;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedRow, ItemRow};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Persist a feed and every item of it that has no id yet.
    ///
    /// A feed without an id is inserted, otherwise its URL and title are
    /// updated. New items are inserted under the feed. Everything happens in
    /// one transaction: if any statement fails nothing is written and `feed`
    /// is left as it was. On success the generated ids are written back.
    ///
    /// # Errors
    ///
    /// - `DatabaseError::AlreadyExists` when the feed URL or an item GUID is
    ///   already stored (GUIDs are unique across all feeds)
    /// - `DatabaseError::NotFound` when `feed.id` names a deleted feed
    pub async fn save_feed(&self, feed: &mut Feed) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let feed_id = match feed.id {
            None => sqlx::query_scalar::<_, i64>(
                "INSERT INTO feeds (url, title, created_at) VALUES (?, ?, ?) RETURNING id",
            )
            .bind(&feed.url)
            .bind(&feed.title)
            .bind(Utc::now().timestamp())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| DatabaseError::conflict(e, "feed", &feed.url))?,
            Some(id) => {
                let result = sqlx::query("UPDATE feeds SET url = ?, title = ? WHERE id = ?")
                    .bind(&feed.url)
                    .bind(&feed.title)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DatabaseError::conflict(e, "feed", &feed.url))?;
                if result.rows_affected() == 0 {
                    return Err(DatabaseError::NotFound { what: "feed", id });
                }
                id
            }
        };

        let mut new_ids = Vec::new();
        for item in feed.items.iter().filter(|item| item.id.is_none()) {
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO items (feed_id, title, link, content, guid, published, read)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(feed_id)
            .bind(&item.title)
            .bind(&item.link)
            .bind(&item.content)
            .bind(&item.guid)
            .bind(item.published.timestamp())
            .bind(item.read)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| DatabaseError::conflict(e, "item", &item.guid))?;
            new_ids.push(id);
        }

        tx.commit().await?;

        feed.id = Some(feed_id);
        let mut new_ids = new_ids.into_iter();
        for item in feed.items.iter_mut().filter(|item| item.id.is_none()) {
            item.id = new_ids.next();
            item.feed_id = Some(feed_id);
        }

        tracing::debug!(feed = %feed.url, id = feed_id, "Feed saved");
        Ok(())
    }

    /// All feeds in id order, without items.
    pub async fn all_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedRow> = sqlx::query_as("SELECT id, url, title FROM feeds ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.into_feed(Vec::new())).collect())
    }

    /// All feeds in id order, each with every stored item, newest first.
    pub async fn feeds_with_items(&self) -> Result<Vec<Feed>, DatabaseError> {
        self.feeds_loading(false).await
    }

    /// One feed with every stored item, newest first.
    pub async fn feed_by_id(&self, id: i64) -> Result<Feed, DatabaseError> {
        let row: Option<FeedRow> = sqlx::query_as("SELECT id, url, title FROM feeds WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or(DatabaseError::NotFound { what: "feed", id })?;

        let items: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, title, link, content, guid, published, read
            FROM items
            WHERE feed_id = ?
            ORDER BY published DESC, id DESC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(row.into_feed(items.into_iter().map(ItemRow::into_item).collect()))
    }

    /// Delete a feed; its items go with it.
    pub async fn delete_feed(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound { what: "feed", id });
        }
        tracing::debug!(id, "Feed deleted");
        Ok(())
    }

    /// Every feed in id order with its items (optionally only unread ones)
    /// attached, newest first. Feeds with nothing to attach keep an empty list.
    pub(crate) async fn feeds_loading(&self, unread_only: bool) -> Result<Vec<Feed>, DatabaseError> {
        let feeds: Vec<FeedRow> = sqlx::query_as("SELECT id, url, title FROM feeds ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let items: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, title, link, content, guid, published, read
            FROM items
            WHERE read = 0 OR NOT ?
            ORDER BY feed_id, published DESC, id DESC
            "#,
        )
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;

        let mut by_feed: HashMap<i64, Vec<_>> = HashMap::new();
        for row in items {
            by_feed.entry(row.feed_id).or_default().push(row.into_item());
        }

        Ok(feeds
            .into_iter()
            .map(|row| {
                let items = by_feed.remove(&row.id).unwrap_or_default();
                row.into_feed(items)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Item, IN_MEMORY};
    use chrono::{DateTime, TimeZone};

    async fn test_db() -> Database {
        Database::open(IN_MEMORY).await.unwrap()
    }

    fn item(guid: &str, published: DateTime<Utc>) -> Item {
        Item {
            id: None,
            feed_id: None,
            title: format!("Item {guid}"),
            link: format!("https://example.com/{guid}"),
            content: "body".to_string(),
            guid: guid.to_string(),
            published,
            read: false,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_save_new_feed_assigns_ids() {
        let db = test_db().await;
        let mut feed = Feed::new("https://example.com/feed.xml", "Example");
        feed.items.push(item("a", at(100)));
        feed.items.push(item("b", at(200)));

        db.save_feed(&mut feed).await.unwrap();

        let feed_id = feed.id.unwrap();
        assert!(feed.items.iter().all(|i| i.id.is_some() && i.feed_id == Some(feed_id)));

        let loaded = db.feed_by_id(feed_id).await.unwrap();
        assert_eq!(loaded.title, "Example");
        assert_eq!(loaded.items.len(), 2);
        // Newest first
        assert_eq!(loaded.items[0].guid, "b");
        assert_eq!(loaded.items[0].published, at(200));
    }

    #[tokio::test]
    async fn test_save_existing_feed_inserts_only_new_items() {
        let db = test_db().await;
        let mut feed = Feed::new("https://example.com/feed.xml", "Example");
        feed.items.push(item("a", at(100)));
        db.save_feed(&mut feed).await.unwrap();

        feed.title = "Renamed".to_string();
        feed.items.push(item("b", at(200)));
        db.save_feed(&mut feed).await.unwrap();

        let loaded = db.feed_by_id(feed.id.unwrap()).await.unwrap();
        assert_eq!(loaded.title, "Renamed");
        assert_eq!(loaded.items.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_is_already_exists() {
        let db = test_db().await;
        db.save_feed(&mut Feed::new("https://example.com/feed.xml", "One"))
            .await
            .unwrap();

        let mut again = Feed::new("https://example.com/feed.xml", "Two");
        let err = db.save_feed(&mut again).await.unwrap_err();

        assert!(matches!(err, DatabaseError::AlreadyExists { what: "feed", .. }));
        assert_eq!(again.id, None);
        assert_eq!(db.all_feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_guid_across_feeds_rolls_back_whole_save() {
        let db = test_db().await;
        let mut first = Feed::new("https://one.example/feed", "One");
        first.items.push(item("shared", at(100)));
        db.save_feed(&mut first).await.unwrap();

        let mut second = Feed::new("https://two.example/feed", "Two");
        second.items.push(item("fresh", at(100)));
        second.items.push(item("shared", at(200)));
        let err = db.save_feed(&mut second).await.unwrap_err();

        match err {
            DatabaseError::AlreadyExists { what, value } => {
                assert_eq!(what, "item");
                assert_eq!(value, "shared");
            }
            other => panic!("Expected AlreadyExists, got {:?}", other),
        }
        // Neither the feed nor its non-conflicting item were committed
        assert_eq!(db.all_feeds().await.unwrap().len(), 1);
        assert!(second.items.iter().all(|i| i.id.is_none()));
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_delete_feed_cascades_to_items() {
        let db = test_db().await;
        let mut feed = Feed::new("https://example.com/feed.xml", "Example");
        feed.items.push(item("a", at(100)));
        db.save_feed(&mut feed).await.unwrap();

        db.delete_feed(feed.id.unwrap()).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(db.all_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_feed_is_not_found() {
        let db = test_db().await;
        let err = db.delete_feed(42).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { id: 42, .. }));
    }

    #[tokio::test]
    async fn test_feeds_with_items_groups_by_feed() {
        let db = test_db().await;
        let mut one = Feed::new("https://one.example/feed", "One");
        one.items.push(item("1a", at(1)));
        one.items.push(item("1b", at(2)));
        db.save_feed(&mut one).await.unwrap();
        db.save_feed(&mut Feed::new("https://two.example/feed", "Two"))
            .await
            .unwrap();

        let feeds = db.feeds_with_items().await.unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].items.len(), 2);
        assert!(feeds[1].items.is_empty());

        let bare = db.all_feeds().await.unwrap();
        assert!(bare.iter().all(|f| f.items.is_empty()));
    }

    #[tokio::test]
    async fn test_feed_by_id_missing() {
        let db = test_db().await;
        assert!(matches!(
            db.feed_by_id(1).await,
            Err(DatabaseError::NotFound { what: "feed", id: 1 })
        ));
    }
}
