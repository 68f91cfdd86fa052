use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::parser::ParsedEntry;
use crate::storage::{Feed, Item};

/// Merge freshly parsed entries into the items a feed already knows.
///
/// Each entry's identity is its GUID, or its link when the GUID is blank. An
/// entry whose identity is already among `items` (or was added earlier in the
/// same call) is skipped; every other entry is appended as a new unread item.
/// Content falls back to the description, and a missing publish date
/// becomes `now`.
///
/// When there are more than `max_items` entries, they are stably sorted by
/// publish date (undated entries first) and only the trailing `max_items`
/// are considered. A `max_items` of zero disables the cap.
///
/// Returns the number of items appended. Merging the same entries twice
/// appends nothing the second time.
pub fn merge(
    items: &mut Vec<Item>,
    entries: Vec<ParsedEntry>,
    max_items: usize,
    now: DateTime<Utc>,
) -> usize {
    let mut known: HashSet<String> = items.iter().map(|item| item.guid.clone()).collect();
    let before = items.len();

    for entry in candidates(entries, max_items) {
        let guid = if entry.guid.is_empty() {
            entry.link.clone()
        } else {
            entry.guid
        };
        if guid.is_empty() {
            tracing::debug!(title = %entry.title, "Skipping entry with neither guid nor link");
            continue;
        }
        if !known.insert(guid.clone()) {
            continue;
        }

        let content = if entry.content.trim().is_empty() {
            entry.description
        } else {
            entry.content
        };

        items.push(Item {
            id: None,
            feed_id: None,
            title: entry.title,
            link: entry.link,
            content,
            guid,
            published: entry.published.unwrap_or(now),
            read: false,
        });
    }

    items.len() - before
}

/// Apply the per-fetch candidate cap.
fn candidates(mut entries: Vec<ParsedEntry>, max_items: usize) -> Vec<ParsedEntry> {
    if max_items == 0 || entries.len() <= max_items {
        return entries;
    }
    // `Option` orders `None` before `Some`, so undated entries count as oldest.
    entries.sort_by_key(|entry| entry.published);
    entries.split_off(entries.len() - max_items)
}

impl Feed {
    /// [`merge`] `entries` into this feed's items, tagging new ones with the
    /// feed's id.
    pub fn merge_entries(
        &mut self,
        entries: Vec<ParsedEntry>,
        max_items: usize,
        now: DateTime<Utc>,
    ) -> usize {
        let start = self.items.len();
        let added = merge(&mut self.items, entries, max_items, now);
        for item in &mut self.items[start..] {
            item.feed_id = self.id;
        }
        added
    }
}
