//! Source merging and durable filtering.

use mintwatch_core::{
    error::MintError,
    mention::{Mention, SourceTag},
};
use mintwatch_memory::Store;
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use tracing::debug;

/// Which of two copies of the same post is kept: more attachments first,
/// then the notifications copy, then the remaining fields so the choice
/// never depends on input order.
fn preference(a: &Mention, b: &Mention) -> Ordering {
    a.images
        .len()
        .cmp(&b.images.len())
        .then_with(|| {
            (a.source == SourceTag::Notifications).cmp(&(b.source == SourceTag::Notifications))
        })
        .then_with(|| a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.author.cmp(&b.author))
        .then_with(|| a.images.cmp(&b.images))
        .then_with(|| a.permalink.cmp(&b.permalink))
}

/// One mention per id, newest first, ties broken by id descending.
///
/// Pure: the result depends only on the input multiset, and
/// `merge(merge(x)) == merge(x)`.
pub fn merge(mentions: Vec<Mention>) -> Vec<Mention> {
    let mut by_id: HashMap<String, Mention> = HashMap::with_capacity(mentions.len());
    for mention in mentions {
        match by_id.get(&mention.id) {
            Some(kept) if preference(kept, &mention) != Ordering::Less => {}
            _ => {
                by_id.insert(mention.id.clone(), mention);
            }
        }
    }
    let mut merged: Vec<Mention> = by_id.into_values().collect();
    merged.sort_by_key(|m| Reverse((m.timestamp, m.id.clone())));
    merged
}

/// Filters merged mentions against the store.
pub struct Deduplicator {
    store: Store,
}

impl Deduplicator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Drop mentions already processed or already claimed.
    pub async fn filter_new(&self, mentions: Vec<Mention>) -> Result<Vec<Mention>, MintError> {
        let mut fresh = Vec::with_capacity(mentions.len());
        for mention in mentions {
            if self.store.is_processed(&mention.id).await? {
                debug!("dedup: {} already processed", mention.id);
                continue;
            }
            if self.store.is_claimed(&mention.id).await? {
                debug!("dedup: {} already claimed", mention.id);
                continue;
            }
            fresh.push(mention);
        }
        Ok(fresh)
    }

    /// `merge` followed by `filter_new`.
    pub async fn dedup(&self, mentions: Vec<Mention>) -> Result<Vec<Mention>, MintError> {
        let raw = mentions.len();
        let fresh = self.filter_new(merge(mentions)).await?;
        debug!("dedup: {raw} scanned, {} new", fresh.len());
        Ok(fresh)
    }
}
