//! In-memory content cache
//!
//! [`MemoryContentCache`] keeps collection records and their items, indexed
//! by parent and position, and publishes a [`ChangeEvent`] for every write.
//! It is shared (`Arc`) between any number of watchers and loaders.

use crate::error::{StoreError, StoreResult};
use crate::store::{ChangeSubscription, ContentStore};
use crate::types::{
    ChangeEvent, ChangeKind, CollectionId, CollectionRecord, ContentItem, ItemId, WindowQuery,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;

/// Default per-collection change channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Known collections
    pub collection_count: usize,
    /// Cached items across all collections
    pub item_count: usize,
    /// Live change subscriptions across all collections
    pub listener_count: usize,
}

#[derive(Debug, Default)]
struct CacheEntries {
    collections: HashMap<CollectionId, CollectionRecord>,
    items: HashMap<ItemId, ContentItem>,
    /// parent -> element_index -> item
    by_parent: HashMap<CollectionId, BTreeMap<u32, ItemId>>,
}

impl CacheEntries {
    /// Drop an item and its position entry
    fn detach(&mut self, id: ItemId) -> Option<ContentItem> {
        let item = self.items.remove(&id)?;
        if let Some(positions) = self.by_parent.get_mut(&item.parent_id) {
            if positions.get(&item.element_index) == Some(&id) {
                positions.remove(&item.element_index);
            }
        }
        Some(item)
    }
}

/// Shared, in-memory collection content cache
///
/// Writes are applied under a single lock; change events are published after
/// the lock is released, so a subscriber reacting to an event always reads
/// the written state.
#[derive(Debug)]
pub struct MemoryContentCache {
    entries: RwLock<CacheEntries>,
    channels: DashMap<CollectionId, broadcast::Sender<ChangeEvent>>,
    channel_capacity: usize,
}

impl MemoryContentCache {
    /// Create empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create cache with a specific change channel capacity
    #[inline]
    #[must_use]
    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            entries: RwLock::new(CacheEntries::default()),
            channels: DashMap::new(),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Insert or replace a collection record
    ///
    /// Returns `true` if the collection was not known before.
    pub fn put_collection(&self, record: CollectionRecord) -> bool {
        let id = record.id;
        let is_new = self.entries.write().collections.insert(id, record).is_none();
        self.publish(vec![ChangeEvent::collection(id)]);
        is_new
    }

    /// Insert an item or replace it with a fresher copy
    ///
    /// An item claiming an occupied position displaces the previous occupant.
    ///
    /// # Errors
    /// - `StoreError::OrphanItem` if the parent collection is unknown
    pub fn upsert(&self, item: ContentItem) -> StoreResult<ChangeKind> {
        let (kind, events) = {
            let mut entries = self.entries.write();
            Self::apply_upsert(&mut entries, item)?
        };
        self.publish(events);
        Ok(kind)
    }

    /// Upsert a batch of items, publishing once the whole batch is visible
    ///
    /// # Errors
    /// - `StoreError::OrphanItem` for the first item with an unknown parent;
    ///   items before it stay written
    pub fn upsert_many(&self, items: impl IntoIterator<Item = ContentItem>) -> StoreResult<usize> {
        let mut events = Vec::new();
        let mut outcome = Ok(0);
        {
            let mut entries = self.entries.write();
            for item in items {
                match Self::apply_upsert(&mut entries, item) {
                    Ok((_, mut item_events)) => {
                        events.append(&mut item_events);
                        outcome = outcome.map(|written| written + 1);
                    }
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
        }
        self.publish(events);
        outcome
    }

    /// Mutate a cached item in place
    ///
    /// The item's identity is kept; `update_time` is bumped.
    ///
    /// # Errors
    /// - `StoreError::UnknownItem` if the item is not cached
    pub fn update_item<F>(&self, id: ItemId, f: F) -> StoreResult<ContentItem>
    where
        F: FnOnce(&mut ContentItem),
    {
        let (updated, events) = {
            let mut entries = self.entries.write();
            let mut item = entries
                .items
                .get(&id)
                .cloned()
                .ok_or(StoreError::UnknownItem(id))?;
            f(&mut item);
            item.id = id;
            item.update_time = Utc::now();
            let updated = item.clone();
            let (_, events) = Self::apply_upsert(&mut entries, item)?;
            (updated, events)
        };
        self.publish(events);
        Ok(updated)
    }

    /// Drop an item from the cache
    ///
    /// # Errors
    /// - `StoreError::UnknownItem` if the item is not cached
    pub fn remove_item(&self, id: ItemId) -> StoreResult<ContentItem> {
        let removed = self
            .entries
            .write()
            .detach(id)
            .ok_or(StoreError::UnknownItem(id))?;
        self.publish(vec![ChangeEvent::item(&removed, ChangeKind::Removed)]);
        Ok(removed)
    }

    /// Drop every cached item of a collection, keeping its record
    ///
    /// Returns the number of items dropped.
    pub fn clear_collection(&self, id: CollectionId) -> usize {
        let dropped = {
            let mut entries = self.entries.write();
            let positions = entries.by_parent.remove(&id).unwrap_or_default();
            for item_id in positions.values() {
                entries.items.remove(item_id);
            }
            positions.len()
        };
        self.publish(vec![ChangeEvent::collection(id)]);
        dropped
    }

    /// Forget a collection entirely
    ///
    /// Live subscribers receive a final collection event, then their
    /// subscription closes.
    pub fn remove_collection(&self, id: CollectionId) -> Option<CollectionRecord> {
        let record = {
            let mut entries = self.entries.write();
            let record = entries.collections.remove(&id);
            if let Some(positions) = entries.by_parent.remove(&id) {
                for item_id in positions.values() {
                    entries.items.remove(item_id);
                }
            }
            record
        };
        self.publish(vec![ChangeEvent::collection(id)]);
        self.channels.remove(&id);
        record
    }

    /// Get a cached item
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<ContentItem> {
        self.entries.read().items.get(&id).cloned()
    }

    /// Get the item at a position
    #[must_use]
    pub fn item_at(&self, collection: CollectionId, index: u32) -> Option<ContentItem> {
        let entries = self.entries.read();
        let id = entries.by_parent.get(&collection)?.get(&index)?;
        entries.items.get(id).cloned()
    }

    /// Number of items cached for a collection
    #[must_use]
    pub fn cached_len(&self, collection: CollectionId) -> usize {
        self.entries
            .read()
            .by_parent
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    /// Number of live subscriptions for a collection
    #[must_use]
    pub fn listener_count(&self, collection: CollectionId) -> usize {
        self.channels
            .get(&collection)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        CacheStats {
            collection_count: entries.collections.len(),
            item_count: entries.items.len(),
            listener_count: self.channels.iter().map(|tx| tx.receiver_count()).sum(),
        }
    }

    fn apply_upsert(
        entries: &mut CacheEntries,
        item: ContentItem,
    ) -> StoreResult<(ChangeKind, Vec<ChangeEvent>)> {
        if !entries.collections.contains_key(&item.parent_id) {
            return Err(StoreError::OrphanItem {
                item: item.id,
                collection: item.parent_id,
            });
        }

        let mut events = Vec::new();
        let mut kind = ChangeKind::Inserted;

        let same_position = entries.items.get(&item.id).map(|previous| {
            previous.parent_id == item.parent_id && previous.element_index == item.element_index
        });
        match same_position {
            Some(true) => kind = ChangeKind::Updated,
            Some(false) => {
                if let Some(moved) = entries.detach(item.id) {
                    events.push(ChangeEvent::item(&moved, ChangeKind::Removed));
                }
            }
            None => {}
        }

        let positions = entries.by_parent.entry(item.parent_id).or_default();
        let displaced = positions
            .insert(item.element_index, item.id)
            .filter(|occupant| *occupant != item.id);
        if let Some(occupant) = displaced.and_then(|id| entries.items.remove(&id)) {
            tracing::debug!(
                collection = %item.parent_id,
                element_index = item.element_index,
                displaced = %occupant.id,
                "position claimed by a different item"
            );
            events.push(ChangeEvent::item(&occupant, ChangeKind::Removed));
        }

        events.push(ChangeEvent::item(&item, kind));
        entries.items.insert(item.id, item);
        Ok((kind, events))
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            if let Some(tx) = self.channels.get(&event.collection_id) {
                // No receivers is fine: nobody is watching this collection.
                let _ = tx.send(event);
            }
        }
    }
}

impl Default for MemoryContentCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryContentCache {
    async fn collection(&self, id: CollectionId) -> StoreResult<CollectionRecord> {
        self.entries
            .read()
            .collections
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownCollection(id))
    }

    async fn resolve_key(&self, id: CollectionId, index: u32) -> StoreResult<Option<ItemId>> {
        let entries = self.entries.read();
        if !entries.collections.contains_key(&id) {
            return Err(StoreError::UnknownCollection(id));
        }
        Ok(entries
            .by_parent
            .get(&id)
            .and_then(|positions| positions.get(&index).copied()))
    }

    async fn query_window(&self, query: WindowQuery) -> StoreResult<Vec<ContentItem>> {
        let entries = self.entries.read();
        if !entries.collections.contains_key(&query.collection_id) {
            return Err(StoreError::UnknownCollection(query.collection_id));
        }
        let (Some(positions), Some(last)) = (
            entries.by_parent.get(&query.collection_id),
            query.last_index(),
        ) else {
            return Ok(Vec::new());
        };
        Ok(positions
            .range(query.start_index..=last)
            .filter_map(|(_, id)| entries.items.get(id).cloned())
            .collect())
    }

    fn subscribe(&self, id: CollectionId) -> StoreResult<ChangeSubscription> {
        if !self.entries.read().collections.contains_key(&id) {
            return Err(StoreError::UnknownCollection(id));
        }
        let rx = self
            .channels
            .entry(id)
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe();
        Ok(ChangeSubscription::new(id, rx))
    }
}
