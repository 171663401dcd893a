//! Testing utilities for GXC workspace
//!
//! Shared fixtures, a fault-injecting store and an in-memory remote.

#![allow(missing_docs)]

use async_trait::async_trait;
use gxc_cache::{
    ChangeSubscription, CollectionId, CollectionRecord, ContentItem, ContentLoader, ContentStore,
    ItemId, LoadError, MemoryContentCache, StoreError, StoreResult, WindowQuery,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn element(parent: CollectionId, index: u32) -> ContentItem {
    ContentItem::new(parent, index, format!("element_{index}"))
}

pub fn elements(parent: CollectionId, indices: impl IntoIterator<Item = u32>) -> Vec<ContentItem> {
    indices.into_iter().map(|i| element(parent, i)).collect()
}

/// Register a collection of `n` elements and cache all of them
pub fn seed_collection(cache: &MemoryContentCache, n: u32) -> CollectionId {
    let record = CollectionRecord::new("test collection", n);
    let id = record.id;
    cache.put_collection(record);
    cache.upsert_many(elements(id, 0..n)).unwrap();
    id
}

pub fn seeded_cache(n: u32) -> (Arc<MemoryContentCache>, CollectionId) {
    let cache = Arc::new(MemoryContentCache::new());
    let id = seed_collection(&cache, n);
    (cache, id)
}

/// Store wrapper that can fail or stall window reads on demand
#[derive(Debug)]
pub struct FlakyStore {
    inner: Arc<MemoryContentCache>,
    failures: AtomicUsize,
    stalled: AtomicBool,
    reads: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryContentCache>) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` window reads with `StoreError::ReadFailed`
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Make window reads hang until unstalled
    pub fn stall_reads(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Window reads attempted so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &Arc<MemoryContentCache> {
        &self.inner
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn collection(&self, id: CollectionId) -> StoreResult<CollectionRecord> {
        self.inner.collection(id).await
    }

    async fn resolve_key(&self, id: CollectionId, index: u32) -> StoreResult<Option<ItemId>> {
        self.inner.resolve_key(id, index).await
    }

    async fn query_window(&self, query: WindowQuery) -> StoreResult<Vec<ContentItem>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::ReadFailed("injected failure".into()));
        }
        self.inner.query_window(query).await
    }

    fn subscribe(&self, id: CollectionId) -> StoreResult<ChangeSubscription> {
        self.inner.subscribe(id)
    }
}

/// Remote holding a fixed set of collections
#[derive(Debug, Default)]
pub struct StaticLoader {
    collections: Vec<(CollectionRecord, Vec<ContentItem>)>,
    fetches: AtomicUsize,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection of `n` elements, returning its id
    pub fn with_collection(mut self, name: &str, n: u32) -> (Self, CollectionId) {
        let record = CollectionRecord::new(name, n);
        let id = record.id;
        self.collections.push((record, elements(id, 0..n)));
        (self, id)
    }

    /// Window fetches served so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn find(&self, id: CollectionId) -> Option<&(CollectionRecord, Vec<ContentItem>)> {
        self.collections.iter().find(|(record, _)| record.id == id)
    }
}

#[async_trait]
impl ContentLoader for StaticLoader {
    async fn fetch_collection(&self, id: CollectionId) -> Result<CollectionRecord, LoadError> {
        self.find(id)
            .map(|(record, _)| record.clone())
            .ok_or_else(|| LoadError::fetch(id, 0, 0, "no such collection"))
    }

    async fn fetch_window(&self, query: WindowQuery) -> Result<Vec<ContentItem>, LoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (_, items) = self.find(query.collection_id).ok_or_else(|| {
            LoadError::fetch(query.collection_id, query.start_index, query.count, "no such collection")
        })?;
        Ok(items
            .iter()
            .filter(|item| query.contains(item.element_index))
            .cloned()
            .collect())
    }
}
