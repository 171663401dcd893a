//! Remote loads into the cache
//!
//! A [`ContentLoader`] knows how to fetch collection records and windows of
//! contents from the server. [`WindowLoader`] drives one against a
//! [`MemoryContentCache`], remembering recently fetched windows so repeated
//! scrolling over the same region does not re-request it.
//!
//! Watchers never call the loader; its writes reach them through the
//! cache's change notifications like any other write.

use crate::error::LoadError;
use crate::memory::MemoryContentCache;
use crate::types::{CollectionId, CollectionRecord, ContentItem, WindowQuery};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Remote source of collection contents
#[async_trait]
pub trait ContentLoader: Send + Sync + 'static {
    /// Fetch a collection record
    async fn fetch_collection(&self, id: CollectionId) -> Result<CollectionRecord, LoadError>;

    /// Fetch up to `query.count` items starting at `query.start_index`
    async fn fetch_window(&self, query: WindowQuery) -> Result<Vec<ContentItem>, LoadError>;
}

/// Window loader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// How long a fetched window counts as fresh, in milliseconds (0 disables)
    pub freshness_ms: u64,
    /// Maximum number of windows remembered
    pub max_tracked_windows: u64,
}

impl LoaderConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With freshness interval
    #[inline]
    #[must_use]
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness_ms = u64::try_from(freshness.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Freshness interval as a duration
    #[inline]
    #[must_use]
    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            freshness_ms: 10_000,
            max_tracked_windows: 1_000,
        }
    }
}

/// What a load did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fetched and cached this many items
    Fetched(usize),
    /// Window was fetched recently; nothing requested
    Fresh,
}

/// Fills a [`MemoryContentCache`] from a [`ContentLoader`]
#[derive(Debug)]
pub struct WindowLoader<L> {
    loader: Arc<L>,
    cache: Arc<MemoryContentCache>,
    /// Recently fetched windows -> item count
    recent: Option<Cache<WindowQuery, usize>>,
}

impl<L: ContentLoader> WindowLoader<L> {
    /// Create loader writing into `cache`
    #[must_use]
    pub fn new(loader: Arc<L>, cache: Arc<MemoryContentCache>, config: LoaderConfig) -> Self {
        let recent = (config.freshness_ms > 0).then(|| {
            Cache::builder()
                .max_capacity(config.max_tracked_windows)
                .time_to_live(config.freshness())
                .build()
        });
        Self {
            loader,
            cache,
            recent,
        }
    }

    /// Fetch and cache a collection record
    ///
    /// # Errors
    /// Propagates the remote fetch error.
    pub async fn load_collection(&self, id: CollectionId) -> Result<CollectionRecord, LoadError> {
        let record = self.loader.fetch_collection(id).await?;
        tracing::debug!(collection = %id, elements = record.element_count, "collection loaded");
        self.cache.put_collection(record.clone());
        Ok(record)
    }

    /// Fetch and cache a window, unless it was fetched recently
    ///
    /// Concurrent loads of the same window share one fetch.
    ///
    /// # Errors
    /// - `LoadError::Fetch` if the remote request fails
    /// - `LoadError::WrongParent` if the remote returns foreign items
    /// - `LoadError::Store` if the collection is unknown to the cache
    pub async fn load_window(&self, query: WindowQuery) -> Result<LoadOutcome, LoadError> {
        let Some(recent) = &self.recent else {
            return self.fetch_into_cache(query).await.map(LoadOutcome::Fetched);
        };

        let entry = recent
            .entry(query)
            .or_try_insert_with(self.fetch_into_cache(query))
            .await
            .map_err(|shared| shared.as_ref().clone())?;

        if entry.is_fresh() {
            Ok(LoadOutcome::Fetched(entry.into_value()))
        } else {
            tracing::trace!(
                collection = %query.collection_id,
                start_index = query.start_index,
                "window still fresh, skipping fetch"
            );
            Ok(LoadOutcome::Fresh)
        }
    }

    /// Forget which windows were fetched, forcing the next loads to the server
    pub fn invalidate_all(&self) {
        if let Some(recent) = &self.recent {
            recent.invalidate_all();
        }
    }

    /// The cache this loader writes into
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<MemoryContentCache> {
        &self.cache
    }

    async fn fetch_into_cache(&self, query: WindowQuery) -> Result<usize, LoadError> {
        let items = self.loader.fetch_window(query).await?;
        if let Some(stray) = items.iter().find(|i| i.parent_id != query.collection_id) {
            return Err(LoadError::WrongParent {
                item: stray.id,
                expected: query.collection_id,
                actual: stray.parent_id,
            });
        }
        let written = self.cache.upsert_many(items)?;
        tracing::debug!(
            collection = %query.collection_id,
            start_index = query.start_index,
            count = query.count,
            written,
            "window loaded"
        );
        Ok(written)
    }
}
