//! Error types for the content cache
//!
//! Provides error handling for:
//! - Store operations (resolve, read, write)
//! - Remote loads into the cache

use crate::types::{CollectionId, ItemId};

/// Errors from a content store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Collection is not known to the cache
    #[error("unknown collection: {0}")]
    UnknownCollection(CollectionId),

    /// Item is not known to the cache
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    /// Item claims a collection that is not known to the cache
    #[error("item {item} belongs to unknown collection {collection}")]
    OrphanItem {
        /// Item being written
        item: ItemId,
        /// Parent it claims
        collection: CollectionId,
    },

    /// A read could not be completed
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The store no longer accepts operations
    #[error("store closed")]
    Closed,
}

impl StoreError {
    /// Check if the error means the collection cannot be resolved
    #[inline]
    #[must_use]
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::UnknownCollection(_) | Self::Closed)
    }
}

/// Errors while loading remote contents into the cache
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// Remote fetch failed
    #[error("fetch of {collection} [{start_index}..+{count}] failed: {message}")]
    Fetch {
        /// Collection requested
        collection: CollectionId,
        /// First index requested
        start_index: u32,
        /// Number of items requested
        count: u32,
        /// Failure reported by the remote
        message: String,
    },

    /// Remote returned an item for another collection
    #[error("remote returned item {item} for collection {actual}, expected {expected}")]
    WrongParent {
        /// Offending item
        item: ItemId,
        /// Collection that was requested
        expected: CollectionId,
        /// Collection the item claims
        actual: CollectionId,
    },

    /// Writing into the cache failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LoadError {
    /// Create fetch error for a window
    pub fn fetch(
        collection: CollectionId,
        start_index: u32,
        count: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::Fetch {
            collection,
            start_index,
            count,
            message: message.into(),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
