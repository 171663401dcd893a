//! GXC Cache - Client-side collection content cache
//!
//! Holds dataset collection contents locally, indexed by parent collection
//! and element position, and tells subscribers whenever anything changes.
//!
//! # Core Operations
//!
//! - **Resolve**: find a collection record, or the item at a position
//! - **Read**: fetch a contiguous window of a collection, sorted by position
//! - **Subscribe**: receive a [`ChangeEvent`] for every write to a collection
//! - **Load**: fill the cache from the server through a [`ContentLoader`]
//!
//! # Architecture
//!
//! ```text
//! Server → ContentLoader → WindowLoader → MemoryContentCache → ContentStore (read / subscribe) → watchers
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use gxc_cache::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = MemoryContentCache::new();
//! let record = CollectionRecord::new("paired reads", 2);
//! let id = record.id;
//! cache.put_collection(record);
//! cache.upsert(ContentItem::new(id, 0, "forward"))?;
//! cache.upsert(ContentItem::new(id, 1, "reverse"))?;
//!
//! let items = cache.query_window(WindowQuery::new(id, 0, 10)).await?;
//! assert_eq!(items.len(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod error;
pub mod loader;
pub mod memory;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use error::{LoadError, StoreError, StoreResult};
pub use loader::{ContentLoader, LoadOutcome, LoaderConfig, WindowLoader};
pub use memory::{CacheStats, MemoryContentCache};
pub use store::{ChangeSubscription, ContentStore, Notification};
pub use types::{
    ChangeEvent, ChangeKind, CollectionId, CollectionRecord, ContentItem, ElementKind, ItemId,
    ItemState, WindowQuery,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the content cache
    pub use crate::error::{LoadError, StoreError};
    pub use crate::loader::{ContentLoader, LoaderConfig, WindowLoader};
    pub use crate::memory::MemoryContentCache;
    pub use crate::store::{ContentStore, Notification};
    pub use crate::types::{
        ChangeEvent, ChangeKind, CollectionId, CollectionRecord, ContentItem, ItemId, ItemState,
        WindowQuery,
    };
}
