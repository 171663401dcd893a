//! GXC Watch - Live paginated windows over collection contents
//!
//! Watches one dataset collection held by a [`ContentStore`] and keeps a
//! caller-visible page of its elements up to date as the user scrolls and
//! as the cache changes underneath.
//!
//! # Core Operations
//!
//! - **Watch**: turn a stream of target indices into a stream of [`Page`]s
//! - **Window**: compute the page-aligned range around a target
//! - **Debounce**: fold bursts of targets and changes into one read
//! - **Cancel**: drop the [`PageStream`] to stop reads and unsubscribe
//!
//! # Architecture
//!
//! ```text
//! targets ─┐
//!          ├─→ window → trigger → debounce → read window → Page → PageStream
//! changes ─┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::{stream, StreamExt};
//! use gxc_watch::prelude::*;
//!
//! # async fn example(cache: std::sync::Arc<gxc_cache::MemoryContentCache>, id: gxc_cache::CollectionId)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let watcher = CollectionWatcher::new(cache);
//! let request = watcher.request(id).with_page_size(25);
//!
//! let mut pages = watcher.watch(stream::iter([0, 40]), request)?;
//! while let Some(page) = pages.next().await {
//!     let page = page?;
//!     println!("{} items from {}", page.len(), page.start_key_index);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod config;
pub mod error;
pub mod page;
pub mod state;
pub mod stream;
pub mod watcher;
pub mod window;

// Re-exports for convenience
pub use config::WatchConfig;
pub use error::{ConfigError, WatchError, WatchResult};
pub use page::Page;
pub use state::{allowed_transitions, validate_transition, WatchState};
pub use stream::{PageStream, WatchStats};
pub use watcher::{CollectionWatcher, WatchRequest};
pub use window::Window;

pub use gxc_cache::ContentStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for watching collections
    pub use crate::config::WatchConfig;
    pub use crate::error::{WatchError, WatchResult};
    pub use crate::page::Page;
    pub use crate::state::WatchState;
    pub use crate::stream::{PageStream, WatchStats};
    pub use crate::watcher::{CollectionWatcher, WatchRequest};
    pub use crate::window::Window;
}
