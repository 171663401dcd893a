//! Error types for collection watching
//!
//! Provides error handling for:
//! - Configuration (rejected before a watch starts)
//! - Resolution failures (fatal to a subscription)
//! - Timeouts (fatal, distinct from resolution)
//! - State machine violations

use crate::state::WatchState;
use gxc_cache::{CollectionId, StoreError};
use std::path::PathBuf;

/// Errors in watch configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Page size of zero
    #[error("page size must be positive")]
    ZeroPageSize,

    /// Output buffer of zero
    #[error("output buffer must be positive")]
    ZeroBuffer,

    /// Window size does not fit an element index
    #[error("window of {pages} pages of {page_size} overflows the element index range")]
    WindowTooLarge {
        /// Configured page size
        page_size: u32,
        /// Pages per window, lookahead included
        pages: u32,
    },

    /// Malformed TOML
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered as TOML
    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// IO error during config read
    #[error("io error reading {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Terminal errors of a watch
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Configuration rejected
    #[error("invalid watch config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Collection cannot be resolved in the store
    #[error("cannot resolve collection {collection}: {source}")]
    Resolution {
        /// Collection being watched
        collection: CollectionId,
        /// Store failure
        #[source]
        source: StoreError,
    },

    /// Safety deadline elapsed
    #[error("watch timed out after {after_ms}ms")]
    Timeout {
        /// Bound that elapsed, in milliseconds
        after_ms: u64,
    },

    /// Watch state machine violation
    #[error("illegal watch state transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: WatchState,
        /// Requested state
        to: WatchState,
    },
}

impl WatchError {
    /// Create resolution error for collection
    #[inline]
    pub fn resolution(collection: CollectionId, source: StoreError) -> Self {
        Self::Resolution { collection, source }
    }

    /// Check if the watch ended because a deadline elapsed
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the watch ended because the collection could not be resolved
    #[inline]
    #[must_use]
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }
}

/// Result type alias for watch operations
pub type WatchResult<T> = Result<T, WatchError>;
