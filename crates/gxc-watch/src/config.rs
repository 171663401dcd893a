//! Watch configuration
//!
//! [`WatchConfig`] replaces loose option dictionaries with named, typed
//! fields whose defaults are resolved at construction. Configs load from
//! TOML; missing fields take their defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-watch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Items per page
    pub page_size: u32,
    /// Pages fetched past the page holding the target
    pub lookahead_pages: u32,
    /// Quiet period before a burst of triggers produces a page, in milliseconds
    pub debounce_ms: u64,
    /// Deadline for the first page, in milliseconds (0 disables)
    pub first_page_timeout_ms: u64,
    /// Upper bound on the whole watch, in milliseconds (0 means unbounded)
    pub lifetime_ms: u64,
    /// Pages buffered for a slow consumer
    pub buffer: usize,
    /// Per-watch diagnostic logging
    pub debug: bool,
}

impl WatchConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With page size
    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// With lookahead pages
    #[inline]
    #[must_use]
    pub fn with_lookahead_pages(mut self, pages: u32) -> Self {
        self.lookahead_pages = pages;
        self
    }

    /// With debounce period
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = millis(debounce);
        self
    }

    /// With first page deadline (`None` disables it)
    #[inline]
    #[must_use]
    pub fn with_first_page_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.first_page_timeout_ms = timeout.map_or(0, millis);
        self
    }

    /// With overall lifetime bound (`None` means unbounded)
    #[inline]
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime_ms = lifetime.map_or(0, millis);
        self
    }

    /// With diagnostic logging
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Debounce period
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// First page deadline, if enabled
    #[inline]
    #[must_use]
    pub fn first_page_timeout(&self) -> Option<Duration> {
        (self.first_page_timeout_ms > 0).then(|| Duration::from_millis(self.first_page_timeout_ms))
    }

    /// Lifetime bound, if any
    #[inline]
    #[must_use]
    pub fn lifetime(&self) -> Option<Duration> {
        (self.lifetime_ms > 0).then(|| Duration::from_millis(self.lifetime_ms))
    }

    /// Items read per window: the target's page plus lookahead
    #[inline]
    #[must_use]
    pub fn window_size(&self) -> u32 {
        self.page_size
            .saturating_mul(self.lookahead_pages.saturating_add(1))
    }

    /// Check the configuration can drive a watch
    ///
    /// # Errors
    /// - `ConfigError::ZeroPageSize` if `page_size` is zero
    /// - `ConfigError::ZeroBuffer` if `buffer` is zero
    /// - `ConfigError::WindowTooLarge` if the window overflows `u32`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.buffer == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        let pages = self.lookahead_pages.saturating_add(1);
        if self.page_size.checked_mul(pages).is_none() {
            return Err(ConfigError::WindowTooLarge {
                page_size: self.page_size,
                pages,
            });
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// - `ConfigError::Parse` if the TOML is malformed
    /// - any error from [`WatchConfig::validate`]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - any error from [`WatchConfig::from_toml_str`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        Self::from_toml_str(&source)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// - `ConfigError::Render` if serialization fails
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            lookahead_pages: 1,
            debounce_ms: 250,
            first_page_timeout_ms: 30_000,
            lifetime_ms: 0,
            buffer: 16,
            debug: false,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
