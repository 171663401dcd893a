//! Window computation
//!
//! A [`Window`] is the contiguous run of element indices a watch currently
//! reads: the page holding the target plus lookahead pages, stretched if
//! needed so the target itself is always inside.

use gxc_cache::{CollectionId, WindowQuery};

/// Range of element indices of interest for one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    /// Requested element index
    pub target: u32,
    /// First index of the page holding the target
    pub start_index: u32,
    /// Number of indices covered
    pub count: u32,
}

impl Window {
    /// Compute the window for a target
    ///
    /// `start_index` snaps down to a multiple of `page_size`; the window
    /// spans `page_size * (1 + lookahead_pages)` indices. A zero page size is
    /// treated as one.
    #[must_use]
    pub fn for_target(target: u32, page_size: u32, lookahead_pages: u32) -> Self {
        let page_size = page_size.max(1);
        Self {
            target,
            start_index: (target / page_size) * page_size,
            count: page_size.saturating_mul(lookahead_pages.saturating_add(1)),
        }
        .covering_target()
    }

    /// Stretch the window so the target lies inside it
    #[must_use]
    pub fn covering_target(mut self) -> Self {
        if self.target < self.start_index {
            self.count = self
                .count
                .saturating_add(self.start_index - self.target);
            self.start_index = self.target;
        }
        let offset = self.target - self.start_index;
        if offset >= self.count {
            self.count = offset.saturating_add(1);
        }
        self
    }

    /// Exclusive end index, saturating at `u32::MAX`
    ///
    /// Use [`Window::contains`] for membership; at the top of the index
    /// range the end cannot be represented.
    #[inline]
    #[must_use]
    pub fn end(&self) -> u32 {
        self.start_index.saturating_add(self.count)
    }

    /// Whether `index` falls inside the window
    #[inline]
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        index
            .checked_sub(self.start_index)
            .is_some_and(|offset| offset < self.count)
    }

    /// Store query reading this window
    #[inline]
    #[must_use]
    pub fn query(&self, collection_id: CollectionId) -> WindowQuery {
        WindowQuery::new(collection_id, self.start_index, self.count)
    }
}
