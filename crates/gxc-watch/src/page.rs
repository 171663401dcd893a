//! Emitted pages
//!
//! A [`Page`] is an owned snapshot of a window: changing it has no effect on
//! the cache.

use crate::window::Window;
use gxc_cache::{ContentItem, ItemId};
use serde::{Deserialize, Serialize};

/// Snapshot of the contents of one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Identity of the item at `start_key_index`, as resolved by the store
    pub start_key: Option<ItemId>,
    /// First index of the window
    pub start_key_index: u32,
    /// Element index the caller asked for
    pub target_key: u32,
    /// Items in the window, strictly ascending by `element_index`
    pub contents: Vec<ContentItem>,
}

impl Page {
    /// Build a page from a store read
    ///
    /// Items outside the window are dropped; the rest are sorted by position
    /// and, if a store reported two items for one position, the later one is
    /// kept.
    #[must_use]
    pub fn assemble(window: Window, start_key: Option<ItemId>, mut contents: Vec<ContentItem>) -> Self {
        contents.retain(|item| window.contains(item.element_index));
        contents.sort_by_key(|item| item.element_index);
        contents.reverse();
        contents.dedup_by_key(|item| item.element_index);
        contents.reverse();
        Self {
            start_key,
            start_key_index: window.start_index,
            target_key: window.target,
            contents,
        }
    }

    /// Number of items
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether the page holds no items
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Element indices in order
    #[must_use]
    pub fn indices(&self) -> Vec<u32> {
        self.contents.iter().map(|item| item.element_index).collect()
    }

    /// Item at `index`, if present
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&ContentItem> {
        self.contents
            .binary_search_by_key(&index, |item| item.element_index)
            .ok()
            .map(|pos| &self.contents[pos])
    }

    /// The item the caller asked for, if cached
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<&ContentItem> {
        self.get(self.target_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gxc_cache::{CollectionId, ItemState};
    use pretty_assertions::assert_eq;

    fn items(parent: CollectionId, indices: &[u32]) -> Vec<ContentItem> {
        indices
            .iter()
            .map(|&i| ContentItem::new(parent, i, format!("el_{i}")))
            .collect()
    }

    #[test]
    fn assemble_sorts_and_trims_to_window() {
        let parent = CollectionId::new();
        let window = Window::for_target(6, 5, 1);

        let page = Page::assemble(window, None, items(parent, &[12, 5, 3, 7, 15, 14]));

        assert_eq!(page.indices(), vec![5, 7, 12, 14]);
        assert_eq!(page.start_key_index, 5);
        assert_eq!(page.target_key, 6);
        assert!(page.target().is_none());
    }

    #[test]
    fn assemble_keeps_latest_duplicate() {
        let parent = CollectionId::new();
        let window = Window::for_target(0, 5, 1);
        let stale = ContentItem::new(parent, 1, "old");
        let fresh = ContentItem::new(parent, 1, "new").with_state(ItemState::Ok);

        let page = Page::assemble(window, None, vec![stale, fresh.clone()]);

        assert_eq!(page.len(), 1);
        assert_eq!(page.get(1), Some(&fresh));
    }

    #[test]
    fn target_lookup() {
        let parent = CollectionId::new();
        let window = Window::for_target(2, 5, 1);
        let contents = items(parent, &[0, 1, 2, 3]);
        let start = contents[0].id;

        let page = Page::assemble(window, Some(start), contents);

        assert_eq!(page.start_key, Some(start));
        assert_eq!(page.target().map(|i| i.element_index), Some(2));
    }

    #[test]
    fn empty_page() {
        let page = Page::assemble(Window::for_target(90, 5, 1), None, Vec::new());
        assert!(page.is_empty());
        assert_eq!(page.start_key_index, 90);
    }
}
