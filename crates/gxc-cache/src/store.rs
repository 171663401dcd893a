//! The store seam consumed by watchers
//!
//! A [`ContentStore`] answers three questions about a collection: what is it,
//! which item sits at a position, and what does a contiguous run look like.
//! It also hands out [`ChangeSubscription`]s that fire on every write.

use crate::error::StoreResult;
use crate::types::{ChangeEvent, CollectionId, CollectionRecord, ContentItem, ItemId, WindowQuery};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Read side of a collection content cache
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Resolve a collection record
    ///
    /// # Errors
    /// - `StoreError::UnknownCollection` if the cache does not know it
    async fn collection(&self, id: CollectionId) -> StoreResult<CollectionRecord>;

    /// Resolve the identity of the item at `index`
    ///
    /// Returns `Ok(None)` when nothing is cached at that position.
    async fn resolve_key(&self, id: CollectionId, index: u32) -> StoreResult<Option<ItemId>>;

    /// Read up to `query.count` items starting at `query.start_index`
    ///
    /// Results are sorted by `element_index` and may be short.
    async fn query_window(&self, query: WindowQuery) -> StoreResult<Vec<ContentItem>>;

    /// Subscribe to changes for one collection
    ///
    /// The subscription is released when dropped.
    fn subscribe(&self, id: CollectionId) -> StoreResult<ChangeSubscription>;
}

/// What a subscription delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A change to the collection
    Change(ChangeEvent),
    /// The receiver fell behind and missed this many events
    Lagged(u64),
    /// The store dropped the channel; no further events will arrive
    Closed,
}

/// Live feed of changes for a single collection
#[derive(Debug)]
pub struct ChangeSubscription {
    collection_id: CollectionId,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeSubscription {
    /// Wrap a broadcast receiver
    #[inline]
    #[must_use]
    pub fn new(collection_id: CollectionId, rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { collection_id, rx }
    }

    /// Collection this subscription listens to
    #[inline]
    #[must_use]
    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    /// Wait for the next notification
    ///
    /// Events for other collections sharing the channel are skipped.
    pub async fn recv(&mut self) -> Notification {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.collection_id == self.collection_id => {
                    return Notification::Change(event)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Notification::Lagged(missed)
                }
                Err(broadcast::error::RecvError::Closed) => return Notification::Closed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;

    fn event(collection_id: CollectionId, index: u32) -> ChangeEvent {
        ChangeEvent {
            collection_id,
            item_id: Some(ItemId::new()),
            element_index: Some(index),
            kind: ChangeKind::Updated,
        }
    }

    #[tokio::test]
    async fn subscription_filters_other_collections() {
        let (tx, rx) = broadcast::channel(8);
        let mine = CollectionId::new();
        let other = CollectionId::new();
        let mut sub = ChangeSubscription::new(mine, rx);
        assert_eq!(sub.collection_id(), mine);

        tx.send(event(other, 0)).unwrap();
        tx.send(event(mine, 4)).unwrap();

        match sub.recv().await {
            Notification::Change(e) => {
                assert_eq!(e.collection_id, mine);
                assert_eq!(e.element_index, Some(4));
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscription_reports_lag() {
        let (tx, rx) = broadcast::channel(2);
        let id = CollectionId::new();
        let mut sub = ChangeSubscription::new(id, rx);

        for i in 0..5 {
            tx.send(event(id, i)).unwrap();
        }

        assert_eq!(sub.recv().await, Notification::Lagged(3));
    }

    #[tokio::test]
    async fn subscription_reports_closed() {
        let (tx, rx) = broadcast::channel::<ChangeEvent>(2);
        let mut sub = ChangeSubscription::new(CollectionId::new(), rx);
        drop(tx);

        assert_eq!(sub.recv().await, Notification::Closed);
    }
}
