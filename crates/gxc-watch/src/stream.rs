//! Output side of a watch
//!
//! [`PageStream`] is what callers hold: a [`Stream`] of pages plus a view of
//! the watch's state and counters. Dropping it cancels the watch.

use crate::error::WatchError;
use crate::page::Page;
use crate::state::{validate_transition, WatchState};
use futures::Stream;
use gxc_cache::CollectionId;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Counters for one watch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Targets received from the caller
    pub targets_received: u64,
    /// Targets equal to the current one, skipped
    pub duplicate_targets: u64,
    /// Triggers folded into an already pending emission
    pub triggers_coalesced: u64,
    /// Changes outside the current window
    pub changes_ignored: u64,
    /// Window reads that failed and were skipped
    pub reads_failed: u64,
    /// Pages delivered
    pub pages_emitted: u64,
}

/// State and counters shared between a watch task and its stream
#[derive(Debug, Default)]
pub(crate) struct WatchShared {
    state: Mutex<WatchState>,
    stats: Mutex<WatchStats>,
}

impl WatchShared {
    pub(crate) fn state(&self) -> WatchState {
        *self.state.lock()
    }

    pub(crate) fn transition(&self, to: WatchState) -> Result<(), WatchError> {
        let mut state = self.state.lock();
        validate_transition(*state, to)?;
        *state = to;
        Ok(())
    }

    /// Move to `Terminated` from wherever the watch is
    pub(crate) fn terminate(&self) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = WatchState::Terminated;
        }
    }

    pub(crate) fn record(&self, f: impl FnOnce(&mut WatchStats)) {
        f(&mut self.stats.lock());
    }

    pub(crate) fn stats(&self) -> WatchStats {
        *self.stats.lock()
    }
}

/// Live stream of pages for one collection
///
/// Yields `Ok(Page)` for every emission. A terminal error is yielded once,
/// after which the stream ends.
#[derive(Debug)]
pub struct PageStream {
    collection_id: CollectionId,
    rx: mpsc::Receiver<Result<Page, WatchError>>,
    task: JoinHandle<()>,
    shared: Arc<WatchShared>,
}

impl PageStream {
    pub(crate) fn new(
        collection_id: CollectionId,
        rx: mpsc::Receiver<Result<Page, WatchError>>,
        task: JoinHandle<()>,
        shared: Arc<WatchShared>,
    ) -> Self {
        Self {
            collection_id,
            rx,
            task,
            shared,
        }
    }

    /// Collection being watched
    #[inline]
    #[must_use]
    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> WatchState {
        self.shared.state()
    }

    /// Snapshot of the watch counters
    #[inline]
    #[must_use]
    pub fn stats(&self) -> WatchStats {
        self.shared.stats()
    }

    /// Stop the watch and release its change subscription
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.rx.close();
        self.task.abort();
        self.shared.terminate();
    }
}

impl Stream for PageStream {
    type Item = Result<Page, WatchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for PageStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
