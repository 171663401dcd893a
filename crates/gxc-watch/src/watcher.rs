//! Collection watcher
//!
//! Turns a stream of requested element indices into a live stream of pages:
//! - resolves the collection and subscribes to its changes
//! - computes the window around each new target
//! - merges targets and relevant changes into one trigger source
//! - debounces triggers (trailing edge) and re-reads the window on firing
//!
//! The first page is emitted as soon as it is read. Each watch runs as one
//! task, so reads and emissions never interleave. When a change and a new
//! target land in the same debounce period the latest target's window is
//! the one read.

use crate::config::WatchConfig;
use crate::error::{WatchError, WatchResult};
use crate::page::Page;
use crate::state::WatchState;
use crate::stream::{PageStream, WatchShared};
use crate::window::Window;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use gxc_cache::{ChangeEvent, ChangeSubscription, CollectionId, ContentStore, Notification, StoreError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

/// What to watch and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    /// Collection to watch
    pub collection: CollectionId,
    /// Paging, debounce and deadline settings
    pub config: WatchConfig,
}

impl WatchRequest {
    /// Request with default configuration
    #[inline]
    #[must_use]
    pub fn new(collection: CollectionId) -> Self {
        Self {
            collection,
            config: WatchConfig::default(),
        }
    }

    /// With full configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    /// With page size
    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// With debounce period
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.config = self.config.with_debounce(debounce);
        self
    }

    /// With diagnostic logging
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }
}

/// Entry point for watching collections held by a store
///
/// Cheap to clone; every watch shares the same store.
#[derive(Debug)]
pub struct CollectionWatcher<S> {
    store: Arc<S>,
    defaults: WatchConfig,
}

impl<S> Clone for CollectionWatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            defaults: self.defaults.clone(),
        }
    }
}

impl<S: ContentStore> CollectionWatcher<S> {
    /// Create watcher over `store` with default configuration
    #[inline]
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_defaults(store, WatchConfig::default())
    }

    /// Create watcher whose requests start from `defaults`
    #[inline]
    #[must_use]
    pub fn with_defaults(store: Arc<S>, defaults: WatchConfig) -> Self {
        Self { store, defaults }
    }

    /// Start a request for `collection` from this watcher's defaults
    #[inline]
    #[must_use]
    pub fn request(&self, collection: CollectionId) -> WatchRequest {
        WatchRequest::new(collection).with_config(self.defaults.clone())
    }

    /// The underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Watch a collection
    ///
    /// # Arguments
    /// * `targets` - element indices the caller wants visible, in order
    /// * `request` - collection and configuration
    ///
    /// # Returns
    /// A stream of pages. Resolution failures and timeouts arrive as a
    /// single terminal `Err` item.
    ///
    /// # Errors
    /// - `WatchError::InvalidConfig` if the configuration is rejected
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn watch<T>(&self, targets: T, request: WatchRequest) -> WatchResult<PageStream>
    where
        T: Stream<Item = u32> + Send + 'static,
    {
        request.config.validate()?;

        let WatchRequest { collection, config } = request;
        let (tx, rx) = mpsc::channel(config.buffer);
        let shared = Arc::new(WatchShared::default());

        let task = WatchTask {
            store: Arc::clone(&self.store),
            collection,
            config,
            shared: Arc::clone(&shared),
            tx,
            window: None,
            debounce_deadline: None,
            first_page_deadline: None,
            lifetime_deadline: None,
            first_page_sent: false,
        };
        let span = tracing::debug_span!("watch", collection = %collection);
        let handle = tokio::spawn(task.run(targets.boxed()).instrument(span));

        Ok(PageStream::new(collection, rx, handle, shared))
    }
}

/// Pipeline state for one subscription
struct WatchTask<S> {
    store: Arc<S>,
    collection: CollectionId,
    config: WatchConfig,
    shared: Arc<WatchShared>,
    tx: mpsc::Sender<Result<Page, WatchError>>,
    window: Option<Window>,
    debounce_deadline: Option<Instant>,
    first_page_deadline: Option<Instant>,
    lifetime_deadline: Option<Instant>,
    first_page_sent: bool,
}

impl<S: ContentStore> WatchTask<S> {
    async fn run(mut self, targets: BoxStream<'static, u32>) {
        if let Err(e) = self.drive(targets).await {
            tracing::warn!(collection = %self.collection, error = %e, "watch terminated");
            // The receiver may already be gone; nothing left to tell.
            let _ = self.tx.send(Err(e)).await;
        }
        self.shared.terminate();
        if self.config.debug {
            tracing::debug!(collection = %self.collection, stats = ?self.shared.stats(), "watch finished");
        }
    }

    async fn drive(&mut self, mut targets: BoxStream<'static, u32>) -> WatchResult<()> {
        self.shared.transition(WatchState::Resolving)?;
        let started = Instant::now();
        self.first_page_deadline = self.config.first_page_timeout().map(|t| started + t);
        self.lifetime_deadline = self.config.lifetime().map(|t| started + t);

        let record = self
            .bounded(self.store.collection(self.collection))
            .await?
            .map_err(|e| WatchError::resolution(self.collection, e))?;
        let mut changes = Some(
            self.store
                .subscribe(self.collection)
                .map_err(|e| WatchError::resolution(self.collection, e))?,
        );
        if self.config.debug {
            tracing::debug!(
                collection = %self.collection,
                name = %record.name,
                elements = record.element_count,
                "collection resolved"
            );
        }

        let mut targets_done = false;
        loop {
            let debounce_deadline = self.debounce_deadline;
            let deadline = self.deadline();

            tokio::select! {
                biased;

                () = self.tx.closed() => return Ok(()),

                () = sleep_until(deadline.map(|(at, _)| at)) => return Err(timed_out(deadline)),

                target = targets.next(), if !targets_done => match target {
                    Some(target) => self.handle_target(target).await?,
                    None => {
                        targets_done = true;
                        if self.config.debug {
                            tracing::debug!(collection = %self.collection, "target stream ended");
                        }
                    }
                },

                notification = next_change(&mut changes) => {
                    self.handle_notification(notification, &mut changes);
                }

                () = sleep_until(debounce_deadline) => self.emit().await?,
            }
        }
    }

    async fn handle_target(&mut self, target: u32) -> WatchResult<()> {
        self.shared.record(|s| s.targets_received += 1);

        if self.window.map(|w| w.target) == Some(target) {
            self.shared.record(|s| s.duplicate_targets += 1);
            return Ok(());
        }

        let window = Window::for_target(target, self.config.page_size, self.config.lookahead_pages);
        if self.config.debug {
            tracing::debug!(
                collection = %self.collection,
                target,
                start_index = window.start_index,
                count = window.count,
                "target changed"
            );
        }
        self.window = Some(window);

        if self.first_page_sent {
            self.schedule();
            Ok(())
        } else {
            self.emit().await
        }
    }

    fn handle_notification(
        &mut self,
        notification: Notification,
        changes: &mut Option<ChangeSubscription>,
    ) {
        match notification {
            Notification::Change(event) => {
                if self.is_relevant(&event) {
                    self.schedule();
                } else {
                    self.shared.record(|s| s.changes_ignored += 1);
                }
            }
            Notification::Lagged(missed) => {
                if self.config.debug {
                    tracing::debug!(collection = %self.collection, missed, "change feed lagged");
                }
                self.schedule();
            }
            Notification::Closed => {
                if self.config.debug {
                    tracing::debug!(collection = %self.collection, "change feed closed");
                }
                *changes = None;
            }
        }
    }

    /// Changes before the first target have nothing to refresh
    fn is_relevant(&self, event: &ChangeEvent) -> bool {
        let Some(window) = self.window else {
            return false;
        };
        event.kind.is_structural() || event.element_index.map_or(true, |i| window.contains(i))
    }

    /// (Re)arm the trailing-edge debounce deadline
    fn schedule(&mut self) {
        if self.window.is_none() {
            return;
        }
        if self.debounce_deadline.is_some() {
            self.shared.record(|s| s.triggers_coalesced += 1);
        }
        self.debounce_deadline = Some(Instant::now() + self.config.debounce());
    }

    /// Read the current window and deliver it
    ///
    /// Unresolvable reads end the watch; any other read failure drops this
    /// emission only.
    async fn emit(&mut self) -> WatchResult<()> {
        self.debounce_deadline = None;
        let Some(window) = self.window else {
            return Ok(());
        };

        let page = match self.bounded(self.read_page(window)).await? {
            Ok(page) => page,
            Err(e) if e.is_unresolvable() => {
                return Err(WatchError::resolution(self.collection, e));
            }
            Err(e) => {
                self.shared.record(|s| s.reads_failed += 1);
                if self.config.debug {
                    tracing::debug!(
                        collection = %self.collection,
                        start_index = window.start_index,
                        error = %e,
                        "window read failed, skipping emission"
                    );
                }
                return Ok(());
            }
        };

        if self.shared.state() == WatchState::Resolving {
            self.shared.transition(WatchState::Live)?;
        }
        self.first_page_sent = true;
        let (target, start_index, items) = (page.target_key, page.start_key_index, page.len());
        // A closed receiver is picked up by the loop on its next turn.
        if self.tx.send(Ok(page)).await.is_ok() {
            self.shared.record(|s| s.pages_emitted += 1);
            if self.config.debug {
                tracing::debug!(
                    collection = %self.collection,
                    target,
                    start_index,
                    items,
                    "page emitted"
                );
            }
        }
        Ok(())
    }

    /// Earliest pending deadline and the bound it enforces, in milliseconds
    ///
    /// The first page deadline only applies until the first page is out.
    fn deadline(&self) -> Option<(Instant, u64)> {
        let lifetime = self
            .lifetime_deadline
            .map(|at| (at, self.config.lifetime_ms));
        let first_page = self
            .first_page_deadline
            .filter(|_| self.shared.state() == WatchState::Resolving)
            .map(|at| (at, self.config.first_page_timeout_ms));
        match (lifetime, first_page) {
            (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
            (a, b) => a.or(b),
        }
    }

    /// Run a store call, giving up when the current deadline passes
    async fn bounded<F: Future>(&self, call: F) -> WatchResult<F::Output> {
        let deadline = self.deadline();
        tokio::select! {
            output = call => Ok(output),
            () = sleep_until(deadline.map(|(at, _)| at)) => Err(timed_out(deadline)),
        }
    }

    async fn read_page(&self, window: Window) -> Result<Page, StoreError> {
        let start_key = self
            .store
            .resolve_key(self.collection, window.start_index)
            .await?;
        let contents = self.store.query_window(window.query(self.collection)).await?;
        Ok(Page::assemble(window, start_key, contents))
    }
}

fn timed_out(deadline: Option<(Instant, u64)>) -> WatchError {
    WatchError::Timeout {
        after_ms: deadline.map_or(0, |(_, after_ms)| after_ms),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_change(changes: &mut Option<ChangeSubscription>) -> Notification {
    match changes {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
