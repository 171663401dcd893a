//! Simulated watch session
//!
//! Stands up a fake remote, a cache filled through a [`WindowLoader`], a
//! background job mutating item states, and one watch scrolling through
//! the requested targets.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use gxc_cache::{
    CollectionId, CollectionRecord, ContentItem, ContentLoader, ItemState, LoadError, LoaderConfig,
    MemoryContentCache, WindowLoader, WindowQuery,
};
use gxc_watch::{CollectionWatcher, Page, WatchConfig, WatchRequest, WatchStats, Window};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// States the update job cycles items through
const STATE_CYCLE: [ItemState; 4] = [
    ItemState::Queued,
    ItemState::Running,
    ItemState::Ok,
    ItemState::Error,
];

/// Parameters of one simulated session
#[derive(Debug, Clone)]
pub(crate) struct SimulationOptions {
    pub(crate) items: u32,
    pub(crate) targets: Vec<u32>,
    pub(crate) updates: usize,
    pub(crate) json: bool,
    pub(crate) config: WatchConfig,
}

/// Outcome of a session
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimulationReport {
    pub(crate) pages: usize,
    pub(crate) stats: WatchStats,
}

/// Remote holding one generated collection
struct SimulatedServer {
    record: CollectionRecord,
    items: Vec<ContentItem>,
}

impl SimulatedServer {
    fn new(n: u32) -> Self {
        let record = CollectionRecord::new("simulated list", n).with_collection_type("list");
        let items = (0..n)
            .map(|i| {
                ContentItem::new(record.id, i, format!("sample_{i:04}.fastq"))
                    .with_size(u64::from(i) * 1_024)
            })
            .collect();
        Self { record, items }
    }
}

#[async_trait]
impl ContentLoader for SimulatedServer {
    async fn fetch_collection(&self, id: CollectionId) -> Result<CollectionRecord, LoadError> {
        if id == self.record.id {
            Ok(self.record.clone())
        } else {
            Err(LoadError::fetch(id, 0, 0, "unknown collection"))
        }
    }

    async fn fetch_window(&self, query: WindowQuery) -> Result<Vec<ContentItem>, LoadError> {
        let start = usize::try_from(query.start_index).unwrap_or(usize::MAX);
        let count = usize::try_from(query.count).unwrap_or(usize::MAX);
        let end = start.saturating_add(count);
        Ok(self
            .items
            .get(start.min(self.items.len())..end.min(self.items.len()))
            .map(<[ContentItem]>::to_vec)
            .unwrap_or_default())
    }
}

/// Run a session, printing every page to stdout
///
/// # Errors
/// Returns an error if the collection cannot be loaded, the watch ends with
/// an error, or a page cannot be rendered.
pub(crate) async fn run(options: SimulationOptions) -> anyhow::Result<SimulationReport> {
    let SimulationOptions {
        items,
        targets,
        updates,
        json,
        config,
    } = options;

    let server = Arc::new(SimulatedServer::new(items));
    let id = server.record.id;
    let cache = Arc::new(MemoryContentCache::new());
    let loader = Arc::new(WindowLoader::new(
        server,
        Arc::clone(&cache),
        LoaderConfig::default(),
    ));
    loader.load_collection(id).await?;
    tracing::info!(collection = %id, items, "collection loaded");

    let gap = config.debounce().max(Duration::from_millis(50)) * 2;
    let sync_done = Instant::now() + gap * u32::try_from(targets.len()).unwrap_or(u32::MAX);
    let quiet = gap * 2;

    let targets = {
        let loader = Arc::clone(&loader);
        let (page_size, lookahead) = (config.page_size, config.lookahead_pages);
        stream::iter(targets).then(move |target| {
            let loader = Arc::clone(&loader);
            async move {
                sleep(gap).await;
                let query = Window::for_target(target, page_size, lookahead).query(id);
                match loader.load_window(query).await {
                    Ok(outcome) => tracing::debug!(target, ?outcome, "window synced"),
                    Err(e) => tracing::warn!(target, error = %e, "window sync failed"),
                }
                target
            }
        })
    };

    let updater = tokio::spawn(update_job(Arc::clone(&cache), id, items, updates, gap / 2));

    let watcher = CollectionWatcher::new(Arc::clone(&cache));
    let mut pages = watcher.watch(targets, WatchRequest::new(id).with_config(config))?;

    let mut emitted = 0;
    loop {
        match timeout(quiet, pages.next()).await {
            Ok(Some(Ok(page))) => {
                emitted += 1;
                print_page(emitted, &page, json)?;
            }
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => break,
            Err(_) if updater.is_finished() && Instant::now() >= sync_done => break,
            Err(_) => {}
        }
    }

    let stats = pages.stats();
    pages.cancel();
    Ok(SimulationReport {
        pages: emitted,
        stats,
    })
}

/// Walk items across the collection, moving each to its next state
async fn update_job(
    cache: Arc<MemoryContentCache>,
    id: CollectionId,
    items: u32,
    updates: usize,
    pause: Duration,
) {
    if items == 0 {
        return;
    }
    let mut index: u32 = 0;
    for round in 0..updates {
        sleep(pause).await;
        index = (index + 7) % items;
        let Some(item) = cache.item_at(id, index) else {
            tracing::debug!(index, "item not cached yet, skipping update");
            continue;
        };
        let state = STATE_CYCLE[round % STATE_CYCLE.len()];
        if let Err(e) = cache.update_item(item.id, |item| item.state = state) {
            tracing::warn!(index, error = %e, "update failed");
        }
    }
}

fn print_page(number: usize, page: &Page, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(page)?);
        return Ok(());
    }

    let active = page.contents.iter().filter(|i| i.state.is_active()).count();
    let finished = page
        .contents
        .iter()
        .filter(|i| matches!(i.state, ItemState::Ok | ItemState::Error))
        .count();
    let range = match (page.contents.first(), page.contents.last()) {
        (Some(first), Some(last)) => format!("{}..={}", first.element_index, last.element_index),
        _ => "empty".to_string(),
    };
    println!(
        "page #{number}: target={} start={} items={} [{range}] active={active} finished={finished}",
        page.target_key,
        page.start_key_index,
        page.len(),
    );
    Ok(())
}
