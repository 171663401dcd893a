//! End-to-end watch behaviour against the in-memory cache
//!
//! All tests run on a paused clock, so debounce and deadline periods elapse
//! instantly once every task is idle.

use futures::channel::mpsc as target_channel;
use futures::{stream, StreamExt};
use gxc_cache::{
    ChangeKind, CollectionId, CollectionRecord, ItemState, LoaderConfig, MemoryContentCache, StoreError, WindowLoader,
};
use gxc_test_utils::{seeded_cache, FlakyStore, StaticLoader};
use gxc_watch::prelude::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

const QUIET: Duration = Duration::from_secs(5);

fn request(id: CollectionId, page_size: u32) -> WatchRequest {
    WatchRequest::new(id)
        .with_page_size(page_size)
        .with_debounce(Duration::from_millis(100))
}

async fn next_page(pages: &mut PageStream) -> Page {
    pages
        .next()
        .await
        .expect("stream ended")
        .expect("watch failed")
}

async fn assert_quiet(pages: &mut PageStream) {
    assert!(
        timeout(QUIET, pages.next()).await.is_err(),
        "unexpected emission"
    );
}

/// Let the watch task subscribe before the test writes to the cache
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_page_contains_target_in_order() {
    let (cache, id) = seeded_cache(100);
    let watcher = CollectionWatcher::new(cache);

    let mut pages = watcher.watch(stream::iter([37]), request(id, 10)).unwrap();
    let page = next_page(&mut pages).await;

    assert_eq!(page.start_key_index, 30);
    assert_eq!(page.target_key, 37);
    assert_eq!(page.indices(), (30..50).collect::<Vec<_>>());
    assert_eq!(page.target().map(|i| i.element_index), Some(37));
    assert!(page.indices().windows(2).all(|w| w[0] < w[1]));
    assert_eq!(pages.state(), WatchState::Live);
}

#[tokio::test(start_paused = true)]
async fn test_start_key_identifies_first_item() {
    let (cache, id) = seeded_cache(20);
    let expected = cache.item_at(id, 10).map(|item| item.id);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([12]), request(id, 10)).unwrap();
    let page = next_page(&mut pages).await;

    assert_eq!(page.start_key, expected);
}

#[tokio::test(start_paused = true)]
async fn test_small_pages_over_short_collection() {
    let (cache, id) = seeded_cache(12);
    let watcher = CollectionWatcher::new(cache);

    let mut pages = watcher.watch(stream::iter([0]), request(id, 5)).unwrap();
    let page = next_page(&mut pages).await;

    assert_eq!(page.indices(), (0..=9).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_target_past_the_end_gives_short_page() {
    let (cache, id) = seeded_cache(12);
    let watcher = CollectionWatcher::new(cache);

    let mut pages = watcher.watch(stream::iter([10]), request(id, 5)).unwrap();
    let page = next_page(&mut pages).await;
    assert_eq!(page.indices(), vec![10, 11]);

    let mut pages = watcher.watch(stream::iter([400]), request(id, 5)).unwrap();
    let page = next_page(&mut pages).await;
    assert!(page.is_empty());
    assert_eq!(page.start_key, None);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_targets_emit_once() {
    let (cache, id) = seeded_cache(30);
    let watcher = CollectionWatcher::new(cache);

    let mut pages = watcher.watch(stream::iter([5, 5, 5]), request(id, 10)).unwrap();
    let page = next_page(&mut pages).await;
    assert_eq!(page.target_key, 5);
    assert_quiet(&mut pages).await;

    let stats = pages.stats();
    assert_eq!(stats.targets_received, 3);
    assert_eq!(stats.duplicate_targets, 2);
    assert_eq!(stats.pages_emitted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_updates_inside_window_are_emitted() {
    let (cache, id) = seeded_cache(20);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([0]), request(id, 5)).unwrap();
    let first = next_page(&mut pages).await;

    let item = cache.item_at(id, 3).unwrap();
    cache
        .update_item(item.id, |item| {
            item.state = ItemState::Ok;
            item.set_field("peek", "ACGT");
        })
        .unwrap();

    let page = next_page(&mut pages).await;
    let updated = page.get(3).unwrap();
    assert_eq!(updated.state, ItemState::Ok);
    assert_eq!(updated.field("peek"), Some(&serde_json::json!("ACGT")));

    // The earlier snapshot keeps what was read at the time.
    let before = first.get(3).unwrap();
    assert_eq!(before.state, ItemState::New);
    assert_eq!(before.field("peek"), None);
    assert_eq!(before.id, updated.id);
}

#[tokio::test(start_paused = true)]
async fn test_pages_are_detached_from_the_cache() {
    let (cache, id) = seeded_cache(10);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([0]), request(id, 5)).unwrap();
    let mut page = next_page(&mut pages).await;
    page.contents[0].element_identifier = "scribbled".into();
    page.contents[0].state = ItemState::Error;

    let cached = cache.item_at(id, 0).unwrap();
    assert_eq!(cached.element_identifier, "element_0");
    assert_eq!(cached.state, ItemState::New);
}

#[tokio::test(start_paused = true)]
async fn test_changes_outside_window_are_ignored() {
    let (cache, id) = seeded_cache(100);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([0]), request(id, 10)).unwrap();
    next_page(&mut pages).await;

    let far = cache.item_at(id, 50).unwrap();
    cache
        .update_item(far.id, |item| item.state = ItemState::Running)
        .unwrap();

    assert_quiet(&mut pages).await;
    assert_eq!(pages.stats().changes_ignored, 1);
}

#[tokio::test(start_paused = true)]
async fn test_insertions_anywhere_refresh_the_window() {
    let (cache, id) = seeded_cache(100);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([0]), request(id, 10)).unwrap();
    next_page(&mut pages).await;

    let kind = cache
        .upsert(gxc_test_utils::element(id, 500))
        .unwrap();
    assert_eq!(kind, ChangeKind::Inserted);

    let page = next_page(&mut pages).await;
    assert_eq!(page.indices(), (0..20).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_changes_is_coalesced() {
    let (cache, id) = seeded_cache(20);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([0]), request(id, 10)).unwrap();
    next_page(&mut pages).await;

    for index in 0..10 {
        let item = cache.item_at(id, index).unwrap();
        cache
            .update_item(item.id, |item| item.state = ItemState::Queued)
            .unwrap();
    }

    let page = next_page(&mut pages).await;
    assert!(page.contents.iter().take(10).all(|i| i.state == ItemState::Queued));
    assert_quiet(&mut pages).await;

    let stats = pages.stats();
    assert_eq!(stats.pages_emitted, 2);
    assert_eq!(stats.triggers_coalesced, 9);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_waits_for_quiet() {
    let (cache, id) = seeded_cache(20);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([0]), request(id, 10)).unwrap();
    next_page(&mut pages).await;

    let item = cache.item_at(id, 1).unwrap();
    let started = Instant::now();
    for _ in 0..5 {
        cache
            .update_item(item.id, |item| item.state = ItemState::Running)
            .unwrap();
        sleep(Duration::from_millis(50)).await;
    }

    next_page(&mut pages).await;
    // Last change at 200ms, plus the 100ms quiet period.
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(pages.stats().pages_emitted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_latest_target_wins() {
    let (cache, id) = seeded_cache(200);
    let watcher = CollectionWatcher::new(cache);
    let (targets, rx) = target_channel::unbounded();

    let mut pages = watcher.watch(rx, request(id, 10)).unwrap();
    targets.unbounded_send(0).unwrap();
    assert_eq!(next_page(&mut pages).await.target_key, 0);

    targets.unbounded_send(50).unwrap();
    targets.unbounded_send(90).unwrap();

    let page = next_page(&mut pages).await;
    assert_eq!(page.target_key, 90);
    assert_eq!(page.start_key_index, 90);
    assert_quiet(&mut pages).await;
}

#[tokio::test(start_paused = true)]
async fn test_unknown_collection_is_a_resolution_error() {
    let cache = Arc::new(MemoryContentCache::new());
    let watcher = CollectionWatcher::new(cache);
    let missing = CollectionId::new();

    let mut pages = watcher.watch(stream::iter([0]), request(missing, 10)).unwrap();
    let err = pages.next().await.unwrap().unwrap_err();

    assert!(err.is_resolution());
    assert!(matches!(
        err,
        WatchError::Resolution { collection, source: StoreError::UnknownCollection(_) } if collection == missing
    ));
    assert!(pages.next().await.is_none());
    assert_eq!(pages.state(), WatchState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_removed_collection_ends_the_watch() {
    let (cache, id) = seeded_cache(10);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([0]), request(id, 5)).unwrap();
    next_page(&mut pages).await;

    cache.remove_collection(id);

    let err = pages.next().await.unwrap().unwrap_err();
    assert!(err.is_resolution());
    assert!(pages.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_first_read_times_out() {
    let (cache, id) = seeded_cache(10);
    let store = Arc::new(FlakyStore::new(cache));
    store.stall_reads(true);
    let watcher = CollectionWatcher::new(Arc::clone(&store));
    let request = request(id, 5).with_config(
        WatchConfig::new()
            .with_page_size(5)
            .with_first_page_timeout(Some(Duration::from_secs(1))),
    );

    let mut pages = watcher.watch(stream::iter([0]), request).unwrap();
    let err = pages.next().await.unwrap().unwrap_err();

    assert!(err.is_timeout());
    assert!(!err.is_resolution());
    assert!(matches!(err, WatchError::Timeout { after_ms: 1000 }));
    assert_eq!(store.reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_target_times_out() {
    let (cache, id) = seeded_cache(10);
    let watcher = CollectionWatcher::new(cache);
    let request = request(id, 5).with_config(
        WatchConfig::new().with_first_page_timeout(Some(Duration::from_millis(500))),
    );

    let mut pages = watcher.watch(stream::pending::<u32>(), request).unwrap();
    let err = pages.next().await.unwrap().unwrap_err();

    assert!(matches!(err, WatchError::Timeout { after_ms: 500 }));
}

#[tokio::test(start_paused = true)]
async fn test_lifetime_bounds_a_live_watch() {
    let (cache, id) = seeded_cache(10);
    let watcher = CollectionWatcher::new(cache);
    let request = request(id, 5).with_config(
        WatchConfig::new()
            .with_page_size(5)
            .with_lifetime(Some(Duration::from_secs(2))),
    );

    let mut pages = watcher.watch(stream::iter([0]), request).unwrap();
    next_page(&mut pages).await;

    let err = pages.next().await.unwrap().unwrap_err();
    assert!(matches!(err, WatchError::Timeout { after_ms: 2000 }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_read_skips_one_emission() {
    let (cache, id) = seeded_cache(10);
    let store = Arc::new(FlakyStore::new(Arc::clone(&cache)));
    store.fail_next(1);
    let watcher = CollectionWatcher::new(Arc::clone(&store));

    let mut pages = watcher
        .watch(stream::iter([0]), request(id, 5).with_debug(true))
        .unwrap();
    settle().await;
    assert_eq!(pages.stats().reads_failed, 1);
    assert_eq!(pages.state(), WatchState::Resolving);

    let item = store.inner().item_at(id, 2).unwrap();
    store
        .inner()
        .update_item(item.id, |item| item.state = ItemState::Ok)
        .unwrap();

    let page = next_page(&mut pages).await;
    assert_eq!(page.get(2).map(|i| i.state), Some(ItemState::Ok));
    assert_eq!(pages.state(), WatchState::Live);
    assert_eq!(store.reads(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_stream_unsubscribes() {
    let (cache, id) = seeded_cache(10);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::pending::<u32>(), request(id, 5)).unwrap();
    settle().await;
    assert_eq!(cache.listener_count(id), 1);

    drop(pages);
    settle().await;

    assert_eq!(cache.listener_count(id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_emissions() {
    let (cache, id) = seeded_cache(10);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([0]), request(id, 5)).unwrap();
    next_page(&mut pages).await;
    pages.cancel();
    settle().await;

    assert_eq!(cache.listener_count(id), 0);
    let item = cache.item_at(id, 0).unwrap();
    cache
        .update_item(item.id, |item| item.state = ItemState::Ok)
        .unwrap();
    assert_eq!(cache.stats().listener_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_independent_watches_share_a_store() {
    let (cache, id) = seeded_cache(100);
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut top = watcher.watch(stream::iter([0]), request(id, 10)).unwrap();
    let mut bottom = watcher.watch(stream::iter([95]), request(id, 10)).unwrap();

    assert_eq!(next_page(&mut top).await.start_key_index, 0);
    let page = next_page(&mut bottom).await;
    assert_eq!(page.indices(), (90..100).collect::<Vec<_>>());
    assert_eq!(cache.listener_count(id), 2);

    drop(top);
    settle().await;
    assert_eq!(cache.listener_count(id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_loader_fills_an_empty_window() {
    let (remote, id) = StaticLoader::new().with_collection("remote", 30);
    let remote = Arc::new(remote);
    let cache = Arc::new(MemoryContentCache::new());
    let loader = WindowLoader::new(Arc::clone(&remote), Arc::clone(&cache), LoaderConfig::new());
    loader.load_collection(id).await.unwrap();

    let watcher = CollectionWatcher::new(Arc::clone(&cache));
    let request = watcher.request(id).with_page_size(10);
    let mut pages = watcher.watch(stream::iter([0]), request).unwrap();

    let first = next_page(&mut pages).await;
    assert!(first.is_empty());

    loader
        .load_window(gxc_cache::WindowQuery::new(id, 0, 20))
        .await
        .unwrap();

    let page = next_page(&mut pages).await;
    assert_eq!(page.indices(), (0..20).collect::<Vec<_>>());
    assert_eq!(remote.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_top_index_target_is_included() {
    let cache = Arc::new(MemoryContentCache::new());
    let record = CollectionRecord::new("edge", u32::MAX);
    let id = record.id;
    cache.put_collection(record);
    cache.upsert(gxc_test_utils::element(id, u32::MAX)).unwrap();
    let watcher = CollectionWatcher::new(Arc::clone(&cache));

    let mut pages = watcher.watch(stream::iter([u32::MAX]), request(id, 5)).unwrap();
    let page = next_page(&mut pages).await;

    assert_eq!(page.indices(), vec![u32::MAX]);
    assert_eq!(page.target().map(|i| i.element_index), Some(u32::MAX));
    assert_eq!(page.start_key, cache.item_at(id, u32::MAX).map(|i| i.id));
}
