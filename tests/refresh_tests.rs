#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{MockRemote, movie};
use media_fs::namespace::{NamespaceMode, NamespaceSnapshot, PublishedNamespace, build};
use media_fs::refresh::{RefreshOutcome, Refresher};

const INTERVAL: Duration = Duration::from_secs(300);

fn refresher(remote: &Arc<MockRemote>, namespace: &Arc<PublishedNamespace>) -> Refresher<MockRemote> {
    Refresher::new(
        Arc::clone(remote),
        Arc::clone(namespace),
        NamespaceMode::Curated,
        INTERVAL,
    )
}

#[tokio::test]
async fn refresh_publishes_a_new_snapshot() {
    let remote = MockRemote::new();
    remote.set_listing(Some(vec![movie("Foo", 10), movie("Bar", 20)]));
    let namespace = Arc::new(PublishedNamespace::new(NamespaceSnapshot::empty(
        NamespaceMode::Curated,
    )));

    let outcome = refresher(&remote, &namespace).refresh_once().await;

    assert_eq!(outcome, RefreshOutcome::Published { files: 2, skipped: 0 });
    let live = namespace.load();
    assert!(live.file("/movies/Foo (2020)/Foo.mkv").is_some());
    assert_eq!(live.total_bytes(), 30);
}

#[tokio::test]
async fn empty_listing_keeps_the_previous_snapshot() {
    let remote = MockRemote::new();
    remote.set_listing(Some(Vec::new()));
    let namespace = Arc::new(PublishedNamespace::new(build(
        vec![movie("Foo", 10)],
        NamespaceMode::Curated,
    )));

    let outcome = refresher(&remote, &namespace).refresh_once().await;

    assert_eq!(outcome, RefreshOutcome::Empty);
    assert_eq!(namespace.load().file_count(), 1);
}

#[tokio::test]
async fn failed_listing_keeps_the_previous_snapshot() {
    let remote = MockRemote::new();
    let namespace = Arc::new(PublishedNamespace::new(build(
        vec![movie("Foo", 10)],
        NamespaceMode::Curated,
    )));
    let before = namespace.load();

    let outcome = refresher(&remote, &namespace).refresh_once().await;

    assert_eq!(outcome, RefreshOutcome::Failed);
    assert!(Arc::ptr_eq(&before, &namespace.load()));
}

#[tokio::test]
async fn malformed_records_are_counted_not_fatal() {
    let remote = MockRemote::new();
    let mut broken = movie("Broken", 5);
    broken.file_name = None;
    remote.set_listing(Some(vec![movie("Foo", 10), broken]));
    let namespace = Arc::new(PublishedNamespace::new(NamespaceSnapshot::empty(
        NamespaceMode::Curated,
    )));

    let outcome = refresher(&remote, &namespace).refresh_once().await;

    assert_eq!(outcome, RefreshOutcome::Published { files: 1, skipped: 1 });
}

#[tokio::test(start_paused = true)]
async fn spawned_loop_refreshes_once_per_interval() {
    let remote = MockRemote::new();
    remote.set_listing(Some(vec![movie("Foo", 10)]));
    let namespace = Arc::new(PublishedNamespace::new(NamespaceSnapshot::empty(
        NamespaceMode::Curated,
    )));

    let handle = refresher(&remote, &namespace).spawn();

    tokio::time::sleep(INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(remote.listing_calls.load(Ordering::SeqCst), 0);
    assert_eq!(namespace.load().file_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(remote.listing_calls.load(Ordering::SeqCst), 1);
    wait_for(|| namespace.load().file_count() == 1).await;

    remote.set_listing(Some(vec![movie("Foo", 10), movie("Bar", 20)]));
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(remote.listing_calls.load(Ordering::SeqCst), 2);
    wait_for(|| namespace.load().file_count() == 2).await;

    handle.abort();
}

/// Yield until `cond` holds. The build runs on the blocking pool, which paused time does not drive.
async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("condition never held");
}
