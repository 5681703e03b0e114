#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{MockRemote, block_cache, movie, pattern};
use media_fs::cache::{BlockCacheConfig, EvictionOrder};
use tokio::task::JoinSet;

const BLOCK: u64 = 1024;

fn config() -> BlockCacheConfig {
    BlockCacheConfig {
        block_size: BLOCK,
        max_blocks_per_file: 64,
        eviction: EvictionOrder::Insertion,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_blocks_are_each_fetched_once() {
    let remote = MockRemote::new();
    remote.set_fetch_delay(Duration::from_millis(20));
    let (_, cache) = block_cache(&remote, config());
    let cache = Arc::new(cache);
    let record = Arc::new(movie("f", 8 * BLOCK));

    let mut set = JoinSet::new();
    for i in 0..8u64 {
        let cache = Arc::clone(&cache);
        let record = Arc::clone(&record);
        set.spawn(async move {
            let data = cache.read_range("/f", &record, BLOCK, i * BLOCK).await.unwrap();
            assert_eq!(&data[..], &pattern(i * BLOCK, BLOCK)[..]);
        });
    }
    while let Some(res) = set.join_next().await {
        res.unwrap();
    }

    let offsets: HashSet<u64> = remote.fetch_calls().iter().map(|c| c.offset).collect();
    assert_eq!(remote.fetch_count(), 8);
    assert_eq!(offsets.len(), 8);
    assert_eq!(cache.cached_blocks(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_on_one_block_share_a_fetch() {
    let remote = MockRemote::new();
    remote.set_fetch_delay(Duration::from_millis(20));
    let (_, cache) = block_cache(&remote, config());
    let cache = Arc::new(cache);
    let record = Arc::new(movie("f", 4 * BLOCK));

    let mut set = JoinSet::new();
    for i in 0..16u64 {
        let cache = Arc::clone(&cache);
        let record = Arc::clone(&record);
        set.spawn(async move {
            let data = cache.read_range("/f", &record, 16, BLOCK + i).await.unwrap();
            assert_eq!(&data[..], &pattern(BLOCK + i, 16)[..]);
        });
    }
    while let Some(res) = set.join_next().await {
        res.unwrap();
    }

    assert_eq!(remote.fetch_count(), 1);
    assert_eq!(remote.resolve_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_reader_still_populates_the_cache() {
    let remote = MockRemote::new();
    remote.set_fetch_delay(Duration::from_millis(50));
    let (_, cache) = block_cache(&remote, config());
    let cache = Arc::new(cache);
    let record = Arc::new(movie("f", 4 * BLOCK));

    let reader = {
        let cache = Arc::clone(&cache);
        let record = Arc::clone(&record);
        tokio::spawn(async move { cache.read_range("/f", &record, 10, 0).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    reader.abort();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(cache.contains("/f", 0));

    let data = cache.read_range("/f", &record, 10, 0).await.unwrap();
    assert_eq!(&data[..], &pattern(0, 10)[..]);
    assert_eq!(remote.fetch_count(), 1);
}
