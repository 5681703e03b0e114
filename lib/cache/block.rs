//! Fixed-size block cache over ranged remote downloads.
//!
//! Files are split into blocks of [`BlockCacheConfig::block_size`] bytes. A read is served by
//! fetching each overlapping block once, with a single ranged request, and slicing the cached
//! blocks. Blocks are stored whole or not at all.
//!
//! The cache holds at most `max_blocks_per_file * active_files` blocks, where `active_files` is
//! the number of files with an unexpired download link. Past that, blocks are evicted in
//! insertion order (FIFO). [`EvictionOrder::Access`] switches to least-recently-used.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Bytes, BytesMut};
use hashlink::LinkedHashMap;
use serde::Deserialize;
use tracing::{debug, instrument, trace};

use crate::cache::inflight::InFlight;
use crate::cache::link::LinkResolver;
use crate::namespace::FileRecord;
use crate::remote::{RemoteContent, RemoteError};

/// 64 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;
/// Blocks budgeted per file with an active link.
pub const DEFAULT_MAX_BLOCKS_PER_FILE: usize = 64;

/// Which block goes first when the cache is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionOrder {
    /// Oldest inserted block first. Hits do not reorder.
    #[default]
    Insertion,
    /// Least recently read block first.
    Access,
}

/// Sizing and eviction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCacheConfig {
    /// Block size in bytes. Zero is treated as one.
    pub block_size: u64,
    /// Blocks budgeted per active file. Zero is treated as one.
    pub max_blocks_per_file: usize,
    /// Eviction order.
    pub eviction: EvictionOrder,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_blocks_per_file: DEFAULT_MAX_BLOCKS_PER_FILE,
            eviction: EvictionOrder::Insertion,
        }
    }
}

/// Identifies one block of one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    /// Namespace path of the file.
    pub path: Arc<str>,
    /// Zero-based block number.
    pub index: u64,
}

struct BlockStore {
    blocks: Mutex<LinkedHashMap<BlockKey, Bytes>>,
    eviction: EvictionOrder,
}

impl BlockStore {
    /// The cached block, if it holds exactly `len` bytes.
    ///
    /// A block of any other length was fetched for an earlier version of the file and is dropped.
    fn get(&self, key: &BlockKey, len: u64) -> Option<Bytes> {
        let mut blocks = self.blocks.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = blocks.get(key)?.clone();
        if bytes.len() as u64 != len {
            debug!(
                path = %key.path,
                index = key.index,
                cached = bytes.len(),
                expected = len,
                "dropping stale block"
            );
            blocks.remove(key);
            return None;
        }
        if self.eviction == EvictionOrder::Access {
            blocks.remove(key);
            blocks.insert(key.clone(), bytes.clone());
        }
        Some(bytes)
    }

    /// Insert `bytes` at the back, then evict down to `budget`.
    fn insert(&self, key: BlockKey, bytes: Bytes, budget: usize) {
        let mut blocks = self.blocks.lock().unwrap_or_else(PoisonError::into_inner);
        blocks.remove(&key);
        blocks.insert(key, bytes);
        evict(&mut blocks, budget);
    }

    /// Evict from the front until at most `budget` blocks remain.
    fn trim(&self, budget: usize) {
        let mut blocks = self.blocks.lock().unwrap_or_else(PoisonError::into_inner);
        evict(&mut blocks, budget);
    }

    fn len(&self) -> usize {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn contains(&self, key: &BlockKey) -> bool {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

fn evict(blocks: &mut LinkedHashMap<BlockKey, Bytes>, budget: usize) {
    while blocks.len() > budget {
        let Some((evicted, _)) = blocks.pop_front() else {
            break;
        };
        trace!(path = %evicted.path, index = evicted.index, "evicted block");
    }
}

/// Serves byte ranges of remote files from cached blocks.
pub struct BlockCache<C> {
    remote: Arc<C>,
    links: Arc<LinkResolver<C>>,
    config: BlockCacheConfig,
    store: Arc<BlockStore>,
    flights: InFlight<BlockKey, Bytes, RemoteError>,
}

impl<C: RemoteContent> BlockCache<C> {
    /// Create a cache fetching through `remote`, with links from `links`.
    #[must_use]
    pub fn new(remote: Arc<C>, links: Arc<LinkResolver<C>>, config: BlockCacheConfig) -> Self {
        let config = BlockCacheConfig {
            block_size: config.block_size.max(1),
            max_blocks_per_file: config.max_blocks_per_file.max(1),
            eviction: config.eviction,
        };
        Self {
            remote,
            links,
            config,
            store: Arc::new(BlockStore {
                blocks: Mutex::new(LinkedHashMap::new()),
                eviction: config.eviction,
            }),
            flights: InFlight::default(),
        }
    }

    /// Effective settings.
    #[must_use]
    pub fn config(&self) -> BlockCacheConfig {
        self.config
    }

    /// The link resolver reads go through.
    #[must_use]
    pub fn links(&self) -> &Arc<LinkResolver<C>> {
        &self.links
    }

    /// Number of blocks currently cached.
    #[must_use]
    pub fn cached_blocks(&self) -> usize {
        self.store.len()
    }

    /// Whether block `index` of `path` is cached.
    #[must_use]
    pub fn contains(&self, path: &str, index: u64) -> bool {
        self.store.contains(&BlockKey {
            path: Arc::from(path),
            index,
        })
    }

    /// Current block budget.
    #[must_use]
    pub fn budget(&self) -> usize {
        budget(&self.links, self.config.max_blocks_per_file)
    }

    /// Read up to `size` bytes at `offset` from the file at `path`.
    ///
    /// The result is `min(size, file_size - offset)` bytes long, and empty at or past the end of
    /// the file. A failure on any block fails the whole read.
    #[instrument(name = "BlockCache::read_range", skip(self, record), fields(file_size = record.file_size))]
    pub async fn read_range(
        &self,
        path: &str,
        record: &FileRecord,
        size: u64,
        offset: u64,
    ) -> Result<Bytes, RemoteError> {
        if size == 0 || offset >= record.file_size {
            return Ok(Bytes::new());
        }
        let end = offset.saturating_add(size).min(record.file_size);
        let url = self.links.resolve(path, record).await?;

        let bs = self.config.block_size;
        let first = offset / bs;
        let last = (end - 1) / bs;
        let key_path: Arc<str> = Arc::from(path);

        let mut parts = Vec::new();
        for index in first..=last {
            let key = BlockKey {
                path: Arc::clone(&key_path),
                index,
            };
            let block = self.block(key, &url, record.file_size).await?;
            let block_start = index * bs;
            let expected = bs.min(record.file_size - block_start);
            if block.len() as u64 != expected {
                // A fetch started for another version of the file was shared with this read.
                return Err(RemoteError::Fetch(format!(
                    "block {index} of {path} holds {} bytes, expected {expected}",
                    block.len()
                )));
            }
            let from = offset.max(block_start) - block_start;
            let to = end.min(block_start + expected) - block_start;
            parts.push(block.slice(to_usize(from)?..to_usize(to)?));
        }
        // Links expire without a read, so the budget can shrink between inserts.
        self.store.trim(self.budget());

        if let [only] = parts.as_slice() {
            return Ok(only.clone());
        }
        let mut out = BytesMut::with_capacity(to_usize(end - offset)?);
        for part in parts {
            out.extend_from_slice(&part);
        }
        Ok(out.freeze())
    }

    async fn block(&self, key: BlockKey, url: &str, file_size: u64) -> Result<Bytes, RemoteError> {
        let start = key.index * self.config.block_size;
        let len = self.config.block_size.min(file_size - start);
        if let Some(hit) = self.store.get(&key, len) {
            trace!(path = %key.path, index = key.index, "block hit");
            return Ok(hit);
        }

        let store = Arc::clone(&self.store);
        let remote = Arc::clone(&self.remote);
        let links = Arc::clone(&self.links);
        let per_file = self.config.max_blocks_per_file;
        let url = url.to_owned();
        let flight_key = key.clone();

        self.flights
            .run(flight_key, move || async move {
                if let Some(hit) = store.get(&key, len) {
                    return Ok(hit);
                }
                debug!(path = %key.path, index = key.index, start, len, "fetching block");
                let bytes = remote.fetch_range(&url, len, start).await?;
                if bytes.len() as u64 != len {
                    return Err(RemoteError::Fetch(format!(
                        "block {} of {} returned {} bytes, expected {len}",
                        key.index,
                        key.path,
                        bytes.len()
                    )));
                }
                store.insert(key, bytes.clone(), budget(&links, per_file));
                Ok(bytes)
            })
            .await
    }
}

fn budget<C: RemoteContent>(links: &LinkResolver<C>, per_file: usize) -> usize {
    per_file.saturating_mul(links.active_files().max(1))
}

fn to_usize(n: u64) -> Result<usize, RemoteError> {
    usize::try_from(n).map_err(|_| RemoteError::Fetch(format!("range of {n} bytes is too large")))
}
