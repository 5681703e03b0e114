#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use media_fs::cache::{BlockCache, BlockCacheConfig, LinkResolver};
use media_fs::cache::link::DEFAULT_LINK_TTL;
use media_fs::namespace::FileRecord;
use media_fs::remote::{RemoteContent, RemoteError, RemoteListing};

pub const MIB: u64 = 1024 * 1024;

/// The byte stored at `offset` of every mock file.
pub fn byte_at(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// The expected contents of `[offset, offset + len)`.
pub fn pattern(offset: u64, len: u64) -> Vec<u8> {
    (offset..offset + len).map(byte_at).collect()
}

/// One recorded `fetch_range` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub url: String,
    pub size: u64,
    pub offset: u64,
}

/// A remote that serves [`pattern`] bytes for every URL and records every call.
#[derive(Default)]
pub struct MockRemote {
    pub resolve_calls: AtomicUsize,
    pub fetches: Mutex<Vec<FetchCall>>,
    pub fail_resolve: AtomicBool,
    pub fail_fetch: AtomicBool,
    /// Serve one byte fewer than asked.
    pub short_fetch: AtomicBool,
    pub fetch_delay: Mutex<Option<Duration>>,

    pub listing: Mutex<Option<Vec<FileRecord>>>,
    pub listing_calls: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn set_listing(&self, records: Option<Vec<FileRecord>>) {
        *self.listing.lock().unwrap() = records;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }
}

impl RemoteContent for MockRemote {
    async fn resolve_download_link(&self, download_ref: &str) -> Result<String, RemoteError> {
        let n = self.resolve_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(RemoteError::Resolve(format!("cannot resolve {download_ref}")));
        }
        Ok(format!("https://cdn.test/{download_ref}?v={n}"))
    }

    async fn fetch_range(&self, url: &str, size: u64, offset: u64) -> Result<Bytes, RemoteError> {
        self.fetches.lock().unwrap().push(FetchCall {
            url: url.to_owned(),
            size,
            offset,
        });
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RemoteError::Fetch(format!("cannot fetch {url}")));
        }
        let len = if self.short_fetch.load(Ordering::SeqCst) {
            size.saturating_sub(1)
        } else {
            size
        };
        Ok(Bytes::from(pattern(offset, len)))
    }
}

impl RemoteListing for MockRemote {
    async fn list_remote_files(&self) -> Result<Vec<FileRecord>, RemoteError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        self.listing
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RemoteError::Listing("listing unavailable".into()))
    }
}

/// A movie record of `size` bytes whose download ref is `name`.
pub fn movie(name: &str, size: u64) -> FileRecord {
    FileRecord::movie(format!("{name} (2020)"), format!("{name}.mkv"), size, name)
}

/// A link resolver and block cache over `remote`.
pub fn block_cache(
    remote: &Arc<MockRemote>,
    config: BlockCacheConfig,
) -> (Arc<LinkResolver<MockRemote>>, BlockCache<MockRemote>) {
    let links = Arc::new(LinkResolver::new(Arc::clone(remote), DEFAULT_LINK_TTL));
    let cache = BlockCache::new(Arc::clone(remote), Arc::clone(&links), config);
    (links, cache)
}
