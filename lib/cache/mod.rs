/// Fixed-size block cache over ranged downloads.
pub mod block;
/// Coalescing of concurrent fetches for the same key.
pub mod inflight;
/// Download link cache with expiry.
pub mod link;

pub use block::{BlockCache, BlockCacheConfig, EvictionOrder};
pub use link::{LinkResolver, ResolvedLink};
