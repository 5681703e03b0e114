//! media-fs shared library: a read-only filesystem over a remote download account.

/// Link and block caching.
pub mod cache;
/// Filesystem surface and FUSE adapter.
pub mod fs;
/// Remote records to directory tree.
pub mod namespace;
/// Periodic namespace refresh.
pub mod refresh;
/// Interfaces to the remote account.
pub mod remote;
