//! Interfaces to the remote account, as consumed by the filesystem core.

use std::future::Future;

use bytes::Bytes;
use thiserror::Error;

use crate::cache::inflight::FlightAborted;
use crate::namespace::FileRecord;

/// A failure talking to the remote account.
///
/// Cloneable so one failed fetch can be reported to every caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Listing the account's files failed.
    #[error("listing failed: {0}")]
    Listing(String),

    /// A download reference could not be turned into a direct URL.
    #[error("link resolution failed: {0}")]
    Resolve(String),

    /// A ranged download failed or returned the wrong number of bytes.
    #[error("range fetch failed: {0}")]
    Fetch(String),

    /// The task performing the request died before producing a result.
    #[error("remote request was aborted")]
    Aborted,
}

impl From<FlightAborted> for RemoteError {
    fn from(_: FlightAborted) -> Self {
        Self::Aborted
    }
}

/// Produces the full list of file records for the account.
pub trait RemoteListing: Send + Sync + 'static {
    /// List every remote file. Called once per refresh cycle.
    fn list_remote_files(
        &self,
    ) -> impl Future<Output = Result<Vec<FileRecord>, RemoteError>> + Send;
}

/// Turns download references into bytes.
pub trait RemoteContent: Send + Sync + 'static {
    /// Resolve `download_ref` into a direct, time-limited URL. May retry internally.
    fn resolve_download_link(
        &self,
        download_ref: &str,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    /// Fetch exactly `size` bytes at `offset` from a resolved URL.
    fn fetch_range(
        &self,
        url: &str,
        size: u64,
        offset: u64,
    ) -> impl Future<Output = Result<Bytes, RemoteError>> + Send;
}
