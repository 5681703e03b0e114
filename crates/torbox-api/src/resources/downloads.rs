//! Download listing resource.

use crate::client::TorboxClient;
use crate::error::TorboxError;
use crate::http_client::HttpClient;
use crate::models::{Download, DownloadKind};
use crate::pagination::OffsetPager;

/// Page size used by [`DownloadsResource::list_all`].
pub const PAGE_LIMIT: usize = 1000;

/// Operations on the account's download list.
pub struct DownloadsResource<'c, C: HttpClient> {
    client: &'c TorboxClient<C>,
}

impl<'c, C: HttpClient> DownloadsResource<'c, C> {
    pub(crate) fn new(client: &'c TorboxClient<C>) -> Self {
        Self { client }
    }

    /// A pager over every item of `kind`, bypassing the server-side listing cache.
    #[must_use]
    pub fn list_all(&self, kind: DownloadKind) -> OffsetPager<C, Download> {
        OffsetPager::new(
            self.client.inner.clone(),
            format!("/{}/mylist", kind.path_segment()),
            vec![("bypass_cache", "true".to_owned())],
            PAGE_LIMIT,
        )
    }

    /// Every item of `kind`, across all pages.
    pub async fn list(&self, kind: DownloadKind) -> Result<Vec<Download>, TorboxError> {
        self.list_all(kind).collect().await
    }
}
