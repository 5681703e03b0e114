//! Offset-based pagination support.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::client::ClientInner;
use crate::error::TorboxError;
use crate::http_client::HttpClient;

/// Walks an `offset`/`limit` listing endpoint one page at a time.
///
/// A page shorter than `limit` (or an empty `data` field) ends the walk.
pub struct OffsetPager<C: HttpClient, T> {
    inner: Arc<ClientInner<C>>,
    path: String,
    extra_query: Vec<(&'static str, String)>,
    limit: usize,
    offset: usize,
    done: bool,
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<C: HttpClient, T: DeserializeOwned> OffsetPager<C, T> {
    pub(crate) fn new(
        inner: Arc<ClientInner<C>>,
        path: String,
        extra_query: Vec<(&'static str, String)>,
        limit: usize,
    ) -> Self {
        Self {
            inner,
            path,
            extra_query,
            limit: limit.max(1),
            offset: 0,
            done: false,
            _item: std::marker::PhantomData,
        }
    }

    /// Fetch the next page.
    ///
    /// Returns `Ok(None)` once every page has been read.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, TorboxError> {
        if self.done {
            return Ok(None);
        }

        let mut query = self.extra_query.clone();
        query.push(("limit", self.limit.to_string()));
        query.push(("offset", self.offset.to_string()));

        let page: Vec<T> = self
            .inner
            .get_json(&self.path, &query)
            .await?
            .unwrap_or_default();

        self.offset += page.len();
        self.done = page.len() < self.limit;
        if page.is_empty() {
            return Ok(None);
        }
        Ok(Some(page))
    }

    /// Collect every remaining item into a `Vec`.
    pub async fn collect(mut self) -> Result<Vec<T>, TorboxError> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}
