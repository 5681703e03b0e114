//! Download link resource.

use http::StatusCode;
use http::header::LOCATION;
use tracing::debug;

use crate::client::TorboxClient;
use crate::error::TorboxError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::models::DownloadKind;

/// Builds and resolves `requestdl` links.
pub struct LinksResource<'c, C: HttpClient> {
    client: &'c TorboxClient<C>,
}

impl<'c, C: HttpClient> LinksResource<'c, C> {
    pub(crate) fn new(client: &'c TorboxClient<C>) -> Self {
        Self { client }
    }

    /// The stable `requestdl` URL for one file of one item.
    ///
    /// The URL embeds the API key and asks the server to answer with a redirect, so it can be
    /// stored and resolved later without further context.
    #[must_use]
    pub fn request_url(&self, kind: DownloadKind, item_id: u64, file_id: u64) -> String {
        let inner = &self.client.inner;
        format!(
            "{}?token={}&{}={item_id}&file_id={file_id}&redirect=true",
            inner.url(&format!("/{}/requestdl", kind.path_segment())),
            inner.config.api_key,
            kind.id_param(),
        )
    }

    /// Resolve a `requestdl` URL into the direct URL it redirects to.
    ///
    /// A `302`, `307` or `308` yields its `Location`. Any other successful answer means the URL
    /// is already direct and it is returned unchanged.
    pub async fn resolve(&self, url: &str) -> Result<String, TorboxError> {
        let resp = self.client.inner.send(HttpRequest::get(url)).await?;
        match resp.status {
            StatusCode::FOUND | StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => {
                let location = resp
                    .headers
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| TorboxError::Api {
                        status: resp.status,
                        detail: "redirect without a Location header".into(),
                    })?;
                debug!(status = %resp.status, "resolved download link");
                Ok(location.to_owned())
            }
            _ => Ok(url.to_owned()),
        }
    }
}
