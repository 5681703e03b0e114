//! The TorBox client and its shared request plumbing.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{AUTHORIZATION, HeaderValue, RANGE, USER_AGENT};
use http::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::TorboxError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::models::Envelope;
use crate::resources::{DownloadsResource, LinksResource};
use crate::retry::RetryPolicy;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.torbox.app/v1/api";

const DEFAULT_USER_AGENT: &str = concat!("media-fs/", env!("CARGO_PKG_VERSION"));

/// Connection settings for a [`TorboxClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Account API key, sent as a bearer token and as the `token` query parameter of
    /// download links.
    pub api_key: String,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Retry policy applied to every request.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// A configuration pointing at the public API with default retries.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

pub(crate) struct ClientInner<C: HttpClient> {
    http: C,
    pub(crate) config: ClientConfig,
}

impl<C: HttpClient> ClientInner<C> {
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: &mut HttpRequest) -> Result<(), TorboxError> {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|_| TorboxError::InvalidRequest("API key is not a valid header".into()))?;
        request.headers.insert(AUTHORIZATION, bearer);
        if let Ok(agent) = HeaderValue::from_str(&self.config.user_agent) {
            request.headers.insert(USER_AGENT, agent);
        }
        Ok(())
    }

    /// Send `request`, retrying rate limits and transport failures per the retry policy.
    ///
    /// Any status below 400 is returned as-is, including redirects.
    pub(crate) async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, TorboxError> {
        self.authorize(&mut request)?;
        let policy = self.config.retry;
        let attempts = policy.attempts();

        let mut attempt = 0;
        loop {
            let err = match self.http.send(request.clone()).await {
                Ok(resp) if resp.status.as_u16() < 400 => return Ok(resp),
                Ok(resp) => TorboxError::Api {
                    status: resp.status,
                    detail: error_detail(&resp.body),
                },
                Err(e) => TorboxError::Http(e),
            };

            if !err.is_retryable() {
                return Err(err);
            }
            attempt += 1;
            if attempt >= attempts {
                if attempts == 1 {
                    return Err(err);
                }
                return Err(TorboxError::RetriesExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = policy.delay_for(attempt - 1);
            warn!(url = %request.url, error = %err, ?delay, "request failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    /// `GET` an API path and unwrap the envelope's `data` field.
    ///
    /// Returns `Ok(None)` when the envelope carries no data.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, TorboxError> {
        let mut request = HttpRequest::get(self.url(path));
        request.query = query
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();

        let resp = self.send(request).await?;
        let envelope: Envelope<T> = serde_json::from_slice(&resp.body)?;
        if !envelope.success {
            return Err(TorboxError::Api {
                status: resp.status,
                detail: envelope.detail.unwrap_or_default(),
            });
        }
        Ok(envelope.data)
    }
}

fn error_detail(body: &Bytes) -> String {
    serde_json::from_slice::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|env| env.detail)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

/// Client for the TorBox API, generic over the HTTP backend.
pub struct TorboxClient<C: HttpClient> {
    pub(crate) inner: Arc<ClientInner<C>>,
}

impl<C: HttpClient> Clone for TorboxClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: HttpClient> TorboxClient<C> {
    /// Build a client from a backend and settings.
    #[must_use]
    pub fn new(http: C, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner { http, config }),
        }
    }

    /// The settings this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Account download listings.
    #[must_use]
    pub fn downloads(&self) -> DownloadsResource<'_, C> {
        DownloadsResource::new(self)
    }

    /// Download link construction and resolution.
    #[must_use]
    pub fn links(&self) -> LinksResource<'_, C> {
        LinksResource::new(self)
    }

    /// Fetch `len` bytes starting at `offset` from a resolved download URL.
    ///
    /// Both `200` and `206` are accepted. A `200` carrying the whole file is sliced down to the
    /// requested range. Any other length is reported as [`TorboxError::ShortBody`].
    pub async fn fetch_range(&self, url: &str, offset: u64, len: u64) -> Result<Bytes, TorboxError> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let last = offset
            .checked_add(len - 1)
            .ok_or_else(|| TorboxError::InvalidRequest("range overflows u64".into()))?;

        let mut request = HttpRequest::get(url);
        let range = HeaderValue::from_str(&format!("bytes={offset}-{last}"))
            .map_err(|e| TorboxError::InvalidRequest(e.to_string()))?;
        request.headers.insert(RANGE, range);

        let resp = self.inner.send(request).await?;
        let got = resp.body.len() as u64;
        match resp.status {
            StatusCode::PARTIAL_CONTENT if got == len => Ok(resp.body),
            StatusCode::OK if got == len => Ok(resp.body),
            StatusCode::OK if got > last => {
                debug!(url, "server ignored range header, slicing full body");
                let start = usize::try_from(offset)
                    .map_err(|e| TorboxError::InvalidRequest(e.to_string()))?;
                let end = usize::try_from(last)
                    .map_err(|e| TorboxError::InvalidRequest(e.to_string()))?;
                Ok(resp.body.slice(start..=end))
            }
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => Err(TorboxError::ShortBody {
                expected: len,
                got,
            }),
            status => Err(TorboxError::Api {
                status,
                detail: format!("unexpected status for range request to {url}"),
            }),
        }
    }
}

/// A [`TorboxClient`] backed by `reqwest`.
#[cfg(feature = "reqwest-client")]
pub type Torbox = TorboxClient<crate::backends::ReqwestClient>;

#[cfg(feature = "reqwest-client")]
impl Torbox {
    /// Build a `reqwest`-backed client with the given per-request timeout.
    pub fn with_timeout(
        config: ClientConfig,
        timeout: std::time::Duration,
    ) -> Result<Self, TorboxError> {
        let http = crate::backends::ReqwestClient::new(timeout)?;
        Ok(Self::new(http, config))
    }
}
