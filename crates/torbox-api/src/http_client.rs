//! HTTP client abstraction for pluggable backends.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::future::Future;

use crate::error::HttpClientError;

/// An HTTP request to be sent by an [`HttpClient`] implementation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// The fully-qualified URL, possibly already carrying a query string.
    pub url: String,
    /// Extra query parameters appended (and encoded) by the backend.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: HeaderMap,
}

impl HttpRequest {
    /// A bodiless `GET` request with no extra headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }
}

/// An HTTP response returned by an [`HttpClient`] implementation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Bytes,
}

/// Trait for pluggable HTTP client backends.
///
/// Backends must not follow redirects: link resolution reads the `Location` header itself.
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request and return the response.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, HttpClientError>> + Send;
}
