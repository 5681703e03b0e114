//! Rust SDK for the TorBox API.
//!
//! Covers the three calls a read-only mount needs: paging through the account's downloads,
//! resolving a download reference into a direct link, and fetching byte ranges from that link.

mod backends;
mod client;
pub mod error;
mod http_client;
pub mod models;
mod pagination;
mod resources;
mod retry;

#[cfg(feature = "reqwest-client")]
pub use backends::ReqwestClient;
#[cfg(feature = "reqwest-client")]
pub use client::Torbox;
pub use client::{ClientConfig, DEFAULT_BASE_URL, TorboxClient};
pub use error::{HttpClientError, TorboxError};
pub use http_client::{HttpClient, HttpRequest, HttpResponse};
pub use pagination::OffsetPager;
pub use resources::{DownloadsResource, LinksResource};
pub use retry::RetryPolicy;
