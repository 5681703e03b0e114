//! Time-limited download link cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::cache::inflight::InFlight;
use crate::namespace::FileRecord;
use crate::remote::{RemoteContent, RemoteError};

/// How long a resolved link is trusted.
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// A direct URL and when it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// The direct download URL.
    pub url: String,
    /// When the remote handed it out.
    pub resolved_at: Instant,
}

impl ResolvedLink {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.resolved_at) <= ttl
    }
}

/// Resolves file records into direct URLs, caching each per file path until it expires.
///
/// Concurrent resolutions of the same path share one remote call. Failures are returned to every
/// waiting caller and leave nothing behind, so the next read tries again.
pub struct LinkResolver<C> {
    remote: Arc<C>,
    ttl: Duration,
    links: Arc<scc::HashMap<String, ResolvedLink>>,
    flights: InFlight<String, String, RemoteError>,
}

impl<C: RemoteContent> LinkResolver<C> {
    /// Create a resolver that trusts links for `ttl`.
    #[must_use]
    pub fn new(remote: Arc<C>, ttl: Duration) -> Self {
        Self {
            remote,
            ttl,
            links: Arc::new(scc::HashMap::new()),
            flights: InFlight::default(),
        }
    }

    /// The configured time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A direct URL for the file at `path`, resolving through the remote on a miss or expiry.
    #[instrument(name = "LinkResolver::resolve", skip(self, record))]
    pub async fn resolve(&self, path: &str, record: &FileRecord) -> Result<String, RemoteError> {
        if let Some(url) = fresh_url(&self.links, path, self.ttl).await {
            return Ok(url);
        }

        let remote = Arc::clone(&self.remote);
        let links = Arc::clone(&self.links);
        let ttl = self.ttl;
        let key = path.to_owned();
        let download_ref = record.download_ref.clone();

        self.flights
            .run(path.to_owned(), move || async move {
                // A flight that finished between our miss and this one may have filled the slot.
                if let Some(url) = fresh_url(&links, &key, ttl).await {
                    return Ok(url);
                }
                let url = remote.resolve_download_link(&download_ref).await?;
                links
                    .upsert_async(
                        key.clone(),
                        ResolvedLink {
                            url: url.clone(),
                            resolved_at: Instant::now(),
                        },
                    )
                    .await;
                debug!(path = %key, "resolved download link");
                Ok(url)
            })
            .await
    }

    /// The cached link for `path`, fresh or not.
    #[must_use]
    pub fn cached(&self, path: &str) -> Option<ResolvedLink> {
        self.links.read_sync(path, |_, link| link.clone())
    }

    /// Number of files with an unexpired link. Expired links are dropped as a side effect.
    pub fn active_files(&self) -> usize {
        let now = Instant::now();
        self.links
            .retain_sync(|_, link| link.is_fresh(now, self.ttl));
        self.links.len()
    }
}

async fn fresh_url(
    links: &scc::HashMap<String, ResolvedLink>,
    path: &str,
    ttl: Duration,
) -> Option<String> {
    let now = Instant::now();
    links
        .read_async(path, |_, link| link.is_fresh(now, ttl).then(|| link.url.clone()))
        .await
        .flatten()
}
