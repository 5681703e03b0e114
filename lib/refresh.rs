//! Periodic rebuild and publication of the namespace.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::namespace::{self, NamespaceMode, PublishedNamespace};
use crate::remote::RemoteListing;

/// Default time between refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// What one refresh cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot went live.
    Published {
        /// Files in the new snapshot.
        files: usize,
        /// Records the builder dropped.
        skipped: usize,
    },
    /// The listing came back empty; the previous snapshot stays live.
    Empty,
    /// The listing failed; the previous snapshot stays live.
    Failed,
}

/// Rebuilds the namespace from the remote listing on a fixed interval.
pub struct Refresher<L> {
    listing: Arc<L>,
    namespace: Arc<PublishedNamespace>,
    mode: NamespaceMode,
    interval: Duration,
}

impl<L: RemoteListing> Refresher<L> {
    /// Create a refresher publishing into `namespace`.
    #[must_use]
    pub fn new(
        listing: Arc<L>,
        namespace: Arc<PublishedNamespace>,
        mode: NamespaceMode,
        interval: Duration,
    ) -> Self {
        Self {
            listing,
            namespace,
            mode,
            interval,
        }
    }

    /// List, build and publish once. Never fails; problems are logged and reported as the outcome.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let records = match self.listing.list_remote_files().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "failed to list remote files, keeping current namespace");
                return RefreshOutcome::Failed;
            }
        };
        if records.is_empty() {
            warn!("remote listing is empty, keeping current namespace");
            return RefreshOutcome::Empty;
        }

        let mode = self.mode;
        let snapshot = match tokio::task::spawn_blocking(move || namespace::build(records, mode)).await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "namespace build did not complete");
                return RefreshOutcome::Failed;
            }
        };
        let files = snapshot.file_count();
        let skipped = snapshot.skipped();
        self.namespace.publish(snapshot);
        info!(files, skipped, "published namespace");
        RefreshOutcome::Published { files, skipped }
    }

    /// Run [`refresh_once`](Self::refresh_once) every interval, starting one interval from now,
    /// until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.interval.max(Duration::from_secs(1));
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.refresh_once().await;
            }
        })
    }
}
