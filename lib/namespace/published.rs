//! The currently published namespace snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use super::NamespaceSnapshot;

/// Holds the live snapshot. Readers take an `Arc` per request; the refresh task swaps in whole
/// new snapshots.
///
/// The lock is only held for the duration of an `Arc` clone or an `Arc` store, never across any
/// lookup, so readers never observe a half-built tree.
#[derive(Debug)]
pub struct PublishedNamespace {
    current: RwLock<Arc<NamespaceSnapshot>>,
}

impl PublishedNamespace {
    /// Start with `initial` as the live snapshot.
    #[must_use]
    pub fn new(initial: NamespaceSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The snapshot live right now.
    #[must_use]
    pub fn load(&self) -> Arc<NamespaceSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the live snapshot. Readers holding the previous one keep it until they drop it.
    pub fn publish(&self, next: NamespaceSnapshot) {
        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}
