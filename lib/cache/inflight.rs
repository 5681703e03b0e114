//! Coalescing of concurrent async fetches.
//!
//! [`InFlight::run`] guarantees that at most one factory future runs per key at a time. Callers
//! arriving while one is running await the same [`Shared`] future and receive a clone of its
//! result. The factory runs on its own task, so it completes and publishes its side effects even
//! if every caller is cancelled.
//!
//! Nothing is retained once the factory finishes: the task removes its own entry, and the next
//! call for the key starts a fresh flight. Callers cache results elsewhere.

use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt as _;
use futures::future::Shared;

type SharedFut<T> = Shared<Pin<Box<dyn Future<Output = Option<T>> + Send>>>;

/// Reported to waiters when the factory panicked or its task was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightAborted;

struct Flight<V, E> {
    id: u64,
    fut: SharedFut<Result<V, E>>,
}

/// Per-key deduplication of in-progress async work.
pub struct InFlight<K, V, E> {
    map: Arc<scc::HashMap<K, Flight<V, E>>>,
    next_id: AtomicU64,
}

impl<K, V, E> Default for InFlight<K, V, E>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            map: Arc::new(scc::HashMap::default()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, V, E> InFlight<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<FlightAborted> + 'static,
{
    /// Await the flight for `key`, starting one with `factory` if none is running.
    ///
    /// `factory` is only called when this caller starts the flight, and must not block.
    pub async fn run<F, Fut>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let shared = match self.map.entry_async(key.clone()).await {
            scc::hash_map::Entry::Occupied(occ) => occ.get().fut.clone(),
            scc::hash_map::Entry::Vacant(vac) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let fut = self.launch(key, id, factory());
                vac.insert_entry(Flight {
                    id,
                    fut: fut.clone(),
                });
                fut
            }
        };

        shared.await.unwrap_or_else(|| Err(E::from(FlightAborted)))
    }

    /// Number of flights currently running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no flight is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn launch<Fut>(&self, key: K, id: u64, work: Fut) -> SharedFut<Result<V, E>>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let map = Arc::clone(&self.map);
        let task = tokio::spawn(async move {
            let out = AssertUnwindSafe(work).catch_unwind().await.ok();
            // Only our own entry; a later flight for the key may already be registered.
            drop(map.remove_if_async(&key, |f| f.id == id).await);
            out
        });
        let boxed: Pin<Box<dyn Future<Output = Option<Result<V, E>>> + Send>> =
            Box::pin(async move { task.await.ok().flatten() });
        boxed.shared()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Failed,
        Aborted,
    }

    impl From<FlightAborted> for TestError {
        fn from(_: FlightAborted) -> Self {
            Self::Aborted
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_factory_run() {
        let flights: Arc<InFlight<u32, u32, TestError>> = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flights
                    .run(1, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(7)
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finished_flights_are_forgotten() {
        let flights: InFlight<u32, u32, TestError> = InFlight::default();
        assert_eq!(
            flights.run(1, || async { Err(TestError::Failed) }).await,
            Err(TestError::Failed)
        );
        assert_eq!(flights.run(1, || async { Ok(2) }).await, Ok(2));
        tokio::task::yield_now().await;
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn cancelled_caller_does_not_cancel_the_work() {
        let flights: Arc<InFlight<u32, u32, TestError>> = Arc::default();
        let done = Arc::new(AtomicUsize::new(0));

        let done_in = Arc::clone(&done);
        let caller = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run(5, || async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        done_in.fetch_add(1, Ordering::SeqCst);
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn panicking_factory_reports_aborted() {
        let flights: InFlight<u32, u32, TestError> = InFlight::default();
        let out = flights
            .run(9, || async {
                let missing: Option<u32> = None;
                Ok(missing.expect("factory blew up"))
            })
            .await;
        assert_eq!(out, Err(TestError::Aborted));
        assert_eq!(flights.run(9, || async { Ok(3) }).await, Ok(3));
    }
}
