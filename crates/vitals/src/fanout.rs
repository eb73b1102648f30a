//! Bounded concurrent fan-out.
//!
//! Dispatches many independent check invocations under a worker-pool limit.
//! Results stay attributed to their originating work item by explicit key,
//! never by completion order. An interrupt abandons in-flight work and
//! surfaces as [`VitalsError::Cancelled`]; the caller must not print a
//! partial table for that run.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::VitalsError;

/// A bounded fan-out pool. Cheap to construct; one per fan-out call site.
#[derive(Debug, Clone, Copy)]
pub struct Fanout {
    limit: usize,
}

impl Fanout {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    /// Secondary pool for fan-outs nested inside a worker.
    ///
    /// Kept at roughly a fifth of the outer pool so total concurrency stays
    /// bounded by `outer * inner`.
    #[must_use]
    pub fn inner(&self) -> Self {
        Self::new((self.limit / 5).max(2))
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `worker` over all items, at most `limit` concurrently.
    ///
    /// Returns `(key, result)` pairs in submission order. On SIGINT all
    /// outstanding tasks are aborted and `Cancelled` is returned instead of
    /// partial results.
    pub async fn run<K, I, T, F, Fut>(
        &self,
        items: Vec<(K, I)>,
        worker: F,
    ) -> Result<Vec<(K, T)>, VitalsError>
    where
        K: Send + 'static,
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let total = items.len();
        debug!(total, limit = self.limit, "starting fan-out");

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut keys: Vec<Option<K>> = Vec::with_capacity(total);
        let mut set = JoinSet::new();

        for (idx, (key, item)) in items.into_iter().enumerate() {
            keys.push(Some(key));
            let semaphore = Arc::clone(&semaphore);
            let fut = worker(item);
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("fan-out semaphore is never closed");
                (idx, fut.await)
            });
        }

        let mut slots: Vec<Option<(K, T)>> = (0..total).map(|_| None).collect();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupt received, abandoning in-flight checks");
                    set.abort_all();
                    return Err(VitalsError::Cancelled);
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((idx, value))) => {
                        if let Some(key) = keys[idx].take() {
                            slots[idx] = Some((key, value));
                        }
                    }
                    Some(Err(err)) if err.is_cancelled() => {}
                    Some(Err(err)) => warn!(%err, "fan-out worker panicked"),
                },
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn results_keep_submission_order() {
        let items: Vec<(usize, u64)> = (0..8).map(|i| (i, 8 - i as u64)).collect();
        let pool = Fanout::new(4);
        let results = pool
            .run(items, |delay| async move {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                delay
            })
            .await
            .unwrap();

        let keys: Vec<usize> = results.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (0..8).collect::<Vec<_>>());
        for (key, value) in results {
            assert_eq!(value, 8 - key as u64);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_stays_bounded() {
        static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);

        let items: Vec<(usize, ())> = (0..16).map(|i| (i, ())).collect();
        let pool = Fanout::new(3);
        pool.run(items, |()| async {
            let now = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
            PEAK.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert!(PEAK.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let pool = Fanout::new(10);
        let results: Vec<(String, ())> = pool
            .run(Vec::<(String, ())>::new(), |()| async {})
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn inner_pool_is_a_fifth_of_outer() {
        assert_eq!(Fanout::new(30).inner().limit(), 6);
        assert_eq!(Fanout::new(10).inner().limit(), 2);
        assert_eq!(Fanout::new(3).inner().limit(), 2);
    }
}
