//! Bounded-concurrency execution of network-bound lookups.
//!
//! The pool caps how many fetches are in flight at once; per-source
//! pacing is the rate limiter's job. Results come back in submission
//! order so callers can zip them against their requests.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

/// Default cap on concurrently running fetches.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Bounded worker pool for independent async lookups.
#[derive(Clone)]
pub struct FetchPool {
    semaphore: Arc<Semaphore>,
}

impl FetchPool {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Runs all futures with at most the configured number in flight.
    /// Output order matches input order.
    pub async fn run_all<F, T>(&self, futures: Vec<F>) -> Vec<T>
    where
        F: std::future::Future<Output = T>,
    {
        let tasks = futures.into_iter().map(|future| {
            let semaphore = Arc::clone(&self.semaphore);
            async move {
                // A closed semaphore only happens at shutdown; run
                // unthrottled rather than lose the result.
                let _permit = semaphore.acquire_owned().await.ok();
                future.await
            }
        });
        join_all(tasks).await
    }
}

impl Default for FetchPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}
