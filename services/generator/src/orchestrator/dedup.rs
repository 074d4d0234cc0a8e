//! services/generator/src/orchestrator/dedup.rs
//!
//! Collapses concurrent identical jobs into one execution.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::debug;

type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Lets a job's error type report a job task that panicked or was cancelled.
pub trait FromJoinError {
    fn from_join_error(err: JoinError) -> Self;
}

/// In-flight registry keyed by a canonical job key.
///
/// The first caller for a key spawns the job; later callers with the same key
/// await the same outcome. The job runs on its own task, so it completes even
/// if every caller stops waiting, and it removes its registry entry once it
/// settles.
pub struct Deduplicator<T, E> {
    inflight: Arc<Mutex<HashMap<String, SharedOutcome<T, E>>>>,
}

impl<T, E> Default for Deduplicator<T, E> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T, E> Deduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + FromJoinError + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `factory()` unless a job with `key` is already in flight, in which
    /// case the existing job's outcome is shared.
    pub async fn run<F, Fut>(&self, key: String, factory: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = {
            let mut inflight = self.inflight.lock().await;
            if let Some(existing) = inflight.get(&key) {
                debug!(key = %key, "Joining in-flight job");
                existing.clone()
            } else {
                let registry = Arc::clone(&self.inflight);
                let task_key = key.clone();
                let job = factory();
                let handle = tokio::spawn(async move {
                    let outcome = job.await;
                    registry.lock().await.remove(&task_key);
                    outcome
                });
                let shared = async move {
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(err) => Err(E::from_join_error(err)),
                    }
                }
                .boxed()
                .shared();
                inflight.insert(key, shared.clone());
                shared
            }
        };
        shared.await
    }

    pub async fn in_flight(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError(String);

    impl FromJoinError for TestError {
        fn from_join_error(err: JoinError) -> Self {
            Self(err.to_string())
        }
    }

    fn slow_job(
        calls: Arc<AtomicUsize>,
        outcome: Result<u32, TestError>,
    ) -> impl Future<Output = Result<u32, TestError>> + Send + 'static {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            outcome
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_keys_share_one_execution() {
        let dedup = Deduplicator::<u32, TestError>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            dedup.run("k".to_string(), || slow_job(calls.clone(), Ok(7))),
            dedup.run("k".to_string(), || slow_job(calls.clone(), Ok(8))),
        );

        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_failure_reaches_every_caller() {
        let dedup = Deduplicator::<u32, TestError>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = Err(TestError("offline".to_string()));

        let (a, b) = tokio::join!(
            dedup.run("k".to_string(), || slow_job(calls.clone(), failure.clone())),
            dedup.run("k".to_string(), || slow_job(calls.clone(), Ok(1))),
        );

        assert_eq!(a, failure);
        assert_eq!(b, failure);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_run_independently() {
        let dedup = Deduplicator::<u32, TestError>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            dedup.run("a".to_string(), || slow_job(calls.clone(), Ok(1))),
            dedup.run("b".to_string(), || slow_job(calls.clone(), Ok(2))),
        );

        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_key_starts_fresh() {
        let dedup = Deduplicator::<u32, TestError>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = dedup.run("k".to_string(), || slow_job(calls.clone(), Ok(1))).await;
        tokio::task::yield_now().await;
        assert_eq!(dedup.in_flight().await, 0);
        let second = dedup.run("k".to_string(), || slow_job(calls.clone(), Ok(2))).await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_job_still_settles() {
        let dedup = Arc::new(Deduplicator::<u32, TestError>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let dedup = Arc::clone(&dedup);
            let calls = calls.clone();
            tokio::spawn(async move { dedup.run("k".to_string(), || slow_job(calls, Ok(3))).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(dedup.in_flight().await, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
