//! Bounded worker pool for fetch jobs.
//!
//! `submit` waits for a free slot before spawning, so a full pool pushes
//! back on the producer instead of queueing without bound.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use chainscan_core::error::IndexerError;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn `job` once a slot is free. The slot is released when the job
    /// finishes, whether or not its handle is ever joined.
    pub async fn submit<F, T>(&self, job: F) -> Result<JobHandle<T>, IndexerError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| IndexerError::Aborted {
                reason: "worker pool closed".into(),
            })?;
        let handle = tokio::spawn(async move {
            let _permit = permit;
            job.await
        });
        Ok(JobHandle(handle))
    }

    /// Reject further submissions. Running jobs are unaffected.
    pub fn close(&self) {
        self.permits.close();
    }
}

/// Completion handle of one submitted job.
#[derive(Debug)]
pub struct JobHandle<T>(JoinHandle<T>);

impl<T> JobHandle<T> {
    /// Wait for the job. A panicked or cancelled job is reported as
    /// [`IndexerError::Aborted`].
    pub async fn join(self) -> Result<T, IndexerError> {
        self.0.await.map_err(|e| IndexerError::Aborted {
            reason: format!("job did not complete: {e}"),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    pub fn abort(&self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrency_never_exceeds_capacity() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..12u64 {
            let running = running.clone();
            let peak = peak.clone();
            let handle = pool
                .submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i * 2
                })
                .await
                .unwrap();
            handles.push(handle);
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.join().await.unwrap());
        }
        assert_eq!(results, (0..12u64).map(|i| i * 2).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.available(), 3);
    }

    #[tokio::test]
    async fn panicking_job_reports_aborted() {
        let pool = WorkerPool::new(1);
        let handle = pool
            .submit(async {
                panic!("boom");
            })
            .await
            .unwrap();
        let err: IndexerError = handle.join().await.map(|_: ()| ()).unwrap_err();
        assert!(matches!(err, IndexerError::Aborted { .. }));
        // slot returned
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn closed_pool_rejects_submissions() {
        let pool = WorkerPool::new(2);
        pool.close();
        let res = pool.submit(async { 1 }).await;
        assert!(matches!(res, Err(IndexerError::Aborted { .. })));
    }
}
