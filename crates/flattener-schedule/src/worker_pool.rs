//! Bounded worker pool: caps total in-flight domain
//! tasks regardless of how many provider groups they belong to. Grounded
//! on the `Arc<Semaphore>` concurrency-cap pattern used by the scheduled
//! delivery worker this crate's scheduler generalizes.

use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

/// The cross-component default worker-pool size.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 5;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    pub fn default_size() -> Self {
        Self::new(DEFAULT_WORKER_POOL_SIZE)
    }

    /// Acquire one permit, suspending the caller until one is free. The
    /// returned guard releases the permit on drop.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("worker pool semaphore is never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn caps_total_concurrency() {
        let pool = Arc::new(WorkerPool::new(2));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let _permit = pool.acquire().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // With 2 permits and 4 tasks of 50ms each, the pool needs at
        // least two waves, i.e. >= ~100ms wall clock.
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
