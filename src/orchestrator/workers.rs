//! Bounded CPU worker pool.
//!
//! Pure-CPU stages run on the blocking pool behind a semaphore sized to the
//! machine. Work units receive owned/immutable inputs and return owned
//! results; no shared mutable state crosses the boundary.

use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self { permits: Arc::new(Semaphore::new(size)), size }
    }

    /// One worker per logical CPU, the default sizing.
    pub fn per_cpu() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run a CPU-bound closure on the blocking pool, bounded by the pool
    /// width. The future resolves with the closure's owned output.
    pub async fn run<T, F>(&self, work: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await.expect("pool semaphore closed");
        let handle = tokio::task::spawn_blocking(move || {
            let out = work();
            drop(permit);
            out
        });
        handle.await.expect("worker task panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_work_and_returns_output() {
        let pool = WorkerPool::new(2);
        let out = pool.run(|| 21 * 2).await;
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn concurrency_stays_within_bound() {
        let pool = WorkerPool::new(2);
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let live = live.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    live.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
    }
}
