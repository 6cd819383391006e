//! Worker pool service handed to generators and the map.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::Result;

/// Shared FIFO worker pool. Cheap to clone; every clone drives the same threads.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    inner: Arc<ThreadPool>,
}

impl WorkerPool {
    /// Builds a pool with `threads` workers; `0` lets rayon choose.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("map-worker-{index}"))
            .build()?;
        Ok(Self { inner: Arc::new(pool) })
    }

    pub fn threads(&self) -> usize {
        self.inner.current_num_threads()
    }

    /// Runs `op` inside the pool so nested parallel iterators use its workers.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.inner.install(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::thread;

    #[test]
    fn pool_reports_requested_thread_count() {
        let pool = WorkerPool::new(3).expect("pool should build");
        assert_eq!(pool.threads(), 3);
    }

    #[test]
    fn install_runs_parallel_work_on_the_pool() {
        let pool = WorkerPool::new(2).expect("pool should build");
        let names: Vec<String> = pool.install(|| {
            (0..8)
                .into_par_iter()
                .map(|_| thread::current().name().unwrap_or_default().to_string())
                .collect()
        });
        assert!(names.iter().all(|name| name.starts_with("map-worker-")));
    }
}
