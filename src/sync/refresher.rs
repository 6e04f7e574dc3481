use crate::{PoolError, ThreadPool};

use once_cell::sync::OnceCell;
use std::sync::Arc;

const POOL_THREAD_NAME: &str = "loading-cache-refresh";
const POOL_QUEUE_CAPACITY: usize = 1024;

/// Hands background refreshes of a `LoadingCache` to a thread pool.
///
/// The pool is the one given to the builder, or a private one created on the
/// first refresh with one thread per available processor.
pub(crate) struct Refresher {
    pool: OnceCell<Arc<ThreadPool>>,
}

impl Refresher {
    pub(crate) fn new(pool: Option<Arc<ThreadPool>>) -> Self {
        let cell = OnceCell::new();
        if let Some(pool) = pool {
            // The cell is empty, so this cannot fail.
            let _ = cell.set(pool);
        }
        Self { pool: cell }
    }

    pub(crate) fn pool(&self) -> &Arc<ThreadPool> {
        self.pool.get_or_init(|| {
            let num_threads = crate::common::available_parallelism();
            Arc::new(ThreadPool::with_config(
                POOL_THREAD_NAME,
                num_threads,
                POOL_QUEUE_CAPACITY,
            ))
        })
    }

    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), PoolError> {
        self.pool().execute(job)
    }
}
