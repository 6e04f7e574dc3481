use crate::PoolError;

use parking_lot::{Condvar, Mutex};
use scheduled_thread_pool::ScheduledThreadPool;
use std::{
    cell::Cell,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

const DEFAULT_THREAD_NAME: &str = "loading-cache-refresh";
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

type Job = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    // Address of the `Inner` whose task the current thread is running, or 0.
    static RUNNING_POOL: Cell<usize> = Cell::new(0);
}

/// A fixed-size pool of worker threads running background refreshes of a
/// [`LoadingCache`][loading-cache].
///
/// A pool can be shared by several caches by passing it to
/// [`CacheBuilder::refresh_pool`][refresh-pool]. When no pool is given, a
/// `LoadingCache` creates its own on the first refresh.
///
/// At most `queue_capacity` tasks wait for a worker at any time. When that many
/// are already waiting, [`execute`](#method.execute) returns
/// [`PoolError::QueueFull`] instead of blocking the caller.
///
/// Dropping the last handle stops the pool without waiting. Queued tasks are
/// dropped without being run and the worker threads exit after their current
/// task. Call [`shutdown`](#method.shutdown) to run the queued tasks and wait
/// for them instead.
///
/// [loading-cache]: ./sync/struct.LoadingCache.html
/// [refresh-pool]: ./sync/struct.CacheBuilder.html#method.refresh_pool
pub struct ThreadPool {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    num_threads: usize,
    queue_capacity: usize,
    // `None` once the pool is shut down.
    pool: Mutex<Option<ScheduledThreadPool>>,
    queued: AtomicUsize,
    // Tasks submitted and not yet finished or dropped.
    pending: Mutex<usize>,
    idle: Condvar,
    abandon: AtomicBool,
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.name)
            .field("num_threads", &self.inner.num_threads)
            .field("queue_capacity", &self.inner.queue_capacity)
            .field("queued_tasks", &self.queued_tasks())
            .field("is_shut_down", &self.is_shut_down())
            .finish()
    }
}

impl ThreadPool {
    /// Creates a pool with `num_threads` worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is zero.
    pub fn new(num_threads: usize) -> Self {
        Self::with_config(DEFAULT_THREAD_NAME, num_threads, DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a pool whose threads are named `"{name}-{index}"` and that keeps
    /// at most `queue_capacity` tasks waiting for a worker.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` or `queue_capacity` is zero.
    pub fn with_config(name: &str, num_threads: usize, queue_capacity: usize) -> Self {
        assert!(num_threads > 0, "num_threads must be greater than zero");
        assert!(queue_capacity > 0, "queue_capacity must be greater than zero");

        let template = format!("{name}-{{}}");
        let pool = ScheduledThreadPool::with_name(&template, num_threads);

        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                num_threads,
                queue_capacity,
                pool: Mutex::new(Some(pool)),
                queued: AtomicUsize::new(0),
                pending: Mutex::new(0),
                idle: Condvar::new(),
                abandon: AtomicBool::new(false),
            }),
        }
    }

    /// Submits a task without blocking.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = self.inner.pool.lock();
        let Some(pool) = pool.as_ref() else {
            return Err(PoolError::ShutDown);
        };

        let cap = self.inner.queue_capacity;
        let reserved = self
            .inner
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < cap).then_some(n + 1)
            });
        if reserved.is_err() {
            return Err(PoolError::QueueFull);
        }
        *self.inner.pending.lock() += 1;

        let task = Task {
            inner: Arc::clone(&self.inner),
            job: Some(Box::new(job)),
        };
        pool.execute(move || task.run());
        Ok(())
    }

    /// Stops accepting tasks, runs every task already queued and waits for all
    /// of them to finish.
    ///
    /// When called from a task of this pool, that task is not waited for.
    pub fn shutdown(&self) {
        self.inner.close_and_wait();
    }

    /// Stops accepting tasks, drops the queued ones and waits for the tasks
    /// currently running to finish.
    pub fn shutdown_now(&self) {
        self.inner.abandon.store(true, Ordering::Release);
        self.inner.close_and_wait();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.pool.lock().is_none()
    }

    /// Returns the number of tasks waiting for a worker, not counting the ones
    /// being run.
    pub fn queued_tasks(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    pub fn num_threads(&self) -> usize {
        self.inner.num_threads
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.abandon.store(true, Ordering::Release);
        // The workers drop what is left in the queue and exit.
        let pool = self.inner.pool.lock().take();
        drop(pool);
    }
}

impl Inner {
    fn close_and_wait(&self) {
        // Keep the workers alive until every pending task is finished or dropped.
        let pool = self.pool.lock().take();

        let this = self as *const Inner as usize;
        let floor = RUNNING_POOL.with(|p| usize::from(p.get() == this));
        let mut pending = self.pending.lock();
        while *pending > floor {
            self.idle.wait(&mut pending);
        }
        drop(pending);

        drop(pool);
    }
}

/// A submitted job. Its queue slot and pending count are released when it is
/// run or when it is dropped without being run.
struct Task {
    inner: Arc<Inner>,
    job: Option<Job>,
}

impl Task {
    fn run(mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        self.inner.queued.fetch_sub(1, Ordering::AcqRel);

        if self.inner.abandon.load(Ordering::Acquire) {
            drop(job);
            return;
        }

        let this = Arc::as_ptr(&self.inner) as usize;
        let outer = RUNNING_POOL.with(|p| p.replace(this));
        let result = catch_unwind(AssertUnwindSafe(job));
        RUNNING_POOL.with(|p| p.set(outer));

        if let Err(_payload) = result {
            #[cfg(feature = "logging")]
            crate::common::log_panic(
                &format!(
                    "A task panicked on thread {}",
                    std::thread::current().name().unwrap_or("<unnamed>")
                ),
                &*_payload,
                None,
            );
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.job.take().is_some() {
            // Never started.
            self.inner.queued.fetch_sub(1, Ordering::AcqRel);
        }
        let mut pending = self.inner.pending.lock();
        *pending -= 1;
        self.inner.idle.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadPool;
    use crate::{common::test_utils::wait_until, PoolError};

    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc,
        },
        time::Duration,
    };

    #[test]
    fn runs_submitted_tasks() {
        let pool = ThreadPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            })
            .expect("Failed to submit");
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::Acquire), 10);
        assert!(pool.is_shut_down());
        assert_eq!(pool.execute(|| ()), Err(PoolError::ShutDown));
    }

    #[test]
    fn thread_names_follow_the_template() {
        let pool = ThreadPool::with_config("my-pool", 1, 4);
        let (tx, rx) = mpsc::channel();
        pool.execute(move || {
            let name = std::thread::current().name().map(ToString::to_string);
            tx.send(name).expect("Failed to send");
        })
        .expect("Failed to submit");

        let name = rx.recv_timeout(Duration::from_secs(5)).expect("Timed out");
        assert_eq!(name.as_deref(), Some("my-pool-0"));
        assert_eq!(pool.name(), "my-pool");
        assert_eq!(pool.num_threads(), 1);
    }

    #[test]
    fn full_queue_is_reported() {
        let pool = ThreadPool::with_config("full-queue", 1, 1);
        let (block_tx, block_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();

        // Occupy the only worker.
        pool.execute(move || {
            started_tx.send(()).expect("Failed to send");
            let _ = block_rx.recv();
        })
        .expect("Failed to submit");
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("Timed out");

        // Fill the queue.
        pool.execute(|| ()).expect("Failed to submit");
        assert_eq!(pool.queued_tasks(), 1);
        assert_eq!(pool.execute(|| ()), Err(PoolError::QueueFull));

        block_tx.send(()).expect("Failed to send");
        pool.shutdown();
        assert_eq!(pool.queued_tasks(), 0);
    }

    #[test]
    fn shutdown_now_drops_queued_tasks() {
        let pool = ThreadPool::with_config("shutdown-now", 1, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        let (block_tx, block_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();

        pool.execute(move || {
            started_tx.send(()).expect("Failed to send");
            let _ = block_rx.recv();
        })
        .expect("Failed to submit");
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("Timed out");

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            })
            .expect("Failed to submit");
        }

        // Release the blocked task only after `shutdown_now` has set the flag.
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            block_tx.send(()).expect("Failed to send");
        });
        pool.shutdown_now();
        releaser.join().expect("Failed");

        assert_eq!(counter.load(Ordering::Acquire), 0);
        assert_eq!(pool.queued_tasks(), 0);
        // The dropped tasks released what they captured.
        assert_eq!(Arc::strong_count(&counter), 1);
    }

    #[test]
    fn workers_survive_panicking_tasks() {
        let pool = ThreadPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.execute(|| panic!("boom")).expect("Failed to submit");
        {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            })
            .expect("Failed to submit");
        }

        assert!(wait_until(Duration::from_secs(5), || {
            counter.load(Ordering::Acquire) == 1
        }));
    }

    #[test]
    #[should_panic(expected = "num_threads must be greater than zero")]
    fn zero_threads_panics() {
        let _ = ThreadPool::new(0);
    }
}
