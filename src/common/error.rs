/// The error type returned when a task cannot be handed to a
/// [`ThreadPool`][thread-pool].
///
/// Caches never surface this error to readers. A refresh that cannot be
/// submitted is dropped and logged, and the entry keeps serving its current
/// value.
///
/// [thread-pool]: ./struct.ThreadPool.html
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The bounded task queue of the pool is full.
    #[error("the task queue of the thread pool is full")]
    QueueFull,
    /// The pool has been shut down and accepts no more tasks.
    #[error("the thread pool has been shut down")]
    ShutDown,
}
