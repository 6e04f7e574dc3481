use crate::common::time::{Clock, Instant};

use parking_lot::RwLock;
use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use triomphe::Arc as TrioArc;

pub(crate) type ErrorObject = Arc<dyn Any + Send + Sync + 'static>;
pub(crate) type WaiterValue<V> = Option<Result<V, ErrorObject>>;

/// The in-flight load (or refresh) of a key.
///
/// The thread running the loader holds the write lock of `value` for the whole
/// load, so any other thread that finds the waiter in the registry blocks on
/// `read` until the result is published. `None` in the slot means the loader
/// panicked, or the result is not for readers (failed refresh).
pub(crate) struct WaiterInner<V> {
    pub(crate) value: RwLock<WaiterValue<V>>,
    cancelled: AtomicBool,
}

impl<V> Default for WaiterInner<V> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
            cancelled: AtomicBool::new(false),
        }
    }
}

impl<V> WaiterInner<V> {
    /// Marks the result as stale. It is still handed to the waiting threads,
    /// but must not be stored in the cache.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

pub(crate) type Waiter<V> = TrioArc<WaiterInner<V>>;

/// What the cache found while holding the segment lock.
pub(crate) enum Slot<V> {
    /// A fresh value. It was inserted by another thread after our first lookup.
    Hit(V),
    /// Somebody else's load is in flight.
    Wait(Waiter<V>),
    /// Our waiter has been registered. We are the loader.
    Registered,
}

pub(crate) enum InitResult<V, E> {
    /// We ran the loader and it returned a value.
    Initialized(V),
    /// The value was found in the cache.
    ReadExisting(V),
    /// We waited for another thread's load.
    Joined(V),
    InitErr(Arc<E>),
}

/// Runs `init` for a key unless another thread is already loading it, in which
/// case the other thread's result is shared.
///
/// - `claim` is called under the segment lock. It looks the key up and, when
///   neither a value nor a waiter exists, registers the given waiter.
/// - `complete` is called with the loaded value (or `None` on failure) and the
///   load time in nanoseconds. It must deregister the waiter and, unless the
///   waiter was cancelled, store the value.
///
/// # Panics
///
/// Panics if the `init` closure panics. Threads waiting on that load retry.
pub(crate) fn try_init_or_read<V, E>(
    clock: &Clock,
    mut claim: impl FnMut(&Waiter<V>) -> Slot<V>,
    init: impl FnOnce() -> Result<V, E>,
    complete: impl FnOnce(&Waiter<V>, Option<&V>, u64),
) -> InitResult<V, E>
where
    V: Clone,
    E: Send + Sync + 'static,
{
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use InitResult::*;

    const MAX_RETRIES: usize = 200;
    let mut retries = 0;

    loop {
        let waiter: Waiter<V> = TrioArc::new(WaiterInner::default());
        let mut lock = waiter.value.write();

        match claim(&waiter) {
            Slot::Hit(value) => return ReadExisting(value),
            Slot::Registered => {
                let start = clock.fast_now();
                // Catching panic is safe here as we do not try to evaluate the
                // closure again.
                let result = catch_unwind(AssertUnwindSafe(init));
                let elapsed = clock.fast_now().saturating_duration_since(start);
                let nanos = Instant::duration_to_saturating_nanoseconds(elapsed);

                match result {
                    Ok(Ok(value)) => {
                        complete(&waiter, Some(&value), nanos);
                        *lock = Some(Ok(value.clone()));
                        return Initialized(value);
                    }
                    Ok(Err(e)) => {
                        complete(&waiter, None, nanos);
                        let err = Arc::new(e);
                        *lock = Some(Err(Arc::clone(&err) as ErrorObject));
                        return InitErr(err);
                    }
                    Err(payload) => {
                        complete(&waiter, None, nanos);
                        *lock = None;
                        // Unlock before unwinding so that the waiting threads can
                        // retry.
                        drop(lock);
                        resume_unwind(payload);
                    }
                } // The write lock will be unlocked here.
            }
            Slot::Wait(other) => {
                // Drop our write lock and wait for the read lock of the other
                // waiter to become available.
                drop(lock);
                match &*other.value.read() {
                    Some(Ok(value)) => return Joined(value.clone()),
                    Some(Err(e)) => {
                        if let Ok(e) = Arc::clone(e).downcast::<E>() {
                            return InitErr(e);
                        }
                        // The error came from a loader of a different type. Load
                        // the value by ourselves.
                    }
                    // The other loader panicked or its result was withheld.
                    None => (),
                }

                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!(
                        "Too many retries. Tried to read the return value from the `init` \
                        closure but failed {retries} times. Maybe the `init` kept panicking?"
                    );
                }
            }
        }
    }
}
