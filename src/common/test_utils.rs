use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

/// Counts how many times a loader was called, and with which outcome.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    loaded: AtomicU32,
    failed: AtomicU32,
}

impl Counters {
    pub(crate) fn loaded(&self) -> u32 {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn failed(&self) -> u32 {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn incl_loaded(&self) -> u32 {
        self.loaded.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn incl_failed(&self) -> u32 {
        self.failed.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Polls `cond` until it holds or `timeout` passes. Returns the last result.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
