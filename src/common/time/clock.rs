use super::Instant;

use std::time::{Duration, Instant as StdInstant};

#[cfg(test)]
use parking_lot::Mutex;
#[cfg(test)]
use std::sync::Arc;

/// Where a cache reads the time. Every `Instant` it hands out is the time passed
/// since the clock was created.
#[derive(Clone, Default)]
pub(crate) struct Clock {
    source: Source,
}

#[derive(Clone)]
enum Source {
    /// `std::time::Instant` only.
    #[cfg_attr(feature = "quanta", allow(dead_code))]
    Standard { start: StdInstant },
    /// Entry timestamps from `std::time::Instant`, load timings from the cheaper
    /// `quanta::Instant`.
    #[cfg(feature = "quanta")]
    Hybrid {
        start: StdInstant,
        timer_start: quanta::Instant,
    },
    /// Moves only when a test advances it.
    #[cfg(test)]
    Mocked(Arc<Mock>),
}

impl Default for Source {
    #[cfg(feature = "quanta")]
    fn default() -> Self {
        Source::Hybrid {
            start: StdInstant::now(),
            timer_start: quanta::Instant::now(),
        }
    }

    #[cfg(not(feature = "quanta"))]
    fn default() -> Self {
        Source::Standard {
            start: StdInstant::now(),
        }
    }
}

impl Clock {
    #[cfg(test)]
    pub(crate) fn mock() -> (Clock, Arc<Mock>) {
        let mock = Arc::new(Mock::default());
        let clock = Clock {
            source: Source::Mocked(Arc::clone(&mock)),
        };
        (clock, mock)
    }

    /// The time used for write and access timestamps.
    pub(crate) fn now(&self) -> Instant {
        Instant::from_duration_since_clock_start(self.since_start())
    }

    /// The time used to measure loads. May be cheaper to read than `now` and
    /// must not be compared with its values.
    pub(crate) fn fast_now(&self) -> Instant {
        #[cfg(feature = "quanta")]
        {
            if let Source::Hybrid { timer_start, .. } = &self.source {
                return Instant::from_duration_since_clock_start(timer_start.elapsed());
            }
        }
        self.now()
    }

    fn since_start(&self) -> Duration {
        match &self.source {
            Source::Standard { start } => start.elapsed(),
            #[cfg(feature = "quanta")]
            Source::Hybrid { start, .. } => start.elapsed(),
            #[cfg(test)]
            Source::Mocked(mock) => *mock.elapsed.lock(),
        }
    }
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct Mock {
    elapsed: Mutex<Duration>,
}

#[cfg(test)]
impl Mock {
    pub(crate) fn increment(&self, amount: Duration) {
        *self.elapsed.lock() += amount;
    }
}
