use std::time::Duration;

pub(crate) const MAX_NANOS: u64 = u64::MAX - 1;

/// A point in time measured from the creation of a `Clock`, in nanoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Instant {
    elapsed_ns: u64,
}

impl Instant {
    pub(crate) fn from_nanos(nanos: u64) -> Instant {
        debug_assert!(nanos <= MAX_NANOS);
        Instant { elapsed_ns: nanos }
    }

    pub(crate) fn from_duration_since_clock_start(duration: Duration) -> Instant {
        Instant::from_nanos(Self::duration_to_saturating_nanoseconds(duration))
    }

    /// `Duration::as_nanos` returns `u128`; clamp it to `MAX_NANOS`.
    pub(crate) fn duration_to_saturating_nanoseconds(duration: Duration) -> u64 {
        u64::try_from(duration.as_nanos())
            .map(|n| n.min(MAX_NANOS))
            .unwrap_or(MAX_NANOS)
    }

    pub(crate) fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.saturating_sub(earlier.elapsed_ns))
    }

    /// Returns `true` when at least `duration` has passed between `since` and
    /// `self`.
    pub(crate) fn has_elapsed(&self, since: Instant, duration: Duration) -> bool {
        self.saturating_duration_since(since) >= duration
    }
}
