use std::{
    fmt::{self, Debug},
    ops::{Add, Sub},
};

/// Statistics about the performance of a cache.
///
/// A `CacheStats` is an immutable snapshot taken by the `stats` method of a
/// cache. It is not transactionally consistent with concurrent operations; each
/// counter reflects its own value at the time of the call.
///
/// Cache statistics are incremented according to the following rules:
///
/// - When a lookup finds a fresh entry, `hit_count` is incremented.
/// - When `get_if_present` finds no fresh entry, `miss_count` is incremented.
/// - When a `get` family method finds no fresh entry _and_ no load in flight for
///   the key, `miss_count` is incremented and the caller loads the value:
///     - After a successful load, `load_success_count` is incremented and the
///       loading time, in nanoseconds, is added to `total_load_time_nanos`.
///     - After a failed load, `load_failure_count` is incremented and the loading
///       time is added to `total_load_time_nanos`.
/// - When a `get` family method joins a load already in flight for the same
///   key, it waits for that load and modifies none of the counters.
/// - A background refresh counts as a load: it increments `load_success_count` or
///   `load_failure_count` and adds to `total_load_time_nanos`, but never touches
///   `hit_count` or `miss_count`.
/// - When an entry is removed because the cache is over capacity,
///   `eviction_by_size_count` is incremented. When an expired entry is removed,
///   `eviction_by_expiration_count` is incremented. `eviction_count` is the sum of
///   both.
/// - No stats are modified when an entry is inserted, replaced or invalidated
///   by the user.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    hit_count: u64,
    miss_count: u64,
    load_success_count: u64,
    load_failure_count: u64,
    total_load_time_nanos: u64,
    eviction_by_size_count: u64,
    eviction_by_expiration_count: u64,
}

impl Debug for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStats")
            .field("request_count", &self.request_count())
            .field("hit_count", &self.hit_count)
            .field("hit_rate", &self.hit_rate())
            .field("miss_count", &self.miss_count)
            .field("miss_rate", &self.miss_rate())
            .field("load_count", &self.load_count())
            .field("load_success_count", &self.load_success_count)
            .field("load_failure_count", &self.load_failure_count)
            .field("load_failure_rate", &self.load_failure_rate())
            .field("total_load_time_nanos", &self.total_load_time_nanos)
            .field(
                "average_load_penalty_nanos",
                &self.average_load_penalty_nanos(),
            )
            .field("eviction_count", &self.eviction_count())
            .field("eviction_by_size_count", &self.eviction_by_size_count)
            .field(
                "eviction_by_expiration_count",
                &self.eviction_by_expiration_count,
            )
            .finish()
    }
}

impl CacheStats {
    pub(crate) fn set_req_counts(&mut self, hit_count: u64, miss_count: u64) -> &mut Self {
        self.hit_count = hit_count;
        self.miss_count = miss_count;
        self
    }

    pub(crate) fn set_load_counts(
        &mut self,
        load_success_count: u64,
        load_failure_count: u64,
        total_load_time_nanos: u64,
    ) -> &mut Self {
        self.load_success_count = load_success_count;
        self.load_failure_count = load_failure_count;
        self.total_load_time_nanos = total_load_time_nanos;
        self
    }

    pub(crate) fn set_eviction_counts(
        &mut self,
        eviction_by_size_count: u64,
        eviction_by_expiration_count: u64,
    ) -> &mut Self {
        self.eviction_by_size_count = eviction_by_size_count;
        self.eviction_by_expiration_count = eviction_by_expiration_count;
        self
    }

    /// Returns `hit_count + miss_count`.
    pub fn request_count(&self) -> u64 {
        self.hit_count.saturating_add(self.miss_count)
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    /// Returns `1.0` when no request has been made yet.
    pub fn hit_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            1.0
        } else {
            self.hit_count as f64 / req_count as f64
        }
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count
    }

    pub fn miss_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            0.0
        } else {
            self.miss_count as f64 / req_count as f64
        }
    }

    /// Returns `load_success_count + load_failure_count`.
    pub fn load_count(&self) -> u64 {
        self.load_success_count
            .saturating_add(self.load_failure_count)
    }

    pub fn load_success_count(&self) -> u64 {
        self.load_success_count
    }

    /// The number of loads (including background refreshes) that returned an
    /// error or panicked.
    pub fn load_failure_count(&self) -> u64 {
        self.load_failure_count
    }

    pub fn load_failure_rate(&self) -> f64 {
        let load_count = self.load_count();
        if load_count == 0 {
            0.0
        } else {
            self.load_failure_count as f64 / load_count as f64
        }
    }

    pub fn total_load_time_nanos(&self) -> u64 {
        self.total_load_time_nanos
    }

    pub fn average_load_penalty_nanos(&self) -> f64 {
        let load_count = self.load_count();
        if load_count == 0 {
            0.0
        } else {
            self.total_load_time_nanos as f64 / load_count as f64
        }
    }

    /// Returns the number of entries evicted, either by size or by expiration.
    pub fn eviction_count(&self) -> u64 {
        self.eviction_by_size_count
            .saturating_add(self.eviction_by_expiration_count)
    }

    pub fn eviction_by_size_count(&self) -> u64 {
        self.eviction_by_size_count
    }

    pub fn eviction_by_expiration_count(&self) -> u64 {
        self.eviction_by_expiration_count
    }
}

// `Add` is implemented for `&CacheStats` so that the striped counter can fold
// snapshots without cloning them.
impl Add for &CacheStats {
    type Output = CacheStats;

    fn add(self, rhs: Self) -> Self::Output {
        CacheStats {
            hit_count: self.hit_count.saturating_add(rhs.hit_count),
            miss_count: self.miss_count.saturating_add(rhs.miss_count),
            load_success_count: self
                .load_success_count
                .saturating_add(rhs.load_success_count),
            load_failure_count: self
                .load_failure_count
                .saturating_add(rhs.load_failure_count),
            total_load_time_nanos: self
                .total_load_time_nanos
                .saturating_add(rhs.total_load_time_nanos),
            eviction_by_size_count: self
                .eviction_by_size_count
                .saturating_add(rhs.eviction_by_size_count),
            eviction_by_expiration_count: self
                .eviction_by_expiration_count
                .saturating_add(rhs.eviction_by_expiration_count),
        }
    }
}

/// Subtracting an earlier snapshot from a later one gives the activity in
/// between.
impl Sub for CacheStats {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            hit_count: self.hit_count.saturating_sub(rhs.hit_count),
            miss_count: self.miss_count.saturating_sub(rhs.miss_count),
            load_success_count: self
                .load_success_count
                .saturating_sub(rhs.load_success_count),
            load_failure_count: self
                .load_failure_count
                .saturating_sub(rhs.load_failure_count),
            total_load_time_nanos: self
                .total_load_time_nanos
                .saturating_sub(rhs.total_load_time_nanos),
            eviction_by_size_count: self
                .eviction_by_size_count
                .saturating_sub(rhs.eviction_by_size_count),
            eviction_by_expiration_count: self
                .eviction_by_expiration_count
                .saturating_sub(rhs.eviction_by_expiration_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CacheStats;

    fn stats(hits: u64, misses: u64, ok: u64, failed: u64, nanos: u64) -> CacheStats {
        let mut stats = CacheStats::default();
        stats
            .set_req_counts(hits, misses)
            .set_load_counts(ok, failed, nanos)
            .set_eviction_counts(2, 1);
        stats
    }

    #[test]
    fn rates_of_empty_stats() {
        let stats = CacheStats::default();
        assert_eq!(stats.request_count(), 0);
        assert_eq!(stats.hit_rate(), 1.0);
        assert_eq!(stats.miss_rate(), 0.0);
        assert_eq!(stats.load_failure_rate(), 0.0);
        assert_eq!(stats.average_load_penalty_nanos(), 0.0);
        assert_eq!(stats.eviction_count(), 0);
    }

    #[test]
    fn derived_values() {
        let stats = stats(3, 1, 1, 1, 1_000);
        assert_eq!(stats.request_count(), 4);
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(stats.miss_rate(), 0.25);
        assert_eq!(stats.load_count(), 2);
        assert_eq!(stats.load_failure_rate(), 0.5);
        assert_eq!(stats.average_load_penalty_nanos(), 500.0);
        assert_eq!(stats.eviction_count(), 3);
        assert_eq!(stats.eviction_by_size_count(), 2);
        assert_eq!(stats.eviction_by_expiration_count(), 1);
    }

    #[test]
    fn add_and_sub_saturate() {
        let a = stats(u64::MAX, 1, 2, 0, 10);
        let b = stats(1, 1, 1, 1, 5);

        let sum = &a + &b;
        assert_eq!(sum.hit_count(), u64::MAX);
        assert_eq!(sum.miss_count(), 2);
        assert_eq!(sum.load_count(), 4);
        assert_eq!(sum.eviction_count(), 6);

        let diff = b - a;
        assert_eq!(diff.hit_count(), 0);
        assert_eq!(diff.load_failure_count(), 1);
        assert_eq!(diff.total_load_time_nanos(), 0);
        assert_eq!(diff.eviction_count(), 0);
    }
}
