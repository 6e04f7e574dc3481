use crate::common::time::Instant;

use std::time::Duration;

#[derive(Clone, Debug)]
/// The policy of a cache.
pub struct Policy {
    max_capacity: Option<u64>,
    num_segments: usize,
    expiration: ExpirationPolicy,
}

impl Policy {
    pub(crate) fn new(
        max_capacity: Option<u64>,
        num_segments: usize,
        expiration: ExpirationPolicy,
    ) -> Self {
        Self {
            max_capacity,
            num_segments,
            expiration,
        }
    }

    /// Returns the `max_capacity` of the cache.
    pub fn max_capacity(&self) -> Option<u64> {
        self.max_capacity
    }

    /// Returns the number of internal segments of the cache.
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    /// Returns the `expire_after_write` of the cache.
    pub fn expire_after_write(&self) -> Option<Duration> {
        self.expiration.expire_after_write
    }

    /// Returns the `expire_after_access` of the cache.
    pub fn expire_after_access(&self) -> Option<Duration> {
        self.expiration.expire_after_access
    }

    /// Returns the `refresh_after_write` of the cache.
    pub fn refresh_after_write(&self) -> Option<Duration> {
        self.expiration.refresh_after_write
    }
}

/// The state of a key in a cache, as reported by `entry_state`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// No fresh value is cached and no load is in flight.
    Absent,
    /// No fresh value is cached and a load is in flight.
    Loading,
    /// A fresh value is cached.
    Present,
    /// A fresh value is cached and a refresh for it is queued or running. Reads
    /// keep returning the cached value until the refresh completes.
    Refreshing,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ExpirationPolicy {
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
    refresh_after_write: Option<Duration>,
}

impl ExpirationPolicy {
    pub(crate) fn new(
        expire_after_write: Option<Duration>,
        expire_after_access: Option<Duration>,
        refresh_after_write: Option<Duration>,
    ) -> Self {
        Self {
            expire_after_write,
            expire_after_access,
            refresh_after_write,
        }
    }

    pub(crate) fn refresh_after_write(&self) -> Option<Duration> {
        self.refresh_after_write
    }

    /// An entry expires once its age reaches `expire_after_write`, or its idle
    /// time reaches `expire_after_access`.
    pub(crate) fn is_expired(
        &self,
        last_modified: Instant,
        last_accessed: Instant,
        now: Instant,
    ) -> bool {
        self.expire_after_write
            .map_or(false, |ttl| now.has_elapsed(last_modified, ttl))
            || self
                .expire_after_access
                .map_or(false, |tti| now.has_elapsed(last_accessed, tti))
    }

    /// Callers must check `is_expired` first.
    pub(crate) fn is_refresh_due(&self, last_modified: Instant, now: Instant) -> bool {
        self.refresh_after_write
            .map_or(false, |d| now.has_elapsed(last_modified, d))
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpirationPolicy, Policy};
    use crate::common::time::Instant;

    use std::time::Duration;

    fn at(secs: u64) -> Instant {
        Instant::from_nanos(secs * 1_000_000_000)
    }

    #[test]
    fn expire_after_write_and_access() {
        let policy = ExpirationPolicy::new(
            Some(Duration::from_secs(10)),
            Some(Duration::from_secs(3)),
            None,
        );
        // Written at 0, read at 5.
        assert!(!policy.is_expired(at(0), at(5), at(7)));
        assert!(policy.is_expired(at(0), at(5), at(8)));
        assert!(policy.is_expired(at(0), at(9), at(10)));
    }

    #[test]
    fn refresh_is_due_after_write() {
        let policy = ExpirationPolicy::new(None, None, Some(Duration::from_secs(2)));
        assert!(!policy.is_refresh_due(at(0), at(1)));
        assert!(policy.is_refresh_due(at(0), at(2)));
        assert!(!ExpirationPolicy::default().is_refresh_due(at(0), at(100)));
    }

    #[test]
    fn policy_accessors() {
        let policy = Policy::new(
            Some(100),
            4,
            ExpirationPolicy::new(Some(Duration::from_secs(5)), None, None),
        );
        assert_eq!(policy.max_capacity(), Some(100));
        assert_eq!(policy.num_segments(), 4);
        assert_eq!(policy.expire_after_write(), Some(Duration::from_secs(5)));
        assert_eq!(policy.expire_after_access(), None);
        assert_eq!(policy.refresh_after_write(), None);
    }
}
