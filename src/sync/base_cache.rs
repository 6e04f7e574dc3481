use super::{
    segment::{Lookup, RefreshStart, Removed, Store},
    value_initializer::{self, InitResult, Slot, Waiter, WaiterInner},
};
use crate::{
    common::time::{Clock, Instant},
    notification::{notifier::RemovalNotifier, EvictionListener},
    policy::ExpirationPolicy,
    stats::{
        stats_counter::{DefaultStatsCounter, DisabledStatsCounter, StatsCounter},
        CacheStats,
    },
    EntryState, Policy,
};

use parking_lot::Mutex;
use std::{
    borrow::Borrow,
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    sync::Arc,
};
use triomphe::Arc as TrioArc;

pub(crate) struct BaseCache<K, V, S> {
    name: Option<String>,
    segments: Box<[Mutex<Store<K, V, S>>]>,
    segment_shift: u32,
    build_hasher: S,
    max_capacity: Option<u64>,
    expiration: ExpirationPolicy,
    stats: Box<dyn StatsCounter + Send + Sync + 'static>,
    notifier: Option<RemovalNotifier<K, V>>,
    clock: Clock,
}

impl<K, V, S> BaseCache<K, V, S> {
    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn policy(&self) -> Policy {
        Policy::new(self.max_capacity, self.segments.len(), self.expiration)
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    #[cfg(feature = "logging")]
    pub(crate) fn log_prefix(&self) -> String {
        crate::common::log_prefix(self.name())
    }
}

impl<K, V, S> BaseCache<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: Option<String>,
        max_capacity: Option<u64>,
        initial_capacity: Option<usize>,
        num_segments: usize,
        expiration: ExpirationPolicy,
        build_hasher: S,
        record_stats: bool,
        eviction_listener: Option<EvictionListener<K, V>>,
        clock: Clock,
    ) -> Self {
        assert!(num_segments > 0, "num_segments must be greater than zero");

        let actual_num_segments = actual_num_segments(num_segments, max_capacity);
        let segment_shift = 64 - actual_num_segments.trailing_zeros();
        let seg_init_capacity = initial_capacity
            .map(|cap| (cap + actual_num_segments - 1) / actual_num_segments)
            .unwrap_or_default();

        let segments = (0..actual_num_segments)
            .map(|i| {
                let seg_max_capacity = max_capacity
                    .map(|cap| split_capacity(cap, actual_num_segments as u64, i as u64));
                Mutex::new(Store::new(
                    seg_max_capacity,
                    seg_init_capacity,
                    expiration,
                    build_hasher.clone(),
                ))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let stats: Box<dyn StatsCounter + Send + Sync> = if record_stats {
            Box::new(DefaultStatsCounter::striped())
        } else {
            Box::new(DisabledStatsCounter)
        };

        let notifier = eviction_listener.map(|l| RemovalNotifier::new(l, name.clone()));

        Self {
            name,
            segments,
            segment_shift,
            build_hasher,
            max_capacity,
            expiration,
            stats,
            notifier,
            clock,
        }
    }

    #[inline]
    pub(crate) fn hash<Q>(&self, key: &Q) -> u64
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut hasher = self.build_hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[inline]
    fn select(&self, hash: u64) -> &Mutex<Store<K, V, S>> {
        let index = if self.segment_shift == 64 {
            0
        } else {
            (hash >> self.segment_shift) as usize
        };
        &self.segments[index]
    }

    /// Returns a fresh value. Never loads, never refreshes, never waits.
    pub(crate) fn get_if_present<Q>(&self, key: &Q, hash: u64) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.lookup(key, hash, false) {
            Some((value, _)) => Some(value),
            None => {
                self.stats.record_misses(1);
                None
            }
        }
    }

    /// Looks up a fresh value and records a hit when found. A miss is not
    /// recorded here, as the caller may go on to wait for somebody else's load.
    ///
    /// The returned flag tells the caller to submit a refresh of the key.
    pub(crate) fn lookup<Q>(&self, key: &Q, hash: u64, allow_refresh: bool) -> Option<(V, bool)>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let mut removed = Removed::new();
        let lookup = self
            .select(hash)
            .lock()
            .lookup(key, now, allow_refresh, &mut removed);
        self.notify_removed(removed);

        match lookup {
            Lookup::Hit { value, refresh } => {
                self.stats.record_hits(1);
                Some((value, refresh))
            }
            Lookup::Loading(_) | Lookup::Vacant => None,
        }
    }

    /// Returns the value of the key, loading it with `init` if there is no
    /// fresh value. Concurrent calls for the same key share one `init`.
    ///
    /// The returned flag tells the caller to submit a refresh of the key.
    pub(crate) fn try_get_with<E>(
        &self,
        key: Arc<K>,
        hash: u64,
        allow_refresh: bool,
        init: impl FnOnce() -> Result<V, E>,
    ) -> (Result<V, Arc<E>>, bool)
    where
        E: Send + Sync + 'static,
    {
        if let Some((value, refresh)) = self.lookup(&key, hash, allow_refresh) {
            return (Ok(value), refresh);
        }
        self.load_or_wait(key, hash, allow_refresh, init)
    }

    /// The slow path of `try_get_with`, for callers that have already looked
    /// the key up.
    pub(crate) fn load_or_wait<E>(
        &self,
        key: Arc<K>,
        hash: u64,
        allow_refresh: bool,
        init: impl FnOnce() -> Result<V, E>,
    ) -> (Result<V, Arc<E>>, bool)
    where
        E: Send + Sync + 'static,
    {
        let mut refresh = false;

        let claim = |waiter: &Waiter<V>| {
            let now = self.clock.now();
            let mut removed = Removed::new();
            let lookup = self.select(hash).lock().lookup_or_register(
                &key,
                waiter,
                now,
                allow_refresh,
                &mut removed,
            );
            self.notify_removed(removed);

            match lookup {
                Lookup::Hit { value, refresh: r } => {
                    self.stats.record_hits(1);
                    refresh = r;
                    Slot::Hit(value)
                }
                Lookup::Loading(other) => Slot::Wait(other),
                Lookup::Vacant => {
                    self.stats.record_misses(1);
                    Slot::Registered
                }
            }
        };

        let complete = |waiter: &Waiter<V>, value: Option<&V>, load_time_nanos: u64| {
            if value.is_some() {
                self.stats.record_load_success(load_time_nanos);
            } else {
                self.stats.record_load_failure(load_time_nanos);
            }

            let now = self.clock.now();
            let mut removed = Removed::new();
            self.select(hash)
                .lock()
                .complete_load(&key, waiter, value, now, &mut removed);
            self.notify_removed(removed);
        };

        let result = match value_initializer::try_init_or_read(&self.clock, claim, init, complete)
        {
            InitResult::Initialized(v) | InitResult::ReadExisting(v) | InitResult::Joined(v) => {
                Ok(v)
            }
            InitResult::InitErr(e) => Err(e),
        };
        (result, refresh)
    }

    pub(crate) fn insert(&self, key: Arc<K>, hash: u64, value: V) {
        let now = self.clock.now();
        let mut removed = Removed::new();
        self.select(hash)
            .lock()
            .insert(key, value, now, &mut removed);
        self.notify_removed(removed);
    }

    pub(crate) fn invalidate<Q>(&self, key: &Q, hash: u64)
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let mut removed = Removed::new();
        self.select(hash).lock().invalidate(key, now, &mut removed);
        self.notify_removed(removed);
    }

    pub(crate) fn invalidate_all(&self) {
        for segment in self.segments.iter() {
            let now = self.clock.now();
            let mut removed = Removed::new();
            segment.lock().invalidate_all(now, &mut removed);
            self.notify_removed(removed);
        }
    }

    pub(crate) fn clean_up(&self) {
        for segment in self.segments.iter() {
            let now = self.clock.now();
            let mut removed = Removed::new();
            segment.lock().remove_expired(now, &mut removed);
            self.notify_removed(removed);
        }
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q, hash: u64) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.select(hash).lock().contains_fresh(key, now)
    }

    pub(crate) fn entry_state<Q>(&self, key: &Q, hash: u64) -> EntryState
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.select(hash).lock().entry_state(key, now)
    }

    pub(crate) fn entry_count(&self) -> u64 {
        self.segments.iter().map(|s| s.lock().len() as u64).sum()
    }

    pub(crate) fn try_mark_refreshing(&self, key: &Arc<K>, hash: u64) -> bool {
        self.select(hash).lock().try_mark_refreshing(key)
    }

    pub(crate) fn clear_refreshing(&self, key: &Arc<K>, hash: u64) {
        self.select(hash).lock().clear_refreshing(key);
    }

    /// Runs a pending refresh of the key on the current thread.
    ///
    /// `reload` gets the current value, or `None` when a `forced` refresh finds
    /// no fresh value. Failures are counted and logged, and the current value is
    /// kept.
    pub(crate) fn refresh_entry<E>(
        &self,
        key: &Arc<K>,
        hash: u64,
        forced: bool,
        reload: impl FnOnce(&K, Option<&V>) -> Result<V, E>,
    ) where
        E: fmt::Debug,
    {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        let waiter: Waiter<V> = TrioArc::new(WaiterInner::default());
        let mut lock = waiter.value.write();

        let now = self.clock.now();
        let mut removed = Removed::new();
        let start = self
            .select(hash)
            .lock()
            .begin_refresh(key, &waiter, forced, now, &mut removed);
        self.notify_removed(removed);

        let old_value = match start {
            RefreshStart::Skip => return,
            RefreshStart::Reload(v) => v,
        };

        let started_at = self.clock.fast_now();
        let result = catch_unwind(AssertUnwindSafe(|| reload(&**key, old_value.as_ref())));
        let load_time_nanos = self.load_time_nanos(started_at);

        let value = match result {
            Ok(Ok(v)) => {
                self.stats.record_load_success(load_time_nanos);
                Some(v)
            }
            Ok(Err(_e)) => {
                self.stats.record_load_failure(load_time_nanos);
                #[cfg(feature = "logging")]
                log::warn!(
                    "{}Failed to refresh an entry. Keeping the current value: {:?}",
                    self.log_prefix(),
                    _e
                );
                None
            }
            Err(_payload) => {
                self.stats.record_load_failure(load_time_nanos);
                #[cfg(feature = "logging")]
                crate::common::log_panic(
                    "A refresh panicked. Keeping the current value",
                    &*_payload,
                    self.name(),
                );
                None
            }
        };

        let now = self.clock.now();
        let mut removed = Removed::new();
        self.select(hash)
            .lock()
            .complete_refresh(key, &waiter, value.as_ref(), now, &mut removed);
        // A failed refresh leaves the slot empty so that any waiting thread
        // retries on its own.
        *lock = value.map(Ok);
        drop(lock);
        self.notify_removed(removed);
    }

    fn load_time_nanos(&self, started_at: Instant) -> u64 {
        let elapsed = self.clock.fast_now().saturating_duration_since(started_at);
        Instant::duration_to_saturating_nanoseconds(elapsed)
    }

    /// Must be called without holding a segment lock.
    fn notify_removed(&self, removed: Removed<K, V>) {
        for entry in removed {
            self.stats.record_eviction(entry.cause);
            if let Some(notifier) = &self.notifier {
                notifier.notify(entry);
            }
        }
    }
}

#[cfg(test)]
impl<K, V, S> BaseCache<K, V, S> {
    pub(crate) fn segment_capacities(&self) -> Vec<Option<u64>>
    where
        K: Hash + Eq,
        V: Clone,
        S: BuildHasher + Clone,
    {
        self.segments
            .iter()
            .map(|s| s.lock().max_capacity())
            .collect()
    }

    pub(crate) fn is_listener_enabled(&self) -> bool {
        self.notifier.as_ref().map_or(false, |n| n.is_enabled())
    }
}

/// Rounds `num_segments` up to a power of two, then halves it while some
/// segment would be left with no capacity.
fn actual_num_segments(num_segments: usize, max_capacity: Option<u64>) -> usize {
    let mut num = num_segments.next_power_of_two();
    if let Some(cap) = max_capacity {
        while num > 1 && num as u64 > cap {
            num /= 2;
        }
    }
    num
}

/// Splits `total` over `num` segments so that the capacities add up to `total`
/// exactly.
fn split_capacity(total: u64, num: u64, index: u64) -> u64 {
    total / num + u64::from(index < total % num)
}
