use super::value_initializer::Waiter;
use crate::{
    common::{
        deque::{DeqNode, Deque},
        time::Instant,
    },
    notification::{notifier::RemovedEntry, RemovalCause},
    policy::ExpirationPolicy,
    EntryState,
};

use smallvec::SmallVec;
use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    hash::{BuildHasher, Hash},
    ptr::NonNull,
    sync::Arc,
};
use triomphe::Arc as TrioArc;

/// Entries removed while the segment lock was held. They are handed to the
/// eviction listener after the lock is released.
pub(crate) type Removed<K, V> = SmallVec<[RemovedEntry<K, V>; 4]>;

pub(crate) struct ValueEntry<K, V> {
    pub(crate) value: V,
    last_modified: Instant,
    last_accessed: Instant,
    node: NonNull<DeqNode<Arc<K>>>,
}

pub(crate) enum Lookup<V> {
    Hit { value: V, refresh: bool },
    Loading(Waiter<V>),
    Vacant,
}

pub(crate) enum RefreshStart<V> {
    /// Nothing to do. The pending-refresh mark has been cleared.
    Skip,
    /// The waiter has been registered. Reload with the old value, or load when
    /// there is none.
    Reload(Option<V>),
}

/// The contents of one segment. Every method must be called with the segment
/// lock held.
pub(crate) struct Store<K, V, S> {
    map: HashMap<Arc<K>, ValueEntry<K, V>, S>,
    // Keys in access order. The front is the least recently used.
    access_order: Deque<Arc<K>>,
    // In-flight loads and refreshes.
    waiters: HashMap<Arc<K>, Waiter<V>, S>,
    // Keys with a queued or running refresh.
    refreshing: HashSet<Arc<K>, S>,
    max_capacity: Option<u64>,
    expiration: ExpirationPolicy,
}

// The raw pointers to the deque nodes are only dereferenced with the segment
// lock held.
unsafe impl<K, V, S> Send for Store<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Send,
{
}

impl<K, V, S> Store<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher + Clone,
{
    pub(crate) fn new(
        max_capacity: Option<u64>,
        initial_capacity: usize,
        expiration: ExpirationPolicy,
        build_hasher: S,
    ) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(initial_capacity, build_hasher.clone()),
            access_order: Deque::default(),
            waiters: HashMap::with_hasher(build_hasher.clone()),
            refreshing: HashSet::with_hasher(build_hasher),
            max_capacity,
            expiration,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn max_capacity(&self) -> Option<u64> {
        self.max_capacity
    }

    /// Looks up a fresh value and touches it. An expired entry is removed.
    ///
    /// With `allow_refresh`, a hit on an entry that is due for refresh marks the
    /// key as refreshing and returns `refresh: true`. The caller must then
    /// submit the refresh, or clear the mark if it cannot.
    pub(crate) fn lookup<Q>(
        &mut self,
        key: &Q,
        now: Instant,
        allow_refresh: bool,
        removed: &mut Removed<K, V>,
    ) -> Lookup<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(entry) = self.map.get_mut(key) {
            if !self.expiration.is_expired(entry.last_modified, entry.last_accessed, now) {
                entry.last_accessed = now;
                unsafe { self.access_order.move_to_back(entry.node) };
                let value = entry.value.clone();

                let mut refresh = false;
                if allow_refresh
                    && self.expiration.is_refresh_due(entry.last_modified, now)
                    && !self.refreshing.contains(key)
                    && !self.waiters.contains_key(key)
                {
                    // Safety: the node is owned by `access_order` while the entry
                    // is in the map.
                    let k = unsafe { Arc::clone(&entry.node.as_ref().element) };
                    self.refreshing.insert(k);
                    refresh = true;
                }
                return Lookup::Hit { value, refresh };
            }
            self.remove_entry(key, RemovalCause::Expired, removed);
        }

        match self.waiters.get(key) {
            Some(waiter) => Lookup::Loading(TrioArc::clone(waiter)),
            None => Lookup::Vacant,
        }
    }

    /// Same as `lookup`, but registers `waiter` when neither a fresh value nor an
    /// in-flight load exists.
    pub(crate) fn lookup_or_register(
        &mut self,
        key: &Arc<K>,
        waiter: &Waiter<V>,
        now: Instant,
        allow_refresh: bool,
        removed: &mut Removed<K, V>,
    ) -> Lookup<V> {
        let lookup = self.lookup(key, now, allow_refresh, removed);
        if let Lookup::Vacant = lookup {
            self.waiters
                .insert(Arc::clone(key), TrioArc::clone(waiter));
        }
        lookup
    }

    /// Deregisters `waiter` and stores `value` unless the waiter was cancelled.
    pub(crate) fn complete_load(
        &mut self,
        key: &Arc<K>,
        waiter: &Waiter<V>,
        value: Option<&V>,
        now: Instant,
        removed: &mut Removed<K, V>,
    ) {
        self.deregister(key, waiter);
        if let Some(v) = value {
            if !waiter.is_cancelled() {
                self.install(Arc::clone(key), v.clone(), now, removed);
            }
        }
    }

    /// Inserts or replaces the value. An in-flight load for the key is
    /// cancelled.
    pub(crate) fn insert(
        &mut self,
        key: Arc<K>,
        value: V,
        now: Instant,
        removed: &mut Removed<K, V>,
    ) {
        self.cancel_waiter(&key);
        self.install(key, value, now, removed);
    }

    pub(crate) fn invalidate<Q>(&mut self, key: &Q, now: Instant, removed: &mut Removed<K, V>)
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cancel_waiter(key);
        let cause = match self.map.get(key) {
            None => return,
            Some(entry)
                if self
                    .expiration
                    .is_expired(entry.last_modified, entry.last_accessed, now) =>
            {
                RemovalCause::Expired
            }
            Some(_) => RemovalCause::Explicit,
        };
        self.remove_entry(key, cause, removed);
    }

    pub(crate) fn invalidate_all(&mut self, now: Instant, removed: &mut Removed<K, V>) {
        self.waiters.values().for_each(|w| w.cancel());
        while let Some(node) = self.access_order.pop_front() {
            let key = node.element;
            if let Some(entry) = self.map.remove(&key) {
                let cause = if self
                    .expiration
                    .is_expired(entry.last_modified, entry.last_accessed, now)
                {
                    RemovalCause::Expired
                } else {
                    RemovalCause::Explicit
                };
                removed.push(RemovedEntry::new(key, entry.value, cause));
            }
        }
        debug_assert!(self.map.is_empty());
    }

    /// Removes every expired entry.
    pub(crate) fn remove_expired(&mut self, now: Instant, removed: &mut Removed<K, V>) {
        let expiration = self.expiration;
        let expired = self
            .map
            .iter()
            .filter(|(_, e)| expiration.is_expired(e.last_modified, e.last_accessed, now))
            .map(|(k, _)| Arc::clone(k))
            .collect::<Vec<_>>();
        for key in expired {
            self.remove_entry(&key, RemovalCause::Expired, removed);
        }
    }

    /// Returns `true` if a fresh value exists. Does not touch the entry.
    pub(crate) fn contains_fresh<Q>(&self, key: &Q, now: Instant) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map_or(false, |e| {
            !self
                .expiration
                .is_expired(e.last_modified, e.last_accessed, now)
        })
    }

    pub(crate) fn entry_state<Q>(&self, key: &Q, now: Instant) -> EntryState
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let in_flight = self.refreshing.contains(key) || self.waiters.contains_key(key);
        match (self.contains_fresh(key, now), in_flight) {
            (true, true) => EntryState::Refreshing,
            (true, false) => EntryState::Present,
            (false, _) if self.waiters.contains_key(key) => EntryState::Loading,
            (false, _) => EntryState::Absent,
        }
    }

    /// Marks the key as refreshing. Returns `false` if a refresh is already
    /// pending or a load is in flight.
    pub(crate) fn try_mark_refreshing(&mut self, key: &Arc<K>) -> bool {
        if self.refreshing.contains(key) || self.waiters.contains_key(key) {
            return false;
        }
        self.refreshing.insert(Arc::clone(key))
    }

    pub(crate) fn clear_refreshing(&mut self, key: &Arc<K>) {
        self.refreshing.remove(key);
    }

    /// Decides whether a pending refresh should run. When it should, `waiter` is
    /// registered so that loads of the same key wait for it.
    ///
    /// A refresh that was not `forced` runs only while the entry is present,
    /// fresh and due for refresh. A forced one runs unless a load is in flight,
    /// loading the key when there is no fresh entry.
    pub(crate) fn begin_refresh(
        &mut self,
        key: &Arc<K>,
        waiter: &Waiter<V>,
        forced: bool,
        now: Instant,
        removed: &mut Removed<K, V>,
    ) -> RefreshStart<V> {
        if self.waiters.contains_key(key) {
            self.refreshing.remove(key);
            return RefreshStart::Skip;
        }

        let old_value = match self.map.get(key) {
            Some(e)
                if !self
                    .expiration
                    .is_expired(e.last_modified, e.last_accessed, now) =>
            {
                if !forced && !self.expiration.is_refresh_due(e.last_modified, now) {
                    // Somebody has written a new value in the meantime.
                    self.refreshing.remove(key);
                    return RefreshStart::Skip;
                }
                Some(e.value.clone())
            }
            Some(_) if forced => {
                self.remove_entry(key, RemovalCause::Expired, removed);
                None
            }
            _ if forced => None,
            _ => {
                self.refreshing.remove(key);
                return RefreshStart::Skip;
            }
        };

        self.waiters
            .insert(Arc::clone(key), TrioArc::clone(waiter));
        RefreshStart::Reload(old_value)
    }

    /// Clears the pending-refresh mark, deregisters `waiter` and stores the
    /// reloaded value unless the waiter was cancelled.
    pub(crate) fn complete_refresh(
        &mut self,
        key: &Arc<K>,
        waiter: &Waiter<V>,
        value: Option<&V>,
        now: Instant,
        removed: &mut Removed<K, V>,
    ) {
        self.refreshing.remove(key);
        self.complete_load(key, waiter, value, now, removed);
    }

    fn install(&mut self, key: Arc<K>, value: V, now: Instant, removed: &mut Removed<K, V>) {
        if let Some(entry) = self.map.get_mut(&key) {
            let cause = if self
                .expiration
                .is_expired(entry.last_modified, entry.last_accessed, now)
            {
                RemovalCause::Expired
            } else {
                RemovalCause::Replaced
            };
            let old_value = std::mem::replace(&mut entry.value, value);
            entry.last_modified = now;
            entry.last_accessed = now;
            unsafe { self.access_order.move_to_back(entry.node) };
            removed.push(RemovedEntry::new(key, old_value, cause));
        } else {
            let node = Box::new(DeqNode::new(Arc::clone(&key)));
            let node = self.access_order.push_back(node);
            let entry = ValueEntry {
                value,
                last_modified: now,
                last_accessed: now,
                node,
            };
            self.map.insert(key, entry);
        }
        debug_assert_eq!(self.map.len(), self.access_order.len());

        self.evict_over_capacity(now, removed);
    }

    /// Evicts from the least recently used end until the segment is within its
    /// capacity.
    fn evict_over_capacity(&mut self, now: Instant, removed: &mut Removed<K, V>) {
        let Some(max) = self.max_capacity else {
            return;
        };

        while self.map.len() as u64 > max {
            let Some(node) = self.access_order.pop_front() else {
                break;
            };
            let key = node.element;
            if let Some(entry) = self.map.remove(&key) {
                let cause = if self
                    .expiration
                    .is_expired(entry.last_modified, entry.last_accessed, now)
                {
                    RemovalCause::Expired
                } else {
                    RemovalCause::Size
                };
                removed.push(RemovedEntry::new(key, entry.value, cause));
            }
        }
    }

    fn remove_entry<Q>(&mut self, key: &Q, cause: RemovalCause, removed: &mut Removed<K, V>)
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some((key, entry)) = self.map.remove_entry(key) {
            // Safety: the node belongs to `access_order` and is unlinked only here
            // or by `pop_front`, which also removes the entry from the map.
            unsafe { self.access_order.unlink_and_drop(entry.node) };
            removed.push(RemovedEntry::new(key, entry.value, cause));
        }
    }

    fn cancel_waiter<Q>(&self, key: &Q)
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(waiter) = self.waiters.get(key) {
            waiter.cancel();
        }
    }

    fn deregister(&mut self, key: &Arc<K>, waiter: &Waiter<V>) {
        if matches!(self.waiters.get(key), Some(w) if TrioArc::ptr_eq(w, waiter)) {
            self.waiters.remove(key);
        }
    }
}

#[cfg(test)]
impl<K, V, S> Store<K, V, S> {
    /// Keys from the least to the most recently used.
    pub(crate) fn keys_in_access_order(&self) -> Vec<Arc<K>> {
        self.access_order.iter().cloned().collect()
    }
}
