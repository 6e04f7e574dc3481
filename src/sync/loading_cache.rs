use super::{refresher::Refresher, Cache, CacheBuilder, CacheLoader};
use crate::{stats::CacheStats, EntryState, Policy, ThreadPool};

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
    sync::Arc,
};

/// A [`Cache`][cache-struct] bound to a [`CacheLoader`][cache-loader] that
/// computes missing values and refreshes old ones in the background.
///
/// [`get`](#method.get) returns the cached value of a key, or loads it with the
/// loader. Concurrent calls for the same missing key share one load.
///
/// When the cache is built with `refresh_after_write`, a `get` that finds a value
/// older than that duration still returns it immediately, and hands a reload of
/// the key to a thread pool. At most one refresh per key is pending at a time.
/// Until the refresh completes, readers keep getting the old value. If it fails,
/// the old value stays and the failure is counted in the stats and logged.
///
/// An entry older than `expire_after_write` is never returned. The next `get`
/// loads it again and waits for the result.
///
/// # Examples
///
/// ```rust
/// use loading_cache::sync::LoadingCache;
///
/// use std::{num::ParseIntError, time::Duration};
///
/// let cache: LoadingCache<String, u64, _> = LoadingCache::builder()
///     .max_capacity(1_000)
///     .expire_after_write(Duration::from_secs(60))
///     .refresh_after_write(Duration::from_secs(10))
///     .build_with_loader(|key: &String| -> Result<u64, ParseIntError> {
///         Ok(key.parse::<u64>()? * 2)
///     });
///
/// assert_eq!(cache.get(&"21".to_string()), Ok(42));
/// assert!(cache.get(&"forty-two".to_string()).is_err());
///
/// let stats = cache.stats();
/// assert_eq!(stats.load_success_count(), 1);
/// assert_eq!(stats.load_failure_count(), 1);
/// ```
///
/// [cache-struct]: ./struct.Cache.html
/// [cache-loader]: ./trait.CacheLoader.html
pub struct LoadingCache<K, V, L, S = RandomState> {
    cache: Cache<K, V, S>,
    shared: Arc<Shared<L>>,
}

struct Shared<L> {
    loader: L,
    refresher: Refresher,
}

impl<K, V, L, S> Clone for LoadingCache<K, V, L, S> {
    /// Makes a clone of this shared cache.
    ///
    /// This operation is cheap as it only creates thread-safe reference counted
    /// pointers to the shared internal data structures.
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, L, S> fmt::Debug for LoadingCache<K, V, L, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache")
            .field("name", &self.cache.name())
            .field("policy", &self.cache.policy())
            .finish()
    }
}

impl<K, V> LoadingCache<K, V, fn(&K) -> Result<V, ()>, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Returns a [`CacheBuilder`][builder-struct]. Finish it with
    /// `build_with_loader`.
    ///
    /// [builder-struct]: ./struct.CacheBuilder.html
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::default()
    }
}

impl<K, V, L, S> LoadingCache<K, V, L, S> {
    /// Returns cache's name.
    pub fn name(&self) -> Option<&str> {
        self.cache.name()
    }

    /// Returns a read-only cache policy of this cache.
    pub fn policy(&self) -> Policy {
        self.cache.policy()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Returns the loader of this cache.
    pub fn loader(&self) -> &L {
        &self.shared.loader
    }

    /// Returns the thread pool running the refreshes of this cache, creating it
    /// if it does not exist yet.
    pub fn refresh_pool(&self) -> Arc<ThreadPool> {
        Arc::clone(self.shared.refresher.pool())
    }
}

impl<K, V, L, S> LoadingCache<K, V, L, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: CacheLoader<K, V>,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn with_cache(
        cache: Cache<K, V, S>,
        loader: L,
        refresh_pool: Option<Arc<ThreadPool>>,
    ) -> Self {
        Self {
            cache,
            shared: Arc::new(Shared {
                loader,
                refresher: Refresher::new(refresh_pool),
            }),
        }
    }

    /// Returns a _clone_ of the value corresponding to the key, loading it with
    /// the loader when there is no fresh value.
    ///
    /// A value due for refresh is returned immediately and a background refresh
    /// is scheduled.
    ///
    /// # Errors
    ///
    /// Returns the loader's error. It is not cached: the next call loads again.
    /// Callers that waited for the failed load get the same `Arc`.
    ///
    /// # Panics
    ///
    /// Panics if the loader panics.
    pub fn get(&self, key: &K) -> Result<V, Arc<L::Error>>
    where
        K: Clone,
    {
        let base = &self.cache.base;
        let hash = base.hash(key);

        if let Some((value, refresh)) = base.lookup(key, hash, true) {
            if refresh {
                self.submit_refresh(Arc::new(key.clone()), hash, false);
            }
            return Ok(value);
        }

        let key = Arc::new(key.clone());
        let (result, refresh) =
            base.load_or_wait(Arc::clone(&key), hash, true, || self.shared.loader.load(&*key));
        if refresh {
            self.submit_refresh(key, hash, false);
        }
        result
    }

    /// Same as [`Cache::get_with`][cache-get-with], but a value due for refresh
    /// is returned immediately and a background refresh is scheduled.
    ///
    /// [cache-get-with]: ./struct.Cache.html#method.get_with
    pub fn get_with(&self, key: K, init: impl FnOnce() -> V) -> V {
        match self.try_get_with(key, || Ok::<_, std::convert::Infallible>(init())) {
            Ok(v) => v,
            Err(e) => match *e {},
        }
    }

    /// Same as [`Cache::try_get_with`][cache-try-get-with], but a value due for
    /// refresh is returned immediately and a background refresh is scheduled.
    ///
    /// [cache-try-get-with]: ./struct.Cache.html#method.try_get_with
    pub fn try_get_with<F, E>(&self, key: K, init: F) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Result<V, E>,
        E: Send + Sync + 'static,
    {
        let base = &self.cache.base;
        let hash = base.hash(&key);
        let key = Arc::new(key);
        let (result, refresh) = base.try_get_with(Arc::clone(&key), hash, true, init);
        if refresh {
            self.submit_refresh(key, hash, false);
        }
        result
    }

    /// Schedules a reload of the key, or a load if the key has no fresh value.
    /// Returns without waiting for it.
    ///
    /// Does nothing if a refresh or a load of the key is already pending.
    pub fn refresh(&self, key: K) {
        let base = &self.cache.base;
        let hash = base.hash(&key);
        let key = Arc::new(key);
        if base.try_mark_refreshing(&key, hash) {
            self.submit_refresh(key, hash, true);
        }
    }

    /// See [`Cache::contains_key`](./struct.Cache.html#method.contains_key).
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.contains_key(key)
    }

    /// Returns the cached value without loading it or scheduling a refresh. See
    /// [`Cache::get_if_present`](./struct.Cache.html#method.get_if_present).
    pub fn get_if_present<Q>(&self, key: &Q) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.get_if_present(key)
    }

    /// See [`Cache::insert`](./struct.Cache.html#method.insert).
    pub fn insert(&self, key: K, value: V) {
        self.cache.insert(key, value);
    }

    /// See [`Cache::invalidate`](./struct.Cache.html#method.invalidate).
    pub fn invalidate<Q>(&self, key: &Q)
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Removes all expired entries.
    pub fn clean_up(&self) {
        self.cache.clean_up();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// See [`Cache::entry_state`](./struct.Cache.html#method.entry_state).
    pub fn entry_state<Q>(&self, key: &Q) -> EntryState
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.entry_state(key)
    }

    /// The key must have been marked as refreshing.
    fn submit_refresh(&self, key: Arc<K>, hash: u64, forced: bool) {
        let shared = Arc::clone(&self.shared);
        let pending = PendingRefresh {
            cache: self.cache.clone(),
            key,
            hash,
            done: false,
        };

        let job = move || {
            let mut pending = pending;
            pending.cache.base.refresh_entry(
                &pending.key,
                hash,
                forced,
                |key, old_value| match old_value {
                    Some(v) => shared.loader.reload(key, v),
                    None => shared.loader.load(key),
                },
            );
            pending.done = true;
        };

        // A job that is rejected here, or dropped later by `shutdown_now`,
        // clears the mark itself.
        if let Err(_e) = self.shared.refresher.submit(job) {
            #[cfg(feature = "logging")]
            log::warn!(
                "{}Could not schedule a refresh. Keeping the current value: {}",
                self.cache.base.log_prefix(),
                _e
            );
        }
    }
}

/// Owned by a refresh job. Clears the refreshing mark of its key if the job is
/// dropped before it completes.
struct PendingRefresh<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    cache: Cache<K, V, S>,
    key: Arc<K>,
    hash: u64,
    done: bool,
}

impl<K, V, S> Drop for PendingRefresh<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.done {
            self.cache.base.clear_refreshing(&self.key, self.hash);
        }
    }
}
