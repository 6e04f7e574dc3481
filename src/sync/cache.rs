use super::{base_cache::BaseCache, CacheBuilder};
use crate::{
    common::time::Clock, notification::EvictionListener, policy::ExpirationPolicy,
    stats::CacheStats, EntryState, Policy,
};

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    convert::Infallible,
    fmt,
    hash::{BuildHasher, Hash},
    sync::Arc,
};

/// A thread-safe, bounded in-memory cache whose values are computed on demand.
///
/// `Cache` keeps up to `max_capacity` entries and evicts the least recently used
/// ones when it is full. Entries can expire a fixed time after they were written
/// (`expire_after_write`) or last read (`expire_after_access`). Expired entries
/// are never returned. They are removed when they are next looked up, or by
/// [`clean_up`](#method.clean_up); there is no background sweeper.
///
/// Concurrent calls to [`get_with`](#method.get_with) or
/// [`try_get_with`](#method.try_get_with) for the same missing key evaluate only
/// one of the `init` closures. The other callers wait for it and share its
/// result.
///
/// To bind a loader to the cache and refresh entries in the background, use a
/// [`LoadingCache`][loading-cache].
///
/// # Examples
///
/// Cache entries are manually added using [`insert`](#method.insert) or
/// [`get_with`](#method.get_with) method, and are stored in the cache until
/// either evicted or manually invalidated.
///
/// Here's an example of reading and updating a cache by using multiple threads:
///
/// ```rust
/// use loading_cache::sync::Cache;
///
/// use std::thread;
///
/// fn value(n: usize) -> String {
///     format!("value {}", n)
/// }
///
/// const NUM_THREADS: usize = 16;
/// const NUM_KEYS_PER_THREAD: usize = 64;
///
/// // Create a cache that can store up to 10,000 entries.
/// let cache = Cache::new(10_000);
///
/// // Spawn threads and read and update the cache simultaneously.
/// let threads: Vec<_> = (0..NUM_THREADS)
///     .map(|i| {
///         // To share the same cache across the threads, clone it.
///         // This is a cheap operation.
///         let my_cache = cache.clone();
///         let start = i * NUM_KEYS_PER_THREAD;
///         let end = (i + 1) * NUM_KEYS_PER_THREAD;
///
///         thread::spawn(move || {
///             // Insert 64 entries. (NUM_KEYS_PER_THREAD = 64)
///             for key in start..end {
///                 my_cache.insert(key, value(key));
///                 assert_eq!(my_cache.get_if_present(&key), Some(value(key)));
///             }
///
///             // Invalidate every 4 element of the inserted entries.
///             for key in (start..end).step_by(4) {
///                 my_cache.invalidate(&key);
///             }
///         })
///     })
///     .collect();
///
/// // Wait for all threads to complete.
/// threads.into_iter().for_each(|t| t.join().expect("Failed"));
///
/// // Verify the result.
/// for key in 0..(NUM_THREADS * NUM_KEYS_PER_THREAD) {
///     if key % 4 == 0 {
///         assert_eq!(cache.get_if_present(&key), None);
///     } else {
///         assert_eq!(cache.get_if_present(&key), Some(value(key)));
///     }
/// }
/// ```
///
/// # Hashing Algorithm
///
/// By default, `Cache` uses a hashing algorithm selected to provide resistance
/// against HashDoS attacks. It will be the same one used by
/// `std::collections::HashMap`.
///
/// The hashing algorithm can be replaced on a per-`Cache` basis using the
/// [`build_with_hasher`][build-with-hasher-method] method of the
/// `CacheBuilder`. Many alternative algorithms are available on crates.io, such
/// as the [aHash][ahash-crate] crate.
///
/// [loading-cache]: ./struct.LoadingCache.html
/// [build-with-hasher-method]: ./struct.CacheBuilder.html#method.build_with_hasher
/// [ahash-crate]: https://crates.io/crates/ahash
///
pub struct Cache<K, V, S = RandomState> {
    pub(crate) base: Arc<BaseCache<K, V, S>>,
}

impl<K, V, S> Clone for Cache<K, V, S> {
    /// Makes a clone of this shared cache.
    ///
    /// This operation is cheap as it only creates thread-safe reference counted
    /// pointers to the shared internal data structures.
    fn clone(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
        }
    }
}

impl<K, V, S> fmt::Debug for Cache<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.base.name())
            .field("policy", &self.base.policy())
            .finish()
    }
}

impl<K, V> Cache<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new `Cache<K, V>` that will store up to the `max_capacity`
    /// entries.
    ///
    /// To adjust various configuration knobs such as `expire_after_write`, use
    /// the [`CacheBuilder`][builder-struct].
    ///
    /// [builder-struct]: ./struct.CacheBuilder.html
    pub fn new(max_capacity: u64) -> Self {
        CacheBuilder::new(max_capacity).build()
    }

    /// Returns a [`CacheBuilder`][builder-struct], which can build a `Cache` or
    /// a `LoadingCache` with various configuration knobs.
    ///
    /// [builder-struct]: ./struct.CacheBuilder.html
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::default()
    }
}

impl<K, V, S> Cache<K, V, S> {
    /// Returns cache's name.
    pub fn name(&self) -> Option<&str> {
        self.base.name()
    }

    /// Returns a read-only cache policy of this cache.
    ///
    /// At this time, cache policy cannot be modified after cache creation.
    pub fn policy(&self) -> Policy {
        self.base.policy()
    }

    /// Returns a snapshot of the statistics of this cache. All counters are zero
    /// when the cache was built with `record_stats(false)`.
    pub fn stats(&self) -> CacheStats {
        self.base.stats()
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_everything(
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
        Self {
            base: Arc::new(BaseCache::new(
                name,
                max_capacity,
                initial_capacity,
                num_segments,
                expiration,
                build_hasher,
                record_stats,
                eviction_listener,
                clock,
            )),
        }
    }

    /// Returns `true` if the cache contains a fresh value for the key.
    ///
    /// Unlike the `get_if_present` method, this method is not considered a cache
    /// read operation. It does not move the key in the access order, record
    /// stats or reset the idle timer for the key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.base.hash(key);
        self.base.contains_key(key, hash)
    }

    /// Returns a _clone_ of the value corresponding to the key, if the cache has a
    /// fresh one.
    ///
    /// Never loads the value and never waits for a load in flight. Records a hit
    /// or a miss.
    ///
    /// If you want to store values that will be expensive to clone, wrap them by
    /// `std::sync::Arc` before storing in a cache. [`Arc`][rustdoc-std-arc] is a
    /// thread-safe reference-counted pointer and its `clone()` method is cheap.
    ///
    /// [rustdoc-std-arc]: https://doc.rust-lang.org/stable/std/sync/struct.Arc.html
    pub fn get_if_present<Q>(&self, key: &Q) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.base.hash(key);
        self.base.get_if_present(key, hash)
    }

    /// Returns a _clone_ of the value corresponding to the key. If the value does
    /// not exist, evaluates the `init` closure and inserts the output.
    ///
    /// # Concurrent calls on the same key
    ///
    /// This method guarantees that concurrent calls on the same not-existing key
    /// are coalesced into one evaluation of the `init` closure. Only one of the
    /// calls evaluates its closure, and other calls wait for that closure to
    /// complete. The waiting calls are counted as neither hits nor misses.
    ///
    /// # Panics
    ///
    /// This method panics when the `init` closure has panicked. When it happens,
    /// only the caller whose `init` closure panicked will get the panic. If there
    /// are other calls in progress, they will be resumed and one of them will
    /// evaluate its `init` closure.
    pub fn get_with(&self, key: K, init: impl FnOnce() -> V) -> V {
        match self.try_get_with(key, || Ok::<_, Infallible>(init())) {
            Ok(v) => v,
            Err(e) => match *e {},
        }
    }

    /// Try to ensure the value of the key exists. If the value does not exist,
    /// evaluates the `init` closure and inserts the output if it is `Ok(value)`.
    /// An `Err(error)` is not cached; the next call evaluates `init` again.
    ///
    /// # Concurrent calls on the same key
    ///
    /// Concurrent calls on the same not-existing key are coalesced into one
    /// evaluation of the `init` closure (as long as these closures return the
    /// same error type). If the closure returns `Err(error)`, every waiting call
    /// gets the same `Arc<E>`.
    ///
    /// # Panics
    ///
    /// This method panics when the `init` closure has panicked. See
    /// [`get_with`](#method.get_with).
    pub fn try_get_with<F, E>(&self, key: K, init: F) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Result<V, E>,
        E: Send + Sync + 'static,
    {
        let hash = self.base.hash(&key);
        let (result, _) = self.base.try_get_with(Arc::new(key), hash, false, init);
        result
    }

    /// Inserts a key-value pair into the cache.
    ///
    /// If the cache has this key present, the value is updated. If a load of
    /// the key is in flight, its result is still returned to the callers waiting
    /// for it, but is not stored.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.base.hash(&key);
        self.base.insert(Arc::new(key), hash, value);
    }

    /// Discards any cached value for the key. Calling it for a missing key is a
    /// no-op.
    ///
    /// The key may be any borrowed form of the cache's key type, but `Hash` and
    /// `Eq` on the borrowed form _must_ match those for the key type.
    pub fn invalidate<Q>(&self, key: &Q)
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.base.hash(key);
        self.base.invalidate(key, hash);
    }

    /// Discards all cached values.
    pub fn invalidate_all(&self) {
        self.base.invalidate_all();
    }

    /// Removes all expired entries.
    pub fn clean_up(&self) {
        self.base.clean_up();
    }

    /// Returns the number of entries in this cache. Expired entries that have not
    /// been looked up or cleaned up yet are included.
    pub fn entry_count(&self) -> u64 {
        self.base.entry_count()
    }

    /// Returns the state of the key without touching it.
    pub fn entry_state<Q>(&self, key: &Q) -> EntryState
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.base.hash(key);
        self.base.entry_state(key, hash)
    }
}
