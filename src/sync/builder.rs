use super::{Cache, CacheLoader, LoadingCache};
use crate::{
    common::{builder_utils, time::Clock},
    notification::{EvictionListener, RemovalCause},
    policy::ExpirationPolicy,
    ThreadPool,
};

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    sync::Arc,
    time::Duration,
};

/// Builds a [`Cache`][cache-struct] or a [`LoadingCache`][loading-cache-struct]
/// with various configuration knobs.
///
/// [cache-struct]: ./struct.Cache.html
/// [loading-cache-struct]: ./struct.LoadingCache.html
///
/// # Examples
///
/// ```rust
/// use loading_cache::sync::CacheBuilder;
///
/// use std::time::Duration;
///
/// let cache = CacheBuilder::new(10_000) // Max 10,000 entries
///     // Expire entries 30 minutes after they were written.
///     .expire_after_write(Duration::from_secs(30 * 60))
///     // Reload entries in the background 5 minutes after they were written.
///     .refresh_after_write(Duration::from_secs(5 * 60))
///     .record_stats(true)
///     .build_with_loader(|key: &u32| Ok::<_, String>(format!("value-{key}")));
///
/// // Loads the value on the first call.
/// assert_eq!(cache.get(&0).unwrap(), "value-0");
/// // This is a hit.
/// assert_eq!(cache.get(&0).unwrap(), "value-0");
///
/// let stats = cache.stats();
/// assert_eq!(stats.hit_count(), 1);
/// assert_eq!(stats.miss_count(), 1);
/// ```
///
#[must_use]
pub struct CacheBuilder<K, V> {
    name: Option<String>,
    max_capacity: Option<u64>,
    initial_capacity: Option<usize>,
    num_segments: usize,
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
    refresh_after_write: Option<Duration>,
    refresh_pool: Option<Arc<ThreadPool>>,
    record_stats: bool,
    eviction_listener: Option<EvictionListener<K, V>>,
    clock: Clock,
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self {
            name: None,
            max_capacity: None,
            initial_capacity: None,
            num_segments: 1,
            expire_after_write: None,
            expire_after_access: None,
            refresh_after_write: None,
            refresh_pool: None,
            record_stats: true,
            eviction_listener: None,
            clock: Clock::default(),
        }
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Construct a new `CacheBuilder` that will be used to build a cache holding
    /// up to `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        Self {
            max_capacity: Some(max_capacity),
            ..Default::default()
        }
    }

    /// Builds a `Cache<K, V>`.
    ///
    /// # Panics
    ///
    /// Panics if `refresh_after_write` is set, as a `Cache` has no loader to
    /// refresh the entries with, or if any of the durations is longer than 1000
    /// years.
    pub fn build(self) -> Cache<K, V, RandomState> {
        self.build_with_hasher(RandomState::default())
    }

    /// Builds a `Cache<K, V, S>` with the given `hasher`.
    ///
    /// # Panics
    ///
    /// See [`build`](#method.build).
    pub fn build_with_hasher<S>(self, hasher: S) -> Cache<K, V, S>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        assert!(
            self.refresh_after_write.is_none(),
            "refresh_after_write requires a loader. Use build_with_loader instead"
        );
        let expiration = self.expiration();
        Cache::with_everything(
            self.name,
            self.max_capacity,
            self.initial_capacity,
            self.num_segments,
            expiration,
            hasher,
            self.record_stats,
            self.eviction_listener,
            self.clock,
        )
    }

    /// Builds a `LoadingCache<K, V, L>` computing its values with `loader`.
    ///
    /// # Panics
    ///
    /// Panics if any of the durations is longer than 1000 years.
    pub fn build_with_loader<L>(self, loader: L) -> LoadingCache<K, V, L, RandomState>
    where
        L: CacheLoader<K, V>,
    {
        self.build_with_loader_and_hasher(loader, RandomState::default())
    }

    /// Builds a `LoadingCache<K, V, L, S>` computing its values with `loader`,
    /// with the given `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if any of the durations is longer than 1000 years.
    pub fn build_with_loader_and_hasher<L, S>(
        self,
        loader: L,
        hasher: S,
    ) -> LoadingCache<K, V, L, S>
    where
        L: CacheLoader<K, V>,
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        let expiration = self.expiration();
        let cache = Cache::with_everything(
            self.name,
            self.max_capacity,
            self.initial_capacity,
            self.num_segments,
            expiration,
            hasher,
            self.record_stats,
            self.eviction_listener,
            self.clock,
        );
        LoadingCache::with_cache(cache, loader, self.refresh_pool)
    }

    fn expiration(&self) -> ExpirationPolicy {
        builder_utils::ensure_durations_or_panic(
            self.expire_after_write,
            self.expire_after_access,
            self.refresh_after_write,
        );
        ExpirationPolicy::new(
            self.expire_after_write,
            self.expire_after_access,
            self.refresh_after_write,
        )
    }
}

impl<K, V> CacheBuilder<K, V> {
    /// Sets the name of the cache. It prefixes the log messages of the cache.
    pub fn name(self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the max capacity of the cache.
    pub fn max_capacity(self, max_capacity: u64) -> Self {
        Self {
            max_capacity: Some(max_capacity),
            ..self
        }
    }

    /// Sets the initial capacity (number of entries) of the cache.
    pub fn initial_capacity(self, number_of_entries: usize) -> Self {
        Self {
            initial_capacity: Some(number_of_entries),
            ..self
        }
    }

    /// Sets the number of segments of the cache. The value is rounded up to the
    /// next power of two, then reduced while it is larger than `max_capacity`,
    /// so that every segment can hold at least one entry.
    ///
    /// Each segment has its own lock and its own share of the max capacity, so
    /// more segments allow more concurrent writes. The least recently used order
    /// is kept per segment. With one segment (the default) it is global.
    ///
    /// # Panics
    ///
    /// Panics if `num_segments` is zero.
    pub fn segments(self, num_segments: usize) -> Self {
        assert!(num_segments > 0, "num_segments must be greater than zero");
        Self {
            num_segments,
            ..self
        }
    }

    /// Sets the time to live of the entries. An entry expires once `duration`
    /// has passed since its value was written.
    ///
    /// Expired entries are never returned. They are removed when they are next
    /// looked up, or by `clean_up`.
    ///
    /// # Panics
    ///
    /// `build*` methods will panic if the given `duration` is longer than 1000
    /// years.
    pub fn expire_after_write(self, duration: Duration) -> Self {
        Self {
            expire_after_write: Some(duration),
            ..self
        }
    }

    /// Sets the time to idle of the entries. An entry expires once `duration`
    /// has passed since it was last written or read.
    ///
    /// # Panics
    ///
    /// `build*` methods will panic if the given `duration` is longer than 1000
    /// years.
    pub fn expire_after_access(self, duration: Duration) -> Self {
        Self {
            expire_after_access: Some(duration),
            ..self
        }
    }

    /// Reloads an entry in the background once `duration` has passed since its
    /// value was written. Readers keep getting the current value until the new
    /// one is in. Only available to a `LoadingCache`.
    ///
    /// # Panics
    ///
    /// `build*` methods will panic if the given `duration` is zero or longer than
    /// 1000 years, and `build` and `build_with_hasher` always panic when this is
    /// set.
    pub fn refresh_after_write(self, duration: Duration) -> Self {
        Self {
            refresh_after_write: Some(duration),
            ..self
        }
    }

    /// Sets the thread pool running the background refreshes. The pool can be
    /// shared between caches. Without it, the cache creates its own pool on the
    /// first refresh.
    pub fn refresh_pool(self, pool: Arc<ThreadPool>) -> Self {
        Self {
            refresh_pool: Some(pool),
            ..self
        }
    }

    /// Enables or disables the recording of [`CacheStats`][cache-stats]. Enabled
    /// by default.
    ///
    /// [cache-stats]: ../stats/struct.CacheStats.html
    pub fn record_stats(self, enabled: bool) -> Self {
        Self {
            record_stats: enabled,
            ..self
        }
    }

    /// Sets the eviction listener closure of the cache.
    ///
    /// The closure is called with the key, the value and the cause of each
    /// removal, after the cache has released its internal lock. If it panics,
    /// the listener is disabled and the panic is logged.
    pub fn eviction_listener(
        self,
        listener: impl Fn(Arc<K>, V, RemovalCause) + Send + Sync + 'static,
    ) -> Self {
        Self {
            eviction_listener: Some(Arc::new(listener)),
            ..self
        }
    }

    #[cfg(test)]
    pub(crate) fn clock(self, clock: Clock) -> Self {
        Self { clock, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::CacheBuilder;
    use crate::sync::Cache;

    use std::time::Duration;

    #[test]
    fn build_cache() {
        // Cache<char, String>
        let cache = CacheBuilder::new(100).build();
        let policy = cache.policy();

        assert_eq!(policy.max_capacity(), Some(100));
        assert_eq!(policy.num_segments(), 1);
        assert_eq!(policy.expire_after_write(), None);
        assert_eq!(policy.refresh_after_write(), None);

        cache.insert('a', "Alice".to_string());
        assert_eq!(cache.get_if_present(&'a'), Some("Alice".to_string()));

        let cache = CacheBuilder::new(100)
            .name("tiny")
            .segments(3)
            .expire_after_write(Duration::from_secs(45 * 60))
            .expire_after_access(Duration::from_secs(15 * 60))
            .build();
        let policy = cache.policy();

        assert_eq!(cache.name(), Some("tiny"));
        assert_eq!(policy.max_capacity(), Some(100));
        assert_eq!(policy.num_segments(), 4);
        assert_eq!(
            policy.expire_after_write(),
            Some(Duration::from_secs(45 * 60))
        );
        assert_eq!(
            policy.expire_after_access(),
            Some(Duration::from_secs(15 * 60))
        );

        cache.insert('b', "Bob".to_string());
        assert_eq!(cache.get_if_present(&'b'), Some("Bob".to_string()));
    }

    #[test]
    fn build_loading_cache() {
        let cache = CacheBuilder::new(10)
            .refresh_after_write(Duration::from_secs(60))
            .build_with_loader(|key: &u32| Ok::<_, ()>(key * 10));

        assert_eq!(cache.get(&3), Ok(30));
        assert_eq!(
            cache.policy().refresh_after_write(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    #[should_panic(expected = "refresh_after_write requires a loader")]
    fn refresh_without_loader() {
        let _cache: Cache<u32, u32> = CacheBuilder::new(10)
            .refresh_after_write(Duration::from_secs(1))
            .build();
    }

    #[test]
    #[should_panic(expected = "expire_after_write is longer than 1000 years")]
    fn build_cache_too_long_ttl() {
        let thousand_years_secs: u64 = 1000 * 365 * 24 * 3600;
        let duration = Duration::from_secs(thousand_years_secs + 1);
        let _cache: Cache<char, String> = CacheBuilder::new(100)
            .expire_after_write(duration)
            .build();
    }

    #[test]
    #[should_panic(expected = "num_segments must be greater than zero")]
    fn zero_segments() {
        let _builder = CacheBuilder::<u32, u32>::new(100).segments(0);
    }
}
