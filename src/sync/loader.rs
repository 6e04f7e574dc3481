use std::fmt;

/// Computes the values of a [`LoadingCache`][loading-cache].
///
/// `load` is called when a key has no fresh value. `reload` is called from a
/// background thread to refresh a value that is older than
/// `refresh_after_write`. By default it calls `load`.
///
/// Both methods may be called concurrently for different keys, but never more
/// than once at a time for the same key of the same cache.
///
/// Any `Fn(&K) -> Result<V, E>` closure is a `CacheLoader`.
///
/// # Examples
///
/// ```rust
/// use loading_cache::sync::CacheLoader;
///
/// struct Doubler;
///
/// impl CacheLoader<u32, u64> for Doubler {
///     type Error = String;
///
///     fn load(&self, key: &u32) -> Result<u64, Self::Error> {
///         Ok(*key as u64 * 2)
///     }
///
///     // Reuse the old value instead of computing from scratch.
///     fn reload(&self, _key: &u32, old_value: &u64) -> Result<u64, Self::Error> {
///         Ok(*old_value)
///     }
/// }
/// ```
///
/// [loading-cache]: ./struct.LoadingCache.html
pub trait CacheLoader<K, V>: Send + Sync + 'static {
    /// The error returned by a failed load. Callers of `get` receive it wrapped
    /// in an `Arc`, shared by every caller that waited for the same load.
    type Error: fmt::Debug + Send + Sync + 'static;

    fn load(&self, key: &K) -> Result<V, Self::Error>;

    /// Computes a replacement for `old_value`. An error keeps `old_value` in the
    /// cache.
    fn reload(&self, key: &K, old_value: &V) -> Result<V, Self::Error> {
        let _ = old_value;
        self.load(key)
    }
}

impl<K, V, E, F> CacheLoader<K, V> for F
where
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    E: fmt::Debug + Send + Sync + 'static,
{
    type Error = E;

    fn load(&self, key: &K) -> Result<V, E> {
        self(key)
    }
}
