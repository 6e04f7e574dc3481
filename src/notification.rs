//! Common data types for notifications.

pub(crate) mod notifier;

use std::sync::Arc;

pub(crate) type EvictionListener<K, V> =
    Arc<dyn Fn(Arc<K>, V, RemovalCause) + Send + Sync + 'static>;

/// Indicates the reason why a cached entry was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalCause {
    /// The entry's expiration timestamp has passed.
    Expired,
    /// The entry was manually removed by the user.
    Explicit,
    /// The entry itself was not actually removed, but its value was replaced by
    /// the user or by a background refresh.
    Replaced,
    /// The entry was evicted due to size constraints.
    Size,
}

impl RemovalCause {
    pub fn was_evicted(&self) -> bool {
        matches!(self, Self::Expired | Self::Size)
    }
}

#[cfg(test)]
mod tests {
    use super::RemovalCause;

    #[test]
    fn was_evicted() {
        assert!(RemovalCause::Expired.was_evicted());
        assert!(RemovalCause::Size.was_evicted());
        assert!(!RemovalCause::Explicit.was_evicted());
        assert!(!RemovalCause::Replaced.was_evicted());
    }
}
