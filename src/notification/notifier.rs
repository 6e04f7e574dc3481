use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::notification::{EvictionListener, RemovalCause};

pub(crate) struct RemovedEntry<K, V> {
    pub(crate) key: Arc<K>,
    pub(crate) value: V,
    pub(crate) cause: RemovalCause,
}

impl<K, V> RemovedEntry<K, V> {
    pub(crate) fn new(key: Arc<K>, value: V, cause: RemovalCause) -> Self {
        Self { key, value, cause }
    }
}

/// Delivers removal notifications to the user's eviction listener. Callers must
/// not hold a segment lock while notifying.
pub(crate) struct RemovalNotifier<K, V> {
    listener: EvictionListener<K, V>,
    is_enabled: AtomicBool,
    #[cfg(feature = "logging")]
    cache_name: Option<String>,
}

impl<K, V> RemovalNotifier<K, V> {
    pub(crate) fn new(listener: EvictionListener<K, V>, _cache_name: Option<String>) -> Self {
        Self {
            listener,
            is_enabled: AtomicBool::new(true),
            #[cfg(feature = "logging")]
            cache_name: _cache_name,
        }
    }

    pub(crate) fn notify(&self, entry: RemovedEntry<K, V>) {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        if !self.is_enabled.load(Ordering::Acquire) {
            return;
        }

        let RemovedEntry { key, value, cause } = entry;
        let listener_clo = || (self.listener)(key, value, cause);

        // Safety: It is safe to assert unwind safety here because we will not
        // call the listener again if it has been panicked.
        let result = catch_unwind(AssertUnwindSafe(listener_clo));
        if let Err(_payload) = result {
            self.is_enabled.store(false, Ordering::Release);
            #[cfg(feature = "logging")]
            crate::common::log_panic(
                "Disabled the eviction listener because it panicked",
                &*_payload,
                self.cache_name.as_deref(),
            );
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.is_enabled.load(Ordering::Acquire)
    }
}
