pub(crate) mod builder_utils;
pub(crate) mod deque;
pub(crate) mod error;
pub(crate) mod time;

#[cfg(test)]
pub(crate) mod test_utils;

pub(crate) fn available_parallelism() -> usize {
    use std::{num::NonZeroUsize, thread::available_parallelism};
    available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Returns `"[name] "`, or an empty string for an unnamed cache.
#[cfg(feature = "logging")]
pub(crate) fn log_prefix(cache_name: Option<&str>) -> String {
    cache_name
        .map(|name| format!("[{name}] "))
        .unwrap_or_default()
}

#[cfg(feature = "logging")]
pub(crate) fn log_panic(
    what: &str,
    payload: &(dyn std::any::Any + Send + 'static),
    cache_name: Option<&str>,
) {
    // Try to downcast the payload into &str or String.
    let message: Option<std::borrow::Cow<'_, str>> =
        (payload.downcast_ref::<&str>().map(|s| (*s).into()))
            .or_else(|| payload.downcast_ref::<String>().map(Into::into));

    let cn = log_prefix(cache_name);

    if let Some(m) = message {
        log::error!("{cn}{what} at '{m}'");
    } else {
        log::error!("{cn}{what}");
    }
}
