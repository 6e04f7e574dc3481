use std::time::Duration;

const YEAR_SECONDS: u64 = 365 * 24 * 3600;

pub(crate) fn ensure_durations_or_panic(
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
    refresh_after_write: Option<Duration>,
) {
    let max_duration = Duration::from_secs(1_000 * YEAR_SECONDS);
    if let Some(d) = expire_after_write {
        assert!(
            d <= max_duration,
            "expire_after_write is longer than 1000 years"
        );
    }
    if let Some(d) = expire_after_access {
        assert!(
            d <= max_duration,
            "expire_after_access is longer than 1000 years"
        );
    }
    if let Some(d) = refresh_after_write {
        assert!(
            d <= max_duration,
            "refresh_after_write is longer than 1000 years"
        );
        assert!(d > Duration::ZERO, "refresh_after_write must be non-zero");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_durations() {
        ensure_durations_or_panic(
            Some(Duration::from_secs(5)),
            None,
            Some(Duration::from_secs(2)),
        );
        ensure_durations_or_panic(None, None, None);
    }

    #[test]
    #[should_panic(expected = "expire_after_write is longer than 1000 years")]
    fn rejects_huge_expire_after_write() {
        ensure_durations_or_panic(Some(Duration::from_secs(1_001 * YEAR_SECONDS)), None, None);
    }

    #[test]
    #[should_panic(expected = "refresh_after_write must be non-zero")]
    fn rejects_zero_refresh() {
        ensure_durations_or_panic(None, None, Some(Duration::ZERO));
    }
}
