//! Wall-clock abstraction.
//!
//! Cache freshness and pre-check targets are wall-clock decisions (alarms are
//! set in local time and must survive device sleep), so they go through
//! [`Clock`] instead of a monotonic instant. Loop pacing uses tokio's clock.

use std::time::Duration;

use time::OffsetDateTime;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Whether a value confirmed at `confirmed_at` is younger than `ttl` at `now`.
///
/// A confirmation time in the future (wall clock moved backwards) counts as
/// fresh.
pub fn is_fresh(confirmed_at: OffsetDateTime, now: OffsetDateTime, ttl: Duration) -> bool {
    let age = now - confirmed_at;
    age.is_negative() || age.unsigned_abs() < ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_is_fresh() {
        let at = datetime!(2026-10-19 06:00 UTC);
        let ttl = Duration::from_secs(30 * 60);

        assert!(is_fresh(at, at, ttl));
        assert!(is_fresh(at, at + time::Duration::minutes(29), ttl));
        assert!(!is_fresh(at, at + time::Duration::minutes(30), ttl));
        assert!(!is_fresh(at, at + time::Duration::hours(5), ttl));
    }

    #[test]
    fn test_future_confirmation_is_fresh() {
        let at = datetime!(2026-10-19 06:00 UTC);
        assert!(is_fresh(
            at,
            at - time::Duration::hours(1),
            Duration::from_secs(1)
        ));
    }

    #[test]
    fn test_system_clock_is_utc() {
        assert!(SystemClock.now().offset().is_utc());
    }
}
