//! Wall-clock abstraction used when filters reference the current time.
//!
//! Filters may contain the `${__now:date}` token, which is resolved to the
//! current instant at compile time. Injecting the clock keeps compilation
//! deterministic under test.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};

/// Abstraction over the system clock for dependency injection.
///
/// The default implementation ([`SystemClock`]) delegates to `std::time::SystemTime`.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
            })
    }
}

/// Clock frozen at a fixed instant. Used by tests and replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub u64);

impl ClockSource for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Renders epoch milliseconds as ISO-8601 with millisecond precision and a
/// `Z` suffix, e.g. `2024-03-01T12:00:00.000Z`.
///
/// Out-of-range inputs clamp to the Unix epoch.
#[must_use]
pub fn iso_timestamp(millis: u64) -> String {
    let millis = i64::try_from(millis).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_nonzero() {
        let clock = SystemClock;
        assert!(clock.now() > 0);
    }

    #[test]
    fn fixed_clock_is_frozen() {
        let clock = FixedClock(42);
        assert_eq!(clock.now(), 42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn iso_timestamp_has_millis_and_zulu() {
        assert_eq!(iso_timestamp(1_709_294_400_000), "2024-03-01T12:00:00.000Z");
        assert_eq!(iso_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_timestamp(1_709_294_400_123), "2024-03-01T12:00:00.123Z");
    }
}
