//! Injectable clock and timezone-aware date helpers
//!
//! All scheduling and endpointing logic takes a [`Clock`] instead of calling
//! `Utc::now()` directly, so tests can drive time deterministically with a
//! [`ManualClock`].

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use std::sync::Arc;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The calendar date of `instant` in the user's timezone.
pub fn local_date(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// The wall-clock time of `instant` in the user's timezone.
pub fn local_time(tz: Tz, instant: DateTime<Utc>) -> NaiveTime {
    instant.with_timezone(&tz).time()
}

/// System clock for production use.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.write();
        *now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 14, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }

    #[test]
    fn local_date_crosses_midnight() {
        // 2025-11-04 03:30 UTC is still 2025-11-03 in New York (UTC-5).
        let instant = Utc.with_ymd_and_hms(2025, 11, 4, 3, 30, 0).unwrap();
        let tz: Tz = "America/New_York".parse().unwrap();
        assert_eq!(
            local_date(tz, instant),
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
        );

        let utc: Tz = "UTC".parse().unwrap();
        assert_eq!(
            local_date(utc, instant),
            NaiveDate::from_ymd_opt(2025, 11, 4).unwrap()
        );
    }

    #[test]
    fn local_time_respects_timezone() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 2, 13, 15, 0).unwrap();
        let tz: Tz = "America/New_York".parse().unwrap();
        // EDT is UTC-4 in June.
        assert_eq!(
            local_time(tz, instant),
            NaiveTime::from_hms_opt(9, 15, 0).unwrap()
        );
    }
}
