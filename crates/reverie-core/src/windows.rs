//! Availability windows and day-mode resolution
//!
//! A user describes when they are willing to take a reflection call either as
//! recurring weekly windows or as one-off windows for a specific date. A
//! per-day [`DayMode`] selects which variant applies (recurring by default).
//! Windows are half-open intervals: `start_time` is inside, `end_time` is not.

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::UserId;
use uuid::Uuid;

/// Identifier for a call window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub String);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two window variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowKind {
    Recurring {
        day_of_week: Weekday,
        start_time: NaiveTime,
        end_time: NaiveTime,
    },
    OneOff {
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    },
}

/// A user's availability window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallWindow {
    pub id: WindowId,
    pub user_id: UserId,
    pub kind: WindowKind,
}

impl CallWindow {
    pub fn recurring(
        user_id: UserId,
        day_of_week: Weekday,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self> {
        if end_time <= start_time {
            return Err(CoreError::InvalidWindow(format!(
                "end_time {end_time} must be after start_time {start_time}"
            )));
        }
        Ok(CallWindow {
            id: WindowId::new(),
            user_id,
            kind: WindowKind::Recurring {
                day_of_week,
                start_time,
                end_time,
            },
        })
    }

    pub fn one_off(
        user_id: UserId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self> {
        if end_time <= start_time {
            return Err(CoreError::InvalidWindow(format!(
                "end_time {end_time} must be after start_time {start_time}"
            )));
        }
        Ok(CallWindow {
            id: WindowId::new(),
            user_id,
            kind: WindowKind::OneOff {
                date,
                start_time,
                end_time,
            },
        })
    }

    pub fn start_time(&self) -> NaiveTime {
        match &self.kind {
            WindowKind::Recurring { start_time, .. } | WindowKind::OneOff { start_time, .. } => {
                *start_time
            }
        }
    }

    /// Whether this window is in play on `date` under the given mode.
    pub fn applies_on(&self, date: NaiveDate, use_recurring: bool) -> bool {
        use chrono::Datelike;
        match &self.kind {
            WindowKind::Recurring { day_of_week, .. } => {
                use_recurring && date.weekday() == *day_of_week
            }
            WindowKind::OneOff { date: d, .. } => !use_recurring && *d == date,
        }
    }

    /// Whether `time` falls inside the window interval `[start, end)`.
    pub fn contains(&self, time: NaiveTime) -> bool {
        match &self.kind {
            WindowKind::Recurring {
                start_time,
                end_time,
                ..
            }
            | WindowKind::OneOff {
                start_time,
                end_time,
                ..
            } => *start_time <= time && time < *end_time,
        }
    }

    /// Two windows collide when they share a variant key: (day_of_week,
    /// start_time) for recurring, (date, start_time) for one-off.
    pub fn conflicts_with(&self, other: &CallWindow) -> bool {
        match (&self.kind, &other.kind) {
            (
                WindowKind::Recurring {
                    day_of_week: d1,
                    start_time: s1,
                    ..
                },
                WindowKind::Recurring {
                    day_of_week: d2,
                    start_time: s2,
                    ..
                },
            ) => d1 == d2 && s1 == s2,
            (
                WindowKind::OneOff {
                    date: d1,
                    start_time: s1,
                    ..
                },
                WindowKind::OneOff {
                    date: d2,
                    start_time: s2,
                    ..
                },
            ) => d1 == d2 && s1 == s2,
            _ => false,
        }
    }
}

/// Per-(user, date) selection between recurring and one-off windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayMode {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub use_recurring: bool,
}

impl DayMode {
    /// The default when no explicit mode is stored for the day.
    pub fn default_for(user_id: UserId, date: NaiveDate) -> Self {
        DayMode {
            user_id,
            date,
            use_recurring: true,
        }
    }
}

/// The windows in play for `date` under `mode`.
pub fn applicable_windows<'a>(
    windows: &'a [CallWindow],
    date: NaiveDate,
    mode: &DayMode,
) -> Vec<&'a CallWindow> {
    windows
        .iter()
        .filter(|w| w.applies_on(date, mode.use_recurring))
        .collect()
}

/// Whether any applicable window contains the given wall-clock time.
pub fn window_open_at(
    windows: &[CallWindow],
    date: NaiveDate,
    time: NaiveTime,
    mode: &DayMode,
) -> bool {
    applicable_windows(windows, date, mode)
        .iter()
        .any(|w| w.contains(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        // 2025-11-03 is a Monday.
        NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
    }

    #[test]
    fn rejects_inverted_interval() {
        let user = UserId::new();
        assert!(CallWindow::recurring(user.clone(), Weekday::Mon, t(10, 0), t(9, 0)).is_err());
        assert!(CallWindow::recurring(user, Weekday::Mon, t(9, 0), t(9, 0)).is_err());
    }

    #[test]
    fn interval_is_half_open() {
        let w = CallWindow::recurring(UserId::new(), Weekday::Mon, t(9, 0), t(10, 0)).unwrap();
        assert!(w.contains(t(9, 0)));
        assert!(w.contains(t(9, 59)));
        assert!(!w.contains(t(10, 0)));
        assert!(!w.contains(t(8, 59)));
    }

    #[test]
    fn recurring_applies_on_matching_weekday() {
        let user = UserId::new();
        let w = CallWindow::recurring(user.clone(), Weekday::Mon, t(9, 0), t(10, 0)).unwrap();
        assert!(w.applies_on(monday(), true));
        assert!(!w.applies_on(monday() + chrono::Duration::days(1), true));
        // Day mode switched to one-off: recurring windows are out.
        assert!(!w.applies_on(monday(), false));
    }

    #[test]
    fn one_off_applies_only_on_its_date_in_one_off_mode() {
        let user = UserId::new();
        let w = CallWindow::one_off(user.clone(), monday(), t(19, 0), t(20, 0)).unwrap();
        assert!(w.applies_on(monday(), false));
        assert!(!w.applies_on(monday(), true));
        assert!(!w.applies_on(monday() + chrono::Duration::days(1), false));
    }

    #[test]
    fn conflict_detection_per_variant() {
        let user = UserId::new();
        let a = CallWindow::recurring(user.clone(), Weekday::Mon, t(9, 0), t(10, 0)).unwrap();
        let b = CallWindow::recurring(user.clone(), Weekday::Mon, t(9, 0), t(11, 0)).unwrap();
        let c = CallWindow::recurring(user.clone(), Weekday::Tue, t(9, 0), t(10, 0)).unwrap();
        let d = CallWindow::one_off(user, monday(), t(9, 0), t(10, 0)).unwrap();

        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&c));
        // Variants never conflict across each other.
        assert!(!a.conflicts_with(&d));
    }

    #[test]
    fn open_at_honors_day_mode() {
        let user = UserId::new();
        let windows = vec![
            CallWindow::recurring(user.clone(), Weekday::Mon, t(9, 0), t(10, 0)).unwrap(),
            CallWindow::one_off(user.clone(), monday(), t(19, 0), t(20, 0)).unwrap(),
        ];

        let recurring = DayMode::default_for(user.clone(), monday());
        assert!(window_open_at(&windows, monday(), t(9, 15), &recurring));
        assert!(!window_open_at(&windows, monday(), t(19, 15), &recurring));

        let one_off = DayMode {
            user_id: user,
            date: monday(),
            use_recurring: false,
        };
        assert!(!window_open_at(&windows, monday(), t(9, 15), &one_off));
        assert!(window_open_at(&windows, monday(), t(19, 15), &one_off));
    }
}
