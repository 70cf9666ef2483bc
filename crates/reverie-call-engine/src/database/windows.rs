//! Call window and day-mode operations

use chrono::{NaiveDate, NaiveTime, Weekday};
use reverie_core::{CallWindow, DayMode, UserId, WindowId, WindowKind};
use sqlx::Row;

use crate::error::{EngineError, Result};

use super::DatabaseManager;

fn weekday_to_i64(day: Weekday) -> i64 {
    day.num_days_from_monday() as i64
}

fn weekday_from_i64(n: i64) -> Result<Weekday> {
    match n {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        _ => Err(EngineError::database(format!("stored weekday invalid: {n}"))),
    }
}

fn window_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CallWindow> {
    let kind: String = row.try_get("kind")?;
    let start_time: NaiveTime = row.try_get("start_time")?;
    let end_time: NaiveTime = row.try_get("end_time")?;

    let kind = match kind.as_str() {
        "RECURRING" => WindowKind::Recurring {
            day_of_week: weekday_from_i64(row.try_get("day_of_week")?)?,
            start_time,
            end_time,
        },
        "ONE_OFF" => WindowKind::OneOff {
            date: row.try_get("date")?,
            start_time,
            end_time,
        },
        other => {
            return Err(EngineError::database(format!(
                "stored window kind invalid: {other}"
            )))
        }
    };

    Ok(CallWindow {
        id: WindowId(row.try_get("window_id")?),
        user_id: UserId(row.try_get("user_id")?),
        kind,
    })
}

impl DatabaseManager {
    /// Insert a window; duplicates of the same `(day_of_week, start_time)`
    /// or `(date, start_time)` per user surface as uniqueness violations.
    pub async fn insert_window(&self, window: &CallWindow) -> Result<()> {
        let (kind, day_of_week, date, start_time, end_time) = match &window.kind {
            WindowKind::Recurring {
                day_of_week,
                start_time,
                end_time,
            } => (
                "RECURRING",
                Some(weekday_to_i64(*day_of_week)),
                None::<NaiveDate>,
                *start_time,
                *end_time,
            ),
            WindowKind::OneOff {
                date,
                start_time,
                end_time,
            } => ("ONE_OFF", None, Some(*date), *start_time, *end_time),
        };

        sqlx::query(
            "INSERT INTO call_windows (window_id, user_id, kind, day_of_week, date,
                                       start_time, end_time)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(window.id.as_str())
        .bind(window.user_id.as_str())
        .bind(kind)
        .bind(day_of_week)
        .bind(date)
        .bind(start_time)
        .bind(end_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn windows_for_user(&self, user_id: &UserId) -> Result<Vec<CallWindow>> {
        let rows = sqlx::query(
            "SELECT window_id, user_id, kind, day_of_week, date, start_time, end_time
             FROM call_windows WHERE user_id = ? ORDER BY start_time",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut windows = Vec::with_capacity(rows.len());
        for row in rows {
            windows.push(window_from_row(&row)?);
        }
        Ok(windows)
    }

    /// Users the materializer sweeps: anyone with at least one window.
    pub async fn users_with_windows(&self) -> Result<Vec<UserId>> {
        let rows = sqlx::query("SELECT DISTINCT user_id FROM call_windows ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(UserId(row.try_get("user_id")?));
        }
        Ok(users)
    }

    pub async fn set_day_mode(&self, mode: &DayMode) -> Result<()> {
        sqlx::query(
            "INSERT INTO day_modes (user_id, date, use_recurring)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id, date) DO UPDATE SET use_recurring = excluded.use_recurring",
        )
        .bind(mode.user_id.as_str())
        .bind(mode.date)
        .bind(mode.use_recurring as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The mode for `(user, date)`, defaulting to recurring.
    pub async fn day_mode(&self, user_id: &UserId, date: NaiveDate) -> Result<DayMode> {
        let row = sqlx::query(
            "SELECT use_recurring FROM day_modes WHERE user_id = ? AND date = ?",
        )
        .bind(user_id.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(DayMode {
                user_id: user_id.clone(),
                date,
                use_recurring: row.try_get::<i64, _>("use_recurring")? != 0,
            }),
            None => Ok(DayMode::default_for(user_id.clone(), date)),
        }
    }
}
