//! Scheduled call operations
//!
//! The PENDING → IN_PROGRESS claim is the only lock between racing
//! dispatchers: a conditional update checked via `rows_affected`, exactly
//! one winner.

use chrono::{DateTime, Utc};
use reverie_core::{
    PhoneNumber, ScheduledCall, ScheduledCallId, ScheduledCallStatus, SessionId, UserId,
};
use sqlx::Row;

use crate::error::{EngineError, Result};

use super::DatabaseManager;

fn scheduled_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduledCall> {
    let status: String = row.try_get("status")?;
    let phone: String = row.try_get("phone_number")?;

    Ok(ScheduledCall {
        id: ScheduledCallId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        session_id: SessionId(row.try_get("session_id")?),
        phone_number: PhoneNumber::parse(&phone)?,
        scheduled_for: row.try_get("scheduled_for")?,
        status: ScheduledCallStatus::parse(&status)
            .ok_or_else(|| EngineError::database(format!("stored status invalid: {status}")))?,
        attempt_count: row.try_get::<i64, _>("attempt_count")? as u32,
        max_retries: row.try_get::<i64, _>("max_retries")? as u32,
        next_attempt_at: row.try_get("next_attempt_at")?,
        last_error: row.try_get("last_error")?,
    })
}

const SELECT_COLUMNS: &str = "id, user_id, session_id, phone_number, scheduled_for, status,
                              attempt_count, max_retries, next_attempt_at, last_error";

impl DatabaseManager {
    pub async fn insert_scheduled_call(&self, call: &ScheduledCall) -> Result<()> {
        sqlx::query(
            "INSERT INTO scheduled_calls (id, user_id, session_id, phone_number, scheduled_for,
                                          status, attempt_count, max_retries, next_attempt_at,
                                          last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(call.id.as_str())
        .bind(call.user_id.as_str())
        .bind(call.session_id.as_str())
        .bind(call.phone_number.as_str())
        .bind(call.scheduled_for)
        .bind(call.status.as_str())
        .bind(call.attempt_count as i64)
        .bind(call.max_retries as i64)
        .bind(call.next_attempt_at)
        .bind(&call.last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_scheduled_call(&self, id: &ScheduledCallId) -> Result<Option<ScheduledCall>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM scheduled_calls WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(scheduled_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn scheduled_call_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ScheduledCall>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM scheduled_calls
             WHERE session_id = ?
             ORDER BY scheduled_for DESC LIMIT 1"
        ))
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(scheduled_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Due calls for the dispatcher, oldest first.
    pub async fn due_scheduled_calls(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledCall>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM scheduled_calls
             WHERE status = 'PENDING'
               AND scheduled_for <= ?
               AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
             ORDER BY scheduled_for ASC
             LIMIT ?"
        ))
        .bind(now)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut calls = Vec::with_capacity(rows.len());
        for row in rows {
            calls.push(scheduled_from_row(&row)?);
        }
        Ok(calls)
    }

    /// Atomically claim a pending call. Losers of the race get `false`.
    pub async fn claim_scheduled_call(&self, id: &ScheduledCallId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_calls SET status = 'IN_PROGRESS'
             WHERE id = ? AND status = 'PENDING'",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn has_non_terminal_scheduled_call(&self, user_id: &UserId) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM scheduled_calls
             WHERE user_id = ? AND status IN ('PENDING', 'IN_PROGRESS')",
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    pub async fn complete_scheduled_call(&self, id: &ScheduledCallId) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_calls SET status = 'COMPLETED'
             WHERE id = ? AND status = 'IN_PROGRESS'",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a failed attempt and put the call back in the queue for a
    /// later retry.
    pub async fn reschedule_attempt(
        &self,
        id: &ScheduledCallId,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_calls
             SET status = 'PENDING',
                 attempt_count = attempt_count + 1,
                 next_attempt_at = ?,
                 last_error = ?
             WHERE id = ?",
        )
        .bind(next_attempt_at)
        .bind(error)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cancel pending calls that went stale without ever dialing (for
    /// example because the process was down for the whole window). Returns
    /// the session ids of the cancelled calls so their sessions can be
    /// abandoned too.
    pub async fn cancel_stale_scheduled_calls(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<SessionId>> {
        let rows = sqlx::query(
            "SELECT session_id FROM scheduled_calls
             WHERE status = 'PENDING' AND scheduled_for < ?",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(SessionId(row.try_get("session_id")?));
        }

        if !sessions.is_empty() {
            sqlx::query(
                "UPDATE scheduled_calls
                 SET status = 'CANCELLED', last_error = 'stale, never dispatched'
                 WHERE status = 'PENDING' AND scheduled_for < ?",
            )
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        }

        Ok(sessions)
    }

    /// Record a failed attempt with no retries left.
    pub async fn fail_scheduled_call(&self, id: &ScheduledCallId, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_calls
             SET status = 'FAILED',
                 attempt_count = attempt_count + 1,
                 next_attempt_at = NULL,
                 last_error = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scheduled(user: &str, session: &str, at: DateTime<Utc>) -> ScheduledCall {
        ScheduledCall {
            id: ScheduledCallId::new(),
            user_id: UserId::from(user),
            session_id: SessionId::from(session),
            phone_number: PhoneNumber::parse("+16175551212").unwrap(),
            scheduled_for: at,
            status: ScheduledCallStatus::Pending,
            attempt_count: 0,
            max_retries: 2,
            next_attempt_at: None,
            last_error: None,
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn due_query_honors_time_and_backoff() {
        let db = DatabaseManager::new_in_memory().await.unwrap();

        let due = scheduled("alice", "s1", at(9));
        let future = scheduled("bob", "s2", at(14));
        let mut backing_off = scheduled("carol", "s3", at(9));
        backing_off.next_attempt_at = Some(at(12));

        db.insert_scheduled_call(&due).await.unwrap();
        db.insert_scheduled_call(&future).await.unwrap();
        db.insert_scheduled_call(&backing_off).await.unwrap();

        let found = db.due_scheduled_calls(at(10), 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);

        // Past the backoff, the retried call is due again.
        let found = db.due_scheduled_calls(at(12), 10).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn claim_is_exactly_once() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let call = scheduled("alice", "s1", at(9));
        db.insert_scheduled_call(&call).await.unwrap();

        assert!(db.claim_scheduled_call(&call.id).await.unwrap());
        // The second claimant loses.
        assert!(!db.claim_scheduled_call(&call.id).await.unwrap());

        let loaded = db.get_scheduled_call(&call.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ScheduledCallStatus::InProgress);
    }

    #[tokio::test]
    async fn second_non_terminal_call_per_session_is_rejected() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        db.insert_scheduled_call(&scheduled("alice", "s1", at(9)))
            .await
            .unwrap();

        let err = db
            .insert_scheduled_call(&scheduled("alice", "s1", at(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Uniqueness(_)));
    }

    #[tokio::test]
    async fn retry_bookkeeping() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let call = scheduled("alice", "s1", at(9));
        db.insert_scheduled_call(&call).await.unwrap();
        db.claim_scheduled_call(&call.id).await.unwrap();

        db.reschedule_attempt(&call.id, "no-answer", at(9) + chrono::Duration::minutes(5))
            .await
            .unwrap();
        let loaded = db.get_scheduled_call(&call.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ScheduledCallStatus::Pending);
        assert_eq!(loaded.attempt_count, 1);
        assert!(loaded.next_attempt_at.is_some());
        assert_eq!(loaded.last_error.as_deref(), Some("no-answer"));

        db.claim_scheduled_call(&call.id).await.unwrap();
        db.fail_scheduled_call(&call.id, "no-answer").await.unwrap();
        let loaded = db.get_scheduled_call(&call.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ScheduledCallStatus::Failed);
        assert_eq!(loaded.attempt_count, 2);
    }
}
