//! Reflection session operations
//!
//! A partial unique index keeps each user to one IN_PROGRESS session. The
//! prompt snapshot is only mutable while IN_PROGRESS, which is what lets
//! the dispatcher refresh it right before dialing without racing the
//! runtime.

use chrono::{DateTime, Utc};
use reverie_core::{
    Prompt, Rating, ReflectionSession, SessionId, SessionMethod, SessionStatus, UserId,
};
use sqlx::Row;

use crate::error::{EngineError, Result};

use super::DatabaseManager;

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ReflectionSession> {
    let status: String = row.try_get("status")?;
    let method: String = row.try_get("method")?;
    let prompts: String = row.try_get("prompts")?;
    let rating: Option<i64> = row.try_get("rating")?;

    Ok(ReflectionSession {
        id: SessionId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        method: SessionMethod::parse(&method)
            .ok_or_else(|| EngineError::database(format!("stored method invalid: {method}")))?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| EngineError::database(format!("stored status invalid: {status}")))?,
        prompts: serde_json::from_str::<Vec<Prompt>>(&prompts)?,
        rating: rating.map(Rating::new).transpose()?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        recording_url: row.try_get("recording_url")?,
    })
}

const SELECT_COLUMNS: &str =
    "id, user_id, method, status, prompts, rating, started_at, ended_at, recording_url";

impl DatabaseManager {
    pub async fn insert_session(&self, session: &ReflectionSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO reflection_sessions (id, user_id, method, status, prompts, rating,
                                              started_at, ended_at, recording_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.as_str())
        .bind(session.user_id.as_str())
        .bind(session.method.as_str())
        .bind(session.status.as_str())
        .bind(serde_json::to_string(&session.prompts)?)
        .bind(session.rating.map(|r| r.value() as i64))
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(&session.recording_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<Option<ReflectionSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM reflection_sessions WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(session_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn in_progress_session_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ReflectionSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM reflection_sessions
             WHERE user_id = ? AND status = 'IN_PROGRESS'"
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(session_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Replace the prompt snapshot. Only legal while IN_PROGRESS.
    pub async fn update_session_prompts(
        &self,
        id: &SessionId,
        prompts: &[Prompt],
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE reflection_sessions SET prompts = ?
             WHERE id = ? AND status = 'IN_PROGRESS'",
        )
        .bind(serde_json::to_string(prompts)?)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::validation(format!(
                "session {id} is not in progress, prompt list is frozen"
            )));
        }
        Ok(())
    }

    pub async fn set_session_rating(&self, id: &SessionId, rating: Rating) -> Result<()> {
        sqlx::query(
            "UPDATE reflection_sessions SET rating = ?
             WHERE id = ? AND status = 'IN_PROGRESS'",
        )
        .bind(rating.value() as i64)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn complete_session(&self, id: &SessionId, ended_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reflection_sessions SET status = 'COMPLETED', ended_at = ?
             WHERE id = ? AND status = 'IN_PROGRESS'",
        )
        .bind(ended_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Abandon an in-progress session; a no-op on terminal sessions so the
    /// hangup path can be delivered twice.
    pub async fn abandon_session(&self, id: &SessionId, ended_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reflection_sessions SET status = 'ABANDONED', ended_at = ?
             WHERE id = ? AND status = 'IN_PROGRESS'",
        )
        .bind(ended_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bring an abandoned session back for a retry attempt. Completed
    /// sessions stay completed.
    pub async fn reactivate_session(&self, id: &SessionId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reflection_sessions SET status = 'IN_PROGRESS', ended_at = NULL
             WHERE id = ? AND status = 'ABANDONED'",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_session_recording_url(&self, id: &SessionId, sealed: &str) -> Result<()> {
        sqlx::query("UPDATE reflection_sessions SET recording_url = ? WHERE id = ?")
            .bind(sealed)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::PromptId;

    fn session(user: &str) -> ReflectionSession {
        ReflectionSession {
            id: SessionId::new(),
            user_id: UserId::from(user),
            method: SessionMethod::Phone,
            status: SessionStatus::InProgress,
            prompts: vec![Prompt {
                prompt_id: PromptId::new(),
                prompt_text: "What are you grateful for?".to_string(),
                is_rating: false,
            }],
            rating: None,
            started_at: Utc::now(),
            ended_at: None,
            recording_url: None,
        }
    }

    #[tokio::test]
    async fn session_round_trips() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let s = session("alice");
        db.insert_session(&s).await.unwrap();

        let loaded = db.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::InProgress);
        assert_eq!(loaded.prompts, s.prompts);
        assert_eq!(loaded.rating, None);
    }

    #[tokio::test]
    async fn one_in_progress_session_per_user() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        db.insert_session(&session("alice")).await.unwrap();

        let err = db.insert_session(&session("alice")).await.unwrap_err();
        assert!(matches!(err, EngineError::Uniqueness(_)));

        // A different user is fine.
        db.insert_session(&session("bob")).await.unwrap();
    }

    #[tokio::test]
    async fn prompt_list_frozen_after_completion() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let s = session("alice");
        db.insert_session(&s).await.unwrap();

        db.update_session_prompts(&s.id, &s.prompts).await.unwrap();
        assert!(db.complete_session(&s.id, Utc::now()).await.unwrap());

        let err = db.update_session_prompts(&s.id, &s.prompts).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn abandon_is_idempotent_and_reactivation_works() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let s = session("alice");
        db.insert_session(&s).await.unwrap();

        assert!(db.abandon_session(&s.id, Utc::now()).await.unwrap());
        // Second delivery changes nothing.
        assert!(!db.abandon_session(&s.id, Utc::now()).await.unwrap());

        // Retry dispatch reactivates it.
        assert!(db.reactivate_session(&s.id).await.unwrap());
        let loaded = db.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::InProgress);
        assert!(loaded.ended_at.is_none());

        // Completed sessions cannot be reactivated.
        assert!(db.complete_session(&s.id, Utc::now()).await.unwrap());
        assert!(!db.reactivate_session(&s.id).await.unwrap());
    }

    #[tokio::test]
    async fn rating_sticks() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let s = session("alice");
        db.insert_session(&s).await.unwrap();

        db.set_session_rating(&s.id, Rating::new(-1).unwrap())
            .await
            .unwrap();
        let loaded = db.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded.rating.unwrap().value(), -1);
    }
}
