//! Journal entry operations
//!
//! Entries are immutable once written. The unique `(user, local_date)`
//! index backs the one-entry-per-day invariant; a duplicate insert for the
//! same session is idempotent success, for a different session it is a
//! uniqueness violation. Deleting an entry removes its response snapshot
//! and nothing else.

use chrono::NaiveDate;
use reverie_core::{EntryId, JournalEntry, PromptId, PromptResponse, Rating, SessionId, UserId};
use sqlx::Row;

use crate::error::{EngineError, Result};

use super::DatabaseManager;

impl DatabaseManager {
    pub async fn insert_journal_entry(&self, entry: &JournalEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO journal_entries (id, user_id, session_id, local_date, rating, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.as_str())
        .bind(entry.user_id.as_str())
        .bind(entry.session_id.as_str())
        .bind(entry.local_date)
        .bind(entry.rating.map(|r| r.value() as i64))
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            tx.rollback().await.ok();
            let err = EngineError::from(err);
            if let EngineError::Uniqueness(_) = err {
                // Idempotent success when the existing entry is this
                // session's; otherwise surface the violation untouched.
                if let Some(existing) = self
                    .journal_entry_for(&entry.user_id, entry.local_date)
                    .await?
                {
                    if existing.session_id == entry.session_id {
                        return Ok(());
                    }
                }
            }
            return Err(err);
        }

        for response in &entry.responses {
            sqlx::query(
                "INSERT INTO journal_entry_responses (entry_id, position, prompt_id, prompt_text,
                                                      response_text, response_started,
                                                      response_finished)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.id.as_str())
            .bind(response.position as i64)
            .bind(response.prompt_id.as_str())
            .bind(&response.prompt_text)
            .bind(&response.response_text)
            .bind(response.response_started)
            .bind(response.response_finished)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn journal_entry_for(
        &self,
        user_id: &UserId,
        local_date: NaiveDate,
    ) -> Result<Option<JournalEntry>> {
        let row = sqlx::query(
            "SELECT id, user_id, session_id, local_date, rating, created_at
             FROM journal_entries WHERE user_id = ? AND local_date = ?",
        )
        .bind(user_id.as_str())
        .bind(local_date)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entry_id = EntryId(row.try_get("id")?);
        let session_id = SessionId(row.try_get("session_id")?);
        let rating: Option<i64> = row.try_get("rating")?;

        let response_rows = sqlx::query(
            "SELECT position, prompt_id, prompt_text, response_text, response_started,
                    response_finished
             FROM journal_entry_responses WHERE entry_id = ? ORDER BY position ASC",
        )
        .bind(entry_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut responses = Vec::with_capacity(response_rows.len());
        for r in response_rows {
            responses.push(PromptResponse {
                session_id: session_id.clone(),
                prompt_id: PromptId(r.try_get("prompt_id")?),
                prompt_text: r.try_get("prompt_text")?,
                position: r.try_get::<i64, _>("position")? as u32,
                response_text: r.try_get("response_text")?,
                response_started: r.try_get("response_started")?,
                response_finished: r.try_get("response_finished")?,
            });
        }

        Ok(Some(JournalEntry {
            id: entry_id,
            user_id: UserId(row.try_get("user_id")?),
            session_id,
            local_date: row.try_get("local_date")?,
            rating: rating.map(Rating::new).transpose()?,
            responses,
            created_at: row.try_get("created_at")?,
        }))
    }

    /// Delete an entry and its response snapshot. The underlying session is
    /// untouched.
    pub async fn delete_journal_entry(&self, id: &EntryId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM journal_entry_responses WHERE entry_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM journal_entries WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reverie_core::{ReflectionSession, SessionMethod, SessionStatus};

    fn entry(user: &str, session: &SessionId, date: NaiveDate) -> JournalEntry {
        let now = Utc::now();
        JournalEntry {
            id: EntryId::new(),
            user_id: UserId::from(user),
            session_id: session.clone(),
            local_date: date,
            rating: Some(Rating::new(-1).unwrap()),
            responses: vec![PromptResponse {
                session_id: session.clone(),
                prompt_id: PromptId::new(),
                prompt_text: "What are you grateful for?".to_string(),
                position: 1,
                response_text: "My family".to_string(),
                response_started: now,
                response_finished: now,
            }],
            created_at: now,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 5).unwrap()
    }

    #[tokio::test]
    async fn entry_round_trips() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let session = SessionId::new();
        let e = entry("alice", &session, date());
        db.insert_journal_entry(&e).await.unwrap();

        let loaded = db
            .journal_entry_for(&UserId::from("alice"), date())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.session_id, session);
        assert_eq!(loaded.rating.unwrap().value(), -1);
        assert_eq!(loaded.responses.len(), 1);
        assert_eq!(loaded.responses[0].response_text, "My family");
    }

    #[tokio::test]
    async fn duplicate_date_is_rejected_without_mutating_the_first() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let first = entry("alice", &SessionId::new(), date());
        db.insert_journal_entry(&first).await.unwrap();

        // A different session on the same date: uniqueness violation.
        let second = entry("alice", &SessionId::new(), date());
        let err = db.insert_journal_entry(&second).await.unwrap_err();
        assert!(matches!(err, EngineError::Uniqueness(_)));

        let loaded = db
            .journal_entry_for(&UserId::from("alice"), date())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id, first.id);
        assert_eq!(loaded.responses.len(), 1);
    }

    #[tokio::test]
    async fn same_session_duplicate_is_idempotent() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let session = SessionId::new();
        let e = entry("alice", &session, date());
        db.insert_journal_entry(&e).await.unwrap();

        // Redelivery of the same materialization succeeds quietly.
        let again = entry("alice", &session, date());
        db.insert_journal_entry(&again).await.unwrap();

        let loaded = db
            .journal_entry_for(&UserId::from("alice"), date())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id, e.id);
    }

    #[tokio::test]
    async fn delete_spares_the_session() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let session = ReflectionSession {
            id: SessionId::new(),
            user_id: UserId::from("alice"),
            method: SessionMethod::Phone,
            status: SessionStatus::InProgress,
            prompts: vec![],
            rating: None,
            started_at: Utc::now(),
            ended_at: None,
            recording_url: None,
        };
        db.insert_session(&session).await.unwrap();

        let e = entry("alice", &session.id, date());
        db.insert_journal_entry(&e).await.unwrap();

        assert!(db.delete_journal_entry(&e.id).await.unwrap());
        assert!(db
            .journal_entry_for(&UserId::from("alice"), date())
            .await
            .unwrap()
            .is_none());

        // The session survives the entry.
        assert!(db.get_session(&session.id).await.unwrap().is_some());

        // Deleting twice is a no-op.
        assert!(!db.delete_journal_entry(&e.id).await.unwrap());
    }
}
