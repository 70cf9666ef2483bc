//! Prompt response operations
//!
//! Positions are 1-based and contiguous within a session; the primary key
//! catches duplicates and an explicit check catches gaps. A divergent
//! prompt list fails at the first bad write, not at entry time.

use reverie_core::{PromptId, PromptResponse, SessionId};
use sqlx::Row;

use crate::error::{EngineError, Result};

use super::DatabaseManager;

pub(crate) fn response_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PromptResponse> {
    Ok(PromptResponse {
        session_id: SessionId(row.try_get("session_id")?),
        prompt_id: PromptId(row.try_get("prompt_id")?),
        prompt_text: row.try_get("prompt_text")?,
        position: row.try_get::<i64, _>("position")? as u32,
        response_text: row.try_get("response_text")?,
        response_started: row.try_get("response_started")?,
        response_finished: row.try_get("response_finished")?,
    })
}

impl DatabaseManager {
    /// Insert the next response. The position must extend the existing
    /// prefix by exactly one.
    pub async fn insert_response(&self, response: &PromptResponse) -> Result<()> {
        let existing = self.response_count(&response.session_id).await?;
        if response.position != existing + 1 {
            return Err(EngineError::validation(format!(
                "response position {} does not extend prefix of {} for session {}",
                response.position, existing, response.session_id
            )));
        }

        sqlx::query(
            "INSERT INTO prompt_responses (session_id, prompt_id, prompt_text, position,
                                           response_text, response_started, response_finished)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(response.session_id.as_str())
        .bind(response.prompt_id.as_str())
        .bind(&response.prompt_text)
        .bind(response.position as i64)
        .bind(&response.response_text)
        .bind(response.response_started)
        .bind(response.response_finished)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn response_count(&self, session_id: &SessionId) -> Result<u32> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM prompt_responses WHERE session_id = ?")
            .bind(session_id.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<i64, _>("n")? as u32)
    }

    /// Drop a session's responses. Used when a retry attempt restarts the
    /// dialog from the first prompt; the journal entry only ever
    /// materializes from a complete pass.
    pub async fn delete_responses_for_session(&self, session_id: &SessionId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM prompt_responses WHERE session_id = ?")
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// All responses for a session in position order.
    pub async fn responses_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<PromptResponse>> {
        let rows = sqlx::query(
            "SELECT session_id, prompt_id, prompt_text, position, response_text,
                    response_started, response_finished
             FROM prompt_responses WHERE session_id = ? ORDER BY position ASC",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut responses = Vec::with_capacity(rows.len());
        for row in rows {
            responses.push(response_from_row(&row)?);
        }
        Ok(responses)
    }
}
