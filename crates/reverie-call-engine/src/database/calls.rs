//! Phone call operations
//!
//! The rows back the call state machine: status moves only along legal
//! edges via CAS, the provider SID is assigned exactly once, and a partial
//! unique index keeps each user to one non-terminal call.

use chrono::{DateTime, Utc};
use reverie_core::{CallId, PhoneCall, PhoneCallStatus, Prompt, ProviderCallSid, SessionId, UserId};
use sqlx::Row;

use crate::error::{EngineError, Result};

use super::DatabaseManager;

fn call_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PhoneCall> {
    let status: String = row.try_get("status")?;
    let prompts: String = row.try_get("prompts")?;
    let sid: Option<String> = row.try_get("provider_call_sid")?;

    Ok(PhoneCall {
        id: CallId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        session_id: SessionId(row.try_get("session_id")?),
        provider_call_sid: sid.map(ProviderCallSid),
        status: PhoneCallStatus::parse(&status)
            .ok_or_else(|| EngineError::database(format!("stored status invalid: {status}")))?,
        prompts: serde_json::from_str::<Vec<Prompt>>(&prompts)?,
        current_prompt_index: row.try_get::<i64, _>("current_prompt_index")? as usize,
        current_response_buffer: row.try_get("current_response_buffer")?,
        last_speech_time: row.try_get("last_speech_time")?,
        initiated_at: row.try_get("initiated_at")?,
        connected_at: row.try_get("connected_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

const SELECT_COLUMNS: &str = "id, user_id, session_id, provider_call_sid, status, prompts,
                              current_prompt_index, current_response_buffer, last_speech_time,
                              initiated_at, connected_at, ended_at";

impl DatabaseManager {
    pub async fn insert_phone_call(&self, call: &PhoneCall) -> Result<()> {
        sqlx::query(
            "INSERT INTO phone_calls (id, user_id, session_id, provider_call_sid, status,
                                      prompts, current_prompt_index, current_response_buffer,
                                      last_speech_time, initiated_at, connected_at, ended_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(call.id.as_str())
        .bind(call.user_id.as_str())
        .bind(call.session_id.as_str())
        .bind(call.provider_call_sid.as_ref().map(|s| s.as_str()))
        .bind(call.status.as_str())
        .bind(serde_json::to_string(&call.prompts)?)
        .bind(call.current_prompt_index as i64)
        .bind(&call.current_response_buffer)
        .bind(call.last_speech_time)
        .bind(call.initiated_at)
        .bind(call.connected_at)
        .bind(call.ended_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_phone_call(&self, id: &CallId) -> Result<Option<PhoneCall>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM phone_calls WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(call_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn phone_call_by_sid(&self, sid: &ProviderCallSid) -> Result<Option<PhoneCall>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM phone_calls WHERE provider_call_sid = ?"
        ))
        .bind(sid.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(call_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Assign the provider SID, exactly once.
    pub async fn assign_provider_sid(&self, id: &CallId, sid: &ProviderCallSid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE phone_calls SET provider_call_sid = ?
             WHERE id = ? AND provider_call_sid IS NULL",
        )
        .bind(sid.as_str())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::validation(format!(
                "call {id} already has a provider SID"
            )));
        }
        Ok(())
    }

    /// Move the call along one legal state-machine edge. Returns false when
    /// the CAS loses (the call was not in `expected` anymore); illegal edges
    /// are rejected outright.
    pub async fn transition_phone_call(
        &self,
        id: &CallId,
        expected: PhoneCallStatus,
        next: PhoneCallStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !expected.can_transition_to(next) {
            return Err(EngineError::validation(format!(
                "illegal call transition {} -> {}",
                expected.as_str(),
                next.as_str()
            )));
        }

        let connected_at = (next == PhoneCallStatus::Connected).then_some(now);
        let ended_at = next.is_terminal().then_some(now);

        let result = sqlx::query(
            "UPDATE phone_calls
             SET status = ?,
                 connected_at = COALESCE(?, connected_at),
                 ended_at = COALESCE(?, ended_at)
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(connected_at)
        .bind(ended_at)
        .bind(id.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn has_non_terminal_call_for_user(&self, user_id: &UserId) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM phone_calls
             WHERE user_id = ? AND status IN ('INITIATED', 'CONNECTED')",
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    /// Persist the runtime's turn progress: prompt index and buffer.
    pub async fn update_dialog_progress(
        &self,
        id: &CallId,
        current_prompt_index: usize,
        current_response_buffer: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE phone_calls
             SET current_prompt_index = ?, current_response_buffer = ?
             WHERE id = ?",
        )
        .bind(current_prompt_index as i64)
        .bind(current_response_buffer)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn touch_speech_time(&self, id: &CallId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE phone_calls SET last_speech_time = ? WHERE id = ?")
            .bind(at)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
