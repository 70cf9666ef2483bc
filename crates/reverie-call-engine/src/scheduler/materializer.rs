//! Window materializer
//!
//! Periodically turns availability windows into a ReflectionSession +
//! ScheduledCall pair. The prompt list is snapshotted onto the session at
//! materialization time so later template edits cannot desynchronize an
//! in-flight call, and so tests can fix the dialog deterministically.

use std::sync::Arc;

use reverie_core::{
    local_date, local_time, window_open_at, Clock, ReflectionSession, ScheduledCall,
    ScheduledCallId, ScheduledCallStatus, SessionId, SessionMethod, SessionStatus, UserId,
};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::orchestrator::CallEngine;

use super::build_prompt_list;

pub struct WindowMaterializer {
    engine: Arc<CallEngine>,
}

impl WindowMaterializer {
    pub fn new(engine: Arc<CallEngine>) -> Self {
        Self { engine }
    }

    /// The periodic loop. Errors are logged, never fatal to the sweep.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.engine.config().scheduler.window_poll);
        loop {
            interval.tick().await;
            match self.run_once().await {
                Ok(0) => {}
                Ok(created) => info!("📅 Materialized {created} scheduled call(s)"),
                Err(err) => error!("Window materializer sweep failed: {err}"),
            }
        }
    }

    /// One sweep over every user with windows. A slow or failing user never
    /// blocks the rest.
    pub async fn run_once(&self) -> Result<u32> {
        self.cancel_stale().await?;

        let users = self.engine.db().users_with_windows().await?;
        let mut created = 0;

        for user in users {
            match self.materialize_user(&user).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(err) => error!("Materialization for {user} failed: {err}"),
            }
            tokio::task::yield_now().await;
        }

        Ok(created)
    }

    /// Cancel pending calls that never dispatched (process down through the
    /// whole window) and abandon their sessions, so the stuck rows do not
    /// park their users forever.
    async fn cancel_stale(&self) -> Result<()> {
        let now = self.engine.clock.now();
        let cutoff = now
            - chrono::Duration::from_std(self.engine.config().scheduler.stale_after)
                .unwrap_or_else(|_| chrono::Duration::hours(6));

        let sessions = self
            .engine
            .db()
            .cancel_stale_scheduled_calls(cutoff)
            .await?;
        for session_id in sessions {
            info!("🧹 Cancelled stale scheduled call for session {session_id}");
            self.engine.db().abandon_session(&session_id, now).await?;
        }
        Ok(())
    }

    async fn materialize_user(&self, user: &UserId) -> Result<bool> {
        let db = self.engine.db();

        let Some(profile) = db.get_profile(user).await? else {
            debug!("User {user} has windows but no profile, skipping");
            return Ok(false);
        };

        let now = self.engine.clock.now();
        let today = local_date(profile.timezone, now);
        let time_of_day = local_time(profile.timezone, now);

        // One call per day: anything already in flight, or an entry already
        // written for today, parks this user.
        if db.has_non_terminal_scheduled_call(user).await?
            || db.has_non_terminal_call_for_user(user).await?
            || db.journal_entry_for(user, today).await?.is_some()
        {
            return Ok(false);
        }

        let windows = db.windows_for_user(user).await?;
        let mode = db.day_mode(user, today).await?;
        if !window_open_at(&windows, today, time_of_day, &mode) {
            return Ok(false);
        }

        let prompts = build_prompt_list(&profile, db.active_prompts(user).await?);
        if prompts.is_empty() {
            debug!("User {user} is inside a window but has no active prompts");
            return Ok(false);
        }

        let session = ReflectionSession {
            id: SessionId::new(),
            user_id: user.clone(),
            method: SessionMethod::Phone,
            status: SessionStatus::InProgress,
            prompts,
            rating: None,
            started_at: now,
            ended_at: None,
            recording_url: None,
        };
        db.insert_session(&session).await?;

        let scheduled = ScheduledCall {
            id: ScheduledCallId::new(),
            user_id: user.clone(),
            session_id: session.id.clone(),
            phone_number: profile.phone_number.clone(),
            scheduled_for: now,
            status: ScheduledCallStatus::Pending,
            attempt_count: 0,
            max_retries: profile.max_retries,
            next_attempt_at: None,
            last_error: None,
        };
        db.insert_scheduled_call(&scheduled).await?;

        info!(
            "📞 Materialized call {} for {user} ({} prompts)",
            scheduled.id,
            session.prompts.len()
        );
        Ok(true)
    }
}
