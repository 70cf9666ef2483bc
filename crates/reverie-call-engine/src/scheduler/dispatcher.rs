//! Dispatch worker
//!
//! Picks up due scheduled calls, claims them with a CAS (the only lock
//! between racing dispatchers), refreshes the session's prompt snapshot,
//! and places the provider call. The PhoneCall row is persisted and keyed
//! by the real SID before the provider starts ringing; the answer webhook
//! always finds its row.

use std::sync::Arc;

use reverie_adapters::Telephony;
use reverie_core::{CallId, Clock, PhoneCall, PhoneCallStatus, ScheduledCall};
use tracing::{error, info, warn};

use crate::error::{EngineError, Result};
use crate::orchestrator::CallEngine;

use super::build_prompt_list;

pub struct DispatchWorker {
    engine: Arc<CallEngine>,
}

impl DispatchWorker {
    pub fn new(engine: Arc<CallEngine>) -> Self {
        Self { engine }
    }

    /// The periodic loop.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.engine.config().scheduler.dispatch_poll);
        loop {
            interval.tick().await;
            match self.run_once().await {
                Ok(0) => {}
                Ok(dispatched) => info!("🚀 Dispatched {dispatched} call(s)"),
                Err(err) => error!("Dispatch sweep failed: {err}"),
            }
        }
    }

    /// One dispatch sweep. Returns how many calls were started.
    pub async fn run_once(&self) -> Result<u32> {
        let db = self.engine.db();
        let now = self.engine.clock.now();
        let batch = self.engine.config().scheduler.dispatch_batch;

        let due = db.due_scheduled_calls(now, batch).await?;
        let mut dispatched = 0;

        for sched in due {
            // Exactly one dispatcher wins this row; losers skip it.
            if !db.claim_scheduled_call(&sched.id).await? {
                continue;
            }

            match self.dispatch_claimed(&sched).await {
                Ok(()) => dispatched += 1,
                Err(err) => {
                    warn!("Dispatch of {} failed: {err}", sched.id);
                    if let Err(err) = self
                        .engine
                        .fail_attempt(&sched.session_id, &err.to_string())
                        .await
                    {
                        error!("Failure bookkeeping for {} failed: {err}", sched.id);
                    }
                }
            }
        }

        Ok(dispatched)
    }

    async fn dispatch_claimed(&self, sched: &ScheduledCall) -> Result<()> {
        let engine = &self.engine;
        let db = engine.db();
        let now = engine.clock.now();

        let profile = db
            .get_profile(&sched.user_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("profile {}", sched.user_id)))?;

        // Refresh the prompt snapshot from the latest active templates so
        // the runtime speaks exactly what the user has configured now.
        let prompts = build_prompt_list(&profile, db.active_prompts(&sched.user_id).await?);
        if prompts.is_empty() {
            return Err(EngineError::validation(format!(
                "user {} has no active prompts",
                sched.user_id
            )));
        }

        // A retried attempt restarts an abandoned session from the top;
        // responses from the interrupted pass are dropped so positions stay
        // a contiguous prefix.
        if db.reactivate_session(&sched.session_id).await? {
            db.delete_responses_for_session(&sched.session_id).await?;
        }
        db.update_session_prompts(&sched.session_id, &prompts).await?;

        let call = PhoneCall {
            id: CallId::new(),
            user_id: sched.user_id.clone(),
            session_id: sched.session_id.clone(),
            provider_call_sid: None,
            status: PhoneCallStatus::Initiated,
            prompts,
            current_prompt_index: 0,
            current_response_buffer: String::new(),
            last_speech_time: now,
            initiated_at: now,
            connected_at: None,
            ended_at: None,
        };
        db.insert_phone_call(&call).await?;

        // placeCall acknowledges with the SID before the provider rings, so
        // the row is keyed by the SID before the first webhook can fire.
        let placed = engine
            .telephony
            .place_call(
                &sched.phone_number,
                &engine.config().telephony.from_number,
                &engine.config().answer_url(),
                &engine.config().status_url(),
            )
            .await;

        match placed {
            Ok(sid) => {
                db.assign_provider_sid(&call.id, &sid).await?;
                info!("📲 Placed call {sid} for scheduled {}", sched.id);
                Ok(())
            }
            Err(err) => {
                // The INITIATED row would block the user's next call.
                db.transition_phone_call(
                    &call.id,
                    PhoneCallStatus::Initiated,
                    PhoneCallStatus::Failed,
                    engine.clock.now(),
                )
                .await?;
                Err(err.into())
            }
        }
    }
}
