//! Call lifecycle: webhook events, finalization, and retry scheduling
//!
//! The webhook front carries the critical ordering duties: the answer
//! webhook owns the INITIATED → CONNECTED edge, the status webhook
//! finalizes abnormal ends (idempotently), and every abnormal end funnels
//! through one retry decision.

use reverie_adapters::{CallEvent, CallEventKind, InstructionSet, Telephony, TtsRequest};
use reverie_core::{Clock, PhoneCall, PhoneCallStatus, ProviderCallSid, SessionId};
use tracing::{error, info, warn};

use crate::dialog::DialogEvent;
use crate::error::{EngineError, Result};

use super::core::CallEngine;

impl CallEngine {
    /// Speech as an instruction set: hosted synthesized audio when TTS is
    /// healthy, the provider's built-in voice otherwise. Never aborts the
    /// call over a synthesis failure.
    pub(crate) async fn speech_instructions(&self, text: &str) -> InstructionSet {
        let request = TtsRequest::new(text, &self.config.services.tts_voice);
        match self.synthesizer.hosted_url(&request).await {
            Ok(url) => InstructionSet::new().play(url),
            Err(err) => {
                warn!("TTS unavailable, falling back to provider voice: {err}");
                InstructionSet::new().say(text)
            }
        }
    }

    /// Answer webhook: the provider connected the call and wants to know
    /// what to do with it.
    pub async fn handle_answer(&self, sid: &ProviderCallSid) -> Result<InstructionSet> {
        let Some(call) = self.db.phone_call_by_sid(sid).await? else {
            // The dispatcher persists the SID before the provider rings, so
            // this is either a raced webhook or a foreign call. A short
            // pause-and-redirect lets the provider retry into the former.
            warn!("Answer webhook for unknown SID {sid}, deferring");
            return Ok(InstructionSet::new()
                .pause(1)
                .redirect(self.config.answer_url()));
        };

        match call.status {
            PhoneCallStatus::Initiated => {
                let connected = self
                    .db
                    .transition_phone_call(
                        &call.id,
                        PhoneCallStatus::Initiated,
                        PhoneCallStatus::Connected,
                        self.clock.now(),
                    )
                    .await?;
                if connected {
                    info!("📞 Call {sid} connected");
                }
                self.greeting_instructions(&call).await
            }
            // A duplicate answer webhook; same reply, no state change.
            PhoneCallStatus::Connected => self.greeting_instructions(&call).await,
            _ => Ok(InstructionSet::new()
                .say("This call has already ended. Goodbye.")
                .hangup()),
        }
    }

    async fn greeting_instructions(&self, call: &PhoneCall) -> Result<InstructionSet> {
        let greeting = match self.db.get_profile(&call.user_id).await? {
            Some(profile) => {
                let name = profile
                    .name_pronunciation
                    .as_deref()
                    .unwrap_or(&profile.display_name)
                    .to_string();
                format!("Hi {name}! It's time for your daily reflection.")
            }
            None => "Hi! It's time for your daily reflection.".to_string(),
        };

        let instructions = self.speech_instructions(&greeting).await;
        Ok(instructions.open_stream(self.config.stream_url()))
    }

    /// Status webhook: provider-reported call progress and termination.
    pub async fn handle_status(&self, event: CallEvent) -> Result<()> {
        match event.kind {
            // The answer webhook owns the connect edge; progress updates
            // carry no state.
            CallEventKind::Initiated | CallEventKind::Ringing | CallEventKind::Answered => Ok(()),
            CallEventKind::Completed => self.handle_call_ended(&event).await,
            kind if kind.is_dial_failure() => self.handle_dial_failure(&event).await,
            _ => Ok(()),
        }
    }

    /// `completed` from the provider: either the runtime finalized normally
    /// (no-op) or the caller hung up early.
    async fn handle_call_ended(&self, event: &CallEvent) -> Result<()> {
        let Some(call) = self.db.phone_call_by_sid(&event.sid).await? else {
            warn!("Status webhook for unknown SID {}", event.sid);
            return Ok(());
        };

        match call.status {
            // Normal completion already recorded; a second delivery of the
            // same webhook lands here too.
            PhoneCallStatus::Completed
            | PhoneCallStatus::Failed
            | PhoneCallStatus::Abandoned => Ok(()),

            PhoneCallStatus::Connected => {
                info!("📴 Caller hung up early on {}", event.sid);
                self.router.dispatch(&event.sid, DialogEvent::Hangup).await;

                let now = self.clock.now();
                self.db
                    .transition_phone_call(
                        &call.id,
                        PhoneCallStatus::Connected,
                        PhoneCallStatus::Abandoned,
                        now,
                    )
                    .await?;
                self.fail_attempt(&call.session_id, "caller hung up early")
                    .await
            }

            // Completed before it was ever answered: a failed dial.
            PhoneCallStatus::Initiated => {
                let now = self.clock.now();
                self.db
                    .transition_phone_call(
                        &call.id,
                        PhoneCallStatus::Initiated,
                        PhoneCallStatus::Failed,
                        now,
                    )
                    .await?;
                self.fail_attempt(&call.session_id, "call ended before answer")
                    .await
            }
        }
    }

    /// `busy` / `no-answer` / `failed` from the provider.
    async fn handle_dial_failure(&self, event: &CallEvent) -> Result<()> {
        let Some(call) = self.db.phone_call_by_sid(&event.sid).await? else {
            warn!("Dial-failure webhook for unknown SID {}", event.sid);
            return Ok(());
        };

        if call.status.is_terminal() {
            return Ok(());
        }

        let now = self.clock.now();
        if call.status == PhoneCallStatus::Connected {
            // Provider error mid-call; tell the runtime to stand down.
            self.router.dispatch(&event.sid, DialogEvent::Hangup).await;
        }
        self.db
            .transition_phone_call(&call.id, call.status, PhoneCallStatus::Failed, now)
            .await?;
        self.fail_attempt(&call.session_id, &event.raw_status).await
    }

    /// Recording webhook: seal the URL before it touches the database.
    pub async fn handle_recording(&self, sid: &ProviderCallSid, recording_url: &str) -> Result<()> {
        let call = self
            .db
            .phone_call_by_sid(sid)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("no call for SID {sid}")))?;

        let sealed = self
            .cipher
            .encrypt_recording_url(&call.user_id, recording_url)?;
        self.db
            .set_session_recording_url(&call.session_id, &sealed)
            .await?;

        info!("🎙️ Recording stored for session {}", call.session_id);
        Ok(())
    }

    /// Shared failure path: abandon the session and retry the scheduled
    /// call while attempts remain.
    pub(crate) async fn fail_attempt(&self, session_id: &SessionId, reason: &str) -> Result<()> {
        self.db.abandon_session(session_id, self.clock.now()).await?;
        self.schedule_retry_or_fail(session_id, reason).await
    }

    async fn schedule_retry_or_fail(&self, session_id: &SessionId, reason: &str) -> Result<()> {
        let Some(sched) = self.db.scheduled_call_for_session(session_id).await? else {
            warn!("No scheduled call for session {session_id}");
            return Ok(());
        };

        // Already resolved: a duplicate failure event changes nothing.
        if sched.status != reverie_core::ScheduledCallStatus::InProgress {
            return Ok(());
        }

        if sched.attempts_remain_after_failure() {
            let next = self.clock.now()
                + chrono::Duration::from_std(self.config.scheduler.retry_backoff)
                    .unwrap_or_else(|_| chrono::Duration::minutes(5));
            self.db.reschedule_attempt(&sched.id, reason, next).await?;
            info!(
                "🔁 Attempt {} of {} failed for {}; retrying at {next}",
                sched.attempt_count + 1,
                sched.max_retries,
                sched.id
            );
        } else {
            self.db.fail_scheduled_call(&sched.id, reason).await?;
            info!(
                "❌ Retries exhausted for {} after {} attempts",
                sched.id,
                sched.attempt_count + 1
            );
        }
        Ok(())
    }

    /// Finalize a call whose task died or timed out: leave persistence in a
    /// consistent ABANDONED state and make sure the provider call is gone.
    pub(crate) async fn finalize_abandoned(&self, call: &PhoneCall, reason: &str) {
        let now = self.clock.now();

        let result = match self.db.get_phone_call(&call.id).await {
            Ok(Some(current)) if !current.status.is_terminal() => {
                let next = match current.status {
                    PhoneCallStatus::Connected => PhoneCallStatus::Abandoned,
                    _ => PhoneCallStatus::Failed,
                };
                self.db
                    .transition_phone_call(&call.id, current.status, next, now)
                    .await
                    .map(|_| ())
            }
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            error!("Failed to finalize call {}: {err}", call.id);
        }

        if let Err(err) = self.fail_attempt(&call.session_id, reason).await {
            error!("Failed to record attempt failure for {}: {err}", call.session_id);
        }

        if let Some(sid) = &call.provider_call_sid {
            // Ending an already-ended call is a no-op at the provider.
            if let Err(err) = self.telephony.end_call(sid).await {
                warn!("end_call for {sid} failed: {err}");
            }
        }
    }
}
