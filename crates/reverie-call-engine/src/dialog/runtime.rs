//! The per-call dialog task
//!
//! One task owns the whole call: it speaks each prompt, funnels media into
//! the STT stream, endpoints the caller's turns, records responses, and
//! runs the closing sequence. The task is the only writer of the response
//! buffer; everything reaches it through the per-call event queue.
//!
//! Ordering in the closing sequence is load-bearing: the closing audio and
//! the hangup go to the provider in ONE instruction set before any local
//! COMPLETED write, because the provider rejects instructions once it
//! records the call as completed.

use reverie_adapters::{
    InstructionSet, LanguageModel, SpeechToText, SttConfig, SttSender, Telephony, TtsRequest,
};
use reverie_core::{
    local_date, Clock, EntryId, JournalEntry, PhoneCall, PhoneCallStatus, Prompt, PromptResponse,
    ProviderCallSid, Rating,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::orchestrator::CallEngine;

use super::endpointing::{Endpointer, PauseAssessment};
use super::DialogEvent;

/// Why the listen loop stopped.
enum ListenOutcome {
    /// The endpointer decided the caller finished this turn.
    TurnComplete,
    /// The call ended underneath us; skip recording and closing.
    CallEnded,
}

impl CallEngine {
    /// Entry point of the per-call task. Owns cancellation (the wall-clock
    /// ceiling) and the task boundary: any fault below finalizes the call
    /// as abandoned instead of escaping.
    pub(crate) async fn run_dialog(
        self: std::sync::Arc<Self>,
        mut call: PhoneCall,
        queue: mpsc::Sender<DialogEvent>,
        events: mpsc::Receiver<DialogEvent>,
    ) {
        let Some(sid) = call.provider_call_sid.clone() else {
            error!("Dialog task for call {} without a provider SID", call.id);
            return;
        };

        let ceiling = self.config.dialog.max_call_duration;
        let result = tokio::select! {
            result = self.dialog_loop(&mut call, &sid, &queue, events) => result,
            _ = tokio::time::sleep(ceiling) => {
                Err(EngineError::session(format!(
                    "call {sid} exceeded the {}s wall-clock ceiling",
                    ceiling.as_secs()
                )))
            }
        };

        self.router.unregister(&sid);

        match result {
            Ok(()) => debug!("Dialog task for {sid} finished"),
            Err(err) => {
                error!("💥 Dialog for call {} failed: {err}", call.id);
                self.finalize_abandoned(&call, &err.to_string()).await;
            }
        }
    }

    async fn dialog_loop(
        &self,
        call: &mut PhoneCall,
        sid: &ProviderCallSid,
        queue: &mpsc::Sender<DialogEvent>,
        mut events: mpsc::Receiver<DialogEvent>,
    ) -> Result<()> {
        let endpointer = Endpointer::new(&self.config.dialog);
        let stt_config = SttConfig::default();

        // The STT stream and its forwarder; reconnecting swaps both out.
        let mut stt_sender = self.open_stt(&stt_config, queue).await?;
        let mut stt_reconnects = 0u32;

        self.spawn_ticker(queue.clone());

        // Responses may already exist when a retried call resumes a session.
        let mut next_position = self.db.response_count(&call.session_id).await? + 1;

        while let Some(prompt) = call.current_prompt().cloned() {
            let turn_started = self.clock.now();
            self.speak(sid, &prompt.prompt_text).await?;

            call.current_response_buffer.clear();
            let outcome = self
                .listen_for_turn(
                    call,
                    &prompt,
                    &endpointer,
                    &mut events,
                    &mut stt_sender,
                    &mut stt_reconnects,
                    &stt_config,
                    queue,
                )
                .await?;

            match outcome {
                ListenOutcome::CallEnded => {
                    stt_sender.finish().await;
                    return Ok(());
                }
                ListenOutcome::TurnComplete => {}
            }

            let finished_at = self.clock.now();
            let buffer = call.current_response_buffer.trim().to_string();

            if prompt.is_rating {
                self.record_rating(call, &buffer).await;
            } else {
                self.db
                    .insert_response(&PromptResponse {
                        session_id: call.session_id.clone(),
                        prompt_id: prompt.prompt_id.clone(),
                        prompt_text: prompt.prompt_text.clone(),
                        position: next_position,
                        response_text: buffer,
                        response_started: turn_started,
                        response_finished: finished_at,
                    })
                    .await?;
                next_position += 1;
            }

            // Advance: strictly +1, buffer cleared.
            call.current_prompt_index += 1;
            call.current_response_buffer.clear();
            self.db
                .update_dialog_progress(&call.id, call.current_prompt_index, "")
                .await?;
        }

        self.close_call(call, sid).await?;
        stt_sender.finish().await;
        Ok(())
    }

    /// Speak one prompt. TTS failures fall back to the provider's built-in
    /// voice; playback is interruptible, so listening starts immediately.
    async fn speak(&self, sid: &ProviderCallSid, text: &str) -> Result<()> {
        let instructions = self.speech_instructions(text).await;
        self.telephony.send_instructions(sid, instructions).await?;
        Ok(())
    }

    async fn listen_for_turn(
        &self,
        call: &mut PhoneCall,
        prompt: &Prompt,
        endpointer: &Endpointer,
        events: &mut mpsc::Receiver<DialogEvent>,
        stt_sender: &mut SttSender,
        stt_reconnects: &mut u32,
        stt_config: &SttConfig,
        queue: &mpsc::Sender<DialogEvent>,
    ) -> Result<ListenOutcome> {
        call.last_speech_time = self.clock.now();

        loop {
            let Some(event) = events.recv().await else {
                return Err(EngineError::session("dialog event queue closed"));
            };

            match event {
                DialogEvent::Audio(frame) => {
                    if let Err(err) = stt_sender.write_audio(frame).await {
                        if *stt_reconnects >= 1 {
                            return Err(EngineError::session(format!(
                                "stt stream lost twice: {err}"
                            )));
                        }
                        *stt_reconnects += 1;
                        warn!("STT stream lost, reopening: {err}");
                        *stt_sender = self.open_stt(stt_config, queue).await?;
                    }
                }

                DialogEvent::Transcript(transcript) => {
                    let now = self.clock.now();
                    call.last_speech_time = now;

                    if transcript.is_final {
                        if !call.current_response_buffer.is_empty() {
                            call.current_response_buffer.push(' ');
                        }
                        call.current_response_buffer.push_str(&transcript.text);

                        self.db
                            .update_dialog_progress(
                                &call.id,
                                call.current_prompt_index,
                                &call.current_response_buffer,
                            )
                            .await?;
                        self.db.touch_speech_time(&call.id, now).await?;

                        if self.turn_is_complete(call, prompt, endpointer).await {
                            return Ok(ListenOutcome::TurnComplete);
                        }
                    }
                }

                DialogEvent::Tick => {
                    if self.turn_is_complete(call, prompt, endpointer).await {
                        return Ok(ListenOutcome::TurnComplete);
                    }
                }

                DialogEvent::Hangup | DialogEvent::MediaStopped => {
                    debug!("Call {} ended while listening", call.id);
                    return Ok(ListenOutcome::CallEnded);
                }
            }
        }
    }

    /// One endpointing decision. LLM failures deliberately do not complete
    /// the turn; PAUSE_HARD is the failsafe.
    async fn turn_is_complete(
        &self,
        call: &PhoneCall,
        prompt: &Prompt,
        endpointer: &Endpointer,
    ) -> bool {
        let pause = (self.clock.now() - call.last_speech_time)
            .to_std()
            .unwrap_or_default();

        match endpointer.assess(pause, &call.current_response_buffer, prompt.is_rating) {
            PauseAssessment::TooSoon => false,
            PauseAssessment::Failsafe | PauseAssessment::RatingReady => true,
            PauseAssessment::NeedsJudgment => {
                match self
                    .llm
                    .check_completion(
                        &prompt.prompt_text,
                        &call.current_response_buffer,
                        pause.as_secs_f64(),
                    )
                    .await
                {
                    Ok(check) => endpointer.accepts(&check),
                    Err(err) => {
                        warn!("Completion check failed, waiting for the hard pause: {err}");
                        false
                    }
                }
            }
        }
    }

    /// Rating turns never produce a PromptResponse; a confident extraction
    /// lands on the session, anything else leaves the rating unset.
    async fn record_rating(&self, call: &PhoneCall, buffer: &str) {
        match self.llm.extract_rating(buffer).await {
            Ok(extraction) => {
                let confident = extraction.confidence >= self.config.dialog.rating_confidence;
                match extraction.rating.filter(|_| confident) {
                    Some(value) => match Rating::new(value as i64) {
                        Ok(rating) => {
                            if let Err(err) =
                                self.db.set_session_rating(&call.session_id, rating).await
                            {
                                error!("Failed to store rating: {err}");
                            } else {
                                info!("⭐ Session {} rated {value}", call.session_id);
                            }
                        }
                        Err(err) => warn!("Discarding rating: {err}"),
                    },
                    None => {
                        info!(
                            "No usable rating in {buffer:?} ({})",
                            extraction.reason
                        );
                    }
                }
            }
            Err(err) => warn!("Rating extraction failed, leaving rating unset: {err}"),
        }
    }

    /// The closing sequence. Order matters; see the module docs.
    async fn close_call(&self, call: &PhoneCall, sid: &ProviderCallSid) -> Result<()> {
        // 1. Closing audio + hangup in ONE instruction set, pushed before
        //    any local COMPLETED write.
        let closing_text = self.config.dialog.closing_message.clone();
        let request = TtsRequest::new(&closing_text, &self.config.services.tts_voice);
        let closing = match self.synthesizer.hosted_url(&request).await {
            Ok(url) => InstructionSet::new().play(url).hangup(),
            Err(err) => {
                warn!("TTS unavailable for closing message: {err}");
                InstructionSet::new().say(&closing_text).hangup()
            }
        };
        self.telephony.send_instructions(sid, closing).await?;

        // 2. Validate the response count against the non-rating prompts;
        //    a mismatch means the prompt lists diverged somewhere.
        let session = self
            .db
            .get_session(&call.session_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("session {}", call.session_id)))?;
        let responses = self.db.responses_for_session(&call.session_id).await?;
        let expected = session.non_rating_prompt_count();
        if responses.len() != expected {
            return Err(EngineError::session(format!(
                "recorded {} responses for {} answerable prompts in session {}",
                responses.len(),
                expected,
                call.session_id
            )));
        }

        let ended_at = self.clock.now();

        // 3. Session COMPLETED.
        if !self.db.complete_session(&call.session_id, ended_at).await? {
            return Err(EngineError::session(format!(
                "session {} was not in progress at completion",
                call.session_id
            )));
        }

        // 4. PhoneCall COMPLETED.
        self.db
            .transition_phone_call(
                &call.id,
                PhoneCallStatus::Connected,
                PhoneCallStatus::Completed,
                ended_at,
            )
            .await?;

        // 5. JournalEntry from the session snapshot, keyed by the user's
        //    local date at completion.
        let profile = self
            .db
            .get_profile(&call.user_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("profile {}", call.user_id)))?;
        let session = self
            .db
            .get_session(&call.session_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("session {}", call.session_id)))?;

        let entry = JournalEntry {
            id: EntryId::new(),
            user_id: call.user_id.clone(),
            session_id: call.session_id.clone(),
            local_date: local_date(profile.timezone, ended_at),
            rating: session.rating,
            responses,
            created_at: ended_at,
        };
        self.db.insert_journal_entry(&entry).await?;

        // 6. ScheduledCall COMPLETED.
        if let Some(sched) = self.db.scheduled_call_for_session(&call.session_id).await? {
            self.db.complete_scheduled_call(&sched.id).await?;
        }

        info!(
            "✅ Call {sid} completed: {} responses, entry {} for {}",
            entry.responses.len(),
            entry.id,
            entry.local_date
        );
        Ok(())
    }

    /// Open an STT stream and forward its transcripts into the per-call
    /// queue.
    async fn open_stt(
        &self,
        config: &SttConfig,
        queue: &mpsc::Sender<DialogEvent>,
    ) -> Result<SttSender> {
        let stream = self.stt.open_stream(config.clone()).await?;
        let (sender, mut transcripts) = stream.into_parts();

        let queue = queue.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = queue.closed() => break,
                    transcript = transcripts.recv() => match transcript {
                        Some(t) => {
                            if queue.send(DialogEvent::Transcript(t)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(sender)
    }

    /// The 250 ms endpointer tick; stops when the call task is gone.
    fn spawn_ticker(&self, queue: mpsc::Sender<DialogEvent>) {
        let period = self.config.dialog.tick;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = queue.closed() => break,
                    _ = interval.tick() => {
                        if queue.send(DialogEvent::Tick).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}
