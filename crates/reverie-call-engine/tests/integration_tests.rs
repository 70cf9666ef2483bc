//! End-to-end scenarios for the call orchestration engine
//!
//! Each test runs the real engine against the in-memory adapters and an
//! in-memory database, driving time with a manual clock: materialize →
//! dispatch → answer webhook → media stream → scripted transcripts →
//! journal entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use serial_test::serial;

use reverie_adapters::llm::RuleBasedLanguageModel;
use reverie_adapters::stt::MockSpeechToText;
use reverie_adapters::telephony::MockTelephony;
use reverie_adapters::tts::MockTextToSpeech;
use reverie_adapters::{Action, CallEvent, CallEventKind};
use reverie_call_engine::prelude::*;

/// Monday 2025-11-03 09:15 in New York (14:15 UTC).
fn monday_morning() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 3, 14, 15, 0).unwrap()
}

/// Poll a condition (which may await) until it holds or four seconds pass.
macro_rules! wait_until {
    ($what:expr, $cond:expr) => {{
        let mut satisfied = false;
        for _ in 0..400 {
            if $cond {
                satisfied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if !satisfied {
            panic!("timed out waiting for: {}", $what);
        }
    }};
}

struct Harness {
    engine: Arc<CallEngine>,
    clock: ManualClock,
    telephony: Arc<MockTelephony>,
    stt: Arc<MockSpeechToText>,
    llm: Arc<RuleBasedLanguageModel>,
    materializer: WindowMaterializer,
    dispatcher: DispatchWorker,
    alice: UserId,
}

impl Harness {
    async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    async fn with_config(config: EngineConfig) -> Self {
        let clock = ManualClock::new(monday_morning());
        let telephony = Arc::new(MockTelephony::new());
        let stt = Arc::new(MockSpeechToText::new());
        let tts = Arc::new(MockTextToSpeech::new());
        let llm = Arc::new(RuleBasedLanguageModel::new());

        let adapters = EngineAdapters {
            clock: Arc::new(clock.clone()),
            telephony: telephony.clone(),
            stt: stt.clone(),
            tts,
            llm: llm.clone(),
        };

        let db = DatabaseManager::new_in_memory().await.unwrap();
        let engine = CallEngine::new(config, db, adapters);

        let harness = Self {
            materializer: WindowMaterializer::new(engine.clone()),
            dispatcher: DispatchWorker::new(engine.clone()),
            engine,
            clock,
            telephony,
            stt,
            llm,
            alice: UserId::from("alice"),
        };
        harness.seed_alice().await;
        harness
    }

    fn db(&self) -> &DatabaseManager {
        self.engine.db()
    }

    /// Alice: recurring window MON 09:00-10:00 New York, two prompts, and
    /// a rating prompt via her profile flag.
    async fn seed_alice(&self) {
        let db = self.db();

        db.upsert_profile(&Profile {
            user_id: self.alice.clone(),
            phone_number: PhoneNumber::parse("+16175551212").unwrap(),
            display_name: "Alice".to_string(),
            name_pronunciation: None,
            timezone: "America/New_York".parse().unwrap(),
            include_rating_prompt: true,
            max_retries: 2,
        })
        .await
        .unwrap();

        for (position, text) in [(1, "What are you grateful for?"), (2, "One thing you learned")]
        {
            db.upsert_prompt_template(&PromptTemplate {
                prompt_id: PromptId::new(),
                user_id: self.alice.clone(),
                prompt_text: text.to_string(),
                position,
                active: true,
                is_rating_prompt: false,
            })
            .await
            .unwrap();
        }

        db.insert_window(
            &CallWindow::recurring(
                self.alice.clone(),
                chrono::Weekday::Mon,
                chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            )
            .unwrap(),
        )
        .await
        .unwrap();
    }

    /// Materialize and dispatch Alice's call, returning the provider SID.
    async fn start_call(&self) -> ProviderCallSid {
        assert_eq!(self.materializer.run_once().await.unwrap(), 1);
        assert_eq!(self.dispatcher.run_once().await.unwrap(), 1);
        self.telephony.placed_calls().last().unwrap().sid.clone()
    }

    /// Answer the call and attach the media stream so the dialog starts.
    async fn connect(&self, sid: &ProviderCallSid) {
        let instructions = self.engine.handle_answer(sid).await.unwrap();
        assert!(instructions
            .actions
            .iter()
            .any(|a| matches!(a, Action::OpenStream { url } if url.starts_with("ws://"))));

        self.engine.attach_stream(sid).await.unwrap();
        wait_until!("stt stream opened", self.stt.latest_stream().is_some());
    }

    /// Speak one final transcript and advance the manual clock so the
    /// endpointer sees the pause.
    async fn answer_turn(&self, sid: &ProviderCallSid, text: &str, pause_secs: i64) {
        let handle = self.stt.latest_stream().unwrap();
        handle.emit(text, true).await;

        // The runtime must have absorbed the transcript before the pause
        // starts, or the advanced clock becomes the speech time.
        let db = self.db();
        wait_until!(
            "transcript absorbed",
            match db.phone_call_by_sid(sid).await.unwrap() {
                Some(call) => call.current_response_buffer.contains(text),
                None => false,
            }
        );

        self.clock.advance(chrono::Duration::seconds(pause_secs));
    }

    async fn session_for(&self, sid: &ProviderCallSid) -> ReflectionSession {
        let call = self.db().phone_call_by_sid(sid).await.unwrap().unwrap();
        self.db().get_session(&call.session_id).await.unwrap().unwrap()
    }

    async fn scheduled_for_sid(&self, sid: &ProviderCallSid) -> ScheduledCall {
        let call = self.db().phone_call_by_sid(sid).await.unwrap().unwrap();
        self.db()
            .scheduled_call_for_session(&call.session_id)
            .await
            .unwrap()
            .unwrap()
    }

    fn completed_event(&self, sid: &ProviderCallSid) -> CallEvent {
        CallEvent {
            sid: sid.clone(),
            kind: CallEventKind::Completed,
            from: None,
            to: None,
            raw_status: "completed".to_string(),
        }
    }

    fn no_answer_event(&self, sid: &ProviderCallSid) -> CallEvent {
        CallEvent {
            sid: sid.clone(),
            kind: CallEventKind::NoAnswer,
            from: None,
            to: None,
            raw_status: "no-answer".to_string(),
        }
    }
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    // Fast ticks keep the endpointer responsive under test pacing; the
    // pause thresholds themselves come from the manual clock.
    config.dialog.tick = Duration::from_millis(25);
    config
}

// ---------------------------------------------------------------------------
// Scenario 1: happy path
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn happy_path_produces_entry_with_rating() {
    let h = Harness::new().await;

    let sid = h.start_call().await;

    // The PhoneCall row is keyed by the SID before any webhook fires.
    let call = h.db().phone_call_by_sid(&sid).await.unwrap().unwrap();
    assert_eq!(call.status, PhoneCallStatus::Initiated);
    assert_eq!(call.prompts.len(), 3); // 2 templates + synthetic rating

    h.connect(&sid).await;
    let call = h.db().phone_call_by_sid(&sid).await.unwrap().unwrap();
    assert_eq!(call.status, PhoneCallStatus::Connected);

    h.answer_turn(&sid, "My family", 4).await;
    let db = h.db();
    let session_id = call.session_id.clone();
    wait_until!("first response recorded", {
        db.response_count(&session_id).await.unwrap() == 1
    });

    h.answer_turn(&sid, "I learned about DNS", 4).await;
    wait_until!("second response recorded", {
        db.response_count(&session_id).await.unwrap() == 2
    });

    h.answer_turn(&sid, "negative one", 4).await;
    wait_until!("call completed", {
        h.scheduled_for_sid(&sid).await.status == ScheduledCallStatus::Completed
    });

    // Session: completed, rated -1, exactly two responses at positions 1, 2.
    let session = h.session_for(&sid).await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.rating.unwrap().value(), -1);

    let responses = db.responses_for_session(&session.id).await.unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].position, 1);
    assert_eq!(responses[0].response_text, "My family");
    assert_eq!(responses[1].position, 2);
    assert_eq!(responses[1].response_text, "I learned about DNS");

    // Journal entry for Alice's local date.
    let entry = db
        .journal_entry_for(&h.alice, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.session_id, session.id);
    assert_eq!(entry.rating.unwrap().value(), -1);
    assert_eq!(entry.responses.len(), 2);

    // The call is completed and the provider got the closing audio and the
    // hangup in one instruction set.
    let call = db.phone_call_by_sid(&sid).await.unwrap().unwrap();
    assert_eq!(call.status, PhoneCallStatus::Completed);
    assert!(h.telephony.was_ended(&sid));
    let instruction_sets = h.telephony.instructions_for(&sid);
    let closing = instruction_sets.last().unwrap();
    assert!(closing.ends_call());
    assert!(closing
        .actions
        .iter()
        .any(|a| matches!(a, Action::Play { .. } | Action::Say { .. })));
}

#[tokio::test]
#[serial]
async fn completed_webhook_after_normal_finish_is_idempotent() {
    let h = Harness::new().await;
    let sid = h.start_call().await;
    h.connect(&sid).await;

    for (text, expected) in [("My family", 1), ("I learned about DNS", 2)] {
        h.answer_turn(&sid, text, 4).await;
        let db = h.db();
        let call = db.phone_call_by_sid(&sid).await.unwrap().unwrap();
        wait_until!("response recorded", {
            db.response_count(&call.session_id).await.unwrap() == expected
        });
    }
    h.answer_turn(&sid, "zero", 4).await;
    wait_until!("call completed", {
        h.scheduled_for_sid(&sid).await.status == ScheduledCallStatus::Completed
    });

    // The provider's completed status arrives after the runtime finished.
    h.engine.handle_status(h.completed_event(&sid)).await.unwrap();
    h.engine.handle_status(h.completed_event(&sid)).await.unwrap();

    let session = h.session_for(&sid).await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.rating.unwrap().value(), 0);
    let sched = h.scheduled_for_sid(&sid).await;
    assert_eq!(sched.status, ScheduledCallStatus::Completed);
    assert_eq!(sched.attempt_count, 0);
}

// ---------------------------------------------------------------------------
// Scenario 2: hangup after the first prompt
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn early_hangup_abandons_and_schedules_retry() {
    let h = Harness::new().await;
    let sid = h.start_call().await;
    h.connect(&sid).await;

    h.answer_turn(&sid, "My family", 4).await;
    let db = h.db();
    let call = db.phone_call_by_sid(&sid).await.unwrap().unwrap();
    wait_until!("first response recorded", {
        db.response_count(&call.session_id).await.unwrap() == 1
    });

    // The caller hangs up during the second prompt.
    h.engine.handle_status(h.completed_event(&sid)).await.unwrap();

    let call = db.phone_call_by_sid(&sid).await.unwrap().unwrap();
    assert_eq!(call.status, PhoneCallStatus::Abandoned);
    let session = db.get_session(&call.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Abandoned);

    // No journal entry for today.
    assert!(db
        .journal_entry_for(&h.alice, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap())
        .await
        .unwrap()
        .is_none());

    // One failed attempt, retry in five minutes.
    let sched = h.scheduled_for_sid(&sid).await;
    assert_eq!(sched.status, ScheduledCallStatus::Pending);
    assert_eq!(sched.attempt_count, 1);
    let next = sched.next_attempt_at.unwrap();
    assert_eq!(next - h.clock.now(), chrono::Duration::seconds(300));

    // The dialog task stands down.
    wait_until!("dialog task unregistered", {
        h.engine.live_call_count() == 0
    });

    // Not due until the backoff elapses; afterwards a fresh call goes out
    // against the same (reactivated) session.
    assert_eq!(h.dispatcher.run_once().await.unwrap(), 0);
    h.clock.advance(chrono::Duration::seconds(301));
    assert_eq!(h.dispatcher.run_once().await.unwrap(), 1);
    assert_eq!(h.telephony.placed_calls().len(), 2);

    let retry_sid = h.telephony.placed_calls().last().unwrap().sid.clone();
    let retry_call = db.phone_call_by_sid(&retry_sid).await.unwrap().unwrap();
    assert_eq!(retry_call.session_id, call.session_id);
    let session = db.get_session(&call.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::InProgress);

    // The retry starts from the top: the interrupted pass's response is gone.
    assert_eq!(db.response_count(&call.session_id).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Scenario 3: ambiguous rating
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn ambiguous_rating_leaves_rating_unset() {
    let h = Harness::new().await;
    let sid = h.start_call().await;
    h.connect(&sid).await;

    let db = h.db();
    let session_id = db.phone_call_by_sid(&sid).await.unwrap().unwrap().session_id;

    for (text, expected) in [("My family", 1), ("I learned about DNS", 2)] {
        h.answer_turn(&sid, text, 4).await;
        wait_until!("response recorded", {
            db.response_count(&session_id).await.unwrap() == expected
        });
    }

    h.answer_turn(&sid, "it was okay", 4).await;
    wait_until!("call completed", {
        h.scheduled_for_sid(&sid).await.status == ScheduledCallStatus::Completed
    });

    let session = db.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.rating.is_none());

    // The entry still materializes, just without a rating.
    let entry = db
        .journal_entry_for(&h.alice, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(entry.rating.is_none());
    assert_eq!(entry.responses.len(), 2);
}

// ---------------------------------------------------------------------------
// Scenario 4: webhook racing the dispatcher
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn answer_webhook_for_unknown_sid_defers_instead_of_crashing() {
    let h = Harness::new().await;

    // The webhook lands before any call exists.
    let phantom = ProviderCallSid::from("CA-not-yet");
    let instructions = h.engine.handle_answer(&phantom).await.unwrap();
    assert!(instructions
        .actions
        .iter()
        .any(|a| matches!(a, Action::Redirect { .. })));
    assert!(!instructions.ends_call());

    // Once dispatch has committed the row, the retried webhook proceeds
    // normally.
    let sid = h.start_call().await;
    let instructions = h.engine.handle_answer(&sid).await.unwrap();
    assert!(instructions
        .actions
        .iter()
        .any(|a| matches!(a, Action::OpenStream { .. })));

    let call = h.db().phone_call_by_sid(&sid).await.unwrap().unwrap();
    assert_eq!(call.status, PhoneCallStatus::Connected);
}

// ---------------------------------------------------------------------------
// Scenario 5: duplicate journal entry
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn second_entry_for_a_date_is_rejected_without_mutation() {
    let h = Harness::new().await;
    let db = h.db();
    let date = NaiveDate::from_ymd_opt(2025, 11, 5).unwrap();

    let entry = |session: &SessionId| JournalEntry {
        id: EntryId::new(),
        user_id: h.alice.clone(),
        session_id: session.clone(),
        local_date: date,
        rating: None,
        responses: vec![],
        created_at: h.clock.now(),
    };

    let original_session = SessionId::new();
    let original = entry(&original_session);
    db.insert_journal_entry(&original).await.unwrap();

    // A buggy sync tries to write a second entry for the same date.
    let err = db.insert_journal_entry(&entry(&SessionId::new())).await.unwrap_err();
    assert!(matches!(err, EngineError::Uniqueness(_)));

    let loaded = db.journal_entry_for(&h.alice, date).await.unwrap().unwrap();
    assert_eq!(loaded.id, original.id);
    assert_eq!(loaded.session_id, original_session);
}

// ---------------------------------------------------------------------------
// Scenario 6: retry exhaustion
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn retries_exhaust_after_max_attempts() {
    let h = Harness::new().await;

    // Attempt 1: no answer.
    let sid = h.start_call().await;
    h.engine.handle_status(h.no_answer_event(&sid)).await.unwrap();

    let sched = h.scheduled_for_sid(&sid).await;
    assert_eq!(sched.status, ScheduledCallStatus::Pending);
    assert_eq!(sched.attempt_count, 1);

    // Attempt 2: no answer again.
    h.clock.advance(chrono::Duration::seconds(301));
    assert_eq!(h.dispatcher.run_once().await.unwrap(), 1);
    let sid2 = h.telephony.placed_calls().last().unwrap().sid.clone();
    assert_ne!(sid, sid2);
    h.engine.handle_status(h.no_answer_event(&sid2)).await.unwrap();

    let sched = h.scheduled_for_sid(&sid2).await;
    assert_eq!(sched.status, ScheduledCallStatus::Failed);
    assert_eq!(sched.attempt_count, 2);

    let call = h.db().phone_call_by_sid(&sid2).await.unwrap().unwrap();
    let session = h.db().get_session(&call.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Abandoned);
    assert!(h
        .db()
        .journal_entry_for(&h.alice, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap())
        .await
        .unwrap()
        .is_none());

    // The third attempt is never scheduled.
    h.clock.advance(chrono::Duration::seconds(600));
    assert_eq!(h.dispatcher.run_once().await.unwrap(), 0);
    assert_eq!(h.telephony.placed_calls().len(), 2);
}

// ---------------------------------------------------------------------------
// Idempotence and failure-mode coverage
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn materializer_is_idempotent_within_a_window() {
    let h = Harness::new().await;

    assert_eq!(h.materializer.run_once().await.unwrap(), 1);
    // Back-to-back sweep creates nothing new.
    assert_eq!(h.materializer.run_once().await.unwrap(), 0);

    // Outside the window nothing materializes either.
    h.clock.advance(chrono::Duration::hours(2));
    assert_eq!(h.materializer.run_once().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn stale_pending_calls_are_cancelled_not_dialed() {
    let h = Harness::new().await;

    assert_eq!(h.materializer.run_once().await.unwrap(), 1);

    // The process sleeps through the whole window and then some.
    h.clock.advance(chrono::Duration::hours(7));
    assert_eq!(h.materializer.run_once().await.unwrap(), 0);

    // Nothing left for the dispatcher, and nobody gets called at 4pm.
    assert_eq!(h.dispatcher.run_once().await.unwrap(), 0);
    assert!(h.telephony.placed_calls().is_empty());

    let session = h
        .db()
        .in_progress_session_for_user(&h.alice)
        .await
        .unwrap();
    assert!(session.is_none());
}

#[tokio::test]
#[serial]
async fn day_mode_switch_disables_recurring_windows() {
    let h = Harness::new().await;

    h.db()
        .set_day_mode(&DayMode {
            user_id: h.alice.clone(),
            date: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            use_recurring: false,
        })
        .await
        .unwrap();

    // No one-off windows exist for today, so nothing materializes.
    assert_eq!(h.materializer.run_once().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn llm_outage_falls_back_to_hard_pause() {
    let h = Harness::new().await;
    let sid = h.start_call().await;
    h.connect(&sid).await;

    // Every completion check fails; the hard pause must still end the turn.
    h.llm.fail_next_completion_checks(1000);

    let db = h.db();
    let session_id = db.phone_call_by_sid(&sid).await.unwrap().unwrap().session_id;

    // In the judgment band the failing checks keep the turn open.
    h.answer_turn(&sid, "Just my family really", 4).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(db.response_count(&session_id).await.unwrap(), 0);

    // At the hard threshold the failsafe completes it anyway.
    h.clock.advance(chrono::Duration::seconds(8));
    wait_until!("failsafe completed the turn", {
        db.response_count(&session_id).await.unwrap() == 1
    });
}

#[tokio::test]
#[serial]
async fn stt_outage_abandons_call_and_schedules_retry() {
    let h = Harness::new().await;
    let sid = h.start_call().await;

    h.engine.handle_answer(&sid).await.unwrap();

    // Both the initial open and the engine's reconnect fail.
    h.stt.fail_next_opens(2);
    h.engine.attach_stream(&sid).await.unwrap();

    wait_until!("call abandoned after stt outage", {
        h.scheduled_for_sid(&sid).await.attempt_count == 1
    });

    let sched = h.scheduled_for_sid(&sid).await;
    assert_eq!(sched.status, ScheduledCallStatus::Pending);
    let call = h.db().phone_call_by_sid(&sid).await.unwrap().unwrap();
    assert!(call.status.is_terminal());
}

#[tokio::test]
#[serial]
async fn wall_clock_ceiling_abandons_silent_calls() {
    let mut config = test_config();
    config.dialog.max_call_duration = Duration::from_millis(300);
    let h = Harness::with_config(config).await;

    let sid = h.start_call().await;
    h.connect(&sid).await;

    // Nobody ever speaks; the ceiling reaps the task.
    wait_until!("ceiling abandoned the call", {
        let call = h.db().phone_call_by_sid(&sid).await.unwrap().unwrap();
        call.status == PhoneCallStatus::Abandoned
    });

    let session = h.session_for(&sid).await;
    assert_eq!(session.status, SessionStatus::Abandoned);
    assert!(h.telephony.was_ended(&sid));
}
