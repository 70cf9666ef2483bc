//! Simulated end-to-end call against the in-memory adapters
//!
//! Seeds one user with a window and two prompts, then drives a complete
//! call by hand: materialize → dispatch → answer webhook → scripted
//! transcripts → journal entry. No network, no external services.
//!
//! ```bash
//! cargo run --example simulated_call
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, TimeZone, Utc, Weekday};

use reverie_adapters::llm::RuleBasedLanguageModel;
use reverie_adapters::stt::MockSpeechToText;
use reverie_adapters::telephony::MockTelephony;
use reverie_adapters::tts::MockTextToSpeech;
use reverie_call_engine::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    // Monday 09:15 in New York.
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 11, 3, 14, 15, 0).unwrap());
    let telephony = Arc::new(MockTelephony::new());
    let stt = Arc::new(MockSpeechToText::new());

    let mut config = EngineConfig::default();
    config.dialog.tick = Duration::from_millis(25);

    let db = DatabaseManager::new_in_memory().await?;
    let engine = CallEngine::new(
        config,
        db,
        EngineAdapters {
            clock: Arc::new(clock.clone()),
            telephony: telephony.clone(),
            stt: stt.clone(),
            tts: Arc::new(MockTextToSpeech::new()),
            llm: Arc::new(RuleBasedLanguageModel::new()),
        },
    );

    // One user: Alice, recurring window MON 09:00-10:00, two prompts, and a
    // rating prompt via her profile.
    let alice = UserId::from("alice");
    engine
        .db()
        .upsert_profile(&Profile {
            user_id: alice.clone(),
            phone_number: PhoneNumber::parse("+16175551212")?,
            display_name: "Alice".to_string(),
            name_pronunciation: None,
            timezone: "America/New_York".parse().unwrap(),
            include_rating_prompt: true,
            max_retries: 2,
        })
        .await?;
    for (position, text) in [(1, "What are you grateful for?"), (2, "One thing you learned")] {
        engine
            .db()
            .upsert_prompt_template(&PromptTemplate {
                prompt_id: PromptId::new(),
                user_id: alice.clone(),
                prompt_text: text.to_string(),
                position,
                active: true,
                is_rating_prompt: false,
            })
            .await?;
    }
    engine
        .db()
        .insert_window(&CallWindow::recurring(
            alice.clone(),
            Weekday::Mon,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        )?)
        .await?;

    // The two periodic workers, driven by hand.
    let materializer = WindowMaterializer::new(engine.clone());
    let dispatcher = DispatchWorker::new(engine.clone());

    println!("📅 Materializing: {} call(s)", materializer.run_once().await?);
    println!("🚀 Dispatching:   {} call(s)", dispatcher.run_once().await?);

    let sid = telephony.placed_calls().last().unwrap().sid.clone();
    println!("📞 Provider placed call {sid}");

    // Alice answers; the provider asks what to do with the call.
    let instructions = engine.handle_answer(&sid).await?;
    println!("📜 Answer document:\n{}", instructions.to_xml()?);

    // The media stream attaches and the dialog task starts.
    engine.attach_stream(&sid).await?;
    while stt.latest_stream().is_none() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let caller = stt.latest_stream().unwrap();

    for answer in ["My family", "I learned about DNS", "negative one"] {
        caller.emit(answer, true).await;
        // Let the runtime absorb the transcript, then let four seconds of
        // silence pass so the endpointer closes the turn.
        tokio::time::sleep(Duration::from_millis(100)).await;
        clock.advance(chrono::Duration::seconds(4));
        println!("🗣️ Alice: {answer:?}");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // Wait for the closing sequence to finish.
    let today = reverie_core::local_date("America/New_York".parse().unwrap(), clock.now());
    let entry = loop {
        if let Some(entry) = engine.db().journal_entry_for(&alice, today).await? {
            break entry;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    };

    println!("\n📖 Journal entry for {}:", entry.local_date);
    for response in &entry.responses {
        println!(
            "  {}. {}: {:?}",
            response.position, response.prompt_text, response.response_text
        );
    }
    match entry.rating {
        Some(rating) => println!("  ⭐ Day rating: {}", rating.value()),
        None => println!("  ⭐ Day rating: (none given)"),
    }
    println!("\n✅ Call {sid} completed, provider hung up: {}", telephony.was_ended(&sid));

    Ok(())
}
