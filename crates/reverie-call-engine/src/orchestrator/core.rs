//! Core call orchestration engine
//!
//! [`CallEngine`] coordinates the schedulers, the webhook front, and the
//! dialog runtime through the database and the external-service adapters.
//! Adapters are wired in at construction; nothing below this layer reads
//! configuration flags to decide between live and mock implementations.

use std::sync::Arc;

use reverie_adapters::llm::{HttpLanguageModel, RuleBasedLanguageModel};
use reverie_adapters::stt::{MockSpeechToText, WsSpeechToText};
use reverie_adapters::telephony::{HttpTelephony, MockTelephony};
use reverie_adapters::tts::{HttpTextToSpeech, MockTextToSpeech};
use reverie_adapters::{
    AudioHost, CachingSynthesizer, LanguageModel, RecordingCipher, SpeechToText, Telephony,
    TextToSpeech,
};
use reverie_core::{Clock, PhoneCall, PhoneCallStatus, ProviderCallSid, SystemClock};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::EngineConfig;
use crate::database::{DatabaseManager, EngineStats};
use crate::dialog::{DialogEvent, MediaStreamRouter};
use crate::error::{EngineError, Result};

/// Queue depth of the per-call event channel. Media frames arrive at
/// ~50/s; this absorbs several seconds of backlog before backpressure.
const DIALOG_QUEUE_DEPTH: usize = 512;

/// The external capabilities the engine is built from.
pub struct EngineAdapters {
    pub clock: Arc<dyn Clock>,
    pub telephony: Arc<dyn Telephony>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub llm: Arc<dyn LanguageModel>,
}

impl EngineAdapters {
    /// Wire adapters from configuration: the in-memory set for local
    /// development, the live clients otherwise.
    pub fn from_config(config: &EngineConfig) -> Self {
        if config.general.use_mocks {
            info!("🧪 Using in-memory adapters");
            Self {
                clock: Arc::new(SystemClock),
                telephony: Arc::new(MockTelephony::new()),
                stt: Arc::new(MockSpeechToText::new()),
                tts: Arc::new(MockTextToSpeech::new()),
                llm: Arc::new(RuleBasedLanguageModel::new()),
            }
        } else {
            Self {
                clock: Arc::new(SystemClock),
                telephony: Arc::new(HttpTelephony::new(
                    &config.telephony.api_base,
                    &config.telephony.account_sid,
                    &config.telephony.auth_token,
                )),
                stt: Arc::new(WsSpeechToText::new(
                    &config.services.stt_endpoint,
                    &config.services.stt_key,
                )),
                tts: Arc::new(HttpTextToSpeech::new(
                    &config.services.tts_endpoint,
                    &config.services.tts_key,
                )),
                llm: Arc::new(HttpLanguageModel::new(
                    &config.services.llm_endpoint,
                    &config.services.llm_key,
                    &config.services.llm_model,
                )),
            }
        }
    }
}

/// Primary orchestration engine.
pub struct CallEngine {
    pub(crate) config: EngineConfig,
    pub(crate) db: DatabaseManager,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) telephony: Arc<dyn Telephony>,
    pub(crate) stt: Arc<dyn SpeechToText>,
    pub(crate) llm: Arc<dyn LanguageModel>,
    pub(crate) synthesizer: CachingSynthesizer,
    pub(crate) audio_host: Arc<AudioHost>,
    pub(crate) cipher: RecordingCipher,
    pub(crate) router: MediaStreamRouter,
}

impl CallEngine {
    pub fn new(config: EngineConfig, db: DatabaseManager, adapters: EngineAdapters) -> Arc<Self> {
        // Hosted audio must outlive the longest call it can be played in.
        let audio_ttl = config.dialog.max_call_duration * 2;
        let audio_host = Arc::new(AudioHost::new(config.general.base_url.clone(), audio_ttl));
        let synthesizer = CachingSynthesizer::new(
            adapters.tts.clone(),
            audio_host.clone(),
            config.dialog.tts_cache_capacity,
        );
        let cipher = RecordingCipher::new(&config.general.encryption_master_key);

        Arc::new(Self {
            config,
            db,
            clock: adapters.clock,
            telephony: adapters.telephony,
            stt: adapters.stt,
            llm: adapters.llm,
            synthesizer,
            audio_host,
            cipher,
            router: MediaStreamRouter::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn audio_host(&self) -> &Arc<AudioHost> {
        &self.audio_host
    }

    pub fn live_call_count(&self) -> usize {
        self.router.live_call_count()
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        self.db.stats().await
    }

    /// Hand a media stream to the dialog runtime. The `start` frame's SID
    /// must belong to a CONNECTED call; the returned sender feeds the
    /// per-call event queue.
    pub async fn attach_stream(
        self: &Arc<Self>,
        sid: &ProviderCallSid,
    ) -> Result<mpsc::Sender<DialogEvent>> {
        let call = self
            .db
            .phone_call_by_sid(sid)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("no call for SID {sid}")))?;

        if call.status != PhoneCallStatus::Connected {
            return Err(EngineError::validation(format!(
                "media stream for call {} in status {}",
                call.id,
                call.status.as_str()
            )));
        }

        self.start_dialog(call)
    }

    /// Spawn the per-call dialog task (idempotent per SID) and return its
    /// event queue sender.
    pub fn start_dialog(self: &Arc<Self>, call: PhoneCall) -> Result<mpsc::Sender<DialogEvent>> {
        let sid = call.provider_call_sid.clone().ok_or_else(|| {
            EngineError::validation(format!("call {} has no provider SID yet", call.id))
        })?;

        if let Some(existing) = self.router.sender_for(&sid) {
            return Ok(existing);
        }

        let (tx, rx) = mpsc::channel(DIALOG_QUEUE_DEPTH);
        self.router.register(&sid, tx.clone());

        let engine = self.clone();
        let queue = tx.clone();
        tokio::spawn(async move {
            engine.run_dialog(call, queue, rx).await;
        });

        info!("🗣️ Dialog task started for call {sid}");
        Ok(tx)
    }
}
