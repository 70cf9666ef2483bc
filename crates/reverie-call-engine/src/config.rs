//! Engine configuration
//!
//! Configuration is plain structs with defaults suitable for local
//! development against the in-memory adapters. The binary populates them
//! from the environment; components never read the environment themselves.

use std::net::SocketAddr;
use std::time::Duration;

use reverie_core::PhoneNumber;

use crate::error::{EngineError, Result};

/// Top-level configuration for the call engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub general: GeneralConfig,
    pub database: DatabaseConfig,
    pub telephony: TelephonyConfig,
    pub services: ServicesConfig,
    pub dialog: DialogConfig,
    pub scheduler: SchedulerConfig,
}

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    /// Public base URL webhooks are built from; the media-stream URL derives
    /// its scheme from this (`http` → `ws`, `https` → `wss`).
    pub base_url: String,
    pub bind_addr: SocketAddr,
    pub encryption_master_key: String,
    pub use_mocks: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct TelephonyConfig {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: PhoneNumber,
    /// Verify provider webhook signatures when an auth token is configured.
    pub validate_signatures: bool,
}

#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub stt_endpoint: String,
    pub stt_key: String,
    pub tts_endpoint: String,
    pub tts_key: String,
    pub tts_voice: String,
    pub llm_endpoint: String,
    pub llm_key: String,
    pub llm_model: String,
}

/// Dialog runtime tuning.
#[derive(Debug, Clone)]
pub struct DialogConfig {
    /// Below this much silence the caller is still talking.
    pub pause_min: Duration,
    /// At this much silence a non-empty answer is complete no matter what.
    pub pause_hard: Duration,
    /// Endpointer tick period.
    pub tick: Duration,
    /// LLM completion verdicts below this confidence are ignored.
    pub completion_confidence: f64,
    /// Rating extractions below this confidence leave the rating unset.
    pub rating_confidence: f64,
    /// Wall-clock ceiling for one call.
    pub max_call_duration: Duration,
    pub closing_message: String,
    pub tts_cache_capacity: usize,
}

/// Periodic worker tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub window_poll: Duration,
    pub dispatch_poll: Duration,
    pub dispatch_batch: u32,
    pub retry_backoff: Duration,
    /// Pending calls older than this are cancelled instead of dialed; a
    /// stuck PENDING row would otherwise park its user forever.
    pub stale_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                base_url: "http://localhost:8080".to_string(),
                bind_addr: "127.0.0.1:8080".parse().unwrap(),
                encryption_master_key: "dev-master-key".to_string(),
                use_mocks: true,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 10,
            },
            telephony: TelephonyConfig {
                api_base: "https://api.telephony.example".to_string(),
                account_sid: String::new(),
                auth_token: String::new(),
                from_number: PhoneNumber::parse("+15005550006").unwrap(),
                validate_signatures: false,
            },
            services: ServicesConfig {
                stt_endpoint: "wss://stt.example/v1/listen".to_string(),
                stt_key: String::new(),
                tts_endpoint: "https://tts.example/v1/speak".to_string(),
                tts_key: String::new(),
                tts_voice: "warm".to_string(),
                llm_endpoint: "https://llm.example/v1/chat/completions".to_string(),
                llm_key: String::new(),
                llm_model: "structured-small".to_string(),
            },
            dialog: DialogConfig {
                pause_min: Duration::from_secs(3),
                pause_hard: Duration::from_secs(12),
                tick: Duration::from_millis(250),
                completion_confidence: 0.6,
                rating_confidence: 0.5,
                max_call_duration: Duration::from_secs(15 * 60),
                closing_message: "Thank you for reflecting today. Your entry has been saved. \
                                  Goodbye!"
                    .to_string(),
                tts_cache_capacity: 64,
            },
            scheduler: SchedulerConfig {
                window_poll: Duration::from_secs(300),
                dispatch_poll: Duration::from_secs(15),
                dispatch_batch: 16,
                retry_backoff: Duration::from_secs(300),
                stale_after: Duration::from_secs(6 * 60 * 60),
            },
        }
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| {
        EngineError::configuration(format!("missing required environment variable {name}"))
    })
}

fn optional_secs(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| EngineError::configuration(format!("{name} must be seconds, got {raw}")))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

impl EngineConfig {
    /// Build the configuration from the environment. With `USE_MOCKS=true`
    /// the external-service credentials become optional.
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();

        let use_mocks = std::env::var("USE_MOCKS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config.general.use_mocks = use_mocks;

        if let Ok(base_url) = std::env::var("BASE_URL") {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(EngineError::configuration(format!(
                    "BASE_URL must be http(s), got {base_url}"
                )));
            }
            config.general.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(bind) = std::env::var("BIND_ADDR") {
            config.general.bind_addr = bind
                .parse()
                .map_err(|_| EngineError::configuration(format!("BIND_ADDR invalid: {bind}")))?;
        }
        if let Ok(db_url) = std::env::var("DB_URL") {
            config.database.url = db_url;
        }

        if use_mocks {
            if let Ok(key) = std::env::var("ENCRYPTION_MASTER_KEY") {
                config.general.encryption_master_key = key;
            }
        } else {
            config.general.encryption_master_key = required("ENCRYPTION_MASTER_KEY")?;
            config.telephony.account_sid = required("TELEPHONY_ACCOUNT_SID")?;
            config.telephony.auth_token = required("TELEPHONY_AUTH_TOKEN")?;
            config.telephony.from_number =
                PhoneNumber::parse(&required("TELEPHONY_FROM_NUMBER")?)?;
            config.telephony.validate_signatures = true;
            if let Ok(api_base) = std::env::var("TELEPHONY_API_BASE") {
                config.telephony.api_base = api_base;
            }
            config.services.stt_key = required("STT_KEY")?;
            config.services.tts_key = required("TTS_KEY")?;
            config.services.llm_key = required("LLM_KEY")?;
        }

        if let Some(pause) = optional_secs("PAUSE_THRESHOLD_SEC")? {
            config.dialog.pause_min = pause;
        }
        if let Some(poll) = optional_secs("WINDOW_POLL_SEC")? {
            config.scheduler.window_poll = poll;
        }
        if let Some(poll) = optional_secs("DISPATCH_POLL_SEC")? {
            config.scheduler.dispatch_poll = poll;
        }

        Ok(config)
    }

    /// The media-stream WebSocket URL; protocol derived from the front-door
    /// scheme so `ws` is only ever paired with `http` and `wss` with `https`.
    pub fn stream_url(&self) -> String {
        let base = &self.general.base_url;
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{base}")
        };
        format!("{ws_base}/media-stream")
    }

    pub fn answer_url(&self) -> String {
        format!("{}/webhooks/answer", self.general.base_url)
    }

    pub fn status_url(&self) -> String {
        format!("{}/webhooks/status", self.general.base_url)
    }

    pub fn recording_url(&self) -> String {
        format!("{}/webhooks/recording", self.general.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.dialog.pause_min, Duration::from_secs(3));
        assert_eq!(config.dialog.pause_hard, Duration::from_secs(12));
        assert_eq!(config.dialog.tick, Duration::from_millis(250));
        assert!(config.dialog.pause_min < config.dialog.pause_hard);
        assert_eq!(config.scheduler.dispatch_poll, Duration::from_secs(15));
        assert_eq!(config.scheduler.window_poll, Duration::from_secs(300));
    }

    #[test]
    fn stream_url_scheme_follows_base_url() {
        let mut config = EngineConfig::default();
        config.general.base_url = "http://localhost:8080".to_string();
        assert_eq!(config.stream_url(), "ws://localhost:8080/media-stream");

        config.general.base_url = "https://reverie.example".to_string();
        assert_eq!(config.stream_url(), "wss://reverie.example/media-stream");
    }

    #[test]
    fn webhook_urls() {
        let mut config = EngineConfig::default();
        config.general.base_url = "https://reverie.example".to_string();
        assert_eq!(config.answer_url(), "https://reverie.example/webhooks/answer");
        assert_eq!(config.status_url(), "https://reverie.example/webhooks/status");
        assert_eq!(
            config.recording_url(),
            "https://reverie.example/webhooks/recording"
        );
    }
}
