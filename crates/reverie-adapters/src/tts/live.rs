//! Live TTS client (HTTPS, raw audio response)

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::{with_retries, AdapterError, Result};

use super::{TextToSpeech, TtsRequest};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// HTTPS client for the synthesis service; the response body is raw μ-law
/// 8 kHz mono audio.
pub struct HttpTextToSpeech {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    voice: &'a str,
    speaking_rate: f32,
    pitch: f32,
    encoding: &'static str,
    sample_rate: u32,
}

impl HttpTextToSpeech {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Bytes> {
        let body = SynthesisBody {
            text: &request.text,
            voice: &request.voice,
            speaking_rate: request.rate,
            pitch: request.pitch,
            encoding: "mulaw",
            sample_rate: 8000,
        };

        let body = &body;
        let audio = with_retries(RETRY_ATTEMPTS, RETRY_BASE_DELAY, || async move {
            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(AdapterError::from_status(status.as_u16(), "tts"));
            }
            resp.bytes().await.map_err(AdapterError::from)
        })
        .await?;

        debug!("Synthesized {} bytes for {:?}…", audio.len(), &request.text.chars().take(32).collect::<String>());
        Ok(audio)
    }
}
