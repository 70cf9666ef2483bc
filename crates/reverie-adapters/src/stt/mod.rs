//! Streaming speech-to-text adapter
//!
//! A stream is a duplex handle: audio frames go in, transcript events come
//! out. Interim transcripts are hints (they only move the speech clock);
//! final transcripts are appended to the turn buffer. Reconnects within a
//! stream's lifetime are the adapter's problem, not the dialog runtime's.

pub mod live;
pub mod mock;

pub use live::WsSpeechToText;
pub use mock::{MockSpeechToText, MockSttStreamHandle};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{AdapterError, Result};

/// Stream configuration; defaults match telephony narrow-band audio.
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub language: String,
    pub punctuate: bool,
    pub interim_results: bool,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            encoding: "mulaw".to_string(),
            sample_rate: 8000,
            channels: 1,
            language: "en-US".to_string(),
            punctuate: true,
            interim_results: true,
        }
    }
}

/// One transcript event from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub is_final: bool,
}

pub(crate) enum SttInput {
    Audio(Bytes),
    Finish,
}

/// Write half of an open stream; cheap to clone.
#[derive(Clone)]
pub struct SttSender {
    tx: mpsc::Sender<SttInput>,
}

impl SttSender {
    pub(crate) fn new(tx: mpsc::Sender<SttInput>) -> Self {
        Self { tx }
    }

    /// Feed one audio frame. Fails once the stream is gone.
    pub async fn write_audio(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(SttInput::Audio(frame))
            .await
            .map_err(|_| AdapterError::transient("stt stream closed"))
    }

    /// Signal end-of-audio so the service can flush pending finals.
    pub async fn finish(&self) {
        let _ = self.tx.send(SttInput::Finish).await;
    }
}

/// An open duplex stream.
pub struct SttStream {
    pub sender: SttSender,
    pub transcripts: mpsc::Receiver<Transcript>,
}

impl SttStream {
    pub fn into_parts(self) -> (SttSender, mpsc::Receiver<Transcript>) {
        (self.sender, self.transcripts)
    }
}

/// Capability interface for the streaming STT service.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn open_stream(&self, config: SttConfig) -> Result<SttStream>;
}
