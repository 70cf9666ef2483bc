//! In-memory STT for tests

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{AdapterError, Result};

use super::{SpeechToText, SttConfig, SttInput, SttSender, SttStream, Transcript};

/// Handle to one opened mock stream. Tests emit transcripts through it and
/// inspect the audio the runtime wrote.
#[derive(Clone)]
pub struct MockSttStreamHandle {
    transcripts: mpsc::Sender<Transcript>,
    audio: Arc<Mutex<Vec<Bytes>>>,
    finished: Arc<AtomicBool>,
}

impl MockSttStreamHandle {
    /// Emit a transcript event as if the service produced it.
    pub async fn emit(&self, text: &str, is_final: bool) {
        let _ = self
            .transcripts
            .send(Transcript {
                text: text.to_string(),
                is_final,
            })
            .await;
    }

    pub fn audio_frame_count(&self) -> usize {
        self.audio.lock().len()
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Deterministic STT: every opened stream is captured so the test can script
/// its transcript events.
#[derive(Default)]
pub struct MockSpeechToText {
    streams: Mutex<Vec<MockSttStreamHandle>>,
    fail_next_opens: AtomicU32,
}

impl MockSpeechToText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `open_stream` calls fail transiently.
    pub fn fail_next_opens(&self, n: u32) {
        self.fail_next_opens.store(n, Ordering::SeqCst);
    }

    pub fn opened_stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Handle to the `index`-th stream opened so far.
    pub fn stream_handle(&self, index: usize) -> Option<MockSttStreamHandle> {
        self.streams.lock().get(index).cloned()
    }

    /// Handle to the most recently opened stream.
    pub fn latest_stream(&self) -> Option<MockSttStreamHandle> {
        self.streams.lock().last().cloned()
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    async fn open_stream(&self, _config: SttConfig) -> Result<SttStream> {
        let remaining = self.fail_next_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(AdapterError::transient("mock stt: injected open failure"));
        }

        let (input_tx, mut input_rx) = mpsc::channel(256);
        let (transcript_tx, transcript_rx) = mpsc::channel(256);

        let handle = MockSttStreamHandle {
            transcripts: transcript_tx,
            audio: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
        };
        self.streams.lock().push(handle.clone());

        let audio = handle.audio.clone();
        let finished = handle.finished.clone();
        tokio::spawn(async move {
            while let Some(input) = input_rx.recv().await {
                match input {
                    SttInput::Audio(frame) => audio.lock().push(frame),
                    SttInput::Finish => finished.store(true, Ordering::SeqCst),
                }
            }
        });

        Ok(SttStream {
            sender: SttSender::new(input_tx),
            transcripts: transcript_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_transcripts_flow_through() {
        let stt = MockSpeechToText::new();
        let stream = stt.open_stream(SttConfig::default()).await.unwrap();
        let (sender, mut transcripts) = stream.into_parts();

        let handle = stt.latest_stream().unwrap();
        handle.emit("my fam", false).await;
        handle.emit("my family", true).await;

        let first = transcripts.recv().await.unwrap();
        assert!(!first.is_final);
        let second = transcripts.recv().await.unwrap();
        assert_eq!(second.text, "my family");
        assert!(second.is_final);

        sender.write_audio(Bytes::from_static(&[0u8; 160])).await.unwrap();
        sender.finish().await;
        // Give the consumer task a tick.
        tokio::task::yield_now().await;
        assert_eq!(handle.audio_frame_count(), 1);
        assert!(handle.finished());
    }

    #[tokio::test]
    async fn injected_open_failures() {
        let stt = MockSpeechToText::new();
        stt.fail_next_opens(1);
        assert!(stt.open_stream(SttConfig::default()).await.is_err());
        assert!(stt.open_stream(SttConfig::default()).await.is_ok());
        assert_eq!(stt.opened_stream_count(), 1);
    }
}
