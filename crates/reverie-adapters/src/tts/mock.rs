//! In-memory TTS for tests

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{AdapterError, Result};

use super::{TextToSpeech, TtsRequest};

/// Deterministic synthesis: the "audio" is the text itself, prefixed so
/// tests can tell blobs apart. Records every request.
#[derive(Default)]
pub struct MockTextToSpeech {
    synthesized: Mutex<Vec<TtsRequest>>,
    fail_next: AtomicU32,
}

impl MockTextToSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_syntheses(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn synthesized_texts(&self) -> Vec<String> {
        self.synthesized.lock().iter().map(|r| r.text.clone()).collect()
    }
}

#[async_trait]
impl TextToSpeech for MockTextToSpeech {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Bytes> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(AdapterError::transient("mock tts: injected failure"));
        }

        self.synthesized.lock().push(request.clone());
        Ok(Bytes::from(format!("ulaw:{}", request.text).into_bytes()))
    }
}
