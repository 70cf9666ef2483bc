//! Text-to-speech adapter, hosted audio, and the synthesis cache
//!
//! The provider can only play audio it can fetch over HTTP, so synthesized
//! blobs are parked in a process-local [`AudioHost`] and handed to the
//! provider as URLs. Synthesis results are cached in an LRU keyed by a hash
//! of (text, voice, rate, pitch); prompt texts repeat every day, closing
//! messages on every call.

pub mod live;
pub mod mock;

pub use live::HttpTextToSpeech;
pub use mock::MockTextToSpeech;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// A synthesis request; the cache key covers every field.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    pub voice: String,
    pub rate: f32,
    pub pitch: f32,
}

impl TtsRequest {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            rate: 1.0,
            pitch: 0.0,
        }
    }

    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hasher.update([0]);
        hasher.update(self.voice.as_bytes());
        hasher.update([0]);
        hasher.update(self.rate.to_bits().to_le_bytes());
        hasher.update(self.pitch.to_bits().to_le_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Capability interface for the synthesis service. Returns raw μ-law 8 kHz
/// mono audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Bytes>;
}

struct HostedBlob {
    bytes: Bytes,
    expires_at: Instant,
}

/// Process-local audio host. Entries live at least as long as the longest
/// expected call so a URL handed to the provider stays valid for playback.
pub struct AudioHost {
    base_url: String,
    ttl: Duration,
    blobs: DashMap<String, HostedBlob>,
}

impl AudioHost {
    pub fn new(base_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            ttl,
            blobs: DashMap::new(),
        }
    }

    /// Park a blob and return its public URL.
    pub fn host(&self, bytes: Bytes) -> String {
        self.purge_expired();
        let id = Uuid::new_v4().to_string();
        self.blobs.insert(
            id.clone(),
            HostedBlob {
                bytes,
                expires_at: Instant::now() + self.ttl,
            },
        );
        self.url_for(&id)
    }

    pub fn url_for(&self, id: &str) -> String {
        format!("{}/audio/{id}", self.base_url)
    }

    /// Fetch a hosted blob by id, if it exists and has not expired.
    pub fn fetch(&self, id: &str) -> Option<Bytes> {
        let blob = self.blobs.get(id)?;
        if blob.expires_at < Instant::now() {
            drop(blob);
            self.blobs.remove(id);
            return None;
        }
        Some(blob.bytes.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fetch(id).is_some()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.blobs.retain(|_, blob| blob.expires_at >= now);
    }
}

/// TTS front door used by the dialog runtime: synthesize-or-reuse, host, and
/// hand back a playable URL.
pub struct CachingSynthesizer {
    tts: Arc<dyn TextToSpeech>,
    host: Arc<AudioHost>,
    cache: Mutex<LruCache<String, String>>,
}

impl CachingSynthesizer {
    pub fn new(tts: Arc<dyn TextToSpeech>, host: Arc<AudioHost>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            tts,
            host,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// URL of hosted audio for this request, synthesizing on cache miss.
    pub async fn hosted_url(&self, request: &TtsRequest) -> Result<String> {
        let key = request.cache_key();

        if let Some(blob_id) = self.cache.lock().get(&key).cloned() {
            if self.host.contains(&blob_id) {
                debug!("TTS cache hit for {key}");
                return Ok(self.host.url_for(&blob_id));
            }
        }

        let audio = self.tts.synthesize(request).await?;
        let url = self.host.host(audio);
        let blob_id = url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        self.cache.lock().put(key, blob_id);
        Ok(url)
    }
}
