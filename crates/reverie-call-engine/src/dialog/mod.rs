//! Streaming dialog runtime
//!
//! The hardest subsystem: one long-lived task per active call fusing the
//! inbound media stream with STT, LLM endpointing, and TTS. Everything that
//! can touch a call's response buffer (media frames, transcript events,
//! the endpointer tick, the hangup signal) flows through one per-call
//! queue, so the buffer has a single writer.
//!
//! - [`endpointing`]: the pure turn-endpointing decision
//! - [`router`]: the per-SID registry the media WebSocket feeds
//! - [`runtime`]: the turn loop and closing sequence

pub mod endpointing;
pub mod router;
pub mod runtime;

pub use endpointing::{Endpointer, PauseAssessment};
pub use router::MediaStreamRouter;

use bytes::Bytes;
use reverie_adapters::Transcript;

/// Everything that can wake a call task.
#[derive(Debug)]
pub enum DialogEvent {
    /// One inbound μ-law audio frame.
    Audio(Bytes),
    /// A transcript event from the STT stream.
    Transcript(Transcript),
    /// Periodic endpointer tick.
    Tick,
    /// The provider reported the call ended; state is already finalized.
    Hangup,
    /// The media stream stopped without a status event (yet).
    MediaStopped,
}
