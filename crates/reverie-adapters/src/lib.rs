//! External service adapters for the reverie call orchestration engine
//!
//! Every external dependency of the engine is modeled as a capability trait
//! with a live implementation and an in-memory one, wired at startup:
//!
//! - [`telephony`]: outbound call placement, mid-call instruction documents,
//!   provider webhook events, and the media-stream wire frames
//! - [`stt`]: streaming speech-to-text over a duplex WebSocket
//! - [`tts`]: speech synthesis, hosted-audio URLs, and the synthesis cache
//! - [`llm`]: semantic turn-endpointing and structured rating extraction
//! - [`crypto`]: per-user authenticated encryption of recording URLs
//!
//! No component reads a mock flag internally; test suites construct the
//! in-memory implementations directly and hand them in.

pub mod crypto;
pub mod error;
pub mod llm;
pub mod stt;
pub mod telephony;
pub mod tts;

pub use crypto::RecordingCipher;
pub use error::{AdapterError, Result};
pub use llm::{CompletionCheck, LanguageModel, RatingExtraction};
pub use stt::{SpeechToText, SttConfig, SttSender, SttStream, Transcript};
pub use telephony::{
    Action, CallEvent, CallEventKind, InstructionSet, MediaFrame, MediaStreamMessage, Telephony,
};
pub use tts::{AudioHost, CachingSynthesizer, TextToSpeech, TtsRequest};
