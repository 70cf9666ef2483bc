//! Media-stream wire frames
//!
//! The provider's media WebSocket exchanges JSON control frames. Inbound
//! audio arrives as `media` frames whose payload is base64-encoded μ-law at
//! 8 kHz mono, roughly one frame per 20 ms, tagged with the call SID in the
//! `start` frame.

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AdapterError, Result};

#[derive(Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum MediaStreamMessage {
    Connected(ConnectedFrame),
    Start(StartFrame),
    Media(MediaFrame),
    Mark(MarkFrame),
    Stop(StopFrame),
}

impl MediaStreamMessage {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(Into::into)
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedFrame {
    pub event: String,
    pub protocol: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartFrame {
    pub event: String,
    pub stream_sid: String,
    pub start: StartMetadata,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u32,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaFrame {
    pub event: String,
    pub stream_sid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    pub media: MediaPayload,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl MediaFrame {
    /// Decode the base64 payload into raw μ-law bytes.
    pub fn decode_payload(&self) -> Result<Bytes> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.media.payload)
            .map(Bytes::from)
            .map_err(|e| AdapterError::permanent(format!("media payload decode: {e}")))
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MarkFrame {
    pub event: String,
    pub stream_sid: String,
    pub mark: Mark,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Mark {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StopFrame {
    pub event: String,
    pub stream_sid: String,
    pub stop: Stop,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    #[serde(default)]
    pub account_sid: Option<String>,
    pub call_sid: String,
}
