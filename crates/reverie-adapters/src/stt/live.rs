//! Live STT client over WebSocket

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

use crate::error::{AdapterError, Result};

use super::{SpeechToText, SttConfig, SttInput, SttSender, SttStream, Transcript};

const CHANNEL_DEPTH: usize = 256;

/// WebSocket client for the streaming STT service. Emits
/// `{channel:{alternatives:[{transcript, is_final}]}}`-shaped events and
/// performs at most one in-stream reconnect on its own.
pub struct WsSpeechToText {
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    channel: Option<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
    #[serde(default)]
    is_final: bool,
}

impl WsSpeechToText {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn stream_url(&self, config: &SttConfig) -> String {
        format!(
            "{}?encoding={}&sample_rate={}&channels={}&language={}&punctuate={}&interim_results={}",
            self.endpoint,
            config.encoding,
            config.sample_rate,
            config.channels,
            config.language,
            config.punctuate,
            config.interim_results,
        )
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(url: &str, api_key: &str) -> Result<Socket> {
    let mut request = url
        .into_client_request()
        .map_err(|e| AdapterError::permanent(format!("stt url: {e}")))?;
    request.headers_mut().insert(
        "Authorization",
        format!("Token {api_key}")
            .parse()
            .map_err(|_| AdapterError::permanent("stt api key is not a valid header value"))?,
    );

    let (socket, _) = connect_async(request)
        .await
        .map_err(|e| AdapterError::transient(format!("stt connect: {e}")))?;
    Ok(socket)
}

fn parse_transcript(text: &str) -> Option<Transcript> {
    let message: ServerMessage = serde_json::from_str(text).ok()?;
    let channel = message.channel?;
    let alternative = channel.alternatives.into_iter().next()?;
    if alternative.transcript.is_empty() {
        return None;
    }
    Some(Transcript {
        text: alternative.transcript,
        is_final: alternative.is_final,
    })
}

async fn pump_stream(
    url: String,
    api_key: String,
    mut input: mpsc::Receiver<SttInput>,
    transcripts: mpsc::Sender<Transcript>,
) {
    let mut reconnects_left = 1u32;

    'connection: loop {
        let socket = match connect(&url, &api_key).await {
            Ok(socket) => socket,
            Err(err) if reconnects_left > 0 => {
                reconnects_left -= 1;
                warn!("STT reconnecting after connect failure: {err}");
                continue 'connection;
            }
            Err(err) => {
                error!("STT stream unavailable: {err}");
                return;
            }
        };

        let (mut sink, mut source) = socket.split();

        loop {
            tokio::select! {
                frame = input.recv() => match frame {
                    Some(SttInput::Audio(bytes)) => {
                        if let Err(err) = sink.send(Message::Binary(bytes)).await {
                            if reconnects_left > 0 {
                                reconnects_left -= 1;
                                warn!("STT reconnecting after send failure: {err}");
                                continue 'connection;
                            }
                            error!("STT send failed, closing stream: {err}");
                            return;
                        }
                    }
                    Some(SttInput::Finish) => {
                        let _ = sink.send(Message::Text(r#"{"type":"CloseStream"}"#.into())).await;
                    }
                    None => {
                        debug!("STT input closed, shutting stream down");
                        let _ = sink.close().await;
                        return;
                    }
                },
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(transcript) = parse_transcript(text.as_str()) {
                            if transcripts.send(transcript).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("STT server closed the stream");
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        if reconnects_left > 0 {
                            reconnects_left -= 1;
                            warn!("STT reconnecting after read failure: {err}");
                            continue 'connection;
                        }
                        error!("STT read failed, closing stream: {err}");
                        return;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl SpeechToText for WsSpeechToText {
    async fn open_stream(&self, config: SttConfig) -> Result<SttStream> {
        let (input_tx, input_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (transcript_tx, transcript_rx) = mpsc::channel(CHANNEL_DEPTH);

        let url = self.stream_url(&config);
        let api_key = self.api_key.clone();
        tokio::spawn(pump_stream(url, api_key, input_rx, transcript_tx));

        Ok(SttStream {
            sender: SttSender::new(input_tx),
            transcripts: transcript_rx,
        })
    }
}
