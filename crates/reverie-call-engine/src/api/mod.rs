//! Webhook/HTTP front
//!
//! Translates provider HTTP callbacks and WebSocket upgrades into engine
//! events. Not the hard part, but it carries critical ordering duties: the
//! answer webhook owns the connect edge, the status webhook finalizes
//! abnormal ends idempotently, and the media-stream upgrade hands live
//! audio to the dialog runtime only for CONNECTED calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use reverie_adapters::telephony::signature::validate_signature;
use reverie_adapters::{CallEvent, CallEventKind, InstructionSet, MediaStreamMessage};
use reverie_core::ProviderCallSid;

use crate::dialog::DialogEvent;
use crate::orchestrator::CallEngine;

const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

pub fn router(engine: Arc<CallEngine>) -> Router {
    Router::new()
        .route("/webhooks/answer", post(answer_webhook))
        .route("/webhooks/status", post(status_webhook))
        .route("/webhooks/recording", post(recording_webhook))
        .route("/media-stream", get(media_stream))
        .route("/audio/:id", get(hosted_audio))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

fn xml_response(instructions: InstructionSet) -> Response {
    match instructions.to_xml() {
        Ok(body) => ([(CONTENT_TYPE, "application/xml")], body).into_response(),
        Err(err) => {
            error!("Failed to render instruction document: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Check the provider signature when validation is configured. Returns the
/// rejection response on mismatch.
fn verify_signature(
    engine: &CallEngine,
    headers: &HeaderMap,
    url: String,
    form: &BTreeMap<String, String>,
) -> Result<(), Response> {
    let telephony = &engine.config().telephony;
    if !telephony.validate_signatures {
        return Ok(());
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    validate_signature(&telephony.auth_token, &url, form, signature).map_err(|_| {
        warn!("Rejected webhook with bad signature for {url}");
        (StatusCode::FORBIDDEN, "invalid signature").into_response()
    })
}

async fn answer_webhook(
    State(engine): State<Arc<CallEngine>>,
    headers: HeaderMap,
    Form(form): Form<BTreeMap<String, String>>,
) -> Response {
    if let Err(rejection) = verify_signature(&engine, &headers, engine.config().answer_url(), &form)
    {
        return rejection;
    }

    let Some(sid) = form.get("CallSid") else {
        return (StatusCode::BAD_REQUEST, "missing CallSid").into_response();
    };
    let sid = ProviderCallSid::from(sid.as_str());

    match engine.handle_answer(&sid).await {
        Ok(instructions) => xml_response(instructions),
        Err(err) => {
            error!("Answer webhook for {sid} failed: {err}");
            xml_response(
                InstructionSet::new()
                    .say("Sorry, something went wrong. Please try again later.")
                    .hangup(),
            )
        }
    }
}

async fn status_webhook(
    State(engine): State<Arc<CallEngine>>,
    headers: HeaderMap,
    Form(form): Form<BTreeMap<String, String>>,
) -> Response {
    if let Err(rejection) = verify_signature(&engine, &headers, engine.config().status_url(), &form)
    {
        return rejection;
    }

    let (Some(sid), Some(status)) = (form.get("CallSid"), form.get("CallStatus")) else {
        return (StatusCode::BAD_REQUEST, "missing CallSid/CallStatus").into_response();
    };

    let Some(kind) = CallEventKind::parse(status) else {
        debug!("Ignoring unknown call status {status:?} for {sid}");
        return StatusCode::NO_CONTENT.into_response();
    };

    let event = CallEvent {
        sid: ProviderCallSid::from(sid.as_str()),
        kind,
        from: form.get("From").cloned(),
        to: form.get("To").cloned(),
        raw_status: status.clone(),
    };

    if let Err(err) = engine.handle_status(event).await {
        error!("Status webhook for {sid} failed: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn recording_webhook(
    State(engine): State<Arc<CallEngine>>,
    headers: HeaderMap,
    Form(form): Form<BTreeMap<String, String>>,
) -> Response {
    if let Err(rejection) =
        verify_signature(&engine, &headers, engine.config().recording_url(), &form)
    {
        return rejection;
    }

    let (Some(sid), Some(url)) = (form.get("CallSid"), form.get("RecordingUrl")) else {
        return (StatusCode::BAD_REQUEST, "missing CallSid/RecordingUrl").into_response();
    };

    let sid = ProviderCallSid::from(sid.as_str());
    if let Err(err) = engine.handle_recording(&sid, url).await {
        error!("Recording webhook for {sid} failed: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn media_stream(
    State(engine): State<Arc<CallEngine>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_media_socket(engine, socket))
}

/// Pump one provider media stream into its call's event queue. The `start`
/// frame carries the SID; everything before it is ignored.
async fn handle_media_socket(engine: Arc<CallEngine>, mut socket: WebSocket) {
    let mut dialog: Option<tokio::sync::mpsc::Sender<DialogEvent>> = None;

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };

        match MediaStreamMessage::parse(&text) {
            Ok(MediaStreamMessage::Connected(_)) => {}

            Ok(MediaStreamMessage::Start(frame)) => {
                let sid = ProviderCallSid::from(frame.start.call_sid.as_str());
                match engine.attach_stream(&sid).await {
                    Ok(sender) => {
                        debug!("Media stream attached for {sid}");
                        dialog = Some(sender);
                    }
                    Err(err) => {
                        warn!("Rejecting media stream for {sid}: {err}");
                        break;
                    }
                }
            }

            Ok(MediaStreamMessage::Media(frame)) => {
                let Some(sender) = &dialog else { continue };
                match frame.decode_payload() {
                    Ok(audio) => {
                        if sender.send(DialogEvent::Audio(audio)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("Dropping undecodable media frame: {err}"),
                }
            }

            Ok(MediaStreamMessage::Mark(_)) => {}

            Ok(MediaStreamMessage::Stop(_)) => {
                if let Some(sender) = &dialog {
                    let _ = sender.send(DialogEvent::MediaStopped).await;
                }
                break;
            }

            Err(err) => warn!("Unparseable media-stream frame: {err}"),
        }
    }

    debug!("Media socket closed");
}

async fn hosted_audio(
    State(engine): State<Arc<CallEngine>>,
    Path(id): Path<String>,
) -> Response {
    match engine.audio_host().fetch(&id) {
        // μ-law 8 kHz mono is audio/basic on the wire.
        Some(audio) => ([(CONTENT_TYPE, "audio/basic")], audio).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn healthz(State(engine): State<Arc<CallEngine>>) -> Response {
    match engine.stats().await {
        Ok(stats) => Json(serde_json::json!({
            "status": "ok",
            "active_calls": stats.active_calls,
            "pending_scheduled": stats.pending_scheduled,
        }))
        .into_response(),
        Err(err) => {
            error!("Health check failed: {err}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
