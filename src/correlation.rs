// ============================================================================
// Response Correlation
// ============================================================================
//
// Turns the HTTP response observed for a dispatched request into either a
// typed live response or an acknowledgement envelope for the originating
// command. All mismatches are non-fatal: they produce a BAD_REQUEST
// acknowledgement carrying the explanation, never a pipeline error.
//
// ============================================================================

use crate::httppush::PushResponse;
use crate::model::{Acknowledgement, AcknowledgementLabel, Target};
use crate::signal::protocol::{is_protocol_content_type, parse_live_response};
use crate::signal::{MessageCommand, MessageResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::StatusCode;
use serde_json::Value;

/// Outcome of correlating one response with its originating command
#[derive(Debug, Clone)]
pub enum ResponseOutcome {
    LiveResponse(MessageResponse),
    Ack(Acknowledgement),
}

/// Correlate a response with the command it answers.
///
/// When the target issues `live-response` the response body is interpreted as
/// the live response itself: protocol-encoded bodies are parsed and validated
/// against the command, any other body becomes the response payload as-is.
/// Targets issuing a custom label produce a plain acknowledgement under that
/// label.
pub fn correlate_response(
    command: &MessageCommand,
    target: &Target,
    response: &PushResponse,
) -> ResponseOutcome {
    let issued_label = target
        .issued_acknowledgement_label
        .clone()
        .unwrap_or_else(AcknowledgementLabel::live_response);

    if issued_label.is_live_response() && command.requests_live_response() {
        correlate_live_response(command, response)
    } else {
        ResponseOutcome::Ack(acknowledgement(command, issued_label, response))
    }
}

fn correlate_live_response(command: &MessageCommand, response: &PushResponse) -> ResponseOutcome {
    let is_protocol = response
        .content_type()
        .map(is_protocol_content_type)
        .unwrap_or(false);

    if !is_protocol {
        // A plain response body answers the command directly.
        return ResponseOutcome::LiveResponse(MessageResponse {
            thing_id: command.thing_id.clone(),
            feature_id: command.feature_id.clone(),
            direction: command.direction,
            subject: command.subject.clone(),
            correlation_id: command.correlation_id.clone(),
            status: response.status,
            content_type: response.content_type().map(str::to_string),
            payload: response_entity(response),
            headers: response.headers.clone(),
        });
    }

    let parsed = match parse_live_response(&response.body) {
        Ok(parsed) => parsed,
        Err(error) => {
            return mismatch_ack(command, format!("{}", error));
        }
    };

    if parsed.correlation_id != command.correlation_id {
        return mismatch_ack(
            command,
            format!(
                "Correlation ID of response <{}> does not match correlation ID of message command <{}>",
                parsed.correlation_id.as_deref().unwrap_or_default(),
                command.correlation_id.as_deref().unwrap_or_default()
            ),
        );
    }

    if parsed.thing_id != command.thing_id {
        return mismatch_ack(
            command,
            format!(
                "Live response does not target the correct thing. Expected thing ID <{}>, but was <{}>.",
                command.thing_id, parsed.thing_id
            ),
        );
    }

    if parsed.response_type() != command.expected_response_type() {
        return mismatch_ack(
            command,
            format!(
                "Live response of type <{}> is not of expected type <{}>.",
                parsed.response_type(),
                command.expected_response_type()
            ),
        );
    }

    ResponseOutcome::LiveResponse(parsed)
}

fn acknowledgement(
    command: &MessageCommand,
    label: AcknowledgementLabel,
    response: &PushResponse,
) -> Acknowledgement {
    Acknowledgement::new(
        label,
        command.thing_id.clone(),
        response.status,
        response.headers.clone(),
        response_entity(response),
    )
}

fn mismatch_ack(command: &MessageCommand, message: String) -> ResponseOutcome {
    tracing::debug!(
        thing_id = %command.thing_id,
        correlation_id = ?command.correlation_id,
        %message,
        "Live response rejected"
    );
    let entity = serde_json::json!({
        "status": StatusCode::BAD_REQUEST.as_u16(),
        "error": "connectivity:live.response.invalid",
        "message": message,
    });
    ResponseOutcome::Ack(Acknowledgement::new(
        AcknowledgementLabel::live_response(),
        command.thing_id.clone(),
        StatusCode::BAD_REQUEST,
        Default::default(),
        Some(entity),
    ))
}

/// Coding of a response body into an acknowledgement entity:
/// JSON content types are parsed (falling back to the raw string), textual
/// bodies become JSON strings, binary bodies become base64-encoded JSON
/// strings. Empty bodies produce no entity.
pub fn response_entity(response: &PushResponse) -> Option<Value> {
    if response.body.is_empty() {
        return None;
    }

    let mime = response
        .content_type()
        .and_then(|content_type| content_type.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let is_json = mime == "application/json" || mime.ends_with("+json");
    let is_text = mime.starts_with("text/");

    if is_json {
        if let Ok(parsed) = serde_json::from_slice::<Value>(&response.body) {
            return Some(parsed);
        }
    }
    if is_json || is_text {
        if let Ok(text) = String::from_utf8(response.body.clone()) {
            return Some(Value::String(text));
        }
    }
    Some(Value::String(BASE64.encode(&response.body)))
}
