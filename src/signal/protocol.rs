use super::{MessageDirection, MessageResponse};
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::model::ThingId;
use http::StatusCode;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Content type identifying a protocol-encoded message
pub const DITTO_PROTOCOL_CONTENT_TYPE: &str = "application/vnd.eclipse.ditto+json";

/// Checks whether a content type denotes the protocol wire form, ignoring
/// casing and media-type parameters.
pub fn is_protocol_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case(DITTO_PROTOCOL_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Parse a live message response from its protocol wire form.
///
/// The wire form is a JSON object with `topic`, `headers`, `path`, `status`
/// and `value`:
/// - topic: `<namespace>/<name>/things/live/messages/<subject>`
/// - path: `/outbox/messages/<subject>`, `/inbox/messages/<subject>` or the
///   feature variants `/features/<id>/outbox/messages/<subject>`
pub fn parse_live_response(body: &[u8]) -> ConnectivityResult<MessageResponse> {
    let root: Value = serde_json::from_slice(body)
        .map_err(|e| ConnectivityError::protocol(format!("Response is not valid JSON: {}", e)))?;

    let topic = root
        .get("topic")
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectivityError::protocol("Response is missing the topic"))?;
    let path = root
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectivityError::protocol("Response is missing the path"))?;

    let (thing_id, topic_subject) = parse_topic(topic)?;
    let (feature_id, direction, path_subject) = parse_path(path)?;
    if topic_subject != path_subject {
        return Err(ConnectivityError::protocol(format!(
            "Topic subject <{}> does not match path subject <{}>",
            topic_subject, path_subject
        )));
    }

    let headers: HashMap<String, String> = root
        .get("headers")
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|v| (key.clone(), v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let status = root
        .get("status")
        .and_then(Value::as_u64)
        .ok_or_else(|| ConnectivityError::protocol("Response is missing the status"))?;
    let status = StatusCode::from_u16(status as u16)
        .map_err(|_| ConnectivityError::protocol(format!("Invalid status <{}>", status)))?;

    let correlation_id = headers.get("correlation-id").cloned();
    let content_type = headers.get("content-type").cloned();

    Ok(MessageResponse {
        thing_id,
        feature_id,
        direction,
        subject: topic_subject,
        correlation_id,
        status,
        content_type,
        payload: root.get("value").filter(|v| !v.is_null()).cloned(),
        headers,
    })
}

/// Encode a live message response into its protocol wire form
pub fn to_protocol_json(response: &MessageResponse) -> Value {
    let topic = format!(
        "{}/{}/things/live/messages/{}",
        response.thing_id.namespace(),
        response.thing_id.name(),
        response.subject
    );
    let box_name = match response.direction {
        MessageDirection::From => "outbox",
        MessageDirection::To => "inbox",
    };
    let path = match &response.feature_id {
        Some(feature_id) => format!(
            "/features/{}/{}/messages/{}",
            feature_id, box_name, response.subject
        ),
        None => format!("/{}/messages/{}", box_name, response.subject),
    };

    let mut headers = response.headers.clone();
    if let Some(correlation_id) = &response.correlation_id {
        headers.insert("correlation-id".to_string(), correlation_id.clone());
    }
    if let Some(content_type) = &response.content_type {
        headers.insert("content-type".to_string(), content_type.clone());
    }

    json!({
        "topic": topic,
        "headers": headers,
        "path": path,
        "status": response.status.as_u16(),
        "value": response.payload.clone().unwrap_or(Value::Null),
    })
}

fn parse_topic(topic: &str) -> ConnectivityResult<(ThingId, String)> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        [namespace, name, "things", "live", "messages", subject @ ..] if !subject.is_empty() => {
            Ok((ThingId::new(*namespace, *name), subject.join("/")))
        }
        _ => Err(ConnectivityError::protocol(format!(
            "Topic <{}> is not a live message topic",
            topic
        ))),
    }
}

fn parse_path(path: &str) -> ConnectivityResult<(Option<String>, MessageDirection, String)> {
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match parts.as_slice() {
        [box_name, "messages", subject @ ..] if !subject.is_empty() => Ok((
            None,
            parse_direction(box_name, path)?,
            subject.join("/"),
        )),
        ["features", feature_id, box_name, "messages", subject @ ..] if !subject.is_empty() => {
            Ok((
                Some(feature_id.to_string()),
                parse_direction(box_name, path)?,
                subject.join("/"),
            ))
        }
        _ => Err(ConnectivityError::protocol(format!(
            "Path <{}> is not a live message path",
            path
        ))),
    }
}

fn parse_direction(box_name: &str, path: &str) -> ConnectivityResult<MessageDirection> {
    match box_name {
        "outbox" => Ok(MessageDirection::From),
        "inbox" => Ok(MessageDirection::To),
        _ => Err(ConnectivityError::protocol(format!(
            "Path <{}> has an unknown message box",
            path
        ))),
    }
}
