use super::ThingId;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;

/// Label identifying one acknowledgement within an aggregate.
///
/// Either one of the built-in labels (`live-response`, `twin-persisted`) or a
/// custom `namespace:name` label issued by a connection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcknowledgementLabel(String);

impl AcknowledgementLabel {
    pub const LIVE_RESPONSE: &'static str = "live-response";
    pub const TWIN_PERSISTED: &'static str = "twin-persisted";

    pub fn of(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn live_response() -> Self {
        Self(Self::LIVE_RESPONSE.to_string())
    }

    pub fn is_live_response(&self) -> bool {
        self.0 == Self::LIVE_RESPONSE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AcknowledgementLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single acknowledgement envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    pub label: AcknowledgementLabel,
    pub entity_id: ThingId,
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub entity: Option<Value>,
}

impl Acknowledgement {
    pub fn new(
        label: AcknowledgementLabel,
        entity_id: ThingId,
        status: StatusCode,
        headers: HashMap<String, String>,
        entity: Option<Value>,
    ) -> Self {
        Self {
            label,
            entity_id,
            status,
            headers,
            entity,
        }
    }

    /// Wire form of the acknowledgement
    pub fn to_json(&self) -> Value {
        let mut object = json!({
            "label": self.label.as_str(),
            "entityId": self.entity_id.to_string(),
            "status": self.status.as_u16(),
            "headers": self.headers,
        });
        if let Some(entity) = &self.entity {
            object["entity"] = entity.clone();
        }
        object
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Aggregate of acknowledgements for one signal, keyed uniquely by label.
///
/// The aggregate status is the single child's status when there is exactly
/// one acknowledgement; with several, all-successful aggregates report OK and
/// mixed aggregates report the numerically highest child status.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgements {
    entity_id: ThingId,
    correlation_id: Option<String>,
    acks: Vec<Acknowledgement>,
}

impl Acknowledgements {
    pub fn of(
        entity_id: ThingId,
        correlation_id: Option<String>,
        acks: Vec<Acknowledgement>,
    ) -> Self {
        debug_assert!(
            {
                let mut labels: Vec<_> = acks.iter().map(|a| a.label.as_str()).collect();
                labels.sort_unstable();
                labels.windows(2).all(|w| w[0] != w[1])
            },
            "acknowledgement labels must be unique"
        );
        Self {
            entity_id,
            correlation_id,
            acks,
        }
    }

    pub fn entity_id(&self) -> &ThingId {
        &self.entity_id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn size(&self) -> usize {
        self.acks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Acknowledgement> {
        self.acks.iter()
    }

    pub fn acknowledgement(&self, label: &AcknowledgementLabel) -> Option<&Acknowledgement> {
        self.acks.iter().find(|ack| &ack.label == label)
    }

    pub fn status(&self) -> StatusCode {
        match self.acks.as_slice() {
            [] => StatusCode::INTERNAL_SERVER_ERROR,
            [only] => only.status,
            many => {
                if many.iter().all(Acknowledgement::is_success) {
                    StatusCode::OK
                } else {
                    many.iter().map(|ack| ack.status).max().unwrap_or(StatusCode::OK)
                }
            }
        }
    }
}
