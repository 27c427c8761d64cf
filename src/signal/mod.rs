// ============================================================================
// Signals & Live Messages
// ============================================================================
//
// The signal types flowing through the outbound pipeline: live message
// commands, their typed responses, and the mapped/multi-mapped envelopes the
// publisher consumes. The protocol codec translating responses from their
// wire form lives in `protocol`.
//
// ============================================================================

pub mod protocol;

use crate::model::{AcknowledgementLabel, Acknowledgements, ExternalMessage, Target, ThingId};
use http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Direction of a live message relative to the thing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Message sent by the thing (outbox)
    From,
    /// Message sent to the thing (inbox)
    To,
}

/// A live message command addressed to a thing or one of its features
#[derive(Debug, Clone, PartialEq)]
pub struct MessageCommand {
    pub thing_id: ThingId,
    pub feature_id: Option<String>,
    pub direction: MessageDirection,
    pub subject: String,
    pub correlation_id: Option<String>,
    pub requested_acks: Vec<AcknowledgementLabel>,
    pub headers: HashMap<String, String>,
}

impl MessageCommand {
    pub fn new(thing_id: ThingId, direction: MessageDirection, subject: impl Into<String>) -> Self {
        Self {
            thing_id,
            feature_id: None,
            direction,
            subject: subject.into(),
            correlation_id: None,
            requested_acks: Vec::new(),
            headers: HashMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_requested_acks(mut self, requested_acks: Vec<AcknowledgementLabel>) -> Self {
        self.requested_acks = requested_acks;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_feature_id(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    /// Type tag of the response this command expects
    pub fn expected_response_type(&self) -> &'static str {
        if self.feature_id.is_some() {
            "messages.responses:featureResponseMessage"
        } else {
            "messages.responses:thingResponseMessage"
        }
    }

    pub fn requests_live_response(&self) -> bool {
        self.requested_acks
            .iter()
            .any(AcknowledgementLabel::is_live_response)
    }
}

/// A typed response to a live message command
#[derive(Debug, Clone, PartialEq)]
pub struct MessageResponse {
    pub thing_id: ThingId,
    pub feature_id: Option<String>,
    pub direction: MessageDirection,
    pub subject: String,
    pub correlation_id: Option<String>,
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub payload: Option<Value>,
    pub headers: HashMap<String, String>,
}

impl MessageResponse {
    /// Type tag of this response
    pub fn response_type(&self) -> &'static str {
        if self.feature_id.is_some() {
            "messages.responses:featureResponseMessage"
        } else {
            "messages.responses:thingResponseMessage"
        }
    }
}

/// One mapped outbound signal: the originating command together with the
/// targets selected at mapping time and the external-message representation
/// produced by the payload mapper.
#[derive(Debug, Clone)]
pub struct MappedOutboundSignal {
    pub command: MessageCommand,
    pub targets: Vec<Target>,
    pub external_message: ExternalMessage,
}

/// Reply emitted to the sender, exactly once per mapped outbound signal
#[derive(Debug, Clone)]
pub enum SignalReply {
    LiveResponse(MessageResponse),
    Acks(Acknowledgements),
}

/// A batch of mapped outbound signals plus the sender handle for replies
#[derive(Debug)]
pub struct MultiMappedOutboundSignal {
    pub mapped: Vec<MappedOutboundSignal>,
    pub sender: mpsc::UnboundedSender<SignalReply>,
}

impl MultiMappedOutboundSignal {
    pub fn new(
        mapped: Vec<MappedOutboundSignal>,
        sender: mpsc::UnboundedSender<SignalReply>,
    ) -> Self {
        debug_assert!(!mapped.is_empty(), "multi-mapped signal must not be empty");
        Self { mapped, sender }
    }
}
