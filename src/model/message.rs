use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Payload of an external message, either text or raw bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }
}

/// A message in external form, produced by a payload mapper.
///
/// Header lookup is case-insensitive; the stored key casing is preserved for
/// the outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalMessage {
    headers: HashMap<String, String>,
    payload: Payload,
}

impl ExternalMessage {
    pub fn text(headers: HashMap<String, String>, text: impl Into<String>) -> Self {
        Self {
            headers,
            payload: Payload::Text(text.into()),
        }
    }

    pub fn bytes(headers: HashMap<String, String>, bytes: Vec<u8>) -> Self {
        Self {
            headers,
            payload: Payload::Bytes(bytes),
        }
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}
