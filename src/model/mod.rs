// ============================================================================
// Connectivity Data Model
// ============================================================================
//
// Immutable value objects describing connections, targets, sources,
// credentials and the acknowledgement types exchanged with senders.
// Connections are never mutated in place; a modify replaces the whole object.
//
// ============================================================================

pub mod acks;
pub mod connection;
pub mod credentials;
pub mod message;

pub use acks::{Acknowledgement, AcknowledgementLabel, Acknowledgements};
pub use connection::{
    Connection, ConnectionId, ConnectionType, ConnectivityStatus, Source, Target, Topic,
};
pub use credentials::HmacCredentials;
pub use message::{ExternalMessage, Payload};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a thing in `namespace:name` form.
///
/// Doubles as the entity id carried by acknowledgements and live responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThingId {
    namespace: String,
    name: String,
}

impl ThingId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for ThingId {
    type Err = crate::error::ConnectivityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = s.split_once(':').ok_or_else(|| {
            crate::error::ConnectivityError::config_invalid(format!(
                "Thing ID <{}> is missing a namespace separator",
                s
            ))
        })?;
        if name.is_empty() {
            return Err(crate::error::ConnectivityError::config_invalid(format!(
                "Thing ID <{}> has an empty name",
                s
            )));
        }
        Ok(Self::new(namespace, name))
    }
}

impl TryFrom<String> for ThingId {
    type Error = crate::error::ConnectivityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ThingId> for String {
    fn from(id: ThingId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thing_id_round_trip() {
        let id: ThingId = "ditto:thing".parse().unwrap();
        assert_eq!(id.namespace(), "ditto");
        assert_eq!(id.name(), "thing");
        assert_eq!(id.to_string(), "ditto:thing");
    }

    #[test]
    fn test_thing_id_rejects_missing_separator() {
        assert!("justaname".parse::<ThingId>().is_err());
        assert!("ns:".parse::<ThingId>().is_err());
    }
}
