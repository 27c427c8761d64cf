use super::acks::AcknowledgementLabel;
use super::credentials::HmacCredentials;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supported connection transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionType {
    HttpPush,
    Kafka,
    Amqp091,
    Amqp10,
    Mqtt,
    Mqtt5,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionType::HttpPush => "http-push",
            ConnectionType::Kafka => "kafka",
            ConnectionType::Amqp091 => "amqp-091",
            ConnectionType::Amqp10 => "amqp-10",
            ConnectionType::Mqtt => "mqtt",
            ConnectionType::Mqtt5 => "mqtt-5",
        };
        f.write_str(name)
    }
}

/// Desired/reported status of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Open,
    Closed,
    Failed,
}

/// Topics a target subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    LiveMessages,
    LiveEvents,
    LiveCommands,
    TwinEvents,
}

/// Outbound target of a connection.
///
/// The address is a `METHOD:path` template; the header mapping renders each
/// entry against the originating signal before the request is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub address: String,
    #[serde(default)]
    pub header_mapping: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_acknowledgement_label: Option<AcknowledgementLabel>,
    #[serde(default)]
    pub topics: Vec<Topic>,
}

impl Target {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            header_mapping: HashMap::new(),
            issued_acknowledgement_label: None,
            topics: Vec::new(),
        }
    }

    pub fn with_header_mapping(mut self, mapping: HashMap<String, String>) -> Self {
        self.header_mapping = mapping;
        self
    }

    pub fn with_issued_acknowledgement_label(mut self, label: AcknowledgementLabel) -> Self {
        self.issued_acknowledgement_label = Some(label);
        self
    }

    pub fn with_topics(mut self, topics: Vec<Topic>) -> Self {
        self.topics = topics;
        self
    }
}

/// Inbound source of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<u8>,
    #[serde(default = "default_consumer_count")]
    pub consumer_count: usize,
}

fn default_consumer_count() -> usize {
    1
}

impl Source {
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            qos: None,
            consumer_count: 1,
        }
    }
}

/// An external connection.
///
/// Immutable once created: a modify-connection command replaces the whole
/// object atomically, it never mutates in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub connection_type: ConnectionType,
    pub status: ConnectivityStatus,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<HmacCredentials>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub specific_config: HashMap<String, String>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        connection_type: ConnectionType,
        status: ConnectivityStatus,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            id,
            connection_type,
            status,
            uri: uri.into(),
            credentials: None,
            targets: Vec::new(),
            sources: Vec::new(),
            specific_config: HashMap::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: HmacCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_specific_config(mut self, specific_config: HashMap<String, String>) -> Self {
        self.specific_config = specific_config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_builder_chain() {
        let connection = Connection::new(
            ConnectionId::new("connection-1"),
            ConnectionType::HttpPush,
            ConnectivityStatus::Open,
            "http://8.8.4.4:80",
        )
        .with_targets(vec![Target::new("POST:/events")]);

        assert_eq!(connection.connection_type, ConnectionType::HttpPush);
        assert_eq!(connection.targets.len(), 1);
        assert!(connection.sources.is_empty());
        assert!(connection.credentials.is_none());
    }

    #[test]
    fn test_connection_type_display() {
        assert_eq!(ConnectionType::HttpPush.to_string(), "http-push");
        assert_eq!(ConnectionType::Amqp091.to_string(), "amqp-091");
    }

    #[test]
    fn test_connection_json_round_trip() {
        let connection = Connection::new(
            ConnectionId::new("connection-2"),
            ConnectionType::Kafka,
            ConnectivityStatus::Open,
            "tcp://broker:9092",
        )
        .with_sources(vec![Source::new(vec!["telemetry".to_string()])]);

        let json = serde_json::to_string(&connection).unwrap();
        let parsed: Connection = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, connection);
    }
}
