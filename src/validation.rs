// ============================================================================
// Transport Validation
// ============================================================================
//
// Per connection-type rules enforced when a connection is accepted. A
// validation failure reports the offending fragment and never reaches the
// runtime pipelines.
//
// ============================================================================

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::httppush::target::HttpPublishTarget;
use crate::model::{Connection, ConnectionType, Source};
use crate::placeholders;
use http::Uri;

/// Connection-type specific validation rules
pub trait ProtocolValidator: Send + Sync {
    fn connection_type(&self) -> ConnectionType;

    fn validate(&self, connection: &Connection) -> ConnectivityResult<()>;
}

/// Validates HTTP push connections: no sources, parseable target addresses
/// with an allowed method, and a syntactically resolvable base URI.
pub struct HttpPushValidator;

impl HttpPushValidator {
    pub fn new() -> Self {
        Self
    }

    fn validate_uri(uri: &str) -> ConnectivityResult<()> {
        let parsed: Uri = uri.parse().map_err(|_| {
            ConnectivityError::config_invalid(format!("The URI <{}> is not valid", uri))
        })?;

        match parsed.scheme_str() {
            Some("http") | Some("https") => {}
            Some(other) => {
                return Err(ConnectivityError::config_invalid(format!(
                    "The URI scheme <{}> is not supported for HTTP push connections",
                    other
                )));
            }
            None => {
                return Err(ConnectivityError::config_invalid(format!(
                    "The URI <{}> is missing a scheme",
                    uri
                )));
            }
        }

        if parsed.host().is_none() {
            return Err(ConnectivityError::config_invalid(format!(
                "The URI <{}> is missing a host",
                uri
            )));
        }
        Ok(())
    }
}

impl Default for HttpPushValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolValidator for HttpPushValidator {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::HttpPush
    }

    fn validate(&self, connection: &Connection) -> ConnectivityResult<()> {
        Self::validate_uri(&connection.uri)?;

        if let Some(source) = connection.sources.first() {
            return Err(ConnectivityError::config_invalid(format!(
                "HTTP push connections do not support sources, but source <{}> was configured",
                source.addresses.join(",")
            )));
        }

        if let Some(parallelism) = connection.specific_config.get("parallelism") {
            if parallelism.parse::<usize>().map_or(true, |value| value == 0) {
                return Err(ConnectivityError::config_invalid(format!(
                    "The parallelism <{}> is not a positive number",
                    parallelism
                )));
            }
        }

        for target in &connection.targets {
            HttpPublishTarget::parse(&target.address)?;
            placeholders::validate_template(&target.address)?;
            for template in target.header_mapping.values() {
                placeholders::validate_template(template)?;
            }
        }
        Ok(())
    }
}

/// Validates Kafka connections on the consumer side
pub struct KafkaValidator;

impl KafkaValidator {
    pub fn new() -> Self {
        Self
    }

    fn validate_source(source: &Source) -> ConnectivityResult<()> {
        if source.addresses.is_empty() {
            return Err(ConnectivityError::config_invalid(
                "Kafka sources must name at least one topic address",
            ));
        }
        for address in &source.addresses {
            if address.is_empty() {
                return Err(ConnectivityError::config_invalid(
                    "Kafka source addresses must not be empty",
                ));
            }
        }
        if let Some(qos) = source.qos {
            if qos > 1 {
                return Err(ConnectivityError::config_invalid(format!(
                    "The qos <{}> is not supported for Kafka sources; supported values are 0 and 1",
                    qos
                )));
            }
        }
        Ok(())
    }
}

impl Default for KafkaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolValidator for KafkaValidator {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Kafka
    }

    fn validate(&self, connection: &Connection) -> ConnectivityResult<()> {
        if connection.sources.is_empty() {
            return Err(ConnectivityError::config_invalid(
                "Kafka connections require at least one source",
            ));
        }
        for source in &connection.sources {
            Self::validate_source(source)?;
        }
        Ok(())
    }
}

/// Validate a connection with the rules of its type.
///
/// Types without registered rules pass; their client layers enforce their
/// own constraints.
pub fn validate_connection(connection: &Connection) -> ConnectivityResult<()> {
    match connection.connection_type {
        ConnectionType::HttpPush => HttpPushValidator::new().validate(connection),
        ConnectionType::Kafka => KafkaValidator::new().validate(connection),
        _ => Ok(()),
    }
}
