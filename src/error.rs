use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

/// Connectivity error type covering the publisher and consumer paths.
///
/// Per-signal failures (placeholder resolution, correlation, timeouts) stay
/// local to the signal's reply; only lifecycle errors propagate to the
/// connection supervisor.
#[derive(Error, Debug)]
pub enum ConnectivityError {
    // ===== Configuration Errors =====
    #[error("Connection configuration invalid: {0}")]
    ConnectionConfigurationInvalid(String),

    #[error("Credentials invalid: {0}")]
    CredentialsInvalid(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // ===== Template & Placeholder Errors =====
    #[error("Placeholder unresolved: {0}")]
    PlaceholderUnresolved(String),

    #[error("Placeholder function signature invalid: {0}")]
    PlaceholderFunctionSignatureInvalid(String),

    // ===== Protocol & Correlation Errors =====
    #[error("Protocol message malformed: {0}")]
    Protocol(String),

    #[error("{0}")]
    CorrelationMismatch(String),

    // ===== Transport Errors =====
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    // ===== Consumer Errors =====
    #[error("Transform failure: {0}")]
    Transform(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Message queue error: {0}")]
    MessageQueue(String),

    // ===== Serialization Errors =====
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectivityError {
    /// Get the HTTP status used when this error is reported in an
    /// acknowledgement or an error response.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConnectivityError::ConnectionConfigurationInvalid(_)
            | ConnectivityError::CredentialsInvalid(_)
            | ConnectivityError::PlaceholderUnresolved(_)
            | ConnectivityError::PlaceholderFunctionSignatureInvalid(_)
            | ConnectivityError::Protocol(_)
            | ConnectivityError::CorrelationMismatch(_) => StatusCode::BAD_REQUEST,
            ConnectivityError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ConnectivityError::Transport(_) => StatusCode::BAD_GATEWAY,
            ConnectivityError::Transform(_) | ConnectivityError::Json(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ConnectivityError::Kafka(_)
            | ConnectivityError::MessageQueue(_)
            | ConnectivityError::Config(_)
            | ConnectivityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectivityError::ConnectionConfigurationInvalid(_) => "CONNECTION_CONFIG_INVALID",
            ConnectivityError::CredentialsInvalid(_) => "CREDENTIALS_INVALID",
            ConnectivityError::Config(_) => "CONFIG_ERROR",
            ConnectivityError::PlaceholderUnresolved(_) => "PLACEHOLDER_UNRESOLVED",
            ConnectivityError::PlaceholderFunctionSignatureInvalid(_) => {
                "PLACEHOLDER_FUNCTION_SIGNATURE_INVALID"
            }
            ConnectivityError::Protocol(_) => "PROTOCOL_ERROR",
            ConnectivityError::CorrelationMismatch(_) => "CORRELATION_MISMATCH",
            ConnectivityError::Transport(_) => "TRANSPORT_FAILURE",
            ConnectivityError::Timeout(_) => "TIMEOUT",
            ConnectivityError::Transform(_) => "TRANSFORM_FAILURE",
            ConnectivityError::Kafka(_) => "KAFKA_ERROR",
            ConnectivityError::MessageQueue(_) => "MESSAGE_QUEUE_ERROR",
            ConnectivityError::Json(_) => "JSON_ERROR",
            ConnectivityError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Connectivity error"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Per-signal connectivity error"
            );
        }
    }
}

// ============================================================================
// Conversion from common error types
// ============================================================================

impl From<rdkafka::error::KafkaError> for ConnectivityError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        ConnectivityError::Kafka(err.to_string())
    }
}

impl From<reqwest::Error> for ConnectivityError {
    fn from(err: reqwest::Error) -> Self {
        ConnectivityError::Transport(err.to_string())
    }
}

impl From<http::Error> for ConnectivityError {
    fn from(err: http::Error) -> Self {
        ConnectivityError::Internal(err.to_string())
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl ConnectivityError {
    /// Create a connection configuration error naming the offending fragment
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        ConnectivityError::ConnectionConfigurationInvalid(msg.into())
    }

    /// Create a credentials error
    pub fn credentials(msg: impl Into<String>) -> Self {
        ConnectivityError::CredentialsInvalid(msg.into())
    }

    /// Create an unresolved placeholder error
    pub fn unresolved(msg: impl Into<String>) -> Self {
        ConnectivityError::PlaceholderUnresolved(msg.into())
    }

    /// Create a transport failure
    pub fn transport(msg: impl Into<String>) -> Self {
        ConnectivityError::Transport(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        ConnectivityError::Protocol(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        ConnectivityError::Internal(msg.into())
    }
}
