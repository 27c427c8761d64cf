use anyhow::Result;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

// HTTP push defaults
const DEFAULT_HTTP_PUSH_PARALLELISM: usize = 2;
const DEFAULT_HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ACK_TIMEOUT_SECS: u64 = 60;

// Kafka consumer defaults
const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";
const DEFAULT_KAFKA_GROUP_ID: &str = "thingbridge-consumers";
const DEFAULT_THROTTLING_LIMIT: i64 = 100;
const DEFAULT_THROTTLING_INTERVAL_SECS: u64 = 1;
const DEFAULT_THROTTLING_TOLERANCE: f64 = 0.05;
const DEFAULT_MAX_IN_FLIGHT: usize = 16;

// Lifecycle defaults
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Configuration Structures
// ============================================================================

/// HTTP push publisher configuration
#[derive(Clone, Debug)]
pub struct HttpPushConfig {
    /// Number of requests dispatched concurrently per connection
    pub parallelism: usize,
    /// Timeout for a single outbound request
    pub request_timeout: Duration,
    /// Deadline after which missing requested acknowledgements are filled
    /// with a request-timeout envelope
    pub ack_timeout: Duration,
}

impl Default for HttpPushConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_HTTP_PUSH_PARALLELISM,
            request_timeout: Duration::from_secs(DEFAULT_HTTP_REQUEST_TIMEOUT_SECS),
            ack_timeout: Duration::from_secs(DEFAULT_ACK_TIMEOUT_SECS),
        }
    }
}

/// Consumer throttling configuration
///
/// `limit` messages per `interval` are allowed before the throttling alert
/// flips to above-limit; `tolerance` shaves the effective limit so the alert
/// fires slightly before the hard limit is reached.
#[derive(Clone, Debug)]
pub struct ThrottlingConfig {
    pub limit: i64,
    pub interval: Duration,
    pub max_in_flight: usize,
    pub tolerance: f64,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_THROTTLING_LIMIT,
            interval: Duration::from_secs(DEFAULT_THROTTLING_INTERVAL_SECS),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            tolerance: DEFAULT_THROTTLING_TOLERANCE,
        }
    }
}

/// Kafka connection configuration for the at-least-once consumer
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Comma-separated list of Kafka brokers
    pub brokers: String,
    /// Consumer group ID
    pub group_id: String,
    /// Throttling applied to consumption
    pub throttling: ThrottlingConfig,
    /// Commit the offset of records whose transform failed (avoids
    /// poison-pill stalls); when false, failed records are replayed
    pub commit_on_transform_failure: bool,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_KAFKA_BROKERS.to_string(),
            group_id: DEFAULT_KAFKA_GROUP_ID.to_string(),
            throttling: ThrottlingConfig::default(),
            commit_on_transform_failure: true,
        }
    }
}

/// Top-level service configuration, loaded from the environment
#[derive(Clone, Debug)]
pub struct Config {
    pub http_push: HttpPushConfig,
    pub kafka: KafkaConfig,
    /// How long a closing connection may drain its in-flight requests
    /// before remaining tasks are aborted
    pub shutdown_timeout: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let http_push = HttpPushConfig {
            parallelism: env_parse("HTTP_PUSH_PARALLELISM", DEFAULT_HTTP_PUSH_PARALLELISM)?,
            request_timeout: Duration::from_secs(env_parse(
                "HTTP_REQUEST_TIMEOUT_SECS",
                DEFAULT_HTTP_REQUEST_TIMEOUT_SECS,
            )?),
            ack_timeout: Duration::from_secs(env_parse(
                "ACK_TIMEOUT_SECS",
                DEFAULT_ACK_TIMEOUT_SECS,
            )?),
        };

        let throttling = ThrottlingConfig {
            limit: env_parse("KAFKA_CONSUMER_THROTTLING_LIMIT", DEFAULT_THROTTLING_LIMIT)?,
            interval: Duration::from_secs(env_parse(
                "KAFKA_CONSUMER_THROTTLING_INTERVAL_SECS",
                DEFAULT_THROTTLING_INTERVAL_SECS,
            )?),
            max_in_flight: env_parse("KAFKA_CONSUMER_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT)?,
            tolerance: env_parse(
                "KAFKA_CONSUMER_THROTTLING_TOLERANCE",
                DEFAULT_THROTTLING_TOLERANCE,
            )?,
        };

        let kafka = KafkaConfig {
            brokers: std::env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| DEFAULT_KAFKA_BROKERS.to_string()),
            group_id: std::env::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| DEFAULT_KAFKA_GROUP_ID.to_string()),
            throttling,
            commit_on_transform_failure: env_parse("COMMIT_ON_TRANSFORM_FAILURE", true)?,
        };

        Ok(Self {
            http_push,
            kafka,
            shutdown_timeout: Duration::from_secs(env_parse(
                "SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )?),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}
