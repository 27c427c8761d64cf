use super::{MeasurementWindow, SlidingWindowCounter};
use crate::config::ThrottlingConfig;
use crate::model::ConnectionType;
use std::sync::Arc;

/// State of a throttling alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    BelowLimit,
    AboveLimit,
}

/// Alert comparing a sliding-window rate against an effective limit.
///
/// The state is derived from the counter on every query: it flips to
/// above-limit while the rate exceeds the limit and falls back as soon as
/// the rate is at or below it again.
pub struct ThrottlingAlert {
    limit: i64,
    counter: Arc<SlidingWindowCounter>,
}

impl ThrottlingAlert {
    pub fn new(limit: i64, counter: Arc<SlidingWindowCounter>) -> Self {
        Self { limit, counter }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// The counter this alert measures; the consuming side ticks it per
    /// record.
    pub fn counter(&self) -> &Arc<SlidingWindowCounter> {
        &self.counter
    }

    pub fn state(&self) -> AlertState {
        if self.counter.rate() as i64 > self.limit {
            AlertState::AboveLimit
        } else {
            AlertState::BelowLimit
        }
    }

    pub fn is_above_limit(&self) -> bool {
        self.state() == AlertState::AboveLimit
    }
}

/// Rescale the configured per-interval limit to the detection window's
/// resolution and apply the tolerance:
///
/// `effective = floor(limit * (resolution / interval) * (1 - tolerance))`
///
/// Connection types without throttling configuration are effectively
/// unlimited.
pub fn effective_limit(
    connection_type: ConnectionType,
    config: &ThrottlingConfig,
    window: MeasurementWindow,
) -> i64 {
    match connection_type {
        ConnectionType::Kafka | ConnectionType::Amqp10 => {
            let factor =
                window.resolution.as_millis() as f64 / config.interval.as_millis().max(1) as f64;
            let adjusted = config.limit as f64 * factor;
            (adjusted * (1.0 - config.tolerance)) as i64
        }
        // effectively no limit
        ConnectionType::Mqtt
        | ConnectionType::Mqtt5
        | ConnectionType::Amqp091
        | ConnectionType::HttpPush => i64::MAX,
    }
}
