// ============================================================================
// Throttling Detection
// ============================================================================
//
// Sliding-window counters measure per-(connection, direction, address)
// message rates; a throttling alert compares the rate against the configured
// limit rescaled to the window resolution. The consumer stream pauses
// consumption while an alert reports above-limit.
//
// ============================================================================

pub mod alert;
pub mod sliding_window;

pub use alert::{AlertState, ThrottlingAlert, effective_limit};
pub use sliding_window::SlidingWindowCounter;

use crate::model::ConnectionId;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Direction of the measured traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricDirection {
    Inbound,
    Outbound,
}

/// A measurement window of fixed total duration and bucket resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementWindow {
    pub duration: Duration,
    pub resolution: Duration,
}

impl MeasurementWindow {
    pub fn bucket_count(&self) -> usize {
        (self.duration.as_millis() / self.resolution.as_millis().max(1)) as usize
    }
}

/// The window used for throttling detection: one minute in six ten-second
/// buckets.
pub const ONE_MINUTE_WITH_TEN_SECONDS_RESOLUTION: MeasurementWindow = MeasurementWindow {
    duration: Duration::from_secs(60),
    resolution: Duration::from_secs(10),
};

/// Key of one counter in the per-process registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub connection_id: ConnectionId,
    pub direction: MetricDirection,
    pub address: String,
}

impl CounterKey {
    pub fn new(
        connection_id: ConnectionId,
        direction: MetricDirection,
        address: impl Into<String>,
    ) -> Self {
        Self {
            connection_id,
            direction,
            address: address.into(),
        }
    }
}

static COUNTERS: Lazy<RwLock<HashMap<CounterKey, Arc<SlidingWindowCounter>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Look up the counter for a key, creating it on first use.
///
/// The registry is shared per process; the returned counter is incremented
/// lock-free.
pub fn lookup_or_create_counter(key: CounterKey) -> Arc<SlidingWindowCounter> {
    if let Some(counter) = COUNTERS
        .read()
        .expect("counter registry lock poisoned")
        .get(&key)
    {
        return counter.clone();
    }
    COUNTERS
        .write()
        .expect("counter registry lock poisoned")
        .entry(key)
        .or_insert_with(|| {
            Arc::new(SlidingWindowCounter::new(
                ONE_MINUTE_WITH_TEN_SECONDS_RESOLUTION,
            ))
        })
        .clone()
}

/// Look up an existing counter without creating it
pub fn lookup_counter(key: &CounterKey) -> Option<Arc<SlidingWindowCounter>> {
    COUNTERS
        .read()
        .expect("counter registry lock poisoned")
        .get(key)
        .cloned()
}
