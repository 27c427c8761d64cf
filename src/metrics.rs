use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, TextEncoder, opts, register_int_counter};

pub static MESSAGES_PUBLISHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "thingbridge_messages_published_total",
        "Total number of outbound requests successfully dispatched"
    ))
    .unwrap()
});

pub static PUBLISH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "thingbridge_publish_failures_total",
        "Total number of outbound requests that failed or timed out"
    ))
    .unwrap()
});

pub static RECORDS_CONSUMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "thingbridge_records_consumed_total",
        "Total number of inbound records pulled from the source"
    ))
    .unwrap()
});

pub static TRANSFORM_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "thingbridge_transform_failures_total",
        "Total number of inbound records whose transform failed"
    ))
    .unwrap()
});

pub static OFFSETS_COMMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "thingbridge_offsets_committed_total",
        "Total number of offset commits issued to the source"
    ))
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
