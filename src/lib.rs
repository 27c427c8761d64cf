// ============================================================================
// thingbridge - Connectivity Bridge Core
// ============================================================================
//
// Outbound side: mapped signals are rendered into external HTTP requests,
// optionally HMAC-signed, dispatched with bounded parallelism and correlated
// back to the originating command (live response or acknowledgements).
//
// Inbound side: an at-least-once consumer stream with bounded in-flight
// processing, strictly ordered per-partition offset commits and backpressure
// toward the source.
//
// ============================================================================

pub mod config;
pub mod consumer;
pub mod correlation;
pub mod error;
pub mod httppush;
pub mod metrics;
pub mod model;
pub mod placeholders;
pub mod signal;
pub mod signing;
pub mod supervisor;
pub mod throttling;
pub mod validation;

pub use config::Config;
pub use error::{ConnectivityError, ConnectivityResult};
