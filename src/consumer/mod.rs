// ============================================================================
// At-Least-Once Consumer
// ============================================================================
//
// Inbound mirror of the publisher pipeline: committable records are pulled
// from a source queue, transformed and forwarded to the mapping sink with
// bounded in-flight processing. Offsets are committed strictly in order per
// partition, and only once the downstream sink acknowledged every record up
// to that offset. When in-flight capacity and the small queue slack are
// exhausted, further offers are rejected and backpressure reaches the
// source.
//
// ============================================================================

pub mod kafka;
pub mod stream;

pub use stream::AtLeastOnceConsumerStream;

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::model::ExternalMessage;
use tokio::sync::{mpsc, oneshot};

/// Records buffered beyond the in-flight workers before offers are rejected
pub const SOURCE_QUEUE_SLACK: usize = 2;

/// A raw record pulled from the source
#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: std::collections::HashMap<String, String>,
}

/// A record together with its committable offset identity
#[derive(Debug, Clone)]
pub struct CommittableRecord {
    pub record: InboundRecord,
}

impl CommittableRecord {
    pub fn new(record: InboundRecord) -> Self {
        Self { record }
    }

    pub fn partition(&self) -> i32 {
        self.record.partition
    }

    pub fn offset(&self) -> i64 {
        self.record.offset
    }
}

/// Result of transforming one inbound record
#[derive(Debug, Clone)]
pub enum TransformationResult {
    Success(ExternalMessage),
    Failure { reason: String, retryable: bool },
}

/// Pure transformation from raw records to external messages
pub trait RecordTransformer: Send + Sync + 'static {
    fn transform(&self, record: &InboundRecord) -> TransformationResult;
}

/// Commits offsets back to the source.
///
/// Committing an offset implies every record at or below it on the same
/// partition was processed; the stream only ever calls this with strictly
/// increasing offsets per partition.
pub trait OffsetCommitter: Send + Sync + 'static {
    fn commit(&self, partition: i32, offset: i64) -> ConnectivityResult<()>;
}

/// Outcome of offering a record to the source queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOfferResult {
    Enqueued,
    Dropped,
}

/// Bounded handover between the source and the consumer stream.
///
/// `offer` never blocks: when workers and the queue slack are saturated the
/// record is rejected. Sources that can wait use `enqueue` and are throttled
/// by the channel instead.
#[derive(Clone)]
pub struct SourceQueue {
    tx: mpsc::Sender<CommittableRecord>,
}

impl SourceQueue {
    pub(crate) fn new(tx: mpsc::Sender<CommittableRecord>) -> Self {
        Self { tx }
    }

    pub fn offer(&self, record: CommittableRecord) -> QueueOfferResult {
        match self.tx.try_send(record) {
            Ok(()) => QueueOfferResult::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => QueueOfferResult::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Source queue is closed, dropping record");
                QueueOfferResult::Dropped
            }
        }
    }

    pub async fn enqueue(&self, record: CommittableRecord) -> ConnectivityResult<()> {
        self.tx.send(record).await.map_err(|_| {
            ConnectivityError::MessageQueue("The consumer stream is no longer running".to_string())
        })
    }
}

/// An external message paired with its settlement callbacks. Exactly one of
/// `acknowledge` and `reject` must be invoked; dropping the message without
/// settling counts as rejection.
#[derive(Debug)]
pub struct AcknowledgeableMessage {
    message: ExternalMessage,
    settle: SettleHandle,
}

impl AcknowledgeableMessage {
    pub(crate) fn new(message: ExternalMessage, tx: oneshot::Sender<bool>) -> Self {
        Self {
            message,
            settle: SettleHandle { tx: Some(tx) },
        }
    }

    pub fn message(&self) -> &ExternalMessage {
        &self.message
    }

    /// Signal downstream success; the record's offset becomes committable.
    pub fn acknowledge(mut self) {
        self.settle.settle(true);
    }

    /// Signal downstream failure; the record's offset stays uncommitted.
    pub fn reject(mut self) {
        self.settle.settle(false);
    }
}

#[derive(Debug)]
struct SettleHandle {
    tx: Option<oneshot::Sender<bool>>,
}

impl SettleHandle {
    fn settle(&mut self, success: bool) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(success);
        }
    }
}

impl Drop for SettleHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::warn!("Acknowledgeable message dropped without settlement, rejecting");
            let _ = tx.send(false);
        }
    }
}
