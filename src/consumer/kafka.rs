use super::{CommittableRecord, InboundRecord, SourceQueue};
use crate::config::KafkaConfig;
use crate::error::ConnectivityResult;
use crate::throttling::ThrottlingAlert;
use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Kafka source feeding the at-least-once consumer stream
///
/// # Configuration
/// - `enable.auto.commit=false`: offsets are committed by the stream's
///   committer only after downstream acknowledgement
/// - `auto.offset.reset=earliest`: read from beginning on first start
pub struct KafkaConsumerSource {
    consumer: Arc<StreamConsumer>,
}

impl KafkaConsumerSource {
    /// Create a new Kafka source subscribed to the given topics
    pub fn new(config: &KafkaConfig, topics: &[&str]) -> Result<Self> {
        info!("Initializing Kafka consumer");
        info!("Brokers: {}", config.brokers);
        info!("Topics: {:?}", topics);
        info!("Consumer Group: {}", config.group_id);

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            // Offset management
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            // Session management
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(topics)
            .context("Failed to subscribe to Kafka topics")?;

        info!("Kafka consumer initialized successfully");

        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }

    /// Committer sharing this source's consumer handle
    pub fn offset_committer(&self, topic: impl Into<String>) -> KafkaOffsetCommitter {
        KafkaOffsetCommitter {
            consumer: self.consumer.clone(),
            topic: topic.into(),
        }
    }

    /// Poll records into the source queue until shutdown.
    ///
    /// While the throttling alert reports above-limit, polling pauses for
    /// one detection-window resolution before it is re-evaluated.
    pub async fn run(
        self,
        queue: SourceQueue,
        alert: Option<ThrottlingAlert>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            if let Some(alert) = &alert {
                while alert.is_above_limit() {
                    warn!("Throttling limit exceeded, pausing consumption");
                    tokio::select! {
                        _ = tokio::time::sleep(
                            crate::throttling::ONE_MINUTE_WITH_TEN_SECONDS_RESOLUTION.resolution
                        ) => {}
                        _ = shutdown.recv() => return,
                    }
                }
            }

            let message = tokio::select! {
                received = self.consumer.recv() => received,
                _ = shutdown.recv() => {
                    info!("Kafka source shutting down");
                    return;
                }
            };

            match message {
                Ok(message) => {
                    let headers = message
                        .headers()
                        .map(|headers| {
                            headers
                                .iter()
                                .filter_map(|header| {
                                    header.value.map(|value| {
                                        (
                                            header.key.to_string(),
                                            String::from_utf8_lossy(value).to_string(),
                                        )
                                    })
                                })
                                .collect()
                        })
                        .unwrap_or_else(HashMap::new);

                    let record = InboundRecord {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        key: message
                            .key()
                            .map(|key| String::from_utf8_lossy(key).to_string()),
                        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                        headers,
                    };

                    // Bounded enqueue: waits while the stream is saturated.
                    if queue.enqueue(CommittableRecord::new(record)).await.is_err() {
                        warn!("Consumer stream stopped, Kafka source exiting");
                        return;
                    }
                    if let Some(alert) = &alert {
                        alert.counter().increment();
                    }
                }
                Err(e) => {
                    error!(error = %e, "Kafka consumer error");
                }
            }
        }
    }
}

/// Commits offsets through the shared consumer handle.
///
/// Kafka commit semantics expect the next offset to read, hence `offset + 1`.
pub struct KafkaOffsetCommitter {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl super::OffsetCommitter for KafkaOffsetCommitter {
    fn commit(&self, partition: i32, offset: i64) -> ConnectivityResult<()> {
        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(&self.topic, partition, Offset::Offset(offset + 1))
            .map_err(crate::ConnectivityError::from)?;
        self.consumer
            .commit(&assignment, CommitMode::Sync)
            .map_err(crate::ConnectivityError::from)?;
        Ok(())
    }
}
