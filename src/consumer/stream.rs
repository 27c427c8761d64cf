use super::{
    AcknowledgeableMessage, CommittableRecord, OffsetCommitter, RecordTransformer,
    SOURCE_QUEUE_SLACK, SourceQueue, TransformationResult,
};
use crate::error::ConnectivityError;
use crate::metrics;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

enum CommitSignal {
    /// A record entered processing; establishes the per-partition order.
    Dispatched { partition: i32, offset: i64 },
    /// Processing finished; `commit` says whether the offset may advance.
    Completed {
        partition: i32,
        offset: i64,
        commit: bool,
    },
}

/// The at-least-once consumer stream.
///
/// Topology: source queue (capacity = slack) -> transform + forward with
/// `max_in_flight` permits -> mapping sink; a single committer task receives
/// completion signals and advances per-partition offsets strictly in order.
///
/// A permit is held from the moment a record is pulled until its downstream
/// settlement arrives, so at most `max_in_flight` records are unsettled at
/// any time. With the queue slack on top, offering
/// `max_in_flight + SOURCE_QUEUE_SLACK` records without downstream demand
/// fills the stage completely and the next offer is rejected.
pub struct AtLeastOnceConsumerStream {
    queue: SourceQueue,
    stop_tx: watch::Sender<bool>,
    pump: JoinHandle<()>,
    committer: JoinHandle<()>,
}

impl AtLeastOnceConsumerStream {
    /// Start the stream.
    ///
    /// # Arguments
    /// * `transformer` - pure record transformation
    /// * `offset_committer` - commits offsets back to the source
    /// * `mapping_sink` - downstream sink receiving acknowledgeable messages
    /// * `failure_sink` - receives per-record transform failures
    /// * `max_in_flight` - bound on unsettled records
    /// * `commit_on_transform_failure` - when true, offsets of records whose
    ///   transform failed are committed even for retryable failures
    pub fn start<T, C>(
        transformer: Arc<T>,
        offset_committer: Arc<C>,
        mapping_sink: mpsc::UnboundedSender<AcknowledgeableMessage>,
        failure_sink: mpsc::UnboundedSender<ConnectivityError>,
        max_in_flight: usize,
        commit_on_transform_failure: bool,
    ) -> Self
    where
        T: RecordTransformer,
        C: OffsetCommitter,
    {
        let (record_tx, record_rx) = mpsc::channel(SOURCE_QUEUE_SLACK);
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let pump = tokio::spawn(pump_loop(
            record_rx,
            stop_rx,
            commit_tx,
            transformer,
            mapping_sink,
            failure_sink,
            max_in_flight.max(1),
            commit_on_transform_failure,
        ));
        let committer = tokio::spawn(commit_loop(commit_rx, offset_committer));

        Self {
            queue: SourceQueue::new(record_tx),
            stop_tx,
            pump,
            committer,
        }
    }

    /// Handle for offering records into the stream
    pub fn queue(&self) -> SourceQueue {
        self.queue.clone()
    }

    /// Stop pulling new records and wait until every settled offset was
    /// committed. The last commit happens before this returns.
    pub async fn shutdown(self) {
        let Self {
            queue,
            stop_tx,
            pump,
            committer,
        } = self;
        drop(queue);
        let _ = stop_tx.send(true);
        let _ = pump.await;
        let _ = committer.await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn pump_loop<T>(
    mut record_rx: mpsc::Receiver<CommittableRecord>,
    mut stop_rx: watch::Receiver<bool>,
    commit_tx: mpsc::UnboundedSender<CommitSignal>,
    transformer: Arc<T>,
    mapping_sink: mpsc::UnboundedSender<AcknowledgeableMessage>,
    failure_sink: mpsc::UnboundedSender<ConnectivityError>,
    max_in_flight: usize,
    commit_on_transform_failure: bool,
) where
    T: RecordTransformer,
{
    let permits = Arc::new(Semaphore::new(max_in_flight));
    loop {
        // The permit is taken before pulling: without free capacity the
        // queue fills up and offers start getting rejected.
        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => {
                permit.expect("consumer semaphore is never closed")
            }
            _ = stop_rx.changed() => break,
        };
        let committable = tokio::select! {
            received = record_rx.recv() => match received {
                Some(committable) => committable,
                None => break,
            },
            _ = stop_rx.changed() => break,
        };
        let partition = committable.partition();
        let offset = committable.offset();
        metrics::RECORDS_CONSUMED_TOTAL.inc();

        if commit_tx
            .send(CommitSignal::Dispatched { partition, offset })
            .is_err()
        {
            break;
        }

        match transformer.transform(&committable.record) {
            TransformationResult::Success(message) => {
                let (settle_tx, settle_rx) = oneshot::channel();
                let acknowledgeable = AcknowledgeableMessage::new(message, settle_tx);
                if mapping_sink.send(acknowledgeable).is_err() {
                    tracing::warn!(partition, offset, "Mapping sink is gone, rejecting record");
                    let _ = commit_tx.send(CommitSignal::Completed {
                        partition,
                        offset,
                        commit: false,
                    });
                    drop(permit);
                    continue;
                }
                let commit_tx = commit_tx.clone();
                tokio::spawn(async move {
                    let success = settle_rx.await.unwrap_or(false);
                    let _ = commit_tx.send(CommitSignal::Completed {
                        partition,
                        offset,
                        commit: success,
                    });
                    drop(permit);
                });
            }
            TransformationResult::Failure { reason, retryable } => {
                metrics::TRANSFORM_FAILURES_TOTAL.inc();
                let _ = failure_sink.send(ConnectivityError::Transform(reason.clone()));
                // Non-retryable failures always commit to avoid poison-pill
                // stalls; retryable ones only when configured to.
                let commit = !retryable || commit_on_transform_failure;
                tracing::debug!(
                    partition,
                    offset,
                    retryable,
                    commit,
                    reason = %reason,
                    "Record transform failed"
                );
                let _ = commit_tx.send(CommitSignal::Completed {
                    partition,
                    offset,
                    commit,
                });
                drop(permit);
            }
        }
    }
}

#[derive(Default)]
struct PartitionState {
    /// Offsets in dispatch order with their settlement, front is oldest
    pending: VecDeque<(i64, Option<bool>)>,
    last_committed: Option<i64>,
}

async fn commit_loop<C>(mut commit_rx: mpsc::UnboundedReceiver<CommitSignal>, committer: Arc<C>)
where
    C: OffsetCommitter,
{
    let mut partitions: HashMap<i32, PartitionState> = HashMap::new();

    while let Some(first) = commit_rx.recv().await {
        apply_signal(&mut partitions, first);
        // Batch everything already queued into one commit round.
        while let Ok(signal) = commit_rx.try_recv() {
            apply_signal(&mut partitions, signal);
        }

        for (partition, state) in partitions.iter_mut() {
            let mut ready: Option<i64> = None;
            while matches!(state.pending.front(), Some((_, Some(true)))) {
                let (offset, _) = state.pending.pop_front().expect("front checked above");
                ready = Some(offset);
            }
            if let Some(offset) = ready {
                debug_assert!(
                    state.last_committed.map_or(true, |last| offset > last),
                    "per-partition commits must be monotonic"
                );
                match committer.commit(*partition, offset) {
                    Ok(()) => {
                        metrics::OFFSETS_COMMITTED_TOTAL.inc();
                        state.last_committed = Some(offset);
                        tracing::debug!(partition, offset, "Committed offset");
                    }
                    Err(error) => {
                        tracing::error!(
                            partition,
                            offset,
                            error = %error,
                            "Offset commit failed"
                        );
                    }
                }
            }
        }
    }
}

fn apply_signal(partitions: &mut HashMap<i32, PartitionState>, signal: CommitSignal) {
    match signal {
        CommitSignal::Dispatched { partition, offset } => {
            partitions
                .entry(partition)
                .or_default()
                .pending
                .push_back((offset, None));
        }
        CommitSignal::Completed {
            partition,
            offset,
            commit,
        } => {
            if let Some(state) = partitions.get_mut(&partition) {
                if let Some(entry) = state
                    .pending
                    .iter_mut()
                    .find(|(pending_offset, settled)| *pending_offset == offset && settled.is_none())
                {
                    entry.1 = Some(commit);
                }
                if !commit {
                    tracing::warn!(
                        partition,
                        offset,
                        "Record not settled successfully, offset will not advance past it"
                    );
                }
            }
        }
    }
}
