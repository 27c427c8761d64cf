// ============================================================================
// Connection Supervision
// ============================================================================
//
// One supervisor per connection: validates it at open time, owns the
// publisher worker and fans shutdown out over a broadcast channel. Modify
// replaces the connection wholesale; close drains in-flight work up to the
// configured shutdown timeout and aborts whatever remains. Per-signal
// failures never reach the supervisor, only lifecycle errors do.
//
// ============================================================================

use crate::config::Config;
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::httppush::{HttpPublisher, HttpPushFactory};
use crate::model::Connection;
use crate::signal::MultiMappedOutboundSignal;
use crate::validation;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// Supervises the pipelines of one open connection
pub struct ConnectionSupervisor {
    connection: Arc<Connection>,
    signal_tx: mpsc::Sender<MultiMappedOutboundSignal>,
    shutdown_tx: broadcast::Sender<()>,
    publisher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl ConnectionSupervisor {
    /// Open a connection: validate it, build the signer-equipped publisher
    /// and spawn its worker.
    pub fn open<F: HttpPushFactory>(
        connection: Connection,
        factory: F,
        config: &Config,
    ) -> ConnectivityResult<Self> {
        validation::validate_connection(&connection)?;
        let connection = Arc::new(connection);
        let publisher = Arc::new(HttpPublisher::new(
            connection.clone(),
            factory,
            config.http_push.clone(),
        )?);
        Ok(Self::start(connection, publisher, config))
    }

    /// Spawn the publisher worker for an already validated connection
    fn start<F: HttpPushFactory>(
        connection: Arc<Connection>,
        publisher: Arc<HttpPublisher<F>>,
        config: &Config,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(publisher.run(signal_rx, shutdown_tx.subscribe()));

        tracing::info!(connection = %connection.id, "Connection opened");

        Self {
            connection,
            signal_tx,
            shutdown_tx,
            publisher: handle,
            workers: Vec::new(),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Put a collaborating worker (e.g. a consumer source wired to this
    /// connection's shutdown via `shutdown_receiver`) under supervision; it
    /// is awaited on close and aborted when the drain times out.
    pub fn supervise(&mut self, worker: JoinHandle<()>) {
        self.workers.push(worker);
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Sender for handing outbound signals to the publisher
    pub fn signal_sender(&self) -> mpsc::Sender<MultiMappedOutboundSignal> {
        self.signal_tx.clone()
    }

    /// Subscribe a collaborating worker (e.g. a consumer source) to this
    /// connection's shutdown.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Replace the connection. The replacement is validated and its
    /// publisher built before the old pipeline is touched; on failure the
    /// running supervisor is handed back to the caller together with the
    /// error, so an invalid modify leaves the current connection running.
    pub async fn modify<F: HttpPushFactory>(
        self,
        connection: Connection,
        factory: F,
        config: &Config,
    ) -> Result<Self, (Self, ConnectivityError)> {
        if let Err(error) = validation::validate_connection(&connection) {
            return Err((self, error));
        }
        let connection = Arc::new(connection);
        let publisher = match HttpPublisher::new(
            connection.clone(),
            factory,
            config.http_push.clone(),
        ) {
            Ok(publisher) => Arc::new(publisher),
            Err(error) => return Err((self, error)),
        };

        tracing::info!(
            old = %self.connection.id,
            new = %connection.id,
            "Replacing connection"
        );
        self.close().await;
        Ok(Self::start(connection, publisher, config))
    }

    /// Close the connection: stop intake, drain in-flight requests up to
    /// the shutdown timeout, then abort the worker.
    pub async fn close(self) {
        let Self {
            connection,
            signal_tx,
            shutdown_tx,
            publisher,
            workers,
            shutdown_timeout,
        } = self;

        drop(signal_tx);
        let _ = shutdown_tx.send(());

        let publisher_abort = publisher.abort_handle();
        let worker_aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        let drain = async move {
            let _ = publisher.await;
            for worker in workers {
                let _ = worker.await;
            }
        };
        match tokio::time::timeout(shutdown_timeout, drain).await {
            Ok(()) => {
                tracing::info!(connection = %connection.id, "Connection closed");
            }
            Err(_) => {
                publisher_abort.abort();
                for abort in worker_aborts {
                    abort.abort();
                }
                tracing::warn!(
                    connection = %connection.id,
                    timeout = ?shutdown_timeout,
                    "Drain timed out, aborting remaining workers"
                );
            }
        }
    }
}
