use super::target::{ALLOWED_METHODS, HttpPublishTarget};
use super::{ConnectivityStatusResolver, DefaultStatusResolver, HttpPushFactory};
use crate::config::HttpPushConfig;
use crate::correlation::{ResponseOutcome, correlate_response};
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::metrics;
use crate::model::{
    Acknowledgement, AcknowledgementLabel, Acknowledgements, Connection, ExternalMessage, Target,
};
use crate::placeholders::{self, PlaceholderContext};
use crate::signal::{
    MappedOutboundSignal, MessageCommand, MessageResponse, MultiMappedOutboundSignal, SignalReply,
};
use crate::signing::{self, RequestSigner};
use crate::throttling::{CounterKey, MetricDirection, lookup_or_create_counter};
use chrono::Utc;
use http::uri::PathAndQuery;
use http::{HeaderName, HeaderValue, Method, Request, StatusCode, Uri};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;

// Reserved header keys: consumed by the request builder, never emitted as
// HTTP headers.
const RESERVED_HEADER_HTTP_METHOD: &str = "http.method";
const RESERVED_HEADER_HTTP_PATH: &str = "http.path";
const RESERVED_HEADER_HTTP_QUERY: &str = "http.query";

/// Lifecycle of one dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Pending,
    Dispatched,
    Responded,
    Failed,
    TimedOut,
}

/// Per-connection outbound publisher.
///
/// Consumes multi-mapped outbound signals, renders and signs one request per
/// (mapped signal, target) pair, dispatches with bounded parallelism and
/// replies to the sender exactly once per mapped signal.
pub struct HttpPublisher<F> {
    connection: Arc<Connection>,
    factory: Arc<F>,
    signer: Option<Arc<dyn RequestSigner>>,
    status_resolver: Arc<dyn ConnectivityStatusResolver>,
    config: HttpPushConfig,
    permits: Arc<Semaphore>,
}

impl<F: HttpPushFactory> HttpPublisher<F> {
    pub fn new(
        connection: Arc<Connection>,
        factory: F,
        mut config: HttpPushConfig,
    ) -> ConnectivityResult<Self> {
        let signer = connection
            .credentials
            .as_ref()
            .map(signing::from_credentials)
            .transpose()?;
        // The connection's specific config overrides the service default.
        if let Some(parallelism) = connection.specific_config.get("parallelism") {
            config.parallelism = parallelism.parse().map_err(|_| {
                ConnectivityError::config_invalid(format!(
                    "The parallelism <{}> is not a positive number",
                    parallelism
                ))
            })?;
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.parallelism.max(1))),
            factory: Arc::new(factory),
            signer,
            status_resolver: Arc::new(DefaultStatusResolver),
            config,
            connection,
        })
    }

    pub fn with_status_resolver(
        mut self,
        status_resolver: Arc<dyn ConnectivityStatusResolver>,
    ) -> Self {
        self.status_resolver = status_resolver;
        self
    }

    /// Run until the signal channel closes or shutdown is signalled, then
    /// drain in-flight signals. The supervisor bounds the drain with the
    /// configured shutdown timeout.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<MultiMappedOutboundSignal>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut in_flight: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                maybe_signal = rx.recv() => match maybe_signal {
                    Some(multi_mapped) => {
                        let publisher = self.clone();
                        in_flight.spawn(publisher.publish_multi(multi_mapped));
                    }
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::info!(connection = %self.connection.id, "Publisher shutting down");
                    break;
                }
            }
            while in_flight.try_join_next().is_some() {}
        }
        while in_flight.join_next().await.is_some() {}
    }

    /// Publish every mapped signal of the batch, replying once per signal
    pub async fn publish_multi(self: Arc<Self>, multi_mapped: MultiMappedOutboundSignal) {
        let MultiMappedOutboundSignal { mapped, sender } = multi_mapped;
        for signal in mapped {
            let reply = self.clone().publish_mapped(signal).await;
            if sender.send(reply).is_err() {
                tracing::debug!(
                    connection = %self.connection.id,
                    "Sender is gone, dropping reply"
                );
            }
        }
    }

    async fn publish_mapped(self: Arc<Self>, signal: MappedOutboundSignal) -> SignalReply {
        let deadline = tokio::time::Instant::now() + self.config.ack_timeout;
        let mut dispatches: JoinSet<ResponseOutcome> = JoinSet::new();

        // Targets are dispatched in declaration order: the permit is
        // acquired before the next target may start.
        for target in signal.targets.clone() {
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .expect("publisher semaphore is never closed");
            let publisher = self.clone();
            let command = signal.command.clone();
            let external_message = signal.external_message.clone();
            dispatches.spawn(async move {
                let outcome = publisher
                    .dispatch_target(&command, &target, &external_message)
                    .await;
                drop(permit);
                outcome
            });
        }

        let mut envelopes: Vec<Acknowledgement> = Vec::new();
        let mut live_response: Option<MessageResponse> = None;
        let mut deadline_expired = false;

        loop {
            match tokio::time::timeout_at(deadline, dispatches.join_next()).await {
                Ok(Some(Ok(ResponseOutcome::LiveResponse(response)))) => {
                    if live_response.is_none() {
                        live_response = Some(response);
                    }
                }
                Ok(Some(Ok(ResponseOutcome::Ack(ack)))) => {
                    if !envelopes.iter().any(|existing| existing.label == ack.label) {
                        envelopes.push(ack);
                    }
                }
                Ok(Some(Err(join_error))) => {
                    tracing::error!(
                        connection = %self.connection.id,
                        error = %join_error,
                        "Dispatch task panicked"
                    );
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_expired = true;
                    dispatches.abort_all();
                    break;
                }
            }
        }

        if deadline_expired {
            for label in &signal.command.requested_acks {
                let satisfied_by_live = label.is_live_response() && live_response.is_some();
                if !satisfied_by_live && !envelopes.iter().any(|ack| &ack.label == label) {
                    envelopes.push(timeout_ack(&signal.command, label.clone()));
                }
            }
        }

        match live_response {
            Some(response) if envelopes.is_empty() => SignalReply::LiveResponse(response),
            Some(response) => {
                // Several targets answered; the live response joins the
                // aggregate under its own label.
                if !envelopes.iter().any(|ack| ack.label.is_live_response()) {
                    let live_ack = Acknowledgement::new(
                        AcknowledgementLabel::live_response(),
                        response.thing_id.clone(),
                        response.status,
                        response.headers.clone(),
                        response.payload.clone(),
                    );
                    envelopes.insert(0, live_ack);
                }
                SignalReply::Acks(Acknowledgements::of(
                    signal.command.thing_id.clone(),
                    signal.command.correlation_id.clone(),
                    envelopes,
                ))
            }
            None => SignalReply::Acks(Acknowledgements::of(
                signal.command.thing_id.clone(),
                signal.command.correlation_id.clone(),
                envelopes,
            )),
        }
    }

    async fn dispatch_target(
        &self,
        command: &MessageCommand,
        target: &Target,
        external_message: &ExternalMessage,
    ) -> ResponseOutcome {
        match self.try_dispatch(command, target, external_message).await {
            Ok(outcome) => outcome,
            Err(error) => self.failure_ack(command, target, error),
        }
    }

    async fn try_dispatch(
        &self,
        command: &MessageCommand,
        target: &Target,
        external_message: &ExternalMessage,
    ) -> ConnectivityResult<ResponseOutcome> {
        let mut state = RequestState::Pending;
        let context = PlaceholderContext::from_signal(command, external_message);
        let request = self.build_request(&context, target, external_message)?;
        tracing::trace!(
            connection = %self.connection.id,
            address = %target.address,
            state = ?state,
            "Request built"
        );

        let request = match &self.signer {
            Some(signer) => signer.sign(request, Utc::now())?,
            None => request,
        };

        state = RequestState::Dispatched;
        tracing::debug!(
            connection = %self.connection.id,
            address = %target.address,
            state = ?state,
            "Dispatching request"
        );

        let response = match tokio::time::timeout(
            self.config.request_timeout,
            self.factory.dispatch(request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(transport_error)) => {
                state = RequestState::Failed;
                tracing::debug!(connection = %self.connection.id, state = ?state, "Request failed");
                return Err(transport_error);
            }
            Err(_) => {
                state = RequestState::TimedOut;
                tracing::debug!(connection = %self.connection.id, state = ?state, "Request timed out");
                return Err(ConnectivityError::Timeout(self.config.request_timeout));
            }
        };

        state = RequestState::Responded;
        tracing::debug!(
            connection = %self.connection.id,
            status = %response.status,
            state = ?state,
            "Response received"
        );

        metrics::MESSAGES_PUBLISHED_TOTAL.inc();
        lookup_or_create_counter(CounterKey::new(
            self.connection.id.clone(),
            MetricDirection::Outbound,
            target.address.clone(),
        ))
        .increment();

        Ok(correlate_response(command, target, &response))
    }

    /// Build the unsigned request for one target: render the address
    /// template, resolve the header mapping and apply reserved headers to
    /// the request structure.
    fn build_request(
        &self,
        context: &PlaceholderContext,
        target: &Target,
        external_message: &ExternalMessage,
    ) -> ConnectivityResult<Request<Vec<u8>>> {
        let publish_target = HttpPublishTarget::parse(&target.address)?;
        let rendered = placeholders::resolve(publish_target.path_with_query(), context)?;
        // Fragments are rendered for placeholder validation but never sent.
        let rendered_path = rendered.split('#').next().unwrap_or_default().to_string();

        let mut headers: Vec<(String, String)> = external_message
            .headers()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, template) in &target.header_mapping {
            headers.push((name.clone(), placeholders::resolve(template, context)?));
        }

        let mut method_override: Option<String> = None;
        let mut path_override: Option<String> = None;
        let mut query_override: Option<String> = None;
        headers.retain(|(name, value)| {
            if name.eq_ignore_ascii_case(RESERVED_HEADER_HTTP_METHOD) {
                method_override = Some(value.clone());
                false
            } else if name.eq_ignore_ascii_case(RESERVED_HEADER_HTTP_PATH) {
                path_override = Some(value.clone());
                false
            } else if name.eq_ignore_ascii_case(RESERVED_HEADER_HTTP_QUERY) {
                query_override = Some(value.clone());
                false
            } else {
                true
            }
        });

        let method = match method_override {
            Some(name) => parse_method_override(&name)?,
            None => publish_target.method().clone(),
        };

        let mut request = self.factory.new_request(&method, &rendered_path)?;

        if path_override.is_some() || query_override.is_some() {
            apply_uri_overrides(&mut request, path_override, query_override)?;
        }

        *request.body_mut() = external_message.payload().as_bytes().to_vec();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                ConnectivityError::config_invalid(format!("The header name <{}> is not valid", name))
            })?;
            let header_value = HeaderValue::from_str(&value).map_err(|_| {
                ConnectivityError::config_invalid(format!(
                    "The value of header <{}> is not valid",
                    name
                ))
            })?;
            request.headers_mut().append(header_name, header_value);
        }

        Ok(request)
    }

    fn failure_ack(
        &self,
        command: &MessageCommand,
        target: &Target,
        error: ConnectivityError,
    ) -> ResponseOutcome {
        error.log();
        metrics::PUBLISH_FAILURES_TOTAL.inc();

        let status = self.status_resolver.resolve(&error);
        let label = target
            .issued_acknowledgement_label
            .clone()
            .unwrap_or_else(AcknowledgementLabel::live_response);
        let entity = json!({
            "status": status.as_u16(),
            "error": error.error_code(),
            "message": error.to_string(),
        });
        ResponseOutcome::Ack(Acknowledgement::new(
            label,
            command.thing_id.clone(),
            status,
            Default::default(),
            Some(entity),
        ))
    }
}

fn parse_method_override(name: &str) -> ConnectivityResult<Method> {
    ALLOWED_METHODS
        .iter()
        .find(|method| method.as_str().eq_ignore_ascii_case(name))
        .cloned()
        .ok_or_else(|| {
            ConnectivityError::config_invalid(format!(
                "The method <{}> from the {} header is not supported",
                name, RESERVED_HEADER_HTTP_METHOD
            ))
        })
}

fn apply_uri_overrides(
    request: &mut Request<Vec<u8>>,
    path_override: Option<String>,
    query_override: Option<String>,
) -> ConnectivityResult<()> {
    let uri = request.uri().clone();
    let path = match path_override {
        Some(path) if path.starts_with('/') => path,
        Some(path) => format!("/{}", path),
        None => uri.path().to_string(),
    };
    let query = query_override.or_else(|| uri.query().map(str::to_string));

    let path_and_query = match query {
        Some(query) if !query.is_empty() => format!("{}?{}", path, query),
        _ => path,
    };
    let path_and_query: PathAndQuery = path_and_query.parse().map_err(|_| {
        ConnectivityError::config_invalid(format!(
            "The reserved headers produce an invalid request path <{}>",
            path_and_query
        ))
    })?;

    let mut parts = uri.into_parts();
    parts.path_and_query = Some(path_and_query);
    *request.uri_mut() = Uri::from_parts(parts)
        .map_err(|e| ConnectivityError::internal(e.to_string()))?;
    Ok(())
}

fn timeout_ack(command: &MessageCommand, label: AcknowledgementLabel) -> Acknowledgement {
    let entity = json!({
        "status": StatusCode::REQUEST_TIMEOUT.as_u16(),
        "error": "connectivity:acknowledgement.timeout",
        "message": format!(
            "The requested acknowledgement <{}> was not received before the timeout",
            label
        ),
    });
    Acknowledgement::new(
        label,
        command.thing_id.clone(),
        StatusCode::REQUEST_TIMEOUT,
        Default::default(),
        Some(entity),
    )
}
