// ============================================================================
// HTTP Publisher Integration Tests
// ============================================================================
//
// Drives the publisher pipeline with an in-process push factory: requests
// are captured for inspection and answered with canned responses, so the
// full path (render -> header mapping -> reserved headers -> sign ->
// dispatch -> correlate -> reply) is exercised without a network.
//
// ============================================================================

use chrono::{DateTime, NaiveDateTime, Utc};
use http::{Method, Request, StatusCode, Uri};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thingbridge::config::HttpPushConfig;
use thingbridge::error::{ConnectivityError, ConnectivityResult};
use thingbridge::httppush::{HttpPublisher, HttpPushFactory, PushResponse};
use thingbridge::model::{
    AcknowledgementLabel, Connection, ConnectionId, ConnectionType, ConnectivityStatus,
    ExternalMessage, HmacCredentials, Target, Topic,
};
use thingbridge::signal::protocol::{DITTO_PROTOCOL_CONTENT_TYPE, to_protocol_json};
use thingbridge::signal::{
    MappedOutboundSignal, MessageCommand, MessageDirection, MessageResponse,
    MultiMappedOutboundSignal, SignalReply,
};
use thingbridge::signing::{RequestSigner, aws4, az_monitor};
use thingbridge::model::ThingId;
use tokio::sync::{broadcast, mpsc};

const CUSTOM_HEADER_NAME: &str = "my-custom-header";
const CUSTOM_HEADER_VALUE: &str = "bumlux";
const CORRELATION_ID: &str = "cid";
const OUTBOUND_ADDRESS: &str =
    "PATCH:/the/quick/brown/fox/jumps/over/the/lazy/dog?someQuery=foo&entity={{ entity:id }}";

// ============================================================================
// In-process push factory
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedRequest {
    method: Method,
    uri: Uri,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone)]
struct MockPushFactory {
    status: StatusCode,
    content_type: Option<String>,
    body: Vec<u8>,
    captured: mpsc::UnboundedSender<CapturedRequest>,
    delay: Option<Duration>,
}

impl MockPushFactory {
    fn new(
        content_type: Option<&str>,
        status: StatusCode,
        body: &[u8],
    ) -> (Self, mpsc::UnboundedReceiver<CapturedRequest>) {
        let (captured, receiver) = mpsc::unbounded_channel();
        (
            Self {
                status,
                content_type: content_type.map(str::to_string),
                body: body.to_vec(),
                captured,
                delay: None,
            },
            receiver,
        )
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl HttpPushFactory for MockPushFactory {
    fn new_request(
        &self,
        method: &Method,
        path_with_query: &str,
    ) -> ConnectivityResult<Request<Vec<u8>>> {
        let separator = if path_with_query.starts_with('/') || path_with_query.is_empty() {
            ""
        } else {
            "/"
        };
        Request::builder()
            .method(method.clone())
            .uri(format!("http://8.8.4.4:12345{}{}", separator, path_with_query))
            .body(Vec::new())
            .map_err(|e| ConnectivityError::internal(e.to_string()))
    }

    async fn dispatch(&self, request: Request<Vec<u8>>) -> ConnectivityResult<PushResponse> {
        let _ = self.captured.send(CapturedRequest {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect(),
            body: request.body().clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut headers = HashMap::new();
        if let Some(content_type) = &self.content_type {
            headers.insert("content-type".to_string(), content_type.clone());
        }
        headers.insert(CUSTOM_HEADER_NAME.to_string(), CUSTOM_HEADER_VALUE.to_string());

        Ok(PushResponse {
            status: self.status,
            headers,
            body: self.body.clone(),
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn thing_id() -> ThingId {
    ThingId::new("ditto", "thing")
}

fn test_connection(credentials: Option<HmacCredentials>) -> Connection {
    let mut connection = Connection::new(
        ConnectionId::new("http-push-test"),
        ConnectionType::HttpPush,
        ConnectivityStatus::Open,
        "http://8.8.4.4:12345",
    );
    connection.credentials = credentials;
    connection
}

fn header_mapped_target(label: &str) -> Target {
    let mut header_mapping = HashMap::new();
    header_mapping.insert("thing_id".to_string(), "{{ thing:id }}".to_string());
    header_mapping.insert(
        "suffixed_thing_id".to_string(),
        "{{ thing:id }}.some.suffix".to_string(),
    );
    header_mapping.insert(
        "prefixed_thing_id".to_string(),
        "some.prefix.{{ thing:id }}".to_string(),
    );
    header_mapping.insert("eclipse".to_string(), "ditto".to_string());
    header_mapping.insert("device_id".to_string(), "{{ header:device_id }}".to_string());

    Target::new(OUTBOUND_ADDRESS)
        .with_header_mapping(header_mapping)
        .with_issued_acknowledgement_label(AcknowledgementLabel::of(label))
        .with_topics(vec![Topic::LiveMessages])
}

fn message_command(requested_acks: Vec<AcknowledgementLabel>) -> MessageCommand {
    MessageCommand::new(thing_id(), MessageDirection::From, "please-respond")
        .with_correlation_id(CORRELATION_ID)
        .with_header("device_id", "ditto:thing")
        .with_requested_acks(requested_acks)
}

fn mapped_signal(
    target: Target,
    requested_acks: Vec<AcknowledgementLabel>,
    message_headers: HashMap<String, String>,
) -> MappedOutboundSignal {
    MappedOutboundSignal {
        command: message_command(requested_acks),
        targets: vec![target],
        external_message: ExternalMessage::text(message_headers, "payload"),
    }
}

async fn publish(
    connection: Connection,
    factory: MockPushFactory,
    config: HttpPushConfig,
    mapped: Vec<MappedOutboundSignal>,
) -> Vec<SignalReply> {
    let publisher =
        Arc::new(HttpPublisher::new(Arc::new(connection), factory, config).unwrap());
    let (signal_tx, signal_rx) = mpsc::channel(4);
    let (shutdown_tx, _) = broadcast::channel(1);
    let worker = tokio::spawn(publisher.run(signal_rx, shutdown_tx.subscribe()));

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
    let expected_replies = mapped.len();
    signal_tx
        .send(MultiMappedOutboundSignal::new(mapped, reply_tx))
        .await
        .unwrap();

    let mut replies = Vec::new();
    for _ in 0..expected_replies {
        let reply = tokio::time::timeout(Duration::from_secs(10), reply_rx.recv())
            .await
            .expect("timed out waiting for reply")
            .expect("reply channel closed");
        replies.push(reply);
    }

    drop(signal_tx);
    let _ = worker.await;
    replies
}

fn expect_acks(reply: SignalReply) -> thingbridge::model::Acknowledgements {
    match reply {
        SignalReply::Acks(acks) => acks,
        SignalReply::LiveResponse(response) => {
            panic!("expected acknowledgements, got live response {:?}", response)
        }
    }
}

fn expect_live_response(reply: SignalReply) -> MessageResponse {
    match reply {
        SignalReply::LiveResponse(response) => response,
        SignalReply::Acks(acks) => panic!("expected live response, got acks {:?}", acks),
    }
}

// ============================================================================
// Publishing & header handling
// ============================================================================

#[tokio::test]
async fn test_published_message() {
    let (factory, mut captured) = MockPushFactory::new(
        Some("application/vnd.eclipse.ditto+json; param_name=param_value"),
        StatusCode::OK,
        br#"["The quick brown fox jumps over the lazy dog."]"#,
    );
    let target = header_mapped_target("please-verify");
    let mapped = mapped_signal(
        target,
        vec![AcknowledgementLabel::of("please-verify")],
        HashMap::new(),
    );

    publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let request = captured.recv().await.unwrap();
    assert_eq!(request.method, Method::PATCH);
    assert_eq!(request.uri.host(), Some("8.8.4.4"));
    assert_eq!(request.uri.port_u16(), Some(12345));
    assert!(request.uri.query().unwrap().contains("entity=ditto:thing"));

    assert_eq!(request.header("thing_id"), Some("ditto:thing"));
    assert_eq!(
        request.header("suffixed_thing_id"),
        Some("ditto:thing.some.suffix")
    );
    assert_eq!(
        request.header("prefixed_thing_id"),
        Some("some.prefix.ditto:thing")
    );
    assert_eq!(request.header("eclipse"), Some("ditto"));
    assert_eq!(request.header("device_id"), Some("ditto:thing"));
    assert_eq!(request.body, b"payload");
}

#[tokio::test]
async fn test_reserved_headers() {
    let (factory, mut captured) = MockPushFactory::new(Some("text/plain"), StatusCode::OK, b"");
    let mut message_headers = HashMap::new();
    message_headers.insert("http.query".to_string(), "a=b&c=d&e=f".to_string());
    message_headers.insert("http.path".to_string(), "my/awesome/path".to_string());
    let mapped = mapped_signal(
        Target::new(OUTBOUND_ADDRESS),
        vec![],
        message_headers,
    );

    publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let request = captured.recv().await.unwrap();
    assert_eq!(request.header("http.query"), None);
    assert_eq!(request.header("http.path"), None);
    assert_eq!(request.uri.query(), Some("a=b&c=d&e=f"));
    assert_eq!(request.uri.path(), "/my/awesome/path");
}

#[tokio::test]
async fn test_http_path_reserved_header_with_leading_slash() {
    let (factory, mut captured) = MockPushFactory::new(Some("text/plain"), StatusCode::OK, b"");
    let mut message_headers = HashMap::new();
    message_headers.insert("http.path".to_string(), "/my/awesome/path".to_string());
    let mapped = mapped_signal(Target::new(OUTBOUND_ADDRESS), vec![], message_headers);

    publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let request = captured.recv().await.unwrap();
    assert_eq!(request.header("http.path"), None);
    assert_eq!(request.uri.path(), "/my/awesome/path");
}

#[tokio::test]
async fn test_http_method_reserved_header_overrides_method() {
    let (factory, mut captured) = MockPushFactory::new(Some("text/plain"), StatusCode::OK, b"");
    let mut message_headers = HashMap::new();
    message_headers.insert("http.method".to_string(), "PUT".to_string());
    let mapped = mapped_signal(Target::new(OUTBOUND_ADDRESS), vec![], message_headers);

    publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let request = captured.recv().await.unwrap();
    assert_eq!(request.header("http.method"), None);
    assert_eq!(request.method, Method::PUT);
}

// ============================================================================
// Acknowledgements
// ============================================================================

#[tokio::test]
async fn test_plain_text_ack() {
    let (factory, _captured) = MockPushFactory::new(Some("text/plain"), StatusCode::OK, b"hello!");
    let label = AcknowledgementLabel::of("please-verify");
    let mapped = mapped_signal(
        header_mapped_target("please-verify"),
        vec![label.clone()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let acks = expect_acks(replies.into_iter().next().unwrap());
    assert_eq!(acks.size(), 1);
    let ack = acks.acknowledgement(&label).unwrap();
    assert_eq!(ack.status, StatusCode::OK);
    assert_eq!(ack.headers.get("content-type").map(String::as_str), Some("text/plain"));
    assert_eq!(
        ack.headers.get(CUSTOM_HEADER_NAME).map(String::as_str),
        Some(CUSTOM_HEADER_VALUE)
    );
    assert_eq!(ack.entity, Some(Value::String("hello!".to_string())));
}

#[tokio::test]
async fn test_binary_ack() {
    let (factory, _captured) =
        MockPushFactory::new(Some("application/octet-stream"), StatusCode::OK, b"hello!");
    let label = AcknowledgementLabel::of("please-verify");
    let mapped = mapped_signal(
        header_mapped_target("please-verify"),
        vec![label.clone()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let acks = expect_acks(replies.into_iter().next().unwrap());
    let ack = acks.acknowledgement(&label).unwrap();
    assert_eq!(
        ack.headers.get("content-type").map(String::as_str),
        Some("application/octet-stream")
    );
    assert_eq!(ack.entity, Some(Value::String("aGVsbG8h".to_string())));
}

#[tokio::test]
async fn test_message_command_creates_command_response() {
    let custom_content_type = "application/vnd.org.eclipse.ditto.foobar+json";
    let (factory, _captured) = MockPushFactory::new(
        Some(custom_content_type),
        StatusCode::IM_A_TEAPOT,
        br#"{ "foo": true }"#,
    );
    let target = Target::new(OUTBOUND_ADDRESS)
        .with_issued_acknowledgement_label(AcknowledgementLabel::live_response())
        .with_topics(vec![Topic::LiveMessages]);
    let mapped = mapped_signal(
        target,
        vec![AcknowledgementLabel::live_response()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let response = expect_live_response(replies.into_iter().next().unwrap());
    assert_eq!(response.thing_id, thing_id());
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(response.correlation_id.as_deref(), Some(CORRELATION_ID));
    assert_eq!(response.subject, "please-respond");
    assert_eq!(response.direction, MessageDirection::From);
    assert_eq!(response.content_type.as_deref(), Some(custom_content_type));
    assert_eq!(response.payload, Some(json!({"foo": true})));
    assert_eq!(
        response.headers.get(CUSTOM_HEADER_NAME).map(String::as_str),
        Some(CUSTOM_HEADER_VALUE)
    );
}

#[tokio::test]
async fn test_message_command_with_non_live_response_issued_acknowledgement() {
    let (factory, _captured) = MockPushFactory::new(
        Some("application/json"),
        StatusCode::IM_A_TEAPOT,
        br#"{ "foo": true }"#,
    );
    let auto_ack_label = AcknowledgementLabel::of("foo:bar");
    let target = Target::new(OUTBOUND_ADDRESS)
        .with_issued_acknowledgement_label(auto_ack_label.clone())
        .with_topics(vec![Topic::LiveMessages]);
    let mapped = mapped_signal(
        target,
        vec![AcknowledgementLabel::live_response(), auto_ack_label.clone()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let acks = expect_acks(replies.into_iter().next().unwrap());
    assert_eq!(acks.size(), 1);
    let ack = acks.acknowledgement(&auto_ack_label).unwrap();
    assert_eq!(ack.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(ack.entity_id, thing_id());
}

// ============================================================================
// Live response validation
// ============================================================================

fn protocol_response_factory(
    correlation_id: &str,
    response_thing_id: ThingId,
    feature_id: Option<&str>,
) -> (MockPushFactory, mpsc::UnboundedReceiver<CapturedRequest>) {
    let mut headers = HashMap::new();
    headers.insert(CUSTOM_HEADER_NAME.to_string(), CUSTOM_HEADER_VALUE.to_string());
    let response = MessageResponse {
        thing_id: response_thing_id,
        feature_id: feature_id.map(str::to_string),
        direction: MessageDirection::From,
        subject: "please-respond".to_string(),
        correlation_id: Some(correlation_id.to_string()),
        status: StatusCode::IM_A_TEAPOT,
        content_type: Some("application/vnd.org.eclipse.ditto.foobar+json".to_string()),
        payload: Some(json!({"foo": true})),
        headers,
    };
    let body = serde_json::to_vec(&to_protocol_json(&response)).unwrap();
    MockPushFactory::new(
        Some(DITTO_PROTOCOL_CONTENT_TYPE),
        StatusCode::IM_A_TEAPOT,
        &body,
    )
}

fn live_response_target() -> Target {
    Target::new(OUTBOUND_ADDRESS)
        .with_issued_acknowledgement_label(AcknowledgementLabel::live_response())
        .with_topics(vec![Topic::LiveMessages])
}

#[tokio::test]
async fn test_live_response_from_protocol_message() {
    let (factory, _captured) = protocol_response_factory(CORRELATION_ID, thing_id(), None);
    let mapped = mapped_signal(
        live_response_target(),
        vec![AcknowledgementLabel::live_response()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let response = expect_live_response(replies.into_iter().next().unwrap());
    assert_eq!(response.thing_id, thing_id());
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(response.correlation_id.as_deref(), Some(CORRELATION_ID));
    assert_eq!(response.payload, Some(json!({"foo": true})));
    assert_eq!(
        response.headers.get(CUSTOM_HEADER_NAME).map(String::as_str),
        Some(CUSTOM_HEADER_VALUE)
    );
}

#[tokio::test]
async fn test_live_response_with_wrong_correlation_id_does_not_work() {
    let (factory, _captured) = protocol_response_factory("otherID", thing_id(), None);
    let mapped = mapped_signal(
        live_response_target(),
        vec![AcknowledgementLabel::live_response()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let acks = expect_acks(replies.into_iter().next().unwrap());
    assert_eq!(acks.entity_id(), &thing_id());
    assert_eq!(acks.status(), StatusCode::BAD_REQUEST);
    assert_eq!(acks.correlation_id(), Some(CORRELATION_ID));
    assert_eq!(acks.size(), 1);
    let ack = acks
        .acknowledgement(&AcknowledgementLabel::live_response())
        .unwrap();
    assert!(ack.to_json().to_string().contains(
        "Correlation ID of response <otherID> does not match correlation ID of message command <cid>"
    ));
}

#[tokio::test]
async fn test_live_response_to_different_thing_id_does_not_work() {
    let (factory, _captured) =
        protocol_response_factory(CORRELATION_ID, ThingId::new("namespace", "wrongthing"), None);
    let mapped = mapped_signal(
        live_response_target(),
        vec![AcknowledgementLabel::live_response()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let acks = expect_acks(replies.into_iter().next().unwrap());
    assert_eq!(acks.status(), StatusCode::BAD_REQUEST);
    let ack = acks
        .acknowledgement(&AcknowledgementLabel::live_response())
        .unwrap();
    assert!(ack.to_json().to_string().contains(
        "Live response does not target the correct thing. Expected thing ID <ditto:thing>, \
         but was <namespace:wrongthing>."
    ));
}

#[tokio::test]
async fn test_live_response_of_wrong_type_does_not_work() {
    let (factory, _captured) =
        protocol_response_factory(CORRELATION_ID, thing_id(), Some("wrongId"));
    let mapped = mapped_signal(
        live_response_target(),
        vec![AcknowledgementLabel::live_response()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let acks = expect_acks(replies.into_iter().next().unwrap());
    assert_eq!(acks.status(), StatusCode::BAD_REQUEST);
    let ack = acks
        .acknowledgement(&AcknowledgementLabel::live_response())
        .unwrap();
    assert!(ack.to_json().to_string().contains(
        "Live response of type <messages.responses:featureResponseMessage> is not of expected \
         type <messages.responses:thingResponseMessage>."
    ));
}

// ============================================================================
// Request signing
// ============================================================================

#[tokio::test]
async fn test_az_monitor_request_signing() {
    let credentials = HmacCredentials::new(
        "az-monitor-2016-04-01",
        json!({
            "workspaceId": "xxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
            "sharedKey": "SGFsbG8gV2VsdCEgSXN0IGRhcyBhbG",
        }),
    );
    let (factory, mut captured) = MockPushFactory::new(None, StatusCode::OK, b"");
    let target = Target::new("POST:/api/logs?api-version=2016-04-01")
        .with_topics(vec![Topic::LiveMessages]);
    let mapped = mapped_signal(target, vec![], HashMap::new());

    publish(
        test_connection(Some(credentials.clone())),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let request = captured.recv().await.unwrap();
    let x_ms_date = request.header("x-ms-date").expect("x-ms-date missing");
    let naive = NaiveDateTime::parse_from_str(x_ms_date, az_monitor::X_MS_DATE_FORMAT).unwrap();
    let timestamp = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);

    // Re-sign the bare request with the captured timestamp; the results
    // must agree byte for byte.
    let signer =
        az_monitor::AzMonitorRequestSigner::from_parameters(&credentials.parameters).unwrap();
    let unsigned = Request::builder()
        .method(request.method.clone())
        .uri(request.uri.clone())
        .body(request.body.clone())
        .unwrap();
    let expected = signer.sign(unsigned, timestamp).unwrap();

    assert_eq!(
        request.header("authorization"),
        expected
            .headers()
            .get(http::header::AUTHORIZATION)
            .map(|value| value.to_str().unwrap())
    );
}

#[tokio::test]
async fn test_aws_request_signing() {
    let credentials = HmacCredentials::new(
        "aws4-hmac-sha256",
        json!({
            "region": "us-east-1",
            "service": "iam",
            "accessKey": "MyAwesomeAccessKey",
            "secretKey": "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "doubleEncode": false,
            "canonicalHeaders": ["x-amz-date", "host"],
        }),
    );
    let (factory, mut captured) = MockPushFactory::new(None, StatusCode::OK, b"");
    let target = Target::new("POST:/api/logs?api-version=2016-04-01")
        .with_topics(vec![Topic::LiveMessages]);
    let mapped = mapped_signal(target, vec![], HashMap::new());

    publish(
        test_connection(Some(credentials.clone())),
        factory,
        HttpPushConfig::default(),
        vec![mapped],
    )
    .await;

    let request = captured.recv().await.unwrap();
    let x_amz_date = request.header("x-amz-date").expect("x-amz-date missing");
    let naive = NaiveDateTime::parse_from_str(x_amz_date, aws4::X_AMZ_DATE_FORMAT).unwrap();
    let timestamp = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);

    let signer = aws4::AwsRequestSigner::from_parameters(&credentials.parameters).unwrap();
    let unsigned = Request::builder()
        .method(request.method.clone())
        .uri(request.uri.clone())
        .body(request.body.clone())
        .unwrap();
    let expected = signer.sign(unsigned, timestamp).unwrap();

    assert_eq!(
        request.header("authorization"),
        expected
            .headers()
            .get(http::header::AUTHORIZATION)
            .map(|value| value.to_str().unwrap())
    );
}

// ============================================================================
// Reply discipline, timeouts
// ============================================================================

#[tokio::test]
async fn test_exactly_one_reply_per_mapped_signal() {
    let (factory, _captured) = MockPushFactory::new(Some("text/plain"), StatusCode::OK, b"ok");
    let label = AcknowledgementLabel::of("please-verify");
    let first = mapped_signal(
        header_mapped_target("please-verify"),
        vec![label.clone()],
        HashMap::new(),
    );
    let second = mapped_signal(
        header_mapped_target("please-verify"),
        vec![label.clone()],
        HashMap::new(),
    );

    let replies = publish(
        test_connection(None),
        factory,
        HttpPushConfig::default(),
        vec![first, second],
    )
    .await;

    assert_eq!(replies.len(), 2);
    for reply in replies {
        assert_eq!(expect_acks(reply).size(), 1);
    }
}

#[tokio::test]
async fn test_request_timeout_yields_gateway_timeout_ack() {
    let (factory, _captured) = MockPushFactory::new(Some("text/plain"), StatusCode::OK, b"late");
    let factory = factory.with_delay(Duration::from_secs(5));
    let label = AcknowledgementLabel::of("please-verify");
    let mapped = mapped_signal(
        header_mapped_target("please-verify"),
        vec![label.clone()],
        HashMap::new(),
    );
    let config = HttpPushConfig {
        parallelism: 2,
        request_timeout: Duration::from_millis(100),
        ack_timeout: Duration::from_secs(5),
    };

    let replies = publish(test_connection(None), factory, config, vec![mapped]).await;

    let acks = expect_acks(replies.into_iter().next().unwrap());
    let ack = acks.acknowledgement(&label).unwrap();
    assert_eq!(ack.status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_missing_acks_are_filled_with_request_timeout_after_deadline() {
    let (factory, _captured) = MockPushFactory::new(Some("text/plain"), StatusCode::OK, b"late");
    let factory = factory.with_delay(Duration::from_secs(5));
    let auto_ack_label = AcknowledgementLabel::of("foo:bar");
    let requested = vec![AcknowledgementLabel::live_response(), auto_ack_label.clone()];
    let target = Target::new(OUTBOUND_ADDRESS)
        .with_issued_acknowledgement_label(auto_ack_label.clone())
        .with_topics(vec![Topic::LiveMessages]);
    let mapped = mapped_signal(target, requested.clone(), HashMap::new());
    let config = HttpPushConfig {
        parallelism: 2,
        request_timeout: Duration::from_secs(10),
        ack_timeout: Duration::from_millis(100),
    };

    let replies = publish(test_connection(None), factory, config, vec![mapped]).await;

    let acks = expect_acks(replies.into_iter().next().unwrap());
    // After the deadline every requested label is present, filled with a
    // request-timeout envelope.
    assert_eq!(acks.size(), requested.len());
    for label in &requested {
        let ack = acks.acknowledgement(label).unwrap();
        assert_eq!(ack.status, StatusCode::REQUEST_TIMEOUT);
    }
}
