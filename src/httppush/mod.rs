// ============================================================================
// HTTP Push
// ============================================================================
//
// Outbound publishing over HTTP. The factory abstracts request construction
// and dispatch so the pipeline can be driven by an in-process transport in
// tests; the production factory wraps a shared reqwest client.
//
// ============================================================================

pub mod publisher;
pub mod target;

pub use publisher::HttpPublisher;
pub use target::HttpPublishTarget;

use crate::error::{ConnectivityError, ConnectivityResult};
use http::{Method, Request, StatusCode};
use std::collections::HashMap;
use std::future::Future;

/// Response observed for one dispatched request
#[derive(Debug, Clone)]
pub struct PushResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl PushResponse {
    /// Case-insensitive content-type lookup
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Builds and dispatches outbound requests for one connection
pub trait HttpPushFactory: Send + Sync + 'static {
    /// Build the base request for a rendered target address. The path is
    /// resolved against the connection URI; a missing leading `/` is
    /// inserted.
    fn new_request(
        &self,
        method: &Method,
        path_with_query: &str,
    ) -> ConnectivityResult<Request<Vec<u8>>>;

    /// Dispatch a request and await its response
    fn dispatch(
        &self,
        request: Request<Vec<u8>>,
    ) -> impl Future<Output = ConnectivityResult<PushResponse>> + Send;
}

/// Maps per-request failures to the HTTP status reported in the failure
/// acknowledgement. Reconnection policy is the supervisor's concern, not the
/// resolver's.
pub trait ConnectivityStatusResolver: Send + Sync {
    fn resolve(&self, error: &ConnectivityError) -> StatusCode;
}

/// Default resolver: timeouts report gateway-timeout, transport failures
/// bad-gateway, everything else its canonical status.
#[derive(Debug, Default)]
pub struct DefaultStatusResolver;

impl ConnectivityStatusResolver for DefaultStatusResolver {
    fn resolve(&self, error: &ConnectivityError) -> StatusCode {
        error.status_code()
    }
}

/// Production factory dispatching through a shared reqwest client
pub struct ReqwestPushFactory {
    client: reqwest::Client,
    base_uri: String,
}

impl ReqwestPushFactory {
    pub fn new(base_uri: impl Into<String>, request_timeout: std::time::Duration) -> ConnectivityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConnectivityError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_uri: base_uri.into(),
        })
    }
}

impl HttpPushFactory for ReqwestPushFactory {
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
        let uri = format!("{}{}{}", self.base_uri, separator, path_with_query);
        Request::builder()
            .method(method.clone())
            .uri(uri.clone())
            .body(Vec::new())
            .map_err(|e| {
                ConnectivityError::config_invalid(format!("The URI <{}> is not valid: {}", uri, e))
            })
    }

    async fn dispatch(&self, request: Request<Vec<u8>>) -> ConnectivityResult<PushResponse> {
        let url: reqwest::Url = request
            .uri()
            .to_string()
            .parse()
            .map_err(|e| ConnectivityError::internal(format!("Invalid request URL: {}", e)))?;

        let response = self
            .client
            .request(request.method().clone(), url)
            .headers(request.headers().clone())
            .body(request.body().clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(PushResponse {
            status,
            headers,
            body,
        })
    }
}
