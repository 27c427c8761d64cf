use super::{RequestSigner, hmac_sha256};
use crate::error::{ConnectivityError, ConnectivityResult};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD as BASE64};
use base64::engine::{DecodePaddingMode, Engine};
use chrono::{DateTime, Utc};
use http::{HeaderValue, Request};
use serde::Deserialize;
use serde_json::Value;

pub const ALGORITHM: &str = "az-monitor-2016-04-01";

/// Format of the `x-ms-date` header: RFC 1123 in UTC
pub const X_MS_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// Shared keys copied from the portal are frequently unpadded and may carry
// non-canonical trailing bits; accept them the way the portal tooling does.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AzParameters {
    workspace_id: String,
    shared_key: String,
}

/// Azure Monitor HMAC-SHA256 request signer
#[derive(Debug)]
pub struct AzMonitorRequestSigner {
    workspace_id: String,
    shared_key: Vec<u8>,
}

impl AzMonitorRequestSigner {
    pub fn from_parameters(parameters: &Value) -> ConnectivityResult<Self> {
        let parameters: AzParameters = serde_json::from_value(parameters.clone())
            .map_err(|e| {
                ConnectivityError::credentials(format!(
                    "Invalid parameters for algorithm <{}>: {}",
                    ALGORITHM, e
                ))
            })?;
        let shared_key = LENIENT_BASE64
            .decode(parameters.shared_key.trim())
            .map_err(|e| {
                ConnectivityError::credentials(format!(
                    "The shared key is not valid base64: {}",
                    e
                ))
            })?;
        Ok(Self {
            workspace_id: parameters.workspace_id,
            shared_key,
        })
    }

    fn string_to_sign(&self, request: &Request<Vec<u8>>, x_ms_date: &str) -> String {
        let content_type = request
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        format!(
            "{}\n{}\n{}\nx-ms-date:{}\n{}",
            request.method().as_str(),
            request.body().len(),
            content_type,
            x_ms_date,
            request.uri().path()
        )
    }
}

impl RequestSigner for AzMonitorRequestSigner {
    fn sign(
        &self,
        mut request: Request<Vec<u8>>,
        timestamp: DateTime<Utc>,
    ) -> ConnectivityResult<Request<Vec<u8>>> {
        let x_ms_date = timestamp.format(X_MS_DATE_FORMAT).to_string();

        let signature = BASE64.encode(hmac_sha256(
            &self.shared_key,
            self.string_to_sign(&request, &x_ms_date).as_bytes(),
        ));
        let authorization = format!("SharedKey {}:{}", self.workspace_id, signature);

        request.headers_mut().insert(
            "x-ms-date",
            HeaderValue::from_str(&x_ms_date)
                .map_err(|e| ConnectivityError::internal(e.to_string()))?,
        );
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| ConnectivityError::internal(e.to_string()))?,
        );

        Ok(request)
    }
}
