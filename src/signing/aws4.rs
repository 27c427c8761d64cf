use super::{RequestSigner, hmac_sha256};
use crate::error::{ConnectivityError, ConnectivityResult};
use chrono::{DateTime, Utc};
use http::{HeaderValue, Request};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const ALGORITHM: &str = "aws4-hmac-sha256";

/// Format of the `x-amz-date` header: `YYYYMMDD'T'HHMMSS'Z'` in UTC
pub const X_AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

const DATE_STAMP_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AwsParameters {
    region: String,
    service: String,
    access_key: String,
    secret_key: String,
    #[serde(default = "default_double_encode")]
    double_encode: bool,
    #[serde(default = "default_canonical_headers")]
    canonical_headers: Vec<String>,
}

fn default_double_encode() -> bool {
    true
}

fn default_canonical_headers() -> Vec<String> {
    vec!["x-amz-date".to_string(), "host".to_string()]
}

/// AWS Signature Version 4 request signer
#[derive(Debug)]
pub struct AwsRequestSigner {
    region: String,
    service: String,
    access_key: String,
    secret_key: String,
    double_encode: bool,
    canonical_headers: Vec<String>,
}

impl AwsRequestSigner {
    pub fn from_parameters(parameters: &Value) -> ConnectivityResult<Self> {
        let parameters: AwsParameters = serde_json::from_value(parameters.clone())
            .map_err(|e| {
                ConnectivityError::credentials(format!(
                    "Invalid parameters for algorithm <{}>: {}",
                    ALGORITHM, e
                ))
            })?;
        Ok(Self {
            region: parameters.region,
            service: parameters.service,
            access_key: parameters.access_key,
            secret_key: parameters.secret_key,
            double_encode: parameters.double_encode,
            canonical_headers: parameters
                .canonical_headers
                .iter()
                .map(|name| name.to_lowercase())
                .collect(),
        })
    }

    /// Chained HMAC key derivation:
    /// kSecret = "AWS4" + secretKey, kDate = HMAC(kSecret, date),
    /// kRegion = HMAC(kDate, region), kService = HMAC(kRegion, service),
    /// kSigning = HMAC(kService, "aws4_request")
    fn signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    fn canonical_uri(&self, path: &str) -> String {
        let path = if path.is_empty() { "/" } else { path };
        path.split('/')
            .map(|segment| {
                let encoded = uri_encode(segment);
                if self.double_encode {
                    uri_encode(&encoded)
                } else {
                    encoded
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    fn canonical_query(query: Option<&str>) -> String {
        let Some(query) = query else {
            return String::new();
        };
        let mut pairs: Vec<(String, String)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) => (uri_encode(name), uri_encode(value)),
                None => (uri_encode(pair), String::new()),
            })
            .collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn canonical_headers_block(&self, request: &Request<Vec<u8>>) -> ConnectivityResult<String> {
        let mut block = String::new();
        for name in &self.canonical_headers {
            let value = if let Some(value) = request.headers().get(name.as_str()) {
                value
                    .to_str()
                    .map_err(|_| {
                        ConnectivityError::credentials(format!(
                            "The header <{}> has a non-ASCII value and cannot be signed",
                            name
                        ))
                    })?
                    .to_string()
            } else if name == "host" {
                request
                    .uri()
                    .authority()
                    .map(|authority| authority.as_str().to_string())
                    .ok_or_else(|| {
                        ConnectivityError::credentials(
                            "The request has no authority to derive the host header from",
                        )
                    })?
            } else {
                return Err(ConnectivityError::credentials(format!(
                    "The canonical header <{}> is not present on the request",
                    name
                )));
            };
            block.push_str(name);
            block.push(':');
            block.push_str(&normalize_header_value(&value));
            block.push('\n');
        }
        Ok(block)
    }

    fn canonical_request(&self, request: &Request<Vec<u8>>) -> ConnectivityResult<String> {
        let payload_hash = hex::encode(Sha256::digest(request.body()));
        Ok(format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method().as_str(),
            self.canonical_uri(request.uri().path()),
            Self::canonical_query(request.uri().query()),
            self.canonical_headers_block(request)?,
            self.signed_headers(),
            payload_hash
        ))
    }

    fn signed_headers(&self) -> String {
        self.canonical_headers.join(";")
    }
}

impl RequestSigner for AwsRequestSigner {
    fn sign(
        &self,
        mut request: Request<Vec<u8>>,
        timestamp: DateTime<Utc>,
    ) -> ConnectivityResult<Request<Vec<u8>>> {
        let amz_date = timestamp.format(X_AMZ_DATE_FORMAT).to_string();
        let date_stamp = timestamp.format(DATE_STAMP_FORMAT).to_string();

        request.headers_mut().insert(
            "x-amz-date",
            HeaderValue::from_str(&amz_date)
                .map_err(|e| ConnectivityError::internal(e.to_string()))?,
        );

        let canonical_request = self.canonical_request(&request)?;
        let hashed_canonical_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date, credential_scope, hashed_canonical_request
        );

        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&date_stamp),
            string_to_sign.as_bytes(),
        ));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key,
            credential_scope,
            self.signed_headers(),
            signature
        );
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| ConnectivityError::internal(e.to_string()))?,
        );

        Ok(request)
    }
}

/// RFC 3986 percent-encoding: unreserved characters stay, everything else
/// becomes `%XX` with uppercase hex.
fn uri_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push_str(&format!("{:02X}", byte));
            }
        }
    }
    encoded
}

fn normalize_header_value(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());
    let mut previous_was_space = false;
    for ch in value.trim().chars() {
        if ch == ' ' {
            if !previous_was_space {
                normalized.push(' ');
            }
            previous_was_space = true;
        } else {
            normalized.push(ch);
            previous_was_space = false;
        }
    }
    normalized
}
