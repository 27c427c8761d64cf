// ============================================================================
// HMAC Request Signing
// ============================================================================
//
// Signers are pure: for fixed credentials, request and timestamp the signed
// request is byte-identical on every invocation. No I/O, no retries. The
// publisher invokes the signer on the fully-formed unsigned request as the
// last step before dispatch.
//
// ============================================================================

pub mod aws4;
pub mod az_monitor;

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::model::HmacCredentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::Request;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Signs an outbound request with a fixed timestamp
pub trait RequestSigner: Send + Sync + std::fmt::Debug {
    fn sign(
        &self,
        request: Request<Vec<u8>>,
        timestamp: DateTime<Utc>,
    ) -> ConnectivityResult<Request<Vec<u8>>>;
}

/// Build the signer selected by the credentials' algorithm.
///
/// Unknown algorithms and missing parameters yield `CredentialsInvalid`.
pub fn from_credentials(
    credentials: &HmacCredentials,
) -> ConnectivityResult<Arc<dyn RequestSigner>> {
    match credentials.algorithm.as_str() {
        aws4::ALGORITHM => Ok(Arc::new(aws4::AwsRequestSigner::from_parameters(
            &credentials.parameters,
        )?)),
        az_monitor::ALGORITHM => Ok(Arc::new(az_monitor::AzMonitorRequestSigner::from_parameters(
            &credentials.parameters,
        )?)),
        other => Err(ConnectivityError::credentials(format!(
            "The algorithm <{}> is unknown; supported algorithms are <{}> and <{}>",
            other,
            aws4::ALGORITHM,
            az_monitor::ALGORITHM
        ))),
    }
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
