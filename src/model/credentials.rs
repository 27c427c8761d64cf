use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HMAC credentials attached to a connection.
///
/// The algorithm selects a signing family; the parameters object carries the
/// family-specific settings and is validated when the signer is built, not at
/// connection creation time.
///
/// Wire form:
/// ```json
/// { "algorithm": "aws4-hmac-sha256", "parameters": { "region": "...", ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmacCredentials {
    pub algorithm: String,
    pub parameters: Value,
}

impl HmacCredentials {
    pub fn new(algorithm: impl Into<String>, parameters: Value) -> Self {
        Self {
            algorithm: algorithm.into(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credentials_json_round_trip() {
        let credentials = HmacCredentials::new(
            "az-monitor-2016-04-01",
            json!({
                "workspaceId": "xxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
                "sharedKey": "SGFsbG8gV2VsdCEgSXN0IGRhcyBhbG",
            }),
        );

        let encoded = serde_json::to_string(&credentials).unwrap();
        let decoded: HmacCredentials = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, credentials);
    }
}
