use crate::error::{ConnectivityError, ConnectivityResult};
use http::Method;

/// HTTP methods allowed for push targets. DELETE is deliberately absent.
pub const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::PATCH];

/// Parsed form of a target address `METHOD:path?query#fragment`.
///
/// The path may contain placeholder expressions which are rendered per
/// signal; parsing only splits off the method and keeps the template intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPublishTarget {
    method: Method,
    path_with_query: String,
}

impl HttpPublishTarget {
    pub fn parse(address: &str) -> ConnectivityResult<Self> {
        if address.is_empty() {
            return Err(ConnectivityError::config_invalid(
                "The target address must not be empty",
            ));
        }

        let (method_name, path_with_query) = address.split_once(':').ok_or_else(|| {
            ConnectivityError::config_invalid(format!(
                "The target address <{}> does not start with an HTTP method",
                address
            ))
        })?;

        let method = ALLOWED_METHODS
            .iter()
            .find(|method| method.as_str() == method_name)
            .cloned()
            .ok_or_else(|| {
                ConnectivityError::config_invalid(format!(
                    "The method <{}> is not supported for HTTP push targets; supported methods are GET, POST, PUT, PATCH",
                    method_name
                ))
            })?;

        Ok(Self {
            method,
            path_with_query: path_with_query.to_string(),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_with_query(&self) -> &str {
        &self.path_with_query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_addresses() {
        let target = HttpPublishTarget::parse("PATCH:/x/{{thing:namespace}}/{{thing:name}}").unwrap();
        assert_eq!(target.method(), &Method::PATCH);
        assert_eq!(target.path_with_query(), "/x/{{thing:namespace}}/{{thing:name}}");

        assert!(HttpPublishTarget::parse("POST:events").is_ok());
        assert!(HttpPublishTarget::parse("GET:foo").is_ok());
        // An empty path is allowed; the connection URI supplies the base.
        assert!(HttpPublishTarget::parse("POST:").is_ok());
        assert!(HttpPublishTarget::parse("PUT:events#{{topic:full}}").is_ok());
        assert!(HttpPublishTarget::parse("POST:ditto?{{header:x}}").is_ok());
    }

    #[test]
    fn test_parse_rejects_empty_address() {
        assert!(HttpPublishTarget::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_method() {
        assert!(HttpPublishTarget::parse("events").is_err());
    }

    #[test]
    fn test_parse_rejects_delete() {
        let err = HttpPublishTarget::parse("DELETE:/bar").unwrap_err();
        assert!(matches!(
            err,
            ConnectivityError::ConnectionConfigurationInvalid(_)
        ));
    }
}
