use crate::error::{ConnectivityError, ConnectivityResult};

/// Apply a pipeline function stage such as `fn:upper()` to the value produced
/// by the preceding stage.
///
/// A stage receives `None` when the preceding stage could not resolve;
/// `fn:default(...)` is the only function producing a value from `None`.
pub fn apply(stage: &str, input: Option<String>) -> ConnectivityResult<Option<String>> {
    let stage = stage.trim();
    let body = stage.strip_prefix("fn:").ok_or_else(|| {
        ConnectivityError::unresolved(format!(
            "The pipeline stage <{}> is not a function",
            stage
        ))
    })?;

    let (name, params) = match body.find('(') {
        Some(open) => (&body[..open], &body[open..]),
        None => (body, ""),
    };

    match name {
        "upper" => {
            require_empty_signature(name, params)?;
            Ok(input.map(|value| value.to_uppercase()))
        }
        "lower" => {
            require_empty_signature(name, params)?;
            Ok(input.map(|value| value.to_lowercase()))
        }
        "default" => {
            let fallback = parse_single_string_parameter(name, params)?;
            Ok(input.or(Some(fallback)))
        }
        other => Err(ConnectivityError::unresolved(format!(
            "The function <fn:{}> is unknown",
            other
        ))),
    }
}

fn require_empty_signature(name: &str, params: &str) -> ConnectivityResult<()> {
    if params.trim() == "()" {
        Ok(())
    } else {
        Err(ConnectivityError::PlaceholderFunctionSignatureInvalid(
            format!(
                "The function <fn:{}> accepts no parameters, but the signature was <{}>",
                name, params
            ),
        ))
    }
}

fn parse_single_string_parameter(name: &str, params: &str) -> ConnectivityResult<String> {
    let inner = params
        .trim()
        .strip_prefix('(')
        .and_then(|p| p.strip_suffix(')'))
        .map(str::trim)
        .ok_or_else(|| signature_invalid(name, params))?;

    let unquoted = inner
        .strip_prefix('\'')
        .and_then(|p| p.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|p| p.strip_suffix('"')))
        .ok_or_else(|| signature_invalid(name, params))?;

    Ok(unquoted.to_string())
}

fn signature_invalid(name: &str, params: &str) -> ConnectivityError {
    ConnectivityError::PlaceholderFunctionSignatureInvalid(format!(
        "The function <fn:{}> requires a single string parameter, but the signature was <{}>",
        name, params
    ))
}
