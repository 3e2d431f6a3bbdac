//! Guest error translation.
//!
//! Runner scripts throw whatever they like. [`translate`] is the single
//! place where a raw guest error value becomes a typed [`SandboxError`];
//! it never fails, it only degrades to [`SandboxError::Named`].

use serde_json::Value;

use crate::error::SandboxError;

/// Name used when the guest error carries none.
pub const DEFAULT_ERROR_NAME: &str = "RunnerError";

/// Map a guest error value (already converted to JSON) onto the host taxonomy.
pub fn translate(error: &Value) -> SandboxError {
    let name = error.get("name").and_then(Value::as_str);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);

    match name {
        Some("NetworkError") => SandboxError::NetworkError {
            message: message.unwrap_or_else(|| "network request failed".into()),
            body: response_body(error),
        },
        Some("CloudflareError") => SandboxError::CloudflareProtected {
            resolution_url: error
                .get("resolutionURL")
                .or_else(|| error.get("url"))
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        _ => SandboxError::Named {
            name: name.unwrap_or(DEFAULT_ERROR_NAME).to_string(),
            message: message.unwrap_or_else(|| describe(error)),
        },
    }
}

fn response_body(error: &Value) -> Option<String> {
    let response = error.get("response")?;
    let body = response.get("body").or_else(|| response.get("data"))?;
    match body {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// String form of an error value without a usable `message`.
fn describe(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Null => "unknown error".into(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cloudflare_error() {
        let err = translate(&json!({ "name": "CloudflareError", "resolutionURL": "https://x" }));
        match err {
            SandboxError::CloudflareProtected { resolution_url } => {
                assert_eq!(resolution_url.as_deref(), Some("https://x"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cloudflare_without_url() {
        assert!(matches!(
            translate(&json!({ "name": "CloudflareError" })),
            SandboxError::CloudflareProtected { resolution_url: None }
        ));
    }

    #[test]
    fn network_error_with_body_and_data() {
        match translate(&json!({ "name": "NetworkError", "message": "404", "response": { "body": "nope" } })) {
            SandboxError::NetworkError { message, body } => {
                assert_eq!(message, "404");
                assert_eq!(body.as_deref(), Some("nope"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        match translate(&json!({ "name": "NetworkError", "response": { "data": { "e": 1 } } })) {
            SandboxError::NetworkError { body, .. } => assert_eq!(body.as_deref(), Some("{\"e\":1}")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn named_error() {
        match translate(&json!({ "name": "Boom", "message": "oops" })) {
            SandboxError::Named { name, message } => {
                assert_eq!(name, "Boom");
                assert_eq!(message, "oops");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bare_string() {
        match translate(&json!("something broke")) {
            SandboxError::Named { name, message } => {
                assert_eq!(name, DEFAULT_ERROR_NAME);
                assert_eq!(message, "something broke");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn odd_shapes_never_fail() {
        for value in [json!(null), json!(42), json!([1, 2]), json!({ "name": 7 }), json!({})] {
            assert!(matches!(translate(&value), SandboxError::Named { .. }));
        }
    }
}
