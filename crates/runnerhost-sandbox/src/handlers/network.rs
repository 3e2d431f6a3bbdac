//! Network channel: a generic request descriptor executed by the host's
//! [`HttpClient`](crate::http::HttpClient).

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{HostServices, invalid_request};
use crate::codec;
use crate::error::{Result, SandboxError};
use crate::http::HttpRequest;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, alias = "params")]
    pub query_params: Option<Map<String, Value>>,
    /// A string is sent as-is; any other JSON value is sent as JSON text.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: Option<Map<String, Value>>,
    #[serde(default)]
    pub cookies: Option<Vec<Cookie>>,
    /// Seconds. Values that are not a positive, representable duration fall
    /// back to the host default.
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Accepted but not acted upon; retrying is left to the guest.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

pub async fn handle(services: &HostServices, payload: Value) -> Result<Value> {
    let request: NetworkRequest = codec::decode_value(payload).map_err(invalid_request)?;
    if let Some(retries) = request.max_retries {
        debug!(runner = services.runner_id(), max_retries = retries, "maxRetries is not acted upon");
    }

    let http_request = build_request(request, services.request_timeout())?;
    let url = http_request.url.to_string();
    debug!(runner = services.runner_id(), method = %http_request.method, %url, "network request");

    let response = services.http().execute(http_request).await?;
    Ok(json!({
        "url": url,
        "status": response.status,
        "headers": response.headers,
        "body": response.body,
    }))
}

/// Resolve a guest descriptor into a concrete [`HttpRequest`].
pub fn build_request(request: NetworkRequest, default_timeout: Duration) -> Result<HttpRequest> {
    let mut url = url::Url::parse(&request.url).map_err(|e| SandboxError::InvalidRequest {
        reason: format!("invalid url `{}`: {e}", request.url),
    })?;

    if let Some(params) = &request.query_params {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        pairs.append_pair(name, &scalar(name, item)?);
                    }
                }
                other => {
                    pairs.append_pair(name, &scalar(name, other)?);
                }
            }
        }
    }

    let mut headers: Vec<(String, String)> = Vec::new();
    for (name, value) in request.headers.iter().flatten() {
        if !value.is_null() {
            headers.push((name.clone(), scalar(name, value)?));
        }
    }

    let body = match request.body {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.into_bytes()),
        Some(value) => {
            if !has_header(&headers, "content-type") {
                headers.push(("Content-Type".into(), "application/json".into()));
            }
            Some(codec::encode(&value)?.into_bytes())
        }
    };

    if let Some(cookies) = request.cookies.filter(|c| !c.is_empty()) {
        let jar = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        match headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case("cookie")) {
            Some((_, existing)) => {
                existing.push_str("; ");
                existing.push_str(&jar);
            }
            None => headers.push(("Cookie".into(), jar)),
        }
    }

    let timeout = match request.timeout {
        None => default_timeout,
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => {
                debug!(timeout = secs, "unusable request timeout, using the default");
                default_timeout
            }
        },
    };

    Ok(HttpRequest {
        method: request.method.unwrap_or_else(|| "GET".into()).to_uppercase(),
        url,
        headers,
        body,
        timeout,
    })
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

fn scalar(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(SandboxError::InvalidRequest {
            reason: format!("`{name}` must be a string, number or boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use crate::testing::RecordingHttp;
    use std::sync::Arc;

    fn descriptor(value: Value) -> NetworkRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn builds_query_headers_and_cookies() {
        let request = build_request(
            descriptor(json!({
                "url": "https://example.org/search?x=1",
                "method": "post",
                "params": { "q": "one piece", "page": 2, "tag": ["a", "b"], "skip": null },
                "headers": { "Referer": "https://example.org", "Cookie": "sid=1" },
                "cookies": [{ "name": "cf", "value": "ok" }],
                "timeout": 2.5
            })),
            Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(
            request.url.as_str(),
            "https://example.org/search?x=1&page=2&q=one+piece&tag=a&tag=b"
        );
        assert!(request.headers.contains(&("Cookie".into(), "sid=1; cf=ok".into())));
        assert_eq!(request.timeout, Duration::from_millis(2500));
        assert!(request.body.is_none());
    }

    #[test]
    fn object_body_is_json() {
        let request = build_request(
            descriptor(json!({ "url": "https://example.org", "body": { "a": [1] } })),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(request.body.as_deref(), Some(&b"{\"a\":[1]}"[..]));
        assert!(has_header(&request.headers, "content-type"));
        assert_eq!(request.timeout, Duration::from_secs(30));
        assert_eq!(request.method, "GET");
    }

    #[test]
    fn string_body_is_raw() {
        let request = build_request(
            descriptor(json!({ "url": "https://example.org", "body": "a=1&b=2" })),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(request.body.as_deref(), Some(&b"a=1&b=2"[..]));
        assert!(!has_header(&request.headers, "content-type"));
    }

    #[test]
    fn scalar_body_is_json_text() {
        for (body, text) in [(json!(42), "42"), (json!(true), "true"), (json!(1.5), "1.5")] {
            let request = build_request(
                descriptor(json!({ "url": "https://example.org", "method": "POST", "body": body })),
                Duration::from_secs(30),
            )
            .unwrap();
            assert_eq!(request.body.as_deref(), Some(text.as_bytes()));
            assert!(has_header(&request.headers, "content-type"));
        }
    }

    #[test]
    fn unusable_timeouts_fall_back_to_default() {
        let default = Duration::from_secs(30);
        for secs in [1e30, f64::MAX, -1.0, 0.0] {
            let request = build_request(
                descriptor(json!({ "url": "https://example.org", "timeout": secs })),
                default,
            )
            .unwrap();
            assert_eq!(request.timeout, default, "timeout {secs}");
        }
    }

    #[test]
    fn bad_url_is_invalid_request() {
        assert!(matches!(
            build_request(descriptor(json!({ "url": "not a url" })), Duration::from_secs(1)),
            Err(SandboxError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn executes_once_even_with_max_retries() {
        let http = Arc::new(RecordingHttp::new().respond(HttpResponse {
            status: 503,
            headers: Default::default(),
            body: "busy".into(),
        }));
        let services = HostServices::ephemeral("r", http.clone());

        let response = handle(
            &services,
            json!({ "url": "https://example.org/a", "maxRetries": 5 }),
        )
        .await
        .unwrap();

        assert_eq!(response["status"], 503);
        assert_eq!(response["body"], "busy");
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn missing_url_is_invalid_request() {
        let services = HostServices::ephemeral("r", Arc::new(RecordingHttp::new()));
        assert!(matches!(
            handle(&services, json!({ "method": "GET" })).await,
            Err(SandboxError::InvalidRequest { .. })
        ));
    }
}
