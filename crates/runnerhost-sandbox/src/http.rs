//! HTTP collaborator used by the network channel.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};

/// A fully resolved outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: url::Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Lower-cased names; repeated headers are joined with `, `.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute once. No retries; the timeout is enforced by the client.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpClient`] on top of `reqwest`.
///
/// The body is read chunk by chunk, so dropping the future aborts the
/// transfer at the next chunk boundary, and reading stops at
/// `max_response_bytes`.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl ReqwestClient {
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SandboxError::Engine(format!("http client setup failed: {e}")))?;
        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes()).map_err(|_| {
            SandboxError::InvalidRequest {
                reason: format!("unsupported HTTP method `{}`", request.method),
            }
        })?;

        let mut builder = self
            .client
            .request(method, request.url.clone())
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| SandboxError::InvalidRequest {
                reason: format!("invalid header name `{name}`: {e}"),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| SandboxError::InvalidRequest {
                reason: format!("invalid value for header `{name}`: {e}"),
            })?;
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| transport_error(&request.url, e))?;
        let status = response.status().as_u16();

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&request.url, e))?;
            let room = self.max_response_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if chunk.len() > room {
                debug!(url = %request.url, limit = self.max_response_bytes, "response body truncated");
                break;
            }
        }

        debug!(
            url = %request.url,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = body.len(),
            "http request completed"
        );

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

fn transport_error(url: &url::Url, err: reqwest::Error) -> SandboxError {
    let message = if err.is_timeout() {
        format!("request to {url} timed out")
    } else {
        format!("request to {url} failed: {err}")
    };
    SandboxError::NetworkError { message, body: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering with `response`; yields the raw request.
    async fn serve_once(response: &'static str) -> (url::Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&raw) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}/path?q=1").parse().unwrap(), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= end + 4 + length
    }

    fn request(url: url::Url) -> HttpRequest {
        HttpRequest {
            method: "post".into(),
            url,
            headers: vec![("X-Runner".into(), "demo".into())],
            body: Some(b"{\"a\":1}".to_vec()),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn sends_headers_and_reads_body() {
        let (url, server) = serve_once(
            "HTTP/1.1 201 Created\r\nContent-Length: 5\r\nX-Test: yes\r\nConnection: close\r\n\r\nhello",
        )
        .await;
        let client = ReqwestClient::new(&SandboxConfig::default()).unwrap();

        let response = client.execute(request(url)).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, "hello");
        assert_eq!(response.headers.get("x-test").map(String::as_str), Some("yes"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /path?q=1 HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("x-runner: demo"));
        assert!(raw.ends_with("{\"a\":1}"));
    }

    #[tokio::test]
    async fn body_is_capped() {
        let (url, _server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n0123456789",
        )
        .await;
        let client = ReqwestClient::new(&SandboxConfig::default().with_max_response_bytes(4)).unwrap();
        let response = client.execute(request(url)).await.unwrap();
        assert_eq!(response.body, "0123");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url: url::Url = format!("http://{}/slow", listener.local_addr().unwrap()).parse().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // Hold the connection open without answering.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = ReqwestClient::new(&SandboxConfig::default()).unwrap();
        let mut req = request(url);
        req.timeout = Duration::from_millis(200);

        let started = Instant::now();
        let err = tokio::time::timeout(Duration::from_secs(5), client.execute(req))
            .await
            .expect("client timeout was not enforced")
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(3));
        match err {
            SandboxError::NetworkError { message, body: None } => assert!(message.contains("timed out"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url: url::Url = format!("http://{}/", listener.local_addr().unwrap()).parse().unwrap();
        drop(listener);

        let client = ReqwestClient::new(&SandboxConfig::default()).unwrap();
        let err = client.execute(request(url)).await.unwrap_err();
        assert!(matches!(err, SandboxError::NetworkError { body: None, .. }));
    }

    #[tokio::test]
    async fn bad_header_rejected_before_sending() {
        let client = ReqwestClient::new(&SandboxConfig::default()).unwrap();
        let mut req = request("http://127.0.0.1:9/".parse().unwrap());
        req.headers.push(("bad header".into(), "x".into()));
        assert!(matches!(
            client.execute(req).await,
            Err(SandboxError::InvalidRequest { .. })
        ));
    }
}
