//! Upstream forwarding.
//!
//! The catalog never talks to the network directly; it hands requests to an
//! [`Executor`]. [`HttpExecutor`] is the reqwest-backed implementation used by
//! the server.

use crate::tape::{RequestSnapshot, ResponseSnapshot};
use async_trait::async_trait;
use hyper::Uri;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Forwarding failures. These become part of a resolution outcome.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("No upstream route for '{0}'")]
    NoRoute(String),
    #[error("Invalid upstream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid method '{0}'")]
    InvalidMethod(String),
    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),
    #[error("Upstream transport error: {0}")]
    Transport(String),
}

impl ExecutorError {
    /// Metrics label for this failure.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutorError::NoRoute(_) => "no_route",
            ExecutorError::InvalidUrl { .. } | ExecutorError::InvalidMethod(_) => "invalid",
            ExecutorError::Timeout(_) => "timeout",
            ExecutorError::Transport(_) => "error",
        }
    }
}

/// A request on its way upstream. `url` must be absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl From<&RequestSnapshot> for ForwardRequest {
    fn from(request: &RequestSnapshot) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: Some(request.body.clone()).filter(|b| !b.is_empty()),
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn forward(
        &self,
        request: ForwardRequest,
        timeout: Duration,
    ) -> Result<ResponseSnapshot, ExecutorError>;
}

/// Forwards requests with a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(connect_timeout: Duration) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Headers that are recomputed for the upstream connection.
fn is_hop_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length")
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn forward(
        &self,
        request: ForwardRequest,
        timeout: Duration,
    ) -> Result<ResponseSnapshot, ExecutorError> {
        let uri: Uri = request.url.parse().map_err(|e: hyper::http::uri::InvalidUri| {
            ExecutorError::InvalidUrl {
                url: request.url.clone(),
                reason: e.to_string(),
            }
        })?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ExecutorError::NoRoute(request.url));
        }

        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| ExecutorError::InvalidMethod(request.method.clone()))?;

        debug!("Forwarding {} {}", method, request.url);

        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (key, value) in &request.headers {
            if !is_hop_header(key) {
                builder = builder.header(key, value);
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ExecutorError::Timeout(timeout)
            } else {
                ExecutorError::Transport(e.to_string())
            }
        })?;

        let code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ExecutorError::Timeout(timeout)
            } else {
                ExecutorError::Transport(e.to_string())
            }
        })?;

        Ok(ResponseSnapshot {
            code,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_request_from_snapshot() {
        let snapshot = RequestSnapshot::new("GET", "http://up/a").with_header("accept", "*/*");
        let request = ForwardRequest::from(&snapshot);
        assert_eq!(request.method, "GET");
        assert!(request.body.is_none());

        let snapshot = snapshot.with_body("{}");
        assert_eq!(ForwardRequest::from(&snapshot).body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_hop_headers() {
        assert!(is_hop_header("Host"));
        assert!(is_hop_header("content-length"));
        assert!(!is_hop_header("accept"));
    }

    #[tokio::test]
    async fn test_relative_url_has_no_route() {
        let executor = HttpExecutor::new(Duration::from_secs(1)).unwrap();
        let request = ForwardRequest {
            method: "GET".into(),
            url: "/orders".into(),
            headers: vec![],
            body: None,
        };
        let err = executor
            .forward(request, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::NoRoute(_)));
        assert_eq!(err.label(), "no_route");
    }

    #[tokio::test]
    async fn test_invalid_method() {
        let executor = HttpExecutor::new(Duration::from_secs(1)).unwrap();
        let request = ForwardRequest {
            method: "BAD METHOD".into(),
            url: "http://127.0.0.1:1/".into(),
            headers: vec![],
            body: None,
        };
        let err = executor
            .forward(request, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidMethod(_)));
    }

    #[tokio::test]
    async fn test_forward_against_local_server() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.ends_with(b"\r\n\r\n{}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            assert!(!String::from_utf8_lossy(&received).contains("ignored"));
            socket
                .write_all(b"HTTP/1.1 201 Created\r\nx-up: yes\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                .await
                .unwrap();
        });

        let executor = HttpExecutor::new(Duration::from_secs(2)).unwrap();
        let response = executor
            .forward(
                ForwardRequest {
                    method: "POST".into(),
                    url: format!("http://{addr}/items"),
                    headers: vec![("host".into(), "ignored".into())],
                    body: Some("{}".into()),
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(response.code, 201);
        assert_eq!(response.body, "ok");
        assert!(response.headers.iter().any(|(k, v)| k == "x-up" && v == "yes"));
    }
}
