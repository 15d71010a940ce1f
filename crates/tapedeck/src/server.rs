//! Intercept server.
//!
//! Accepts the traffic under test, hands every request to
//! [`Catalog::resolve`] and writes the resolution back as an HTTP response.

use crate::admin_api::types::{build_response_with_headers, error_response};
use crate::catalog::{Catalog, IncomingRequest, Resolution, ResolveStatus};
use crate::executor::ExecutorError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Header naming the resolution tier that answered.
pub const TIER_HEADER: &str = "x-tapedeck-tier";
/// Header naming the tape that answered.
pub const TAPE_HEADER: &str = "x-tapedeck-tape";

/// Response headers recomputed for the outgoing body.
const SKIPPED_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

pub struct InterceptServer {
    addr: SocketAddr,
    catalog: Arc<Catalog>,
}

impl InterceptServer {
    pub fn new(addr: SocketAddr, catalog: Arc<Catalog>) -> Self {
        Self { addr, catalog }
    }

    /// Bind and serve until the task is dropped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Tapedeck intercepting on http://{}", listener.local_addr()?);

        loop {
            let (stream, remote) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let catalog = Arc::clone(&self.catalog);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let catalog = Arc::clone(&catalog);
                    async move { handle_request(req, catalog).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Intercept connection from {} closed: {}", remote, e);
                }
            });
        }
    }
}

/// Resolve one intercepted request.
pub async fn handle_request(
    req: Request<Incoming>,
    catalog: Arc<Catalog>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let request = IncomingRequest {
        method: parts.method.as_str().to_string(),
        url: parts.uri.to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };

    debug!("Intercepted {} {}", request.method, request.url);
    let resolution = catalog.resolve(request).await;
    Ok(resolution_response(&resolution))
}

/// Map a resolution onto the HTTP response sent to the client.
///
/// A captured response is returned as is. Otherwise: conflict is 409, an
/// upstream failure is 502 (504 on timeout), and anything else is 404.
pub fn resolution_response(resolution: &Resolution) -> Response<Full<Bytes>> {
    let mut response = match (&resolution.response, &resolution.error) {
        (Some(captured), _) => {
            let status =
                StatusCode::from_u16(captured.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let headers = captured
                .headers
                .iter()
                .filter(|(k, _)| !SKIPPED_HEADERS.iter().any(|s| k.eq_ignore_ascii_case(s)))
                .map(|(k, v)| (k.as_str(), v.as_str()));
            build_response_with_headers(status, headers, captured.body.clone())
        }
        (None, _) if resolution.status == ResolveStatus::Conflict => error_response(
            StatusCode::CONFLICT,
            &format!(
                "Ambiguous match between: {}",
                resolution.conflicts.join(", ")
            ),
        ),
        (None, Some(e @ ExecutorError::Timeout(_))) => {
            error_response(StatusCode::GATEWAY_TIMEOUT, &e.to_string())
        }
        (None, Some(e)) => error_response(StatusCode::BAD_GATEWAY, &e.to_string()),
        (None, None) => error_response(StatusCode::NOT_FOUND, "No matching interaction"),
    };

    let headers = response.headers_mut();
    headers.insert(TIER_HEADER, HeaderValue::from_static(resolution.tier.as_str()));
    if let Some(tape) = resolution
        .tape
        .as_deref()
        .and_then(|t| HeaderValue::from_str(t).ok())
    {
        headers.insert(TAPE_HEADER, tape);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attractor::MatchScore;
    use crate::catalog::Tier;
    use crate::tape::ResponseSnapshot;
    use std::time::Duration;

    #[test]
    fn test_replayed_response() {
        let mut resolution = Resolution::new(ResolveStatus::Found, Tier::Replay);
        resolution.tape = Some("orders".into());
        resolution.response = Some(
            ResponseSnapshot::new(201)
                .with_header("content-type", "application/json")
                .with_header("Content-Length", "999")
                .with_body("{}"),
        );

        let resp = resolution_response(&resolution);
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers().get("content-type").unwrap(), "application/json");
        assert!(resp.headers().get("content-length").is_none());
        assert_eq!(resp.headers().get(TIER_HEADER).unwrap(), "replay");
        assert_eq!(resp.headers().get(TAPE_HEADER).unwrap(), "orders");
    }

    #[test]
    fn test_conflict_is_409() {
        let resolution = Resolution::conflict(
            Tier::Replay,
            vec!["a".into(), "b".into()],
            MatchScore::empty(),
        );
        assert_eq!(resolution_response(&resolution).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_upstream_failures() {
        let mut resolution = Resolution::new(ResolveStatus::NotFound, Tier::Create);
        resolution.error = Some(ExecutorError::Transport("refused".into()));
        let resp = resolution_response(&resolution);
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(resp.headers().get(TIER_HEADER).unwrap(), "create");

        resolution.error = Some(ExecutorError::Timeout(Duration::from_millis(50)));
        assert_eq!(
            resolution_response(&resolution).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_not_found_without_response() {
        let resolution = Resolution::new(ResolveStatus::NotFound, Tier::Create);
        assert_eq!(resolution_response(&resolution).status(), StatusCode::NOT_FOUND);
    }
}
