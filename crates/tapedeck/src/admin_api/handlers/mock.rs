//! PUT /mock - the mock-directive protocol.

use crate::admin_api::directives::parse_mock_directives;
use crate::admin_api::types::*;
use crate::catalog::Catalog;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info};

/// PUT /mock - Create or update a mock from `mock*` headers
pub async fn handle_put(req: Request<Incoming>, catalog: Arc<Catalog>) -> Response<Full<Bytes>> {
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();

    let body = match collect_body(req).await {
        Ok(b) => String::from_utf8_lossy(&b).into_owned(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    apply(&headers, body, catalog).await
}

/// Parse and apply directives. Split from the hyper plumbing for testing.
pub(crate) async fn apply(
    headers: &[(String, String)],
    body: String,
    catalog: Arc<Catalog>,
) -> Response<Full<Bytes>> {
    let directives = match parse_mock_directives(
        headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        Some(body),
    ) {
        Ok(d) => d,
        Err(e) => return catalog_error_response(&e),
    };

    match tokio::task::spawn_blocking(move || catalog.put_mock(directives)).await {
        Ok(Ok(outcome)) => {
            let message = outcome.message();
            info!("{}", message);
            let status = if outcome.created() {
                StatusCode::CREATED
            } else {
                StatusCode::FOUND
            };
            text_response(status, message)
        }
        Ok(Err(e)) => catalog_error_response(&e),
        Err(e) => {
            error!("Mock task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Mock update failed")
        }
    }
}
