//! Request/response bodies and response helpers for the Admin API.

use crate::attractor::AttractorGroup;
use crate::catalog::CatalogError;
use crate::tape::Tape;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tape summary for list responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TapeSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_url: Option<String>,
    pub writable: bool,
    pub chapters: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub saved: bool,
}

impl From<&Tape> for TapeSummary {
    fn from(tape: &Tape) -> Self {
        Self {
            name: tape.name().to_string(),
            routing_url: tape.routing_url().map(str::to_string),
            writable: tape.is_writable(),
            chapters: tape.len(),
            file: tape.file().map(|p| p.to_path_buf()),
            saved: tape.file_exists(),
        }
    }
}

/// Response for listing tapes
#[derive(Debug, Serialize)]
pub struct ListTapesResponse {
    pub tapes: Vec<TapeSummary>,
}

/// Request to create a tape
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTapeRequest {
    pub tape_name: String,
    #[serde(default)]
    pub routing_url: Option<String>,
    #[serde(default)]
    pub attractors: Option<AttractorGroup>,
    #[serde(default)]
    pub read_only: bool,
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

/// Individual error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

// =============================================================================
// Response helper functions
// =============================================================================

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build a plain-text response.
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    build_response_with_headers(status, [("Content-Type", "text/plain; charset=utf-8")], body)
}

/// Build an HTTP response with headers.
///
/// Falls back to a bare 500 if the builder rejects a header.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

/// Create a not found response
pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Map a catalog error onto a status code.
pub fn catalog_error_response(error: &CatalogError) -> Response<Full<Bytes>> {
    let status = match error {
        CatalogError::TapeNotFound(_) | CatalogError::ChapterNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        CatalogError::TapeExists(_) => StatusCode::CONFLICT,
        CatalogError::InvalidDirective(_) | CatalogError::Attractor(_) => StatusCode::BAD_REQUEST,
        CatalogError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &error.to_string())
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_format() {
        let resp = error_response(StatusCode::BAD_REQUEST, "Test error");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_catalog_error_status() {
        let cases = [
            (CatalogError::TapeNotFound("a".into()), StatusCode::NOT_FOUND),
            (CatalogError::TapeExists("a".into()), StatusCode::CONFLICT),
            (
                CatalogError::InvalidDirective("no mock headers".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(catalog_error_response(&error).status(), status);
        }
    }

    #[test]
    fn test_create_tape_request_defaults() {
        let request: CreateTapeRequest =
            serde_json::from_str(r#"{"tapeName": "orders"}"#).unwrap();
        assert_eq!(request.tape_name, "orders");
        assert!(request.routing_url.is_none());
        assert!(!request.read_only);
    }

    #[test]
    fn test_tape_summary() {
        let tape = Tape::builder()
            .name("orders")
            .routing_url(Some("http://orders.local".into()))
            .writable(false)
            .build();
        let summary = TapeSummary::from(&tape);
        assert_eq!(summary.name, "orders");
        assert!(!summary.writable);
        assert_eq!(summary.chapters, 0);
        assert!(summary.file.is_none());
        assert!(!summary.saved);
    }

    #[test]
    fn test_not_found_response() {
        assert_eq!(not_found().status(), StatusCode::NOT_FOUND);
    }
}
