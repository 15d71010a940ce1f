//! Tape management handlers.

use crate::admin_api::types::*;
use crate::catalog::Catalog;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info};

/// GET /tapes - List all tapes
pub fn handle_list(catalog: &Catalog) -> Response<Full<Bytes>> {
    let tapes = catalog
        .tapes()
        .iter()
        .map(|tape| TapeSummary::from(tape.as_ref()))
        .collect();
    json_response(StatusCode::OK, &ListTapesResponse { tapes })
}

/// GET /tapes/:name - Full tape document, including in-memory chapters
pub fn handle_get(name: &str, catalog: &Catalog) -> Response<Full<Bytes>> {
    match catalog.tape(name) {
        Some(tape) => json_response(StatusCode::OK, &tape.to_document(false)),
        None => tape_not_found(name),
    }
}

/// POST /tapes - Create a new tape
pub async fn handle_create(req: Request<Incoming>, catalog: &Catalog) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    let request: CreateTapeRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid tape JSON: {e}"))
        }
    };
    if request.tape_name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "tapeName must not be empty");
    }

    match catalog.create_tape(
        request.tape_name.trim(),
        request.routing_url,
        request.attractors,
        !request.read_only,
    ) {
        Ok(tape) => {
            info!("Created tape '{}' via admin API", tape.name());
            json_response(StatusCode::CREATED, &TapeSummary::from(tape.as_ref()))
        }
        Err(e) => catalog_error_response(&e),
    }
}

/// DELETE /tapes/:name - Remove a tape from memory
pub fn handle_delete(name: &str, catalog: &Catalog) -> Response<Full<Bytes>> {
    match catalog.remove_tape(name) {
        Ok(tape) => json_response(StatusCode::OK, &TapeSummary::from(tape.as_ref())),
        Err(e) => catalog_error_response(&e),
    }
}

/// DELETE /tapes/:name/chapters/:chapter - Remove one chapter
pub fn handle_delete_chapter(name: &str, chapter: &str, catalog: &Catalog) -> Response<Full<Bytes>> {
    match catalog.remove_chapter(name, chapter) {
        Ok(()) => json_response(
            StatusCode::OK,
            &serde_json::json!({"tape": name, "removed": chapter}),
        ),
        Err(e) => catalog_error_response(&e),
    }
}

/// POST /tapes/:name/save - Persist a tape now
pub async fn handle_save(name: String, catalog: Arc<Catalog>) -> Response<Full<Bytes>> {
    let saved = tokio::task::spawn_blocking(move || {
        let result = catalog.save_tape(&name);
        (name, result)
    })
    .await;

    match saved {
        Ok((name, Ok(path))) => json_response(
            StatusCode::OK,
            &serde_json::json!({"tape": name, "file": path}),
        ),
        Ok((_, Err(e))) => catalog_error_response(&e),
        Err(e) => {
            error!("Save task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Save failed")
        }
    }
}

fn tape_not_found(name: &str) -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, &format!("Tape '{name}' not found"))
}
