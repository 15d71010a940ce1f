//! System handlers: root, health, metrics, reload.

use crate::admin_api::types::*;
use crate::catalog::Catalog;
use crate::metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info};

/// GET / - Root endpoint
pub fn handle_root(base_url: &str, catalog: &Catalog) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "name": "tapedeck",
        "version": env!("CARGO_PKG_VERSION"),
        "tapes": catalog.len(),
        "_links": {
            "tapes": {"href": format!("{}/tapes", base_url)},
            "mock": {"href": format!("{}/mock", base_url)},
            "metrics": {"href": format!("{}/metrics", base_url)}
        }
    });
    json_response(StatusCode::OK, &body)
}

/// GET /health - Health check
pub fn handle_health(catalog: &Catalog) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({"status": "ok", "tapes": catalog.len()}),
    )
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics::collect_metrics(),
    )
}

/// POST /reload - Reload every tape from the tape root
pub async fn handle_reload(catalog: Arc<Catalog>) -> Response<Full<Bytes>> {
    match tokio::task::spawn_blocking(move || catalog.reload()).await {
        Ok(count) => {
            info!("Catalog reloaded via admin API ({} tapes)", count);
            json_response(StatusCode::OK, &serde_json::json!({"tapes": count}))
        }
        Err(e) => {
            error!("Reload task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Reload failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogOptions;
    use crate::executor::HttpExecutor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn catalog(root: &std::path::Path) -> Arc<Catalog> {
        let executor = HttpExecutor::new(Duration::from_secs(1)).unwrap();
        Arc::new(Catalog::new(
            CatalogOptions {
                tape_root: root.to_path_buf(),
                ..CatalogOptions::default()
            },
            Arc::new(executor),
        ))
    }

    #[test]
    fn test_handle_root() {
        let dir = TempDir::new().unwrap();
        let resp = handle_root("http://localhost:2525", &catalog(dir.path()));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_handle_health() {
        let dir = TempDir::new().unwrap();
        let resp = handle_health(&catalog(dir.path()));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_handle_metrics() {
        let resp = handle_metrics();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn test_handle_reload() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"tapeName": "a"}"#).unwrap();
        let catalog = catalog(dir.path());
        let resp = handle_reload(Arc::clone(&catalog)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(catalog.len(), 1);
    }
}
