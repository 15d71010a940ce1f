//! Route dispatch for the Admin API.

use crate::admin_api::handlers::{mock, system, tapes};
use crate::admin_api::types::not_found;
use crate::catalog::Catalog;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Parsed route for tape-specific endpoints
#[derive(Debug, PartialEq, Eq)]
enum TapeRoute {
    /// GET/DELETE /tapes/:name
    Root(String),
    /// POST /tapes/:name/save
    Save(String),
    /// DELETE /tapes/:name/chapters/:chapter
    Chapter(String, String),
}

impl TapeRoute {
    /// Parse route from path segments after `/tapes/`. Segments are
    /// percent-decoded.
    fn parse(segments: &[&str]) -> Option<Self> {
        let decoded: Vec<String> = segments.iter().map(|s| decode(s)).collect();
        match decoded.as_slice() {
            [name] if !name.is_empty() => Some(TapeRoute::Root(name.clone())),
            [name, save] if save == "save" => Some(TapeRoute::Save(name.clone())),
            [name, chapters, chapter] if chapters == "chapters" => {
                Some(TapeRoute::Chapter(name.clone(), chapter.clone()))
            }
            _ => None,
        }
    }
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Extract base URL from request headers for links
fn get_base_url(req: &Request<Incoming>) -> String {
    req.headers()
        .get("host")
        .and_then(|host| host.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_else(|| "http://localhost:2525".to_string())
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    catalog: Arc<Catalog>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let base_url = get_base_url(&req);

    debug!("Admin API: {} {}", method, path);

    Ok(route_by_path(&method, &path, req, &base_url, catalog).await)
}

async fn route_by_path(
    method: &Method,
    path: &str,
    req: Request<Incoming>,
    base_url: &str,
    catalog: Arc<Catalog>,
) -> Response<Full<Bytes>> {
    match (method, path.trim_end_matches('/')) {
        (&Method::GET, "") => return system::handle_root(base_url, &catalog),
        (&Method::GET, "/health") => return system::handle_health(&catalog),
        (&Method::GET, "/metrics") => return system::handle_metrics(),
        (&Method::POST, "/reload") => return system::handle_reload(catalog).await,
        (&Method::PUT, "/mock") => return mock::handle_put(req, catalog).await,
        (&Method::GET, "/tapes") => return tapes::handle_list(&catalog),
        (&Method::POST, "/tapes") => return tapes::handle_create(req, &catalog).await,
        _ => {}
    }

    let Some(rest) = path.strip_prefix("/tapes/") else {
        return not_found();
    };
    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
    let Some(route) = TapeRoute::parse(&segments) else {
        return not_found();
    };

    match (method, route) {
        (&Method::GET, TapeRoute::Root(name)) => tapes::handle_get(&name, &catalog),
        (&Method::DELETE, TapeRoute::Root(name)) => tapes::handle_delete(&name, &catalog),
        (&Method::POST, TapeRoute::Save(name)) => tapes::handle_save(name, catalog).await,
        (&Method::DELETE, TapeRoute::Chapter(name, chapter)) => {
            tapes::handle_delete_chapter(&name, &chapter, &catalog)
        }
        _ => not_found(),
    }
}
