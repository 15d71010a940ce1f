//! Captured request/response data stored in a chapter.

use crate::attractor::{AttractorError, AttractorGroup, Fingerprint};
use hyper::Uri;
use serde::{Deserialize, Serialize};

/// A captured request. Headers keep their original order and duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

impl RequestSnapshot {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Parsed URL. Accepts both absolute and origin-form (`/path?query`) URLs.
    pub fn uri(&self) -> Option<Uri> {
        self.url.parse::<Uri>().ok()
    }

    pub fn path(&self) -> String {
        self.uri()
            .map(|uri| uri.path().to_string())
            .unwrap_or_default()
    }

    pub fn query(&self) -> Option<String> {
        self.uri().and_then(|uri| uri.query().map(str::to_string))
    }

    /// The URL when it names a scheme and host.
    pub fn absolute_url(&self) -> Option<Uri> {
        self.uri().filter(is_absolute)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let uri = self.uri();
        Fingerprint::for_method(
            &self.method,
            uri.as_ref().map(Uri::path).unwrap_or_default(),
            uri.as_ref().and_then(Uri::query),
            Some(self.body.as_str()),
        )
    }

    /// A group matching this request literally (path, query pairs, body catch-all).
    pub fn derive_attractors(&self) -> Result<AttractorGroup, AttractorError> {
        let uri = self.uri();
        AttractorGroup::from_request(
            &self.method,
            uri.as_ref().map(Uri::path).unwrap_or_default(),
            uri.as_ref().and_then(Uri::query),
        )
    }

    /// Copy of this request addressed to `base` with the original path and query.
    pub fn rehost(&self, base: &Uri) -> Self {
        let path_and_query = self
            .uri()
            .and_then(|uri| uri.path_and_query().map(|pq| pq.as_str().to_string()))
            .unwrap_or_else(|| "/".to_string());
        let base = base.to_string();
        Self {
            url: format!("{}{}", base.trim_end_matches('/'), path_and_query),
            ..self.clone()
        }
    }
}

/// A captured (or hand-authored) response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    #[serde(default = "default_code")]
    pub code: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

fn default_code() -> u16 {
    200
}

impl Default for ResponseSnapshot {
    fn default() -> Self {
        Self {
            code: default_code(),
            headers: Vec::new(),
            body: String::new(),
        }
    }
}

impl ResponseSnapshot {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

pub(crate) fn is_absolute(uri: &Uri) -> bool {
    uri.scheme().is_some() && uri.authority().is_some()
}
