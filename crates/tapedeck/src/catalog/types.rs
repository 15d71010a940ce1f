//! Resolution outcomes, catalog options and errors.

use crate::attractor::{AttractorError, MatchScore};
use crate::config::Config;
use crate::executor::ExecutorError;
use crate::tape::{Interaction, RequestSnapshot, ResponseSnapshot, TapeError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// An intercepted request as seen by the catalog.
pub type IncomingRequest = RequestSnapshot;

/// Resolution phase that produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Replay a stored chapter.
    Replay,
    /// Record a new chapter into an existing writable tape.
    Record,
    /// Create a new tape and record into it.
    Create,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Replay => "replay",
            Tier::Record => "record",
            Tier::Create => "create",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
    Found,
    NotFound,
    Conflict,
}

impl ResolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveStatus::Found => "found",
            ResolveStatus::NotFound => "not_found",
            ResolveStatus::Conflict => "conflict",
        }
    }
}

/// Outcome of [`Catalog::resolve`](super::Catalog::resolve).
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: ResolveStatus,
    pub tier: Tier,
    /// Tape that answered (or was created).
    pub tape: Option<String>,
    pub interaction: Option<Arc<Interaction>>,
    pub response: Option<ResponseSnapshot>,
    /// Upstream failure folded into the outcome.
    pub error: Option<ExecutorError>,
    pub score: Option<MatchScore>,
    /// Names of the tied candidates for a conflict.
    pub conflicts: Vec<String>,
}

impl Resolution {
    pub(crate) fn new(status: ResolveStatus, tier: Tier) -> Self {
        Self {
            status,
            tier,
            tape: None,
            interaction: None,
            response: None,
            error: None,
            score: None,
            conflicts: Vec::new(),
        }
    }

    pub(crate) fn conflict(tier: Tier, conflicts: Vec<String>, score: MatchScore) -> Self {
        Self {
            conflicts,
            score: Some(score),
            ..Self::new(ResolveStatus::Conflict, tier)
        }
    }

    pub fn is_found(&self) -> bool {
        self.status == ResolveStatus::Found
    }

    pub fn is_conflict(&self) -> bool {
        self.status == ResolveStatus::Conflict
    }
}

/// Runtime settings the catalog needs.
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub tape_root: PathBuf,
    pub upstream_timeout: Duration,
    pub persist_in_background: bool,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CatalogOptions {
    fn from(config: &Config) -> Self {
        Self {
            tape_root: config.storage.tape_root.clone(),
            upstream_timeout: config.upstream.timeout(),
            persist_in_background: config.recording.persist_in_background,
        }
    }
}

/// Errors from administrative catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Tape '{0}' not found")]
    TapeNotFound(String),
    #[error("Tape '{0}' already exists")]
    TapeExists(String),
    #[error("Chapter '{chapter}' not found in tape '{tape}'")]
    ChapterNotFound { tape: String, chapter: String },
    #[error("Invalid mock directive: {0}")]
    InvalidDirective(String),
    #[error(transparent)]
    Attractor(#[from] AttractorError),
    #[error(transparent)]
    Persistence(#[from] TapeError),
}
