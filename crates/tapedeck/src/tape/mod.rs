//! Tapes and their chapters.
//!
//! - `Tape`: a named container of chapters with default attractors, an
//!   upstream URL and a write policy
//! - `Interaction`: one chapter with its attractors, captured request,
//!   optional response and use-state counter
//! - `TapeFile`: the on-disk document
//!
//! Tapes are saved on demand. Only always/disabled chapters are written;
//! limited and exhausted chapters live for the process lifetime only.

mod container;
mod file;
mod interaction;
mod snapshot;

pub use container::{json_file_name, Tape, TapeBuilder};
pub use file::{InteractionFile, TapeFile};
pub use interaction::{Interaction, UseState, USES_ALWAYS, USES_DISABLED};
pub use snapshot::{RequestSnapshot, ResponseSnapshot};

use crate::attractor::AttractorGroup;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum TapeError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode tape {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode tape: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Tape '{0}' has no backing file")]
    NoBackingFile(String),
}

/// Capabilities the catalog needs from a tape.
pub trait TapeOps: Send + Sync {
    fn name(&self) -> &str;

    /// Whether new chapters may be recorded into this tape.
    fn is_writable(&self) -> bool;

    /// Chapters currently eligible for replay.
    fn active_chapters(&self) -> Vec<Arc<Interaction>>;

    /// Default attractors deciding whether a request belongs to this tape.
    fn match_rule(&self) -> Option<&AttractorGroup>;

    /// Append a new chapter and return the shared handle.
    fn record(&self, chapter: Interaction) -> Arc<Interaction>;
}
