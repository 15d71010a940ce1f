//! Tape storage and recording configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Directory holding tape files (searched recursively on load)
    #[serde(default = "default_tape_root")]
    pub tape_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tape_root: default_tape_root(),
        }
    }
}

fn default_tape_root() -> PathBuf {
    PathBuf::from("tapes")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    /// Save tapes touched by record/create resolutions on a blocking task
    /// instead of before responding.
    #[serde(default = "default_persist_in_background")]
    pub persist_in_background: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            persist_in_background: default_persist_in_background(),
        }
    }
}

fn default_persist_in_background() -> bool {
    true
}
