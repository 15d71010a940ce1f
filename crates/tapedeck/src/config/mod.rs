//! Configuration types for tapedeck.

mod listen;
mod storage;
mod upstream;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use listen::{AdminConfig, ListenConfig};
pub use storage::{RecordingConfig, StorageConfig};
pub use upstream::UpstreamConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Intercept listener
    #[serde(default)]
    pub listen: ListenConfig,
    /// Admin API listener
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.upstream.timeout_ms == 0 {
            anyhow::bail!("upstream.timeoutMs must be greater than 0");
        }

        self.listen.socket_addr()?;

        if self.admin.enabled {
            self.admin.socket_addr()?;
            if self.admin.port == self.listen.port && self.admin.host == self.listen.host {
                anyhow::bail!(
                    "Admin API and intercept listener cannot share {}:{}",
                    self.listen.host,
                    self.listen.port
                );
            }
        }

        if self.storage.tape_root.as_os_str().is_empty() {
            anyhow::bail!("storage.tapeRoot must not be empty");
        }

        Ok(())
    }
}
