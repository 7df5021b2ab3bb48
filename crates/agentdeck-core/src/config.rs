//! Manager configuration

use crate::error::{Error, Result};
use crate::types::{AgentDescriptor, LaunchMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Tunables for discovery and process supervision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Hard timeout for a single candidate's version check
    pub version_timeout_ms: u64,
    /// Argument passed to candidates to query their version
    pub version_arg: String,
    /// Max version checks in flight at once
    pub discovery_concurrency: usize,
    /// Look for agents among npm global packages
    pub scan_npm_global: bool,
    /// Searched after the process PATH
    pub extra_search_dirs: Vec<PathBuf>,
    /// Wait after the graceful stop request before force-killing
    pub stop_grace_ms: u64,
    /// Max wait for output readers once the process has exited
    pub output_drain_ms: u64,
    /// Delivery mode for free text sent to the active agent
    pub default_mode: LaunchMode,
    /// User-added agents, verified at startup
    pub custom_agents: Vec<AgentDescriptor>,
    /// Registered when discovery finds nothing usable
    pub fallback_agent: AgentDescriptor,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            version_timeout_ms: 3_000,
            version_arg: "--version".to_string(),
            discovery_concurrency: 8,
            scan_npm_global: true,
            extra_search_dirs: Vec::new(),
            stop_grace_ms: 2_000,
            output_drain_ms: 2_000,
            default_mode: LaunchMode::Session,
            custom_agents: Vec::new(),
            fallback_agent: AgentDescriptor::fallback(),
        }
    }
}

impl ManagerConfig {
    /// Default config file location: `<config dir>/agentdeck/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("agentdeck").join("config.json"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file {:?} not found, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn version_timeout(&self) -> Duration {
        Duration::from_millis(self.version_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn output_drain(&self) -> Duration {
        Duration::from_millis(self.output_drain_ms)
    }
}
