use crate::quickconnect::types::{Protocol, TunnelMode};
use crate::session::Settings;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_DISCOVERY_DOMAIN: &str = "quickconnect.to";

/// Transport tunables shared by the API client and QuickConnect resolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Used for every API call that does not carry its own timeout
    pub request_timeout_secs: u64,
    /// Timeout of a single ping-pong probe against a candidate address
    pub probe_timeout_secs: u64,
    /// QuickConnect discovery domain (`global.<domain>` serves the site list)
    pub discovery_domain: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            discovery_domain: DEFAULT_DISCOVERY_DOMAIN.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// On-disk configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    pub settings: Settings,
    pub client: ClientConfig,
    /// When set, the base URL is discovered through QuickConnect instead
    pub quick_connect_id: Option<String>,
    pub protocol: Protocol,
    pub tunnel: TunnelMode,
}

/// Get the config directory path
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quickdsm")
}

pub fn default_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Load the config file. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        log::info!("Config file not found at {}, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: ConfigFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}
