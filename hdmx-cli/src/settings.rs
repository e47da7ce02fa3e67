//! Persisted CLI settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use hdmx_driver::{DeviceConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Saved devices and timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Configured matrices by name
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
    /// Seconds between reconciliation passes in `watch`
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Transport timing overrides
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            devices: BTreeMap::new(),
            poll_interval_secs: default_poll_interval(),
            transport: TransportConfig::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for hdmx
    /// Uses $XDG_CONFIG_HOME/hdmx on Linux/macOS, falls back to ~/.config/hdmx
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("hdmx"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("hdmx"))
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from `path`
    ///
    /// A missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!("No settings at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Ignoring corrupt settings at {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save settings to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;

        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Poll interval as a duration, never zero
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Look up a device by name
    pub fn device(&self, name: &str) -> Result<&DeviceConfig> {
        self.devices
            .get(name)
            .with_context(|| format!("No device named {:?}; see `hdmx list`", name))
    }
}
