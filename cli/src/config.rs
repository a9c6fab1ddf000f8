// Configuration management for the onionbot CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/onionbot/config.json
// - Linux: ~/.config/onionbot/config.json
// - Windows: %APPDATA%\onionbot\config.json

use anyhow::{Context, Result};
use onionbot_core::{ControlConfig, ControlKind, TorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tor executable to launch
    pub tor_binary: String,

    /// Tor state directory (defaults to <data dir>/tor)
    pub data_dir: Option<String>,

    /// Control-port file poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// External daemon settings; unset means launch our own
    pub control_address: Option<String>,
    pub control_type: ControlKind,
    pub control_password: Option<String>,

    /// SOCKS proxy override
    pub proxy_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let tor = TorConfig::default();
        Self {
            tor_binary: tor.tor_binary.display().to_string(),
            data_dir: None,
            poll_interval_ms: tor.poll_interval_ms,
            control_address: None,
            control_type: ControlKind::default(),
            control_password: None,
            proxy_address: None,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("onionbot");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("onionbot");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value in memory; call `save` to persist
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |value: &str| {
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        };

        match key {
            "tor_binary" => {
                if value.is_empty() {
                    anyhow::bail!("tor_binary cannot be empty");
                }
                self.tor_binary = value.to_string();
            }
            "data_dir" => self.data_dir = optional(value),
            "poll_interval_ms" => {
                let interval: u64 = value.parse().context("Invalid number")?;
                if interval == 0 {
                    anyhow::bail!("poll_interval_ms must be positive");
                }
                self.poll_interval_ms = interval;
            }
            "control_address" => self.control_address = optional(value),
            "control_type" => {
                self.control_type = value.parse().context("Invalid control type")?;
            }
            "control_password" => self.control_password = optional(value),
            "proxy_address" => self.proxy_address = optional(value),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "tor_binary" => Some(self.tor_binary.clone()),
            "data_dir" => self.data_dir.clone(),
            "poll_interval_ms" => Some(self.poll_interval_ms.to_string()),
            "control_address" => self.control_address.clone(),
            "control_type" => Some(self.control_type.to_string()),
            "control_password" => self.control_password.as_ref().map(|_| "********".to_string()),
            "proxy_address" => self.proxy_address.clone(),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let or_auto = |value: &Option<String>| value.clone().unwrap_or_else(|| "(auto)".to_string());
        vec![
            ("tor_binary".to_string(), self.tor_binary.clone()),
            ("data_dir".to_string(), or_auto(&self.data_dir)),
            ("poll_interval_ms".to_string(), format!("{}ms", self.poll_interval_ms)),
            (
                "control_address".to_string(),
                self.control_address
                    .clone()
                    .unwrap_or_else(|| "(managed)".to_string()),
            ),
            ("control_type".to_string(), self.control_type.to_string()),
            (
                "control_password".to_string(),
                self.get("control_password")
                    .unwrap_or_else(|| "(none)".to_string()),
            ),
            ("proxy_address".to_string(), or_auto(&self.proxy_address)),
        ]
    }

    /// Build the core Tor configuration, resolving the state directory
    /// under `default_data_dir` when none is configured
    pub fn tor_config(&self, default_data_dir: &Path) -> TorConfig {
        let data_dir = self
            .data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir.join("tor"));

        let control = self.control_address.as_ref().map(|address| ControlConfig {
            address: address.clone(),
            kind: self.control_type,
            password: self.control_password.clone().unwrap_or_default(),
        });

        TorConfig {
            data_dir,
            tor_binary: PathBuf::from(&self.tor_binary),
            poll_interval_ms: self.poll_interval_ms,
            control,
            proxy_address: self.proxy_address.clone(),
        }
    }
}
