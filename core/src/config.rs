// Tor configuration for the bot core
//
// With no `control` section the bot spawns and manages its own Tor daemon
// inside `data_dir`. A pre-supplied `control` section points the bot at an
// externally managed daemon instead. `proxy_address` overrides the SOCKS
// listener discovered over the control port in either case.

use crate::error::BotError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default control port of a system Tor daemon
pub const DEFAULT_CONTROL_ADDRESS: &str = "127.0.0.1:9051";

/// How the control port is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    /// TCP over IPv4
    #[default]
    Tcp4,
    /// Unix domain socket
    Unix,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKind::Tcp4 => write!(f, "tcp4"),
            ControlKind::Unix => write!(f, "unix"),
        }
    }
}

impl FromStr for ControlKind {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp4" | "tcp" => Ok(ControlKind::Tcp4),
            "unix" => Ok(ControlKind::Unix),
            other => Err(BotError::Config(format!("unknown control type: {}", other))),
        }
    }
}

/// Connection details for an externally managed daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Control port address (`host:port`) or socket path
    #[serde(default = "default_control_address")]
    pub address: String,

    #[serde(default)]
    pub kind: ControlKind,

    /// Plaintext control password
    #[serde(default)]
    pub password: String,
}

fn default_control_address() -> String {
    DEFAULT_CONTROL_ADDRESS.to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: default_control_address(),
            kind: ControlKind::default(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorConfig {
    /// Directory the managed daemon keeps its state in
    pub data_dir: PathBuf,

    /// Tor executable to launch
    pub tor_binary: PathBuf,

    /// How often to check for the control-port file, in milliseconds
    pub poll_interval_ms: u64,

    /// Use this daemon instead of spawning one
    pub control: Option<ControlConfig>,

    /// SOCKS proxy address, skipping discovery
    pub proxy_address: Option<String>,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("tor-data"),
            tor_binary: PathBuf::from("tor"),
            poll_interval_ms: 1000,
            control: None,
            proxy_address: None,
        }
    }
}

impl TorConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Whether the bot should launch its own daemon
    pub fn manages_daemon(&self) -> bool {
        self.control.is_none()
    }

    pub fn validate(&self) -> Result<(), BotError> {
        if self.poll_interval_ms == 0 {
            return Err(BotError::Config("poll_interval_ms must be positive".to_string()));
        }
        if let Some(control) = &self.control {
            if control.address.trim().is_empty() {
                return Err(BotError::Config("control address is empty".to_string()));
            }
        }
        if let Some(proxy) = &self.proxy_address {
            if proxy.trim().is_empty() {
                return Err(BotError::Config("proxy address is empty".to_string()));
            }
        }
        Ok(())
    }
}
