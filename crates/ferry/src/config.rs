use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::forwarder::ChannelPair;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for one control request. `stop` waits for the running
    /// cycle to wind down, so keep this comfortably above a forward call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    300
}

// ============================================================================
// GatewayConfig
// ============================================================================

/// How to launch the session gateway program.
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command: default_gateway_command(),
            args: Vec::new(),
            workdir: None,
        }
    }
}

fn default_gateway_command() -> String {
    "ferry-gateway".to_string()
}

// ============================================================================
// ForwardingConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardingConfig {
    /// Pause after each delivered unit.
    #[serde(default = "default_send_interval")]
    pub send_interval_seconds: u64,
    /// Pairs used by `--autostart`. The HTTP API can replace them.
    #[serde(default)]
    pub pairs: Vec<ChannelPair>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            send_interval_seconds: default_send_interval(),
            pairs: Vec::new(),
        }
    }
}

pub(crate) fn default_send_interval() -> u64 {
    30
}

// ============================================================================
// LoggingConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// Also append log lines to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================
