//! Configuration types and loading
//!
//! Config path precedence: CLI `--config` > `CONFIG_PATH` env var >
//! `inspect-gateway.toml`. Bot credentials never live in the TOML;
//! the config only points at the credential file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bot_pool::WaitMode;
use gc_session::backoff::BackoffConfig;
use gc_session::session::SessionConfig;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Path to the JSON credential file (one record per bot).
    pub credentials_file: PathBuf,
    pub gateway: GatewayConfig,
    pub coordinator: CoordinatorConfig,
}

/// HTTP boundary settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub on_saturation: SaturationPolicy,
}

/// What a request gets when every bot session is occupied.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// Queue for a session until the request deadline.
    #[default]
    Block,
    /// Answer 503 immediately.
    FailFast,
}

impl SaturationPolicy {
    pub fn wait_mode(self) -> WaitMode {
        match self {
            SaturationPolicy::Block => WaitMode::Block,
            SaturationPolicy::FailFast => WaitMode::FailFast,
        }
    }
}

/// Game-coordinator connection settings
#[derive(Debug, Deserialize)]
pub struct CoordinatorConfig {
    /// `host:port` of the coordinator entry point.
    pub addr: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    256
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_backoff_base() -> u64 {
    1
}

fn default_backoff_cap() -> u64 {
    60
}

impl Config {
    /// Load and validate the TOML configuration.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if config.gateway.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.gateway.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.coordinator.addr.is_empty() {
            return Err(common::Error::Config(
                "coordinator addr must not be empty".into(),
            ));
        }
        if config.coordinator.connect_timeout_secs == 0 {
            return Err(common::Error::Config(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.coordinator.backoff_base_secs > config.coordinator.backoff_cap_secs {
            return Err(common::Error::Config(
                "backoff_base_secs must not exceed backoff_cap_secs".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("inspect-gateway.toml")
    }

    /// Per-session connection settings derived from the coordinator block.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            coordinator_addr: self.coordinator.addr.clone(),
            connect_timeout: Duration::from_secs(self.coordinator.connect_timeout_secs),
            backoff: BackoffConfig {
                base: Duration::from_secs(self.coordinator.backoff_base_secs),
                cap: Duration::from_secs(self.coordinator.backoff_cap_secs),
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.request_timeout_secs)
    }
}
