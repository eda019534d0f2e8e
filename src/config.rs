// src/config.rs

//! Manages server configuration: loading, resolving size values, and validation.

use crate::core::hub::HubConfig;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Timeouts and limits applied to every WebSocket connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// A connection with no inbound frame for this long is closed.
    #[serde(default = "default_read_deadline", with = "humantime_serde")]
    pub read_deadline: Duration,
    /// Upper bound on a single frame write.
    #[serde(default = "default_write_timeout", with = "humantime_serde")]
    pub write_timeout: Duration,
    /// Transport-level ping period. Must be shorter than `read_deadline`.
    #[serde(default = "default_ping_interval", with = "humantime_serde")]
    pub ping_interval: Duration,
    /// Upper bound on the HTTP upgrade handshake.
    #[serde(default = "default_handshake_timeout", with = "humantime_serde")]
    pub handshake_timeout: Duration,
    /// Largest inbound message accepted, in bytes. Resolved from `max_message_size`.
    #[serde(skip, default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_read_deadline() -> Duration {
    Duration::from_secs(60)
}
fn default_write_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_ping_interval() -> Duration {
    Duration::from_secs(54)
}
fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_max_message_size() -> usize {
    64 * 1024
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_deadline: default_read_deadline(),
            write_timeout: default_write_timeout(),
            ping_interval: default_ping_interval(),
            handshake_timeout: default_handshake_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// Settings for the live results service itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LiveConfig {
    /// Period of the statistics broadcast sent while clients are connected. `0s` disables it.
    #[serde(default = "default_periodic_broadcast_interval", with = "humantime_serde")]
    pub periodic_broadcast_interval: Duration,
}

fn default_periodic_broadcast_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            periodic_broadcast_interval: default_periodic_broadcast_interval(),
        }
    }
}

/// HTTP API layout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Prefix for every route, e.g. `/v1`.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

fn default_base_path() -> String {
    "/v1".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// A size given either as a plain byte count or as a string with a unit.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum SizeConfig {
    Bytes(usize),
    String(String),
}

/// The `[connection]` section as written in the file, before size resolution.
#[derive(Deserialize)]
struct RawConnectionConfig {
    #[serde(default = "default_read_deadline", with = "humantime_serde")]
    read_deadline: Duration,
    #[serde(default = "default_write_timeout", with = "humantime_serde")]
    write_timeout: Duration,
    #[serde(default = "default_ping_interval", with = "humantime_serde")]
    ping_interval: Duration,
    #[serde(default = "default_handshake_timeout", with = "humantime_serde")]
    handshake_timeout: Duration,
    #[serde(default)]
    max_message_size: Option<SizeConfig>,
}

impl Default for RawConnectionConfig {
    fn default() -> Self {
        Self {
            read_deadline: default_read_deadline(),
            write_timeout: default_write_timeout(),
            ping_interval: default_ping_interval(),
            handshake_timeout: default_handshake_timeout(),
            max_message_size: None,
        }
    }
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default)]
    api: ApiConfig,
    #[serde(default)]
    hub: HubConfig,
    #[serde(default)]
    connection: RawConnectionConfig,
    #[serde(default)]
    live: LiveConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}

/// Represents the final, validated, and resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Upgrades beyond this many connected clients are refused.
    pub max_clients: usize,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            api: ApiConfig::default(),
            hub: HubConfig::default(),
            connection: ConnectionConfig::default(),
            live: LiveConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses, resolves, and validates configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse configuration TOML")?;

        let max_message_size = match raw_config.connection.max_message_size {
            Some(size) => resolve_size(size)?,
            None => default_max_message_size(),
        };

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            api: raw_config.api,
            hub: raw_config.hub,
            connection: ConnectionConfig {
                read_deadline: raw_config.connection.read_deadline,
                write_timeout: raw_config.connection.write_timeout,
                ping_interval: raw_config.connection.ping_interval,
                handshake_timeout: raw_config.connection.handshake_timeout,
                max_message_size,
            },
            live: raw_config.live,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if !self.api.base_path.is_empty() && !self.api.base_path.starts_with('/') {
            return Err(anyhow!("api.base_path must start with '/'"));
        }

        if self.hub.broadcast_queue_capacity == 0 {
            return Err(anyhow!("hub.broadcast_queue_capacity cannot be 0"));
        }
        if self.hub.session_queue_capacity == 0 {
            return Err(anyhow!("hub.session_queue_capacity cannot be 0"));
        }
        if self.hub.heartbeat_interval.is_zero() {
            return Err(anyhow!("hub.heartbeat_interval cannot be 0"));
        }
        if self.hub.stale_threshold <= self.hub.heartbeat_interval {
            return Err(anyhow!(
                "hub.stale_threshold must be greater than hub.heartbeat_interval"
            ));
        }

        if self.connection.read_deadline.is_zero() {
            return Err(anyhow!("connection.read_deadline cannot be 0"));
        }
        if self.connection.ping_interval.is_zero()
            || self.connection.ping_interval >= self.connection.read_deadline
        {
            return Err(anyhow!(
                "connection.ping_interval must be non-zero and shorter than connection.read_deadline"
            ));
        }
        if self.connection.write_timeout.is_zero() {
            return Err(anyhow!("connection.write_timeout cannot be 0"));
        }
        if self.connection.handshake_timeout.is_zero() {
            return Err(anyhow!("connection.handshake_timeout cannot be 0"));
        }
        if self.connection.max_message_size == 0 {
            return Err(anyhow!("connection.max_message_size cannot be 0"));
        }
        if self.connection.max_message_size < 1024 {
            warn!(
                "low connection.max_message_size setting: {} bytes. Control messages may be rejected.",
                self.connection.max_message_size
            );
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}

/// Resolves a `SizeConfig` into a byte count.
fn resolve_size(cfg: SizeConfig) -> Result<usize> {
    match cfg {
        SizeConfig::Bytes(b) => Ok(b),
        SizeConfig::String(s) => {
            let s_lower = s.trim().to_lowercase();
            if let Some(val_str) = s_lower.strip_suffix("mib") {
                parse_size_string(&s, val_str, 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix("mb") {
                parse_size_string(&s, val_str, 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix('m') {
                parse_size_string(&s, val_str, 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix("kib") {
                parse_size_string(&s, val_str, 1024)
            } else if let Some(val_str) = s_lower.strip_suffix("kb") {
                parse_size_string(&s, val_str, 1024)
            } else if let Some(val_str) = s_lower.strip_suffix('k') {
                parse_size_string(&s, val_str, 1024)
            } else {
                s_lower.parse().with_context(|| {
                    format!(
                        "Invalid size value '{s}'. Must be a number (bytes) or have a unit (e.g., '64KiB')."
                    )
                })
            }
        }
    }
}

/// Parses a string number with a unit and applies a multiplier.
fn parse_size_string(original_str: &str, value_str: &str, multiplier: u64) -> Result<usize> {
    let value: u64 = value_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in size value: '{original_str}'"))?;
    let result_u64 = value.saturating_mul(multiplier);
    if result_u64 > (usize::MAX as u64) {
        return Err(anyhow!(
            "size value '{}' is too large for this system's architecture",
            original_str
        ));
    }
    Ok(result_u64 as usize)
}
