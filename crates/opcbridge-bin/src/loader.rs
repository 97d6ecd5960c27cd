// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading for the opcbridge binary.
//!
//! Files are YAML or TOML, chosen by extension. Environment variables with
//! the `OPCBRIDGE_` prefix override file values; nested keys are separated
//! by a double underscore and `node_ids` takes a comma-separated list.
//!
//! ```text
//! OPCBRIDGE_CONNECTOR__ENDPOINT=opc.tcp://plc:4840
//! OPCBRIDGE_CONNECTOR__NODE_IDS=ns=3;s=Basic,ns=3;s=Special
//! OPCBRIDGE_RUNNER__READ_TIMEOUT=5s
//! ```
//!
//! # Example file
//!
//! ```yaml
//! connector:
//!   endpoint: opc.tcp://localhost:50000
//!   node_ids: ["ns=3;s=Basic"]
//!   subscribe_enabled: true
//!   use_heartbeat: true
//! runner:
//!   read_timeout: 2s
//!   reconnect_delay: 5s
//!   poll_interval: 1s
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use opcbridge_opcua::ConnectorConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BinError, BinResult};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "OPCBRIDGE";

// =============================================================================
// Schema
// =============================================================================

/// Top-level binary configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Connector settings.
    pub connector: ConnectorConfig,

    /// Acquisition loop settings.
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Settings of the acquisition loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Deadline of each `read_batch` call.
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Pause before reconnecting after the session is lost.
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Pause between reads in poll mode.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Stop after this many batches. Unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batches: Option<u64>,

    /// Skip empty batches in the output.
    #[serde(default = "default_true")]
    pub skip_empty: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            read_timeout: default_read_timeout(),
            reconnect_delay: default_reconnect_delay(),
            poll_interval: default_poll_interval(),
            max_batches: None,
            skip_empty: true,
        }
    }
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_true() -> bool {
    true
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML (`.yaml`, `.yml`).
    Yaml,
    /// TOML (`.toml`).
    Toml,
}

impl ConfigFormat {
    /// Detects the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    fn file_format(self) -> FileFormat {
        match self {
            Self::Yaml => FileFormat::Yaml,
            Self::Toml => FileFormat::Toml,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("connector.node_ids")
        .try_parsing(true)
}

fn finish(config: Config) -> BinResult<BridgeConfig> {
    let bridge: BridgeConfig = config.try_deserialize()?;
    bridge
        .connector
        .validate()
        .map_err(|e| BinError::config(e.to_string()))?;
    if bridge.runner.read_timeout.is_zero() {
        return Err(BinError::config("runner.read_timeout must be greater than 0"));
    }
    debug!(
        endpoint = %bridge.connector.endpoint,
        seeds = bridge.connector.node_ids.len(),
        subscribe = bridge.connector.subscribe_enabled,
        heartbeat = bridge.connector.use_heartbeat,
        "Configuration loaded"
    );
    Ok(bridge)
}

/// Loads and validates a config file, applying environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> BinResult<BridgeConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BinError::config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }
    let format = ConfigFormat::from_path(path).ok_or_else(|| {
        BinError::config(format!(
            "Unsupported configuration format: {} (expected .yaml, .yml or .toml)",
            path.display()
        ))
    })?;

    info!(path = %path.display(), "Loading configuration");
    let config = Config::builder()
        .add_source(File::from(path).format(format.file_format()))
        .add_source(environment())
        .build()?;
    finish(config)
}

/// Loads and validates configuration from a string, without environment
/// overrides.
pub fn load_config_str(content: &str, format: ConfigFormat) -> BinResult<BridgeConfig> {
    let config = Config::builder()
        .add_source(File::from_str(content, format.file_format()))
        .build()?;
    finish(config)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
connector:
  endpoint: opc.tcp://localhost:50000
  node_ids:
    - ns=3;s=Basic
    - ns=3;s=Special
  subscribe_enabled: true
  use_heartbeat: true
  heartbeat_interval: 500ms
  queue_capacity: 64
runner:
  read_timeout: 3s
  max_batches: 10
"#;

    const TOML: &str = r#"
[connector]
endpoint = "opc.tcp://localhost:4840"
node_ids = ["ns=2;i=1001"]
security_mode = "SignAndEncrypt"
security_policy = "Basic256Sha256"
username = "operator"
password = "secret"
"#;

    fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml_file() {
        let file = write_temp(YAML, ".yaml");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.connector.endpoint, "opc.tcp://localhost:50000");
        assert_eq!(config.connector.node_ids, ["ns=3;s=Basic", "ns=3;s=Special"]);
        assert!(config.connector.subscribe_enabled);
        assert_eq!(config.connector.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(config.connector.queue_capacity, 64);
        assert_eq!(config.runner.read_timeout, Duration::from_secs(3));
        assert_eq!(config.runner.max_batches, Some(10));
        assert_eq!(config.runner.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_load_toml_file() {
        let file = write_temp(TOML, ".toml");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.connector.username, "operator");
        assert_eq!(config.connector.password, "secret");
        assert!(!config.connector.security_mode.is_none());
        assert_eq!(config.runner, RunnerConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/nonexistent/opcbridge.yaml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(YAML, ".ini");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported configuration format"));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let content = "connector:\n  endpoint: http://localhost:4840\n";
        let err = load_config_str(content, ConfigFormat::Yaml).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("opc.tcp://"));
    }

    #[test]
    fn test_defaults_applied() {
        let content = "connector:\n  endpoint: opc.tcp://localhost:4840\n";
        let config = load_config_str(content, ConfigFormat::Yaml).unwrap();
        assert!(config.connector.node_ids.is_empty());
        assert!(!config.connector.subscribe_enabled);
        assert_eq!(config.connector.heartbeat_node_id, "i=2258");
        assert!(config.runner.skip_empty);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.TOML")), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), None);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), None);
    }
}
