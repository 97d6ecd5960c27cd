// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connector configuration.
//!
//! # Examples
//!
//! ```
//! use opcbridge_opcua::config::ConnectorConfig;
//!
//! let config = ConnectorConfig::builder()
//!     .endpoint("opc.tcp://localhost:50000")
//!     .node_ids(["ns=3;s=Basic"])
//!     .subscribe_enabled(true)
//!     .build()
//!     .unwrap();
//!
//! assert!(config.subscribe_enabled);
//! assert_eq!(config.heartbeat_upper_bound().as_secs(), 10);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaError};
use crate::types::{Credentials, NodeId, SecurityMode, SecurityPolicy};

/// Default heartbeat node: Server_ServerStatus_CurrentTime.
pub const DEFAULT_HEARTBEAT_NODE: &str = "i=2258";

// =============================================================================
// ConnectorConfig
// =============================================================================

/// Configuration of one connector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Server endpoint URL (e.g., "opc.tcp://localhost:4840").
    pub endpoint: String,

    /// User name. Empty selects anonymous authentication.
    #[serde(default)]
    pub username: String,

    /// Password for `username`.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Security mode.
    #[serde(default, alias = "securityMode")]
    pub security_mode: SecurityMode,

    /// Security policy.
    #[serde(default, alias = "securityPolicy")]
    pub security_policy: SecurityPolicy,

    /// Seed node specifiers. Empty browses from the Objects folder.
    #[serde(default, alias = "nodeIDs", alias = "nodeIds")]
    pub node_ids: Vec<String>,

    /// Use subscription mode instead of poll mode.
    #[serde(default, alias = "subscribeEnabled")]
    pub subscribe_enabled: bool,

    /// Enable the heartbeat watchdog.
    #[serde(default, alias = "useHeartbeat")]
    pub use_heartbeat: bool,

    /// Node whose updates prove the session alive.
    #[serde(default = "default_heartbeat_node", alias = "heartbeatNodeId")]
    pub heartbeat_node_id: String,

    /// Number of missed intervals tolerated before the session is failed.
    #[serde(default = "default_heartbeat_multiplier", alias = "heartbeatStaleMultiplier")]
    pub heartbeat_stale_multiplier: u32,

    /// Expected update interval of the heartbeat node.
    #[serde(default = "default_heartbeat_interval", alias = "heartbeatInterval")]
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Also browse into and acquire property nodes.
    #[serde(default, alias = "browseProperties")]
    pub browse_properties: bool,

    /// Subscription publishing interval.
    #[serde(default = "default_publishing_interval", alias = "publishingInterval")]
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Monitored item sampling interval.
    #[serde(default = "default_sampling_interval", alias = "samplingInterval")]
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Capacity of the notification queue between delivery and `read_batch`.
    #[serde(default = "default_queue_capacity", alias = "queueCapacity")]
    pub queue_capacity: usize,

    /// Connection timeout.
    #[serde(default = "default_connect_timeout", alias = "connectTimeout")]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Session timeout requested from the server.
    #[serde(default = "default_session_timeout", alias = "sessionTimeout")]
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Maximum browse depth below each seed.
    #[serde(default = "default_max_browse_depth", alias = "maxBrowseDepth")]
    pub max_browse_depth: usize,

    /// Application name presented to the server.
    #[serde(default = "default_application_name", alias = "applicationName")]
    pub application_name: String,

    /// Application URI.
    #[serde(default, alias = "applicationUri", skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,

    /// PKI directory for client and trusted server certificates.
    #[serde(default, alias = "pkiDir", skip_serializing_if = "Option::is_none")]
    pub pki_dir: Option<String>,

    /// Trust any server certificate (for testing only).
    #[serde(default, alias = "trustServerCerts")]
    pub trust_server_certs: bool,
}

fn default_heartbeat_node() -> String {
    DEFAULT_HEARTBEAT_NODE.to_string()
}

fn default_heartbeat_multiplier() -> u32 {
    10
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_publishing_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_browse_depth() -> usize {
    25
}

fn default_application_name() -> String {
    "opcbridge".to_string()
}

impl ConnectorConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ConnectorConfigBuilder {
        ConnectorConfigBuilder::default()
    }

    /// Creates a configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), OpcUaError> {
        if self.endpoint.is_empty() {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_endpoint(
                &self.endpoint,
                "Endpoint is required",
            )));
        }

        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_endpoint(
                &self.endpoint,
                "Endpoint must start with opc.tcp://",
            )));
        }

        if self.security_mode.is_none() != self.security_policy.is_none() {
            return Err(OpcUaError::configuration(ConfigurationError::security_mismatch(
                self.security_mode,
                self.security_policy,
            )));
        }

        if self.publishing_interval.is_zero() {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "publishing_interval",
                "must be greater than 0",
            )));
        }

        if self.queue_capacity == 0 {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "queue_capacity",
                "must be greater than 0",
            )));
        }

        if self.use_heartbeat {
            if self.heartbeat_stale_multiplier < 2 {
                return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                    "heartbeat_stale_multiplier",
                    "must be at least 2",
                )));
            }
            if self.heartbeat_interval.is_zero() {
                return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                    "heartbeat_interval",
                    "must be greater than 0",
                )));
            }
            self.heartbeat_node()?;
        }

        Ok(())
    }

    /// Parses the configured heartbeat node.
    pub fn heartbeat_node(&self) -> Result<NodeId, OpcUaError> {
        if self.heartbeat_node_id.trim().is_empty() {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "heartbeat_node_id",
                "required when the heartbeat is enabled",
            )));
        }
        self.heartbeat_node_id.parse().map_err(|e| {
            OpcUaError::configuration(ConfigurationError::invalid_value(
                "heartbeat_node_id",
                format!("{}", e),
            ))
        })
    }

    /// Staleness bound: multiplier times the expected interval.
    pub fn heartbeat_upper_bound(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.heartbeat_stale_multiplier)
    }

    /// Returns the identity to authenticate with.
    pub fn credentials(&self) -> Credentials {
        Credentials::from_parts(&self.username, &self.password)
    }

    /// Returns the effective application URI.
    pub fn effective_application_uri(&self) -> String {
        self.application_uri.clone().unwrap_or_else(|| {
            format!("urn:opcbridge:{}", self.application_name.replace(' ', ""))
        })
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            security_mode: SecurityMode::default(),
            security_policy: SecurityPolicy::default(),
            node_ids: Vec::new(),
            subscribe_enabled: false,
            use_heartbeat: false,
            heartbeat_node_id: default_heartbeat_node(),
            heartbeat_stale_multiplier: default_heartbeat_multiplier(),
            heartbeat_interval: default_heartbeat_interval(),
            browse_properties: false,
            publishing_interval: default_publishing_interval(),
            sampling_interval: default_sampling_interval(),
            queue_capacity: default_queue_capacity(),
            connect_timeout: default_connect_timeout(),
            session_timeout: default_session_timeout(),
            max_browse_depth: default_max_browse_depth(),
            application_name: default_application_name(),
            application_uri: None,
            pki_dir: None,
            trust_server_certs: false,
        }
    }
}

// =============================================================================
// ConnectorConfigBuilder
// =============================================================================

/// Builder for [`ConnectorConfig`].
#[derive(Debug, Default)]
pub struct ConnectorConfigBuilder {
    config: ConnectorConfig,
}

impl ConnectorConfigBuilder {
    /// Sets the server endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Sets username/password authentication.
    pub fn username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    /// Sets the security mode.
    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.config.security_mode = mode;
        self
    }

    /// Sets the security policy.
    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.config.security_policy = policy;
        self
    }

    /// Sets the seed node specifiers.
    pub fn node_ids<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.node_ids = node_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Selects subscription mode.
    pub fn subscribe_enabled(mut self, enabled: bool) -> Self {
        self.config.subscribe_enabled = enabled;
        self
    }

    /// Enables the heartbeat on the given node.
    pub fn heartbeat(mut self, node_id: impl Into<String>) -> Self {
        self.config.use_heartbeat = true;
        self.config.heartbeat_node_id = node_id.into();
        self
    }

    /// Sets the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Sets the heartbeat stale multiplier.
    pub fn heartbeat_stale_multiplier(mut self, multiplier: u32) -> Self {
        self.config.heartbeat_stale_multiplier = multiplier;
        self
    }

    /// Sets whether property nodes are browsed and acquired.
    pub fn browse_properties(mut self, enabled: bool) -> Self {
        self.config.browse_properties = enabled;
        self
    }

    /// Sets the publishing interval.
    pub fn publishing_interval(mut self, interval: Duration) -> Self {
        self.config.publishing_interval = interval;
        self
    }

    /// Sets the sampling interval.
    pub fn sampling_interval(mut self, interval: Duration) -> Self {
        self.config.sampling_interval = interval;
        self
    }

    /// Sets the notification queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the maximum browse depth.
    pub fn max_browse_depth(mut self, depth: usize) -> Self {
        self.config.max_browse_depth = depth;
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    /// Sets the PKI directory.
    pub fn pki_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.pki_dir = Some(dir.into());
        self
    }

    /// Sets whether to trust all server certificates (insecure).
    pub fn trust_server_certs(mut self, trust: bool) -> Self {
        self.config.trust_server_certs = trust;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<ConnectorConfig, OpcUaError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Serde helpers
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::new("opc.tcp://localhost:4840");
        assert_eq!(config.heartbeat_node_id, "i=2258");
        assert_eq!(config.heartbeat_stale_multiplier, 10);
        assert_eq!(config.sampling_interval, Duration::from_millis(250));
        assert_eq!(config.max_browse_depth, 25);
        assert!(config.credentials().is_anonymous());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validates_endpoint() {
        let err = ConnectorConfig::builder()
            .endpoint("http://localhost")
            .build()
            .unwrap_err();
        assert_eq!(err.category(), "configuration");

        assert!(ConnectorConfig::builder().build().is_err());
    }

    #[test]
    fn test_security_mismatch_rejected() {
        let result = ConnectorConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .security_mode(SecurityMode::Sign)
            .build();
        assert!(result.is_err());

        let result = ConnectorConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .security_policy(SecurityPolicy::Basic256Sha256)
            .build();
        assert!(result.is_err());

        let result = ConnectorConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .security_mode(SecurityMode::SignAndEncrypt)
            .security_policy(SecurityPolicy::Basic256Sha256)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_heartbeat_validation() {
        let result = ConnectorConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .heartbeat("not a node")
            .build();
        assert!(result.is_err());

        let result = ConnectorConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .heartbeat("i=2258")
            .heartbeat_stale_multiplier(1)
            .build();
        assert!(result.is_err());

        let config = ConnectorConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .heartbeat("i=2258")
            .heartbeat_interval(Duration::from_millis(500))
            .heartbeat_stale_multiplier(4)
            .build()
            .unwrap();
        assert_eq!(config.heartbeat_upper_bound(), Duration::from_secs(2));
        assert_eq!(config.heartbeat_node().unwrap(), NodeId::numeric(0, 2258));
    }

    #[test]
    fn test_deserialize_with_aliases() {
        let json = r#"{
            "endpoint": "opc.tcp://localhost:50000",
            "nodeIDs": ["ns=3;s=Basic"],
            "subscribeEnabled": true,
            "useHeartbeat": true,
            "securityMode": "None",
            "publishingInterval": "500ms"
        }"#;

        let config: ConnectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.node_ids, vec!["ns=3;s=Basic".to_string()]);
        assert!(config.subscribe_enabled);
        assert!(config.use_heartbeat);
        assert_eq!(config.publishing_interval, Duration::from_millis(500));
        assert_eq!(config.heartbeat_node_id, DEFAULT_HEARTBEAT_NODE);
    }

    #[test]
    fn test_password_not_serialized() {
        let config = ConnectorConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .username("operator", "s3cret")
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(!config.credentials().is_anonymous());
    }
}
