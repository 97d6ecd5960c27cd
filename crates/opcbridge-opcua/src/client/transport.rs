// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! The connector talks to servers only through [`OpcUaTransport`], so the
//! acquisition logic can run against the in-memory simulator in tests and
//! against a real stack in production.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::subscription::DeliveryStats;
use super::variant::DataValue;
use crate::config::ConnectorConfig;
use crate::error::OpcUaResult;
use crate::types::{Credentials, NodeClass, NodeId, QualifiedName, SecurityMode, SecurityPolicy};

// =============================================================================
// TransportState
// =============================================================================

/// Connection state of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Transport is not connected.
    #[default]
    Disconnected,

    /// Transport is connected and ready.
    Connected,

    /// The server side went away.
    Lost,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
            Self::Lost => write!(f, "Lost"),
        }
    }
}

// =============================================================================
// ConnectionParams
// =============================================================================

/// Everything a transport needs to open a session.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Server endpoint URL.
    pub endpoint: String,
    /// Security mode.
    pub security_mode: SecurityMode,
    /// Security policy.
    pub security_policy: SecurityPolicy,
    /// User identity.
    pub credentials: Credentials,
    /// Application name.
    pub application_name: String,
    /// Application URI.
    pub application_uri: String,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// PKI directory.
    pub pki_dir: Option<String>,
    /// Trust any server certificate.
    pub trust_server_certs: bool,
}

impl ConnectionParams {
    /// Derives connection parameters from a connector configuration.
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            security_mode: config.security_mode,
            security_policy: config.security_policy,
            credentials: config.credentials(),
            application_name: config.application_name.clone(),
            application_uri: config.effective_application_uri(),
            session_timeout: config.session_timeout,
            pki_dir: config.pki_dir.clone(),
            trust_server_certs: config.trust_server_certs,
        }
    }
}

// =============================================================================
// Browse / attribute results
// =============================================================================

/// One forward reference returned by a browse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseReference {
    /// Target node.
    pub node_id: NodeId,
    /// Reference type connecting the browsed node to the target.
    pub reference_type_id: NodeId,
    /// Browse name of the target.
    pub browse_name: QualifiedName,
    /// Display name of the target.
    pub display_name: String,
    /// Node class of the target.
    pub node_class: NodeClass,
}

/// Descriptive attributes of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeAttributes {
    /// DisplayName text.
    pub display_name: String,
    /// BrowseName.
    pub browse_name: QualifiedName,
    /// DataType attribute; null for nodes without a value.
    pub data_type: NodeId,
    /// NodeClass.
    pub node_class: NodeClass,
}

// =============================================================================
// Subscription plumbing
// =============================================================================

/// Parameters of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSettings {
    /// Publishing interval.
    pub publishing_interval: Duration,
    /// Lifetime count.
    pub lifetime_count: u32,
    /// Max keep-alive count.
    pub max_keep_alive_count: u32,
    /// Max notifications per publish (0 = unlimited).
    pub max_notifications_per_publish: u32,
    /// Priority.
    pub priority: u8,
}

impl SubscriptionSettings {
    /// Settings for a given publishing interval.
    pub fn with_publishing_interval(publishing_interval: Duration) -> Self {
        Self {
            publishing_interval,
            ..Default::default()
        }
    }
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: Duration::from_secs(1),
            lifetime_count: 60,
            max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            priority: 0,
        }
    }
}

/// Request to monitor the Value attribute of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredItemRequest {
    /// Node to monitor.
    pub node_id: NodeId,
    /// Handle echoed back on every notification of this item.
    pub client_handle: u32,
    /// Sampling interval.
    pub sampling_interval: Duration,
    /// Server-side queue size.
    pub queue_size: u32,
}

/// Server response for one monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoredItemResult {
    /// Handle given in the request.
    pub client_handle: u32,
    /// Server assigned id.
    pub monitored_item_id: u32,
    /// Status code (0 = Good).
    pub status_code: u32,
}

impl MonitoredItemResult {
    /// Returns `true` if the item was created.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status_code & 0x8000_0000 == 0
    }
}

/// A data change pushed by the transport's delivery path.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    /// Client handle of the monitored item.
    pub client_handle: u32,
    /// The new value.
    pub value: DataValue,
}

// =============================================================================
// NotificationSink
// =============================================================================

/// Where a transport pushes the data changes of one subscription.
///
/// Pushing never waits. A change that finds the channel full is dropped and
/// counted in the shared [`DeliveryStats`].
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::Sender<DataChange>,
    stats: Arc<DeliveryStats>,
}

impl NotificationSink {
    /// Wraps the sending half of a delivery channel.
    pub fn new(tx: mpsc::Sender<DataChange>, stats: Arc<DeliveryStats>) -> Self {
        Self { tx, stats }
    }

    /// Pushes `change`. Returns `false` once the receiving side is gone.
    pub fn push(&self, change: DataChange) -> bool {
        match self.tx.try_send(change) {
            Ok(()) => true,
            Err(TrySendError::Full(change)) => {
                let dropped = self.stats.record_overflow();
                if dropped == 1 || dropped % 1000 == 0 {
                    tracing::warn!(
                        client_handle = change.client_handle,
                        dropped,
                        "Notification channel full, dropping value"
                    );
                }
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Returns `true` once the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Abstract transport trait for OPC UA communication.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the connector is driven from
/// whatever task the caller uses.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Opens a secure channel and activates a session.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`](crate::error::ConnectionError) if the
    /// endpoint refuses, no endpoint matches the requested security, or the
    /// identity is rejected.
    async fn connect(&mut self, params: &ConnectionParams) -> OpcUaResult<()>;

    /// Closes the session. Active subscriptions die with it.
    async fn disconnect(&mut self) -> OpcUaResult<()>;

    /// Returns `true` if the transport is currently connected.
    fn is_connected(&self) -> bool;

    // =========================================================================
    // Browse / Read
    // =========================================================================

    /// Returns the forward hierarchical references of `node_id`, in server
    /// order.
    async fn browse(&self, node_id: &NodeId) -> OpcUaResult<Vec<BrowseReference>>;

    /// Reads DisplayName, BrowseName, DataType and NodeClass of a node.
    async fn read_attributes(&self, node_id: &NodeId) -> OpcUaResult<NodeAttributes>;

    /// Reads the Value attribute of every node, one result per input.
    async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<DataValue>>;

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription whose notifications are pushed into `sink`.
    async fn create_subscription(
        &self,
        settings: &SubscriptionSettings,
        sink: NotificationSink,
    ) -> OpcUaResult<u32>;

    /// Adds monitored items to a subscription.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>>;

    /// Deletes a subscription and its monitored items.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Returns the transport display name for logging.
    fn display_name(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_config() {
        let config = ConnectorConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .username("operator", "pw")
            .application_name("My App")
            .build()
            .unwrap();
        let params = ConnectionParams::from_config(&config);
        assert_eq!(params.endpoint, "opc.tcp://plc:4840");
        assert!(!params.credentials.is_anonymous());
        assert_eq!(params.application_uri, "urn:opcbridge:MyApp");
    }

    #[test]
    fn test_monitored_item_result() {
        let ok = MonitoredItemResult {
            client_handle: 1,
            monitored_item_id: 7,
            status_code: 0,
        };
        assert!(ok.is_good());

        let rejected = MonitoredItemResult {
            status_code: 0x8033_0000,
            ..ok
        };
        assert!(!rejected.is_good());
    }

    #[test]
    fn test_sink_counts_overflow() {
        let (tx, mut rx) = mpsc::channel(1);
        let stats = Arc::new(DeliveryStats::default());
        let sink = NotificationSink::new(tx, stats.clone());
        let change = DataChange {
            client_handle: 3,
            value: DataValue::with_status(0),
        };

        assert!(sink.push(change.clone()));
        assert!(sink.push(change.clone()));
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.notifications(), 1);
        assert_eq!(rx.try_recv().unwrap().client_handle, 3);

        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.push(change));
        assert_eq!(stats.dropped(), 1);
    }
}
