// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The acquisition connector.
//!
//! [`OpcUaConnector`] is the surface the host pipeline drives:
//! `connect`, then `read_batch` in a loop, then `close`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        OpcUaConnector                           │
//! │           (connect / read_batch / close / server info)          │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                   │                      │
//!          ▼                   ▼                      ▼
//! ┌─────────────────┐ ┌────────────────────┐ ┌───────────────────┐
//! │ AddressSpace    │ │ ActiveSubscription │ │ HeartbeatMonitor  │
//! │ Browser         │ │ or poll targets    │ │                   │
//! └─────────────────┘ └────────────────────┘ └───────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 ConnectionManager + OpcUaTransport              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use opcbridge_opcua::{ConnectorConfig, Context, OpcUaConnector, SimulatedServer, SimulatedTransport};
//!
//! let server = SimulatedServer::demo();
//! let config = ConnectorConfig::builder()
//!     .endpoint(server.endpoint())
//!     .node_ids(["ns=3;s=Basic"])
//!     .build()?;
//!
//! let mut connector = OpcUaConnector::new(config, Box::new(SimulatedTransport::new(server)));
//! connector.connect(&Context::background()).await?;
//! let (batch, ack) = connector.read_batch(&Context::with_timeout(Duration::from_secs(1))).await?;
//! ack.ack();
//! connector.close(&Context::background()).await?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::batch::{AckHandle, Record, RecordBatch};
use crate::browse::{AcquisitionTarget, AddressSpaceBrowser, BrowseOptions};
use crate::client::{
    normalize, ActiveSubscription, ConnectionManager, ConnectionParams, DataValue, DeliveryStats,
    HeartbeatWatch, MonitoredItemRequest, OpcUaTransport, SessionState, SubscriptionSettings,
    Variant,
};
use crate::config::ConnectorConfig;
use crate::context::Context;
use crate::error::{ConversionError, OpcUaError, OpcUaResult, OperationError, SubscriptionError};
use crate::heartbeat::{Clock, HeartbeatMonitor, SystemClock};
use crate::types::{parse_node_ids, well_known, NodeId, ServerInfo};

/// Bound on subscription cleanup during `close`.
const SUBSCRIPTION_RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// ConnectorStats
// =============================================================================

/// Connector counters.
#[derive(Debug, Default)]
pub struct ConnectorStats {
    batches: AtomicU64,
    records: AtomicU64,
    dropped_values: AtomicU64,
    heartbeat_failures: AtomicU64,
    delivery: Arc<DeliveryStats>,
}

impl ConnectorStats {
    /// Batches returned by `read_batch`.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Records returned by `read_batch`.
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Values dropped for a bad status, a failed normalization or a full queue.
    pub fn dropped_values(&self) -> u64 {
        self.dropped_values.load(Ordering::Relaxed) + self.delivery.dropped()
    }

    /// Liveness checks that found the heartbeat stale.
    pub fn heartbeat_failures(&self) -> u64 {
        self.heartbeat_failures.load(Ordering::Relaxed)
    }

    /// Notifications received from subscriptions.
    pub fn notifications_received(&self) -> u64 {
        self.delivery.notifications()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches: self.batches(),
            records: self.records(),
            dropped_values: self.dropped_values(),
            heartbeat_failures: self.heartbeat_failures(),
            notifications_received: self.notifications_received(),
        }
    }

    fn drop_value(&self) {
        self.dropped_values.fetch_add(1, Ordering::Relaxed);
    }
}

/// Serializable copy of [`ConnectorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Batches returned.
    pub batches: u64,
    /// Records returned.
    pub records: u64,
    /// Values dropped.
    pub dropped_values: u64,
    /// Stale heartbeat detections.
    pub heartbeat_failures: u64,
    /// Subscription notifications received.
    pub notifications_received: u64,
}

// =============================================================================
// Acquisition
// =============================================================================

enum Mode {
    Poll {
        node_ids: Vec<NodeId>,
    },
    Subscribe {
        subscription: Option<ActiveSubscription>,
    },
}

/// Everything `connect` prepares for `read_batch`.
///
/// Entry `i` of `entries` is monitored with client handle `i`.
struct Acquisition {
    entries: Vec<AcquisitionTarget>,
    target_count: usize,
    heartbeat: Option<Arc<HeartbeatMonitor>>,
    mode: Mode,
}

// =============================================================================
// OpcUaConnector
// =============================================================================

/// OPC UA acquisition connector.
///
/// One instance owns one session. `close` always leaves it ready for a fresh
/// `connect`.
pub struct OpcUaConnector {
    config: ConnectorConfig,
    session: ConnectionManager,
    clock: Arc<dyn Clock>,
    acquisition: Option<Acquisition>,
    stats: ConnectorStats,
}

impl OpcUaConnector {
    /// Creates a connector over `transport`.
    pub fn new(config: ConnectorConfig, transport: Box<dyn OpcUaTransport>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock::new()))
    }

    /// Creates a connector with an explicit clock for the heartbeat.
    pub fn with_clock(
        config: ConnectorConfig,
        transport: Box<dyn OpcUaTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            session: ConnectionManager::new(transport),
            clock,
            acquisition: None,
            stats: ConnectorStats::default(),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// The session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The connector counters.
    pub fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    /// Browsed acquisition targets, excluding the heartbeat node.
    pub fn targets(&self) -> &[AcquisitionTarget] {
        match &self.acquisition {
            Some(acq) => &acq.entries[..acq.target_count],
            None => &[],
        }
    }

    /// Returns `true` when connected in subscription mode.
    pub fn is_subscribed(&self) -> bool {
        matches!(
            self.acquisition,
            Some(Acquisition {
                mode: Mode::Subscribe { .. },
                ..
            })
        )
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Opens the session, browses the seeds and sets up acquisition.
    ///
    /// If anything after the session opens fails, the session is released
    /// again and the connector stays reusable.
    pub async fn connect(&mut self, ctx: &Context) -> OpcUaResult<()> {
        self.config.validate()?;

        let params = ConnectionParams::from_config(&self.config);
        self.session
            .connect(ctx, &params, self.config.connect_timeout)
            .await?;

        match self.prepare(ctx).await {
            Ok(acquisition) => {
                tracing::info!(
                    endpoint = %self.config.endpoint,
                    targets = acquisition.target_count,
                    heartbeat = acquisition.heartbeat.is_some(),
                    subscribe = self.config.subscribe_enabled,
                    "Acquisition ready"
                );
                self.acquisition = Some(acquisition);
                Ok(())
            }
            Err(e) => {
                e.log("connect");
                self.session.close(ctx).await?;
                Err(e)
            }
        }
    }

    async fn prepare(&self, ctx: &Context) -> OpcUaResult<Acquisition> {
        let transport = self.session.transport();

        let mut seeds = Vec::with_capacity(self.config.node_ids.len());
        for (raw, parsed) in self
            .config
            .node_ids
            .iter()
            .zip(parse_node_ids(&self.config.node_ids))
        {
            match parsed {
                Ok(node_id) => seeds.push(node_id),
                Err(e) => tracing::warn!(node_id = %raw, error = %e, "Skipping invalid node id"),
            }
        }

        let browser = AddressSpaceBrowser::new(
            transport,
            BrowseOptions {
                max_depth: self.config.max_browse_depth,
                browse_properties: self.config.browse_properties,
            },
        );

        let mut entries = if seeds.is_empty() && !self.config.node_ids.is_empty() {
            tracing::warn!("No configured node id could be parsed; nothing to browse");
            Vec::new()
        } else {
            let (tree, _) = browser.browse(ctx, &seeds).await?;
            tree.acquisition_targets(self.config.browse_properties)
        };
        let target_count = entries.len();

        for target in &entries {
            tracing::debug!(
                node_id = %target.node_id,
                path = %target.metadata.tag_path,
                tag_type = %target.metadata.tag_type.as_str(),
                "Acquisition target"
            );
        }

        let heartbeat = if self.config.use_heartbeat {
            let node_id = self.config.heartbeat_node()?;
            entries.push(browser.describe(ctx, &node_id).await?);
            Some(Arc::new(HeartbeatMonitor::new(
                node_id,
                self.config.heartbeat_upper_bound(),
                self.clock.clone(),
            )))
        } else {
            None
        };

        let mode = if self.config.subscribe_enabled {
            let subscription = if entries.is_empty() {
                None
            } else {
                Some(self.subscribe(ctx, &entries, heartbeat.as_ref()).await?)
            };
            Mode::Subscribe { subscription }
        } else {
            Mode::Poll {
                node_ids: entries.iter().map(|e| e.node_id.clone()).collect(),
            }
        };

        Ok(Acquisition {
            entries,
            target_count,
            heartbeat,
            mode,
        })
    }

    async fn subscribe(
        &self,
        ctx: &Context,
        entries: &[AcquisitionTarget],
        heartbeat: Option<&Arc<HeartbeatMonitor>>,
    ) -> OpcUaResult<ActiveSubscription> {
        let items: Vec<MonitoredItemRequest> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| MonitoredItemRequest {
                node_id: entry.node_id.clone(),
                client_handle: i as u32,
                sampling_interval: self.config.sampling_interval,
                queue_size: 1,
            })
            .collect();

        let watch = heartbeat.map(|monitor| HeartbeatWatch {
            monitor: monitor.clone(),
            client_handles: entries
                .iter()
                .enumerate()
                .filter(|(_, e)| &e.node_id == monitor.target())
                .map(|(i, _)| i as u32)
                .collect::<HashSet<_>>(),
        });

        ActiveSubscription::establish(
            self.session.transport(),
            ctx,
            &SubscriptionSettings::with_publishing_interval(self.config.publishing_interval),
            &items,
            self.config.queue_capacity,
            watch,
            self.stats.delivery.clone(),
        )
        .await
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Returns the next batch of records.
    ///
    /// Poll mode reads every target once. Subscription mode waits for at
    /// least one notification, then drains what is queued. With the
    /// heartbeat enabled an empty wait ends in an empty batch rather than
    /// `DeadlineExceeded`.
    pub async fn read_batch(&mut self, ctx: &Context) -> OpcUaResult<(RecordBatch, AckHandle)> {
        self.session.ensure_connected()?;
        let Some(acq) = self.acquisition.as_mut() else {
            return Err(OpcUaError::not_connected("acquisition not prepared"));
        };

        if let Some(monitor) = &acq.heartbeat {
            if let Err(e) = monitor.check() {
                self.stats.heartbeat_failures.fetch_add(1, Ordering::Relaxed);
                self.session.fail("heartbeat stale");
                return Err(e);
            }
        }

        let batch = match &mut acq.mode {
            Mode::Poll { node_ids } => {
                let values = match ctx
                    .run("read_values", self.session.transport().read_values(node_ids))
                    .await
                {
                    Ok(values) => values,
                    Err(e) => {
                        if matches!(e, OpcUaError::Connection(_)) {
                            self.session.fail("poll read failed");
                        }
                        return Err(e);
                    }
                };
                if values.len() != acq.entries.len() {
                    return Err(OperationError::ResultCountMismatch {
                        expected: acq.entries.len(),
                        actual: values.len(),
                    }
                    .into());
                }

                let mut batch = RecordBatch::default();
                for (entry, value) in acq.entries.iter().zip(values) {
                    if let Some(monitor) = &acq.heartbeat {
                        if value.is_good() && monitor.target() == &entry.node_id {
                            monitor.observe();
                        }
                    }
                    if let Some(record) = to_record(entry, value, &self.stats) {
                        batch.push(record);
                    }
                }
                batch
            }
            Mode::Subscribe { subscription: None } => {
                // Nothing is monitored: wait out the deadline like an idle subscription.
                ctx.run("read_batch", std::future::pending::<OpcUaResult<()>>())
                    .await
                    .or_else(|e| if e.is_deadline_exceeded() { Ok(()) } else { Err(e) })?;
                RecordBatch::default()
            }
            Mode::Subscribe {
                subscription: Some(subscription),
            } => match subscription.next_batch(ctx).await {
                Ok(changes) => {
                    let mut batch = RecordBatch::default();
                    for change in changes {
                        match acq.entries.get(change.client_handle as usize) {
                            Some(entry) => {
                                if let Some(record) = to_record(entry, change.value, &self.stats) {
                                    batch.push(record);
                                }
                            }
                            None => {
                                self.stats.drop_value();
                                tracing::warn!(
                                    client_handle = change.client_handle,
                                    "Notification for unknown client handle"
                                );
                            }
                        }
                    }
                    batch
                }
                Err(e) if e.is_deadline_exceeded() && acq.heartbeat.is_some() => {
                    RecordBatch::default()
                }
                Err(OpcUaError::Subscription(SubscriptionError::DeliveryClosed)) => {
                    self.session.fail("notification delivery closed");
                    return Err(OpcUaError::not_connected("notification delivery closed"));
                }
                Err(e) => return Err(e),
            },
        };

        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        self.stats
            .records
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        tracing::trace!(records = batch.len(), "Batch assembled");

        let ack = AckHandle::new(batch.len());
        Ok((batch, ack))
    }

    // =========================================================================
    // Close
    // =========================================================================

    /// Releases the subscription and the session.
    ///
    /// Always succeeds and always ends `Disconnected`. Release is attempted
    /// even when `ctx` is already expired or cancelled.
    pub async fn close(&mut self, ctx: &Context) -> OpcUaResult<()> {
        if let Some(mut acq) = self.acquisition.take() {
            if let Mode::Subscribe {
                subscription: Some(subscription),
            } = &mut acq.mode
            {
                let release = Context::with_timeout(SUBSCRIPTION_RELEASE_TIMEOUT);
                if let Err(e) = subscription
                    .shutdown(self.session.transport(), &release)
                    .await
                {
                    tracing::debug!(
                        subscription_id = subscription.id(),
                        error = %e,
                        "Ignoring subscription release error"
                    );
                }
            }
        }
        self.session.close(ctx).await
    }

    // =========================================================================
    // Server information
    // =========================================================================

    /// Reads the server's BuildInfo.
    ///
    /// A field whose read comes back with a bad status is left empty.
    pub async fn get_server_information(&self, ctx: &Context) -> OpcUaResult<ServerInfo> {
        self.session.ensure_connected()?;

        let nodes = [
            NodeId::standard(well_known::BUILD_INFO_MANUFACTURER_NAME),
            NodeId::standard(well_known::BUILD_INFO_PRODUCT_NAME),
            NodeId::standard(well_known::BUILD_INFO_SOFTWARE_VERSION),
        ];
        let values = ctx
            .run("read_server_info", self.session.transport().read_values(&nodes))
            .await?;

        let mut fields = values.into_iter().zip(&nodes).map(|(value, node)| {
            if !value.is_good() {
                tracing::debug!(
                    node_id = %node,
                    status = OperationError::status_code_name(value.status),
                    "Server info field unavailable"
                );
                return String::new();
            }
            match value.value {
                Some(Variant::String(s)) => s,
                Some(Variant::LocalizedText(t)) => t.text.unwrap_or_default(),
                Some(other) => other.to_string(),
                None => String::new(),
            }
        });

        Ok(ServerInfo {
            manufacturer_name: fields.next().unwrap_or_default(),
            product_name: fields.next().unwrap_or_default(),
            software_version: fields.next().unwrap_or_default(),
        })
    }
}

impl fmt::Debug for OpcUaConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcUaConnector")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.session.state())
            .field("targets", &self.targets().len())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// Turns one value into a record, or drops it.
fn to_record(entry: &AcquisitionTarget, value: DataValue, stats: &ConnectorStats) -> Option<Record> {
    let path = &entry.metadata.tag_path;

    if value.is_bad() {
        stats.drop_value();
        let e = OperationError::bad_status(entry.node_id.to_string(), value.status);
        tracing::warn!(path = %path, error = %e, "Dropping value with bad status");
        return None;
    }

    let normalized = match &value.value {
        Some(variant) => normalize(variant, path),
        None => Err(ConversionError::null_value(path.as_str())),
    };

    match normalized {
        Ok(normalized) => Some(Record::new(
            normalized,
            &entry.metadata,
            value.source_timestamp,
        )),
        Err(e) => {
            stats.drop_value();
            tracing::warn!(node_id = %entry.node_id, error = %e, "Dropping value that cannot be normalized");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browse::META_TAG_GROUP;
    use crate::client::{SimulatedServer, SimulatedTransport, SIMULATOR_ENDPOINT};
    use crate::heartbeat::ManualClock;

    fn connector(server: &SimulatedServer, config: ConnectorConfig) -> OpcUaConnector {
        OpcUaConnector::with_clock(
            config,
            Box::new(SimulatedTransport::new(server.clone())),
            Arc::new(ManualClock::new(0)),
        )
    }

    fn poll_config(seed: &str) -> ConnectorConfig {
        ConnectorConfig::builder()
            .endpoint(SIMULATOR_ENDPOINT)
            .node_ids([seed])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_before_connect_is_not_connected() {
        let server = SimulatedServer::demo();
        let mut connector = connector(&server, poll_config("ns=3;s=Basic"));
        let err = connector.read_batch(&Context::background()).await.unwrap_err();
        assert!(err.is_not_connected());
    }

    #[tokio::test]
    async fn test_poll_mode_reads_each_target() {
        let server = SimulatedServer::demo();
        let mut connector = connector(&server, poll_config("ns=3;s=Basic"));
        connector.connect(&Context::background()).await.unwrap();
        assert!(!connector.is_subscribed());

        let (batch, ack) = connector.read_batch(&Context::background()).await.unwrap();
        assert_eq!(batch.len(), 4);
        assert!(batch.iter().all(|r| r.meta(META_TAG_GROUP) == Some("Basic")));
        ack.ack();

        assert_eq!(connector.stats().batches(), 1);
        assert_eq!(connector.stats().records(), 4);
    }

    #[tokio::test]
    async fn test_bad_status_dropped_uncertain_kept() {
        let server = SimulatedServer::demo();
        let mut connector = connector(&server, poll_config("ns=3;s=Basic"));
        connector.connect(&Context::background()).await.unwrap();

        server.set_data_value(
            &NodeId::string(3, "StepUp"),
            DataValue::with_status(0x8031_0000),
        );
        let mut uncertain = DataValue::good(Variant::Int32(5));
        uncertain.status = 0x4000_0000;
        server.set_data_value(&NodeId::string(3, "RandomSignedInt32"), uncertain);

        let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(connector.stats().dropped_values(), 1);
    }

    #[tokio::test]
    async fn test_failed_prepare_releases_session() {
        let server = SimulatedServer::demo();
        let config = ConnectorConfig::builder()
            .endpoint(server.endpoint())
            .heartbeat("ns=9;s=Nowhere")
            .build()
            .unwrap();
        let mut connector = connector(&server, config);

        assert!(connector.connect(&Context::background()).await.is_err());
        assert_eq!(connector.state(), SessionState::Disconnected);
        assert_eq!(server.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_server_information() {
        let server = SimulatedServer::demo();
        let mut connector = connector(&server, poll_config("ns=3;s=Basic"));
        assert!(connector
            .get_server_information(&Context::background())
            .await
            .unwrap_err()
            .is_not_connected());

        connector.connect(&Context::background()).await.unwrap();
        let info = connector
            .get_server_information(&Context::background())
            .await
            .unwrap();
        assert_eq!(info.manufacturer_name, "Sylvex");
        assert_eq!(info.product_name, "opcbridge simulator");
        assert!(!info.software_version.is_empty());
    }

    #[tokio::test]
    async fn test_server_information_bad_field_left_empty() {
        let server = SimulatedServer::demo();
        server.set_data_value(
            &NodeId::standard(well_known::BUILD_INFO_MANUFACTURER_NAME),
            DataValue::with_status(0x8034_0000),
        );
        let mut connector = connector(&server, poll_config("ns=3;s=Basic"));
        connector.connect(&Context::background()).await.unwrap();

        let info = connector
            .get_server_information(&Context::background())
            .await
            .unwrap();
        assert!(info.manufacturer_name.is_empty());
        assert_eq!(info.product_name, "opcbridge simulator");
    }

    #[tokio::test]
    async fn test_invalid_seeds_skipped() {
        let server = SimulatedServer::demo();
        let config = ConnectorConfig::builder()
            .endpoint(server.endpoint())
            .node_ids(["ns=x;s=Bad", "ns=3;s=Basic"])
            .build()
            .unwrap();
        let mut connector = connector(&server, config);
        connector.connect(&Context::background()).await.unwrap();
        assert_eq!(connector.targets().len(), 4);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_reusable() {
        let server = SimulatedServer::demo();
        let mut connector = connector(&server, poll_config("ns=3;s=Basic"));
        let ctx = Context::background();

        connector.connect(&ctx).await.unwrap();
        connector.close(&ctx).await.unwrap();
        connector.close(&ctx).await.unwrap();
        assert!(connector.targets().is_empty());
        assert_eq!(server.active_sessions(), 0);

        connector.connect(&ctx).await.unwrap();
        let (batch, _) = connector.read_batch(&ctx).await.unwrap();
        assert_eq!(batch.len(), 4);
    }
}
