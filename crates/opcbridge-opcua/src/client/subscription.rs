// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription delivery.
//!
//! The transport pushes every data change into a raw channel. A delivery
//! task drains it, feeds the heartbeat watchdog and forwards values into a
//! bounded queue that `read_batch` consumes. The producer side never waits:
//! when the queue is full the value is dropped and counted.
//!
//! ```text
//!  transport callback ──► raw channel ──► DeliveryTask ──► bounded queue ──► next_batch
//!                                              │
//!                                              └──► HeartbeatMonitor::observe
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::error::{OpcUaError, OpcUaResult, OperationError, SubscriptionError};
use crate::heartbeat::HeartbeatMonitor;

use super::transport::{
    DataChange, MonitoredItemRequest, NotificationSink, OpcUaTransport, SubscriptionSettings,
};

// =============================================================================
// Subscription State
// =============================================================================

/// State of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Subscription is being created.
    #[default]
    Creating,

    /// Subscription is active and delivering values.
    Active,

    /// Subscription has been deleted.
    Closed,

    /// Delivery stopped unexpectedly.
    Failed,
}

impl SubscriptionState {
    /// Returns `true` if the subscription can deliver data.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if the subscription is in a terminal state.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "Creating"),
            Self::Active => write!(f, "Active"),
            Self::Closed => write!(f, "Closed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Delivery Stats
// =============================================================================

/// Counters shared between the delivery task and the connector.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    notifications: AtomicU64,
    queued: AtomicU64,
    dropped: AtomicU64,
    heartbeat_updates: AtomicU64,
}

impl DeliveryStats {
    /// Notifications received from the transport.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Values accepted into the queue.
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    /// Values dropped because the transport channel or the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Heartbeat observations.
    pub fn heartbeat_updates(&self) -> u64 {
        self.heartbeat_updates.load(Ordering::Relaxed)
    }

    /// Counts a notification the transport could not hand over. Returns the
    /// new drop total.
    pub(crate) fn record_overflow(&self) -> u64 {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// =============================================================================
// Delivery Task
// =============================================================================

/// Heartbeat wiring for the delivery task.
#[derive(Debug, Clone)]
pub struct HeartbeatWatch {
    /// The watchdog to feed.
    pub monitor: Arc<HeartbeatMonitor>,
    /// Client handles whose notifications count as heartbeats.
    pub client_handles: HashSet<u32>,
}

struct DeliveryTask {
    raw: mpsc::Receiver<DataChange>,
    queue: mpsc::Sender<DataChange>,
    heartbeat: Option<HeartbeatWatch>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryTask {
    async fn run(mut self) {
        while let Some(change) = self.raw.recv().await {
            self.stats.notifications.fetch_add(1, Ordering::Relaxed);

            if let Some(watch) = &self.heartbeat {
                if watch.client_handles.contains(&change.client_handle) && !change.value.is_bad() {
                    watch.monitor.observe();
                    self.stats.heartbeat_updates.fetch_add(1, Ordering::Relaxed);
                }
            }

            match self.queue.try_send(change) {
                Ok(()) => {
                    self.stats.queued.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(change)) => {
                    let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped == 1 || dropped % 1000 == 0 {
                        tracing::warn!(
                            client_handle = change.client_handle,
                            dropped,
                            "Delivery queue full, dropping value"
                        );
                    }
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        tracing::trace!("Delivery task finished");
    }
}

// =============================================================================
// Active Subscription
// =============================================================================

/// A live subscription with its delivery task.
///
/// Dropping it stops delivery but does not delete the server-side
/// subscription; call [`ActiveSubscription::shutdown`] for that.
pub struct ActiveSubscription {
    id: u32,
    state: SubscriptionState,
    queue: mpsc::Receiver<DataChange>,
    capacity: usize,
    accepted: usize,
    delivery: JoinHandle<()>,
}

impl ActiveSubscription {
    /// Creates the subscription, starts delivery and adds monitored items.
    ///
    /// Rejected items are logged and skipped. If every item is rejected the
    /// subscription is deleted and the first rejection is returned.
    pub async fn establish(
        transport: &dyn OpcUaTransport,
        ctx: &Context,
        settings: &SubscriptionSettings,
        items: &[MonitoredItemRequest],
        capacity: usize,
        heartbeat: Option<HeartbeatWatch>,
        stats: Arc<DeliveryStats>,
    ) -> OpcUaResult<Self> {
        let capacity = capacity.max(1);
        let (raw_tx, raw_rx) = mpsc::channel(capacity);
        let (queue_tx, queue_rx) = mpsc::channel(capacity);

        let sink = NotificationSink::new(raw_tx, stats.clone());
        let id = ctx
            .run(
                "create_subscription",
                transport.create_subscription(settings, sink),
            )
            .await?;

        let delivery = tokio::spawn(
            DeliveryTask {
                raw: raw_rx,
                queue: queue_tx,
                heartbeat,
                stats,
            }
            .run(),
        );

        let mut subscription = Self {
            id,
            state: SubscriptionState::Creating,
            queue: queue_rx,
            capacity,
            accepted: 0,
            delivery,
        };

        match subscription.add_items(transport, ctx, items).await {
            Ok(()) => {
                subscription.state = SubscriptionState::Active;
                tracing::debug!(
                    subscription_id = id,
                    items = items.len(),
                    accepted = subscription.accepted,
                    publishing_interval = ?settings.publishing_interval,
                    "Subscription established"
                );
                Ok(subscription)
            }
            Err(e) => {
                subscription.delivery.abort();
                subscription.state = SubscriptionState::Failed;
                if let Err(cleanup) = transport.delete_subscription(id).await {
                    tracing::debug!(subscription_id = id, error = %cleanup, "Subscription cleanup failed");
                }
                Err(e)
            }
        }
    }

    async fn add_items(
        &mut self,
        transport: &dyn OpcUaTransport,
        ctx: &Context,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<()> {
        let results = ctx
            .run(
                "create_monitored_items",
                transport.create_monitored_items(self.id, items),
            )
            .await?;

        if results.len() != items.len() {
            return Err(OperationError::ResultCountMismatch {
                expected: items.len(),
                actual: results.len(),
            }
            .into());
        }

        let mut first_rejection = None;
        for (request, result) in items.iter().zip(&results) {
            if result.is_good() {
                self.accepted += 1;
                continue;
            }
            tracing::warn!(
                node_id = %request.node_id,
                status = OperationError::status_code_name(result.status_code),
                "Monitored item rejected"
            );
            first_rejection.get_or_insert_with(|| {
                SubscriptionError::monitored_item_rejected(
                    request.node_id.to_string(),
                    result.status_code,
                )
            });
        }

        match first_rejection {
            Some(rejection) if self.accepted == 0 => Err(rejection.into()),
            _ => Ok(()),
        }
    }

    /// Server-assigned subscription id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Number of monitored items the server accepted.
    pub fn accepted_items(&self) -> usize {
        self.accepted
    }

    /// Waits for at least one value, then drains what was queued when the
    /// drain began.
    ///
    /// Values already queued are returned even if `ctx` is done. Values
    /// arriving during the drain wait for the next call, and the drain never
    /// exceeds the queue capacity.
    pub async fn next_batch(&mut self, ctx: &Context) -> OpcUaResult<Vec<DataChange>> {
        let first = match self.queue.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Disconnected) => None,
            Err(TryRecvError::Empty) => {
                let queue = &mut self.queue;
                ctx.run("read_batch", async { Ok(queue.recv().await) })
                    .await?
            }
        };

        let Some(first) = first else {
            self.state = SubscriptionState::Failed;
            return Err(OpcUaError::subscription(SubscriptionError::DeliveryClosed));
        };

        let pending = self.queue.len().min(self.capacity - 1);
        let mut batch = Vec::with_capacity(pending + 1);
        batch.push(first);
        for _ in 0..pending {
            match self.queue.try_recv() {
                Ok(change) => batch.push(change),
                Err(_) => break,
            }
        }
        Ok(batch)
    }

    /// Stops delivery and deletes the server-side subscription.
    pub async fn shutdown(
        &mut self,
        transport: &dyn OpcUaTransport,
        ctx: &Context,
    ) -> OpcUaResult<()> {
        self.delivery.abort();
        if self.state == SubscriptionState::Closed {
            return Ok(());
        }
        self.state = SubscriptionState::Closed;
        ctx.run("delete_subscription", transport.delete_subscription(self.id))
            .await
    }
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.delivery.abort();
    }
}

impl fmt::Debug for ActiveSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSubscription")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("capacity", &self.capacity)
            .field("accepted", &self.accepted)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::{ConnectionParams, DataValue, SimulatedServer, SimulatedTransport, Variant};
    use crate::config::ConnectorConfig;
    use crate::heartbeat::ManualClock;
    use crate::types::NodeId;

    async fn connected(server: &SimulatedServer) -> SimulatedTransport {
        let mut transport = SimulatedTransport::new(server.clone());
        let params = ConnectionParams::from_config(&ConnectorConfig::new(server.endpoint()));
        transport.connect(&params).await.unwrap();
        transport
    }

    fn request(node: &str, handle: u32) -> MonitoredItemRequest {
        MonitoredItemRequest {
            node_id: NodeId::string(3, node),
            client_handle: handle,
            sampling_interval: Duration::from_millis(250),
            queue_size: 1,
        }
    }

    fn change(handle: u32) -> DataChange {
        DataChange {
            client_handle: handle,
            value: DataValue::good(Variant::UInt32(handle)),
        }
    }

    fn handles(batch: &[DataChange]) -> Vec<u32> {
        batch.iter().map(|c| c.client_handle).collect()
    }

    /// A subscription over a queue the test feeds directly.
    fn fed_subscription(capacity: usize) -> (ActiveSubscription, mpsc::Sender<DataChange>) {
        let (tx, rx) = mpsc::channel(capacity);
        let subscription = ActiveSubscription {
            id: 1,
            state: SubscriptionState::Active,
            queue: rx,
            capacity,
            accepted: 1,
            delivery: tokio::spawn(async {}),
        };
        (subscription, tx)
    }

    async fn establish(
        transport: &SimulatedTransport,
        items: &[MonitoredItemRequest],
        capacity: usize,
        heartbeat: Option<HeartbeatWatch>,
    ) -> (ActiveSubscription, Arc<DeliveryStats>) {
        let stats = Arc::new(DeliveryStats::default());
        let subscription = ActiveSubscription::establish(
            transport,
            &Context::background(),
            &SubscriptionSettings::default(),
            items,
            capacity,
            heartbeat,
            stats.clone(),
        )
        .await
        .unwrap();
        (subscription, stats)
    }

    #[tokio::test]
    async fn test_initial_values_delivered() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let (mut sub, stats) =
            establish(&transport, &[request("StepUp", 1), request("RandomSignedInt32", 2)], 16, None).await;

        assert_eq!(sub.state(), SubscriptionState::Active);
        assert_eq!(sub.accepted_items(), 2);

        let ctx = Context::with_timeout(Duration::from_secs(1));
        let mut handles: Vec<u32> = sub.next_batch(&ctx).await.unwrap().iter().map(|c| c.client_handle).collect();
        while handles.len() < 2 {
            handles.extend(sub.next_batch(&ctx).await.unwrap().iter().map(|c| c.client_handle));
        }
        handles.sort_unstable();
        assert_eq!(handles, [1, 2]);
        assert_eq!(stats.notifications(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let (mut sub, stats) = establish(&transport, &[request("StepUp", 1)], 2, None).await;

        for i in 0..20u32 {
            server.set_value(&NodeId::string(3, "StepUp"), Variant::UInt32(i));
            tokio::task::yield_now().await;
        }
        // Let the delivery task catch up.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let batch = sub.next_batch(&Context::background()).await.unwrap();
        assert!(batch.len() <= 2);
        assert!(stats.dropped() > 0);
        assert_eq!(stats.queued() + stats.dropped(), stats.notifications());
    }

    #[tokio::test]
    async fn test_heartbeat_handle_feeds_monitor() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let clock = Arc::new(ManualClock::new(0));
        let monitor = Arc::new(HeartbeatMonitor::new(
            NodeId::standard(2258),
            Duration::from_secs(10),
            clock.clone(),
        ));
        let watch = HeartbeatWatch {
            monitor: monitor.clone(),
            client_handles: HashSet::from([7]),
        };
        let items = [MonitoredItemRequest {
            node_id: NodeId::standard(2258),
            client_handle: 7,
            sampling_interval: Duration::from_millis(250),
            queue_size: 1,
        }];
        let (mut sub, stats) = establish(&transport, &items, 8, Some(watch)).await;

        clock.advance(Duration::from_secs(30));
        assert!(monitor.is_stale());

        server.tick();
        let batch = sub.next_batch(&Context::with_timeout(Duration::from_secs(1))).await.unwrap();
        assert!(batch.iter().all(|c| c.client_handle == 7));
        assert!(stats.heartbeat_updates() >= 1);
        assert!(!monitor.is_stale());
    }

    #[tokio::test]
    async fn test_rejected_items_are_skipped() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let (sub, _) = establish(&transport, &[request("StepUp", 1), request("Missing", 2)], 8, None).await;
        assert_eq!(sub.accepted_items(), 1);
        assert_eq!(server.monitored_item_count(), 1);
    }

    #[tokio::test]
    async fn test_all_items_rejected_fails_and_cleans_up() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let err = ActiveSubscription::establish(
            &transport,
            &Context::background(),
            &SubscriptionSettings::default(),
            &[request("Missing", 1)],
            8,
            None,
            Arc::new(DeliveryStats::default()),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            OpcUaError::Subscription(SubscriptionError::MonitoredItemRejected { .. })
        ));
        assert_eq!(server.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_deadline_without_data() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let (mut sub, _) = establish(&transport, &[request("StepUp", 1)], 8, None).await;
        let ctx = Context::with_timeout(Duration::from_secs(1));
        sub.next_batch(&ctx).await.unwrap();

        let err = sub
            .next_batch(&Context::with_timeout(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert_eq!(sub.state(), SubscriptionState::Active);
    }

    #[tokio::test]
    async fn test_server_drop_closes_delivery() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let (mut sub, _) = establish(&transport, &[request("StepUp", 1)], 8, None).await;
        let ctx = Context::with_timeout(Duration::from_secs(1));
        sub.next_batch(&ctx).await.unwrap();

        server.drop_subscriptions();
        let err = sub.next_batch(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Subscription(SubscriptionError::DeliveryClosed)
        ));
        assert_eq!(sub.state(), SubscriptionState::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_deletes_subscription() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let (mut sub, _) = establish(&transport, &[request("StepUp", 1)], 8, None).await;
        assert_eq!(server.subscription_count(), 1);

        sub.shutdown(&transport, &Context::background()).await.unwrap();
        assert_eq!(server.subscription_count(), 0);
        assert!(sub.state().is_terminal());
        // Second shutdown is a no-op.
        sub.shutdown(&transport, &Context::background()).await.unwrap();
    }

    #[tokio::test]
    async fn test_queued_values_returned_after_deadline() {
        let server = SimulatedServer::demo();
        let transport = connected(&server).await;
        let (mut sub, stats) =
            establish(&transport, &[request("StepUp", 1), request("RandomSignedInt32", 2)], 16, None).await;
        for _ in 0..100 {
            if stats.queued() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(stats.queued(), 2);

        let expired = Context::with_timeout(Duration::ZERO);
        let batch = sub.next_batch(&expired).await.unwrap();
        assert_eq!(batch.len(), 2);

        let err = sub.next_batch(&expired).await.unwrap_err();
        assert!(err.is_deadline_exceeded());
    }

    #[tokio::test]
    async fn test_cancelled_read_still_returns_queued_values() {
        let (mut sub, tx) = fed_subscription(8);
        tx.send(change(1)).await.unwrap();

        let (ctx, cancel) = Context::with_cancel();
        cancel.cancel();
        let batch = sub.next_batch(&ctx).await.unwrap();
        assert_eq!(handles(&batch), [1]);

        let err = sub.next_batch(&ctx).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_later_values_wait_for_next_batch() {
        let (mut sub, tx) = fed_subscription(8);
        for handle in 1..=3 {
            tx.send(change(handle)).await.unwrap();
        }

        let ctx = Context::with_timeout(Duration::from_secs(1));
        let batch = sub.next_batch(&ctx).await.unwrap();
        assert_eq!(handles(&batch), [1, 2, 3]);

        tx.send(change(4)).await.unwrap();
        tx.send(change(5)).await.unwrap();
        let batch = sub.next_batch(&ctx).await.unwrap();
        assert_eq!(handles(&batch), [4, 5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_keeps_order_under_concurrent_producer() {
        const TOTAL: u32 = 5_000;
        let (mut sub, tx) = fed_subscription(64);
        let producer = tokio::spawn(async move {
            for handle in 0..TOTAL {
                tx.send(change(handle)).await.unwrap();
            }
        });

        let ctx = Context::with_timeout(Duration::from_secs(10));
        let mut next = 0;
        while next < TOTAL {
            let batch = sub.next_batch(&ctx).await.unwrap();
            assert!(!batch.is_empty() && batch.len() <= 64);
            for item in batch {
                assert_eq!(item.client_handle, next);
                next += 1;
            }
        }
        producer.await.unwrap();
    }
}
