// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connector integration tests.
//!
//! Every scenario runs against the in-memory simulator. Heartbeat staleness
//! is driven through a [`ManualClock`], so no test waits on wall-clock time
//! beyond short read deadlines.
//!
//! ```bash
//! cargo test -p opcbridge-opcua --test connector_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use opcbridge_opcua::browse::{META_PATH, META_TAG_GROUP, META_TAG_NAME, META_TAG_PATH, META_TAG_TYPE};
use opcbridge_opcua::{
    ConnectorConfig, Context, DataValue, ManualClock, NodeId, OpcUaConnector, OpcUaError, Record,
    SessionState, SimulatedServer, SimulatedTransport, Variant,
};

// =============================================================================
// Helpers
// =============================================================================

const SHORT: Duration = Duration::from_millis(100);

fn base(server: &SimulatedServer, seeds: &[&str]) -> opcbridge_opcua::ConnectorConfigBuilder {
    ConnectorConfig::builder()
        .endpoint(server.endpoint())
        .node_ids(seeds.iter().copied())
}

fn connector_with_clock(
    server: &SimulatedServer,
    config: ConnectorConfig,
    clock: Arc<ManualClock>,
) -> OpcUaConnector {
    OpcUaConnector::with_clock(config, Box::new(SimulatedTransport::new(server.clone())), clock)
}

fn connector(server: &SimulatedServer, config: ConnectorConfig) -> OpcUaConnector {
    connector_with_clock(server, config, Arc::new(ManualClock::new(0)))
}

/// Reads batches until `expected` records arrived or the reads run dry.
async fn collect(connector: &mut OpcUaConnector, expected: usize) -> Vec<Record> {
    let mut records = Vec::new();
    let mut empty_reads = 0;
    while records.len() < expected && empty_reads < 3 {
        match connector.read_batch(&Context::with_timeout(SHORT)).await {
            Ok((batch, ack)) => {
                ack.ack();
                if batch.is_empty() {
                    empty_reads += 1;
                }
                records.extend(batch);
            }
            Err(e) if e.is_deadline_exceeded() => break,
            Err(e) => panic!("unexpected read error: {e}"),
        }
    }
    records
}

fn names(records: &[Record]) -> Vec<&str> {
    let mut names: Vec<&str> = records.iter().filter_map(|r| r.meta(META_TAG_NAME)).collect();
    names.sort_unstable();
    names
}

// =============================================================================
// Browsing and metadata
// =============================================================================

#[tokio::test]
async fn test_poll_basic_folder() {
    let server = SimulatedServer::demo();
    let mut connector = connector(&server, base(&server, &["ns=3;s=Basic"]).build().unwrap());
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(connector.targets().len(), 4);

    let (batch, ack) = connector.read_batch(&Context::background()).await.unwrap();
    ack.ack();
    assert_eq!(batch.len(), 4);

    let step_up = batch
        .iter()
        .find(|r| r.meta(META_TAG_NAME) == Some("StepUp"))
        .unwrap();
    assert_eq!(step_up.meta(META_PATH), Some("ns_3_s_StepUp"));
    assert_eq!(step_up.meta(META_TAG_PATH), Some("Basic.StepUp"));
    assert_eq!(step_up.meta(META_TAG_GROUP), Some("Basic"));
    assert_eq!(step_up.meta(META_TAG_TYPE), Some("number"));

    let boolean = batch
        .iter()
        .find(|r| r.meta(META_TAG_NAME) == Some("AlternatingBoolean"))
        .unwrap();
    assert_eq!(boolean.meta(META_TAG_TYPE), Some("bool"));
    assert_eq!(boolean.value.as_bool(), Some(false));
}

#[tokio::test]
async fn test_group_from_upper_folder() {
    let server = SimulatedServer::demo();
    let mut connector = connector(&server, base(&server, &["ns=3;s=Telemetry"]).build().unwrap());
    connector.connect(&Context::background()).await.unwrap();

    let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
    assert_eq!(batch.len(), 4);
    assert!(batch
        .iter()
        .all(|r| r.meta(META_TAG_GROUP) == Some("Telemetry.Basic")));
}

#[tokio::test]
async fn test_single_variable_seed() {
    let server = SimulatedServer::demo();
    let mut connector = connector(&server, base(&server, &["ns=3;s=StepUp"]).build().unwrap());
    connector.connect(&Context::background()).await.unwrap();

    let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
    assert_eq!(names(batch.records()), ["StepUp"]);
}

#[tokio::test]
async fn test_properties_follow_flag() {
    let server = SimulatedServer::demo();

    let mut without = connector(&server, base(&server, &["ns=3;s=StepUp"]).build().unwrap());
    without.connect(&Context::background()).await.unwrap();
    let (batch, _) = without.read_batch(&Context::background()).await.unwrap();
    assert_eq!(names(batch.records()), ["StepUp"]);

    let mut with = connector(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .browse_properties(true)
            .build()
            .unwrap(),
    );
    with.connect(&Context::background()).await.unwrap();
    let (batch, _) = with.read_batch(&Context::background()).await.unwrap();
    assert_eq!(names(batch.records()), ["StepUp", "Unit"]);

    let unit = batch.iter().find(|r| r.meta(META_TAG_NAME) == Some("Unit")).unwrap();
    assert_eq!(unit.value.as_text(), Some("count"));
    assert_eq!(unit.meta(META_TAG_PATH), Some("StepUp.Unit"));
}

#[tokio::test]
async fn test_unparsable_seed_is_skipped() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=StepUp", "ns=;x=broken"]).build().unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();

    let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
    assert_eq!(batch.len(), 1);
}

#[tokio::test]
async fn test_no_seeds_browses_objects_folder() {
    let server = SimulatedServer::demo();
    let mut connector = connector(&server, base(&server, &[]).build().unwrap());
    connector.connect(&Context::background()).await.unwrap();

    let step_up = connector
        .targets()
        .iter()
        .find(|t| t.node_id == NodeId::string(3, "StepUp"))
        .unwrap();
    assert_eq!(step_up.metadata.tag_path, "Objects.OpcPlc.Telemetry.Basic.StepUp");
}

// =============================================================================
// Values
// =============================================================================

#[tokio::test]
async fn test_failed_poll_read_keeps_session() {
    let server = SimulatedServer::demo();
    let mut connector = connector(&server, base(&server, &["ns=3;s=Basic"]).build().unwrap());
    connector.connect(&Context::background()).await.unwrap();

    server.fail_reads(Some(0x8002_0000));
    let err = connector.read_batch(&Context::background()).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Operation(_)));
    assert!(err.is_retryable());
    assert_eq!(connector.state(), SessionState::Connected);

    server.fail_reads(None);
    let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
    assert_eq!(batch.len(), 4);
}

#[tokio::test]
async fn test_int32_array_value() {
    let server = SimulatedServer::demo();
    let mut connector = connector(&server, base(&server, &["ns=3;s=Int32Array"]).build().unwrap());
    connector.connect(&Context::background()).await.unwrap();

    let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
    assert_eq!(batch.len(), 1);
    let values = batch.records()[0].value.as_array().unwrap();
    let numbers: Vec<_> = values.iter().filter_map(|v| v.as_number()).collect();
    assert_eq!(numbers, ["-2147483648", "-1", "0", "1", "2147483647"]);

    let json = serde_json::to_value(&batch.records()[0]).unwrap();
    assert_eq!(json["value"][4], serde_json::json!(2_147_483_647));
}

#[tokio::test]
async fn test_unsupported_value_dropped_rest_proceed() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=OpaqueStruct", "ns=3;s=StepUp"]).build().unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(connector.targets().len(), 2);

    let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
    assert_eq!(names(batch.records()), ["StepUp"]);
    assert_eq!(connector.stats().dropped_values(), 1);
}

#[tokio::test]
async fn test_null_data_type_is_not_acquired() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=Unresolved"])
            .subscribe_enabled(true)
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert!(connector.targets().is_empty());

    let (batch, _) = connector
        .read_batch(&Context::with_timeout(SHORT))
        .await
        .unwrap();
    assert!(batch.is_empty());
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn test_subscription_delivers_changes() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=Basic"])
            .subscribe_enabled(true)
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert!(connector.is_subscribed());
    assert_eq!(server.monitored_item_count(), 4);

    let initial = collect(&mut connector, 4).await;
    assert_eq!(initial.len(), 4);

    server.set_value(&NodeId::string(3, "StepUp"), Variant::UInt32(42));
    let changed = collect(&mut connector, 1).await;
    assert_eq!(names(&changed), ["StepUp"]);
    assert_eq!(changed[0].value.as_number(), Some("42"));
    assert!(connector.stats().notifications_received() >= 5);
}

#[tokio::test]
async fn test_queued_notifications_beat_expired_deadline() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=Basic"])
            .subscribe_enabled(true)
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    for _ in 0..100 {
        if connector.stats().notifications_received() == 4 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(connector.stats().notifications_received(), 4);

    let (batch, ack) = connector
        .read_batch(&Context::with_timeout(Duration::ZERO))
        .await
        .unwrap();
    ack.ack();
    assert_eq!(batch.len(), 4);

    let err = connector
        .read_batch(&Context::with_timeout(Duration::ZERO))
        .await
        .unwrap_err();
    assert!(err.is_deadline_exceeded());
}

#[tokio::test]
async fn test_subscription_deadline_without_heartbeat() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .subscribe_enabled(true)
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(collect(&mut connector, 1).await.len(), 1);

    let err = connector
        .read_batch(&Context::with_timeout(SHORT))
        .await
        .unwrap_err();
    assert!(err.is_deadline_exceeded());
    assert_eq!(connector.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_subscription_deadline_with_heartbeat_is_empty_batch() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .subscribe_enabled(true)
            .heartbeat("i=2258")
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(collect(&mut connector, 2).await.len(), 2);

    let (batch, _) = connector
        .read_batch(&Context::with_timeout(SHORT))
        .await
        .unwrap();
    assert!(batch.is_empty());
}

#[tokio::test]
async fn test_heartbeat_only_subscription() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=Unresolved"])
            .subscribe_enabled(true)
            .heartbeat("i=2258")
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert!(connector.targets().is_empty());

    let records = collect(&mut connector, 1).await;
    assert_eq!(names(&records), ["CurrentTime"]);
    assert_eq!(records[0].meta(META_TAG_TYPE), Some("string"));
}

#[tokio::test]
async fn test_heartbeat_node_also_target_is_monitored_twice() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .subscribe_enabled(true)
            .heartbeat("ns=3;s=StepUp")
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(server.monitored_item_count(), 2);
    assert_eq!(collect(&mut connector, 2).await.len(), 2);

    server.set_value(&NodeId::string(3, "StepUp"), Variant::UInt32(7));
    let records = collect(&mut connector, 2).await;
    assert_eq!(names(&records), ["StepUp", "StepUp"]);
}

#[tokio::test]
async fn test_bad_notification_dropped() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .subscribe_enabled(true)
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(collect(&mut connector, 1).await.len(), 1);

    server.set_data_value(&NodeId::string(3, "StepUp"), DataValue::with_status(0x8031_0000));
    server.set_value(&NodeId::string(3, "StepUp"), Variant::UInt32(9));

    let records = collect(&mut connector, 1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value.as_number(), Some("9"));
    assert_eq!(connector.stats().dropped_values(), 1);
}

#[tokio::test]
async fn test_lost_subscription_fails_session() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .subscribe_enabled(true)
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(collect(&mut connector, 1).await.len(), 1);

    server.drop_subscriptions();
    let err = connector
        .read_batch(&Context::with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(err.is_not_connected());
    assert_eq!(connector.state(), SessionState::Failed);
}

// =============================================================================
// Heartbeat
// =============================================================================

#[tokio::test]
async fn test_stale_heartbeat_fails_next_read() {
    let server = SimulatedServer::demo();
    let clock = Arc::new(ManualClock::new(0));
    let mut connector = connector_with_clock(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .subscribe_enabled(true)
            .heartbeat("i=2258")
            .heartbeat_interval(Duration::from_secs(1))
            .heartbeat_stale_multiplier(10)
            .build()
            .unwrap(),
        clock.clone(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(collect(&mut connector, 2).await.len(), 2);

    clock.advance(Duration::from_secs(9));
    assert!(connector.read_batch(&Context::with_timeout(SHORT)).await.is_ok());

    clock.advance(Duration::from_secs(2));
    let err = connector
        .read_batch(&Context::with_timeout(SHORT))
        .await
        .unwrap_err();
    assert!(err.is_not_connected());
    assert_eq!(connector.state(), SessionState::Failed);
    assert_eq!(connector.stats().heartbeat_failures(), 1);

    // Stays failed until the host reconnects.
    assert!(connector
        .read_batch(&Context::with_timeout(SHORT))
        .await
        .unwrap_err()
        .is_not_connected());

    connector.close(&Context::background()).await.unwrap();
    assert_eq!(connector.state(), SessionState::Disconnected);
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(connector.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_heartbeat_updates_keep_session_alive() {
    let server = SimulatedServer::demo();
    let clock = Arc::new(ManualClock::new(0));
    let mut connector = connector_with_clock(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .subscribe_enabled(true)
            .heartbeat("i=2258")
            .build()
            .unwrap(),
        clock.clone(),
    );
    connector.connect(&Context::background()).await.unwrap();
    collect(&mut connector, 2).await;

    for _ in 0..5 {
        clock.advance(Duration::from_secs(4));
        server.tick();
        let records = collect(&mut connector, 2).await;
        assert!(!records.is_empty());
    }
    assert_eq!(connector.state(), SessionState::Connected);
    assert_eq!(connector.stats().heartbeat_failures(), 0);
}

#[tokio::test]
async fn test_poll_mode_heartbeat_read() {
    let server = SimulatedServer::demo();
    let clock = Arc::new(ManualClock::new(0));
    let mut connector = connector_with_clock(
        &server,
        base(&server, &["ns=3;s=StepUp"])
            .heartbeat("i=2258")
            .build()
            .unwrap(),
        clock.clone(),
    );
    connector.connect(&Context::background()).await.unwrap();

    for _ in 0..3 {
        clock.advance(Duration::from_secs(6));
        let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
        assert_eq!(names(batch.records()), ["CurrentTime", "StepUp"]);
    }

    server.set_data_value(
        &NodeId::standard(2258),
        DataValue::with_status(0x8031_0000),
    );
    clock.advance(Duration::from_secs(6));
    let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
    assert_eq!(names(batch.records()), ["StepUp"]);

    clock.advance(Duration::from_secs(6));
    assert!(connector
        .read_batch(&Context::background())
        .await
        .unwrap_err()
        .is_not_connected());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_close_releases_subscription() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=Basic"])
            .subscribe_enabled(true)
            .build()
            .unwrap(),
    );
    connector.connect(&Context::background()).await.unwrap();
    assert_eq!(server.subscription_count(), 1);
    assert_eq!(server.active_sessions(), 1);

    connector.close(&Context::background()).await.unwrap();
    assert_eq!(server.subscription_count(), 0);
    assert_eq!(server.active_sessions(), 0);
    assert!(connector
        .read_batch(&Context::background())
        .await
        .unwrap_err()
        .is_not_connected());
}

#[tokio::test]
async fn test_close_with_done_context_still_releases() {
    let server = SimulatedServer::demo();
    let mut connector = connector(
        &server,
        base(&server, &["ns=3;s=Basic"])
            .subscribe_enabled(true)
            .build()
            .unwrap(),
    );

    connector.connect(&Context::background()).await.unwrap();
    connector
        .close(&Context::with_timeout(Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(connector.state(), SessionState::Disconnected);
    assert_eq!(server.subscription_count(), 0);
    assert_eq!(server.active_sessions(), 0);

    let (cancelled, cancel) = Context::with_cancel();
    cancel.cancel();
    connector.connect(&Context::background()).await.unwrap();
    connector.close(&cancelled).await.unwrap();
    assert_eq!(server.subscription_count(), 0);
    assert_eq!(server.active_sessions(), 0);
}

#[tokio::test]
async fn test_reconnect_after_close() {
    let server = SimulatedServer::demo();
    let mut connector = connector(&server, base(&server, &["ns=3;s=Basic"]).build().unwrap());

    for _ in 0..2 {
        connector.connect(&Context::background()).await.unwrap();
        let (batch, _) = connector.read_batch(&Context::background()).await.unwrap();
        assert_eq!(batch.len(), 4);
        connector.close(&Context::background()).await.unwrap();
    }
    assert_eq!(server.active_sessions(), 0);
}

#[tokio::test]
async fn test_authentication_failure_leaves_connector_reusable() {
    let server = SimulatedServer::demo();
    server.require_user("operator", "secret");

    let mut anonymous = connector(&server, base(&server, &["ns=3;s=Basic"]).build().unwrap());
    let err = anonymous.connect(&Context::background()).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Connection(_)));
    assert_eq!(anonymous.state(), SessionState::Disconnected);

    let mut user = connector(
        &server,
        base(&server, &["ns=3;s=Basic"])
            .username("operator", "secret")
            .build()
            .unwrap(),
    );
    user.connect(&Context::background()).await.unwrap();
    assert_eq!(user.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_server_information() {
    let server = SimulatedServer::demo();
    let mut connector = connector(&server, base(&server, &["ns=3;s=Basic"]).build().unwrap());
    connector.connect(&Context::background()).await.unwrap();

    let info = connector
        .get_server_information(&Context::background())
        .await
        .unwrap();
    assert_eq!(info.manufacturer_name, "Sylvex");
    assert_eq!(info.product_name, "opcbridge simulator");
}
