// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory OPC UA server and the transport that talks to it.
//!
//! [`SimulatedServer`] holds an address space, per-node values and the
//! subscriptions of every connected [`SimulatedTransport`]. Tests mutate it
//! directly; value changes are pushed to monitored items immediately.
//!
//! ```
//! use opcbridge_opcua::client::{SimulatedServer, Variant};
//! use opcbridge_opcua::types::NodeId;
//!
//! let server = SimulatedServer::demo();
//! server.set_value(&NodeId::string(3, "StepUp"), Variant::UInt32(42));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::transport::{
    BrowseReference, ConnectionParams, DataChange, MonitoredItemRequest, MonitoredItemResult,
    NodeAttributes, NotificationSink, OpcUaTransport, SubscriptionSettings, TransportState,
};
use super::variant::{DataValue, Variant, VariantKind};
use crate::error::{
    BrowseError, ConnectionError, OpcUaError, OpcUaResult, OperationError, SubscriptionError,
};
use crate::types::{
    well_known, Credentials, LocalizedText, NodeClass, NodeId, QualifiedName, SecurityMode,
    SecurityPolicy,
};

/// Endpoint reported by every simulated server.
pub const SIMULATOR_ENDPOINT: &str = "opc.tcp://simulator:4840";

const BAD_NODE_ID_UNKNOWN: u32 = 0x8034_0000;
const BAD_BROWSE_FAILED: u32 = 0x8001_0000;

// =============================================================================
// Address space
// =============================================================================

#[derive(Debug, Clone)]
struct SimNode {
    attributes: NodeAttributes,
    value: DataValue,
    references: Vec<(NodeId, NodeId)>,
}

#[derive(Debug)]
struct SimSubscription {
    session: u64,
    sink: NotificationSink,
    items: Vec<(u32, NodeId)>,
}

#[derive(Debug)]
struct ServerState {
    nodes: HashMap<NodeId, SimNode>,
    failing_browse: HashSet<NodeId>,
    user: Option<(String, String)>,
    endpoints: Vec<(SecurityMode, SecurityPolicy)>,
    connect_delay: Duration,
    refuse: Option<String>,
    fail_disconnect: bool,
    failing_reads: Option<u32>,
    sessions: HashSet<u64>,
    next_session: u64,
    subscriptions: HashMap<u32, SimSubscription>,
    next_subscription: u32,
    next_item: u32,
    tick: u64,
}

impl ServerState {
    fn notify(&self, node_id: &NodeId, value: &DataValue) {
        for subscription in self.subscriptions.values() {
            for (client_handle, monitored) in &subscription.items {
                if monitored == node_id {
                    subscription.sink.push(DataChange {
                        client_handle: *client_handle,
                        value: value.clone(),
                    });
                }
            }
        }
    }
}

/// Shared handle to an in-memory OPC UA server.
#[derive(Debug, Clone)]
pub struct SimulatedServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for SimulatedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedServer {
    /// Creates a server exposing the Objects folder and the Server object.
    pub fn new() -> Self {
        let server = Self {
            state: Arc::new(Mutex::new(ServerState {
                nodes: HashMap::new(),
                failing_browse: HashSet::new(),
                user: None,
                endpoints: vec![(SecurityMode::None, SecurityPolicy::None)],
                connect_delay: Duration::ZERO,
                refuse: None,
                fail_disconnect: false,
                failing_reads: None,
                sessions: HashSet::new(),
                next_session: 1,
                subscriptions: HashMap::new(),
                next_subscription: 1,
                next_item: 1,
                tick: 0,
            })),
        };
        server.install_standard_nodes();
        server
    }

    /// Creates a server with a small plant-floor address space.
    ///
    /// ```text
    /// Objects
    /// ├── OpcPlc                        ns=3;s=OpcPlc
    /// │   ├── Telemetry                 ns=3;s=Telemetry
    /// │   │   └── Basic                 ns=3;s=Basic
    /// │   │       ├── AlternatingBoolean
    /// │   │       ├── StepUp            (+ property Unit)
    /// │   │       ├── RandomSignedInt32
    /// │   │       └── RandomUnsignedInt32
    /// │   └── Special                   ns=3;s=Special
    /// │       ├── Int32Array
    /// │       ├── Local Items           ns=3;s=Local Items.test
    /// │       ├── Greeting              (LocalizedText)
    /// │       ├── Unresolved            (null data type)
    /// │       ├── OpaqueStruct          (ExtensionObject)
    /// │       └── ↺ OpcPlc              (back-reference)
    /// └── Server
    /// ```
    pub fn demo() -> Self {
        let server = Self::new();
        let objects = NodeId::standard(well_known::OBJECTS_FOLDER);

        let opc_plc = NodeId::string(3, "OpcPlc");
        let telemetry = NodeId::string(3, "Telemetry");
        let basic = NodeId::string(3, "Basic");
        let special = NodeId::string(3, "Special");

        server.add_object(&objects, opc_plc.clone(), "OpcPlc");
        server.add_object(&opc_plc, telemetry.clone(), "Telemetry");
        server.add_object(&telemetry, basic.clone(), "Basic");
        server.add_object(&opc_plc, special.clone(), "Special");

        server.add_variable(
            &basic,
            NodeId::string(3, "AlternatingBoolean"),
            "AlternatingBoolean",
            NodeId::standard(1),
            Variant::Boolean(false),
        );
        let step_up = NodeId::string(3, "StepUp");
        server.add_variable(
            &basic,
            step_up.clone(),
            "StepUp",
            NodeId::standard(7),
            Variant::UInt32(0),
        );
        server.add_property(
            &step_up,
            NodeId::string(3, "StepUp.Unit"),
            "Unit",
            NodeId::standard(12),
            Variant::String("count".into()),
        );
        server.add_variable(
            &basic,
            NodeId::string(3, "RandomSignedInt32"),
            "RandomSignedInt32",
            NodeId::standard(6),
            Variant::Int32(-17),
        );
        server.add_variable(
            &basic,
            NodeId::string(3, "RandomUnsignedInt32"),
            "RandomUnsignedInt32",
            NodeId::standard(7),
            Variant::UInt32(17),
        );

        server.add_variable(
            &special,
            NodeId::string(3, "Int32Array"),
            "Int32Array",
            NodeId::standard(6),
            Variant::array(
                VariantKind::Int32,
                [i32::MIN, -1, 0, 1, i32::MAX]
                    .into_iter()
                    .map(Variant::Int32)
                    .collect(),
            ),
        );
        server.add_variable(
            &special,
            NodeId::string(3, "Local Items.test"),
            "Local Items",
            NodeId::standard(12),
            Variant::String("hello".into()),
        );
        server.add_variable(
            &special,
            NodeId::string(3, "Greeting"),
            "Greeting",
            NodeId::standard(21),
            Variant::LocalizedText(LocalizedText::new("en-US", "Hello")),
        );
        server.add_variable(
            &special,
            NodeId::string(3, "Unresolved"),
            "Unresolved",
            NodeId::null(),
            Variant::Empty,
        );
        server.add_variable(
            &special,
            NodeId::string(3, "OpaqueStruct"),
            "OpaqueStruct",
            NodeId::numeric(3, 5001),
            Variant::ExtensionObject {
                type_id: NodeId::numeric(3, 5002),
                body: vec![0x01, 0x02, 0x03],
            },
        );
        server.add_reference(&special, &opc_plc, NodeId::standard(well_known::ORGANIZES));

        server
    }

    /// Returns the endpoint URL of this server.
    pub fn endpoint(&self) -> &'static str {
        SIMULATOR_ENDPOINT
    }

    fn install_standard_nodes(&self) {
        let mut state = self.state.lock();
        let mut insert = |node_id: NodeId, name: &str, class: NodeClass, data_type: NodeId, value| {
            state.nodes.insert(
                node_id.clone(),
                SimNode {
                    attributes: NodeAttributes {
                        display_name: name.to_string(),
                        browse_name: QualifiedName::new(node_id.namespace_index, name),
                        data_type,
                        node_class: class,
                    },
                    value: DataValue::good(value),
                    references: Vec::new(),
                },
            );
        };

        insert(
            NodeId::standard(well_known::ROOT_FOLDER),
            "Root",
            NodeClass::Object,
            NodeId::null(),
            Variant::Empty,
        );
        insert(
            NodeId::standard(well_known::OBJECTS_FOLDER),
            "Objects",
            NodeClass::Object,
            NodeId::null(),
            Variant::Empty,
        );
        insert(
            NodeId::standard(2253),
            "Server",
            NodeClass::Object,
            NodeId::null(),
            Variant::Empty,
        );
        insert(
            NodeId::standard(2256),
            "ServerStatus",
            NodeClass::Variable,
            NodeId::standard(862),
            Variant::Empty,
        );
        insert(
            NodeId::standard(well_known::SERVER_STATUS_CURRENT_TIME),
            "CurrentTime",
            NodeClass::Variable,
            NodeId::standard(294),
            Variant::DateTime(Utc::now()),
        );
        insert(
            NodeId::standard(well_known::SERVER_STATUS_STATE),
            "State",
            NodeClass::Variable,
            NodeId::standard(852),
            Variant::Int32(0),
        );
        insert(
            NodeId::standard(2260),
            "BuildInfo",
            NodeClass::Variable,
            NodeId::standard(338),
            Variant::Empty,
        );
        insert(
            NodeId::standard(well_known::BUILD_INFO_PRODUCT_NAME),
            "ProductName",
            NodeClass::Variable,
            NodeId::standard(12),
            Variant::String("opcbridge simulator".into()),
        );
        insert(
            NodeId::standard(well_known::BUILD_INFO_MANUFACTURER_NAME),
            "ManufacturerName",
            NodeClass::Variable,
            NodeId::standard(12),
            Variant::String("Sylvex".into()),
        );
        insert(
            NodeId::standard(well_known::BUILD_INFO_SOFTWARE_VERSION),
            "SoftwareVersion",
            NodeClass::Variable,
            NodeId::standard(12),
            Variant::String(env!("CARGO_PKG_VERSION").into()),
        );

        let organizes = NodeId::standard(well_known::ORGANIZES);
        let component = NodeId::standard(well_known::HAS_COMPONENT);
        let links = [
            (well_known::ROOT_FOLDER, well_known::OBJECTS_FOLDER, &organizes),
            (well_known::OBJECTS_FOLDER, 2253, &organizes),
            (2253, 2256, &component),
            (2256, 2260, &component),
            (2256, well_known::SERVER_STATUS_CURRENT_TIME, &component),
            (2256, well_known::SERVER_STATUS_STATE, &component),
            (2260, well_known::BUILD_INFO_PRODUCT_NAME, &component),
            (2260, well_known::BUILD_INFO_MANUFACTURER_NAME, &component),
            (2260, well_known::BUILD_INFO_SOFTWARE_VERSION, &component),
        ];
        for (source, target, reference_type) in links {
            if let Some(node) = state.nodes.get_mut(&NodeId::standard(source)) {
                node.references
                    .push((NodeId::standard(target), reference_type.clone()));
            }
        }
    }

    // =========================================================================
    // Address space construction
    // =========================================================================

    fn insert_node(
        &self,
        parent: &NodeId,
        node_id: NodeId,
        name: &str,
        class: NodeClass,
        data_type: NodeId,
        value: Variant,
        reference_type: u32,
    ) {
        let mut state = self.state.lock();
        state.nodes.insert(
            node_id.clone(),
            SimNode {
                attributes: NodeAttributes {
                    display_name: name.to_string(),
                    browse_name: QualifiedName::new(node_id.namespace_index, name),
                    data_type,
                    node_class: class,
                },
                value: DataValue::good(value),
                references: Vec::new(),
            },
        );
        if let Some(parent) = state.nodes.get_mut(parent) {
            parent
                .references
                .push((node_id, NodeId::standard(reference_type)));
        }
    }

    /// Adds an object (folder) node under `parent`.
    pub fn add_object(&self, parent: &NodeId, node_id: NodeId, name: &str) {
        self.insert_node(
            parent,
            node_id,
            name,
            NodeClass::Object,
            NodeId::null(),
            Variant::Empty,
            well_known::ORGANIZES,
        );
    }

    /// Adds a variable node under `parent`.
    pub fn add_variable(
        &self,
        parent: &NodeId,
        node_id: NodeId,
        name: &str,
        data_type: NodeId,
        value: Variant,
    ) {
        self.insert_node(
            parent,
            node_id,
            name,
            NodeClass::Variable,
            data_type,
            value,
            well_known::HAS_COMPONENT,
        );
    }

    /// Adds a property of `parent`, linked through HasProperty.
    pub fn add_property(
        &self,
        parent: &NodeId,
        node_id: NodeId,
        name: &str,
        data_type: NodeId,
        value: Variant,
    ) {
        self.insert_node(
            parent,
            node_id,
            name,
            NodeClass::Variable,
            data_type,
            value,
            well_known::HAS_PROPERTY,
        );
    }

    /// Adds a reference between two existing nodes.
    pub fn add_reference(&self, source: &NodeId, target: &NodeId, reference_type: NodeId) {
        if let Some(node) = self.state.lock().nodes.get_mut(source) {
            node.references.push((target.clone(), reference_type));
        }
    }

    // =========================================================================
    // Behaviour knobs
    // =========================================================================

    /// Makes browsing `node_id` fail.
    pub fn fail_browse(&self, node_id: &NodeId) {
        self.state.lock().failing_browse.insert(node_id.clone());
    }

    /// Requires username/password authentication.
    pub fn require_user(&self, username: &str, password: &str) {
        self.state.lock().user = Some((username.to_string(), password.to_string()));
    }

    /// Adds a supported endpoint security configuration.
    pub fn allow_security(&self, mode: SecurityMode, policy: SecurityPolicy) {
        self.state.lock().endpoints.push((mode, policy));
    }

    /// Delays every connect.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    /// Refuses every connect with `reason`.
    pub fn refuse_connections(&self, reason: &str) {
        self.state.lock().refuse = Some(reason.to_string());
    }

    /// Makes session release report an error.
    pub fn fail_disconnect(&self, fail: bool) {
        self.state.lock().fail_disconnect = fail;
    }

    /// Makes every Read service call fail with `status`, or restores reads
    /// with `None`. The session stays open.
    pub fn fail_reads(&self, status: Option<u32>) {
        self.state.lock().failing_reads = status;
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Sets a node value and notifies monitored items.
    pub fn set_value(&self, node_id: &NodeId, value: Variant) {
        self.set_data_value(node_id, DataValue::good(value));
    }

    /// Sets a node value with an explicit status and notifies.
    pub fn set_data_value(&self, node_id: &NodeId, value: DataValue) {
        let mut state = self.state.lock();
        if let Some(node) = state.nodes.get_mut(node_id) {
            node.value = value.clone();
            state.notify(node_id, &value);
        }
    }

    /// Advances the demo signals by one step.
    pub fn tick(&self) {
        let step = {
            let mut state = self.state.lock();
            state.tick += 1;
            state.tick
        };
        let signed = ((step.wrapping_mul(2_654_435_761) % 2001) as i32) - 1000;

        self.set_value(
            &NodeId::standard(well_known::SERVER_STATUS_CURRENT_TIME),
            Variant::DateTime(Utc::now()),
        );
        self.set_value(
            &NodeId::string(3, "AlternatingBoolean"),
            Variant::Boolean(step % 2 == 1),
        );
        self.set_value(&NodeId::string(3, "StepUp"), Variant::UInt32(step as u32));
        self.set_value(
            &NodeId::string(3, "RandomSignedInt32"),
            Variant::Int32(signed),
        );
        self.set_value(
            &NodeId::string(3, "RandomUnsignedInt32"),
            Variant::UInt32(signed.unsigned_abs()),
        );
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of open sessions.
    pub fn active_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Number of monitored items across all subscriptions.
    pub fn monitored_item_count(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .map(|s| s.items.len())
            .sum()
    }

    /// Drops every subscription without telling the clients.
    pub fn drop_subscriptions(&self) {
        self.state.lock().subscriptions.clear();
    }
}

// =============================================================================
// SimulatedTransport
// =============================================================================

/// [`OpcUaTransport`] backed by a [`SimulatedServer`].
#[derive(Debug)]
pub struct SimulatedTransport {
    server: SimulatedServer,
    session: Option<u64>,
    state: TransportState,
}

impl SimulatedTransport {
    /// Creates a transport for `server`.
    pub fn new(server: SimulatedServer) -> Self {
        Self {
            server,
            session: None,
            state: TransportState::Disconnected,
        }
    }

    /// Returns the transport state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    fn session(&self) -> OpcUaResult<u64> {
        let session = self
            .session
            .ok_or_else(|| OpcUaError::transport("no active session"))?;
        if self.server.state.lock().sessions.contains(&session) {
            Ok(session)
        } else {
            Err(OpcUaError::transport("session closed by server"))
        }
    }
}

#[async_trait]
impl OpcUaTransport for SimulatedTransport {
    async fn connect(&mut self, params: &ConnectionParams) -> OpcUaResult<()> {
        let delay = self.server.state.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.server.state.lock();

        if let Some(reason) = &state.refuse {
            return Err(ConnectionError::refused(&params.endpoint, reason.as_str()).into());
        }

        if !state
            .endpoints
            .contains(&(params.security_mode, params.security_policy))
        {
            return Err(ConnectionError::no_matching_endpoint(
                &params.endpoint,
                params.security_mode,
                params.security_policy,
            )
            .into());
        }

        if let Some((user, password)) = &state.user {
            match &params.credentials {
                Credentials::Anonymous => {
                    return Err(ConnectionError::authentication_failed(
                        &params.endpoint,
                        "anonymous identity rejected",
                    )
                    .into())
                }
                Credentials::UserName {
                    username,
                    password: given,
                } if username != user || given != password => {
                    return Err(ConnectionError::authentication_failed(
                        &params.endpoint,
                        "invalid username or password",
                    )
                    .into())
                }
                Credentials::UserName { .. } => {}
            }
        }

        let session = state.next_session;
        state.next_session += 1;
        state.sessions.insert(session);
        drop(state);

        self.session = Some(session);
        self.state = TransportState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> OpcUaResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.state = TransportState::Disconnected;

        let mut state = self.server.state.lock();
        state.sessions.remove(&session);
        state.subscriptions.retain(|_, s| s.session != session);

        if state.fail_disconnect {
            return Err(OpcUaError::transport("CloseSession failed"));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session().is_ok()
    }

    async fn browse(&self, node_id: &NodeId) -> OpcUaResult<Vec<BrowseReference>> {
        self.session()?;
        let state = self.server.state.lock();

        if state.failing_browse.contains(node_id) {
            return Err(BrowseError::branch_failed(
                node_id.to_string(),
                format!("status 0x{:08X}", BAD_BROWSE_FAILED),
            )
            .into());
        }

        let node = state
            .nodes
            .get(node_id)
            .ok_or_else(|| BrowseError::node_not_found(node_id.to_string()))?;

        Ok(node
            .references
            .iter()
            .filter_map(|(target, reference_type)| {
                state.nodes.get(target).map(|t| BrowseReference {
                    node_id: target.clone(),
                    reference_type_id: reference_type.clone(),
                    browse_name: t.attributes.browse_name.clone(),
                    display_name: t.attributes.display_name.clone(),
                    node_class: t.attributes.node_class,
                })
            })
            .collect())
    }

    async fn read_attributes(&self, node_id: &NodeId) -> OpcUaResult<NodeAttributes> {
        self.session()?;
        self.server
            .state
            .lock()
            .nodes
            .get(node_id)
            .map(|n| n.attributes.clone())
            .ok_or_else(|| BrowseError::node_not_found(node_id.to_string()).into())
    }

    async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<DataValue>> {
        self.session()?;
        let state = self.server.state.lock();
        if let Some(status) = state.failing_reads {
            return Err(OpcUaError::read_failed(OperationError::status_code_name(status)));
        }
        Ok(node_ids
            .iter()
            .map(|id| match state.nodes.get(id) {
                Some(node) => node.value.clone(),
                None => DataValue::with_status(BAD_NODE_ID_UNKNOWN),
            })
            .collect())
    }

    async fn create_subscription(
        &self,
        _settings: &SubscriptionSettings,
        sink: NotificationSink,
    ) -> OpcUaResult<u32> {
        let session = self.session()?;
        let mut state = self.server.state.lock();
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscriptions.insert(
            id,
            SimSubscription {
                session,
                sink,
                items: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        self.session()?;
        let mut guard = self.server.state.lock();
        let state = &mut *guard;

        let subscription = state
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or(SubscriptionError::NotFound(subscription_id))?;

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let Some(node) = state.nodes.get(&item.node_id) else {
                results.push(MonitoredItemResult {
                    client_handle: item.client_handle,
                    monitored_item_id: 0,
                    status_code: BAD_NODE_ID_UNKNOWN,
                });
                continue;
            };

            subscription
                .items
                .push((item.client_handle, item.node_id.clone()));
            let monitored_item_id = state.next_item;
            state.next_item += 1;

            // Initial value, as real servers send on item creation.
            subscription.sink.push(DataChange {
                client_handle: item.client_handle,
                value: node.value.clone(),
            });

            results.push(MonitoredItemResult {
                client_handle: item.client_handle,
                monitored_item_id,
                status_code: 0,
            });
        }
        Ok(results)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.session()?;
        self.server
            .state
            .lock()
            .subscriptions
            .remove(&subscription_id)
            .map(|_| ())
            .ok_or_else(|| SubscriptionError::NotFound(subscription_id).into())
    }

    fn display_name(&self) -> String {
        format!("simulator({})", self.server.endpoint())
    }
}

// =============================================================================
// Tests
// =============================================================================
