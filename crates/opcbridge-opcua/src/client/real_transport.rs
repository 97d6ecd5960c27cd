// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport over the `opcua` crate client.
//!
//! The `opcua` 0.12 session API is blocking, so every service call runs on
//! the blocking pool. Subscriptions are published by the session's own
//! background loop, started with [`Session::run_async`]; its data-change
//! callback forwards into the channel handed to `create_subscription`.
//!
//! # Features
//!
//! - Endpoint selection by security policy URI and message security mode
//! - Anonymous and username/password identities
//! - Hierarchical browse with continuation points
//! - Attribute and value reads
//! - Subscriptions routed back to caller-assigned client handles

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use opcua::client::prelude::{
    AttributeService, ClientBuilder, DataChangeCallback, IdentityToken, MonitoredItem,
    MonitoredItemService, Session, SessionCommand, SubscriptionService, ViewService,
};
use opcua::sync::RwLock as OpcUaRwLock;
use opcua::types as ua;

use super::transport::{
    BrowseReference, ConnectionParams, DataChange, MonitoredItemRequest, MonitoredItemResult,
    NodeAttributes, NotificationSink, OpcUaTransport, SubscriptionSettings, TransportState,
};
use super::variant::{DataValue, Variant, VariantKind};
use crate::error::{
    BrowseError, ConnectionError, OpcUaError, OpcUaResult, OperationError, SubscriptionError,
};
use crate::types::{
    Credentials, ExpandedNodeId, LocalizedText, NodeClass, NodeId, NodeIdentifier, QualifiedName,
    SecurityMode,
};

type SharedSession = Arc<OpcUaRwLock<Session>>;

/// Maps server monitored item ids to caller client handles.
type HandleRoutes = Arc<Mutex<HashMap<u32, u32>>>;

// =============================================================================
// RealOpcUaTransport
// =============================================================================

/// [`OpcUaTransport`] talking to a real server.
pub struct RealOpcUaTransport {
    endpoint: String,
    state: TransportState,
    session: Option<SharedSession>,
    session_loop: Option<oneshot::Sender<SessionCommand>>,
    routes: Mutex<HashMap<u32, HandleRoutes>>,
}

impl RealOpcUaTransport {
    /// Creates an unconnected transport.
    pub fn new() -> Self {
        Self {
            endpoint: String::new(),
            state: TransportState::Disconnected,
            session: None,
            session_loop: None,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the transport state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    fn session(&self) -> OpcUaResult<SharedSession> {
        self.session
            .clone()
            .ok_or_else(|| OpcUaError::transport("no active session"))
    }

    /// Runs a blocking session call off the async runtime.
    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> OpcUaResult<T>
    where
        F: FnOnce(SharedSession) -> OpcUaResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session()?;
        tokio::task::spawn_blocking(move || f(session))
            .await
            .map_err(|e| OpcUaError::transport(format!("{} task failed: {}", operation, e)))?
    }
}

impl Default for RealOpcUaTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn open_session(params: &ConnectionParams) -> OpcUaResult<SharedSession> {
    let mut builder = ClientBuilder::new()
        .application_name(params.application_name.as_str())
        .application_uri(params.application_uri.as_str())
        .create_sample_keypair(!params.security_mode.is_none())
        .trust_server_certs(params.trust_server_certs)
        .session_retry_limit(0)
        .session_timeout(params.session_timeout.as_millis() as u32);
    if let Some(dir) = &params.pki_dir {
        builder = builder.pki_dir(dir.as_str());
    }

    let mut client = builder.client().ok_or_else(|| {
        ConnectionError::refused(&params.endpoint, "invalid client configuration")
    })?;

    let endpoints = client
        .get_server_endpoints_from_url(params.endpoint.as_str())
        .map_err(|status| ConnectionError::refused(&params.endpoint, status_name(status)))?;

    let policy_uri = params.security_policy.uri();
    let mode = message_security_mode(params.security_mode);
    let endpoint = endpoints
        .into_iter()
        .find(|e| e.security_policy_uri.as_ref() == policy_uri && e.security_mode == mode)
        .ok_or_else(|| {
            ConnectionError::no_matching_endpoint(
                &params.endpoint,
                params.security_mode,
                params.security_policy,
            )
        })?;

    tracing::debug!(
        endpoint = %params.endpoint,
        security_policy = %endpoint.security_policy_uri,
        security_mode = ?endpoint.security_mode,
        "Matched server endpoint"
    );

    let identity = match &params.credentials {
        Credentials::Anonymous => IdentityToken::Anonymous,
        Credentials::UserName { username, password } => {
            IdentityToken::UserName(username.clone(), password.clone())
        }
    };

    client
        .connect_to_endpoint(endpoint, identity)
        .map_err(|status| {
            let reason = status_name(status);
            if status == ua::StatusCode::BadUserAccessDenied
                || status == ua::StatusCode::BadIdentityTokenInvalid
                || status == ua::StatusCode::BadIdentityTokenRejected
            {
                ConnectionError::authentication_failed(&params.endpoint, reason).into()
            } else {
                OpcUaError::from(ConnectionError::refused(&params.endpoint, reason))
            }
        })
}

#[async_trait]
impl OpcUaTransport for RealOpcUaTransport {
    async fn connect(&mut self, params: &ConnectionParams) -> OpcUaResult<()> {
        let owned = params.clone();
        let session = tokio::task::spawn_blocking(move || open_session(&owned))
            .await
            .map_err(|e| OpcUaError::transport(format!("connect task failed: {}", e)))??;

        self.session_loop = Some(Session::run_async(session.clone()));
        self.session = Some(session);
        self.endpoint = params.endpoint.clone();
        self.state = TransportState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> OpcUaResult<()> {
        self.state = TransportState::Disconnected;
        self.routes.lock().clear();
        if let Some(stop) = self.session_loop.take() {
            let _ = stop.send(SessionCommand::Stop);
        }
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || session.read().disconnect())
            .await
            .map_err(|e| OpcUaError::transport(format!("disconnect task failed: {}", e)))
    }

    fn is_connected(&self) -> bool {
        self.state == TransportState::Connected
    }

    async fn browse(&self, node_id: &NodeId) -> OpcUaResult<Vec<BrowseReference>> {
        let source = node_id.clone();
        self.blocking("browse", move |session| {
            let session = session.read();
            let description = ua::BrowseDescription {
                node_id: to_ua_node_id(&source),
                browse_direction: ua::BrowseDirection::Forward,
                reference_type_id: ua::ReferenceTypeId::HierarchicalReferences.into(),
                include_subtypes: true,
                node_class_mask: 0,
                result_mask: ua::BrowseDescriptionResultMask::all().bits(),
            };
            let fail = |status: ua::StatusCode| {
                OpcUaError::from(BrowseError::branch_failed(source.to_string(), status_name(status)))
            };

            let mut references = Vec::new();
            let mut result = session
                .browse(&[description])
                .map_err(fail)?
                .and_then(|r| r.into_iter().next());

            while let Some(page) = result.take() {
                if page.status_code.is_bad() {
                    return Err(fail(page.status_code));
                }
                references.extend(
                    page.references
                        .unwrap_or_default()
                        .iter()
                        .filter(|r| r.node_id.server_index == 0)
                        .map(|r| BrowseReference {
                            node_id: from_ua_node_id(&r.node_id.node_id),
                            reference_type_id: from_ua_node_id(&r.reference_type_id),
                            browse_name: QualifiedName::new(
                                r.browse_name.namespace_index,
                                r.browse_name.name.as_ref(),
                            ),
                            display_name: r.display_name.text.as_ref().to_string(),
                            node_class: NodeClass::from_value(r.node_class as u32),
                        }),
                );
                if !page.continuation_point.is_null() {
                    result = session
                        .browse_next(false, &[page.continuation_point])
                        .map_err(fail)?
                        .and_then(|r| r.into_iter().next());
                }
            }
            Ok(references)
        })
        .await
    }

    async fn read_attributes(&self, node_id: &NodeId) -> OpcUaResult<NodeAttributes> {
        let target = node_id.clone();
        self.blocking("read_attributes", move |session| {
            let ids: Vec<ua::ReadValueId> = [
                ua::AttributeId::NodeClass,
                ua::AttributeId::BrowseName,
                ua::AttributeId::DisplayName,
                ua::AttributeId::DataType,
            ]
            .into_iter()
            .map(|attribute| read_value_id(&target, attribute))
            .collect();

            let values = session
                .read()
                .read(&ids, ua::TimestampsToReturn::Neither, 0.0)
                .map_err(|status| {
                    OpcUaError::from(BrowseError::attributes_failed(target.to_string(), status_name(status)))
                })?;
            if values.len() != ids.len() {
                return Err(OperationError::ResultCountMismatch {
                    expected: ids.len(),
                    actual: values.len(),
                }
                .into());
            }

            let node_class = match &values[0].value {
                Some(ua::Variant::Int32(v)) if is_good(&values[0]) => NodeClass::from_value(*v as u32),
                _ => return Err(BrowseError::node_not_found(target.to_string()).into()),
            };
            let browse_name = match &values[1].value {
                Some(ua::Variant::QualifiedName(q)) => {
                    QualifiedName::new(q.namespace_index, q.name.as_ref())
                }
                _ => QualifiedName::default(),
            };
            let display_name = match &values[2].value {
                Some(ua::Variant::LocalizedText(t)) => t.text.as_ref().to_string(),
                _ => browse_name.name.clone(),
            };
            // Objects have no DataType attribute; the read reports a bad status.
            let data_type = match &values[3].value {
                Some(ua::Variant::NodeId(id)) if is_good(&values[3]) => from_ua_node_id(id),
                _ => NodeId::null(),
            };

            Ok(NodeAttributes {
                display_name,
                browse_name,
                data_type,
                node_class,
            })
        })
        .await
    }

    async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<DataValue>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ua::ReadValueId> = node_ids
            .iter()
            .map(|n| read_value_id(n, ua::AttributeId::Value))
            .collect();

        self.blocking("read_values", move |session| {
            let values = session
                .read()
                .read(&ids, ua::TimestampsToReturn::Both, 0.0)
                .map_err(read_error)?;
            Ok(values.iter().map(from_ua_data_value).collect())
        })
        .await
    }

    async fn create_subscription(
        &self,
        settings: &SubscriptionSettings,
        sink: NotificationSink,
    ) -> OpcUaResult<u32> {
        let routes: HandleRoutes = Arc::new(Mutex::new(HashMap::new()));
        let callback_routes = routes.clone();
        let callback = DataChangeCallback::new(move |items: &[&MonitoredItem]| {
            for item in items {
                let Some(client_handle) = callback_routes.lock().get(&item.id()).copied() else {
                    continue;
                };
                let change = DataChange {
                    client_handle,
                    value: from_ua_data_value(item.last_value()),
                };
                if !sink.push(change) {
                    tracing::trace!(client_handle, "Notification channel closed");
                }
            }
        });

        let settings = settings.clone();
        let id = self
            .blocking("create_subscription", move |session| {
                session
                    .read()
                    .create_subscription(
                        settings.publishing_interval.as_millis() as f64,
                        settings.lifetime_count,
                        settings.max_keep_alive_count,
                        settings.max_notifications_per_publish,
                        settings.priority,
                        true,
                        callback,
                    )
                    .map_err(|status| SubscriptionError::creation_failed(status_name(status)).into())
            })
            .await?;

        self.routes.lock().insert(id, routes);
        tracing::debug!(subscription_id = id, endpoint = %self.endpoint, "Subscription created");
        Ok(id)
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        let routes = self
            .routes
            .lock()
            .get(&subscription_id)
            .cloned()
            .ok_or(SubscriptionError::NotFound(subscription_id))?;

        let requests: Vec<ua::MonitoredItemCreateRequest> = items
            .iter()
            .map(|item| ua::MonitoredItemCreateRequest {
                item_to_monitor: read_value_id(&item.node_id, ua::AttributeId::Value),
                monitoring_mode: ua::MonitoringMode::Reporting,
                requested_parameters: ua::MonitoringParameters {
                    client_handle: item.client_handle,
                    sampling_interval: item.sampling_interval.as_millis() as f64,
                    filter: ua::ExtensionObject::null(),
                    queue_size: item.queue_size,
                    discard_oldest: true,
                },
            })
            .collect();
        let handles: Vec<u32> = items.iter().map(|i| i.client_handle).collect();

        self.blocking("create_monitored_items", move |session| {
            let results = session
                .read()
                .create_monitored_items(subscription_id, ua::TimestampsToReturn::Both, &requests)
                .map_err(|status| SubscriptionError::creation_failed(status_name(status)))?;

            let mut routes = routes.lock();
            Ok(results
                .iter()
                .zip(handles)
                .map(|(result, client_handle)| {
                    if result.status_code.is_good() {
                        routes.insert(result.monitored_item_id, client_handle);
                    }
                    MonitoredItemResult {
                        client_handle,
                        monitored_item_id: result.monitored_item_id,
                        status_code: result.status_code.bits(),
                    }
                })
                .collect())
        })
        .await
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.routes.lock().remove(&subscription_id);
        self.blocking("delete_subscription", move |session| {
            session
                .read()
                .delete_subscription(subscription_id)
                .map(|_| ())
                .map_err(|status| {
                    OpcUaError::transport(format!(
                        "delete subscription {} failed: {}",
                        subscription_id,
                        status_name(status)
                    ))
                })
        })
        .await
    }

    fn display_name(&self) -> String {
        format!("opcua({})", self.endpoint)
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn status_name(status: ua::StatusCode) -> String {
    let bits = status.bits();
    format!("{} (0x{:08X})", OperationError::status_code_name(bits), bits)
}

/// A Read service failure: session-class results fail the session, the rest
/// are plain read failures.
fn read_error(status: ua::StatusCode) -> OpcUaError {
    if OperationError::is_session_status(status.bits()) {
        OpcUaError::transport(format!("read failed: {}", status_name(status)))
    } else {
        OpcUaError::read_failed(status_name(status))
    }
}

fn is_good(value: &ua::DataValue) -> bool {
    value.status.map_or(true, |s| s.is_good())
}

fn message_security_mode(mode: SecurityMode) -> ua::MessageSecurityMode {
    match mode {
        SecurityMode::None => ua::MessageSecurityMode::None,
        SecurityMode::Sign => ua::MessageSecurityMode::Sign,
        SecurityMode::SignAndEncrypt => ua::MessageSecurityMode::SignAndEncrypt,
    }
}

fn read_value_id(node_id: &NodeId, attribute: ua::AttributeId) -> ua::ReadValueId {
    ua::ReadValueId {
        node_id: to_ua_node_id(node_id),
        attribute_id: attribute as u32,
        index_range: ua::UAString::null(),
        data_encoding: ua::QualifiedName::null(),
    }
}

fn to_ua_node_id(node_id: &NodeId) -> ua::NodeId {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => ua::NodeId::new(ns, *v),
        NodeIdentifier::String(v) => ua::NodeId::new(ns, v.clone()),
        NodeIdentifier::Guid(v) => ua::NodeId::new(ns, ua::Guid::from_bytes(*v.as_bytes())),
        NodeIdentifier::Opaque(v) => ua::NodeId::new(ns, ua::ByteString::from(v.as_slice())),
    }
}

fn from_ua_node_id(node_id: &ua::NodeId) -> NodeId {
    let ns = node_id.namespace;
    match &node_id.identifier {
        ua::Identifier::Numeric(v) => NodeId::numeric(ns, *v),
        ua::Identifier::String(v) => NodeId::string(ns, v.as_ref()),
        ua::Identifier::Guid(v) => NodeId::guid(ns, uuid::Uuid::from_bytes(*v.as_bytes())),
        ua::Identifier::ByteString(v) => NodeId::opaque(ns, v.value.clone().unwrap_or_default()),
    }
}

fn from_ua_data_value(value: &ua::DataValue) -> DataValue {
    DataValue {
        value: value.value.as_ref().map(from_ua_variant),
        status: value.status.map_or(0, |s| s.bits()),
        source_timestamp: value.source_timestamp.map(|t| t.as_chrono()),
        server_timestamp: value.server_timestamp.map(|t| t.as_chrono()),
    }
}

fn from_ua_variant(variant: &ua::Variant) -> Variant {
    use ua::Variant as V;

    match variant {
        V::Empty => Variant::Empty,
        V::Boolean(v) => Variant::Boolean(*v),
        V::SByte(v) => Variant::SByte(*v),
        V::Byte(v) => Variant::Byte(*v),
        V::Int16(v) => Variant::Int16(*v),
        V::UInt16(v) => Variant::UInt16(*v),
        V::Int32(v) => Variant::Int32(*v),
        V::UInt32(v) => Variant::UInt32(*v),
        V::Int64(v) => Variant::Int64(*v),
        V::UInt64(v) => Variant::UInt64(*v),
        V::Float(v) => Variant::Float(*v),
        V::Double(v) => Variant::Double(*v),
        V::String(v) => Variant::String(v.as_ref().to_string()),
        V::XmlElement(v) => Variant::XmlElement(v.as_ref().to_string()),
        V::DateTime(v) => Variant::DateTime(v.as_chrono()),
        V::Guid(v) => Variant::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
        V::StatusCode(v) => Variant::StatusCode(v.bits()),
        V::ByteString(v) => Variant::ByteString(v.value.clone().unwrap_or_default()),
        V::QualifiedName(v) => Variant::QualifiedName(QualifiedName::new(v.namespace_index, v.name.as_ref())),
        V::LocalizedText(v) => Variant::LocalizedText(LocalizedText {
            locale: non_empty(v.locale.as_ref()),
            text: non_empty(v.text.as_ref()),
        }),
        V::NodeId(v) => Variant::NodeId(from_ua_node_id(v)),
        V::ExpandedNodeId(v) => Variant::ExpandedNodeId(ExpandedNodeId {
            node_id: from_ua_node_id(&v.node_id),
            namespace_uri: non_empty(v.namespace_uri.as_ref()),
            server_index: v.server_index,
        }),
        V::ExtensionObject(v) => Variant::ExtensionObject {
            type_id: from_ua_node_id(&v.node_id),
            body: Vec::new(),
        },
        V::Variant(v) => Variant::Variant(Box::new(from_ua_variant(v))),
        V::DataValue(v) => Variant::DataValue(Box::new(from_ua_data_value(v))),
        V::DiagnosticInfo(_) => Variant::DiagnosticInfo,
        V::Array(array) => {
            let values: Vec<Variant> = array.values.iter().map(from_ua_variant).collect();
            let element_type = values.first().map_or(VariantKind::Empty, Variant::kind);
            Variant::array(element_type, values)
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversion() {
        for node in [
            NodeId::numeric(2, 1001),
            NodeId::string(3, "Local Items.test"),
            NodeId::standard(85),
        ] {
            assert_eq!(from_ua_node_id(&to_ua_node_id(&node)), node);
        }
    }

    #[test]
    fn test_variant_conversion() {
        assert_eq!(from_ua_variant(&ua::Variant::Boolean(true)), Variant::Boolean(true));
        assert_eq!(from_ua_variant(&ua::Variant::Int32(-17)), Variant::Int32(-17));
        assert_eq!(
            from_ua_variant(&ua::Variant::String(ua::UAString::from("hello"))),
            Variant::String("hello".into())
        );
    }

    #[test]
    fn test_security_mode_mapping() {
        assert_eq!(
            message_security_mode(SecurityMode::SignAndEncrypt),
            ua::MessageSecurityMode::SignAndEncrypt
        );
    }

    #[test]
    fn test_read_error_classification() {
        assert!(matches!(
            read_error(ua::StatusCode::BadSessionClosed),
            OpcUaError::Connection(_)
        ));
        assert!(matches!(
            read_error(ua::StatusCode::BadTooManyOperations),
            OpcUaError::Operation(OperationError::ReadFailed { .. })
        ));
    }

    #[test]
    fn test_new_transport_is_disconnected() {
        let transport = RealOpcUaTransport::new();
        assert_eq!(transport.state(), TransportState::Disconnected);
        assert!(!transport.is_connected());
    }
}
