// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport backed by the `opcua` crate.
//!
//! The `opcua` 0.12 client API is synchronous. Every call runs on the
//! blocking pool via `spawn_blocking` so the runtime threads never stall on
//! network I/O.
//!
//! Sessions use security mode None with an anonymous identity. Server
//! certificates are accepted or checked against the PKI directory according
//! to [`TrustPolicy`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;

use opcua::client::prelude::{
    AttributeId, BrowseDescription, BrowseDescriptionResultMask, BrowseDirection, Client,
    ClientBuilder, ConnectionStatusCallback, DataChangeCallback, ExtensionObject, IdentityToken,
    MessageSecurityMode, MonitoredItem, MonitoredItemCreateRequest, MonitoringMode,
    MonitoringParameters, ReadValueId, ReferenceTypeId, SecurityPolicy, Session,
    SessionClosedCallback, SessionCommand, TimestampsToReturn, UserTokenPolicy,
};
use opcua::sync::RwLock as UaRwLock;

use crate::client::transport::{
    BrowseResult, DataChangeNotification, DataValue, MonitoredItemRequest, NotificationSender,
    OpcUaSession, OpcUaTransport, OpcUaValue, SessionEvent, SessionEventSender, StatusCode,
};
use crate::error::{
    BrowseError, ConnectionError, OpcUaError, OpcUaResult, OperationError, SubscriptionError,
};
use crate::types::{NodeClass, NodeId, NodeIdentifier, OpcUaConfig, SubscriptionSettings, TrustPolicy};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// RealOpcUaTransport
// =============================================================================

/// Opens sessions against a real server.
#[derive(Debug, Default, Clone)]
pub struct RealOpcUaTransport;

impl RealOpcUaTransport {
    /// Creates the transport.
    pub fn new() -> Self {
        Self
    }

    fn build_client(config: &OpcUaConfig) -> OpcUaResult<Client> {
        let quotas = &config.quotas;
        let mut builder = ClientBuilder::new()
            .application_name(config.application_name.as_str())
            .application_uri(config.effective_application_uri().as_str())
            .session_name(config.effective_session_name().as_str())
            .create_sample_keypair(true)
            .session_retry_limit(0)
            .session_timeout(u32::try_from(config.session_timeout.as_millis()).unwrap_or(u32::MAX))
            .max_message_size(quotas.max_message_size)
            .max_array_length(quotas.max_array_length)
            .max_string_length(quotas.max_string_length)
            .max_byte_string_length(quotas.max_byte_string_length);

        builder = match config.trust_policy {
            TrustPolicy::AcceptAll => builder.trust_server_certs(true),
            TrustPolicy::PkiStore => builder.trust_server_certs(false),
        };
        if let Some(ref pki_dir) = config.pki_dir {
            builder = builder.pki_dir(pki_dir.as_str());
        }

        builder.client().ok_or_else(|| {
            OpcUaError::connection(ConnectionError::invalid_endpoint(
                config.endpoint.clone(),
                "client configuration rejected",
            ))
        })
    }
}

#[async_trait]
impl OpcUaTransport for RealOpcUaTransport {
    async fn open_session(
        &self,
        config: &OpcUaConfig,
        events: SessionEventSender,
    ) -> OpcUaResult<Arc<dyn OpcUaSession>> {
        let config = config.clone();
        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);

        let session = tokio::task::spawn_blocking(move || -> OpcUaResult<Arc<UaRwLock<Session>>> {
            let mut client = Self::build_client(&config)?;
            let endpoint = (
                config.endpoint.as_str(),
                SecurityPolicy::None.to_str(),
                MessageSecurityMode::None,
                UserTokenPolicy::anonymous(),
            );
            client
                .connect_to_endpoint(endpoint, IdentityToken::Anonymous)
                .map_err(|status| {
                    tracing::debug!(endpoint = %config.endpoint, %status, "Endpoint connect failed");
                    OpcUaError::connection(ConnectionError::refused(config.endpoint.clone()))
                })
        })
        .await
        .map_err(|e| OpcUaError::session_failed(format!("connect task failed: {e}")))??;

        {
            let keepalive_events = events.clone();
            let closed_events = events;
            let mut s = session.write();
            s.set_connection_status_callback(ConnectionStatusCallback::new(move |connected| {
                let status = if connected {
                    StatusCode::GOOD
                } else {
                    StatusCode::BAD_CONNECTION_CLOSED
                };
                let _ = keepalive_events.send(SessionEvent::KeepAlive { session_id, status });
            }));
            s.set_session_closed_callback(SessionClosedCallback::new(move |_status| {
                let _ = closed_events.send(SessionEvent::Closing { session_id });
            }));
        }

        let stop = Session::run_async(Arc::clone(&session));
        tracing::info!(session_id, "OPC UA session running");

        Ok(Arc::new(RealSession {
            id: session_id,
            inner: session,
            stop: Mutex::new(Some(stop)),
            closed: AtomicBool::new(false),
            routes: Arc::new(RwLock::new(HashMap::new())),
        }))
    }

    fn display_name(&self) -> String {
        "opcua".to_string()
    }
}

// =============================================================================
// RealSession
// =============================================================================

/// Server monitored item id to (subscription id, client handle).
type RouteTable = Arc<RwLock<HashMap<u32, (u32, u32)>>>;

struct RealSession {
    id: u64,
    inner: Arc<UaRwLock<Session>>,
    /// Stops the session's run loop; taken on close.
    stop: Mutex<Option<oneshot::Sender<SessionCommand>>>,
    closed: AtomicBool,
    routes: RouteTable,
}

impl RealSession {
    async fn blocking<T, F>(&self, call: F) -> OpcUaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> OpcUaResult<T> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(OpcUaError::not_connected());
        }
        let session = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || call(&session.read()))
            .await
            .map_err(|e| OpcUaError::session_failed(format!("session task failed: {e}")))?
    }
}

#[async_trait]
impl OpcUaSession for RealSession {
    fn session_id(&self) -> u64 {
        self.id
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.inner.read().is_connected()
    }

    async fn close(&self) -> OpcUaResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let session = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || session.write().disconnect())
            .await
            .map_err(|e| OpcUaError::session_failed(format!("close task failed: {e}")))?;
        stop_run_loop(&self.stop);
        Ok(())
    }

    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<DataValue> {
        let target = to_ua_node_id(node_id);
        let label = node_id.to_string();

        self.blocking(move |s| {
            let request = ReadValueId {
                node_id: target,
                attribute_id: AttributeId::Value as u32,
                index_range: opcua::types::UAString::null(),
                data_encoding: opcua::types::QualifiedName::null(),
            };
            let results = s
                .read(&[request], TimestampsToReturn::Both, 0.0)
                .map_err(|status| OpcUaError::read_failed(label.clone(), status.to_string()))?;
            results
                .first()
                .map(from_ua_data_value)
                .ok_or_else(|| OpcUaError::read_failed(label, "empty read response"))
        })
        .await
    }

    async fn browse(&self, node_id: &NodeId, node_class_mask: u32) -> OpcUaResult<Vec<BrowseResult>> {
        let target = to_ua_node_id(node_id);
        let label = node_id.to_string();

        self.blocking(move |s| {
            let description = BrowseDescription {
                node_id: target,
                browse_direction: BrowseDirection::Forward,
                reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
                include_subtypes: true,
                node_class_mask,
                result_mask: BrowseDescriptionResultMask::all().bits(),
            };
            let results = s
                .browse(&[description])
                .map_err(|status| {
                    OpcUaError::browse(BrowseError::browse_failed(label.clone(), status.to_string()))
                })?
                .unwrap_or_default();

            let references = results
                .into_iter()
                .next()
                .and_then(|r| r.references)
                .unwrap_or_default();

            Ok(references
                .iter()
                .filter_map(|r| {
                    Some(BrowseResult {
                        node_id: from_ua_node_id(&r.node_id.node_id),
                        browse_name: r.browse_name.name.as_ref().to_string(),
                        display_name: r.display_name.text.as_ref().to_string(),
                        node_class: NodeClass::from_value(r.node_class as u32)?,
                    })
                })
                .collect())
        })
        .await
    }

    async fn create_subscription(
        &self,
        settings: &SubscriptionSettings,
        sink: NotificationSender,
    ) -> OpcUaResult<u32> {
        let settings = settings.clone();
        let routes = Arc::clone(&self.routes);

        self.blocking(move |s| {
            let callback = DataChangeCallback::new(move |items: &[&MonitoredItem]| {
                let table = routes.read();
                for item in items {
                    let Some(&(subscription_id, client_handle)) = table.get(&item.id()) else {
                        continue;
                    };
                    let _ = sink.send(DataChangeNotification {
                        subscription_id,
                        client_handle,
                        value: from_ua_data_value(item.last_value()),
                    });
                }
            });

            s.create_subscription(
                settings.publishing_interval.as_millis() as f64,
                settings.lifetime_count,
                settings.keepalive_count,
                settings.max_notifications_per_publish,
                settings.priority,
                settings.publishing_enabled,
                callback,
            )
            .map_err(|status| {
                OpcUaError::subscription(SubscriptionError::creation_failed(status.to_string()))
            })
        })
        .await
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.routes.write().retain(|_, (sub, _)| *sub != subscription_id);
        self.blocking(move |s| {
            s.delete_subscription(subscription_id)
                .map(|_| ())
                .map_err(|_| OpcUaError::subscription(SubscriptionError::not_found(subscription_id)))
        })
        .await
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        request: &MonitoredItemRequest,
    ) -> OpcUaResult<u32> {
        let target = to_ua_node_id(&request.node_id);
        let label = request.node_id.to_string();
        let client_handle = request.client_handle;
        let settings = request.settings.clone();
        let routes = Arc::clone(&self.routes);

        self.blocking(move |s| {
            let create = MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId {
                    node_id: target,
                    attribute_id: AttributeId::Value as u32,
                    index_range: opcua::types::UAString::null(),
                    data_encoding: opcua::types::QualifiedName::null(),
                },
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    client_handle,
                    sampling_interval: settings.sampling_interval.as_millis() as f64,
                    filter: ExtensionObject::null(),
                    queue_size: settings.queue_size,
                    discard_oldest: settings.discard_oldest,
                },
            };

            let results = s
                .create_monitored_items(subscription_id, TimestampsToReturn::Both, &[create])
                .map_err(|status| {
                    OpcUaError::subscription(SubscriptionError::monitored_item_failed(
                        label.clone(),
                        status.to_string(),
                    ))
                })?;

            let result = results.first().ok_or_else(|| {
                OpcUaError::subscription(SubscriptionError::monitored_item_failed(
                    label.clone(),
                    "empty response",
                ))
            })?;
            if !result.status_code.is_good() {
                return Err(OpcUaError::subscription(SubscriptionError::monitored_item_failed(
                    label,
                    result.status_code.to_string(),
                )));
            }

            routes
                .write()
                .insert(result.monitored_item_id, (subscription_id, client_handle));
            Ok(result.monitored_item_id)
        })
        .await
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn to_ua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(ns, *v),
        NodeIdentifier::String(v) => opcua::types::NodeId::new(ns, v.clone()),
        NodeIdentifier::Guid(v) => opcua::types::NodeId::new(ns, opcua::types::Guid::from(*v)),
        NodeIdentifier::Opaque(v) => {
            opcua::types::NodeId::new(ns, opcua::types::ByteString::from(v.as_slice()))
        }
    }
}

fn from_ua_node_id(node_id: &opcua::types::NodeId) -> NodeId {
    let ns = node_id.namespace;
    match &node_id.identifier {
        opcua::types::Identifier::Numeric(v) => NodeId::numeric(ns, *v),
        opcua::types::Identifier::String(v) => NodeId::string(ns, v.as_ref()),
        opcua::types::Identifier::Guid(v) => NodeId::guid(ns, uuid::Uuid::from_bytes(*v.as_bytes())),
        opcua::types::Identifier::ByteString(v) => NodeId::opaque(ns, v.value.clone().unwrap_or_default()),
    }
}

fn from_ua_time(t: &opcua::types::DateTime) -> chrono::DateTime<chrono::Utc> {
    t.as_chrono()
}

fn from_ua_data_value(dv: &opcua::types::DataValue) -> DataValue {
    DataValue {
        value: dv.value.as_ref().map(from_ua_variant),
        status: StatusCode(dv.status.map(|s| s.bits()).unwrap_or(0)),
        source_timestamp: dv.source_timestamp.as_ref().map(from_ua_time),
        server_timestamp: dv.server_timestamp.as_ref().map(from_ua_time),
    }
}

fn from_ua_variant(variant: &opcua::types::Variant) -> OpcUaValue {
    use opcua::types::Variant;

    match variant {
        Variant::Empty => OpcUaValue::Null,
        Variant::Boolean(v) => OpcUaValue::Boolean(*v),
        Variant::SByte(v) => OpcUaValue::SByte(*v),
        Variant::Byte(v) => OpcUaValue::Byte(*v),
        Variant::Int16(v) => OpcUaValue::Int16(*v),
        Variant::UInt16(v) => OpcUaValue::UInt16(*v),
        Variant::Int32(v) => OpcUaValue::Int32(*v),
        Variant::UInt32(v) => OpcUaValue::UInt32(*v),
        Variant::Int64(v) => OpcUaValue::Int64(*v),
        Variant::UInt64(v) => OpcUaValue::UInt64(*v),
        Variant::Float(v) => OpcUaValue::Float(*v),
        Variant::Double(v) => OpcUaValue::Double(*v),
        Variant::String(v) => OpcUaValue::String(v.as_ref().to_string()),
        Variant::DateTime(v) => OpcUaValue::DateTime(v.as_chrono()),
        Variant::Guid(v) => OpcUaValue::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
        Variant::ByteString(v) => OpcUaValue::ByteString(v.value.clone().unwrap_or_default()),
        Variant::Array(arr) => OpcUaValue::Array(arr.values.iter().map(from_ua_variant).collect()),
        other => OpcUaValue::String(format!("{other:?}")),
    }
}

/// Tells a session's run loop to stop. Later calls are no-ops.
fn stop_run_loop(slot: &Mutex<Option<oneshot::Sender<SessionCommand>>>) {
    if let Some(stop) = slot.lock().take() {
        // Err means the run loop already ended.
        let _ = stop.send(SessionCommand::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_loop_is_stopped_once() {
        let (tx, mut rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        stop_run_loop(&slot);
        stop_run_loop(&slot);

        assert!(matches!(rx.try_recv(), Ok(SessionCommand::Stop)));
        assert!(slot.lock().is_none());
    }

    #[test]
    fn test_node_id_conversion() {
        let ids = [
            NodeId::numeric(0, 85),
            NodeId::string(4, "|var|CODESYS Control Win V3 x64.Application.PackTag"),
            NodeId::opaque(2, vec![1, 2, 3]),
        ];
        for id in ids {
            assert_eq!(from_ua_node_id(&to_ua_node_id(&id)), id);
        }
    }

    #[test]
    fn test_variant_conversion() {
        use opcua::types::Variant;

        assert_eq!(from_ua_variant(&Variant::Int32(7)), OpcUaValue::Int32(7));
        assert_eq!(from_ua_variant(&Variant::Empty), OpcUaValue::Null);
        assert_eq!(
            from_ua_variant(&Variant::String("abc".into())),
            OpcUaValue::String("abc".into())
        );
    }
}
