// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shared test utilities.
//!
//! [`MockPlc`] is an in-memory address space with controllable failure
//! modes. [`MockTransport`] opens [`MockSession`]s against it. Sessions
//! deliver data changes only while connected, which makes stale
//! subscriptions visible to tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use cora_opcua::client::{
    BrowseResult, DataChangeNotification, DataValue, MonitoredItemRequest, NotificationSender,
    OpcUaSession, OpcUaTransport, OpcUaValue, SessionEvent, SessionEventSender, StatusCode,
};
use cora_opcua::{
    NodeClass, NodeId, NodeLayout, OpcUaConfig, OpcUaError, OpcUaResult, ServiceConfig,
    SubscriptionSettings, SubscriptionError,
};

static INIT: Once = Once::new();

/// Initialize test logging.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,cora_opcua=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Polls `cond` every 10ms for up to five (virtual) seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub const ENDPOINT: &str = "opc.tcp://10.0.39.14:4840";

/// Service settings with short reconnect timings.
pub fn service_config() -> ServiceConfig {
    let mut config = ServiceConfig::new(ENDPOINT);
    config.reconnect.auto_interval = Duration::from_secs(1);
    config.reconnect.manual_delay = Duration::from_secs(1);
    config.reconnect.manual_timeout = Duration::from_secs(30);
    config
}

pub fn client_config() -> OpcUaConfig {
    OpcUaConfig::new(ENDPOINT)
}

// =============================================================================
// MockPlc
// =============================================================================

struct MockSubscription {
    session_id: u64,
    sink: NotificationSender,
    items: Vec<MonitoredItemRequest>,
}

/// In-memory controller.
#[derive(Default)]
pub struct MockPlc {
    children: Mutex<HashMap<NodeId, Vec<BrowseResult>>>,
    values: Mutex<HashMap<NodeId, DataValue>>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    subscriptions: Mutex<HashMap<u32, MockSubscription>>,
    events: Mutex<Option<SessionEventSender>>,
    next_session_id: AtomicU64,
    next_subscription_id: AtomicU32,
    next_item_id: AtomicU32,

    /// `open_session` calls.
    pub open_calls: AtomicU32,
    /// Connect attempts left to refuse.
    pub refuse_connects: AtomicU32,
    /// Connects never complete.
    pub unreachable: AtomicBool,
    /// Subscription creation fails.
    pub refuse_subscriptions: AtomicBool,
    /// Latency of `open_session` in milliseconds.
    pub open_delay_ms: AtomicU64,
    /// Latency of `create_subscription` in milliseconds.
    pub subscription_delay_ms: AtomicU64,
    /// Latency of `create_monitored_item` in milliseconds.
    pub item_delay_ms: AtomicU64,
    /// `create_subscription` calls.
    pub subscription_calls: AtomicU32,
}

async fn lag(ms: &AtomicU64) {
    let delay = ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

impl MockPlc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_session_id: AtomicU64::new(100),
            next_subscription_id: AtomicU32::new(1),
            next_item_id: AtomicU32::new(1),
            ..Default::default()
        })
    }

    fn add_child(&self, parent: &NodeId, node_id: NodeId, name: &str, node_class: NodeClass) {
        self.children
            .lock()
            .entry(parent.clone())
            .or_default()
            .push(BrowseResult {
                node_id,
                browse_name: name.to_string(),
                display_name: name.to_string(),
                node_class,
            });
    }

    /// Adds an object child `parent.name`.
    pub fn object(&self, parent: &NodeId, name: &str) -> NodeId {
        let id = parent.join(name);
        self.add_child(parent, id.clone(), name, NodeClass::Object);
        id
    }

    /// Adds a variable child `parent.name` holding `value`.
    pub fn variable(&self, parent: &NodeId, name: &str, value: OpcUaValue) -> NodeId {
        let id = parent.join(name);
        self.add_child(parent, id.clone(), name, NodeClass::Variable);
        self.set_value(&id, value);
        id
    }

    /// Adds a date/time exposed as children `name[0]..name[6]`.
    pub fn date_time(&self, parent: &NodeId, name: &str, parts: [i32; 7]) -> NodeId {
        let id = self.object(parent, name);
        for (k, part) in parts.iter().enumerate() {
            self.variable(&id, &format!("{name}[{k}]"), OpcUaValue::Int32(*part));
        }
        id
    }

    /// Sets a node value without adding a browse reference.
    pub fn set_value(&self, node_id: &NodeId, value: OpcUaValue) {
        self.values.lock().insert(node_id.clone(), DataValue::good(value));
    }

    /// Sets a full data value.
    pub fn set_data_value(&self, node_id: &NodeId, value: DataValue) {
        self.values.lock().insert(node_id.clone(), value);
    }

    /// Sessions opened so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().clone()
    }

    /// The most recently opened session.
    pub fn latest_session(&self) -> Option<Arc<MockSession>> {
        self.sessions.lock().last().cloned()
    }

    /// Monitored items on subscriptions of connected sessions.
    pub fn live_items(&self) -> Vec<MonitoredItemRequest> {
        let connected: Vec<u64> = self
            .sessions()
            .iter()
            .filter(|s| s.is_connected())
            .map(|s| s.session_id())
            .collect();
        self.subscriptions
            .lock()
            .values()
            .filter(|s| connected.contains(&s.session_id))
            .flat_map(|s| s.items.clone())
            .collect()
    }

    /// Number of subscriptions not yet deleted.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Sends a data change for `node_id` on every live subscription.
    pub fn push(&self, node_id: &NodeId, value: DataValue) {
        let connected: Vec<u64> = self
            .sessions()
            .iter()
            .filter(|s| s.is_connected())
            .map(|s| s.session_id())
            .collect();

        for (subscription_id, sub) in self.subscriptions.lock().iter() {
            if !connected.contains(&sub.session_id) {
                continue;
            }
            for item in sub.items.iter().filter(|i| &i.node_id == node_id) {
                let _ = sub.sink.send(DataChangeNotification {
                    subscription_id: *subscription_id,
                    client_handle: item.client_handle,
                    value: value.clone(),
                });
            }
        }
    }

    /// Breaks the latest session and reports `signals` bad keep-alives for it.
    pub fn fail_keep_alive(&self, signals: usize) -> Option<u64> {
        let session = self.latest_session()?;
        session.connected.store(false, Ordering::SeqCst);
        let events = self.events.lock().clone()?;
        for _ in 0..signals {
            let _ = events.send(SessionEvent::KeepAlive {
                session_id: session.session_id(),
                status: StatusCode::BAD_CONNECTION_CLOSED,
            });
        }
        Some(session.session_id())
    }

    /// Reports that the stack is closing the latest session.
    pub fn close_from_server(&self) -> Option<u64> {
        let session = self.latest_session()?;
        session.connected.store(false, Ordering::SeqCst);
        let events = self.events.lock().clone()?;
        let _ = events.send(SessionEvent::Closing {
            session_id: session.session_id(),
        });
        Some(session.session_id())
    }
}

// =============================================================================
// MockTransport
// =============================================================================

/// Opens sessions on a [`MockPlc`].
pub struct MockTransport {
    pub plc: Arc<MockPlc>,
}

impl MockTransport {
    pub fn new(plc: Arc<MockPlc>) -> Arc<Self> {
        Arc::new(Self { plc })
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn open_session(
        &self,
        config: &OpcUaConfig,
        events: SessionEventSender,
    ) -> OpcUaResult<Arc<dyn OpcUaSession>> {
        let plc = &self.plc;
        plc.open_calls.fetch_add(1, Ordering::SeqCst);

        let delay = plc.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if plc.unreachable.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let refused = plc
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(OpcUaError::connection_refused(config.endpoint.clone()));
        }

        let session = Arc::new(MockSession {
            id: plc.next_session_id.fetch_add(1, Ordering::SeqCst),
            connected: AtomicBool::new(true),
            closes: AtomicU32::new(0),
            plc: Arc::downgrade(plc),
        });
        plc.sessions.lock().push(Arc::clone(&session));
        *plc.events.lock() = Some(events);
        Ok(session)
    }

    fn display_name(&self) -> String {
        "mock".to_string()
    }
}

// =============================================================================
// MockSession
// =============================================================================

/// Session on a [`MockPlc`].
pub struct MockSession {
    id: u64,
    pub connected: AtomicBool,
    pub closes: AtomicU32,
    plc: std::sync::Weak<MockPlc>,
}

impl MockSession {
    fn plc(&self) -> OpcUaResult<Arc<MockPlc>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(OpcUaError::not_connected());
        }
        self.plc.upgrade().ok_or_else(OpcUaError::not_connected)
    }
}

#[async_trait]
impl OpcUaSession for MockSession {
    fn session_id(&self) -> u64 {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> OpcUaResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<DataValue> {
        let plc = self.plc()?;
        let value = plc.values.lock().get(node_id).cloned();
        // BadNodeIdUnknown
        Ok(value.unwrap_or_else(|| DataValue::bad(StatusCode(0x8034_0000))))
    }

    async fn browse(&self, node_id: &NodeId, node_class_mask: u32) -> OpcUaResult<Vec<BrowseResult>> {
        let plc = self.plc()?;
        let children = plc.children.lock().get(node_id).cloned().unwrap_or_default();
        Ok(children
            .into_iter()
            .filter(|c| c.node_class.value() & node_class_mask != 0)
            .collect())
    }

    async fn create_subscription(
        &self,
        _settings: &SubscriptionSettings,
        sink: NotificationSender,
    ) -> OpcUaResult<u32> {
        let plc = self.plc()?;
        plc.subscription_calls.fetch_add(1, Ordering::SeqCst);
        lag(&plc.subscription_delay_ms).await;
        if plc.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(OpcUaError::subscription(SubscriptionError::creation_failed(
                "BadTooManySubscriptions",
            )));
        }
        let id = plc.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        plc.subscriptions.lock().insert(
            id,
            MockSubscription {
                session_id: self.id,
                sink,
                items: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        let plc = self.plc()?;
        let result = plc
            .subscriptions
            .lock()
            .remove(&subscription_id)
            .map(|_| ())
            .ok_or_else(|| OpcUaError::subscription(SubscriptionError::not_found(subscription_id)));
        result
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        request: &MonitoredItemRequest,
    ) -> OpcUaResult<u32> {
        let plc = self.plc()?;
        lag(&plc.item_delay_ms).await;
        let mut subs = plc.subscriptions.lock();
        let sub = subs
            .get_mut(&subscription_id)
            .ok_or_else(|| OpcUaError::subscription(SubscriptionError::not_found(subscription_id)))?;
        sub.items.push(request.clone());
        Ok(plc.next_item_id.fetch_add(1, Ordering::SeqCst))
    }
}

// =============================================================================
// PackTag fixture
// =============================================================================

/// Node ids of the populated fixture.
pub struct PackTag {
    pub admin: NodeId,
    pub status: NodeId,
    pub plc_date_time: NodeId,
}

const ALARM_TIME: [i32; 7] = [2025, 1, 15, 9, 30, 0, 0];
const ACK_TIME: [i32; 7] = [2025, 7, 1, 12, 0, 0, 250];

fn counter(plc: &MockPlc, parent: &NodeId, name: &str, id: i32, count: i32, acc: i32) {
    let node = plc.object(parent, name);
    plc.variable(&node, "ID", OpcUaValue::Int32(id));
    plc.variable(&node, "Count", OpcUaValue::Int32(count));
    plc.variable(&node, "AccCount", OpcUaValue::Int32(acc));
}

/// Populates the CoraMeasure tree under the default layout.
pub fn packtag(plc: &MockPlc) -> PackTag {
    let layout = NodeLayout::default();
    let admin = layout.admin_node().expect("default admin root parses");
    let status = layout.status_node().expect("default status root parses");

    // Admin.Alarm: three alarms plus bookkeeping.
    let alarms = plc.object(&admin, "Alarm");
    plc.variable(&alarms, "IndexMax", OpcUaValue::Int16(2));
    plc.variable(&alarms, "Dimensions", OpcUaValue::Int16(1));
    for i in 0..3 {
        let alarm = plc.object(&alarms, &format!("Alarm[{i}]"));
        plc.variable(&alarm, "ID", OpcUaValue::Int32(i + 1));
        plc.variable(&alarm, "Value", OpcUaValue::Int32(10 * (i + 1)));
        plc.variable(&alarm, "Message", OpcUaValue::String(format!("Alarm {}", i + 1)));
        plc.variable(&alarm, "Category", OpcUaValue::Int16(2));
        plc.date_time(&alarm, "DateTime", ALARM_TIME);
        plc.date_time(&alarm, "AckDateTime", ACK_TIME);
    }

    // Admin.AlarmHistory: one entry, no IndexMax.
    let history = plc.object(&admin, "AlarmHistory");
    let entry = plc.object(&history, "Entry");
    plc.variable(&entry, "ID", OpcUaValue::Int32(77));
    plc.variable(&entry, "Message", OpcUaValue::String("Door open".into()));

    // Production counters.
    let processed = plc.object(&admin, "ProdProcessedCount");
    let data = plc.object(&processed, "Data");
    plc.variable(&data, "Count", OpcUaValue::Int32(12));
    plc.variable(&data, "AccCount", OpcUaValue::Int32(1200));

    let defects = plc.object(&admin, "ProdDefectiveCount");
    plc.variable(&defects, "IndexMax", OpcUaValue::String("1".into()));
    counter(plc, &defects, "ProdDefectiveCount[0]", 3, 2, 20);
    counter(plc, &defects, "ProdDefectiveCount[1]", 4, 1, 10);

    let consumed = plc.object(&admin, "ProdConsumedCount");
    plc.variable(&consumed, "IndexMax", OpcUaValue::Int32(0));
    counter(plc, &consumed, "ProdConsumedCount[0]", 5, 40, 4000);

    // Stop reason.
    let stop = plc.object(&admin, "StopReason");
    let reason = plc.object(&stop, "Reason");
    plc.variable(&reason, "Category", OpcUaValue::Int32(1));
    plc.variable(&reason, "Value", OpcUaValue::Int32(8));
    plc.variable(&reason, "Message", OpcUaValue::String("Emergency stop".into()));
    plc.date_time(&reason, "DateTime", ALARM_TIME);

    // Controller clock as a 7-element array.
    let plc_date_time = plc.variable(
        &admin,
        "PLCDateTime",
        OpcUaValue::Array(ACK_TIME.iter().map(|p| OpcUaValue::Int32(*p)).collect()),
    );

    // Status values and elapsed time in (Automatic, Executing).
    plc.variable(&status, "StateCurrent", OpcUaValue::Int32(4));
    plc.variable(&status, "UnitModeCurrent", OpcUaValue::Int32(0));
    plc.variable(&admin, "StateCurrentTime[0,4]", OpcUaValue::Int32(3725));

    // Pallet parameters: the last one carries the adapter.
    let parameters = plc.object(&status, "Parameter");
    plc.variable(&parameters, "IndexMax", OpcUaValue::Int32(1));
    for (i, value) in [(0, 0.0f32), (1, 2.0f32)] {
        let p = plc.object(&parameters, &format!("Parameter[{i}]"));
        plc.variable(&p, "ID", OpcUaValue::Int32(i + 1));
        plc.variable(&p, "Name", OpcUaValue::String(format!("Pallet {i}")));
        plc.variable(&p, "Unit", OpcUaValue::String("mm".into()));
        plc.variable(&p, "Value", OpcUaValue::Float(value));
    }

    PackTag {
        admin,
        status,
        plc_date_time,
    }
}
