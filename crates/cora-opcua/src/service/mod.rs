// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The machine service.
//!
//! [`MachineService`] is the one object applications talk to. It owns the
//! connection and subscription managers, rebinds readers and subscriptions
//! whenever the session changes, runs the reconnect driver and exposes typed
//! queries and push monitors for the CoraMeasure PackTag tree.
//!
//! # Wiring
//!
//! ```text
//!  ConnectionManager ──ConnectionChange──► wiring listener
//!                                             │ WiringState::on
//!                                             ▼
//!                   Wire(s): bind reader/mapper to s, update_session(s)
//!                   Unwire : drop binding, update_session(None),
//!                            start auto-reconnect on faults
//! ```
//!
//! Queries never fail: while offline they return empty vectors, defaults or
//! `-1`.

mod config;
mod domain;
mod wiring;

pub use config::{MonitoringConfig, NodeLayout, ReconnectConfig, ServiceConfig};
pub use domain::{pallet_adapter_name, MachineSnapshot, MachineState, PalletSummary, UnitMode};
pub use wiring::{WiringAction, WiringState};

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::browse::{BrowseStatistics, NodeBrowser, NodeDescriptor};
use crate::client::connection::{
    ChangeReason, ConnectionChange, ConnectionManager, ConnectionState, SessionInfo,
};
use crate::client::subscription::{MonitoredPointSpec, SubscriptionManager};
use crate::client::transport::{DataValue, OpcUaSession, OpcUaTransport, OpcUaValue};
use crate::error::OpcUaResult;
use crate::mapper::ObjectMapper;
use crate::reader::AttributeReader;
use crate::records::{
    Alarm, AlarmHistory, PalletInfo, PlcDateTime, ProdConsumed, ProdDefectCount, ProdProcessed,
    Record, StopReason,
};
use crate::timestamp::format_elapsed;
use crate::types::NodeId;

/// Upper bound on subscription re-syncs per connection change.
const SYNC_PASSES: usize = 3;

// =============================================================================
// Bound
// =============================================================================

/// Readers bound to one session.
struct Bound {
    session_id: u64,
    browser: NodeBrowser,
    reader: AttributeReader,
    mapper: ObjectMapper,
}

// =============================================================================
// MachineService
// =============================================================================

/// Client of one CoraMeasure machine.
pub struct MachineService {
    config: ServiceConfig,
    admin: NodeId,
    status: NodeId,
    connection: ConnectionManager,
    subscriptions: SubscriptionManager,
    bound: ArcSwapOption<Bound>,
    wiring: Mutex<WiringState>,
    reconnect: Mutex<Option<CancellationToken>>,
    browse_stats: Arc<BrowseStatistics>,
    shutdown: CancellationToken,
    weak: Weak<MachineService>,
}

impl MachineService {
    /// Creates the service and starts its wiring listener. Does not connect.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(transport: Arc<dyn OpcUaTransport>, config: ServiceConfig) -> OpcUaResult<Arc<Self>> {
        config.validate()?;
        let admin = config.nodes.admin_node()?;
        let status = config.nodes.status_node()?;

        let connection = ConnectionManager::new(transport, config.connection.clone());
        let subscriptions = SubscriptionManager::new(
            config.connection.subscription.clone(),
            config.monitoring.item.clone(),
            config.connection.request_timeout,
        );
        let changes = connection.subscribe();
        let shutdown = CancellationToken::new();

        let service = Arc::new_cyclic(|weak| Self {
            config,
            admin,
            status,
            connection,
            subscriptions,
            bound: ArcSwapOption::empty(),
            wiring: Mutex::new(WiringState::Unwired),
            reconnect: Mutex::new(None),
            browse_stats: Arc::new(BrowseStatistics::new()),
            shutdown: shutdown.clone(),
            weak: weak.clone(),
        });

        tokio::spawn(wiring_listener(Arc::downgrade(&service), changes, shutdown));
        Ok(service)
    }

    /// The service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// The subscription manager.
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Browse counters across every session.
    pub fn browse_stats(&self) -> &BrowseStatistics {
        &self.browse_stats
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects once. Returns `false` on failure; the service stays usable
    /// offline.
    pub async fn start(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        match self.connect().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(endpoint = %self.config.connection.endpoint, error = %e, "Starting offline");
                false
            }
        }
    }

    /// Connects and binds to the new session.
    pub async fn connect(&self) -> OpcUaResult<()> {
        self.connection.connect().await?;
        self.ensure_wired().await;
        Ok(())
    }

    /// Stops auto-reconnect, then closes the session.
    pub async fn disconnect(&self) {
        self.stop_auto_reconnect();
        let session_id = self.connection.session_info().map(|i| i.session_id);
        self.connection.disconnect().await;
        self.apply_change(ConnectionChange {
            online: false,
            session_id,
            reason: ChangeReason::Requested,
        })
        .await;
    }

    /// Returns `true` while a usable session is installed.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Facts about the installed session.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.connection.session_info()
    }

    /// Subscribes to online/offline changes.
    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionChange> {
        self.connection.subscribe()
    }

    /// Stops reconnecting and monitoring, closes the session and ends the
    /// background tasks.
    pub async fn shutdown(&self) {
        self.stop_auto_reconnect();
        self.subscriptions.stop_monitoring().await;
        self.disconnect().await;
        self.shutdown.cancel();
        tracing::info!("Machine service shut down");
    }

    // =========================================================================
    // Reconnect
    // =========================================================================

    /// Starts the background reconnect driver, replacing any running one.
    /// While the connection is down it attempts a connect every `interval`
    /// (default from [`ReconnectConfig::auto_interval`]).
    pub fn start_auto_reconnect(&self, interval: Option<Duration>) {
        let interval = interval.unwrap_or(self.config.reconnect.auto_interval);
        let token = self.shutdown.child_token();

        if let Some(previous) = self.reconnect.lock().replace(token.clone()) {
            previous.cancel();
        }

        tracing::debug!(interval = ?interval, "Auto-reconnect started");
        tokio::spawn(reconnect_driver(self.weak.clone(), interval, token));
    }

    /// Cancels the background reconnect driver.
    pub fn stop_auto_reconnect(&self) {
        if let Some(token) = self.reconnect.lock().take() {
            token.cancel();
            tracing::debug!("Auto-reconnect stopped");
        }
    }

    /// Manual reconnect bounded by `timeout` (default
    /// [`ReconnectConfig::manual_timeout`]). The background driver is
    /// restarted afterwards either way.
    pub async fn try_reconnect(&self, timeout: Option<Duration>) -> bool {
        self.stop_auto_reconnect();
        let limit = timeout.unwrap_or(self.config.reconnect.manual_timeout);
        let cancel = CancellationToken::new();

        let finished = tokio::time::timeout(
            limit,
            self.connection
                .try_reconnect_loop(self.config.reconnect.manual_delay, cancel.clone()),
        )
        .await;
        cancel.cancel();
        // An attempt cut off by the timeout has already put the state back.
        let ok = finished.unwrap_or(false) || self.connection.is_connected();

        if ok {
            self.ensure_wired().await;
        } else {
            tracing::warn!(timeout = ?limit, "Manual reconnect gave up");
        }

        self.start_auto_reconnect(None);
        ok
    }

    // =========================================================================
    // Wiring
    // =========================================================================

    async fn ensure_wired(&self) {
        if let Some(info) = self.connection.session_info() {
            self.apply_change(ConnectionChange {
                online: true,
                session_id: Some(info.session_id),
                reason: ChangeReason::Connected,
            })
            .await;
        }
    }

    async fn apply_change(&self, change: ConnectionChange) {
        let action = {
            let mut state = self.wiring.lock();
            let (next, action) = state.on(&change);
            *state = next;

            match action {
                WiringAction::Wire(session_id) => {
                    match self
                        .connection
                        .session()
                        .filter(|s| s.session_id() == session_id)
                    {
                        Some(session) => self.bind(session),
                        // Superseded before we got here; a later change rewires.
                        None => *state = WiringState::Unwired,
                    }
                }
                WiringAction::Unwire { .. } => self.bound.store(None),
                WiringAction::Nothing => {}
            }
            action
        };

        self.sync_subscriptions().await;

        match action {
            WiringAction::Wire(session_id) if self.wired_to() == Some(session_id) => {
                tracing::info!(session_id, "Service wired");
            }
            WiringAction::Unwire { reconnect } => {
                tracing::info!(reason = ?change.reason, "Service unwired");
                if reconnect {
                    self.start_auto_reconnect(None);
                }
            }
            _ => {}
        }
    }

    fn wired_to(&self) -> Option<u64> {
        match *self.wiring.lock() {
            WiringState::Wired(id) => Some(id),
            WiringState::Unwired => None,
        }
    }

    /// Points the subscription manager at the wired session.
    ///
    /// Runs without the wiring lock. Concurrent changes can interleave here,
    /// so each pass re-reads the wiring and the last change wins.
    async fn sync_subscriptions(&self) {
        for _ in 0..SYNC_PASSES {
            let target = self
                .wired_to()
                .and_then(|id| self.connection.session().filter(|s| s.session_id() == id))
                .filter(|s| s.is_connected());
            let wanted = target.as_ref().map(|s| s.session_id());
            if self.subscriptions.session_id() == wanted {
                // Another change may still be replaying onto this session.
                self.subscriptions.settled().await;
                return;
            }
            self.subscriptions.update_session(target).await;
        }
    }

    fn bind(&self, session: Arc<dyn OpcUaSession>) {
        let timeout = self.config.connection.request_timeout;
        let browser = NodeBrowser::new(Arc::clone(&session), timeout)
            .with_stats(Arc::clone(&self.browse_stats));
        let reader = AttributeReader::new(
            Arc::clone(&session),
            browser.clone(),
            timeout,
            self.config.monitoring.time_zone,
        );
        let mapper = ObjectMapper::new(browser.clone(), reader.clone());

        self.bound.store(Some(Arc::new(Bound {
            session_id: session.session_id(),
            browser,
            reader,
            mapper,
        })));
    }

    fn bound(&self) -> Option<Arc<Bound>> {
        self.bound.load_full()
    }

    /// Session id the service is currently bound to.
    pub fn wired_session(&self) -> Option<u64> {
        self.bound.load().as_ref().map(|b| b.session_id)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    async fn records_under<R: Record>(&self, root: &NodeId, name: &str) -> Vec<R> {
        let Some(bound) = self.bound() else {
            return Vec::new();
        };
        let node = bound.browser.find_child_by_name(root, name).await;
        bound.mapper.populate::<R>(node.as_ref()).await
    }

    async fn read_i32_or_sentinel(&self, node_id: &NodeId) -> i32 {
        match self.bound() {
            Some(bound) => bound.reader.read_i32(node_id).await.unwrap_or(-1),
            None => -1,
        }
    }

    /// Active alarms.
    pub async fn load_alarms(&self) -> Vec<Alarm> {
        self.records_under(&self.admin, "Alarm").await
    }

    /// Alarm history.
    pub async fn load_alarm_history(&self) -> Vec<AlarmHistory> {
        self.records_under(&self.admin, "AlarmHistory").await
    }

    /// Processed product counters.
    pub async fn load_prod_processed(&self) -> Vec<ProdProcessed> {
        self.records_under(&self.admin, "ProdProcessedCount").await
    }

    /// Consumed (measured) product counters.
    pub async fn load_prod_consumed(&self) -> Vec<ProdConsumed> {
        self.records_under(&self.admin, "ProdConsumedCount").await
    }

    /// Defective product counters.
    pub async fn load_prod_defects(&self) -> Vec<ProdDefectCount> {
        self.records_under(&self.admin, "ProdDefectiveCount").await
    }

    /// Pallet parameters.
    pub async fn load_pallet_info(&self) -> Vec<PalletInfo> {
        self.records_under(&self.status, "Parameter").await
    }

    /// Stop reasons.
    pub async fn load_stop_reason(&self) -> Vec<StopReason> {
        self.records_under(&self.admin, "StopReason").await
    }

    /// Controller clock, zero or one entry.
    pub async fn load_plc_date_time(&self) -> Vec<PlcDateTime> {
        let Some(bound) = self.bound() else {
            return Vec::new();
        };
        let Some(node) = bound.browser.find_child_by_name(&self.admin, "PLCDateTime").await else {
            return Vec::new();
        };
        bound
            .reader
            .read_timestamp_array(&node.node_id)
            .await
            .map(|time_stamp| vec![PlcDateTime { time_stamp }])
            .unwrap_or_default()
    }

    /// `Status.StateCurrent`, or -1.
    pub async fn load_state_current(&self) -> i32 {
        self.read_i32_or_sentinel(&self.status.join("StateCurrent")).await
    }

    /// `Status.UnitModeCurrent`, or -1.
    pub async fn load_unit_mode(&self) -> i32 {
        self.read_i32_or_sentinel(&self.status.join("UnitModeCurrent")).await
    }

    /// Seconds spent in `state` under `unit_mode`, or -1.
    pub async fn load_state_current_time(&self, unit_mode: i32, state: i32) -> i32 {
        let node = self.admin.join(&state_current_time_name(unit_mode, state));
        self.read_i32_or_sentinel(&node).await
    }

    // =========================================================================
    // Summaries
    // =========================================================================

    /// `(count, acc_count)` of the first processed counter.
    pub async fn prod_processing(&self) -> (i32, i32) {
        self.load_prod_processed()
            .await
            .first()
            .map(|p| (p.count, p.acc_count))
            .unwrap_or_default()
    }

    /// `(id, count, acc_count)` of the first defect counter.
    pub async fn prod_defect(&self) -> (i32, i32, i32) {
        self.load_prod_defects()
            .await
            .first()
            .map(|p| (p.id, p.count, p.acc_count))
            .unwrap_or_default()
    }

    /// `(id, count, acc_count)` of the first consumed counter.
    pub async fn prod_measured(&self) -> (i32, i32, i32) {
        self.load_prod_consumed()
            .await
            .first()
            .map(|p| (p.id, p.count, p.acc_count))
            .unwrap_or_default()
    }

    /// First stop reason, or an empty one.
    pub async fn stop_reason_summary(&self) -> StopReason {
        self.load_stop_reason().await.into_iter().next().unwrap_or_default()
    }

    /// The pallet on the machine.
    pub async fn pallet_information(&self) -> PalletSummary {
        PalletSummary::from_parameters(&self.load_pallet_info().await)
    }

    /// State, unit mode and time in state.
    pub async fn machine_snapshot(&self) -> MachineSnapshot {
        let unit_mode_code = self.load_unit_mode().await;
        let state_code = self.load_state_current().await;
        let state_seconds = if unit_mode_code >= 0 && state_code >= 0 {
            self.load_state_current_time(unit_mode_code, state_code).await
        } else {
            -1
        };

        MachineSnapshot {
            state_code,
            state: MachineState::from_code(state_code),
            unit_mode_code,
            unit_mode: UnitMode::from_code(unit_mode_code),
            state_seconds,
            elapsed: format_elapsed(i64::from(state_seconds)),
        }
    }

    // =========================================================================
    // Monitors
    // =========================================================================

    async fn find_bound_child(&self, root: &NodeId, name: &str) -> Option<NodeDescriptor> {
        let Some(bound) = self.bound() else {
            tracing::debug!(name, "Monitor needs a session to resolve its node");
            return None;
        };
        bound.browser.find_child_by_name(root, name).await
    }

    fn spec(&self, node_id: NodeId, display_name: impl Into<String>, callback: impl Fn(&DataValue) + Send + Sync + 'static) -> MonitoredPointSpec {
        MonitoredPointSpec::new(node_id, display_name, callback)
            .with_sampling_interval(self.config.monitoring.default_sampling)
    }

    /// Pushes the controller clock as `HH:MM:SS` in the configured zone.
    /// Returns `false` if the node could not be resolved.
    pub async fn monitor_plc_date_time<F>(&self, on_time: F) -> bool
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let Some(node) = self.find_bound_child(&self.admin, "PLCDateTime").await else {
            return false;
        };
        let zone = self.config.monitoring.time_zone;

        let spec = self.spec(node.node_id, node.display_name, move |dv| {
            if let Some(ts) = dv.source_timestamp {
                on_time(zone.convert(ts).format("%H:%M:%S").to_string());
            }
        });
        self.subscriptions.start_monitoring(spec).await;
        true
    }

    /// Pushes the time in the current state as `hh:mm:ss`. The state and
    /// unit mode are read once, at registration.
    pub async fn monitor_state_current_time<F>(&self, on_time: F) -> bool
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let unit_mode = self.load_unit_mode().await;
        let state = self.load_state_current().await;
        let name = state_current_time_name(unit_mode, state);

        let Some(node) = self.find_bound_child(&self.admin, &name).await else {
            tracing::debug!(node = %name, "State time node not found");
            return false;
        };

        let spec = self.spec(node.node_id, name, move |dv| {
            if let Some(OpcUaValue::Int32(seconds)) = dv.value {
                on_time(format_elapsed(i64::from(seconds)));
            }
        });
        self.subscriptions.start_monitoring(spec).await;
        true
    }

    /// Pushes an `Int32` below the status root, addressed directly as
    /// `<status>.<name>`. Queued while offline.
    pub async fn monitor_status_value<F>(&self, name: &str, on_value: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        let spec = self.spec(self.status.join(name), name, move |dv| {
            if let Some(OpcUaValue::Int32(v)) = dv.value {
                on_value(v);
            }
        });
        self.subscriptions.start_monitoring(spec).await;
    }

    /// Pushes a child of the admin root, rendered as text.
    pub async fn monitor_admin_node<F>(&self, name: &str, on_value: F) -> bool
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.monitor_text(self.admin.clone(), name, on_value).await
    }

    /// Pushes a child of the status root, rendered as text.
    pub async fn monitor_status_node<F>(&self, name: &str, on_value: F) -> bool
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.monitor_text(self.status.clone(), name, on_value).await
    }

    async fn monitor_text<F>(&self, root: NodeId, name: &str, on_value: F) -> bool
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let Some(node) = self.find_bound_child(&root, name).await else {
            return false;
        };
        let spec = self.spec(node.node_id, node.display_name, move |dv| {
            if let Some(value) = dv.value.as_ref().filter(|v| !v.is_null()) {
                on_value(value.to_string());
            }
        });
        self.subscriptions.start_monitoring(spec).await;
        true
    }

    /// Pushes `Status.Product[index].Ingredients[0].IngredientID`. Values
    /// that do not read as an integer are ignored. Queued while offline.
    pub async fn monitor_product_ingredient<F>(&self, index: usize, on_value: F, sampling: Option<Duration>)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        let path = ingredient_path(index);
        let sampling = sampling.unwrap_or(self.config.monitoring.ingredient_sampling);

        let spec = MonitoredPointSpec::new(self.status.join(&path), path, move |dv| {
            if let Some(v) = dv.value.as_ref().and_then(integer_like) {
                on_value(v);
            }
        })
        .with_sampling_interval(sampling);
        self.subscriptions.start_monitoring(spec).await;
    }

    /// Monitors every product slot and pushes `(index, value)`.
    pub async fn monitor_all_product_ingredients<F>(&self, on_value: F, sampling: Option<Duration>)
    where
        F: Fn(usize, i32) + Send + Sync + 'static,
    {
        let on_value = Arc::new(on_value);
        for index in 0..self.config.nodes.product_slots {
            let on_value = Arc::clone(&on_value);
            self.monitor_product_ingredient(index, move |v| on_value(index, v), sampling)
                .await;
        }
    }

    /// Forgets every monitor.
    pub async fn stop_monitoring(&self) {
        self.subscriptions.stop_monitoring().await;
    }
}

impl Drop for MachineService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for MachineService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineService")
            .field("endpoint", &self.config.connection.endpoint)
            .field("connection", &self.connection.state())
            .field("wired_session", &self.wired_session())
            .finish()
    }
}

// =============================================================================
// Background tasks
// =============================================================================

async fn wiring_listener(
    service: Weak<MachineService>,
    mut changes: broadcast::Receiver<ConnectionChange>,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            r = changes.recv() => r,
        };
        let Some(svc) = service.upgrade() else {
            break;
        };

        match received {
            Ok(change) => svc.apply_change(change).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Connection changes lagged; resynchronizing");
                match svc.connection.session_info() {
                    Some(_) => svc.ensure_wired().await,
                    None => {
                        svc.apply_change(ConnectionChange {
                            online: false,
                            session_id: None,
                            reason: ChangeReason::Requested,
                        })
                        .await
                    }
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::trace!("Wiring listener stopped");
}

async fn reconnect_driver(service: Weak<MachineService>, interval: Duration, token: CancellationToken) {
    loop {
        {
            let Some(svc) = service.upgrade() else {
                break;
            };
            if !svc.is_connected() {
                let attempt = tokio::select! {
                    _ = token.cancelled() => break,
                    r = svc.connection.connect() => r,
                };
                match attempt {
                    Ok(()) => svc.ensure_wired().await,
                    Err(e) => tracing::debug!(error = %e, "Auto-reconnect attempt failed"),
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::trace!("Reconnect driver stopped");
}

// =============================================================================
// Helpers
// =============================================================================

fn state_current_time_name(unit_mode: i32, state: i32) -> String {
    format!("StateCurrentTime[{unit_mode},{state}]")
}

fn ingredient_path(index: usize) -> String {
    format!("Product[{index}].Ingredients[0].IngredientID")
}

/// Integers, or anything whose text parses as one.
fn integer_like(value: &OpcUaValue) -> Option<i32> {
    value
        .as_i32()
        .or_else(|| value.to_string().trim().parse().ok())
}
