// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Durable live-value monitoring across reconnects.
//!
//! # Architecture
//!
//! ```text
//!   start_monitoring(spec) ──► durable spec set (handle per spec)
//!                                   │ replayed on every update_session
//!                                   ▼
//!   session ──► one live subscription ──► monitored items (client handle)
//!                                   │
//!          DataChangeNotification   │ mpsc
//!                                   ▼
//!                         dispatcher task ──► callback[handle]  (panic-isolated)
//! ```
//!
//! A short synchronous lock guards the session, the live subscription and
//! the spec set; it is never held across a server call. Each session change
//! bumps a generation, and work started against an older generation is
//! discarded when it comes back. Server calls are bounded by the request
//! timeout. Failures are logged and swallowed; a spec that could not be
//! attached stays queued until the next successful rewire.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::client::transport::{
    DataChangeNotification, DataValue, MonitoredItemRequest, NotificationSender, OpcUaSession,
};
use crate::error::{OpcUaError, OpcUaResult};
use crate::types::{MonitoredItemSettings, NodeId, SubscriptionSettings};

/// Callback invoked with every new value of a monitored point.
pub type DataCallback = Arc<dyn Fn(&DataValue) + Send + Sync>;

const NO_SUBSCRIPTION: u64 = u64::MAX;

// =============================================================================
// MonitoredPointSpec
// =============================================================================

/// What to monitor and whom to tell.
#[derive(Clone)]
pub struct MonitoredPointSpec {
    /// Monitored node.
    pub node_id: NodeId,
    /// Display name; together with `node_id` it identifies the spec.
    pub display_name: String,
    /// Server sampling interval.
    pub sampling_interval: Duration,
    /// Value callback.
    pub callback: DataCallback,
}

impl MonitoredPointSpec {
    /// Creates a spec with the default one second sampling interval.
    pub fn new<F>(node_id: NodeId, display_name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&DataValue) + Send + Sync + 'static,
    {
        Self {
            node_id,
            display_name: display_name.into(),
            sampling_interval: Duration::from_secs(1),
            callback: Arc::new(callback),
        }
    }

    /// Overrides the sampling interval.
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    fn same_point(&self, other: &MonitoredPointSpec) -> bool {
        self.node_id == other.node_id && self.display_name == other.display_name
    }
}

impl fmt::Debug for MonitoredPointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredPointSpec")
            .field("node_id", &self.node_id)
            .field("display_name", &self.display_name)
            .field("sampling_interval", &self.sampling_interval)
            .finish()
    }
}

// =============================================================================
// State and statistics
// =============================================================================

/// Lifecycle of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// No usable session.
    NoSession,
    /// A session but no live subscription.
    SessionNoSubscription,
    /// A live subscription on the current session.
    Active,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSession => write!(f, "NoSession"),
            Self::SessionNoSubscription => write!(f, "SessionNoSubscription"),
            Self::Active => write!(f, "Active"),
        }
    }
}

/// Counters for monitoring.
#[derive(Debug, Default)]
pub struct SubscriptionStats {
    /// Values handed to callbacks.
    pub notifications_delivered: AtomicU64,
    /// Notifications for unknown handles or stale subscriptions.
    pub notifications_dropped: AtomicU64,
    /// Callbacks that panicked.
    pub callback_panics: AtomicU64,
    /// Subscriptions rebuilt on a new session.
    pub rebuilds: AtomicU64,
    /// Subscription creations that failed.
    pub failed_creations: AtomicU64,
    /// Monitored items that could not be created.
    pub failed_items: AtomicU64,
    /// Subscriptions deleted because the session changed while they were
    /// being created.
    pub stale_subscriptions: AtomicU64,
}

impl SubscriptionStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// SubscriptionManager
// =============================================================================

#[derive(Clone)]
struct RegisteredSpec {
    handle: u32,
    spec: MonitoredPointSpec,
}

struct Inner {
    session: Option<Arc<dyn OpcUaSession>>,
    subscription_id: Option<u32>,
    specs: Vec<RegisteredSpec>,
    /// Bumped on every session change and on `stop_monitoring`.
    generation: u64,
    /// A subscription is being created for the current generation.
    attaching: bool,
}

/// What `start_monitoring` has to do once the lock is released.
enum NextStep {
    Queued,
    AddItem(Arc<dyn OpcUaSession>, u32, u64),
    Attach(Arc<dyn OpcUaSession>, u64),
}

/// Keeps a durable set of monitored points attached to whatever session is
/// current.
pub struct SubscriptionManager {
    inner: Mutex<Inner>,
    /// Latest generation whose setup has finished, successfully or not.
    settled: watch::Sender<u64>,
    callbacks: Arc<RwLock<HashMap<u32, DataCallback>>>,
    active_subscription: Arc<AtomicU64>,
    notify_tx: NotificationSender,
    next_handle: AtomicU32,
    settings: SubscriptionSettings,
    item_defaults: MonitoredItemSettings,
    request_timeout: Duration,
    stats: Arc<SubscriptionStats>,
    shutdown: CancellationToken,
}

impl SubscriptionManager {
    /// Creates a manager and spawns its dispatcher task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        settings: SubscriptionSettings,
        item_defaults: MonitoredItemSettings,
        request_timeout: Duration,
    ) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (settled, _) = watch::channel(0);
        let callbacks = Arc::new(RwLock::new(HashMap::new()));
        let active_subscription = Arc::new(AtomicU64::new(NO_SUBSCRIPTION));
        let stats = Arc::new(SubscriptionStats::default());
        let shutdown = CancellationToken::new();

        tokio::spawn(dispatch_loop(
            notify_rx,
            Arc::clone(&callbacks),
            Arc::clone(&active_subscription),
            Arc::clone(&stats),
            shutdown.clone(),
        ));

        Self {
            inner: Mutex::new(Inner {
                session: None,
                subscription_id: None,
                specs: Vec::new(),
                generation: 0,
                attaching: false,
            }),
            settled,
            callbacks,
            active_subscription,
            notify_tx,
            next_handle: AtomicU32::new(1),
            settings,
            item_defaults,
            request_timeout,
            stats,
            shutdown,
        }
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &SubscriptionStats {
        &self.stats
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SubscriptionState {
        let inner = self.inner.lock();
        match (&inner.session, inner.subscription_id) {
            (None, _) => SubscriptionState::NoSession,
            (Some(_), None) => SubscriptionState::SessionNoSubscription,
            (Some(_), Some(_)) => SubscriptionState::Active,
        }
    }

    /// Id of the bound session, if any.
    pub fn session_id(&self) -> Option<u64> {
        self.inner.lock().session.as_ref().map(|s| s.session_id())
    }

    /// Waits until setup for the current session has finished.
    ///
    /// Returns at once when nothing is in flight.
    pub async fn settled(&self) {
        let target = self.inner.lock().generation;
        let mut rx = self.settled.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|done| *done >= target).await;
    }

    fn settle(&self, generation: u64) {
        self.settled.send_if_modified(|done| {
            let advanced = generation > *done;
            if advanced {
                *done = generation;
            }
            advanced
        });
    }

    /// Number of durable specs.
    pub async fn spec_count(&self) -> usize {
        self.inner.lock().specs.len()
    }

    /// Binds the manager to a new session (or none) and replays every spec.
    pub async fn update_session(&self, session: Option<Arc<dyn OpcUaSession>>) {
        let session = session.filter(|s| s.is_connected());

        let (retired, generation) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            self.active_subscription.store(NO_SUBSCRIPTION, Ordering::Release);
            let retired = match (inner.session.take(), inner.subscription_id.take()) {
                (Some(old), Some(id)) => Some((old, id)),
                _ => None,
            };
            inner.session = session.clone();
            inner.attaching = session.is_some();
            (retired, inner.generation)
        };

        if let Some((old, id)) = retired {
            self.delete_quietly(&old, id).await;
        }

        match session {
            Some(session) => self.attach(session, generation).await,
            None => {
                self.settle(generation);
                tracing::debug!("Subscription manager detached from session");
            }
        }
    }

    /// Registers `spec` durably and attaches it to the live subscription when
    /// possible.
    pub async fn start_monitoring(&self, spec: MonitoredPointSpec) {
        let (handle, next) = {
            let mut inner = self.inner.lock();

            if let Some(existing) = inner.specs.iter_mut().find(|r| r.spec.same_point(&spec)) {
                // Same point: the newer callback wins, no second item.
                existing.spec.callback = Arc::clone(&spec.callback);
                self.callbacks
                    .write()
                    .insert(existing.handle, Arc::clone(&spec.callback));
                return;
            }

            let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
            self.callbacks.write().insert(handle, Arc::clone(&spec.callback));
            inner.specs.push(RegisteredSpec {
                handle,
                spec: spec.clone(),
            });

            let generation = inner.generation;
            let next = match (inner.session.clone().filter(|s| s.is_connected()), inner.subscription_id) {
                (None, _) => NextStep::Queued,
                (Some(session), Some(id)) => NextStep::AddItem(session, id, generation),
                // An attach in flight replays the spec set when it commits.
                (Some(_), None) if inner.attaching => NextStep::Queued,
                (Some(session), None) => {
                    inner.attaching = true;
                    NextStep::Attach(session, generation)
                }
            };
            (handle, next)
        };

        match next {
            NextStep::Queued => {
                tracing::debug!(node = %spec.display_name, "Monitoring queued until a subscription is available");
            }
            NextStep::AddItem(session, subscription_id, generation) => {
                if self.add_item(&session, subscription_id, handle, &spec).await
                    && self.is_current(generation)
                {
                    self.apply(&session, subscription_id).await;
                }
            }
            NextStep::Attach(session, generation) => self.attach(session, generation).await,
        }
    }

    /// Deletes the live subscription and forgets every spec.
    pub async fn stop_monitoring(&self) {
        let (retired, generation) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.attaching = false;
            inner.specs.clear();
            self.callbacks.write().clear();
            self.active_subscription.store(NO_SUBSCRIPTION, Ordering::Release);
            let retired = match (inner.session.clone(), inner.subscription_id.take()) {
                (Some(session), Some(id)) => Some((session, id)),
                _ => None,
            };
            (retired, inner.generation)
        };
        self.settle(generation);

        if let Some((session, id)) = retired {
            self.delete_quietly(&session, id).await;
        }
        tracing::info!("Monitoring stopped");
    }

    // =========================================================================
    // Internals (never called with the lock held)
    // =========================================================================

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = OpcUaResult<T>>,
    ) -> OpcUaResult<T> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| OpcUaError::operation_timeout(operation, self.request_timeout))?
    }

    /// Creates a subscription on `session`, commits it if `generation` is
    /// still current and replays the spec set onto it.
    async fn attach(&self, session: Arc<dyn OpcUaSession>, generation: u64) {
        let mut pending = AttachGuard {
            manager: self,
            generation,
            committed: false,
        };

        let call = session.create_subscription(&self.settings, self.notify_tx.clone());
        let subscription_id = match self.bounded("create_subscription", call).await {
            Ok(id) => id,
            Err(e) => {
                SubscriptionStats::bump(&self.stats.failed_creations);
                e.log("create subscription");
                return;
            }
        };

        let specs = {
            let mut inner = self.inner.lock();
            if inner.generation == generation {
                inner.subscription_id = Some(subscription_id);
                inner.attaching = false;
                self.active_subscription
                    .store(u64::from(subscription_id), Ordering::Release);
                Some(inner.specs.clone())
            } else {
                None
            }
        };
        pending.disarm();

        let Some(specs) = specs else {
            SubscriptionStats::bump(&self.stats.stale_subscriptions);
            tracing::debug!(
                session_id = session.session_id(),
                subscription_id,
                "Session changed during subscription setup; discarding"
            );
            self.delete_quietly(&session, subscription_id).await;
            return;
        };
        tracing::debug!(session_id = session.session_id(), subscription_id, "Subscription created");

        let mut attached = 0usize;
        for registered in &specs {
            if !self.is_current(generation) {
                tracing::debug!(subscription_id, "Session changed during replay; stopping");
                return;
            }
            if self
                .add_item(&session, subscription_id, registered.handle, &registered.spec)
                .await
            {
                attached += 1;
            }
        }
        self.apply(&session, subscription_id).await;

        SubscriptionStats::bump(&self.stats.rebuilds);
        tracing::info!(
            session_id = session.session_id(),
            subscription_id,
            attached,
            total = specs.len(),
            "Monitored items replayed on new session"
        );
    }

    async fn delete_quietly(&self, session: &Arc<dyn OpcUaSession>, subscription_id: u32) {
        if let Err(e) = self
            .bounded("delete_subscription", session.delete_subscription(subscription_id))
            .await
        {
            tracing::debug!(subscription_id, error = %e, "Subscription delete ignored");
        }
    }

    async fn add_item(
        &self,
        session: &Arc<dyn OpcUaSession>,
        subscription_id: u32,
        handle: u32,
        spec: &MonitoredPointSpec,
    ) -> bool {
        let request = MonitoredItemRequest {
            node_id: spec.node_id.clone(),
            display_name: spec.display_name.clone(),
            client_handle: handle,
            settings: MonitoredItemSettings {
                sampling_interval: spec.sampling_interval,
                ..self.item_defaults.clone()
            },
        };

        match self
            .bounded("create_monitored_item", session.create_monitored_item(subscription_id, &request))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                SubscriptionStats::bump(&self.stats.failed_items);
                tracing::warn!(node = %spec.display_name, error = %e, "Monitored item not created");
                false
            }
        }
    }

    async fn apply(&self, session: &Arc<dyn OpcUaSession>, subscription_id: u32) {
        if let Err(e) = self.bounded("apply_changes", session.apply_changes(subscription_id)).await {
            tracing::warn!(subscription_id, error = %e, "Applying subscription changes failed");
        }
    }
}

/// Ends an attach. Clears the `attaching` mark if no subscription was
/// committed, so the next `start_monitoring` retries, and marks the
/// generation settled.
struct AttachGuard<'a> {
    manager: &'a SubscriptionManager,
    generation: u64,
    committed: bool,
}

impl AttachGuard<'_> {
    fn disarm(&mut self) {
        self.committed = true;
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut inner = self.manager.inner.lock();
            if inner.generation == self.generation {
                inner.attaching = false;
            }
        }
        self.manager.settle(self.generation);
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("settings", &self.settings)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<DataChangeNotification>,
    callbacks: Arc<RwLock<HashMap<u32, DataCallback>>>,
    active_subscription: Arc<AtomicU64>,
    stats: Arc<SubscriptionStats>,
    shutdown: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(n) => n,
                None => break,
            },
        };

        if u64::from(notification.subscription_id) != active_subscription.load(Ordering::Acquire) {
            SubscriptionStats::bump(&stats.notifications_dropped);
            continue;
        }

        let callback = callbacks.read().get(&notification.client_handle).cloned();
        let Some(callback) = callback else {
            SubscriptionStats::bump(&stats.notifications_dropped);
            continue;
        };

        match catch_unwind(AssertUnwindSafe(|| callback(&notification.value))) {
            Ok(()) => SubscriptionStats::bump(&stats.notifications_delivered),
            Err(_) => {
                SubscriptionStats::bump(&stats.callback_panics);
                tracing::warn!(
                    client_handle = notification.client_handle,
                    "Monitoring callback panicked; delivery continues"
                );
            }
        }
    }
    tracing::trace!("Notification dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_identity() {
        let a = MonitoredPointSpec::new(NodeId::string(4, "S.StateCurrent"), "StateCurrent", |_| {});
        let b = MonitoredPointSpec::new(NodeId::string(4, "S.StateCurrent"), "StateCurrent", |_| {});
        let c = MonitoredPointSpec::new(NodeId::string(4, "S.StateCurrent"), "Other", |_| {});
        assert!(a.same_point(&b));
        assert!(!a.same_point(&c));
        assert_eq!(a.sampling_interval, Duration::from_secs(1));
        assert_eq!(
            c.with_sampling_interval(Duration::from_millis(500)).sampling_interval,
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn test_starts_without_session() {
        let manager = SubscriptionManager::new(
            SubscriptionSettings::default(),
            MonitoredItemSettings::default(),
            Duration::from_secs(1),
        );
        assert_eq!(manager.state().await, SubscriptionState::NoSession);

        manager
            .start_monitoring(MonitoredPointSpec::new(NodeId::numeric(2, 1), "A", |_| {}))
            .await;
        assert_eq!(manager.spec_count().await, 1);
        assert_eq!(manager.state().await, SubscriptionState::NoSession);

        manager.stop_monitoring().await;
        assert_eq!(manager.spec_count().await, 0);
    }
}
