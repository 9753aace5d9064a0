// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection lifecycle.
//!
//! [`ConnectionManager`] owns at most one live session. Connect attempts are
//! serialized by a single-slot gate; readers load the current session
//! without locking. Session health signals arrive on an mpsc channel and
//! are handled by a listener task that faults the connection exactly once.
//!
//! # State machine
//!
//! ```text
//!                 ConnectRequested           ConnectSucceeded
//!  Disconnected ───────────────────► Connecting ──────────────► Connected
//!       ▲                               │  ConnectFailed            │
//!       │◄──────────────────────────────┘                           │ SessionLost
//!       │ DisconnectRequested                                       ▼
//!       └──────────────────────────────────────────────────────── Faulted
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::client::transport::{OpcUaSession, OpcUaTransport, SessionEvent, SessionEventSender};
use crate::error::{ConnectionError, OpcUaError, OpcUaResult, SessionError};
use crate::types::OpcUaConfig;

const EVENT_CAPACITY: usize = 64;

// =============================================================================
// ConnectionState
// =============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session and none requested.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A live session is installed.
    Connected,
    /// The session was lost without being asked to.
    Faulted,
}

/// Inputs of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `connect()` started an attempt.
    ConnectRequested,
    /// The attempt produced a session.
    ConnectSucceeded,
    /// The attempt failed.
    ConnectFailed,
    /// Keep-alive failure or server-side close.
    SessionLost,
    /// `disconnect()` was called.
    DisconnectRequested,
}

impl ConnectionState {
    /// Next state after `event`. Events that do not apply leave the state
    /// unchanged.
    pub fn on(self, event: ConnectionEvent) -> ConnectionState {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (_, E::DisconnectRequested) => S::Disconnected,
            (_, E::ConnectRequested) => S::Connecting,
            (S::Connecting, E::ConnectSucceeded) => S::Connected,
            (S::Connecting, E::ConnectFailed) => S::Disconnected,
            (S::Connected, E::SessionLost) => S::Faulted,
            (state, _) => state,
        }
    }

    /// Returns `true` when a session is installed.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}

// =============================================================================
// ConnectionChange
// =============================================================================

/// Why the online flag changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// A new session was installed.
    Connected,
    /// `disconnect()` was called.
    Requested,
    /// Keep-alive reported a bad status.
    KeepAliveFailed,
    /// The stack closed the session.
    SessionClosing,
}

impl ChangeReason {
    /// Returns `true` for losses the client did not ask for.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::KeepAliveFailed | Self::SessionClosing)
    }
}

/// Online/offline transition, delivered in order on a broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionChange {
    /// New online flag.
    pub online: bool,
    /// Session installed (online) or lost (offline), if any.
    pub session_id: Option<u64>,
    /// Cause.
    pub reason: ChangeReason,
}

// =============================================================================
// SessionInfo / ConnectionStats
// =============================================================================

/// Facts about the installed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session id.
    pub session_id: u64,
    /// Endpoint the session is bound to.
    pub endpoint: String,
    /// When the session was installed.
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    /// Time since the session was installed.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// Connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    faults: AtomicU64,
    shared_outcomes: AtomicU64,
}

impl ConnectionStats {
    /// Physical connect attempts.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Attempts that installed a session.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Attempts that failed.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Sessions lost to keep-alive failure or server close.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Callers that reused another caller's attempt.
    pub fn shared_outcomes(&self) -> u64 {
        self.shared_outcomes.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Shared state
// =============================================================================

struct ActiveSession {
    session: Arc<dyn OpcUaSession>,
    info: SessionInfo,
}

/// State touched by both callers and the session event listener.
struct Shared {
    active: ArcSwapOption<ActiveSession>,
    online: AtomicBool,
    /// Orders session swaps with the events describing them.
    transition: parking_lot::Mutex<()>,
    state_tx: watch::Sender<ConnectionState>,
    changes: broadcast::Sender<ConnectionChange>,
    stats: ConnectionStats,
    request_timeout: Duration,
}

impl Shared {
    fn apply(&self, event: ConnectionEvent) {
        self.state_tx.send_modify(|s| *s = s.on(event));
    }

    fn emit(&self, change: ConnectionChange) {
        tracing::debug!(online = change.online, session_id = ?change.session_id, reason = ?change.reason, "Connection change");
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    /// Removes the session if it is still `session_id` and reports it
    /// offline. Returns the removed session.
    fn fault(&self, session_id: u64, reason: ChangeReason) -> Option<Arc<dyn OpcUaSession>> {
        let _guard = self.transition.lock();

        let current = self.active.load_full()?;
        if current.info.session_id != session_id {
            return None;
        }
        self.active.store(None);
        self.apply(ConnectionEvent::SessionLost);
        self.stats.faults.fetch_add(1, Ordering::Relaxed);

        if self.online.swap(false, Ordering::AcqRel) {
            self.emit(ConnectionChange {
                online: false,
                session_id: Some(session_id),
                reason,
            });
        }
        Some(Arc::clone(&current.session))
    }

    async fn close_quietly(&self, session: Arc<dyn OpcUaSession>) {
        let id = session.session_id();
        match tokio::time::timeout(self.request_timeout, session.close()).await {
            Ok(Ok(())) => tracing::debug!(session_id = id, "Session closed"),
            Ok(Err(e)) => tracing::debug!(session_id = id, error = %e, "Session close failed"),
            Err(_) => tracing::debug!(session_id = id, "Session close timed out"),
        }
    }
}

async fn listen_session_events(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = events.recv() => match next {
                Some(e) => e,
                None => break,
            },
        };

        match event {
            SessionEvent::KeepAlive { session_id, status } if status.is_bad() => {
                if let Some(session) = shared.fault(session_id, ChangeReason::KeepAliveFailed) {
                    OpcUaError::session(SessionError::keep_alive_failed(session_id, status.0))
                        .log("keep-alive");
                    shared.close_quietly(session).await;
                }
            }
            SessionEvent::KeepAlive { session_id, status } => {
                tracing::trace!(session_id, %status, "Keep-alive");
            }
            SessionEvent::Closing { session_id } => {
                if shared.fault(session_id, ChangeReason::SessionClosing).is_some() {
                    tracing::warn!(session_id, "Session closed by the stack");
                }
            }
        }
    }
    tracing::trace!("Session event listener stopped");
}

// =============================================================================
// ConnectionManager
// =============================================================================

/// Owns the session to one endpoint.
pub struct ConnectionManager {
    transport: Arc<dyn OpcUaTransport>,
    config: OpcUaConfig,
    gate: Mutex<()>,
    completed_attempts: AtomicU64,
    last_failure: parking_lot::Mutex<Option<String>>,
    session_events: SessionEventSender,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    /// Creates a manager and spawns its session event listener.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(transport: Arc<dyn OpcUaTransport>, config: OpcUaConfig) -> Self {
        let (session_events, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (changes, _) = broadcast::channel(EVENT_CAPACITY);
        let shutdown = CancellationToken::new();

        let shared = Arc::new(Shared {
            active: ArcSwapOption::empty(),
            online: AtomicBool::new(false),
            transition: parking_lot::Mutex::new(()),
            state_tx,
            changes,
            stats: ConnectionStats::default(),
            request_timeout: config.request_timeout,
        });

        tokio::spawn(listen_session_events(
            Arc::clone(&shared),
            events_rx,
            shutdown.clone(),
        ));

        Self {
            transport,
            config,
            gate: Mutex::new(()),
            completed_attempts: AtomicU64::new(0),
            last_failure: parking_lot::Mutex::new(None),
            session_events,
            shared,
            shutdown,
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &OpcUaConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Watches the state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribes to online/offline changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionChange> {
        self.shared.changes.subscribe()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &ConnectionStats {
        &self.shared.stats
    }

    /// Returns `true` if a session is installed and its channel is usable.
    pub fn is_connected(&self) -> bool {
        self.shared
            .active
            .load()
            .as_ref()
            .is_some_and(|a| a.session.is_connected())
    }

    /// The installed session, if any.
    pub fn session(&self) -> Option<Arc<dyn OpcUaSession>> {
        self.shared
            .active
            .load()
            .as_ref()
            .map(|a| Arc::clone(&a.session))
    }

    /// Facts about the installed session.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.shared.active.load().as_ref().map(|a| a.info.clone())
    }

    /// Opens a session and installs it.
    ///
    /// Callers that queued behind another attempt share its outcome instead
    /// of opening a second session.
    pub async fn connect(&self) -> OpcUaResult<()> {
        let seen = self.completed_attempts.load(Ordering::Acquire);
        let _gate = self.gate.lock().await;

        if self.completed_attempts.load(Ordering::Acquire) != seen {
            self.shared.stats.shared_outcomes.fetch_add(1, Ordering::Relaxed);
            if self.is_connected() {
                return Ok(());
            }
            let reason = self.last_failure.lock().clone();
            return Err(OpcUaError::connection(ConnectionError::closed(reason)));
        }

        let outcome = self.attempt().await;
        *self.last_failure.lock() = outcome.as_ref().err().map(ToString::to_string);
        self.completed_attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn attempt(&self) -> OpcUaResult<()> {
        let mut guard = AttemptGuard {
            shared: &self.shared,
            previous: self.state(),
            committed: false,
        };
        self.shared.apply(ConnectionEvent::ConnectRequested);
        self.shared.stats.attempts.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            endpoint = %self.config.endpoint,
            transport = %self.transport.display_name(),
            "Connecting"
        );

        let opened = tokio::time::timeout(
            self.config.connect_timeout,
            self.transport.open_session(&self.config, self.session_events.clone()),
        )
        .await
        .map_err(|_| {
            OpcUaError::connection(ConnectionError::timed_out(
                self.config.endpoint.clone(),
                self.config.connect_timeout,
            ))
        })
        .and_then(|r| r);

        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                self.shared.stats.failures.fetch_add(1, Ordering::Relaxed);
                guard.restore();
                e.log("connect");
                return Err(e);
            }
        };

        let info = SessionInfo {
            session_id: session.session_id(),
            endpoint: self.config.endpoint.clone(),
            created_at: Utc::now(),
        };
        let session_id = info.session_id;

        let replaced = {
            let _transition = self.shared.transition.lock();
            guard.committed = true;
            let replaced = self
                .shared
                .active
                .swap(Some(Arc::new(ActiveSession { session, info })));
            self.shared.online.store(true, Ordering::Release);
            self.shared.apply(ConnectionEvent::ConnectSucceeded);
            self.shared.emit(ConnectionChange {
                online: true,
                session_id: Some(session_id),
                reason: ChangeReason::Connected,
            });
            replaced
        };

        self.shared.stats.successes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(endpoint = %self.config.endpoint, session_id, "Connected");

        if let Some(old) = replaced {
            // Runs detached so a caller dropping this future cannot leak the old session.
            let shared = Arc::clone(&self.shared);
            let closing = tokio::spawn(async move {
                shared.close_quietly(Arc::clone(&old.session)).await;
            });
            let _ = closing.await;
        }
        Ok(())
    }

    /// Closes and forgets the session.
    pub async fn disconnect(&self) {
        let _gate = self.gate.lock().await;

        let removed = {
            let _guard = self.shared.transition.lock();
            let removed = self.shared.active.swap(None);
            self.shared.apply(ConnectionEvent::DisconnectRequested);
            if self.shared.online.swap(false, Ordering::AcqRel) {
                self.shared.emit(ConnectionChange {
                    online: false,
                    session_id: removed.as_ref().map(|a| a.info.session_id),
                    reason: ChangeReason::Requested,
                });
            }
            removed
        };

        if let Some(old) = removed {
            self.shared.close_quietly(Arc::clone(&old.session)).await;
            tracing::info!(endpoint = %self.config.endpoint, "Disconnected");
        }
    }

    /// Calls [`connect`](Self::connect) until a session is up, sleeping
    /// `delay` between attempts.
    ///
    /// A live session is kept as is. Returns whether a session is up when
    /// the loop ends, so cancellation while connected still reports `true`.
    pub async fn try_reconnect_loop(&self, delay: Duration, cancel: CancellationToken) -> bool {
        let mut failures = 0u32;
        loop {
            if self.is_connected() {
                if failures > 0 {
                    tracing::info!(failures, "Reconnected");
                }
                return true;
            }
            if cancel.is_cancelled() {
                return self.is_connected();
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return self.is_connected(),
                outcome = self.connect() => outcome,
            };
            if let Err(e) = outcome {
                failures += 1;
                tracing::debug!(attempt = failures, error = %e, "Reconnect attempt failed");
            }
            if self.is_connected() {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return self.is_connected(),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Puts the pre-attempt state back unless the new session was installed.
///
/// Covers both failed attempts and callers that drop `connect` mid-flight,
/// such as a timeout around it or a cancelled reconnect loop.
struct AttemptGuard<'a> {
    shared: &'a Shared,
    previous: ConnectionState,
    committed: bool,
}

impl AttemptGuard<'_> {
    fn restore(&mut self) {
        if !self.committed {
            self.committed = true;
            self.shared.state_tx.send_replace(self.previous);
        }
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!(restored = %self.previous, "Connect attempt abandoned");
            self.restore();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ConnectionEvent as E;
        use ConnectionState as S;

        assert_eq!(S::Disconnected.on(E::ConnectRequested), S::Connecting);
        assert_eq!(S::Connecting.on(E::ConnectSucceeded), S::Connected);
        assert_eq!(S::Connecting.on(E::ConnectFailed), S::Disconnected);
        assert_eq!(S::Connected.on(E::SessionLost), S::Faulted);
        assert_eq!(S::Faulted.on(E::ConnectRequested), S::Connecting);
        assert_eq!(S::Faulted.on(E::DisconnectRequested), S::Disconnected);

        // Inapplicable events are ignored.
        assert_eq!(S::Disconnected.on(E::SessionLost), S::Disconnected);
        assert_eq!(S::Disconnected.on(E::ConnectSucceeded), S::Disconnected);
        assert_eq!(S::Faulted.on(E::SessionLost), S::Faulted);
    }

    #[test]
    fn test_change_reason() {
        assert!(ChangeReason::KeepAliveFailed.is_fault());
        assert!(ChangeReason::SessionClosing.is_fault());
        assert!(!ChangeReason::Requested.is_fault());
        assert!(!ChangeReason::Connected.is_fault());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Faulted.to_string(), "Faulted");
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
    }
}
