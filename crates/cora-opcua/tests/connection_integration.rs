// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection lifecycle against the mock transport.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::{client_config, init_test_logging, wait_until, MockPlc, MockTransport};
use cora_opcua::{ChangeReason, ConnectionManager, ConnectionState, OpcUaSession};

fn manager(plc: &Arc<MockPlc>) -> Arc<ConnectionManager> {
    init_test_logging();
    Arc::new(ConnectionManager::new(
        MockTransport::new(Arc::clone(plc)),
        client_config(),
    ))
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_open_one_session() {
    let plc = MockPlc::new();
    plc.open_delay_ms.store(100, Ordering::SeqCst);
    let manager = manager(&plc);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.connect().await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(plc.open_calls.load(Ordering::SeqCst), 1);
    assert_eq!(plc.sessions().len(), 1);
    assert_eq!(manager.stats().attempts(), 1);
    assert_eq!(manager.stats().shared_outcomes(), 7);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_failure() {
    let plc = MockPlc::new();
    plc.open_delay_ms.store(100, Ordering::SeqCst);
    plc.refuse_connects.store(1, Ordering::SeqCst);
    let manager = manager(&plc);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.connect().await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }

    assert_eq!(plc.open_calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_connect_emits_online_with_session_id() {
    let plc = MockPlc::new();
    let manager = manager(&plc);
    let mut changes = manager.subscribe();

    manager.connect().await.unwrap();

    let change = changes.recv().await.unwrap();
    assert!(change.online);
    assert_eq!(change.reason, ChangeReason::Connected);
    assert_eq!(change.session_id, manager.session_info().map(|i| i.session_id));
    assert_eq!(manager.session_info().unwrap().endpoint, common::ENDPOINT);
}

#[tokio::test]
async fn test_reconnect_replaces_and_closes_old_session() {
    let plc = MockPlc::new();
    let manager = manager(&plc);

    manager.connect().await.unwrap();
    manager.connect().await.unwrap();

    let sessions = plc.sessions();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].closes.load(Ordering::SeqCst), 1);
    assert!(sessions[1].is_connected());
    assert_eq!(manager.session_info().unwrap().session_id, sessions[1].session_id());
}

#[tokio::test]
async fn test_keep_alive_failure_emits_one_offline_event() {
    let plc = MockPlc::new();
    let manager = manager(&plc);
    manager.connect().await.unwrap();
    let mut changes = manager.subscribe();

    let lost = plc.fail_keep_alive(5).unwrap();
    plc.close_from_server();

    assert!(wait_until(|| manager.state() == ConnectionState::Faulted).await);
    assert!(!manager.is_connected());

    // Let the listener drain the remaining signals.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let change = changes.try_recv().unwrap();
    assert!(!change.online);
    assert_eq!(change.session_id, Some(lost));
    assert_eq!(change.reason, ChangeReason::KeepAliveFailed);
    assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(manager.stats().faults(), 1);
}

#[tokio::test]
async fn test_disconnect_emits_requested_offline() {
    let plc = MockPlc::new();
    let manager = manager(&plc);
    manager.connect().await.unwrap();
    let mut changes = manager.subscribe();

    manager.disconnect().await;
    manager.disconnect().await;

    let change = changes.recv().await.unwrap();
    assert!(!change.online);
    assert_eq!(change.reason, ChangeReason::Requested);
    assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.session().is_none());
    assert_eq!(plc.sessions()[0].closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_endpoint_fails_within_connect_timeout() {
    let plc = MockPlc::new();
    plc.unreachable.store(true, Ordering::SeqCst);
    let manager = manager(&plc);
    let limit = manager.config().connect_timeout;

    let started = Instant::now();
    let err = manager.connect().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(elapsed >= limit);
    assert!(elapsed < limit + Duration::from_secs(1));
    assert!(err.is_retryable());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.stats().failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_loop_retries_until_success() {
    let plc = MockPlc::new();
    plc.refuse_connects.store(3, Ordering::SeqCst);
    let manager = manager(&plc);
    let delay = Duration::from_secs(1);

    let started = Instant::now();
    let ok = manager
        .try_reconnect_loop(delay, CancellationToken::new())
        .await;

    assert!(ok);
    assert!(started.elapsed() >= delay * 3);
    assert_eq!(plc.open_calls.load(Ordering::SeqCst), 4);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_loop_stops_when_cancelled() {
    let plc = MockPlc::new();
    plc.refuse_connects.store(u32::MAX, Ordering::SeqCst);
    let manager = manager(&plc);
    let cancel = CancellationToken::new();

    let task = {
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.try_reconnect_loop(Duration::from_secs(1), cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(2500)).await;
    cancel.cancel();

    assert!(!task.await.unwrap());
    assert!(plc.open_calls.load(Ordering::SeqCst) >= 3);
    assert!(!manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_connect_restores_state() {
    let plc = MockPlc::new();
    plc.unreachable.store(true, Ordering::SeqCst);
    let manager = manager(&plc);

    let cut_off = tokio::time::timeout(Duration::from_secs(2), manager.connect()).await;
    assert!(cut_off.is_err());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.stats().attempts(), 1);
    assert_eq!(manager.stats().failures(), 0);

    // The gate is free again and the next attempt runs on its own.
    plc.unreachable.store(false, Ordering::SeqCst);
    manager.connect().await.unwrap();
    assert_eq!(plc.open_calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_reconnect_loop_restores_state() {
    let plc = MockPlc::new();
    plc.unreachable.store(true, Ordering::SeqCst);
    let manager = manager(&plc);
    let cancel = CancellationToken::new();

    let task = {
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.try_reconnect_loop(Duration::from_secs(1), cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(manager.state(), ConnectionState::Connecting);
    cancel.cancel();

    assert!(!task.await.unwrap());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_loop_keeps_live_session() {
    let plc = MockPlc::new();
    let manager = manager(&plc);
    manager.connect().await.unwrap();

    assert!(
        manager
            .try_reconnect_loop(Duration::from_secs(1), CancellationToken::new())
            .await
    );

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(manager.try_reconnect_loop(Duration::from_secs(1), cancelled).await);

    assert_eq!(plc.open_calls.load(Ordering::SeqCst), 1);
    assert_eq!(plc.sessions()[0].closes.load(Ordering::SeqCst), 0);
    assert_eq!(manager.stats().attempts(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
}
