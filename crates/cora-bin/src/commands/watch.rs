// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `watch` command.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use cora_opcua::{MachineService, MachineState, UnitMode};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::WatchArgs;
use crate::error::BinResult;
use crate::shutdown::ShutdownCoordinator;

/// How often the command checks whether browsed monitors need registering.
const REWIRE_CHECK: Duration = Duration::from_secs(1);

fn emit(name: &str, value: impl std::fmt::Display) {
    println!("{} {:<24} {}", Local::now().format("%H:%M:%S%.3f"), name, value);
}

/// Executes the `watch` command until a shutdown signal.
pub async fn watch(service: Arc<MachineService>, args: WatchArgs) -> BinResult<()> {
    let shutdown = ShutdownCoordinator::new();
    let mut stop = shutdown.subscribe();
    let mut changes = service.subscribe_connection();

    // Direct monitors are queued until the first session.
    service
        .monitor_status_value("StateCurrent", |code| {
            emit("StateCurrent", MachineState::from_code(code))
        })
        .await;
    service
        .monitor_status_value("UnitModeCurrent", |code| {
            emit("UnitModeCurrent", UnitMode::from_code(code))
        })
        .await;
    if args.products {
        service
            .monitor_all_product_ingredients(
                |index, id| emit(&format!("Product[{index}].Ingredient"), id),
                None,
            )
            .await;
    }

    if !service.start().await {
        warn!("Controller unreachable, waiting for it");
    }
    service.start_auto_reconnect(None);

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_shutdown().await });

    let mut ticker = tokio::time::interval(REWIRE_CHECK);
    let mut registered_for = None;
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            change = changes.recv() => match change {
                Ok(change) if change.online => emit("Connection", "online"),
                Ok(change) => emit("Connection", format!("offline ({:?})", change.reason)),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                let wired = service.wired_session();
                if wired.is_some() && wired != registered_for {
                    register_browsed(&service).await;
                    registered_for = wired;
                }
            }
        }
    }

    info!("Stopping watch");
    service.shutdown().await;
    Ok(())
}

/// Monitors whose nodes are resolved by browsing, so they need a session.
/// Registering the same node again replaces its callback.
async fn register_browsed(service: &MachineService) {
    if !service.monitor_plc_date_time(|time| emit("PLCDateTime", time)).await {
        warn!("PLCDateTime not found");
    }
    if !service
        .monitor_state_current_time(|elapsed| emit("StateCurrentTime", elapsed))
        .await
    {
        warn!("StateCurrentTime not found for the current state");
    }
}
