// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `status` command.

use std::fmt::Write as _;
use std::sync::Arc;

use cora_opcua::{ConnectionState, MachineService, MachineSnapshot, PalletSummary, SessionInfo};
use serde::Serialize;

use crate::cli::{OutputFormat, StatusArgs};
use crate::error::{BinError, BinResult};

/// Everything `status` prints.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Configured endpoint.
    pub endpoint: String,
    /// Connection state after the connect attempt.
    pub connection: ConnectionState,
    /// The installed session, if any.
    pub session: Option<SessionInfo>,
    /// State, unit mode and time in state.
    pub machine: MachineSnapshot,
    /// Pallet on the machine.
    pub pallet: PalletSummary,
    /// Adapter name for the pallet.
    pub adapter: &'static str,
    /// Processed count and accumulated count.
    pub processed: (i32, i32),
    /// Current stop reason message, empty when none.
    pub stop_reason: String,
}

impl StatusReport {
    /// Collects a report from `service`. Offline values are defaults.
    pub async fn collect(service: &MachineService) -> Self {
        let pallet = service.pallet_information().await;
        Self {
            endpoint: service.config().connection.endpoint.clone(),
            connection: service.connection_state(),
            session: service.session_info(),
            machine: service.machine_snapshot().await,
            adapter: pallet.adapter_name(),
            pallet,
            processed: service.prod_processing().await,
            stop_reason: service.stop_reason_summary().await.message,
        }
    }

    /// Human readable rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Endpoint:    {}", self.endpoint);

        match &self.session {
            Some(session) => {
                let _ = writeln!(
                    out,
                    "Connection:  {} (session {}, up {}s)",
                    self.connection,
                    session.session_id,
                    session.age().num_seconds().max(0)
                );
            }
            None => {
                let _ = writeln!(out, "Connection:  {}", self.connection);
                return out;
            }
        }

        let _ = writeln!(
            out,
            "State:       {} ({}) for {}",
            self.machine.state, self.machine.state_code, self.machine.elapsed
        );
        let _ = writeln!(
            out,
            "Unit mode:   {} ({})",
            self.machine.unit_mode, self.machine.unit_mode_code
        );
        let _ = writeln!(out, "Pallet:      {} [{}]", self.pallet.name, self.adapter);
        let _ = writeln!(
            out,
            "Processed:   {} (total {})",
            self.processed.0, self.processed.1
        );
        if !self.stop_reason.is_empty() {
            let _ = writeln!(out, "Stop reason: {}", self.stop_reason);
        }
        out
    }
}

/// Executes the `status` command.
///
/// The report is printed even when the controller is unreachable; the
/// command then fails with a connection error.
pub async fn status(service: Arc<MachineService>, args: StatusArgs) -> BinResult<()> {
    let online = service.start().await;
    let report = StatusReport::collect(&service).await;
    service.shutdown().await;

    match args.format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if online {
        Ok(())
    } else {
        Err(BinError::connection(format!(
            "controller at {} is unreachable",
            report.endpoint
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================
