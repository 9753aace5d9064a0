// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `query` command.

use std::sync::Arc;

use cora_opcua::MachineService;
use serde_json::Value;

use crate::cli::{QueryArgs, QueryKind};
use crate::error::BinResult;
use crate::runtime::connect;

/// Executes the `query` command: connect, read once, print JSON.
pub async fn query(service: Arc<MachineService>, args: QueryArgs) -> BinResult<()> {
    connect(&service).await?;
    let result = records(&service, args.kind).await;
    service.shutdown().await;

    let value = result?;
    let output = if args.compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    println!("{}", output);
    Ok(())
}

/// Reads one record family as a JSON array.
pub async fn records(service: &MachineService, kind: QueryKind) -> BinResult<Value> {
    let value = match kind {
        QueryKind::Alarms => serde_json::to_value(service.load_alarms().await)?,
        QueryKind::AlarmHistory => serde_json::to_value(service.load_alarm_history().await)?,
        QueryKind::Processed => serde_json::to_value(service.load_prod_processed().await)?,
        QueryKind::Consumed => serde_json::to_value(service.load_prod_consumed().await)?,
        QueryKind::Defects => serde_json::to_value(service.load_prod_defects().await)?,
        QueryKind::Pallet => serde_json::to_value(service.load_pallet_info().await)?,
        QueryKind::StopReason => serde_json::to_value(service.load_stop_reason().await)?,
        QueryKind::PlcTime => serde_json::to_value(service.load_plc_date_time().await)?,
    };
    Ok(value)
}
