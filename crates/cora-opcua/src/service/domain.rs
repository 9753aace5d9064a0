// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! PackML vocabulary and summaries built from records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::records::PalletInfo;

// =============================================================================
// MachineState
// =============================================================================

/// PackML machine state as reported by `Status.StateCurrent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// State 0.
    Stopped,
    /// State 1.
    Resetting,
    /// State 2.
    Idle,
    /// State 3.
    Starting,
    /// State 4.
    Executing,
    /// State 5.
    Holding,
    /// State 6.
    Held,
    /// State 7.
    Unholding,
    /// State 8.
    Suspending,
    /// State 9.
    Suspended,
    /// State 10.
    Unsuspending,
    /// State 11.
    Completing,
    /// State 12.
    Completed,
    /// State 13.
    Stopping,
    /// State 14.
    Aborting,
    /// State 15.
    Aborted,
    /// State 16.
    Clearing,
    /// Any value outside 0..=16, including the offline sentinel -1.
    Unknown,
}

impl MachineState {
    /// Maps the PLC state number.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Stopped,
            1 => Self::Resetting,
            2 => Self::Idle,
            3 => Self::Starting,
            4 => Self::Executing,
            5 => Self::Holding,
            6 => Self::Held,
            7 => Self::Unholding,
            8 => Self::Suspending,
            9 => Self::Suspended,
            10 => Self::Unsuspending,
            11 => Self::Completing,
            12 => Self::Completed,
            13 => Self::Stopping,
            14 => Self::Aborting,
            15 => Self::Aborted,
            16 => Self::Clearing,
            _ => Self::Unknown,
        }
    }

    /// Operator-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Resetting => "Resetting",
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Executing => "Executing",
            Self::Holding => "Holding",
            Self::Held => "Hold",
            Self::Unholding => "UnHolding",
            Self::Suspending => "Suspending",
            Self::Suspended => "Suspended",
            Self::Unsuspending => "UnSuspending",
            Self::Completing => "Completing",
            Self::Completed => "Completed",
            Self::Stopping => "Stopping",
            Self::Aborting => "Aborting",
            Self::Aborted => "Aborted",
            Self::Clearing => "Clearing",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// UnitMode
// =============================================================================

/// PackML unit mode as reported by `Status.UnitModeCurrent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitMode {
    /// Mode 0.
    Automatic,
    /// Mode 1.
    SemiAutomatic,
    /// Mode 2.
    ServiceManual,
    /// Any other value.
    Unknown,
}

impl UnitMode {
    /// Maps the PLC mode number.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Automatic,
            1 => Self::SemiAutomatic,
            2 => Self::ServiceManual,
            _ => Self::Unknown,
        }
    }

    /// Operator-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Automatic => "Automatic Mode",
            Self::SemiAutomatic => "Semi-Automatic Mode",
            Self::ServiceManual => "Service/Manual Mode",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for UnitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Pallets
// =============================================================================

/// Adapter name for a pallet parameter value.
pub fn pallet_adapter_name(value: f32) -> &'static str {
    const NAMES: [&str; 15] = [
        "No Pallet", "HSK63", "Capto_C6", "HSK40", "Spare01", "HSK125", "Capto_C4", "HSK63",
        "Spare02", "SK30", "Capto_C5", "HSK100", "Capto_C8", "HSK50", "SK50",
    ];

    if value.fract() != 0.0 || value < 0.0 {
        return "Unknown";
    }
    NAMES.get(value as usize).copied().unwrap_or("Unknown")
}

/// The pallet currently on the machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PalletSummary {
    /// Parameter name.
    pub name: String,
    /// Engineering unit.
    pub unit: String,
    /// Parameter id.
    pub id: i32,
    /// Adapter code.
    pub value: f32,
}

impl Default for PalletSummary {
    fn default() -> Self {
        Self {
            name: "No pallet available".to_string(),
            unit: "0".to_string(),
            id: 0,
            value: 0.0,
        }
    }
}

impl PalletSummary {
    /// Summary of the last parameter, or the default when it carries no
    /// pallet (`value < 1`).
    pub fn from_parameters(parameters: &[PalletInfo]) -> Self {
        match parameters.last() {
            Some(p) if p.value >= 1.0 => Self {
                name: p.name.clone(),
                unit: p.unit.clone(),
                id: p.id,
                value: p.value,
            },
            _ => Self::default(),
        }
    }

    /// Adapter name for this pallet's value.
    pub fn adapter_name(&self) -> &'static str {
        pallet_adapter_name(self.value)
    }
}

// =============================================================================
// MachineSnapshot
// =============================================================================

/// State, mode and time spent in the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSnapshot {
    /// Raw state number, -1 when unavailable.
    pub state_code: i32,
    /// Decoded state.
    pub state: MachineState,
    /// Raw unit mode number, -1 when unavailable.
    pub unit_mode_code: i32,
    /// Decoded unit mode.
    pub unit_mode: UnitMode,
    /// Seconds in the current state, -1 when unavailable.
    pub state_seconds: i32,
    /// `state_seconds` as `hh:mm:ss`.
    pub elapsed: String,
}
