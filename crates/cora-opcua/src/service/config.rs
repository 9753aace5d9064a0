// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Settings of the machine service.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};
use crate::timestamp::TimeZonePolicy;
use crate::types::{humantime_serde, MonitoredItemSettings, NodeId, OpcUaConfig};

const PACKTAG_ROOT: &str = "ns=4;s=|var|CODESYS Control Win V3 x64.Application.PackTag.CoraMeasure";

// =============================================================================
// NodeLayout
// =============================================================================

/// Where the PackTag subtrees live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLayout {
    /// Admin subtree (alarms, counters, clock, elapsed times).
    #[serde(default = "default_admin_root")]
    pub admin_root: String,

    /// Status subtree (state, unit mode, products, parameters).
    #[serde(default = "default_status_root")]
    pub status_root: String,

    /// Number of product slots under `Status.Product`.
    #[serde(default = "default_product_slots")]
    pub product_slots: usize,
}

fn default_admin_root() -> String {
    format!("{PACKTAG_ROOT}.Admin")
}

fn default_status_root() -> String {
    format!("{PACKTAG_ROOT}.Status")
}

fn default_product_slots() -> usize {
    38
}

impl Default for NodeLayout {
    fn default() -> Self {
        Self {
            admin_root: default_admin_root(),
            status_root: default_status_root(),
            product_slots: default_product_slots(),
        }
    }
}

impl NodeLayout {
    /// Parsed admin root.
    pub fn admin_node(&self) -> OpcUaResult<NodeId> {
        NodeId::from_str(&self.admin_root)
    }

    /// Parsed status root.
    pub fn status_node(&self) -> OpcUaResult<NodeId> {
        NodeId::from_str(&self.status_root)
    }

    /// Checks both roots parse and at least one product slot exists.
    pub fn validate(&self) -> OpcUaResult<()> {
        self.admin_node()?;
        self.status_node()?;
        if self.product_slots == 0 {
            return Err(OpcUaError::configuration(ConfigurationError::new(
                "product_slots",
                "must be at least 1",
            )));
        }
        Ok(())
    }
}

// =============================================================================
// ReconnectConfig
// =============================================================================

/// Reconnect timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay between background attempts.
    #[serde(default = "default_auto_interval", with = "humantime_serde")]
    pub auto_interval: Duration,

    /// Upper bound of a manual reconnect.
    #[serde(default = "default_manual_timeout", with = "humantime_serde")]
    pub manual_timeout: Duration,

    /// Delay between manual attempts.
    #[serde(default = "default_manual_delay", with = "humantime_serde")]
    pub manual_delay: Duration,
}

fn default_auto_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_manual_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_manual_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            auto_interval: default_auto_interval(),
            manual_timeout: default_manual_timeout(),
            manual_delay: default_manual_delay(),
        }
    }
}

// =============================================================================
// MonitoringConfig
// =============================================================================

/// Monitoring defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Sampling of ordinary monitors.
    #[serde(default = "default_sampling", with = "humantime_serde")]
    pub default_sampling: Duration,

    /// Sampling of product ingredient monitors.
    #[serde(default = "default_ingredient_sampling", with = "humantime_serde")]
    pub ingredient_sampling: Duration,

    /// Queue and discard settings shared by every item.
    #[serde(default)]
    pub item: MonitoredItemSettings,

    /// Zone PLC timestamps are shown in.
    #[serde(default)]
    pub time_zone: TimeZonePolicy,
}

fn default_sampling() -> Duration {
    Duration::from_secs(1)
}

fn default_ingredient_sampling() -> Duration {
    Duration::from_millis(500)
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            default_sampling: default_sampling(),
            ingredient_sampling: default_ingredient_sampling(),
            item: MonitoredItemSettings::default(),
            time_zone: TimeZonePolicy::default(),
        }
    }
}

// =============================================================================
// ServiceConfig
// =============================================================================

/// Everything [`MachineService`](super::MachineService) needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Client settings.
    pub connection: OpcUaConfig,

    /// PackTag node layout.
    #[serde(default)]
    pub nodes: NodeLayout,

    /// Reconnect timing.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Monitoring defaults.
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl ServiceConfig {
    /// Service settings for `endpoint` with every default.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            connection: OpcUaConfig::new(endpoint),
            nodes: NodeLayout::default(),
            reconnect: ReconnectConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }

    /// Validates the connection and node layout.
    pub fn validate(&self) -> OpcUaResult<()> {
        self.connection.validate()?;
        self.nodes.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::new("opc.tcp://10.0.39.14:4840");
        assert_eq!(config.reconnect.auto_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect.manual_timeout, Duration::from_secs(8));
        assert_eq!(config.monitoring.ingredient_sampling, Duration::from_millis(500));
        assert_eq!(config.nodes.product_slots, 38);
        assert!(config.nodes.admin_root.ends_with("CoraMeasure.Admin"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layout_validation() {
        let mut layout = NodeLayout::default();
        assert_eq!(layout.status_node().unwrap().namespace_index, 4);

        layout.product_slots = 0;
        assert!(layout.validate().is_err());

        layout.product_slots = 1;
        layout.admin_root = "ns=x;s=Admin".into();
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{
            "connection": { "endpoint": "opc.tcp://plc:4840" },
            "reconnect": { "auto_interval": "10s" }
        }"#;
        let config: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.reconnect.auto_interval, Duration::from_secs(10));
        assert_eq!(config.reconnect.manual_delay, Duration::from_secs(1));
        assert_eq!(config.nodes, NodeLayout::default());
    }
}
