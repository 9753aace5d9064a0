// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for Cora.
//!
//! # Schema Structure
//!
//! ```text
//! CoraConfig
//! ├── connection: OpcUaConfig       endpoint, timeouts, quotas, trust
//! ├── nodes: NodeLayout             PackTag Admin / Status roots
//! ├── monitoring: MonitoringConfig  sampling, queueing, time zone
//! ├── reconnect: ReconnectConfig    auto and manual reconnect timing
//! └── logging: LoggingConfig
//! ```
//!
//! The engine sections are the engine's own types, so a file maps onto
//! [`ServiceConfig`] without translation.

use std::fmt;
use std::str::FromStr;

use cora_opcua::{MonitoringConfig, NodeLayout, OpcUaConfig, ReconnectConfig, ServiceConfig};
use serde::{Deserialize, Serialize};

use crate::error::{in_section, ConfigError, ConfigResult};

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoraConfig {
    /// OPC UA client settings. The endpoint may come from the environment.
    #[serde(default)]
    pub connection: OpcUaConfig,

    /// PackTag node layout.
    #[serde(default)]
    pub nodes: NodeLayout,

    /// Monitoring defaults.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Reconnect timing.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CoraConfig {
    /// Defaults with the given endpoint.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            connection: OpcUaConfig::new(endpoint),
            ..Self::default()
        }
    }

    /// Validates every section.
    pub fn validate(&self) -> ConfigResult<()> {
        in_section("connection", self.connection.validate())?;
        in_section("nodes", self.nodes.validate())?;

        for (field, value) in [
            ("reconnect.auto_interval", self.reconnect.auto_interval),
            ("reconnect.manual_timeout", self.reconnect.manual_timeout),
            ("monitoring.default_sampling", self.monitoring.default_sampling),
            ("monitoring.ingredient_sampling", self.monitoring.ingredient_sampling),
        ] {
            if value.is_zero() {
                return Err(ConfigError::validation(field, "must be greater than 0"));
            }
        }

        if self.monitoring.item.queue_size == 0 {
            return Err(ConfigError::validation("monitoring.item.queue_size", "must be at least 1"));
        }

        Ok(())
    }

    /// The engine's view of this configuration.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            connection: self.connection.clone(),
            nodes: self.nodes.clone(),
            reconnect: self.reconnect.clone(),
            monitoring: self.monitoring.clone(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::validation(
                "logging.level",
                format!("unknown level '{}'", other),
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one event per line.
    #[default]
    Text,
    /// Text without span context.
    Compact,
    /// JSON objects for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::validation(
                "logging.format",
                format!("unknown format '{}'", other),
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
