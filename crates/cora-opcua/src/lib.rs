// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client engine for CoraMeasure PackML machines.
//!
//! This crate keeps one auto-reconnecting session to a CODESYS controller,
//! discovers records in its PackTag tree and pushes live values to
//! callbacks that survive reconnects.
//!
//! # Layers
//!
//! - [`reader`]: single attribute reads and PLC date/time decoding
//! - [`browse`]: child enumeration and lookup by display name
//! - [`mapper`]: generic population of [`records`] below a node
//! - [`client`]: connection lifecycle, subscriptions and the session seam
//! - [`service`]: [`MachineService`], the object applications use
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint and channel issues
//! ├── Session       - Session lifecycle and keep-alive
//! ├── Browse        - Node browsing failures
//! ├── Operation     - Read failures and bad status codes
//! ├── Subscription  - Subscription and monitored item errors
//! ├── Conversion    - Value and timestamp conversion
//! ├── Configuration - Invalid settings
//! └── Timeout       - Bounded calls that ran out of time
//! ```
//!
//! Errors stay inside the engine in degraded operation. Queries return
//! empty or default values, monitors are queued and replayed.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cora_opcua::{MachineService, RealOpcUaTransport, ServiceConfig};
//!
//! let config = ServiceConfig::new("opc.tcp://10.0.39.14:4840");
//! let service = MachineService::new(Arc::new(RealOpcUaTransport::new()), config)?;
//! service.start().await;
//!
//! service.monitor_status_value("StateCurrent", |state| println!("state {state}")).await;
//! for alarm in service.load_alarms().await {
//!     println!("{}: {}", alarm.id, alarm.message);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod browse;
pub mod client;
pub mod error;
pub mod mapper;
pub mod reader;
pub mod records;
pub mod service;
pub mod timestamp;
pub mod types;

pub use error::{
    BrowseError, ConfigurationError, ConnectionError, ConversionError, ErrorCode, ErrorSeverity,
    OpcUaError, OpcUaResult, OperationError, SessionError, SubscriptionError, TimeoutError,
};

pub use types::{
    MonitoredItemSettings, NodeClass, NodeId, NodeIdentifier, OpcUaConfig, OpcUaConfigBuilder,
    SubscriptionSettings, TransportQuotas, TrustPolicy,
};

pub use client::{
    ChangeReason, ConnectionChange, ConnectionManager, ConnectionState, DataValue,
    MonitoredPointSpec, OpcUaSession, OpcUaTransport, OpcUaValue, SessionInfo, StatusCode,
    SubscriptionManager, SubscriptionState,
};

#[cfg(feature = "real-transport")]
pub use client::RealOpcUaTransport;

pub use browse::{BrowseStatistics, NodeBrowser, NodeDescriptor};
pub use mapper::ObjectMapper;
pub use reader::AttributeReader;
pub use records::{
    Alarm, AlarmHistory, PalletInfo, PlcDateTime, ProdConsumed, ProdDefectCount, ProdProcessed,
    Record, StopReason,
};
pub use service::{
    MachineService, MachineSnapshot, MachineState, MonitoringConfig, NodeLayout, PalletSummary,
    ReconnectConfig, ServiceConfig, UnitMode,
};
pub use timestamp::{LocalTimestamp, TimeZonePolicy};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
