// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client plumbing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MachineService                             │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                                 │
//!                 ▼                                 ▼
//! ┌───────────────────────────────┐  ┌──────────────────────────────┐
//! │      ConnectionManager        │  │     SubscriptionManager      │
//! │  (gate, session, events)      │  │  (durable monitored points)  │
//! └───────────────────────────────┘  └──────────────────────────────┘
//!                 │                                 │
//!                 ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              OpcUaTransport / OpcUaSession                      │
//! │        (RealOpcUaTransport, or an in-memory double)             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod connection;
pub mod subscription;
pub mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use connection::{
    ChangeReason, ConnectionChange, ConnectionEvent, ConnectionManager, ConnectionState,
    ConnectionStats, SessionInfo,
};
pub use subscription::{
    DataCallback, MonitoredPointSpec, SubscriptionManager, SubscriptionState, SubscriptionStats,
};
pub use transport::{
    BrowseResult, DataChangeNotification, DataValue, MonitoredItemRequest, NotificationSender,
    OpcUaSession, OpcUaTransport, OpcUaValue, SessionEvent, SessionEventSender, StatusCode,
};

#[cfg(feature = "real-transport")]
pub use real_transport::RealOpcUaTransport;
