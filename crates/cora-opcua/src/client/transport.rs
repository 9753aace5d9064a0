// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport abstraction for OPC UA sessions.
//!
//! The engine never talks to the wire directly. It opens sessions through an
//! [`OpcUaTransport`] and issues reads, browses and subscription calls on the
//! returned [`OpcUaSession`]. Health signals from the protocol stack arrive as
//! [`SessionEvent`]s and data changes as [`DataChangeNotification`]s, both on
//! unbounded mpsc channels so that stack callbacks never block.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::OpcUaResult;
use crate::types::{MonitoredItemSettings, NodeClass, NodeId, OpcUaConfig, SubscriptionSettings};

/// Sink for session health events.
pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;

/// Sink for data change notifications.
pub type NotificationSender = mpsc::UnboundedSender<DataChangeNotification>;

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// `Good`.
    pub const GOOD: StatusCode = StatusCode(0);
    /// `Bad`.
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// `BadTimeout`.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// `BadConnectionClosed`.
    pub const BAD_CONNECTION_CLOSED: StatusCode = StatusCode(0x80AE_0000);

    /// Returns `true` if the severity bits are good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the status is uncertain.
    #[inline]
    pub fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` if the status is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (0x{:08X})",
            crate::error::OperationError::status_code_name(self.0),
            self.0
        )
    }
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// Decoded value of a Value attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// String value.
    String(String),
    /// Date/time value.
    DateTime(DateTime<Utc>),
    /// GUID value.
    Guid(uuid::Uuid),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Array of values.
    Array(Vec<OpcUaValue>),
    /// Null value.
    #[default]
    Null,
}

impl OpcUaValue {
    /// Variant name, used in mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::Guid(_) => "Guid",
            Self::ByteString(_) => "ByteString",
            Self::Array(_) => "Array",
            Self::Null => "Null",
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer variants that fit in `i32` without loss.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::SByte(v) => Some(i32::from(*v)),
            Self::Byte(v) => Some(i32::from(*v)),
            Self::Int16(v) => Some(i32::from(*v)),
            Self::UInt16(v) => Some(i32::from(*v)),
            Self::Int32(v) => Some(*v),
            Self::UInt32(v) => i32::try_from(*v).ok(),
            Self::Int64(v) => i32::try_from(*v).ok(),
            Self::UInt64(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Single precision float only.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String only.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Array elements, if this is an array.
    pub fn as_array(&self) -> Option<&[OpcUaValue]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value, absent when the server returned none.
    pub value: Option<OpcUaValue>,
    /// Status of the value.
    pub status: StatusCode,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// A good value without timestamps.
    pub fn good(value: OpcUaValue) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// A value-less result with the given status.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(ts);
        self
    }
}

// =============================================================================
// BrowseResult
// =============================================================================

/// One forward hierarchical reference returned by a browse.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseResult {
    /// Target node.
    pub node_id: NodeId,
    /// Browse name.
    pub browse_name: String,
    /// Display name.
    pub display_name: String,
    /// Node class of the target.
    pub node_class: NodeClass,
}

// =============================================================================
// Session events and notifications
// =============================================================================

/// Health signal raised by the protocol stack for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Keep-alive completed with `status`.
    KeepAlive {
        /// Session the signal belongs to.
        session_id: u64,
        /// Keep-alive status.
        status: StatusCode,
    },
    /// The stack is closing the session.
    Closing {
        /// Session the signal belongs to.
        session_id: u64,
    },
}

impl SessionEvent {
    /// Session the event belongs to.
    pub fn session_id(&self) -> u64 {
        match self {
            Self::KeepAlive { session_id, .. } | Self::Closing { session_id } => *session_id,
        }
    }
}

/// A value change for one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeNotification {
    /// Subscription that produced the change.
    pub subscription_id: u32,
    /// Client handle assigned when the item was created.
    pub client_handle: u32,
    /// The new value.
    pub value: DataValue,
}

/// Parameters for a single monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemRequest {
    /// Monitored node.
    pub node_id: NodeId,
    /// Display name used in logs.
    pub display_name: String,
    /// Handle echoed back in notifications.
    pub client_handle: u32,
    /// Sampling, queue and discard settings.
    pub settings: MonitoredItemSettings,
}

// =============================================================================
// Traits
// =============================================================================

/// An open session with an OPC UA server.
///
/// All calls are attempted against the live session. Implementations report
/// failures as errors; callers decide whether to swallow them.
#[async_trait]
pub trait OpcUaSession: Send + Sync {
    /// Process-unique id of this session.
    fn session_id(&self) -> u64;

    /// Returns `true` while the underlying channel is usable.
    fn is_connected(&self) -> bool;

    /// Closes the session. Closing twice is a no-op.
    async fn close(&self) -> OpcUaResult<()>;

    /// Reads the Value attribute of one node.
    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<DataValue>;

    /// Browses forward hierarchical references of `node_id`, filtered by
    /// `node_class_mask`.
    async fn browse(&self, node_id: &NodeId, node_class_mask: u32) -> OpcUaResult<Vec<BrowseResult>>;

    /// Creates a subscription delivering notifications to `sink`.
    async fn create_subscription(
        &self,
        settings: &SubscriptionSettings,
        sink: NotificationSender,
    ) -> OpcUaResult<u32>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;

    /// Adds a monitored item to a subscription and returns its server id.
    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        request: &MonitoredItemRequest,
    ) -> OpcUaResult<u32>;

    /// Flushes pending subscription modifications to the server.
    async fn apply_changes(&self, _subscription_id: u32) -> OpcUaResult<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn OpcUaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcUaSession")
            .field("session_id", &self.session_id())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Factory for sessions.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    /// Opens a new session using `config`. Health events for the session are
    /// sent to `events`.
    async fn open_session(
        &self,
        config: &OpcUaConfig,
        events: SessionEventSender,
    ) -> OpcUaResult<Arc<dyn OpcUaSession>>;

    /// Transport name for logging.
    fn display_name(&self) -> String;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::BAD_TIMEOUT.is_bad());
        assert!(!StatusCode::BAD_TIMEOUT.is_good());
        assert!(StatusCode(0x4000_0000).is_uncertain());
        assert!(StatusCode::BAD_CONNECTION_CLOSED
            .to_string()
            .contains("BadConnectionClosed"));
    }

    #[test]
    fn test_as_i32_lossless() {
        assert_eq!(OpcUaValue::Int16(-3).as_i32(), Some(-3));
        assert_eq!(OpcUaValue::UInt32(7).as_i32(), Some(7));
        assert_eq!(OpcUaValue::UInt32(u32::MAX).as_i32(), None);
        assert_eq!(OpcUaValue::Int64(1 << 40).as_i32(), None);
        assert_eq!(OpcUaValue::Double(1.0).as_i32(), None);
        assert_eq!(OpcUaValue::Boolean(true).as_i32(), None);
    }

    #[test]
    fn test_as_f32_and_str_are_strict() {
        assert_eq!(OpcUaValue::Float(2.5).as_f32(), Some(2.5));
        assert_eq!(OpcUaValue::Double(2.5).as_f32(), None);
        assert_eq!(OpcUaValue::Int32(2).as_f32(), None);
        assert_eq!(OpcUaValue::String("HSK63".into()).as_str(), Some("HSK63"));
        assert_eq!(OpcUaValue::Int32(2).as_str(), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(OpcUaValue::Int32(42).to_string(), "42");
        assert_eq!(OpcUaValue::Array(vec![OpcUaValue::Null]).to_string(), "[1 items]");
        assert_eq!(OpcUaValue::default().to_string(), "null");
    }

    #[test]
    fn test_session_event_id() {
        let e = SessionEvent::KeepAlive {
            session_id: 4,
            status: StatusCode::GOOD,
        };
        assert_eq!(e.session_id(), 4);
        assert_eq!(SessionEvent::Closing { session_id: 9 }.session_id(), 9);
    }
}
