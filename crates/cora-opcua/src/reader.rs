// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Attribute reads.
//!
//! Every read goes to the live session and is bounded by the request
//! timeout. Failures of any kind (transport, bad status, undecodable value)
//! come back as `None` or an empty vec and are logged at debug level.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::browse::NodeBrowser;
use crate::client::transport::{DataValue, OpcUaSession, OpcUaValue};
use crate::error::{OpcUaError, OperationError};
use crate::timestamp::{local_from_parts, LocalTimestamp, TimeZonePolicy, TIMESTAMP_PARTS};
use crate::types::NodeId;

/// Matches an array index such as `[3]` in a display name.
pub(crate) static INDEX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("index pattern is a valid regex"));

/// First `[k]` index in a display name.
pub(crate) fn index_of(display_name: &str) -> Option<usize> {
    INDEX_PATTERN
        .captures(display_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Reads Value attributes and PLC date/times on one session.
#[derive(Clone)]
pub struct AttributeReader {
    session: Arc<dyn OpcUaSession>,
    browser: NodeBrowser,
    request_timeout: Duration,
    time_zone: TimeZonePolicy,
}

impl AttributeReader {
    /// Creates a reader bound to `session`.
    pub fn new(
        session: Arc<dyn OpcUaSession>,
        browser: NodeBrowser,
        request_timeout: Duration,
        time_zone: TimeZonePolicy,
    ) -> Self {
        Self {
            session,
            browser,
            request_timeout,
            time_zone,
        }
    }

    /// The browser used for timestamp part discovery.
    pub fn browser(&self) -> &NodeBrowser {
        &self.browser
    }

    /// Zone timestamps are converted into.
    pub fn time_zone(&self) -> TimeZonePolicy {
        self.time_zone
    }

    /// Reads the full data value of one node.
    pub async fn read_data_value(&self, node_id: &NodeId) -> Option<DataValue> {
        match self.try_read(node_id).await {
            Ok(dv) => Some(dv),
            Err(e) => {
                tracing::debug!(node_id = %node_id, error = %e, "Read failed");
                None
            }
        }
    }

    async fn try_read(&self, node_id: &NodeId) -> Result<DataValue, OpcUaError> {
        if !self.session.is_connected() {
            return Err(OpcUaError::not_connected());
        }

        let dv = tokio::time::timeout(self.request_timeout, self.session.read_value(node_id))
            .await
            .map_err(|_| OpcUaError::operation_timeout("read", self.request_timeout))??;

        if dv.status.is_bad() {
            return Err(OpcUaError::operation(OperationError::bad_status(
                node_id.to_string(),
                dv.status.0,
            )));
        }
        Ok(dv)
    }

    /// Reads one Value attribute. Null values count as absent.
    pub async fn read_value(&self, node_id: &NodeId) -> Option<OpcUaValue> {
        self.read_data_value(node_id)
            .await
            .and_then(|dv| dv.value)
            .filter(|v| !v.is_null())
    }

    /// Reads one Value attribute as a lossless `i32`.
    pub async fn read_i32(&self, node_id: &NodeId) -> Option<i32> {
        let value = self.read_value(node_id).await?;
        let n = value.as_i32();
        if n.is_none() {
            tracing::debug!(node_id = %node_id, actual = value.type_name(), "Value is not an Int32");
        }
        n
    }

    /// Reads a date/time exposed as indexed integer children `[0]..[6]`.
    ///
    /// Returns zero or one timestamp. Children without an index or with an
    /// index of 7 or more are ignored; missing parts stay zero, which makes
    /// the date invalid and the result empty.
    pub async fn read_timestamp_parts(&self, node_id: &NodeId) -> Vec<LocalTimestamp> {
        let mut parts = [0i32; TIMESTAMP_PARTS];

        for child in self.browser.children(node_id).await {
            let Some(idx) = index_of(&child.display_name).filter(|i| *i < TIMESTAMP_PARTS) else {
                continue;
            };
            if let Some(v) = self.read_value(&child.node_id).await.and_then(|v| integer_part(&v)) {
                parts[idx] = v;
            }
        }

        match local_from_parts(&parts, self.time_zone) {
            Ok(ts) => vec![ts],
            Err(e) => {
                tracing::debug!(node_id = %node_id, error = %e, "Timestamp parts did not convert");
                Vec::new()
            }
        }
    }

    /// Reads a date/time exposed as a single integer array of at least
    /// seven elements.
    pub async fn read_timestamp_array(&self, node_id: &NodeId) -> Option<LocalTimestamp> {
        let value = self.read_value(node_id).await?;
        let Some(items) = value.as_array() else {
            tracing::debug!(node_id = %node_id, actual = value.type_name(), "Timestamp is not an array");
            return None;
        };

        if items.len() < TIMESTAMP_PARTS {
            tracing::debug!(node_id = %node_id, len = items.len(), "Timestamp array too short");
            return None;
        }

        let mut parts = [0i32; TIMESTAMP_PARTS];
        for (slot, item) in parts.iter_mut().zip(items) {
            *slot = integer_part(item)?;
        }

        local_from_parts(&parts, self.time_zone)
            .map_err(|e| tracing::debug!(node_id = %node_id, error = %e, "Timestamp array did not convert"))
            .ok()
    }
}

/// Integers and numeric strings both occur in PLC timestamp parts.
fn integer_part(value: &OpcUaValue) -> Option<i32> {
    value
        .as_i32()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

impl fmt::Debug for AttributeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeReader")
            .field("session_id", &self.session.session_id())
            .field("time_zone", &self.time_zone)
            .finish()
    }
}
