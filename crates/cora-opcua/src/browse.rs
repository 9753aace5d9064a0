// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node browsing.
//!
//! [`NodeBrowser`] enumerates the forward hierarchical children of a node
//! (objects and variables only) and looks children up by display name. It
//! fails soft: a missing or broken session yields an empty result and a
//! warning, never an error.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::transport::{BrowseResult, OpcUaSession};
use crate::error::{BrowseError, OpcUaError};
use crate::types::{NodeClass, NodeId};

/// Display names of array bookkeeping nodes.
pub const METADATA_NAMES: [&str; 3] = ["IndexMax", "IndexMin", "Dimensions"];

// =============================================================================
// NodeDescriptor
// =============================================================================

/// A browsed child node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    /// Node id.
    pub node_id: NodeId,
    /// Browse name.
    pub browse_name: String,
    /// Display name.
    pub display_name: String,
    /// Node class.
    pub node_class: NodeClass,
}

impl NodeDescriptor {
    /// Creates a descriptor whose browse and display names are equal.
    pub fn new(node_id: NodeId, name: impl Into<String>, node_class: NodeClass) -> Self {
        let name = name.into();
        Self {
            node_id,
            browse_name: name.clone(),
            display_name: name,
            node_class,
        }
    }
}

impl From<BrowseResult> for NodeDescriptor {
    fn from(r: BrowseResult) -> Self {
        Self {
            node_id: r.node_id,
            browse_name: r.browse_name,
            display_name: r.display_name,
            node_class: r.node_class,
        }
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.node_id)
    }
}

/// Returns `true` for `IndexMax`, `IndexMin` and `Dimensions`.
pub fn is_metadata_name(name: &str) -> bool {
    METADATA_NAMES.iter().any(|m| m.eq_ignore_ascii_case(name))
}

/// Returns `true` if the descriptor is an array bookkeeping node.
pub fn is_metadata(descriptor: &NodeDescriptor) -> bool {
    is_metadata_name(&descriptor.display_name)
}

// =============================================================================
// BrowseStatistics
// =============================================================================

/// Counters for browse operations.
#[derive(Debug, Default)]
pub struct BrowseStatistics {
    /// Browse calls issued.
    pub browse_count: AtomicU64,
    /// References returned.
    pub nodes_discovered: AtomicU64,
    /// Failed or skipped browses.
    pub errors: AtomicU64,
}

impl BrowseStatistics {
    /// Creates new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful browse.
    pub fn record_browse(&self, node_count: usize) {
        self.browse_count.fetch_add(1, Ordering::Relaxed);
        self.nodes_discovered
            .fetch_add(node_count as u64, Ordering::Relaxed);
    }

    /// Records an error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets all counters.
    pub fn reset(&self) {
        self.browse_count.store(0, Ordering::Relaxed);
        self.nodes_discovered.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// NodeBrowser
// =============================================================================

/// Browses children of nodes on one session.
#[derive(Clone)]
pub struct NodeBrowser {
    session: Arc<dyn OpcUaSession>,
    request_timeout: Duration,
    stats: Arc<BrowseStatistics>,
}

impl NodeBrowser {
    /// Creates a browser bound to `session`.
    pub fn new(session: Arc<dyn OpcUaSession>, request_timeout: Duration) -> Self {
        Self {
            session,
            request_timeout,
            stats: Arc::new(BrowseStatistics::new()),
        }
    }

    /// Shares an existing statistics block.
    pub fn with_stats(mut self, stats: Arc<BrowseStatistics>) -> Self {
        self.stats = stats;
        self
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &BrowseStatistics {
        &self.stats
    }

    /// Direct object and variable children of `node_id`, in server order.
    pub async fn children(&self, node_id: &NodeId) -> Vec<NodeDescriptor> {
        match self.try_children(node_id).await {
            Ok(children) => {
                self.stats.record_browse(children.len());
                children
            }
            Err(e) => {
                self.stats.record_error();
                tracing::warn!(node_id = %node_id, error = %e, "Browse failed");
                Vec::new()
            }
        }
    }

    async fn try_children(&self, node_id: &NodeId) -> Result<Vec<NodeDescriptor>, OpcUaError> {
        if !self.session.is_connected() {
            return Err(OpcUaError::not_connected());
        }

        let call = self.session.browse(node_id, NodeClass::OBJECT_OR_VARIABLE);
        let results = tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| OpcUaError::operation_timeout("browse", self.request_timeout))?
            .map_err(|e| {
                OpcUaError::browse(BrowseError::browse_failed(node_id.to_string(), e.to_string()))
            })?;

        Ok(results.into_iter().map(NodeDescriptor::from).collect())
    }

    /// First child whose display name equals `name`, ignoring case.
    pub async fn find_child_by_name(&self, node_id: &NodeId, name: &str) -> Option<NodeDescriptor> {
        let found = self
            .children(node_id)
            .await
            .into_iter()
            .find(|c| c.display_name.eq_ignore_ascii_case(name));

        if found.is_none() {
            tracing::debug!(parent = %node_id, name, "Child node not found");
        }
        found
    }
}

impl fmt::Debug for NodeBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBrowser")
            .field("session_id", &self.session.session_id())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
