// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Generic discovery of records below a PLC node.
//!
//! # Layout detection
//!
//! ```text
//! Root
//! ├── IndexMax = N        indexed: children matching `[k]`, first N+1
//! ├── Alarm[0]  ── ID, Value, Message, Category, DateTime[0..6], ...
//! ├── Alarm[1]
//! └── ...
//!
//! Root                    flat: every non-metadata child is a record,
//! ├── Count               or the root itself when it has no children
//! └── AccCount
//! ```
//!
//! Population is best effort. A field that fails to read or has the wrong
//! type keeps its default; the record is still emitted.

use crate::browse::{is_metadata, NodeBrowser, NodeDescriptor};
use crate::reader::{AttributeReader, INDEX_PATTERN};
use crate::records::{FieldKind, FieldValue, Record};

/// Populates [`Record`]s from the address space.
#[derive(Debug, Clone)]
pub struct ObjectMapper {
    browser: NodeBrowser,
    reader: AttributeReader,
}

impl ObjectMapper {
    /// Creates a mapper from a browser and a reader on the same session.
    pub fn new(browser: NodeBrowser, reader: AttributeReader) -> Self {
        Self { browser, reader }
    }

    /// Discovers and populates every record below `root`, in browse order.
    pub async fn populate<R: Record>(&self, root: Option<&NodeDescriptor>) -> Vec<R> {
        let Some(root) = root else {
            return Vec::new();
        };

        let data_nodes = self.data_nodes(root).await;
        let mut records = Vec::with_capacity(data_nodes.len());

        for node in &data_nodes {
            records.push(self.populate_one::<R>(node).await);
        }

        tracing::debug!(
            record = R::NAME,
            root = %root.node_id,
            count = records.len(),
            "Records populated"
        );
        records
    }

    async fn data_nodes(&self, root: &NodeDescriptor) -> Vec<NodeDescriptor> {
        let children = self.browser.children(&root.node_id).await;

        if let Some(index_max) = self.index_max(&children).await {
            return children
                .into_iter()
                .filter(|c| INDEX_PATTERN.is_match(&c.display_name))
                .take(index_max.saturating_add(1))
                .collect();
        }

        let flat: Vec<NodeDescriptor> = children.into_iter().filter(|c| !is_metadata(c)).collect();
        if flat.is_empty() {
            vec![root.clone()]
        } else {
            flat
        }
    }

    /// `IndexMax` as a non-negative count, when present and readable.
    async fn index_max(&self, children: &[NodeDescriptor]) -> Option<usize> {
        let node = children
            .iter()
            .find(|c| c.display_name.eq_ignore_ascii_case("IndexMax"))?;
        let value = self.reader.read_value(&node.node_id).await?;
        let n = value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))?;
        usize::try_from(n).ok()
    }

    async fn populate_one<R: Record>(&self, node: &NodeDescriptor) -> R {
        let mut record = R::default();

        for property in self.browser.children(&node.node_id).await {
            let Some(field) = R::field(&property.display_name) else {
                continue;
            };

            let value = match field.kind {
                FieldKind::Value => match self.reader.read_value(&property.node_id).await {
                    Some(v) => FieldValue::Value(v),
                    None => continue,
                },
                FieldKind::Timestamps => {
                    FieldValue::Timestamps(self.reader.read_timestamp_parts(&property.node_id).await)
                }
            };

            if let Err(e) = record.assign(field.name, value) {
                tracing::debug!(
                    record = R::NAME,
                    node = %node.display_name,
                    field = field.name,
                    error = %e,
                    "Field skipped"
                );
            }
        }

        record
    }
}
