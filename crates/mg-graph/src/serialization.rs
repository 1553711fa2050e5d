//! Snapshot export for serializers.
//!
//! A snapshot walks a node's effective property list and inlines nested
//! models and collection items. A node already on the current path is written
//! as `{"$ref": "<id>"}` so cyclic graphs stay finite. Handles to destroyed
//! entities are written as `null`. Nesting deeper than
//! [`GraphConfig::max_snapshot_depth`](mg_core::GraphConfig::max_snapshot_depth)
//! fails with [`GraphError::SnapshotTooDeep`].

use serde::ser::{Serialize, SerializeMap, Serializer};

use mg_core::{FxHashSet, NodeId, Value};

use crate::error::GraphError;
use crate::graph::ModelGraph;

/// A serializable view of one node and everything it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    /// The node's handle.
    pub id: NodeId,
    /// The node's model type name.
    pub type_name: String,
    /// Property values, base-type properties first.
    pub properties: Vec<(String, SnapshotValue)>,
}

impl Serialize for NodeSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.properties.len() + 2))?;
        map.serialize_entry("$id", &self.id.to_string())?;
        map.serialize_entry("$type", &self.type_name)?;
        for (name, value) in &self.properties {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A property value inside a [`NodeSnapshot`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    /// No value, or a handle to a destroyed entity.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// Text.
    Text(String),
    /// An inlined child model.
    Node(Box<NodeSnapshot>),
    /// Collection items, in order.
    Collection(Vec<SnapshotValue>),
    /// A node already being written further up the path.
    Ref {
        /// The referenced node's handle.
        #[serde(rename = "$ref")]
        target: String,
    },
}

impl ModelGraph {
    /// Builds a snapshot of `node` and everything reachable through its
    /// properties.
    ///
    /// Reads do not store defaults, so an untouched collection-creating
    /// property appears as `null`.
    ///
    /// # Errors
    ///
    /// [`GraphError::SnapshotTooDeep`] if inlined models nest deeper than the
    /// graph's `max_snapshot_depth`.
    pub fn snapshot(&self, node: NodeId) -> Result<NodeSnapshot, GraphError> {
        let mut path = FxHashSet::default();
        self.snapshot_node(node, &mut path)
    }

    fn snapshot_node(&self, node: NodeId, path: &mut FxHashSet<NodeId>) -> Result<NodeSnapshot, GraphError> {
        let schema = self.registry().schema(self.node(node)?.ty)?;
        let limit = self.config().max_snapshot_depth;
        if path.len() >= limit {
            return Err(GraphError::SnapshotTooDeep { node, limit });
        }
        path.insert(node);
        let mut properties = Vec::with_capacity(schema.properties().len());
        for definition in schema.properties() {
            let value = self.peek(node, definition)?;
            properties.push((definition.name().to_owned(), self.snapshot_value(&value, path)?));
        }
        path.remove(&node);
        Ok(NodeSnapshot {
            id: node,
            type_name: schema.name().to_owned(),
            properties,
        })
    }

    fn snapshot_value(&self, value: &Value, path: &mut FxHashSet<NodeId>) -> Result<SnapshotValue, GraphError> {
        Ok(match value {
            Value::Null => SnapshotValue::Null,
            Value::Bool(b) => SnapshotValue::Bool(*b),
            Value::Int(i) => SnapshotValue::Int(*i),
            Value::Float(f) => SnapshotValue::Float(*f),
            Value::Text(s) => SnapshotValue::Text(s.clone()),
            Value::Model(child) => self.snapshot_child(*child, path)?,
            Value::Collection(collection) => match self.collection_items(*collection) {
                Ok(items) => SnapshotValue::Collection(
                    items
                        .iter()
                        .map(|&item| self.snapshot_child(item, path))
                        .collect::<Result<_, _>>()?,
                ),
                Err(_) => SnapshotValue::Null,
            },
        })
    }

    fn snapshot_child(&self, child: NodeId, path: &mut FxHashSet<NodeId>) -> Result<SnapshotValue, GraphError> {
        if path.contains(&child) {
            return Ok(SnapshotValue::Ref {
                target: child.to_string(),
            });
        }
        if !self.contains(child) {
            return Ok(SnapshotValue::Null);
        }
        Ok(SnapshotValue::Node(Box::new(self.snapshot_node(child, path)?)))
    }
}
