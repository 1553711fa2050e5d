//! Child subscription management.
//!
//! A node subscribes to the model held by each model-valued property and to
//! every element of each collection-valued property. A subscription is a
//! pair of links: one in the parent's `children`, one in the child's
//! `parents`. Both sides are always updated together, and the child's
//! current aggregate flags start or stop counting toward the parent in the
//! same step.

use std::sync::Arc;

use mg_core::{CollectionId, NodeId, Value};
use serde::Serialize;

use crate::collection::CollectionOwner;
use crate::graph::ModelGraph;
use crate::propagation::Pass;
use crate::registry::PropertyDefinition;

/// Where a child sits in its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Slot {
    /// Held directly by a model-valued property.
    Property {
        /// The property name.
        #[serde(serialize_with = "serialize_name")]
        name: Arc<str>,
    },
    /// An element of a collection held by a collection-valued property.
    Item {
        /// The property holding the collection.
        #[serde(serialize_with = "serialize_name")]
        property: Arc<str>,
        /// The collection.
        collection: CollectionId,
    },
}

impl Slot {
    /// The property the slot belongs to.
    #[must_use]
    pub fn property(&self) -> &str {
        match self {
            Self::Property { name } => name,
            Self::Item { property, .. } => property,
        }
    }
}

fn serialize_name<S: serde::Serializer>(name: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(name)
}

/// One end of a parent/child subscription.
///
/// In a node's parent links `node` is the parent; in its child links `node`
/// is the child. The same child held twice yields two links.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Link {
    /// The node at the other end.
    pub node: NodeId,
    /// Where the child sits in the parent.
    pub slot: Slot,
}

impl ModelGraph {
    /// Links `child` under `parent`. Stale ends are ignored.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId, slot: Slot, pass: &mut Pass) {
        if !self.nodes.contains(parent) {
            return;
        }
        let Some(child_data) = self.nodes.get_mut(child) else {
            return;
        };
        let flags = child_data.aggregate;
        child_data.parents.push(Link {
            node: parent,
            slot: slot.clone(),
        });
        if let Some(parent_data) = self.nodes.get_mut(parent) {
            parent_data.children.push(Link { node: child, slot });
            parent_data.counters.add(flags);
        }
        tracing::trace!(parent = %parent, child = %child, "Attached child");
        self.propagate_from(parent, pass);
    }

    /// Removes one `parent`/`child` link in `slot`.
    ///
    /// Returns `false` without side effects if no such link exists, which is
    /// the case for stale children.
    pub(crate) fn detach(&mut self, parent: NodeId, child: NodeId, slot: &Slot, pass: &mut Pass) -> bool {
        let Some(parent_data) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(position) = parent_data
            .children
            .iter()
            .position(|l| l.node == child && l.slot == *slot)
        else {
            return false;
        };
        parent_data.children.remove(position);

        let Some(child_data) = self.nodes.get_mut(child) else {
            return true;
        };
        let flags = child_data.aggregate;
        if let Some(position) = child_data
            .parents
            .iter()
            .position(|l| l.node == parent && l.slot == *slot)
        {
            child_data.parents.remove(position);
        }
        if let Some(parent_data) = self.nodes.get_mut(parent) {
            parent_data.counters.sub(flags);
        }
        tracing::trace!(parent = %parent, child = %child, "Detached child");
        self.propagate_from(parent, pass);
        true
    }

    /// Subscribes `node` to the model or collection in `value`.
    pub(crate) fn subscribe_value(
        &mut self,
        node: NodeId,
        definition: &PropertyDefinition,
        value: &Value,
        pass: &mut Pass,
    ) {
        let property = definition.name_arc();
        match value {
            Value::Model(child) => {
                let slot = Slot::Property {
                    name: Arc::clone(property),
                };
                self.attach(node, *child, slot, pass);
            }
            Value::Collection(collection) => {
                let Some(data) = self.collections.get_mut(*collection) else {
                    return;
                };
                data.owners.push(CollectionOwner {
                    node,
                    property: Arc::clone(property),
                    tracks_dirty: definition.tracks_dirty(),
                });
                let items = data.items.clone();
                for item in items {
                    let slot = Slot::Item {
                        property: Arc::clone(property),
                        collection: *collection,
                    };
                    self.attach(node, item, slot, pass);
                }
            }
            _ => {}
        }
    }

    /// Exact inverse of [`ModelGraph::subscribe_value`]; idempotent.
    pub(crate) fn unsubscribe_value(
        &mut self,
        node: NodeId,
        definition: &PropertyDefinition,
        value: &Value,
        pass: &mut Pass,
    ) {
        let property = definition.name_arc();
        match value {
            Value::Model(child) => {
                let slot = Slot::Property {
                    name: Arc::clone(property),
                };
                self.detach(node, *child, &slot, pass);
            }
            Value::Collection(collection) => {
                if !self.remove_owner(*collection, node, property) {
                    return;
                }
                let items = self
                    .collections
                    .get(*collection)
                    .map(|data| data.items.clone())
                    .unwrap_or_default();
                let slot = Slot::Item {
                    property: Arc::clone(property),
                    collection: *collection,
                };
                for item in items {
                    self.detach(node, item, &slot, pass);
                }
            }
            _ => {}
        }
    }

    /// Drops one ownership record; returns `false` if there was none.
    pub(crate) fn remove_owner(&mut self, collection: CollectionId, node: NodeId, property: &Arc<str>) -> bool {
        let Some(data) = self.collections.get_mut(collection) else {
            return false;
        };
        let Some(position) = data
            .owners
            .iter()
            .position(|o| o.node == node && o.property == *property)
        else {
            return false;
        };
        data.owners.remove(position);
        true
    }
}
