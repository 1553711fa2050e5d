//! Outward change events.
//!
//! Events are what presentation-layer collaborators observe. They are raised
//! after the graph state they describe is already in place, and they are the
//! only thing a suspension scope holds back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::ids::{CollectionId, NodeId};
use super::validation::ValidationSummary;

/// The node or collection an event is raised by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EventSource {
    /// A model node.
    Node(NodeId),
    /// A model collection.
    Collection(CollectionId),
}

impl From<NodeId> for EventSource {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<CollectionId> for EventSource {
    fn from(id: CollectionId) -> Self {
        Self::Collection(id)
    }
}

/// What happened to a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionChange {
    /// Items were inserted starting at `index`.
    Added {
        /// Position of the first inserted item.
        index: usize,
        /// The inserted items.
        items: SmallVec<[NodeId; 4]>,
    },
    /// Items were removed starting at `index`.
    Removed {
        /// Former position of the first removed item.
        index: usize,
        /// The removed items.
        items: SmallVec<[NodeId; 4]>,
    },
    /// The contents changed wholesale (clear or replace).
    Reset,
}

/// An outward change notification.
///
/// # Examples
///
/// ```
/// use mg_core::{EventSource, GraphEvent, NodeId, SlotHandle};
///
/// let node = NodeId::from_parts(0, 0);
/// let event = GraphEvent::DirtyChanged { node, is_dirty: true };
/// assert_eq!(event.source(), EventSource::Node(node));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A property value changed.
    PropertyChanged {
        /// The node whose property changed.
        node: NodeId,
        /// The property name.
        property: Arc<str>,
    },
    /// A collection's contents changed.
    CollectionChanged {
        /// The collection.
        collection: CollectionId,
        /// What changed.
        change: CollectionChange,
    },
    /// A node's aggregate dirty flag flipped.
    DirtyChanged {
        /// The node.
        node: NodeId,
        /// The new aggregate value.
        is_dirty: bool,
    },
    /// A node's aggregate validation flags changed.
    ValidationChanged {
        /// The node.
        node: NodeId,
        /// The new aggregate flags.
        summary: ValidationSummary,
    },
    /// Stands in for events suppressed while the source was suspended.
    Refreshed {
        /// The formerly suspended source.
        source: EventSource,
        /// How many events were suppressed.
        suppressed: u32,
    },
}

impl GraphEvent {
    /// The node or collection that raised this event.
    #[must_use]
    pub const fn source(&self) -> EventSource {
        match self {
            Self::PropertyChanged { node, .. }
            | Self::DirtyChanged { node, .. }
            | Self::ValidationChanged { node, .. } => EventSource::Node(*node),
            Self::CollectionChanged { collection, .. } => EventSource::Collection(*collection),
            Self::Refreshed { source, .. } => *source,
        }
    }

    /// Returns `true` for [`GraphEvent::DirtyChanged`].
    #[inline]
    #[must_use]
    pub const fn is_dirty_change(&self) -> bool {
        matches!(self, Self::DirtyChanged { .. })
    }
}
