//! Handles into the graph's arenas.
//!
//! Nodes, collections, and listeners live in slot arenas. A handle carries
//! the slot index and the generation the slot had when the handle was
//! issued; once the slot is freed its generation moves on and every
//! outstanding handle becomes stale instead of aliasing a new occupant.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A handle made of a slot index and a generation.
///
/// Implemented by every arena handle so a single arena type can serve
/// nodes, collections, and listeners.
pub trait SlotHandle: Copy + Eq + std::hash::Hash + fmt::Debug {
    /// Builds a handle from its parts.
    fn from_parts(index: u32, generation: u32) -> Self;

    /// The slot index.
    fn index(self) -> u32;

    /// The slot generation at issue time.
    fn generation(self) -> u32;
}

macro_rules! slot_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl SlotHandle for $name {
            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            #[inline]
            fn index(self) -> u32 {
                self.index
            }

            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}.{}"), self.index, self.generation)
            }
        }
    };
}

slot_handle!(
    /// Handle to a model node.
    ///
    /// # Examples
    ///
    /// ```
    /// use mg_core::{NodeId, SlotHandle};
    ///
    /// let id = NodeId::from_parts(3, 1);
    /// assert_eq!(id.to_string(), "node#3.1");
    /// ```
    NodeId,
    "node"
);

slot_handle!(
    /// Handle to a model collection.
    CollectionId,
    "collection"
);

slot_handle!(
    /// Handle returned when a listener is subscribed; pass it back to
    /// unsubscribe.
    ListenerId,
    "listener"
);

/// Identifier of a model type in a property registry.
///
/// Model types are never removed, so the identifier is a plain index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelTypeId(u32);

impl ModelTypeId {
    /// Creates an identifier from a registry index.
    #[inline]
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// The registry index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModelTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_compare_generation() {
        let old = NodeId::from_parts(7, 0);
        let recycled = NodeId::from_parts(7, 1);
        assert_ne!(old, recycled);
        assert_eq!(old.index(), recycled.index());
    }

    #[test]
    fn test_display() {
        assert_eq!(CollectionId::from_parts(2, 5).to_string(), "collection#2.5");
        assert_eq!(ListenerId::from_parts(0, 0).to_string(), "listener#0.0");
        assert_eq!(ModelTypeId::from_index(4).to_string(), "type#4");
    }
}
