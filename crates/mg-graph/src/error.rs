//! Error types for the mg-graph crate.
//!
//! This module provides the [`GraphError`] type returned by registry and
//! graph operations.

use mg_core::{CollectionId, ModelTypeId, NodeId};

/// Errors that can occur while declaring properties or mutating a graph.
///
/// # Error Recovery Strategy
///
/// - **Declaration errors** ([`GraphError::DuplicateProperty`],
///   [`GraphError::InvalidDefault`], [`GraphError::TypeConflict`]): programming
///   errors in model type declarations; nothing was registered.
/// - **Access errors** ([`GraphError::PropertyNotRegistered`],
///   [`GraphError::TypeMismatch`], [`GraphError::ReadOnly`],
///   [`GraphError::StaleNode`], ...): the call had no effect on the graph.
/// - **Listener errors** ([`GraphError::Listener`]): the mutation was fully
///   applied and every event was delivered; only the first listener failure
///   is reported.
///
/// # Examples
///
/// ```
/// use mg_graph::GraphError;
///
/// let error = GraphError::not_registered("Email", "Customer");
/// assert_eq!(
///     error.to_string(),
///     "property 'Email' is not registered on model type 'Customer'"
/// );
/// ```
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The property name does not resolve on the node's type or its bases.
    #[error("property '{name}' is not registered on model type '{type_name}'")]
    PropertyNotRegistered {
        /// The property name.
        name: String,
        /// The model type the lookup started from.
        type_name: String,
    },

    /// A conflicting declaration of the property already exists.
    #[error("property '{name}' is already declared for model type '{type_name}'")]
    DuplicateProperty {
        /// The property name.
        name: String,
        /// The model type that was being declared.
        type_name: String,
    },

    /// The value cannot be assigned to the property.
    #[error("cannot assign {actual} to property '{name}' of type {expected}")]
    TypeMismatch {
        /// The property name.
        name: String,
        /// The declared type.
        expected: String,
        /// What was supplied.
        actual: String,
    },

    /// A default value factory produced an unusable value.
    #[error("invalid default for property '{name}' on model type '{type_name}': {reason}")]
    InvalidDefault {
        /// The property name.
        name: String,
        /// The declaring model type.
        type_name: String,
        /// Why the default was rejected.
        reason: String,
    },

    /// A model type name is already registered with a different base.
    #[error("model type '{type_name}' is already registered with a different base type")]
    TypeConflict {
        /// The model type name.
        type_name: String,
    },

    /// The model type identifier is not known to the registry.
    #[error("unknown model type {0}")]
    UnknownType(ModelTypeId),

    /// The node handle refers to a destroyed node.
    #[error("node {0} has been destroyed")]
    StaleNode(NodeId),

    /// The collection handle refers to a destroyed collection.
    #[error("collection {0} has been destroyed")]
    StaleCollection(CollectionId),

    /// The node is read-only.
    #[error("cannot set property '{name}': {type_name} node is read-only")]
    ReadOnly {
        /// The property name.
        name: String,
        /// The node's model type.
        type_name: String,
    },

    /// A collection index is out of bounds.
    #[error("index {index} is out of range for a collection of length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The collection length.
        len: usize,
    },

    /// A snapshot nested models deeper than the configured limit.
    #[error("snapshot nesting exceeds {limit} levels at node {node}")]
    SnapshotTooDeep {
        /// The node that would have exceeded the limit.
        node: NodeId,
        /// The configured maximum depth.
        limit: usize,
    },

    /// An arena ran out of addressable slots.
    #[error("no free slots left")]
    CapacityExhausted,

    /// A listener returned an error while events were being delivered.
    #[error("listener failed: {source}")]
    Listener {
        /// The first error returned by a listener.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl GraphError {
    /// Creates a new [`GraphError::PropertyNotRegistered`] error.
    #[inline]
    pub fn not_registered(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::PropertyNotRegistered {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a new [`GraphError::DuplicateProperty`] error.
    #[inline]
    pub fn duplicate(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::DuplicateProperty {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a new [`GraphError::TypeMismatch`] error.
    #[inline]
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new [`GraphError::InvalidDefault`] error.
    #[inline]
    pub fn invalid_default(
        name: impl Into<String>,
        type_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidDefault {
            name: name.into(),
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new [`GraphError::ReadOnly`] error.
    #[inline]
    pub fn read_only(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::ReadOnly {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Wraps a listener failure.
    #[inline]
    pub fn listener(source: anyhow::Error) -> Self {
        Self::Listener {
            source: source.into(),
        }
    }

    /// Returns `true` if the graph was left untouched by the failed call.
    ///
    /// Only listener failures are reported after the mutation took effect.
    #[inline]
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        !matches!(self, Self::Listener { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_core::SlotHandle;

    #[test]
    fn test_type_mismatch_display() {
        let error = GraphError::type_mismatch("Age", "int", "text");
        assert_eq!(
            error.to_string(),
            "cannot assign text to property 'Age' of type int"
        );
    }

    #[test]
    fn test_stale_node_display() {
        let error = GraphError::StaleNode(NodeId::from_parts(4, 2));
        assert_eq!(error.to_string(), "node node#4.2 has been destroyed");
        assert!(error.is_rejection());
    }

    #[test]
    fn test_listener_keeps_source() {
        let error = GraphError::listener(anyhow::anyhow!("view detached"));
        assert!(!error.is_rejection());
        let source = std::error::Error::source(&error).unwrap();
        assert_eq!(source.to_string(), "view detached");
    }
}
