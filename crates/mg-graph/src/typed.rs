//! Typed property keys over the variant value store.

use std::fmt;
use std::marker::PhantomData;

use mg_core::{NodeId, PropertyValue, Value};

use crate::error::GraphError;
use crate::graph::ModelGraph;
use crate::registry::PropertySpec;

/// A typed key for a property, usable as a `const`.
///
/// # Examples
///
/// ```
/// use mg_graph::{ModelGraph, Property, PropertyRegistry};
/// use std::sync::Arc;
///
/// const QUANTITY: Property<i64> = Property::new("Quantity");
///
/// let registry = Arc::new(PropertyRegistry::new());
/// let ty = registry.register_type("Line", None)?;
/// registry.register(ty, QUANTITY.spec())?;
///
/// let mut graph = ModelGraph::with_registry(registry, Default::default());
/// let line = graph.create(ty)?;
/// graph.set(line, &QUANTITY, 4)?;
/// assert_eq!(graph.get(line, &QUANTITY)?, 4);
/// # Ok::<(), mg_graph::GraphError>(())
/// ```
pub struct Property<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    /// Creates a key for the property called `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    /// The property name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: PropertyValue> Property<T> {
    /// A declaration for this property with the Rust type's value type.
    #[must_use]
    pub fn spec(&self) -> PropertySpec {
        PropertySpec::new(self.name, T::VALUE_TYPE)
    }

    pub(crate) fn decode(&self, value: Value) -> Result<T, GraphError> {
        T::from_value(&value)
            .ok_or_else(|| GraphError::type_mismatch(self.name, T::VALUE_TYPE.to_string(), value.kind()))
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Property<T> {}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.name).finish()
    }
}

impl ModelGraph {
    /// Reads a property through a typed key.
    pub fn get<T: PropertyValue>(&mut self, node: NodeId, property: &Property<T>) -> Result<T, GraphError> {
        let value = self.get_value(node, property.name)?;
        property.decode(value)
    }

    /// Assigns a property through a typed key.
    pub fn set<T: PropertyValue>(&mut self, node: NodeId, property: &Property<T>, value: T) -> Result<(), GraphError> {
        self.set_value(node, property.name, value.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::registry::PropertyRegistry;
    use mg_core::{CollectionId, GraphConfig, ValueType};

    const TITLE: Property<String> = Property::new("Title");
    const DONE: Property<bool> = Property::new("Done");
    const NEXT: Property<Option<NodeId>> = Property::new("Next");
    const TAGS: Property<Option<CollectionId>> = Property::new("Tags");

    fn graph() -> (ModelGraph, NodeId) {
        let registry = Arc::new(PropertyRegistry::new());
        let ty = registry.register_type("Task", None).unwrap();
        for spec in [TITLE.spec(), DONE.spec(), NEXT.spec(), TAGS.spec().new_collection()] {
            registry.register(ty, spec).unwrap();
        }
        let mut graph = ModelGraph::with_registry(registry, GraphConfig::default());
        let node = graph.create(ty).unwrap();
        (graph, node)
    }

    #[test]
    fn test_spec_uses_rust_type() {
        assert_eq!(NEXT.spec().name(), "Next");
        assert_eq!(<Option<NodeId> as PropertyValue>::VALUE_TYPE, ValueType::Model(None));
    }

    #[test]
    fn test_typed_round_trip() {
        let (mut graph, node) = graph();
        assert_eq!(graph.get(node, &TITLE).unwrap(), "");
        graph.set(node, &TITLE, "Write docs".to_owned()).unwrap();
        graph.set(node, &DONE, true).unwrap();
        assert_eq!(graph.get(node, &TITLE).unwrap(), "Write docs");
        assert!(graph.get(node, &DONE).unwrap());
    }

    #[test]
    fn test_optional_model_key() {
        let (mut graph, node) = graph();
        let ty = graph.type_of(node).unwrap();
        let next = graph.create(ty).unwrap();
        assert_eq!(graph.get(node, &NEXT).unwrap(), None);
        graph.set(node, &NEXT, Some(next)).unwrap();
        assert_eq!(graph.get(node, &NEXT).unwrap(), Some(next));
        assert!(graph.get(node, &TAGS).unwrap().is_some());
    }

    #[test]
    fn test_wrong_key_type_is_mismatch() {
        let (mut graph, node) = graph();
        let wrong: Property<i64> = Property::new("Title");
        assert!(matches!(
            graph.get(node, &wrong),
            Err(GraphError::TypeMismatch { .. })
        ));
    }
}
