//! The model graph: node storage and property access.
//!
//! A [`ModelGraph`] owns every model node and collection, the links between
//! them, the listeners observing them, and the active suspension scopes.
//! Mutating operations follow one shape:
//!
//! 1. validate the request; a rejected call leaves the graph untouched
//! 2. apply the state change, rewire child links, and propagate aggregate
//!    dirty and validation flags upward within a single [`Pass`]
//! 3. raise events (queued, or counted if the source is suspended)
//! 4. deliver queued events to listeners
//!
//! Link bookkeeping always completes before any listener runs.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use mg_core::{
    CollectionId, EventSource, FxHashMap, GraphConfig, GraphEvent, ModelTypeId, NodeId,
    ValidationResults, Value, ValueType,
};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::collection::CollectionData;
use crate::error::GraphError;
use crate::events::ListenerTable;
use crate::propagation::{Aggregate, LinkCounters, Pass};
use crate::registry::{ModelType, PropertyDefinition, PropertyRegistry};
use crate::subscription::Link;
use crate::suspension::SuspendState;

/// Per-node state.
pub(crate) struct NodeData {
    pub(crate) ty: ModelTypeId,
    pub(crate) values: FxHashMap<Arc<str>, Value>,
    pub(crate) local_dirty: bool,
    pub(crate) read_only: bool,
    pub(crate) own_validation: ValidationResults,
    pub(crate) aggregate: Aggregate,
    pub(crate) counters: LinkCounters,
    pub(crate) parents: SmallVec<[Link; 2]>,
    pub(crate) children: Vec<Link>,
}

impl NodeData {
    fn new(ty: ModelTypeId) -> Self {
        Self {
            ty,
            values: FxHashMap::default(),
            local_dirty: false,
            read_only: false,
            own_validation: ValidationResults::new(),
            aggregate: Aggregate::EMPTY,
            counters: LinkCounters::default(),
            parents: SmallVec::new(),
            children: Vec::new(),
        }
    }

    /// Flags contributed by the node itself.
    pub(crate) fn local_flags(&self) -> Aggregate {
        Aggregate::from_parts(
            self.local_dirty,
            self.own_validation.has_errors(),
            self.own_validation.has_warnings(),
        )
    }
}

/// An observable graph of model nodes.
///
/// Single-owner and not thread-safe; listeners receive `&mut ModelGraph` and
/// may mutate the graph reentrantly.
///
/// # Examples
///
/// ```
/// use mg_core::{Value, ValueType};
/// use mg_graph::{ModelGraph, PropertyRegistry, PropertySpec};
/// use std::sync::Arc;
///
/// let registry = Arc::new(PropertyRegistry::new());
/// let order = registry.register_type("Order", None)?;
/// let line = registry.register_type("OrderLine", None)?;
/// registry.register(order, PropertySpec::new("Line", ValueType::Model(Some(line))))?;
/// registry.register(line, PropertySpec::new("Quantity", ValueType::Int))?;
///
/// let mut graph = ModelGraph::with_registry(registry, Default::default());
/// let root = graph.create(order)?;
/// let child = graph.create(line)?;
/// graph.set_value(root, "Line", Value::Model(child))?;
/// graph.clear_dirty(root)?;
///
/// graph.set_value(child, "Quantity", Value::Int(3))?;
/// assert!(graph.is_dirty(root)?);
/// assert!(!graph.is_locally_dirty(root)?);
/// # Ok::<(), mg_graph::GraphError>(())
/// ```
pub struct ModelGraph {
    registry: Arc<PropertyRegistry>,
    config: GraphConfig,
    pub(crate) nodes: Arena<NodeId, NodeData>,
    pub(crate) collections: Arena<CollectionId, CollectionData>,
    pub(crate) listeners: ListenerTable,
    pub(crate) suspended: FxHashMap<EventSource, SuspendState>,
    pub(crate) pending: VecDeque<GraphEvent>,
    pub(crate) dispatching: Rc<Cell<bool>>,
}

impl ModelGraph {
    /// Creates a graph over the process-wide registry with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Creates a graph over the process-wide registry.
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self::with_registry(PropertyRegistry::global(), config)
    }

    /// Creates a graph over a specific registry.
    #[must_use]
    pub fn with_registry(registry: Arc<PropertyRegistry>, config: GraphConfig) -> Self {
        Self {
            registry,
            config,
            nodes: Arena::with_capacity(config.initial_capacity),
            collections: Arena::with_capacity(0),
            listeners: ListenerTable::default(),
            suspended: FxHashMap::default(),
            pending: VecDeque::new(),
            dispatching: Rc::new(Cell::new(false)),
        }
    }

    /// The registry property names are resolved against.
    #[must_use]
    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    /// The graph's settings.
    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Node lifecycle
    // -------------------------------------------------------------------------

    /// Creates a clean, valid node of type `ty`.
    pub fn create(&mut self, ty: ModelTypeId) -> Result<NodeId, GraphError> {
        let schema = self.registry.schema(ty)?;
        let id = self.nodes.insert(NodeData::new(ty))?;
        debug!(node = %id, ty = schema.name(), "Created node");
        Ok(id)
    }

    /// Creates a node of a static model type, registering the type on first use.
    pub fn create_model(&mut self, model_type: &'static ModelType) -> Result<NodeId, GraphError> {
        let ty = self.registry.ensure(model_type)?;
        self.create(ty)
    }

    /// Destroys a node.
    ///
    /// Every link to and from the node and every collection ownership it
    /// holds is released, so ancestors no longer count it. Listeners on the
    /// node are dropped. Handles to the node held elsewhere become stale.
    pub fn destroy(&mut self, node: NodeId) -> Result<(), GraphError> {
        let data = self.node(node)?;
        let parents: Vec<Link> = data.parents.iter().cloned().collect();
        let children = data.children.clone();
        let owned: Vec<(Arc<str>, CollectionId)> = data
            .values
            .iter()
            .filter_map(|(name, value)| value.as_collection().map(|c| (Arc::clone(name), c)))
            .collect();

        let mut pass = Pass::default();
        for link in parents {
            self.detach(link.node, node, &link.slot, &mut pass);
        }
        for link in children {
            self.detach(node, link.node, &link.slot, &mut pass);
        }
        for (property, collection) in owned {
            self.remove_owner(collection, node, &property);
            self.release_if_orphaned(collection);
        }

        self.nodes.remove(node);
        self.suspended.remove(&EventSource::Node(node));
        self.listeners.remove_source(EventSource::Node(node));
        debug!(node = %node, "Destroyed node");

        self.finish_pass(pass);
        self.dispatch()
    }

    /// Returns `true` if `node` refers to a live node.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// The model type of `node`.
    pub fn type_of(&self, node: NodeId) -> Result<ModelTypeId, GraphError> {
        Ok(self.node(node)?.ty)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Handles of every live node, in slot order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|(id, _)| id)
    }

    // -------------------------------------------------------------------------
    // Property access
    // -------------------------------------------------------------------------

    /// Reads a property.
    ///
    /// The first read of a property that was never set stores its default,
    /// creating and subscribing a fresh collection for collection defaults.
    pub fn get_value(&mut self, node: NodeId, name: &str) -> Result<Value, GraphError> {
        let definition = self.resolve(node, name)?;
        self.materialize(node, &definition)
    }

    /// Reads a property without storing its default.
    ///
    /// A collection-creating default reads as `Null` until it is materialized.
    pub fn peek_value(&self, node: NodeId, name: &str) -> Result<Value, GraphError> {
        let definition = self.resolve(node, name)?;
        self.peek(node, &definition)
    }

    pub(crate) fn peek(&self, node: NodeId, definition: &PropertyDefinition) -> Result<Value, GraphError> {
        let data = self.node(node)?;
        Ok(data
            .values
            .get(definition.name())
            .cloned()
            .unwrap_or_else(|| definition.initial_value()))
    }

    /// Assigns a property.
    ///
    /// Assigning the current value is a no-op. Otherwise the value is stored,
    /// the node becomes locally dirty (unless the property is untracked), the
    /// replaced child is unsubscribed and the new one subscribed, and
    /// `PropertyChanged` is raised followed by any aggregate flag changes.
    ///
    /// # Errors
    ///
    /// - [`GraphError::PropertyNotRegistered`] for unknown names
    /// - [`GraphError::TypeMismatch`] if the value does not fit the property
    /// - [`GraphError::ReadOnly`] if the node is read-only
    /// - [`GraphError::StaleNode`] / [`GraphError::StaleCollection`] if the
    ///   value references a destroyed entity
    /// - [`GraphError::Listener`] if a listener failed after the assignment
    pub fn set_value(&mut self, node: NodeId, name: &str, value: Value) -> Result<(), GraphError> {
        let definition = self.resolve(node, name)?;
        if self.node(node)?.read_only {
            return Err(GraphError::read_only(name, self.type_label(self.node(node)?.ty)));
        }
        self.check_assignable(&definition, &value)?;

        // A default collection would be fresh and never equal `value`, so it
        // is not created just to be replaced.
        let stored = self.node(node)?.values.contains_key(definition.name());
        if (stored || !definition.creates_collection()) && self.materialize(node, &definition)? == value {
            return Ok(());
        }

        let data = self.node_mut(node)?;
        let old = data
            .values
            .insert(Arc::clone(definition.name_arc()), value.clone())
            .unwrap_or(Value::Null);
        trace!(node = %node, property = name, value = value.kind(), "Set property");

        let mut pass = Pass::default();
        if definition.tracks_dirty() {
            self.set_local_dirty(node, true, &mut pass);
        }
        self.unsubscribe_value(node, &definition, &old, &mut pass);
        self.subscribe_value(node, &definition, &value, &mut pass);
        self.raise(GraphEvent::PropertyChanged {
            node,
            property: Arc::clone(definition.name_arc()),
        });
        if self.config.auto_validate {
            self.run_validators(node, &mut pass)?;
        }
        self.finish_pass(pass);
        self.dispatch()
    }

    /// Checks that `value` may be assigned to a property.
    pub(crate) fn check_assignable(&self, definition: &PropertyDefinition, value: &Value) -> Result<(), GraphError> {
        let expected = definition.value_type();
        if !expected.admits(value) {
            return Err(GraphError::type_mismatch(
                definition.name(),
                self.describe(expected),
                value.kind(),
            ));
        }
        match value {
            Value::Model(child) => {
                let child_ty = self.node(*child)?.ty;
                if let ValueType::Model(Some(required)) = expected {
                    if !self.registry.is_subtype(child_ty, required) {
                        return Err(GraphError::type_mismatch(
                            definition.name(),
                            self.describe(expected),
                            self.type_label(child_ty),
                        ));
                    }
                }
                Ok(())
            }
            Value::Collection(collection) => {
                self.collection(*collection)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Returns the stored value, storing the default on first access.
    fn materialize(&mut self, node: NodeId, definition: &PropertyDefinition) -> Result<Value, GraphError> {
        if let Some(value) = self.node(node)?.values.get(definition.name()) {
            return Ok(value.clone());
        }
        let value = if definition.creates_collection() {
            Value::Collection(self.collections.insert(CollectionData {
                by_default: true,
                ..CollectionData::default()
            })?)
        } else {
            definition.initial_value()
        };
        self.node_mut(node)?
            .values
            .insert(Arc::clone(definition.name_arc()), value.clone());
        if let Value::Collection(collection) = value {
            // Empty, so ownership is registered without links.
            let mut pass = Pass::default();
            self.subscribe_value(node, definition, &Value::Collection(collection), &mut pass);
        }
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Dirty state
    // -------------------------------------------------------------------------

    /// Aggregate dirty flag: the node or anything beneath it is modified.
    pub fn is_dirty(&self, node: NodeId) -> Result<bool, GraphError> {
        Ok(self.node(node)?.aggregate.is_dirty())
    }

    /// The node's own modification flag.
    pub fn is_locally_dirty(&self, node: NodeId) -> Result<bool, GraphError> {
        Ok(self.node(node)?.local_dirty)
    }

    /// Clears the node's own modification flag.
    ///
    /// The node stays dirty while any child is dirty.
    pub fn clear_dirty(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.node(node)?;
        let mut pass = Pass::default();
        self.set_local_dirty(node, false, &mut pass);
        self.finish_pass(pass);
        self.dispatch()
    }

    pub(crate) fn set_local_dirty(&mut self, node: NodeId, dirty: bool, pass: &mut Pass) {
        let Some(data) = self.nodes.get_mut(node) else {
            return;
        };
        if data.local_dirty != dirty {
            data.local_dirty = dirty;
            self.propagate_from(node, pass);
        }
    }

    // -------------------------------------------------------------------------
    // Read-only state and links
    // -------------------------------------------------------------------------

    /// Makes the node reject property assignments.
    pub fn set_read_only(&mut self, node: NodeId, read_only: bool) -> Result<(), GraphError> {
        self.node_mut(node)?.read_only = read_only;
        Ok(())
    }

    /// Returns `true` if the node rejects property assignments.
    pub fn is_read_only(&self, node: NodeId) -> Result<bool, GraphError> {
        Ok(self.node(node)?.read_only)
    }

    /// Links from the node to the nodes holding it.
    pub fn parent_links(&self, node: NodeId) -> Result<&[Link], GraphError> {
        Ok(&self.node(node)?.parents)
    }

    /// Links from the node to the nodes it holds.
    pub fn child_links(&self, node: NodeId) -> Result<&[Link], GraphError> {
        Ok(&self.node(node)?.children)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    pub(crate) fn node(&self, node: NodeId) -> Result<&NodeData, GraphError> {
        self.nodes.get(node).ok_or(GraphError::StaleNode(node))
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeData, GraphError> {
        self.nodes.get_mut(node).ok_or(GraphError::StaleNode(node))
    }

    pub(crate) fn resolve(&self, node: NodeId, name: &str) -> Result<Arc<PropertyDefinition>, GraphError> {
        let ty = self.node(node)?.ty;
        self.registry.resolve(ty, name)
    }

    pub(crate) fn type_label(&self, ty: ModelTypeId) -> String {
        self.registry
            .type_name(ty)
            .map_or_else(|| ty.to_string(), |name| name.to_string())
    }

    fn describe(&self, value_type: ValueType) -> String {
        match value_type {
            ValueType::Model(Some(ty)) => format!("model<{}>", self.type_label(ty)),
            other => other.to_string(),
        }
    }
}

impl Default for ModelGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelGraph")
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .field("collections", &self.collections.len())
            .field("listeners", &self.listeners.len())
            .field("suspended", &self.suspended.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
