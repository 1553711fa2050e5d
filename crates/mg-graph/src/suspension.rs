//! Notification suspension scopes and bulk dirty clearing.
//!
//! A [`SuspensionScope`] holds back outward events from a node, a node's
//! subtree, or a collection. Graph state is never deferred: dirty and
//! validation flags, links, and values update exactly as they would without
//! the scope. Scopes nest; each source keeps a depth counter, and when the
//! last scope on a source is released the suppressed events are either
//! collapsed into one [`GraphEvent::Refreshed`] or dropped.

use std::ops::{Deref, DerefMut};

use mg_core::{
    CollectionId, EventSource, FxHashSet, GraphEvent, NodeId, SuspensionMode, fx_hash_set_with_capacity,
};
use tracing::{debug, warn};

use crate::error::GraphError;
use crate::graph::ModelGraph;
use crate::propagation::Pass;

/// Suspension bookkeeping for one source.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SuspendState {
    depth: u32,
    replay: bool,
    pub(crate) suppressed: u32,
}

/// A guard suspending outward events from a set of sources.
///
/// Dereferences to the graph, so the suspended work is done through the
/// scope. Dropping the scope (including on early return or unwinding) or
/// calling [`SuspensionScope::release`] ends the suspension exactly once.
///
/// # Examples
///
/// ```
/// use mg_core::{GraphEvent, SuspensionMode, Value, ValueType};
/// use mg_graph::{ModelGraph, PropertyRegistry, PropertySpec};
/// use std::{cell::RefCell, rc::Rc, sync::Arc};
///
/// let registry = Arc::new(PropertyRegistry::new());
/// let ty = registry.register_type("Sheet", None)?;
/// registry.register(ty, PropertySpec::new("Rows", ValueType::Int))?;
/// let mut graph = ModelGraph::with_registry(registry, Default::default());
/// let sheet = graph.create(ty)?;
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&seen);
/// graph.subscribe(sheet, move |_, event| {
///     sink.borrow_mut().push(event.clone());
///     Ok(())
/// })?;
///
/// let mut scope = graph.begin_suspend_with(sheet, false, SuspensionMode::Collapse)?;
/// for rows in 1..=10 {
///     scope.set_value(sheet, "Rows", Value::Int(rows))?;
/// }
/// assert!(scope.is_dirty(sheet)?);
/// scope.release()?;
///
/// let seen = seen.borrow();
/// assert_eq!(seen.len(), 1);
/// assert!(matches!(seen[0], GraphEvent::Refreshed { suppressed: 11, .. }));
/// # Ok::<(), mg_graph::GraphError>(())
/// ```
#[must_use = "events resume as soon as the scope is dropped"]
pub struct SuspensionScope<'g> {
    graph: &'g mut ModelGraph,
    sources: Vec<EventSource>,
    released: bool,
}

impl<'g> SuspensionScope<'g> {
    fn acquire(graph: &'g mut ModelGraph, sources: Vec<EventSource>, mode: SuspensionMode) -> Self {
        for &source in &sources {
            let state = graph.suspended.entry(source).or_default();
            state.depth += 1;
            state.replay |= mode.replays();
        }
        Self {
            graph,
            sources,
            released: false,
        }
    }

    /// The suspended sources.
    #[must_use]
    pub fn sources(&self) -> &[EventSource] {
        &self.sources
    }

    /// Ends the suspension and delivers any replayed events.
    ///
    /// # Errors
    ///
    /// [`GraphError::Listener`] if a listener failed on a replayed event.
    pub fn release(mut self) -> Result<(), GraphError> {
        self.released = true;
        let sources = std::mem::take(&mut self.sources);
        self.graph.end_suspend(&sources);
        self.graph.dispatch()
    }
}

impl Deref for SuspensionScope<'_> {
    type Target = ModelGraph;

    fn deref(&self) -> &ModelGraph {
        self.graph
    }
}

impl DerefMut for SuspensionScope<'_> {
    fn deref_mut(&mut self) -> &mut ModelGraph {
        self.graph
    }
}

impl Drop for SuspensionScope<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let sources = std::mem::take(&mut self.sources);
        self.graph.end_suspend(&sources);
        if std::thread::panicking() {
            return;
        }
        if let Err(error) = self.graph.dispatch() {
            warn!(error = %error, "Listener failed after suspension ended");
        }
    }
}

impl std::fmt::Debug for SuspensionScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspensionScope")
            .field("sources", &self.sources)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl ModelGraph {
    /// Suspends events from `node`, or from its whole subtree and the
    /// collections the subtree holds if `recursive`, using the configured mode.
    pub fn begin_suspend(&mut self, node: NodeId, recursive: bool) -> Result<SuspensionScope<'_>, GraphError> {
        let mode = self.config().suspension_mode;
        self.begin_suspend_with(node, recursive, mode)
    }

    /// Like [`ModelGraph::begin_suspend`] with an explicit mode.
    ///
    /// The recursive source set is fixed when the scope is acquired.
    pub fn begin_suspend_with(
        &mut self,
        node: NodeId,
        recursive: bool,
        mode: SuspensionMode,
    ) -> Result<SuspensionScope<'_>, GraphError> {
        self.node(node)?;
        let sources = if recursive {
            let nodes = self.subtree(node)?;
            let mut collections = FxHashSet::default();
            let mut sources: Vec<EventSource> = Vec::with_capacity(nodes.len());
            for &n in &nodes {
                sources.push(EventSource::Node(n));
                if let Ok(data) = self.node(n) {
                    for value in data.values.values() {
                        if let Some(c) = value.as_collection() {
                            if self.collections.contains(c) && collections.insert(c) {
                                sources.push(EventSource::Collection(c));
                            }
                        }
                    }
                }
            }
            sources
        } else {
            vec![EventSource::Node(node)]
        };
        Ok(SuspensionScope::acquire(self, sources, mode))
    }

    /// Suspends events from a collection.
    pub fn suspend_collection(
        &mut self,
        collection: CollectionId,
        mode: SuspensionMode,
    ) -> Result<SuspensionScope<'_>, GraphError> {
        self.collection(collection)?;
        Ok(SuspensionScope::acquire(
            self,
            vec![EventSource::Collection(collection)],
            mode,
        ))
    }

    /// Returns `true` if events from `source` are currently held back.
    #[must_use]
    pub fn is_suspended(&self, source: impl Into<EventSource>) -> bool {
        self.suspended.contains_key(&source.into())
    }

    fn end_suspend(&mut self, sources: &[EventSource]) {
        for &source in sources {
            let Some(state) = self.suspended.get_mut(&source) else {
                continue;
            };
            state.depth = state.depth.saturating_sub(1);
            if state.depth > 0 {
                continue;
            }
            let state = *state;
            self.suspended.remove(&source);
            if state.replay && state.suppressed > 0 && self.source_alive(source) {
                self.pending.push_back(GraphEvent::Refreshed {
                    source,
                    suppressed: state.suppressed,
                });
            }
        }
    }

    fn source_alive(&self, source: EventSource) -> bool {
        match source {
            EventSource::Node(node) => self.nodes.contains(node),
            EventSource::Collection(collection) => self.collections.contains(collection),
        }
    }

    /// Every node reachable from `root` through child links, each once, in
    /// post-order (children before parents, `root` last).
    pub fn subtree(&self, root: NodeId) -> Result<Vec<NodeId>, GraphError> {
        self.node(root)?;
        let mut visited = fx_hash_set_with_capacity(self.nodes.len().min(1024));
        let mut order = Vec::new();
        // (node, index of the next child to visit)
        let mut stack = vec![(root, 0_usize)];
        visited.insert(root);

        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            let child = self
                .nodes
                .get(node)
                .and_then(|data| data.children.get(next))
                .map(|link| link.node);
            match child {
                Some(child) => {
                    top.1 += 1;
                    if self.nodes.contains(child) && visited.insert(child) {
                        stack.push((child, 0));
                    }
                }
                None => {
                    order.push(node);
                    stack.pop();
                }
            }
        }
        Ok(order)
    }

    /// Clears local dirty state on `root` and everything beneath it, children
    /// before parents. Every node in the subtree ends clean.
    ///
    /// With `suspend`, every visited node is suspended silently for the
    /// traversal, so no notifications are delivered for the subtree.
    pub fn clear_dirty_on_subtree(&mut self, root: NodeId, suspend: bool) -> Result<(), GraphError> {
        let order = self.subtree(root)?;
        debug!(root = %root, nodes = order.len(), suspend, "Clearing dirty state on subtree");
        if suspend {
            let sources = order.iter().copied().map(EventSource::Node).collect();
            let mut scope = SuspensionScope::acquire(self, sources, SuspensionMode::Silent);
            scope.clear_local_dirty(&order);
            scope.release()
        } else {
            self.clear_local_dirty(&order);
            self.dispatch()
        }
    }

    fn clear_local_dirty(&mut self, order: &[NodeId]) {
        let mut pass = Pass::default();
        for &node in order {
            self.set_local_dirty(node, false, &mut pass);
        }
        debug!(changed = pass.touched(), "Cleared local dirty flags");
        self.finish_pass(pass);
    }
}
