//! Listener registration and event delivery.
//!
//! Events are queued while the graph changes and delivered once the change is
//! complete. A listener receives `&mut ModelGraph` and may mutate the graph;
//! events raised meanwhile are appended to the queue and delivered, in order,
//! after the running listener returns.

use std::rc::Rc;

use mg_core::{EventSource, FxHashMap, GraphEvent, ListenerId};
use smallvec::SmallVec;
use tracing::warn;

use crate::arena::Arena;
use crate::error::GraphError;
use crate::graph::ModelGraph;

/// What a listener returns. The first error of a delivery round is reported to
/// the mutating caller as [`GraphError::Listener`].
pub type ListenerResult = anyhow::Result<()>;

type Callback = Box<dyn FnMut(&mut ModelGraph, &GraphEvent) -> ListenerResult>;

struct ListenerEntry {
    source: Option<EventSource>,
    /// Taken out while the listener runs.
    callback: Option<Callback>,
}

/// Subscribed listeners, by source and global.
#[derive(Default)]
pub(crate) struct ListenerTable {
    entries: Arena<ListenerId, ListenerEntry>,
    by_source: FxHashMap<EventSource, SmallVec<[ListenerId; 2]>>,
    global: Vec<ListenerId>,
}

impl ListenerTable {
    fn insert(&mut self, source: Option<EventSource>, callback: Callback) -> Result<ListenerId, GraphError> {
        let id = self.entries.insert(ListenerEntry {
            source,
            callback: Some(callback),
        })?;
        match source {
            Some(source) => self.by_source.entry(source).or_default().push(id),
            None => self.global.push(id),
        }
        Ok(id)
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        match entry.source {
            Some(source) => {
                if let Some(ids) = self.by_source.get_mut(&source) {
                    ids.retain(|other| *other != id);
                    if ids.is_empty() {
                        self.by_source.remove(&source);
                    }
                }
            }
            None => self.global.retain(|other| *other != id),
        }
        true
    }

    pub(crate) fn remove_source(&mut self, source: EventSource) {
        for id in self.by_source.remove(&source).unwrap_or_default() {
            self.entries.remove(id);
        }
    }

    /// Listeners for an event: source listeners first, then global ones, each
    /// in subscription order.
    fn targets(&self, source: EventSource) -> SmallVec<[ListenerId; 8]> {
        let mut targets: SmallVec<[ListenerId; 8]> = self
            .by_source
            .get(&source)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        targets.extend(self.global.iter().copied());
        targets
    }

    fn take(&mut self, id: ListenerId) -> Option<Callback> {
        self.entries.get_mut(id)?.callback.take()
    }

    /// Puts a callback back unless the listener was unsubscribed meanwhile.
    fn restore(&mut self, id: ListenerId, callback: Callback) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.callback = Some(callback);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Resets the delivery flag even if a listener panics.
struct DeliveryGuard(Rc<std::cell::Cell<bool>>);

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl ModelGraph {
    /// Subscribes a listener to events raised by one node or collection.
    ///
    /// The listener is dropped when the source is destroyed.
    pub fn subscribe<F>(&mut self, source: impl Into<EventSource>, listener: F) -> Result<ListenerId, GraphError>
    where
        F: FnMut(&mut ModelGraph, &GraphEvent) -> ListenerResult + 'static,
    {
        let source = source.into();
        match source {
            EventSource::Node(node) => {
                self.node(node)?;
            }
            EventSource::Collection(collection) => {
                self.collection(collection)?;
            }
        }
        self.listeners.insert(Some(source), Box::new(listener))
    }

    /// Subscribes a listener to every event in the graph.
    pub fn subscribe_all<F>(&mut self, listener: F) -> Result<ListenerId, GraphError>
    where
        F: FnMut(&mut ModelGraph, &GraphEvent) -> ListenerResult + 'static,
    {
        self.listeners.insert(None, Box::new(listener))
    }

    /// Removes a listener; returns `false` if it was already gone.
    ///
    /// A listener may unsubscribe itself while it runs.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Queues an event, or counts it if its source is suspended.
    pub(crate) fn raise(&mut self, event: GraphEvent) {
        if let Some(state) = self.suspended.get_mut(&event.source()) {
            state.suppressed = state.suppressed.saturating_add(1);
            return;
        }
        self.pending.push_back(event);
    }

    /// Delivers queued events.
    ///
    /// Reentrant calls return immediately; the outermost call drains the
    /// queue, including events raised by listeners.
    pub(crate) fn dispatch(&mut self) -> Result<(), GraphError> {
        if self.dispatching.get() {
            return Ok(());
        }
        self.dispatching.set(true);
        let _guard = DeliveryGuard(Rc::clone(&self.dispatching));

        let mut first_error = None;
        while let Some(event) = self.pending.pop_front() {
            for id in self.listeners.targets(event.source()) {
                let Some(mut callback) = self.listeners.take(id) else {
                    continue;
                };
                let result = callback(self, &event);
                self.listeners.restore(id, callback);
                if let Err(error) = result {
                    warn!(listener = %id, error = %error, "Listener failed");
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(GraphError::listener(error)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Arc;

    use crate::registry::{PropertyRegistry, PropertySpec};
    use mg_core::{GraphConfig, ModelTypeId, NodeId, Value, ValueType};

    fn graph() -> (ModelGraph, ModelTypeId) {
        let registry = Arc::new(PropertyRegistry::new());
        let ty = registry.register_type("Invoice", None).unwrap();
        registry
            .register(ty, PropertySpec::new("Total", ValueType::Int))
            .unwrap();
        registry
            .register(ty, PropertySpec::new("Copy", ValueType::Int))
            .unwrap();
        registry
            .register(ty, PropertySpec::new("Parent", ValueType::Model(None)))
            .unwrap();
        (ModelGraph::with_registry(registry, GraphConfig::default()), ty)
    }

    fn recorder() -> (Rc<RefCell<Vec<GraphEvent>>>, impl FnMut(&mut ModelGraph, &GraphEvent) -> ListenerResult) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        (log, move |_: &mut ModelGraph, event: &GraphEvent| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        })
    }

    #[test]
    fn test_property_change_then_dirty_change() {
        let (mut graph, ty) = graph();
        let node = graph.create(ty).unwrap();
        let (log, listener) = recorder();
        graph.subscribe(node, listener).unwrap();

        graph.set_value(node, "Total", Value::Int(10)).unwrap();
        let events = log.borrow();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], GraphEvent::PropertyChanged { property, .. } if &**property == "Total"));
        assert_eq!(events[1], GraphEvent::DirtyChanged { node, is_dirty: true });
    }

    #[test]
    fn test_ancestor_dirty_events() {
        let (mut graph, ty) = graph();
        let holder = graph.create(ty).unwrap();
        let child = graph.create(ty).unwrap();
        graph.set_value(holder, "Parent", Value::Model(child)).unwrap();
        graph.clear_dirty(holder).unwrap();

        let (log, listener) = recorder();
        graph.subscribe_all(listener).unwrap();
        graph.set_value(child, "Total", Value::Int(1)).unwrap();

        let dirty: Vec<NodeId> = log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                GraphEvent::DirtyChanged { node, is_dirty: true } => Some(*node),
                _ => None,
            })
            .collect();
        assert_eq!(dirty, vec![child, holder]);
    }

    #[test]
    fn test_listener_can_mutate_graph() {
        let (mut graph, ty) = graph();
        let node = graph.create(ty).unwrap();
        graph
            .subscribe(node, move |graph, event| {
                if let GraphEvent::PropertyChanged { node, property } = event {
                    if &**property == "Total" {
                        let total = graph.get_value(*node, "Total")?;
                        graph.set_value(*node, "Copy", total)?;
                    }
                }
                Ok(())
            })
            .unwrap();

        graph.set_value(node, "Total", Value::Int(42)).unwrap();
        assert_eq!(graph.get_value(node, "Copy").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_events_from_listener_are_queued_in_order() {
        let (mut graph, ty) = graph();
        let node = graph.create(ty).unwrap();
        graph
            .subscribe(node, move |graph, event| {
                if matches!(event, GraphEvent::PropertyChanged { property, .. } if &**property == "Total") {
                    graph.set_value(node, "Copy", Value::Int(1))?;
                }
                Ok(())
            })
            .unwrap();
        let (log, listener) = recorder();
        graph.subscribe(node, listener).unwrap();

        graph.set_value(node, "Total", Value::Int(5)).unwrap();
        let names: Vec<String> = log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                GraphEvent::PropertyChanged { property, .. } => Some(property.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["Total", "Copy"]);
    }

    #[test]
    fn test_listener_error_is_reported_after_commit() {
        let (mut graph, ty) = graph();
        let node = graph.create(ty).unwrap();
        graph
            .subscribe(node, |_, _| Err(anyhow::anyhow!("view is gone")))
            .unwrap();
        let (log, listener) = recorder();
        graph.subscribe_all(listener).unwrap();

        let err = graph.set_value(node, "Total", Value::Int(3)).unwrap_err();
        assert!(matches!(err, GraphError::Listener { .. }));
        assert_eq!(graph.get_value(node, "Total").unwrap(), Value::Int(3));
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_listener_unsubscribes_itself() {
        let (mut graph, ty) = graph();
        let node = graph.create(ty).unwrap();
        let calls = Rc::new(std::cell::Cell::new(0));
        let counter = Rc::clone(&calls);
        let id = Rc::new(std::cell::Cell::new(None));
        let own_id = Rc::clone(&id);
        let listener = graph
            .subscribe(node, move |graph, _| {
                counter.set(counter.get() + 1);
                if let Some(id) = own_id.get() {
                    assert!(graph.unsubscribe(id));
                }
                Ok(())
            })
            .unwrap();
        id.set(Some(listener));

        graph.set_value(node, "Total", Value::Int(1)).unwrap();
        graph.set_value(node, "Total", Value::Int(2)).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(!graph.unsubscribe(listener));
    }

    #[test]
    fn test_destroy_drops_source_listeners() {
        let (mut graph, ty) = graph();
        let node = graph.create(ty).unwrap();
        let (_log, listener) = recorder();
        let id = graph.subscribe(node, listener).unwrap();
        graph.destroy(node).unwrap();
        assert!(!graph.unsubscribe(id));
        assert!(matches!(
            graph.subscribe(node, |_, _| Ok(())),
            Err(GraphError::StaleNode(_))
        ));
    }
}
