//! Model collections: ordered sequences of node handles.
//!
//! A collection knows the (node, property) pairs that currently hold it.
//! Every mutation reconciles the owners' item links incrementally, marks
//! dirty-tracking owners locally dirty, and raises `CollectionChanged`.

use std::sync::Arc;

use mg_core::{CollectionChange, CollectionId, EventSource, FxHashMap, GraphEvent, NodeId};
use smallvec::{SmallVec, smallvec};
use tracing::debug;

use crate::error::GraphError;
use crate::graph::ModelGraph;
use crate::propagation::Pass;
use crate::subscription::Slot;

/// A (node, property) pair holding a collection.
#[derive(Debug, Clone)]
pub(crate) struct CollectionOwner {
    pub(crate) node: NodeId,
    pub(crate) property: Arc<str>,
    pub(crate) tracks_dirty: bool,
}

impl CollectionOwner {
    fn slot(&self, collection: CollectionId) -> Slot {
        Slot::Item {
            property: Arc::clone(&self.property),
            collection,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CollectionData {
    pub(crate) items: Vec<NodeId>,
    pub(crate) owners: SmallVec<[CollectionOwner; 1]>,
    /// Created as a property default rather than by the caller.
    pub(crate) by_default: bool,
}

impl ModelGraph {
    /// Creates an empty collection.
    pub fn create_collection(&mut self) -> Result<CollectionId, GraphError> {
        self.collections.insert(CollectionData::default())
    }

    /// Returns `true` if `collection` refers to a live collection.
    #[must_use]
    pub fn contains_collection(&self, collection: CollectionId) -> bool {
        self.collections.contains(collection)
    }

    /// The collection's items, in order.
    pub fn collection_items(&self, collection: CollectionId) -> Result<&[NodeId], GraphError> {
        Ok(&self.collection(collection)?.items)
    }

    /// Number of items in the collection.
    pub fn collection_len(&self, collection: CollectionId) -> Result<usize, GraphError> {
        Ok(self.collection(collection)?.items.len())
    }

    /// Appends an item.
    pub fn push(&mut self, collection: CollectionId, item: NodeId) -> Result<(), GraphError> {
        let len = self.collection(collection)?.items.len();
        self.insert(collection, len, item)
    }

    /// Inserts an item at `index`, shifting later items.
    ///
    /// # Errors
    ///
    /// [`GraphError::IndexOutOfRange`] if `index > len`,
    /// [`GraphError::StaleNode`] if `item` was destroyed.
    pub fn insert(&mut self, collection: CollectionId, index: usize, item: NodeId) -> Result<(), GraphError> {
        let len = self.collection(collection)?.items.len();
        if index > len {
            return Err(GraphError::IndexOutOfRange { index, len });
        }
        self.node(item)?;

        let data = self.collection_mut(collection)?;
        data.items.insert(index, item);
        let owners = data.owners.to_vec();

        let mut pass = Pass::default();
        for owner in &owners {
            self.attach(owner.node, item, owner.slot(collection), &mut pass);
        }
        self.touch_owners(&owners, &mut pass);
        self.raise(GraphEvent::CollectionChanged {
            collection,
            change: CollectionChange::Added {
                index,
                items: smallvec![item],
            },
        });
        self.finish_pass(pass);
        self.dispatch()
    }

    /// Removes and returns the item at `index`.
    pub fn remove_at(&mut self, collection: CollectionId, index: usize) -> Result<NodeId, GraphError> {
        let data = self.collection_mut(collection)?;
        let len = data.items.len();
        if index >= len {
            return Err(GraphError::IndexOutOfRange { index, len });
        }
        let item = data.items.remove(index);
        let owners = data.owners.to_vec();

        let mut pass = Pass::default();
        for owner in &owners {
            self.detach(owner.node, item, &owner.slot(collection), &mut pass);
        }
        self.touch_owners(&owners, &mut pass);
        self.raise(GraphEvent::CollectionChanged {
            collection,
            change: CollectionChange::Removed {
                index,
                items: smallvec![item],
            },
        });
        self.finish_pass(pass);
        self.dispatch()?;
        Ok(item)
    }

    /// Removes the first occurrence of `item`; returns whether one was found.
    pub fn remove(&mut self, collection: CollectionId, item: NodeId) -> Result<bool, GraphError> {
        let position = self
            .collection(collection)?
            .items
            .iter()
            .position(|&i| i == item);
        match position {
            Some(index) => self.remove_at(collection, index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Removes every item.
    pub fn clear(&mut self, collection: CollectionId) -> Result<(), GraphError> {
        if self.collection(collection)?.items.is_empty() {
            return Ok(());
        }
        self.replace(collection, std::iter::empty::<NodeId>())
    }

    /// Replaces the contents wholesale.
    ///
    /// Links are reconciled by multiset difference: only items whose count
    /// changed are unsubscribed or subscribed. Replacing with an identical
    /// sequence is a no-op.
    pub fn replace(
        &mut self,
        collection: CollectionId,
        items: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), GraphError> {
        let items: Vec<NodeId> = items.into_iter().collect();
        self.collection(collection)?;
        for &item in &items {
            self.node(item)?;
        }

        let data = self.collection_mut(collection)?;
        if data.items == items {
            return Ok(());
        }
        let old = std::mem::replace(&mut data.items, items);
        let owners = data.owners.to_vec();

        let mut delta: FxHashMap<NodeId, i64> = FxHashMap::default();
        for &item in &old {
            *delta.entry(item).or_default() -= 1;
        }
        for &item in self.collection(collection)?.items.iter() {
            *delta.entry(item).or_default() += 1;
        }
        let mut changes: Vec<(NodeId, i64)> = delta.into_iter().filter(|&(_, d)| d != 0).collect();
        changes.sort_unstable();

        let mut pass = Pass::default();
        for owner in &owners {
            let slot = owner.slot(collection);
            for &(item, d) in &changes {
                for _ in 0..d.unsigned_abs() {
                    if d < 0 {
                        self.detach(owner.node, item, &slot, &mut pass);
                    } else {
                        self.attach(owner.node, item, slot.clone(), &mut pass);
                    }
                }
            }
        }
        self.touch_owners(&owners, &mut pass);
        self.raise(GraphEvent::CollectionChanged {
            collection,
            change: CollectionChange::Reset,
        });
        self.finish_pass(pass);
        self.dispatch()
    }

    /// Destroys a collection.
    ///
    /// Owners lose their links to its items; their property values keep the
    /// now-stale handle.
    pub fn destroy_collection(&mut self, collection: CollectionId) -> Result<(), GraphError> {
        let data = self.collection(collection)?;
        let owners = data.owners.to_vec();
        let items = data.items.clone();

        let mut pass = Pass::default();
        for owner in &owners {
            let slot = owner.slot(collection);
            for &item in &items {
                self.detach(owner.node, item, &slot, &mut pass);
            }
        }
        self.collections.remove(collection);
        self.suspended.remove(&EventSource::Collection(collection));
        self.listeners.remove_source(EventSource::Collection(collection));
        debug!(collection = %collection, items = items.len(), "Destroyed collection");

        self.finish_pass(pass);
        self.dispatch()
    }

    /// Frees a default-created collection once no node holds it.
    pub(crate) fn release_if_orphaned(&mut self, collection: CollectionId) {
        let orphaned = self
            .collections
            .get(collection)
            .is_some_and(|data| data.by_default && data.owners.is_empty());
        if orphaned {
            self.collections.remove(collection);
            self.suspended.remove(&EventSource::Collection(collection));
            self.listeners.remove_source(EventSource::Collection(collection));
            debug!(collection = %collection, "Released default collection");
        }
    }

    /// Marks every dirty-tracking owner locally dirty.
    fn touch_owners(&mut self, owners: &[CollectionOwner], pass: &mut Pass) {
        for owner in owners.iter().filter(|o| o.tracks_dirty) {
            self.set_local_dirty(owner.node, true, pass);
        }
    }

    pub(crate) fn collection(&self, collection: CollectionId) -> Result<&CollectionData, GraphError> {
        self.collections
            .get(collection)
            .ok_or(GraphError::StaleCollection(collection))
    }

    fn collection_mut(&mut self, collection: CollectionId) -> Result<&mut CollectionData, GraphError> {
        self.collections
            .get_mut(collection)
            .ok_or(GraphError::StaleCollection(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PropertyRegistry, PropertySpec};
    use mg_core::{GraphConfig, ModelTypeId, Value, ValueType};

    struct Fixture {
        graph: ModelGraph,
        owner: NodeId,
        items: CollectionId,
        ty: ModelTypeId,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(PropertyRegistry::new());
        let ty = registry.register_type("Playlist", None).unwrap();
        registry
            .register(ty, PropertySpec::new("Tracks", ValueType::Collection).new_collection())
            .unwrap();
        registry
            .register(ty, PropertySpec::new("Length", ValueType::Int))
            .unwrap();
        let mut graph = ModelGraph::with_registry(registry, GraphConfig::default());
        let owner = graph.create(ty).unwrap();
        let items = graph
            .get_value(owner, "Tracks")
            .unwrap()
            .as_collection()
            .unwrap();
        Fixture {
            graph,
            owner,
            items,
            ty,
        }
    }

    #[test]
    fn test_push_links_and_dirties_owner() {
        let mut f = fixture();
        let track = f.graph.create(f.ty).unwrap();
        f.graph.push(f.items, track).unwrap();
        assert_eq!(f.graph.collection_items(f.items).unwrap(), &[track]);
        assert_eq!(f.graph.parent_links(track).unwrap()[0].node, f.owner);
        assert!(f.graph.is_locally_dirty(f.owner).unwrap());
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut f = fixture();
        let track = f.graph.create(f.ty).unwrap();
        let err = f.graph.insert(f.items, 1, track).unwrap_err();
        assert!(matches!(err, GraphError::IndexOutOfRange { index: 1, len: 0 }));
        assert!(!f.graph.is_dirty(f.owner).unwrap());
    }

    #[test]
    fn test_remove_unlinks() {
        let mut f = fixture();
        let a = f.graph.create(f.ty).unwrap();
        let b = f.graph.create(f.ty).unwrap();
        f.graph.push(f.items, a).unwrap();
        f.graph.push(f.items, b).unwrap();

        assert!(f.graph.remove(f.items, a).unwrap());
        assert!(!f.graph.remove(f.items, a).unwrap());
        assert!(f.graph.parent_links(a).unwrap().is_empty());
        assert_eq!(f.graph.collection_items(f.items).unwrap(), &[b]);
        assert_eq!(f.graph.remove_at(f.items, 0).unwrap(), b);
        assert_eq!(f.graph.collection_len(f.items).unwrap(), 0);
    }

    #[test]
    fn test_replace_touches_only_changed_items() {
        let mut f = fixture();
        let a = f.graph.create(f.ty).unwrap();
        let b = f.graph.create(f.ty).unwrap();
        let c = f.graph.create(f.ty).unwrap();
        f.graph.replace(f.items, [a, b, b]).unwrap();
        assert_eq!(f.graph.parent_links(b).unwrap().len(), 2);

        f.graph.replace(f.items, [b, c]).unwrap();
        assert!(f.graph.parent_links(a).unwrap().is_empty());
        assert_eq!(f.graph.parent_links(b).unwrap().len(), 1);
        assert_eq!(f.graph.parent_links(c).unwrap().len(), 1);
        assert_eq!(f.graph.child_links(f.owner).unwrap().len(), 2);
    }

    #[test]
    fn test_dirty_item_dirties_owner_until_removed() {
        let mut f = fixture();
        let track = f.graph.create(f.ty).unwrap();
        f.graph.set_value(track, "Length", Value::Int(180)).unwrap();
        f.graph.push(f.items, track).unwrap();
        f.graph.clear_dirty(f.owner).unwrap();
        assert!(f.graph.is_dirty(f.owner).unwrap());

        f.graph.clear(f.items).unwrap();
        f.graph.clear_dirty(f.owner).unwrap();
        assert!(!f.graph.is_dirty(f.owner).unwrap());
    }

    #[test]
    fn test_shared_collection_has_two_owners() {
        let mut f = fixture();
        let second = f.graph.create(f.ty).unwrap();
        f.graph
            .set_value(second, "Tracks", Value::Collection(f.items))
            .unwrap();
        let track = f.graph.create(f.ty).unwrap();
        f.graph.push(f.items, track).unwrap();

        let parents: Vec<_> = f
            .graph
            .parent_links(track)
            .unwrap()
            .iter()
            .map(|l| l.node)
            .collect();
        assert_eq!(parents.len(), 2);
        assert!(parents.contains(&f.owner));
        assert!(parents.contains(&second));
    }

    #[test]
    fn test_destroy_collection_releases_items() {
        let mut f = fixture();
        let track = f.graph.create(f.ty).unwrap();
        f.graph.push(f.items, track).unwrap();
        f.graph.destroy_collection(f.items).unwrap();
        assert!(!f.graph.contains_collection(f.items));
        assert!(f.graph.parent_links(track).unwrap().is_empty());
        assert!(matches!(
            f.graph.push(f.items, track),
            Err(GraphError::StaleCollection(_))
        ));
    }

    #[test]
    fn test_destroying_owner_frees_default_collection() {
        let mut f = fixture();
        let track = f.graph.create(f.ty).unwrap();
        f.graph.push(f.items, track).unwrap();
        f.graph.destroy(f.owner).unwrap();
        assert!(!f.graph.contains_collection(f.items));
        assert!(f.graph.parent_links(track).unwrap().is_empty());
    }

    #[test]
    fn test_shared_default_collection_outlives_first_owner() {
        let mut f = fixture();
        let second = f.graph.create(f.ty).unwrap();
        f.graph
            .set_value(second, "Tracks", Value::Collection(f.items))
            .unwrap();
        f.graph.destroy(f.owner).unwrap();
        assert!(f.graph.contains_collection(f.items));

        f.graph.destroy(second).unwrap();
        assert!(!f.graph.contains_collection(f.items));
    }

    #[test]
    fn test_caller_collection_survives_owner() {
        let mut f = fixture();
        let mine = f.graph.create_collection().unwrap();
        let holder = f.graph.create(f.ty).unwrap();
        f.graph.set_value(holder, "Tracks", Value::Collection(mine)).unwrap();
        f.graph.destroy(holder).unwrap();
        assert!(f.graph.contains_collection(mine));
    }

    #[test]
    fn test_destroyed_item_stays_as_stale_handle() {
        let mut f = fixture();
        let a = f.graph.create(f.ty).unwrap();
        let b = f.graph.create(f.ty).unwrap();
        f.graph.push(f.items, a).unwrap();
        f.graph.push(f.items, b).unwrap();
        f.graph.destroy(a).unwrap();

        assert_eq!(f.graph.collection_len(f.items).unwrap(), 2);
        assert_eq!(f.graph.child_links(f.owner).unwrap().len(), 1);
        assert!(f.graph.remove(f.items, a).unwrap());
        assert_eq!(f.graph.child_links(f.owner).unwrap().len(), 1);
    }
}
