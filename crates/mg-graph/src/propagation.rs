//! Upward propagation of aggregate dirty and validation flags.
//!
//! Every node keeps an [`Aggregate`] of three flags (dirty, has errors, has
//! warnings) and [`LinkCounters`] recording how many of its child links point
//! at a child with each flag set. A node's aggregate is the least fixed point
//! of
//!
//! ```text
//! aggregate(n) = local(n) | (counters(n) > 0)
//! ```
//!
//! so on cyclic graphs a node is flagged exactly when some node reachable
//! through its children (itself included) carries the flag locally.
//!
//! When a node's local flags or child links change, only that node and its
//! ancestors can change. If the node still carries locally every flag it
//! held before, flags can only be gained: they are raised parent by parent,
//! stopping at any ancestor that already carries them. Otherwise a cycle may
//! be holding a lost flag up, and the step collects the upward closure,
//! splits each member's counters into the part owed to children inside the
//! closure and the part owed to children outside it (which cannot change),
//! seeds the members whose own flags or outside children demand a flag, and
//! floods the seeds upward. Changed aggregates are applied and the parents'
//! counters shifted, so the counters stay exact after every step.
//!
//! A [`Pass`] spans one graph operation and remembers each touched node's
//! aggregate from before the operation; events are raised only for nodes
//! whose aggregate actually differs at the end.

use mg_core::{FxHashMap, GraphEvent, NodeId, ValidationSummary, fx_hash_map_with_capacity};
use smallvec::SmallVec;

use crate::graph::ModelGraph;

/// The three propagated flags of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub(crate) struct Aggregate(u8);

impl Aggregate {
    pub(crate) const EMPTY: Self = Self(0);
    const DIRTY: u8 = 1;
    const ERRORS: u8 = 1 << 1;
    const WARNINGS: u8 = 1 << 2;
    const BITS: [u8; 3] = [Self::DIRTY, Self::ERRORS, Self::WARNINGS];

    pub(crate) const fn from_parts(dirty: bool, errors: bool, warnings: bool) -> Self {
        let mut bits = 0;
        if dirty {
            bits |= Self::DIRTY;
        }
        if errors {
            bits |= Self::ERRORS;
        }
        if warnings {
            bits |= Self::WARNINGS;
        }
        Self(bits)
    }

    #[inline]
    pub(crate) const fn is_dirty(self) -> bool {
        self.0 & Self::DIRTY != 0
    }

    #[inline]
    pub(crate) const fn summary(self) -> ValidationSummary {
        ValidationSummary {
            has_errors: self.0 & Self::ERRORS != 0,
            has_warnings: self.0 & Self::WARNINGS != 0,
        }
    }

    #[inline]
    const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Flags set in `self` but not in `other`.
    #[inline]
    const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Per-flag counts of child links whose child carries the flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LinkCounters([u32; 3]);

impl LinkCounters {
    pub(crate) fn add(&mut self, flags: Aggregate) {
        for (count, bit) in self.0.iter_mut().zip(Aggregate::BITS) {
            if flags.0 & bit != 0 {
                *count += 1;
            }
        }
    }

    pub(crate) fn sub(&mut self, flags: Aggregate) {
        for (count, bit) in self.0.iter_mut().zip(Aggregate::BITS) {
            if flags.0 & bit != 0 {
                *count = count.saturating_sub(1);
            }
        }
    }

    fn shift(&mut self, old: Aggregate, new: Aggregate) {
        self.sub(old.without(new));
        self.add(new.without(old));
    }

    /// Flags with at least one link.
    fn nonzero(self) -> Aggregate {
        self.beyond(Self::default())
    }

    /// Flags whose count exceeds the count in `inside`.
    fn beyond(self, inside: Self) -> Aggregate {
        let mut bits = 0;
        for ((total, inner), bit) in self.0.iter().zip(inside.0).zip(Aggregate::BITS) {
            if *total > inner {
                bits |= bit;
            }
        }
        Aggregate(bits)
    }
}

/// The aggregate flags of every node touched by one graph operation, as they
/// were before the operation.
#[derive(Debug, Default)]
pub(crate) struct Pass {
    initial: FxHashMap<NodeId, Aggregate>,
    order: Vec<NodeId>,
}

impl Pass {
    fn record(&mut self, node: NodeId, before: Aggregate) {
        if !self.initial.contains_key(&node) {
            self.initial.insert(node, before);
            self.order.push(node);
        }
    }

    /// Number of nodes whose aggregate changed at some point in the pass.
    pub(crate) fn touched(&self) -> usize {
        self.order.len()
    }
}

impl ModelGraph {
    /// Recomputes the aggregates of `start` and its ancestors.
    pub(crate) fn propagate_from(&mut self, start: NodeId, pass: &mut Pass) {
        let Some(data) = self.nodes.get(start) else {
            return;
        };
        let local = data.local_flags();
        if data.aggregate.without(local).is_empty() {
            let next = local.union(data.counters.nonzero());
            self.raise_upward(start, next, pass);
        } else {
            self.recompute_closure(start, pass);
        }
    }

    /// Adds `flags` to `start` and carries them upward until every ancestor
    /// on the way already has them.
    fn raise_upward(&mut self, start: NodeId, flags: Aggregate, pass: &mut Pass) {
        let mut worklist = vec![(start, flags)];
        while let Some((node, gained)) = worklist.pop() {
            let Some(data) = self.nodes.get_mut(node) else {
                continue;
            };
            let old = data.aggregate;
            let next = old.union(gained);
            if next == old {
                continue;
            }
            data.aggregate = next;
            pass.record(node, old);
            let parents: SmallVec<[NodeId; 4]> = data.parents.iter().map(|l| l.node).collect();
            for parent in parents {
                if let Some(parent_data) = self.nodes.get_mut(parent) {
                    parent_data.counters.shift(old, next);
                    worklist.push((parent, next));
                }
            }
        }
    }

    /// Least fixed point over the whole upward closure of `start`.
    fn recompute_closure(&mut self, start: NodeId, pass: &mut Pass) {
        // Upward closure, start first.
        let mut members = vec![start];
        let mut position: FxHashMap<NodeId, usize> = fx_hash_map_with_capacity(8);
        position.insert(start, 0);
        let mut cursor = 0;
        while cursor < members.len() {
            let node = members[cursor];
            cursor += 1;
            let Some(data) = self.nodes.get(node) else {
                continue;
            };
            for link in &data.parents {
                if !position.contains_key(&link.node) && self.nodes.contains(link.node) {
                    position.insert(link.node, members.len());
                    members.push(link.node);
                }
            }
        }

        // Parent positions per member, and counters owed to members.
        let mut parents: Vec<SmallVec<[usize; 2]>> = Vec::with_capacity(members.len());
        let mut inside = vec![LinkCounters::default(); members.len()];
        for &node in &members {
            let mut up = SmallVec::new();
            if let Some(data) = self.nodes.get(node) {
                for link in &data.parents {
                    if let Some(&j) = position.get(&link.node) {
                        inside[j].add(data.aggregate);
                        up.push(j);
                    }
                }
            }
            parents.push(up);
        }

        // Seeds, then flood upward.
        let mut next = vec![Aggregate::EMPTY; members.len()];
        let mut worklist = Vec::new();
        for (i, &node) in members.iter().enumerate() {
            if let Some(data) = self.nodes.get(node) {
                next[i] = data.local_flags().union(data.counters.beyond(inside[i]));
                if !next[i].is_empty() {
                    worklist.push(i);
                }
            }
        }
        while let Some(i) = worklist.pop() {
            for &j in &parents[i] {
                let gained = next[i].without(next[j]);
                if !gained.is_empty() {
                    next[j] = next[j].union(gained);
                    worklist.push(j);
                }
            }
        }

        // Apply.
        for (i, &node) in members.iter().enumerate() {
            let Some(data) = self.nodes.get_mut(node) else {
                continue;
            };
            let old = data.aggregate;
            if old == next[i] {
                continue;
            }
            data.aggregate = next[i];
            pass.record(node, old);
            for &j in &parents[i] {
                if let Some(parent) = self.nodes.get_mut(members[j]) {
                    parent.counters.shift(old, next[i]);
                }
            }
        }
    }

    /// Raises `DirtyChanged` and `ValidationChanged` for every node whose
    /// aggregate differs from its value at the start of the pass.
    pub(crate) fn finish_pass(&mut self, pass: Pass) {
        for node in pass.order {
            let Some(data) = self.nodes.get(node) else {
                continue;
            };
            let before = pass.initial.get(&node).copied().unwrap_or_default();
            let after = data.aggregate;
            if before.is_dirty() != after.is_dirty() {
                self.raise(GraphEvent::DirtyChanged {
                    node,
                    is_dirty: after.is_dirty(),
                });
            }
            if before.summary() != after.summary() {
                self.raise(GraphEvent::ValidationChanged {
                    node,
                    summary: after.summary(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::registry::{PropertyRegistry, PropertySpec};
    use crate::subscription::Slot;
    use mg_core::{GraphConfig, ModelTypeId, Value, ValueType};

    fn graph() -> (ModelGraph, ModelTypeId) {
        let registry = Arc::new(PropertyRegistry::new());
        let ty = registry.register_type("Cell", None).unwrap();
        registry
            .register(ty, PropertySpec::new("Next", ValueType::Model(None)))
            .unwrap();
        registry
            .register(ty, PropertySpec::new("Other", ValueType::Model(None)))
            .unwrap();
        registry
            .register(ty, PropertySpec::new("Value", ValueType::Int))
            .unwrap();
        (ModelGraph::with_registry(registry, GraphConfig::default()), ty)
    }

    #[test]
    fn test_aggregate_bits() {
        let flags = Aggregate::from_parts(true, false, true);
        assert!(flags.is_dirty());
        assert_eq!(
            flags.summary(),
            ValidationSummary {
                has_errors: false,
                has_warnings: true
            }
        );
        assert_eq!(flags.without(Aggregate::from_parts(true, false, false)), Aggregate::from_parts(false, false, true));
    }

    #[test]
    fn test_counters_shift() {
        let mut counters = LinkCounters::default();
        counters.add(Aggregate::from_parts(true, true, false));
        counters.shift(Aggregate::from_parts(true, true, false), Aggregate::from_parts(false, true, true));
        assert_eq!(counters, LinkCounters([0, 1, 1]));
    }

    #[test]
    fn test_deep_chain_propagates_to_root() {
        let (mut graph, ty) = graph();
        let nodes: Vec<_> = (0..200).map(|_| graph.create(ty).unwrap()).collect();
        for pair in nodes.windows(2) {
            graph.set_value(pair[0], "Next", Value::Model(pair[1])).unwrap();
        }
        for &node in &nodes {
            graph.clear_dirty(node).unwrap();
        }
        assert!(!graph.is_dirty(nodes[0]).unwrap());

        let leaf = nodes[nodes.len() - 1];
        graph.set_value(leaf, "Value", Value::Int(1)).unwrap();
        assert!(nodes.iter().all(|&n| graph.is_dirty(n).unwrap()));

        graph.clear_dirty(leaf).unwrap();
        assert!(nodes.iter().all(|&n| !graph.is_dirty(n).unwrap()));
    }

    #[test]
    fn test_gained_flag_stops_at_flagged_ancestor() {
        let (mut graph, ty) = graph();
        let nodes: Vec<_> = (0..200).map(|_| graph.create(ty).unwrap()).collect();
        for pair in nodes.windows(2) {
            graph.set_value(pair[0], "Next", Value::Model(pair[1])).unwrap();
        }
        for &node in &nodes {
            graph.clear_dirty(node).unwrap();
        }

        let mut pass = Pass::default();
        graph.set_local_dirty(nodes[199], true, &mut pass);
        assert_eq!(pass.touched(), 200);

        let mut pass = Pass::default();
        graph.set_local_dirty(nodes[150], true, &mut pass);
        assert_eq!(pass.touched(), 0);

        let tail = graph.create(ty).unwrap();
        graph.set_value(tail, "Value", Value::Int(1)).unwrap();
        let slot = Slot::Property { name: "Other".into() };
        let mut pass = Pass::default();
        graph.attach(nodes[199], tail, slot.clone(), &mut pass);
        assert_eq!(pass.touched(), 0);
        assert!(graph.detach(nodes[199], tail, &slot, &mut pass));

        let mut pass = Pass::default();
        graph.set_local_dirty(nodes[199], false, &mut pass);
        assert_eq!(pass.touched(), 49);
        assert!(graph.is_dirty(nodes[0]).unwrap());
        assert!(graph.is_dirty(nodes[150]).unwrap());
        assert!(!graph.is_dirty(nodes[151]).unwrap());
    }

    #[test]
    fn test_cycle_clears_when_no_local_dirty() {
        let (mut graph, ty) = graph();
        let a = graph.create(ty).unwrap();
        let b = graph.create(ty).unwrap();
        graph.set_value(a, "Next", Value::Model(b)).unwrap();
        graph.set_value(b, "Next", Value::Model(a)).unwrap();
        assert!(graph.is_dirty(a).unwrap());

        graph.clear_dirty(a).unwrap();
        assert!(graph.is_dirty(a).unwrap(), "b is still locally dirty");
        graph.clear_dirty(b).unwrap();
        assert!(!graph.is_dirty(a).unwrap());
        assert!(!graph.is_dirty(b).unwrap());
    }

    #[test]
    fn test_diamond_counts_each_link() {
        let (mut graph, ty) = graph();
        let top = graph.create(ty).unwrap();
        let left = graph.create(ty).unwrap();
        let right = graph.create(ty).unwrap();
        let bottom = graph.create(ty).unwrap();
        graph.set_value(top, "Next", Value::Model(left)).unwrap();
        graph.set_value(top, "Other", Value::Model(right)).unwrap();
        graph.set_value(left, "Next", Value::Model(bottom)).unwrap();
        graph.set_value(right, "Next", Value::Model(bottom)).unwrap();
        for node in [top, left, right] {
            graph.clear_dirty(node).unwrap();
        }
        assert!(graph.is_dirty(top).unwrap());

        graph.clear_dirty(bottom).unwrap();
        assert!(!graph.is_dirty(top).unwrap());

        graph.set_value(bottom, "Value", Value::Int(5)).unwrap();
        graph.set_value(left, "Next", Value::Null).unwrap();
        graph.clear_dirty(left).unwrap();
        assert!(!graph.is_dirty(left).unwrap());
        assert!(graph.is_dirty(right).unwrap());
        assert!(graph.is_dirty(top).unwrap());
    }
}
