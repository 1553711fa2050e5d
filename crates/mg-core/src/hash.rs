//! Fx-hashed map and set aliases.
//!
//! Every map in the graph is keyed by small `Copy` handles or interned
//! property names, none of which are attacker controlled, so the graph uses
//! the Fx hasher from `rustc-hash` throughout.

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// Creates an [`FxHashMap`] able to hold `capacity` entries without
/// reallocating.
///
/// # Examples
///
/// ```
/// use mg_core::{NodeId, fx_hash_map_with_capacity};
///
/// let map: mg_core::FxHashMap<NodeId, u32> = fx_hash_map_with_capacity(16);
/// assert!(map.capacity() >= 16);
/// ```
#[inline]
#[must_use]
pub fn fx_hash_map_with_capacity<K, V>(capacity: usize) -> FxHashMap<K, V> {
    FxHashMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

/// Creates an [`FxHashSet`] able to hold `capacity` entries without
/// reallocating.
#[inline]
#[must_use]
pub fn fx_hash_set_with_capacity<V>(capacity: usize) -> FxHashSet<V> {
    FxHashSet::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeId, SlotHandle};

    #[test]
    fn test_handle_keys() {
        let mut map: FxHashMap<NodeId, &str> = fx_hash_map_with_capacity(4);
        map.insert(NodeId::from_parts(0, 0), "root");
        map.insert(NodeId::from_parts(0, 1), "recycled");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&NodeId::from_parts(0, 1)), Some(&"recycled"));
    }

    #[test]
    fn test_set_with_capacity() {
        let set: FxHashSet<NodeId> = fx_hash_set_with_capacity(32);
        assert!(set.capacity() >= 32);
        assert!(set.is_empty());
    }
}
