//! Fixed-capacity least-recently-used cache.
//!
//! Entries live in a slab of nodes threaded into a doubly linked recency
//! list, with a key → slot map on top. The head is the most recently used
//! entry and the tail is the next to be evicted, so `get`, `set` and
//! `delete` are O(1). `get` and `set` refresh recency; `has` and iteration
//! do not.

use serde_json::Value;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// Bounded LRU cache.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity.min(1024)),
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.node(idx).map(|node| &node.value)
    }

    /// Insert or update `key`.
    ///
    /// Inserting a new key into a full cache first evicts the least recently
    /// used entry, which is returned.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = self.node_mut(idx) {
                node.value = value;
            }
            self.move_to_front(idx);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.remove_slot(self.tail)
        } else {
            None
        };

        let node = Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            },
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            },
        };
        self.map.insert(key, idx);
        self.push_front(idx);
        evicted
    }

    /// Whether `key` is present. Does not affect recency.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Remove `key`, returning its value.
    pub fn delete<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.remove_slot(idx).map(|(_, value)| value)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate entries in internal map order, which is not recency order.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map
            .iter()
            .filter_map(|(key, &idx)| self.node(idx).map(|node| (key, &node.value)))
    }

    /// Iterate entries from least to most recently used.
    pub fn iter_by_recency(&self) -> impl Iterator<Item = (&K, &V)> {
        std::iter::successors(self.node(self.tail), |node| self.node(node.prev))
            .map(|node| (&node.key, &node.value))
    }

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn push_front(&mut self, idx: usize) {
        let head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = NIL;
            node.next = head;
        }
        match self.node_mut(head) {
            Some(old_head) => old_head.prev = idx,
            None => self.tail = idx,
        }
        self.head = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.node(idx).map(|node| (node.prev, node.next)) else {
            return;
        };
        match self.node_mut(prev) {
            Some(node) => node.next = next,
            None => self.head = next,
        }
        match self.node_mut(next) {
            Some(node) => node.prev = prev,
            None => self.tail = prev,
        }
    }

    fn remove_slot(&mut self, idx: usize) -> Option<(K, V)> {
        self.unlink(idx);
        let node = self.nodes.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + SizeEstimate,
    V: SizeEstimate,
{
    /// Rough memory footprint of keys and values. Advisory only.
    #[must_use]
    pub fn memory_estimate(&self) -> usize {
        self.entries()
            .map(|(k, v)| k.estimated_size() + v.estimated_size())
            .sum()
    }
}

/// Byte-size heuristic used by [`LruCache::memory_estimate`].
///
/// Strings count two bytes per UTF-16 unit, numbers eight bytes, and
/// structured values twice the length of their JSON encoding.
pub trait SizeEstimate {
    /// Approximate size in bytes.
    fn estimated_size(&self) -> usize;
}

impl SizeEstimate for String {
    fn estimated_size(&self) -> usize {
        self.as_str().estimated_size()
    }
}

impl SizeEstimate for str {
    fn estimated_size(&self) -> usize {
        self.encode_utf16().count() * 2
    }
}

macro_rules! numeric_size {
    ($($t:ty),*) => {
        $(impl SizeEstimate for $t {
            fn estimated_size(&self) -> usize {
                8
            }
        })*
    };
}

numeric_size!(u32, u64, usize, i32, i64, f32, f64);

impl SizeEstimate for Value {
    fn estimated_size(&self) -> usize {
        match self {
            Self::String(s) => s.estimated_size(),
            Self::Number(_) => 8,
            other => other.to_string().len() * 2,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_get_protects_from_eviction() {
        // Given: A full cache of capacity 2
        let mut cache = LruCache::new(2);
        cache.set("A", 1);
        cache.set("B", 2);

        // When: A is read, then C is inserted
        assert_eq!(cache.get("A"), Some(&1));
        let evicted = cache.set("C", 3);

        // Then: B was the least recently used and is gone
        assert_eq!(evicted, Some(("B", 2)));
        assert!(cache.has("A"));
        assert!(cache.has("C"));
        assert!(!cache.has("B"));
    }

    #[test]
    fn test_insertion_order_eviction_without_access() {
        let mut cache = LruCache::new(3);
        for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
            cache.set(key, i);
        }
        assert!(!cache.has("a"));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_update_refreshes_recency_without_eviction() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert!(cache.set("a", 10).is_none());
        cache.set("c", 3);

        assert_eq!(cache.get("a"), Some(&10));
        assert!(!cache.has("b"));
    }

    #[test]
    fn test_has_does_not_touch_recency() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert!(cache.has("a"));
        cache.set("c", 3);
        assert!(!cache.has("a"));
    }

    #[test]
    fn test_delete_and_clear() {
        let mut cache = LruCache::new(4);
        cache.set("a".to_string(), "x".to_string());
        cache.set("b".to_string(), "y".to_string());

        assert_eq!(cache.delete("a"), Some("x".to_string()));
        assert_eq!(cache.delete("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.iter_by_recency().count(), 0);
    }

    #[test]
    fn test_deleted_slots_are_reused_in_order() {
        let mut cache = LruCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        cache.delete("b");
        cache.set("d", 4);
        cache.get("a");

        let keys: Vec<_> = cache.iter_by_recency().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["c", "d", "a"]);
        assert_eq!(cache.set("e", 5), Some(("c", 3)));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = LruCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set(1, 1);
        cache.set(2, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.has(&2));
    }

    #[test]
    fn test_iter_by_recency_orders_oldest_first() {
        let mut cache = LruCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        cache.get("a");

        let keys: Vec<_> = cache.iter_by_recency().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_memory_estimate() {
        let mut cache = LruCache::new(4);
        cache.set("ab".to_string(), "héllo".to_string());
        // 2 UTF-16 units + 5 UTF-16 units, two bytes each
        assert_eq!(cache.memory_estimate(), 14);

        let mut numbers: LruCache<u64, f64> = LruCache::new(2);
        numbers.set(1, 2.0);
        assert_eq!(numbers.memory_estimate(), 16);

        let json = serde_json::json!({"a": 1});
        assert_eq!(json.estimated_size(), json.to_string().len() * 2);
    }

    proptest! {
        #[test]
        fn test_never_exceeds_capacity(
            capacity in 1usize..16,
            ops in prop::collection::vec((0u8..32, any::<bool>()), 0..200),
        ) {
            let mut cache = LruCache::new(capacity);
            for (key, read) in ops {
                if read {
                    cache.get(&key);
                } else {
                    cache.set(key, u32::from(key));
                }
                prop_assert!(cache.len() <= capacity);
                prop_assert_eq!(cache.iter_by_recency().count(), cache.len());
            }
        }
    }
}
