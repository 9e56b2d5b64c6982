use alloc::{boxed::Box, vec::Vec};
use core::{borrow::Borrow, cell::OnceCell, fmt, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{Error, Links, Result, TreeNode, WavlTree};

/// An ordered map based on a [WAVL tree].
///
/// Besides the usual map operations, the map hands out its keys and values as sorted slices.
/// These are materialized on first request and discarded by any operation that modifies the
/// map.
///
/// [WAVL tree]: https://en.wikipedia.org/wiki/WAVL_tree
pub struct WavlMap<K: Ord + fmt::Debug, V> {
    tree: WavlTree<MapNode<K, V>>,
    keys: OnceCell<Vec<K>>,
    values: OnceCell<Vec<V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

impl<K, V> MapNode<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();

        // SAFETY: `ptr` is non-null, so the address of its field is as well.
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord + fmt::Debug, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K: Ord + fmt::Debug, V> WavlMap<K, V> {
    /// Creates a new, empty `WavlMap`.
    pub const fn new() -> Self {
        Self {
            tree: WavlTree::new(),
            keys: OnceCell::new(),
            values: OnceCell::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the height of the underlying tree.
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    ///
    /// This operation completes in _O(log(n))_ time and never modifies the map.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &node.get_ref().value)
    }

    /// Returns a mutable reference to the value associated with `key`.
    ///
    /// Discards the materialized values, if any, when `key` is present.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        // SAFETY: only the value is handed out; the links and the key stay untouched.
        let node = unsafe { self.tree.get_mut(key) }?;
        self.values.take();

        // SAFETY: Pinning is not structural for `node.value`.
        Some(unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Inserts a key-value pair into the map.
    ///
    /// Returns the number of rebalancing operations the insertion took. If the map already
    /// contains `key`, it is left unmodified and [`Error::DuplicateKey`] is returned.
    pub fn insert(&mut self, key: K, value: V) -> Result<usize> {
        let ops = self
            .tree
            .insert(MapNode::new(key, value))
            .map_err(|_| Error::DuplicateKey)?;

        self.invalidate();
        Ok(ops)
    }

    /// Removes `key` from the map, returning the number of rebalancing operations the removal
    /// took.
    ///
    /// If the map does not contain `key`, it is left unmodified and [`Error::KeyNotFound`] is
    /// returned.
    pub fn delete<Q>(&mut self, key: &Q) -> Result<usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (_, ops) = self.tree.remove(key).ok_or(Error::KeyNotFound)?;

        self.invalidate();
        Ok(ops)
    }

    /// Removes the value associated with `key` from the map.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (node, _) = self.tree.remove(key)?;

        self.invalidate();
        Some(node.value)
    }

    /// Returns the value associated with the minimum key in the map.
    ///
    /// This operation completes in _O(1)_ time.
    #[inline]
    pub fn min(&self) -> Option<&V> {
        self.tree.first().map(|node| &node.get_ref().value)
    }

    /// Returns the value associated with the maximum key in the map.
    ///
    /// This operation completes in _O(1)_ time.
    #[inline]
    pub fn max(&self) -> Option<&V> {
        self.tree.last().map(|node| &node.get_ref().value)
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        let node = self.tree.pop_first()?;

        self.invalidate();
        let MapNode { key, value, .. } = *node;
        Some((key, value))
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        let node = self.tree.pop_last()?;

        self.invalidate();
        let MapNode { key, value, .. } = *node;
        Some((key, value))
    }

    /// Returns an iterator over the entries of the map, sorted by key.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> + ExactSizeIterator + '_ {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Returns all keys in ascending order.
    ///
    /// The slice is built on first use and reused until the map is next modified.
    pub fn keys_in_order(&self) -> &[K]
    where
        K: Clone,
    {
        self.keys.get_or_init(|| {
            tracing::trace!(len = self.len(), "materializing keys");
            self.tree.iter().map(|node| node.key.clone()).collect()
        })
    }

    /// Returns all values, ordered by ascending key.
    ///
    /// The slice is built on first use and reused until the map is next modified.
    pub fn values_in_order(&self) -> &[V]
    where
        V: Clone,
    {
        self.values.get_or_init(|| {
            tracing::trace!(len = self.len(), "materializing values");
            self.tree.iter().map(|node| node.value.clone()).collect()
        })
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
        self.invalidate();
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();

        if let Some(keys) = self.keys.get() {
            assert!(keys.iter().eq(self.tree.iter().map(|node| &node.key)));
        }
    }

    // Discards the materialized key and value slices.
    fn invalidate(&mut self) {
        self.keys.take();
        self.values.take();
    }
}

impl<K: Ord + fmt::Debug, V> Default for WavlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for WavlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::{
        string::{String, ToString},
        vec::Vec,
    };

    use super::*;

    const SCENARIO: [i64; 12] = [3, 8, 1, 4, 6, 2, 10, 9, 20, 25, 15, 16];

    fn scenario_map() -> WavlMap<i64, String> {
        let mut map = WavlMap::new();

        for key in SCENARIO {
            map.insert(key, key.to_string()).expect("scenario keys are distinct");
            map.assert_invariants();
        }

        map
    }

    fn without(keys: &[i64], removed: &[i64]) -> Vec<i64> {
        keys.iter().copied().filter(|k| !removed.contains(k)).collect()
    }

    #[test]
    fn scenario_keys_in_order() {
        let map = scenario_map();

        assert_eq!(map.len(), 12);
        assert_eq!(
            map.keys_in_order(),
            &[1, 2, 3, 4, 6, 8, 9, 10, 15, 16, 20, 25]
        );

        let values: Vec<&str> = map.values_in_order().iter().map(String::as_str).collect();
        assert_eq!(
            values,
            ["1", "2", "3", "4", "6", "8", "9", "10", "15", "16", "20", "25"]
        );
    }

    #[test]
    fn scenario_deletions() {
        let mut map = scenario_map();
        let sorted = map.keys_in_order().to_vec();

        assert_eq!(map.get(&4).map(String::as_str), Some("4"));

        // Leaf.
        map.delete(&2).unwrap();
        map.assert_invariants();
        assert_eq!(map.len(), 11);
        assert_eq!(map.keys_in_order(), without(&sorted, &[2]));

        // One child, then two children.
        map.delete(&4).unwrap();
        map.assert_invariants();
        assert_eq!(map.keys_in_order(), without(&sorted, &[2, 4]));

        map.delete(&10).unwrap();
        map.assert_invariants();
        assert_eq!(map.len(), 9);
        assert_eq!(map.keys_in_order(), without(&sorted, &[2, 4, 10]));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut map = scenario_map();
        let keys = map.keys_in_order().to_vec();

        assert_eq!(map.insert(4, "four".to_string()), Err(Error::DuplicateKey));
        assert_eq!(map.get(&4).map(String::as_str), Some("4"));
        assert_eq!(map.len(), 12);
        assert_eq!(map.keys_in_order(), keys);
        map.assert_invariants();
    }

    #[test]
    fn delete_missing_is_rejected() {
        let mut map = scenario_map();

        assert_eq!(map.delete(&5), Err(Error::KeyNotFound));
        assert_eq!(map.len(), 12);
        map.assert_invariants();

        let mut empty: WavlMap<i64, ()> = WavlMap::new();
        assert_eq!(empty.delete(&0), Err(Error::KeyNotFound));
        assert!(empty.is_empty());
    }

    #[test]
    fn single_key_round_trip() {
        let mut map = WavlMap::new();

        assert_eq!(map.insert(7, "seven"), Ok(0));
        assert_eq!(map.min(), Some(&"seven"));
        assert_eq!(map.max(), Some(&"seven"));

        assert_eq!(map.delete(&7), Ok(0));
        assert!(map.is_empty());
        assert_eq!(map.min(), None);
        assert_eq!(map.max(), None);
        assert!(map.keys_in_order().is_empty());
        map.assert_invariants();
    }

    #[test]
    fn min_max_follow_mutations() {
        let mut map = scenario_map();

        assert_eq!(map.min().map(String::as_str), Some("1"));
        assert_eq!(map.max().map(String::as_str), Some("25"));

        map.delete(&1).unwrap();
        map.delete(&25).unwrap();
        assert_eq!(map.min().map(String::as_str), Some("2"));
        assert_eq!(map.max().map(String::as_str), Some("20"));

        map.insert(-5, "-5".to_string()).unwrap();
        map.insert(100, "100".to_string()).unwrap();
        assert_eq!(map.first_key_value().map(|(k, _)| *k), Some(-5));
        assert_eq!(map.last_key_value().map(|(k, _)| *k), Some(100));

        assert_eq!(map.pop_first().map(|(k, _)| k), Some(-5));
        assert_eq!(map.pop_last().map(|(k, _)| k), Some(100));
        assert_eq!(map.min().map(String::as_str), Some("2"));
        assert_eq!(map.max().map(String::as_str), Some("20"));
        map.assert_invariants();
    }

    #[test]
    fn lookups_do_not_mutate() {
        let map = scenario_map();
        let height = map.height();

        for key in -2..30 {
            let _ = map.get(&key);
            let _ = map.contains_key(&key);
        }

        assert_eq!(map.len(), 12);
        assert_eq!(map.height(), height);
        assert_eq!(map.min().map(String::as_str), Some("1"));
        assert_eq!(map.max().map(String::as_str), Some("25"));
        map.assert_invariants();
    }

    #[test]
    fn materialized_slices_are_invalidated() {
        let mut map: WavlMap<i64, i64> = WavlMap::new();
        map.insert(1, 10).unwrap();
        map.insert(2, 20).unwrap();

        assert_eq!(map.keys_in_order(), &[1, 2]);
        assert_eq!(map.values_in_order(), &[10, 20]);

        map.insert(0, 0).unwrap();
        assert_eq!(map.keys_in_order(), &[0, 1, 2]);
        assert_eq!(map.values_in_order(), &[0, 10, 20]);

        *map.get_mut(&1).unwrap() = 11;
        assert_eq!(map.values_in_order(), &[0, 11, 20]);

        assert_eq!(map.remove(&2), Some(20));
        assert_eq!(map.keys_in_order(), &[0, 1]);
        assert_eq!(map.values_in_order(), &[0, 11]);

        map.clear();
        assert!(map.keys_in_order().is_empty());
        assert!(map.values_in_order().is_empty());
    }

    #[test]
    fn failed_mutations_keep_materialized_slices() {
        let mut map: WavlMap<i64, i64> = WavlMap::new();
        map.insert(1, 10).unwrap();

        let before = map.keys_in_order().as_ptr();
        assert!(map.insert(1, 99).is_err());
        assert!(map.delete(&3).is_err());
        assert_eq!(map.keys_in_order().as_ptr(), before);
        assert_eq!(map.values_in_order(), &[10]);
    }

    #[test]
    fn get_mut_of_missing_key_keeps_materialized_values() {
        let mut map: WavlMap<i64, i64> = WavlMap::new();
        map.insert(1, 10).unwrap();

        let before = map.values_in_order().as_ptr();
        assert!(map.get_mut(&5).is_none());
        assert_eq!(map.values_in_order().as_ptr(), before);

        *map.get_mut(&1).unwrap() = 11;
        assert_eq!(map.values_in_order(), &[11]);
    }

    #[test]
    fn debug_lists_entries_in_order() {
        let mut map = WavlMap::new();
        map.insert(2, 'b').unwrap();
        map.insert(1, 'a').unwrap();

        assert_eq!(std::format!("{map:?}"), "{1: 'a', 2: 'b'}");
    }
}
