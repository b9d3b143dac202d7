//! Dense address assignment for symbol and macro tables.
//!
//! An [`AddressMap`] hands out addresses `0, 1, 2, ...` in assignment order
//! and answers both directions: address to key through a dense vector, key
//! to its first address through a chained hash table. Chain nodes live in
//! an arena and are recycled through a free list, so truncation and growth
//! never allocate per entry.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

const MIN_CAPACITY: usize = 8;
const DEFAULT_CAPACITY: usize = 64;
const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    hash: u32,
    address: usize,
    next: usize,
}

/// Bidirectional `address <-> key` table with append-only addresses.
///
/// `assign` always produces a new address, even for a key that is already
/// present; `get` returns the first address a key received.
#[derive(Clone)]
pub struct AddressMap<K> {
    keys: Vec<Option<K>>,
    len: usize,
    buckets: Vec<usize>,
    nodes: Vec<Node>,
    free_nodes: Vec<usize>,
    threshold: usize,
}

fn hash_of<K: Hash>(key: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let h = hasher.finish();
    let h = (h ^ (h >> 32)) as u32;
    (h ^ (h >> 16)) & i32::MAX as u32
}

fn threshold_for(capacity: usize) -> usize {
    capacity * 3 / 4 + 1
}

impl<K: Hash + Eq> Default for AddressMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq> AddressMap<K> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let mut keys = Vec::with_capacity(capacity);
        keys.resize_with(capacity, || None);
        Self {
            keys,
            len: 0,
            buckets: vec![NIL; capacity],
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            threshold: threshold_for(capacity),
        }
    }

    /// Number of assigned addresses.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Gives `key` the next address and returns it.
    pub fn assign(&mut self, key: K) -> usize {
        let hash = hash_of(&key);
        let address = self.len;
        if self.find(hash, &key).is_none() {
            self.link(hash, address);
        }
        self.push_key(key);
        address
    }

    /// Returns the first address assigned to `key`.
    pub fn get(&self, key: &K) -> Option<usize> {
        self.find(hash_of(key), key)
    }

    /// Returns the existing address of `key` or assigns a new one.
    pub fn get_or_assign(&mut self, key: K) -> usize {
        let hash = hash_of(&key);
        if let Some(address) = self.find(hash, &key) {
            return address;
        }
        let address = self.len;
        self.link(hash, address);
        self.push_key(key);
        address
    }

    /// Returns the key at `address`.
    pub fn key(&self, address: usize) -> Option<&K> {
        if address >= self.len {
            return None;
        }
        self.keys[address].as_ref()
    }

    /// Iterates keys in address order.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.keys[..self.len].iter().flatten()
    }

    /// Drops every address `>= n`; the next assignment receives `n`.
    pub fn truncate(&mut self, n: usize) {
        if n >= self.len {
            return;
        }
        for bucket in 0..self.buckets.len() {
            let mut prev = NIL;
            let mut cursor = self.buckets[bucket];
            while cursor != NIL {
                let next = self.nodes[cursor].next;
                if self.nodes[cursor].address >= n {
                    if prev == NIL {
                        self.buckets[bucket] = next;
                    } else {
                        self.nodes[prev].next = next;
                    }
                    self.free_nodes.push(cursor);
                } else {
                    prev = cursor;
                }
                cursor = next;
            }
        }
        for slot in &mut self.keys[n..self.len] {
            *slot = None;
        }
        self.len = n;
    }

    /// Removes every address.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Whether every address of `other` maps to an identical key here.
    pub fn is_extension_of(&self, other: &AddressMap<K>) -> bool {
        if self.len < other.len {
            return false;
        }
        (0..other.len)
            .rev()
            .all(|address| self.keys[address] == other.keys[address])
    }

    fn find(&self, hash: u32, key: &K) -> Option<usize> {
        let mut cursor = self.buckets[hash as usize % self.buckets.len()];
        while cursor != NIL {
            let node = &self.nodes[cursor];
            if node.hash == hash && self.keys[node.address].as_ref() == Some(key) {
                return Some(node.address);
            }
            cursor = node.next;
        }
        None
    }

    fn link(&mut self, hash: u32, address: usize) {
        let bucket = hash as usize % self.buckets.len();
        let node = Node {
            hash,
            address,
            next: self.buckets[bucket],
        };
        let index = match self.free_nodes.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.buckets[bucket] = index;
    }

    fn push_key(&mut self, key: K) {
        if self.len + 1 >= self.threshold {
            self.grow();
        }
        self.keys[self.len] = Some(key);
        self.len += 1;
    }

    fn grow(&mut self) {
        let capacity = self.buckets.len() + self.threshold + 1;
        tracing::trace!(from = self.buckets.len(), to = capacity, "address map grows");
        self.keys.resize_with(capacity, || None);
        let mut buckets = vec![NIL; capacity];
        // Relink the live nodes of every chain into the new buckets.
        for head in std::mem::take(&mut self.buckets) {
            let mut cursor = head;
            while cursor != NIL {
                let next = self.nodes[cursor].next;
                let bucket = self.nodes[cursor].hash as usize % capacity;
                self.nodes[cursor].next = buckets[bucket];
                buckets[bucket] = cursor;
                cursor = next;
            }
        }
        self.buckets = buckets;
        self.threshold = threshold_for(capacity);
    }
}

impl<K: PartialEq> PartialEq for AddressMap<K> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.keys[..self.len] == other.keys[..other.len]
    }
}

impl<K: Eq> Eq for AddressMap<K> {}

impl<K: Hash> Hash for AddressMap<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.keys[..self.len].hash(state);
    }
}

impl<K: fmt::Debug> fmt::Debug for AddressMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys[..self.len].iter()).finish()
    }
}

impl<K: Hash + Eq> FromIterator<K> for AddressMap<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity(iter.size_hint().0 * 2);
        for key in iter {
            map.assign(key);
        }
        map
    }
}

impl<K: Hash + Eq> Extend<K> for AddressMap<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for key in iter {
            self.assign(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Colliding(&'static str);

    impl Hash for Colliding {
        fn hash<H: Hasher>(&self, state: &mut H) {
            1u32.hash(state);
        }
    }

    fn letters() -> impl Iterator<Item = String> {
        ('a'..='z').map(|c| c.to_string())
    }

    #[test]
    fn get_missing() {
        let map = AddressMap::<String>::new();
        assert_eq!(map.get(&"foo".to_string()), None);
        assert_eq!(map.key(0), None);
    }

    #[test]
    fn duplicate_assign_keeps_first_address() {
        let mut map = AddressMap::new();
        assert_eq!(map.assign("foo"), 0);
        assert_eq!(map.assign("bar"), 1);
        assert_eq!(map.assign("foo"), 2);
        assert_eq!(map.get(&"foo"), Some(0));
        assert_eq!(map.key(2), Some(&"foo"));
        assert_eq!(map.get(&"bar"), Some(1));
    }

    #[test]
    fn many_duplicates_grow() {
        let mut map = AddressMap::with_capacity(8);
        for i in 0..66 {
            assert_eq!(map.assign("foo"), i);
        }
        assert!(map.capacity() > 66);
    }

    #[test]
    fn collisions_then_truncate() {
        let (foo, bar, baz) = (Colliding("foo"), Colliding("bar"), Colliding("baz"));
        let mut map = AddressMap::new();
        assert_eq!(map.assign(foo.clone()), 0);
        assert_eq!(map.assign(bar.clone()), 1);
        assert_eq!(map.assign(baz.clone()), 2);
        assert_eq!(map.get(&baz), Some(2));

        map.truncate(2);
        assert_eq!(map.get(&baz), None);
        assert_eq!(map.assign(foo.clone()), 2);
        assert_eq!(map.assign(bar.clone()), 3);
        assert_eq!(map.assign(baz.clone()), 4);
        assert_eq!(map.get(&foo), Some(0));
        assert_eq!(map.get(&bar), Some(1));
        assert_eq!(map.get(&baz), Some(4));
        assert_eq!(map.key(3), Some(&bar));
    }

    #[test]
    fn truncate_then_reassign() {
        let mut map: AddressMap<String> = letters().collect();
        map.truncate(10);
        for (i, c) in letters().enumerate() {
            if i < 10 {
                assert_eq!(map.get(&c), Some(i));
            } else {
                assert_eq!(map.get(&c), None);
                assert_eq!(map.key(i), None);
            }
        }
        for (i, c) in letters().enumerate() {
            assert_eq!(map.assign(c), i + 10);
        }
        assert_eq!(map.get(&"j".to_string()), Some(9));
        assert_eq!(map.key(19), Some(&"j".to_string()));
        assert_eq!(map.get(&"k".to_string()), Some(20));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut map: AddressMap<String> = letters().collect();
        map.clear();
        assert!(map.is_empty());
        assert!(letters().all(|c| map.get(&c).is_none()));
    }

    #[test]
    fn extension() {
        let a: AddressMap<String> = letters().collect();
        let b: AddressMap<String> = letters().take(25).collect();
        assert!(a.is_extension_of(&a));
        assert!(a.is_extension_of(&b));
        assert!(!b.is_extension_of(&a));
        let c: AddressMap<String> = letters().collect();
        assert_eq!(a, c);
    }
}
