//! Implements the LRU eviction policy.
//!
//! Unlike a plain entry-count LRU, every entry carries a weight reported by [`Weighted`], and the
//! cache evicts from the cold end until the total weight fits the configured capacity. Evicted
//! entries are handed back to the caller instead of being dropped silently, because owners of
//! cached data usually have bookkeeping to undo when an entry goes away.

use std::hash::Hash;

use hashlink::LinkedHashMap;

/// Values that report how much of the cache budget they consume.
pub trait Weighted {
    /// Returns the cost of keeping this value cached. Must be at least 1.
    fn weight(&self) -> usize;
}

/// An entry pushed out of a [`WeightedLru`], in eviction order (coldest first).
pub type Evicted<K, V> = Vec<(K, V)>;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    /// Weight recorded when the value was last written.
    weight: usize,
}

/// A size-bounded least-recently-used map.
///
/// The ordered key map keeps the coldest key at the front. Every read through [`get`](Self::get)
/// or write through [`upsert`](Self::upsert) moves the key to the back.
#[derive(Debug)]
pub struct WeightedLru<K, V> {
    ordered_key_map: LinkedHashMap<K, Slot<V>>,
    total_weight: usize,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Weighted> WeightedLru<K, V> {
    /// Creates an empty cache that holds at most `capacity` units of weight.
    ///
    /// The most recently touched entry is never evicted, so a single entry heavier than
    /// `capacity` is still retained until something else is touched.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ordered_key_map: LinkedHashMap::new(),
            total_weight: 0,
            capacity: capacity.max(1),
        }
    }

    /// Returns the configured weight budget.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the sum of the weights of all cached entries.
    #[must_use]
    pub fn total_weight(&self) -> usize {
        self.total_weight
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered_key_map.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered_key_map.is_empty()
    }

    /// Reads a value without affecting recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.ordered_key_map.get(key).map(|slot| &slot.value)
    }

    /// Mutably borrows a value without affecting recency.
    ///
    /// The caller must not change the value's weight through this borrow; use
    /// [`upsert`](Self::upsert) for mutations that grow or shrink an entry.
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut V> {
        self.ordered_key_map.get_mut(key).map(|slot| &mut slot.value)
    }

    /// Reads a value and marks it as the most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = self.ordered_key_map.remove(key)?;
        self.ordered_key_map.insert(key.clone(), slot);
        self.ordered_key_map.get(key).map(|slot| &slot.value)
    }

    /// Mutates the value for `key` in place, creating it with `init` first when it is not cached.
    /// The entry is re-weighed, marked most recently used, and cold entries are evicted if it grew
    /// past the budget.
    #[must_use = "evicted entries usually need cleanup"]
    pub fn upsert<R>(
        &mut self,
        key: K,
        init: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> (R, Evicted<K, V>) {
        let mut slot = self.ordered_key_map.remove(&key).unwrap_or_else(|| {
            let value = init();
            let weight = value.weight();
            self.total_weight += weight;
            Slot { value, weight }
        });
        let out = f(&mut slot.value);
        let weight = slot.value.weight();
        self.total_weight = self.total_weight - slot.weight + weight;
        slot.weight = weight;
        self.ordered_key_map.insert(key, slot);
        (out, self.evict_over_budget())
    }

    fn evict_over_budget(&mut self) -> Evicted<K, V> {
        let mut evicted = Vec::new();
        while self.total_weight > self.capacity && self.ordered_key_map.len() > 1 {
            let Some((key, slot)) = self.ordered_key_map.pop_front() else {
                break;
            };
            self.total_weight -= slot.weight;
            evicted.push((key, slot.value));
        }
        evicted
    }
}
