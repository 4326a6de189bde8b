//! A minimal, synchronous LRU cache keyed by partition UUID (spec.md §4.5: "`passive`: LRU of
//! `(uuid, partition_actor)` holding sealed partitions in memory"), adapted from
//! `vast_archive::lru`'s cache shape.

use std::collections::VecDeque;
use uuid::Uuid;

/// An LRU cache from [`Uuid`] to `V`, with a capacity-triggered eviction hook.
pub struct LruCache<V> {
    capacity: usize,
    entries: std::collections::HashMap<Uuid, V>,
    recency: VecDeque<Uuid>,
    on_evict: Box<dyn Fn(Uuid, V) + Send + Sync>,
}

impl<V> LruCache<V> {
    /// A cache holding at most `capacity` entries; `on_evict` runs on the evicted key/value
    /// whenever insertion would exceed that capacity (spec.md §4.5: "the LRU's on-evict sends a
    /// stop signal to the partition actor").
    pub fn new(capacity: usize, on_evict: impl Fn(Uuid, V) + Send + Sync + 'static) -> Self {
        Self {
            capacity,
            entries: std::collections::HashMap::new(),
            recency: VecDeque::new(),
            on_evict: Box::new(on_evict),
        }
    }

    /// Number of entries currently resident.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key`, marking it most-recently-used on a hit.
    pub fn get(&mut self, key: &Uuid) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.touch(*key);
            self.entries.get(key)
        } else {
            None
        }
    }

    /// Insert `key -> value`, evicting the least-recently-used entry first if the cache is full.
    pub fn insert(&mut self, key: Uuid, value: V) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            self.touch(key);
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(lru_key) = self.recency.pop_front() {
                if let Some(evicted) = self.entries.remove(&lru_key) {
                    (self.on_evict)(lru_key, evicted);
                }
            }
        }
        self.entries.insert(key, value);
        self.recency.push_back(key);
    }

    /// Remove `key` without running the eviction hook, used when the partition is already known
    /// gone (e.g. explicitly retired).
    pub fn remove(&mut self, key: &Uuid) -> Option<V> {
        self.recency.retain(|k| k != key);
        self.entries.remove(key)
    }

    fn touch(&mut self, key: Uuid) {
        if let Some(pos) = self.recency.iter().position(|k| *k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn evicts_least_recently_used() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let evicted_clone = evicted.clone();
        let mut cache = LruCache::new(2, move |k, _v: &'static str| evicted_clone.lock().push(k));

        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        cache.insert(a, "a");
        cache.insert(b, "b");
        cache.get(&a);
        cache.insert(c, "c");

        assert_eq!(*evicted.lock(), vec![b]);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&c).is_some());
        assert!(cache.get(&b).is_none());
    }

    #[test]
    fn explicit_remove_skips_eviction_hook() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let evicted_clone = evicted.clone();
        let mut cache = LruCache::new(2, move |k, _v: &'static str| evicted_clone.lock().push(k));
        let a = Uuid::from_u128(1);
        cache.insert(a, "a");
        cache.remove(&a);
        assert!(evicted.lock().is_empty());
        assert!(cache.get(&a).is_none());
    }
}
