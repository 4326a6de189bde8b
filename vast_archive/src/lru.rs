//! A minimal, synchronous LRU cache keyed by segment UUID (spec.md §4.3: "an LRU cache mapping
//! `segment_uuid -> segment` with a configurable capacity and an on-evict hook").
//!
//! Grounded on the shape of `cache_system::backend::CacheBackend` (get/insert by key), simplified
//! down to a synchronous map since the archive's read path does plain blocking disk I/O rather
//! than the async load-coalescing the teacher's cache driver provides.

use std::collections::VecDeque;
use std::hash::Hash;
use uuid::Uuid;

/// An LRU cache from [`Uuid`] to `V`, with a capacity-triggered eviction hook.
pub struct LruCache<V> {
    capacity: usize,
    entries: std::collections::HashMap<Uuid, V>,
    recency: VecDeque<Uuid>,
    on_evict: Box<dyn Fn(Uuid, V) + Send + Sync>,
}

impl<V> LruCache<V> {
    /// A cache holding at most `capacity` entries; `on_evict` is called with the evicted key and
    /// value whenever insertion would exceed that capacity (spec.md §4.3 assumes this hook is
    /// pure: no I/O).
    pub fn new(capacity: usize, on_evict: impl Fn(Uuid, V) + Send + Sync + 'static) -> Self {
        Self {
            capacity,
            entries: std::collections::HashMap::new(),
            recency: VecDeque::new(),
            on_evict: Box::new(on_evict),
        }
    }

    /// Look up `key`, marking it most-recently-used on a hit.
    pub fn get(&mut self, key: &Uuid) -> Option<&V>
    where
        V: Clone,
    {
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
        cache.get(&a); // a is now most-recently-used; b is the LRU entry
        cache.insert(c, "c"); // evicts b

        assert_eq!(*evicted.lock(), vec![b]);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&c).is_some());
        assert!(cache.get(&b).is_none());
    }
}
