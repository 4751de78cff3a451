use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

/// A cache the repository consults before hitting storage.
///
/// Values are cloned out; the repository caches inventories, which are
/// cheap to clone relative to a storage round-trip.
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    fn invalidate(&self, key: &K);
}

/// A cache that caches nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpCache;

impl<K: Send + Sync, V: Send + Sync> Cache<K, V> for NoOpCache {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn put(&self, _key: K, _value: V) {}

    fn invalidate(&self, _key: &K) {}
}

/// An unbounded in-memory cache.
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    map: RwLock<HashMap<K, V>>,
}

impl<K, V> MemoryCache<K, V> {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for MemoryCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.map.read().get(key).cloned()
    }

    fn put(&self, key: K, value: V) {
        self.map.write().insert(key, value);
    }

    fn invalidate(&self, key: &K) {
        self.map.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        cache.put("k".to_string(), 1);
        assert_eq!(cache.get(&"k".to_string()), Some(1));
        cache.invalidate(&"k".to_string());
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[test]
    fn noop_cache_never_hits() {
        let cache = NoOpCache;
        Cache::put(&cache, "k".to_string(), 1);
        assert_eq!(Cache::<String, i32>::get(&cache, &"k".to_string()), None);
    }
}
