use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::ent_framework::entity::Entity;
use crate::infrastructure::database::Guid;

pub struct Cache<K, V> {
    inner: LruCache<K, V>,
}

impl<K: std::hash::Hash + Eq, V> Cache<K, V> {
    /// A capacity of 0 gives an unbounded cache
    pub fn new(capacity: usize) -> Self {
        let inner = match NonZeroUsize::new(capacity) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Cache { inner }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Process-local cache of fully materialized entities, keyed by guid.
///
/// Only the factory inserts; every mutation path calls [`EntityCache::invalidate`].
/// The lock is never held across a storage call.
#[derive(Clone)]
pub struct EntityCache {
    entities: Arc<Mutex<Cache<Guid, Entity>>>,
}

impl EntityCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entities: Arc::new(Mutex::new(Cache::new(capacity))),
        }
    }

    pub async fn get(&self, guid: Guid) -> Option<Entity> {
        self.entities.lock().await.get(&guid).cloned()
    }

    pub async fn put(&self, entity: Entity) {
        self.entities.lock().await.insert(entity.guid, entity);
    }

    pub async fn invalidate(&self, guid: Guid) {
        self.entities.lock().await.remove(&guid);
    }

    pub async fn contains(&self, guid: Guid) -> bool {
        self.entities.lock().await.contains(&guid)
    }

    pub async fn len(&self) -> usize {
        self.entities.lock().await.len()
    }

    pub async fn clear(&self) {
        self.entities.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let mut cache = Cache::new(0);
        for i in 0..5_000 {
            cache.insert(i, i * 2);
        }
        assert_eq!(cache.len(), 5_000);
        assert_eq!(cache.get(&0), Some(&0));
    }

    #[test]
    fn test_bounded_cache_evicts_least_recent() {
        let mut cache = Cache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        cache.insert("c", 3);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.remove(&"c"), Some(3));
    }
}
