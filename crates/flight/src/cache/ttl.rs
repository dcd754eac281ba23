use crate::cache::KVCache;
use moka::future::Cache;
use std::hash::Hash;
use std::{sync::Arc, time::Duration};

pub const DEFAULT_CAPACITY: u64 = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Bounded memo whose entries expire a fixed time after insertion.
pub struct TtlCache<K, V>(Arc<Cache<K, V>>);

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64, time_to_live: Duration) -> Self {
        Self(Arc::new(
            Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(time_to_live)
                .build(),
        ))
    }

    pub fn entry_count(&self) -> u64 {
        self.0.entry_count()
    }
}

impl<K, V> KVCache<K, V> for TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, k: &K) -> Option<V> {
        self.0.get(k).await
    }

    async fn invalidate(&self, k: &K) {
        self.0.invalidate(k).await;
    }

    async fn set(&self, key: K, value: V) {
        self.0.insert(key, value).await;
    }

    fn invalidate_all(&self) {
        self.0.invalidate_all();
    }
}
