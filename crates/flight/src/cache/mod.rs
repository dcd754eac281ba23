use std::hash::Hash;

pub mod ttl;

/// Async key/value memo with its own expiry policy.
pub trait KVCache<K, V>: Clone + Send + Sync + 'static
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> impl Future<Output = Option<V>> + Send;

    fn invalidate(&self, key: &K) -> impl Future<Output = ()> + Send;

    fn set(&self, key: K, value: V) -> impl Future<Output = ()> + Send;

    fn invalidate_all(&self);
}
