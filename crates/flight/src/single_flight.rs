use crate::error::Error;
use crate::key::RequestKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{self, BoxFuture, Shared};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// The caller's handle on a (possibly shared) request.
///
/// Dropping it does not cancel the underlying fetch.
pub type Flight<V, E> = BoxFuture<'static, Result<V, Error<E>>>;

type SharedFlight<V, E> = Shared<Flight<V, E>>;

#[derive(Debug, Clone)]
pub struct SingleFlightConfig {
    /// How long a settled entry keeps answering before it is evicted.
    pub grace_period: Duration,
}

impl Default for SingleFlightConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl SingleFlightConfig {
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Absent,
    Pending,
    Settled,
}

/// Lifetime counters, never reset.
#[derive(Debug, Default)]
pub struct FlightStats {
    leaders:   AtomicU64,
    joined:    AtomicU64,
    completed: AtomicU64,
    failed:    AtomicU64,
    evicted:   AtomicU64,
}

impl FlightStats {
    /// Requests that started a factory.
    pub fn leaders(&self) -> u64 {
        self.leaders.load(Ordering::Relaxed)
    }

    /// Requests that piggy-backed on an existing entry.
    pub fn joined(&self) -> u64 {
        self.joined.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Entries removed by `evict` or `clear`, not by the grace timer.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn dedup_ratio(&self) -> f64 {
        let leaders = self.leaders();
        let joined = self.joined();
        let total = leaders + joined;
        if total == 0 {
            0.0
        } else {
            joined as f64 / total as f64
        }
    }
}

struct InFlightEntry<V, E> {
    generation: u64,
    flight:     SharedFlight<V, E>,
    requests:   usize,
    settled:    bool,
}

struct Inner<K, V, E> {
    entries:         DashMap<K, InFlightEntry<V, E>>,
    next_generation: AtomicU64,
    stats:           FlightStats,
    config:          SingleFlightConfig,
}

impl<K: RequestKey, V, E> Inner<K, V, E> {
    fn mark_settled(&self, key: &K, generation: u64) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.generation == generation {
                entry.settled = true;
            }
        }
    }

    /// Grace timer expiry. A newer entry under the same key is left alone.
    fn expire(&self, key: &K, generation: u64) {
        match self
            .entries
            .remove_if(key, |_, entry| entry.generation == generation)
        {
            Some((_, entry)) => {
                debug!(key = ?key, requests = entry.requests, "request entry expired");
            }
            None => {
                trace!(key = ?key, generation, "grace timer found a newer entry or none");
            }
        }
    }
}

/// Collapses concurrent requests for the same key into one factory call.
///
/// Cloning is cheap and clones share the same entries. The factory runs on
/// the ambient tokio runtime, so `get` must be called from within one.
pub struct SingleFlightCache<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> Clone for SingleFlightCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> Default for SingleFlightCache<K, V, E>
where
    K: RequestKey,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(SingleFlightConfig::default())
    }
}

impl<K, V, E> SingleFlightCache<K, V, E>
where
    K: RequestKey,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(config: SingleFlightConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                next_generation: AtomicU64::new(0),
                stats: FlightStats::default(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SingleFlightConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &FlightStats {
        &self.inner.stats
    }

    /// Returns the shared result for `key`, starting `factory` only when no
    /// entry exists.
    ///
    /// Registration happens before this returns: a second `get` for the same
    /// key issued right after joins the first even if neither future has
    /// been polled yet.
    pub fn get<F, Fut>(&self, key: K, factory: F) -> Flight<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if let Err(e) = key.validate() {
            debug!(key = ?key, error = %e, "rejected request key");
            return future::ready(Err(Error::InvalidKey(e))).boxed();
        }
        let Ok(handle) = Handle::try_current() else {
            error!(key = ?key, "get called outside of a tokio runtime");
            return future::ready(Err(Error::NoRuntime)).boxed();
        };

        let (flight, launch) = match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.requests += 1;
                self.inner.stats.joined.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, requests = entry.requests, "joined in-flight request");
                (entry.flight.clone(), None)
            }
            Entry::Vacant(vacant) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel::<Result<V, E>>();
                let flight = rx
                    .map(|received| match received {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(Error::Factory(e)),
                        Err(_) => Err(Error::Aborted),
                    })
                    .boxed()
                    .shared();
                vacant.insert(InFlightEntry {
                    generation,
                    flight: flight.clone(),
                    requests: 1,
                    settled: false,
                });
                self.inner.stats.leaders.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, generation, "starting request");
                (flight, Some((generation, tx)))
            }
        };

        // The shard lock is released here; the factory may call back into the cache.
        if let Some((generation, tx)) = launch {
            handle.spawn(drive(Arc::clone(&self.inner), key, generation, factory, tx));
        }
        flight.boxed()
    }

    /// Drops the entry for `key` in whatever state it is in.
    ///
    /// Callers already holding its [`Flight`] still get its result; the next
    /// `get` starts a new factory.
    pub fn evict(&self, key: &K) -> bool {
        match self.inner.entries.remove(key) {
            Some((_, entry)) => {
                self.inner.stats.evicted.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, settled = entry.settled, "request entry evicted");
                true
            }
            None => false,
        }
    }

    /// Evicts every entry whose key matches, e.g. all pages of one record
    /// after it was written. Returns how many were dropped.
    pub fn evict_matching<P>(&self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let mut dropped = 0usize;
        self.inner.entries.retain(|key, _| {
            if predicate(key) {
                dropped += 1;
                false
            } else {
                true
            }
        });
        self.inner
            .stats
            .evicted
            .fetch_add(dropped as u64, Ordering::Relaxed);
        debug!(dropped, "request entries evicted by predicate");
        dropped
    }

    /// How many `get` calls the current entry for `key` has served; 0 if none.
    pub fn pending_count(&self, key: &K) -> usize {
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.requests)
            .unwrap_or(0)
    }

    pub fn state(&self, key: &K) -> FlightState {
        match self.inner.entries.get(key) {
            Some(entry) if entry.settled => FlightState::Settled,
            Some(_) => FlightState::Pending,
            None => FlightState::Absent,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn clear(&self) {
        let dropped = self.inner.entries.len();
        self.inner.entries.clear();
        self.inner
            .stats
            .evicted
            .fetch_add(dropped as u64, Ordering::Relaxed);
        debug!(dropped, "request cache cleared");
    }
}

async fn drive<K, V, E, F, Fut>(
    inner: Arc<Inner<K, V, E>>,
    key: K,
    generation: u64,
    factory: F,
    tx: oneshot::Sender<Result<V, E>>,
) where
    K: RequestKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    let outcome = AssertUnwindSafe(async move { factory().await })
        .catch_unwind()
        .await;

    inner.mark_settled(&key, generation);
    match outcome {
        Ok(result) => {
            if result.is_ok() {
                inner.stats.completed.fetch_add(1, Ordering::Relaxed);
            } else {
                inner.stats.failed.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, "request factory failed");
            }
            // Every waiter may already be gone.
            let _ = tx.send(result);
        }
        Err(_) => {
            inner.stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(key = ?key, "request factory panicked");
            drop(tx);
        }
    }

    tokio::time::sleep(inner.config.grace_period).await;
    inner.expire(&key, generation);
}
