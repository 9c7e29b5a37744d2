//! Shared Cache
//!
//! Lock-guarded cache handle for concurrent request handlers, with coalesced
//! computation of missing values and the periodic prune.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

use crate::cache::{BoundedCache, CacheStats, RemovalCause, SetOptions, SizeEstimate};
use crate::tasks::{spawn_periodic, PeriodicTask};

type InFlight<K, V> = Arc<Mutex<HashMap<K, Arc<OnceCell<V>>>>>;

/// Cloneable handle to a cache shared across tasks.
#[derive(Debug)]
pub struct SharedCache<K, V> {
    cache: Arc<RwLock<BoundedCache<K, V>>>,
    /// Computations currently running, keyed by the entry they will fill
    in_flight: InFlight<K, V>,
    pruner: Arc<Mutex<Option<PeriodicTask>>>,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            in_flight: self.in_flight.clone(),
            pruner: self.pruner.clone(),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + SizeEstimate + Send + Sync + 'static,
{
    /// Wraps a cache for shared use.
    pub fn new(cache: BoundedCache<K, V>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(cache)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            pruner: Arc::new(Mutex::new(None)),
        }
    }

    /// See [`BoundedCache::set`].
    pub async fn set(&self, key: K, value: V, options: SetOptions) -> bool {
        self.cache.write().await.set(key, value, options)
    }

    /// See [`BoundedCache::get`].
    pub async fn get(&self, key: &K) -> Option<V> {
        self.cache.write().await.get(key)
    }

    /// See [`BoundedCache::has`].
    pub async fn has(&self, key: &K) -> bool {
        self.cache.write().await.has(key)
    }

    /// See [`BoundedCache::delete`].
    pub async fn delete(&self, key: &K) -> bool {
        self.cache.write().await.delete(key)
    }

    /// See [`BoundedCache::prune`].
    pub async fn prune(&self) -> usize {
        self.cache.write().await.prune()
    }

    /// See [`BoundedCache::invalidate_version`].
    pub async fn invalidate_version(&self, version: &str) -> usize {
        self.cache.write().await.invalidate_version(version)
    }

    /// See [`BoundedCache::evict_entries`].
    pub async fn evict_entries(&self, bytes_needed: u64) -> usize {
        self.cache.write().await.evict_entries(bytes_needed)
    }

    /// See [`BoundedCache::clear`].
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// See [`BoundedCache::stats`].
    pub async fn stats(&self) -> CacheStats {
        self.cache.read().await.stats()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Returns true if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// See [`BoundedCache::set_removal_listener`].
    pub async fn set_removal_listener<F>(&self, listener: F)
    where
        F: Fn(&K, &V, RemovalCause) + Send + Sync + 'static,
    {
        self.cache.write().await.set_removal_listener(listener);
    }

    // == Get Or Compute ==
    /// Returns the cached value, or runs `compute` and caches its result.
    ///
    /// Concurrent callers missing on the same key share one computation:
    /// the first runs `compute`, the rest wait for its value. A failed
    /// computation is not cached and its error goes only to the caller that
    /// ran it; waiting callers then compute for themselves.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: K,
        options: SetOptions,
        compute: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }

        let cell = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();

        let mut computed = false;
        let outcome = cell
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await
            .cloned();

        if computed {
            if let Ok(value) = &outcome {
                let stored = self
                    .cache
                    .write()
                    .await
                    .try_set(key.clone(), value.clone(), options);
                if !stored.valid {
                    debug!("Computed value not cached: {}", stored.message);
                }
            }
            self.finish(&key, &cell);
        } else {
            debug!("Joined in-flight cache computation");
        }
        outcome
    }

    /// Drops the in-flight marker for `key` if it still belongs to `cell`.
    fn finish(&self, key: &K, cell: &Arc<OnceCell<V>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
        {
            in_flight.remove(key);
        }
    }

    // == Periodic Prune ==
    /// Starts the background prune at the configured interval.
    ///
    /// Does nothing if pruning is already running.
    pub async fn start_pruning(&self) {
        let interval = self.cache.read().await.config().prune_interval;
        let mut pruner = self.pruner.lock().unwrap_or_else(PoisonError::into_inner);
        if pruner.as_ref().is_some_and(PeriodicTask::is_running) {
            return;
        }

        let cache = self.cache.clone();
        *pruner = Some(spawn_periodic("cache prune", interval, move || {
            let cache = cache.clone();
            async move { cache.write().await.prune() }
        }));
    }

    /// Returns true while the background prune is running.
    pub fn is_pruning(&self) -> bool {
        self.pruner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    // == Destroy ==
    /// Stops the prune timer and empties the cache. Safe to call more than once.
    pub async fn destroy(&self) {
        let task = self
            .pruner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.stop();
        }
        self.clear().await;
        info!("Cache destroyed");
    }
}
