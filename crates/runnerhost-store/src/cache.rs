//! Read-through cache for hot records, backed by [`moka`].
//!
//! The runner registry asks for the same handful of runner records on
//! every capability query; [`CacheLayer`] keeps them in memory with a TTL
//! and counts hits and misses.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::error::StoreResult;

/// Hit and miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served from memory, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} rate={:.1}%",
            self.hits(),
            self.misses(),
            self.hit_rate() * 100.0
        )
    }
}

/// A named, TTL-bounded cache of `T` keyed by string id.
pub struct CacheLayer<T> {
    name: &'static str,
    inner: Cache<String, T>,
    stats: Arc<CacheStats>,
}

impl<T> Clone for CacheLayer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: self.inner.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> CacheLayer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn builder(name: &'static str) -> CacheLayerBuilder<T> {
        CacheLayerBuilder {
            name,
            max_capacity: 1_024,
            ttl: Duration::from_secs(300),
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let found = self.inner.get(key).await;
        if found.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        debug!(cache = self.name, key, hit = found.is_some(), "cache lookup");
        found
    }

    pub async fn insert(&self, key: &str, value: T) {
        self.inner.insert(key.to_string(), value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
        debug!(cache = self.name, key, "cache entry invalidated");
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Return the cached value or run `loader`, caching only `Some` results.
    pub async fn get_or_load<F, Fut>(&self, key: &str, loader: F) -> StoreResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<Option<T>>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(Some(hit));
        }
        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.insert(key, value.clone()).await;
        }
        Ok(loaded)
    }
}

/// Builder for [`CacheLayer`].
pub struct CacheLayerBuilder<T> {
    name: &'static str,
    max_capacity: u64,
    ttl: Duration,
    _marker: PhantomData<T>,
}

impl<T> CacheLayerBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn max_capacity(mut self, cap: u64) -> Self {
        self.max_capacity = cap;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> CacheLayer<T> {
        debug!(
            name = self.name,
            max_capacity = self.max_capacity,
            ttl_secs = self.ttl.as_secs(),
            "cache layer created"
        );
        CacheLayer {
            name: self.name,
            inner: Cache::builder()
                .max_capacity(self.max_capacity)
                .time_to_live(self.ttl)
                .build(),
            stats: Arc::new(CacheStats::default()),
        }
    }
}
