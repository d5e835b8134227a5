//! Rolling Tenant Statistics
//!
//! Computes per-tenant health numbers for dashboards:
//!
//! - **write_rate**: readings created in the trailing write window, per second
//! - **read_latency_ms**: wall-clock time of an `avg` over the trailing latency
//!   window, i.e. how long a typical dashboard read takes right now
//! - **total_rows**: all readings the tenant owns
//!
//! ## Caching
//!
//! Every snapshot costs three storage round trips, so results are cached per
//! tenant in an LRU with a short TTL (default 2s). Within the TTL callers see
//! the same snapshot even if readings were inserted in between.
//!
//! Concurrent misses for the same tenant take a per-tenant refresh lock; the
//! first caller computes the snapshot and the rest reuse it from the cache
//! once the lock is released. The last holder of a refresh lock removes it,
//! so the lock table only holds tenants with a refresh in flight.
//!
//! ```text
//! stats(T) ──▶ cache hit? ──yes──▶ snapshot
//!                 │ no
//!                 ▼
//!          lock refresh(T) ──▶ cache hit? ──yes──▶ snapshot
//!                                  │ no
//!                                  ▼
//!                     count(5s), timed avg(10s), count(*) ──▶ cache.put
//! ```

use crate::config::StatsConfig;
use crate::error::Result;
use crate::store::{AggregateFn, ReadingStore, ScopedReadingStore};
use chrono::{DateTime, Utc};
use lru::LruCache;
use sensorhouse_metadata::TenantId;
use sensorhouse_observability::metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Point-in-time statistics for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStats {
    pub write_rate: f64,
    pub read_latency_ms: f64,
    pub total_rows: u64,
    pub computed_at: DateTime<Utc>,
}

/// Cache entry with TTL
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn value(&self) -> &T {
        &self.value
    }
}

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct StatsCacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl StatsCacheMetrics {
    /// Hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Reset all counters (useful for testing)
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

pub struct StatsAggregator {
    readings: ReadingStore,
    config: StatsConfig,
    cache: RwLock<LruCache<TenantId, CacheEntry<TenantStats>>>,
    refresh_locks: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
    metrics: StatsCacheMetrics,
}

impl StatsAggregator {
    pub fn new(readings: ReadingStore, config: StatsConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            readings,
            config,
            cache: RwLock::new(LruCache::new(capacity)),
            refresh_locks: Mutex::new(HashMap::new()),
            metrics: StatsCacheMetrics::default(),
        }
    }

    /// Statistics for `tenant`, served from cache when fresh.
    ///
    /// # Errors
    ///
    /// - `MissingTenantContext`: No tenant identifier; the cache is not consulted
    pub async fn stats(&self, tenant: Option<&str>) -> Result<TenantStats> {
        let scoped = self.readings.scope(tenant)?;
        let tenant_id = scoped.tenant_id().clone();

        if let Some(stats) = self.cached(&tenant_id).await {
            return Ok(stats);
        }

        let lock = self.refresh_lock(&tenant_id).await;
        let result = self.refresh(&scoped, &lock).await;
        self.release_refresh_lock(&tenant_id, lock).await;
        result
    }

    async fn refresh(&self, scoped: &ScopedReadingStore, lock: &Mutex<()>) -> Result<TenantStats> {
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(stats) = self.cached(scoped.tenant_id()).await {
            return Ok(stats);
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        metrics::STATS_CACHE_MISSES_TOTAL.inc();

        let stats = self.compute(scoped).await?;
        self.cache.write().await.put(
            scoped.tenant_id().clone(),
            CacheEntry::new(stats.clone(), self.config.cache_ttl()),
        );

        Ok(stats)
    }

    async fn cached(&self, tenant_id: &TenantId) -> Option<TenantStats> {
        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.get(tenant_id) {
            if !entry.is_expired() {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                metrics::STATS_CACHE_HITS_TOTAL.inc();
                tracing::trace!(tenant = %tenant_id, "Stats cache hit");
                return Some(entry.value().clone());
            }
            // Expired - remove from cache
            cache.pop(tenant_id);
        }
        None
    }

    async fn refresh_lock(&self, tenant_id: &TenantId) -> Arc<Mutex<()>> {
        self.refresh_locks
            .lock()
            .await
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the table entry once nobody but the table and `lock` holds it.
    async fn release_refresh_lock(&self, tenant_id: &TenantId, lock: Arc<Mutex<()>>) {
        let mut locks = self.refresh_locks.lock().await;
        let idle = locks
            .get(tenant_id)
            .map_or(false, |held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) <= 2);
        if idle {
            locks.remove(tenant_id);
        }
    }

    async fn compute(&self, scoped: &ScopedReadingStore) -> Result<TenantStats> {
        let write_window = self.config.write_rate_window();
        let recent = scoped
            .aggregate(write_window, AggregateFn::Count)
            .await?
            .unwrap_or(0.0);
        let write_rate = round2(recent / write_window.as_secs_f64());

        let start = Instant::now();
        scoped
            .aggregate(self.config.latency_window(), AggregateFn::Avg)
            .await?;
        let read_latency_ms = round2(start.elapsed().as_secs_f64() * 1000.0);

        let total_rows = scoped.count().await?;

        tracing::debug!(
            tenant = %scoped.tenant_id(),
            write_rate,
            read_latency_ms,
            total_rows,
            "Stats computed"
        );

        Ok(TenantStats {
            write_rate,
            read_latency_ms,
            total_rows,
            computed_at: Utc::now(),
        })
    }

    /// Drop the cached snapshot of one tenant.
    pub async fn invalidate(&self, tenant_id: &TenantId) {
        self.cache.write().await.pop(tenant_id);
        self.refresh_locks.lock().await.remove(tenant_id);
    }

    /// Clear all cached snapshots (useful for testing)
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub fn metrics(&self) -> &StatsCacheMetrics {
        &self.metrics
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
