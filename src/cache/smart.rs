//! Smart Cache Module
//!
//! Optional optimization layer over [`CacheManager`]: tracks per-key access
//! frequency, derives adaptive TTLs, and periodically resizes, trims and
//! preloads the managed caches. Nothing here is required for correctness;
//! every decision is a heuristic aimed at a better hit rate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::{current_timestamp, CacheKind, CacheManager, Prefetcher};

// == Thresholds ==
const INTERVAL_WINDOW: usize = 10;
const HIT_RATE_OBSERVATIONS: u64 = 5;
const FREQUENCY_CAP: f64 = 3.0;
const HOT_MIN_ACCESSES: u64 = 10;
const HOT_WINDOW_SECS: f64 = 600.0;
const COLD_AFTER_SECS: f64 = 3600.0;
const PRELOAD_MIN_ACCESSES: u64 = 5;
const PRELOAD_WINDOW_SECS: f64 = 300.0;
const TRIM_IDLE_SECS: f64 = 1800.0;
const TRIM_BATCH: usize = 10;
const REPORT_HIGH_ACCESS: u64 = 20;
const RECOMMEND_HOT: usize = 100;
const RECOMMEND_COLD: usize = 50;

/// Caches scanned when materializing recorded preload patterns.
const PRELOAD_KINDS: [CacheKind; 3] = [CacheKind::Db, CacheKind::User, CacheKind::Stats];

// == Adaptive Settings ==
/// Tunables for the smart layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveSettings {
    pub base_ttl_secs: f64,
    pub min_ttl_secs: f64,
    pub max_ttl_secs: f64,
    /// Resize caches from their hit rate on each cycle
    pub adaptive_resize: bool,
    pub grow_below_hit_rate: f64,
    pub shrink_above_hit_rate: f64,
    pub grow_step: usize,
    pub shrink_step: usize,
    pub max_capacity: usize,
    pub min_capacity: usize,
    /// Estimated size above which idle keys are trimmed
    pub memory_limit_mb: f64,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            base_ttl_secs: 300.0,
            min_ttl_secs: 60.0,
            max_ttl_secs: 3600.0,
            adaptive_resize: true,
            grow_below_hit_rate: 0.5,
            shrink_above_hit_rate: 0.9,
            grow_step: 100,
            shrink_step: 50,
            max_capacity: 2000,
            min_capacity: 100,
            memory_limit_mb: 50.0,
        }
    }
}

// == Cache Metrics ==
/// Access history for one key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheMetrics {
    pub access_count: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Unix seconds of the latest access, 0 when never accessed
    pub last_access: f64,
    /// Mean of the recent inter-access intervals, 0 when unknown
    pub avg_access_interval: f64,
    #[serde(skip)]
    intervals: VecDeque<f64>,
}

impl CacheMetrics {
    fn record_access(&mut self, now: f64) {
        self.access_count += 1;
        if self.last_access > 0.0 {
            self.intervals.push_back(now - self.last_access);
            if self.intervals.len() > INTERVAL_WINDOW {
                self.intervals.pop_front();
            }
            self.avg_access_interval =
                self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
        }
        self.last_access = now;
    }

    pub fn hit_rate(&self) -> f64 {
        if self.access_count == 0 {
            0.0
        } else {
            self.hit_count as f64 / self.access_count as f64
        }
    }

    pub fn idle_secs(&self, now: f64) -> f64 {
        now - self.last_access
    }
}

/// Adaptive TTL in seconds for a key with the given history.
fn adaptive_ttl_secs(metrics: &CacheMetrics, settings: &AdaptiveSettings) -> f64 {
    let mut ttl = settings.base_ttl_secs;

    if metrics.avg_access_interval > 0.0 {
        ttl *= FREQUENCY_CAP.min(3600.0 / metrics.avg_access_interval);
    }

    if metrics.access_count >= HIT_RATE_OBSERVATIONS {
        let hit_rate = metrics.hit_rate();
        if hit_rate > 0.8 {
            ttl *= 1.5;
        } else if hit_rate < 0.3 {
            ttl *= 0.7;
        }
    }

    ttl.clamp(settings.min_ttl_secs, settings.max_ttl_secs)
}

// == Reports ==
/// Capacity change applied by one optimization cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityChange {
    pub cache: CacheKind,
    pub from: usize,
    pub to: usize,
}

/// What one optimization cycle observed and did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizationCycle {
    pub hot_keys: Vec<String>,
    pub cold_keys: Vec<String>,
    pub preloaded: usize,
    pub resized: Vec<CapacityChange>,
    pub expired_removed: usize,
    pub trimmed: usize,
    /// Cold keys whose metrics were dropped because no cache holds them
    pub pruned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEfficiency {
    pub hit_rate: f64,
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheMemory {
    pub memory_mb: f64,
    pub entries: usize,
}

/// Snapshot of tracked access patterns and cache efficiency.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub total_keys_tracked: usize,
    pub high_access_keys: usize,
    pub low_access_keys: usize,
    pub cache_efficiency: IndexMap<CacheKind, CacheEfficiency>,
    pub memory_usage: IndexMap<CacheKind, CacheMemory>,
    pub recommendations: Vec<String>,
}

// == Smart Cache ==
#[derive(Debug, Default)]
struct SmartState {
    metrics: HashMap<String, CacheMetrics>,
    /// Keys registered through `smart_set` as likely to follow a read
    preload_patterns: HashMap<String, Vec<String>>,
}

/// Access-tracking wrapper around the managed caches.
pub struct SmartCache {
    manager: Arc<CacheManager>,
    prefetcher: Arc<dyn Prefetcher>,
    settings: AdaptiveSettings,
    state: Mutex<SmartState>,
}

impl std::fmt::Debug for SmartCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartCache")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SmartCache {
    pub fn new(
        manager: Arc<CacheManager>,
        prefetcher: Arc<dyn Prefetcher>,
        settings: AdaptiveSettings,
    ) -> Self {
        Self {
            manager,
            prefetcher,
            settings,
            state: Mutex::new(SmartState::default()),
        }
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    fn lock(&self) -> MutexGuard<'_, SmartState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_access(&self, key: &str, now: f64) {
        self.lock()
            .metrics
            .entry(key.to_string())
            .or_default()
            .record_access(now);
    }

    fn record_outcome(&self, key: &str, hit: bool) {
        let mut state = self.lock();
        let metrics = state.metrics.entry(key.to_string()).or_default();
        if hit {
            metrics.hit_count += 1;
        } else {
            metrics.miss_count += 1;
        }
    }

    pub fn metrics(&self, key: &str) -> Option<CacheMetrics> {
        self.lock().metrics.get(key).cloned()
    }

    // == Reads ==
    /// Reads through the tracked cache, optionally preloading predicted keys
    /// on a hit.
    pub fn smart_get(&self, kind: CacheKind, key: &str, preload_related: bool) -> Option<Value> {
        self.record_access(key, current_timestamp());

        match self.manager.cache(kind).get(key) {
            Some(value) => {
                self.record_outcome(key, true);
                if preload_related {
                    self.preload_related(kind, key);
                }
                Some(value)
            }
            None => {
                self.record_outcome(key, false);
                None
            }
        }
    }

    /// Like `smart_get`, calling `loader` on a miss and caching a produced
    /// value under its adaptive TTL. Loader errors are logged, not returned.
    pub fn smart_get_or_load<F, E>(&self, kind: CacheKind, key: &str, loader: F) -> Option<Value>
    where
        F: FnOnce() -> Result<Option<Value>, E>,
        E: std::fmt::Display,
    {
        if let Some(value) = self.smart_get(kind, key, true) {
            return Some(value);
        }

        match loader() {
            Ok(Some(value)) => {
                let ttl = self.calculate_adaptive_ttl(key);
                self.manager.cache(kind).set(key, value.clone(), Some(ttl));
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                error!(key = %key, error = %e, "Smart cache loader failed");
                None
            }
        }
    }

    /// Typed read-through for store queries.
    ///
    /// Hits and misses are tracked like `smart_get`. A fresh value is cached
    /// under its adaptive TTL unless it serializes to null. Loader errors
    /// propagate and nothing is cached for them.
    pub fn smart_query<T, E, F>(&self, kind: CacheKind, key: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(hit) = self.smart_get(kind, key, true) {
            match serde_json::from_value(hit) {
                Ok(value) => return Ok(value),
                Err(e) => warn!(key = %key, error = %e, "Cached value has an unexpected shape"),
            }
        }

        let value = loader()?;
        match serde_json::to_value(&value) {
            Ok(Value::Null) => {}
            Ok(json) => {
                let ttl = self.calculate_adaptive_ttl(key);
                self.manager.cache(kind).set(key, json, Some(ttl));
            }
            Err(e) => warn!(key = %key, error = %e, "Query result not cacheable"),
        }
        Ok(value)
    }

    // == Writes ==
    /// Stores a value, with an adaptive TTL when `auto_ttl` is set, and
    /// remembers `related_keys` for preloading on later cycles.
    pub fn smart_set(
        &self,
        kind: CacheKind,
        key: &str,
        value: Value,
        auto_ttl: bool,
        related_keys: &[String],
    ) {
        let ttl = auto_ttl.then(|| self.calculate_adaptive_ttl(key));
        self.manager.cache(kind).set(key, value, ttl);

        if !related_keys.is_empty() {
            self.lock()
                .preload_patterns
                .insert(key.to_string(), related_keys.to_vec());
        }
    }

    /// Loads and caches every key not already present. Returns how many
    /// values were stored.
    pub fn batch_preload<I, F>(&self, kind: CacheKind, pairs: I) -> usize
    where
        I: IntoIterator<Item = (String, F)>,
        F: FnOnce() -> Option<Value>,
    {
        let cache = self.manager.cache(kind);
        let loaded: Vec<(String, Value)> = pairs
            .into_iter()
            .filter(|(key, _)| !cache.contains(key))
            .filter_map(|(key, loader)| loader().map(|value| (key, value)))
            .collect();

        for (key, value) in &loaded {
            let ttl = self.calculate_adaptive_ttl(key);
            cache.set(key, value.clone(), Some(ttl));
        }

        info!(cache = ?kind, count = loaded.len(), "Batch preload complete");
        loaded.len()
    }

    /// Adaptive TTL for a key from its access history.
    pub fn calculate_adaptive_ttl(&self, key: &str) -> Duration {
        let state = self.lock();
        let secs = match state.metrics.get(key) {
            Some(metrics) => adaptive_ttl_secs(metrics, &self.settings),
            None => adaptive_ttl_secs(&CacheMetrics::default(), &self.settings),
        };
        Duration::from_secs_f64(secs)
    }

    fn preload_related(&self, kind: CacheKind, key: &str) -> usize {
        let cache = self.manager.cache(kind);
        let mut loaded = 0;
        for related in self.prefetcher.related_keys(key) {
            if cache.contains(&related) {
                continue;
            }
            if let Some(value) = self.prefetcher.load(kind, &related) {
                let ttl = self.calculate_adaptive_ttl(&related);
                cache.set(&related, value, Some(ttl));
                loaded += 1;
            }
        }
        loaded
    }

    // == Optimization Cycle ==
    /// Runs one pass of pattern analysis, preloading, resizing and memory
    /// trimming against the clock reading `now`.
    pub fn run_optimization_cycle(&self, now: f64) -> OptimizationCycle {
        let mut cycle = OptimizationCycle::default();

        let (preload_targets, idle_keys) = {
            let state = self.lock();

            for (key, metrics) in &state.metrics {
                let idle = metrics.idle_secs(now);
                if metrics.access_count > HOT_MIN_ACCESSES && idle < HOT_WINDOW_SECS {
                    cycle.hot_keys.push(key.clone());
                }
                if metrics.access_count > 0 && idle > COLD_AFTER_SECS {
                    cycle.cold_keys.push(key.clone());
                }
            }

            let preload_targets: Vec<String> = state
                .preload_patterns
                .iter()
                .filter(|(key, _)| {
                    state.metrics.get(*key).is_some_and(|m| {
                        m.access_count > PRELOAD_MIN_ACCESSES
                            && m.idle_secs(now) < PRELOAD_WINDOW_SECS
                    })
                })
                .flat_map(|(_, related)| related.iter().cloned())
                .collect();

            let idle_keys: Vec<String> = state
                .metrics
                .iter()
                .filter(|(_, m)| m.idle_secs(now) > TRIM_IDLE_SECS)
                .map(|(key, _)| key.clone())
                .collect();

            (preload_targets, idle_keys)
        };
        cycle.hot_keys.sort();
        cycle.cold_keys.sort();
        debug!(
            hot = cycle.hot_keys.len(),
            cold = cycle.cold_keys.len(),
            "Analyzed access patterns"
        );

        for kind in PRELOAD_KINDS {
            let cache = self.manager.cache(kind);
            for key in &preload_targets {
                if cache.contains(key) {
                    continue;
                }
                if let Some(value) = self.prefetcher.load(kind, key) {
                    let ttl = self.calculate_adaptive_ttl(key);
                    cache.set(key, value, Some(ttl));
                    cycle.preloaded += 1;
                }
            }
        }

        if self.settings.adaptive_resize {
            cycle.resized = self.resize_caches();
        }

        for kind in CacheKind::ALL {
            let cache = self.manager.cache(kind);
            cycle.expired_removed += cache.cleanup_expired();

            if cache.memory_usage().estimated_memory_mb() > self.settings.memory_limit_mb {
                let victims: Vec<&String> = idle_keys
                    .iter()
                    .filter(|key| cache.contains(key))
                    .take(TRIM_BATCH)
                    .collect();
                for key in victims {
                    if cache.delete(key) {
                        cycle.trimmed += 1;
                    }
                }
            }
        }

        cycle.pruned = self.prune_metrics(&cycle.cold_keys);

        if cycle.preloaded > 0 || !cycle.resized.is_empty() || cycle.trimmed > 0 {
            info!(
                preloaded = cycle.preloaded,
                resized = cycle.resized.len(),
                expired = cycle.expired_removed,
                trimmed = cycle.trimmed,
                pruned = cycle.pruned,
                "Cache optimization cycle applied changes"
            );
        } else {
            debug!(expired = cycle.expired_removed, "Cache optimization cycle complete");
        }
        cycle
    }

    /// Forgets cold keys that no managed cache holds any more.
    fn prune_metrics(&self, cold_keys: &[String]) -> usize {
        let gone: Vec<&String> = cold_keys
            .iter()
            .filter(|key| {
                CacheKind::ALL
                    .iter()
                    .all(|&kind| !self.manager.cache(kind).contains(key))
            })
            .collect();
        if gone.is_empty() {
            return 0;
        }

        let mut state = self.lock();
        for key in &gone {
            state.metrics.remove(key.as_str());
        }
        gone.len()
    }

    fn resize_caches(&self) -> Vec<CapacityChange> {
        let s = &self.settings;
        let mut changes = Vec::new();

        for kind in CacheKind::ALL {
            let cache = self.manager.cache(kind);
            let stats = cache.stats();
            if stats.total_requests() == 0 {
                continue;
            }

            let hit_rate = stats.hit_rate();
            let current = stats.max_size;
            let target = if hit_rate < s.grow_below_hit_rate && current < s.max_capacity {
                s.max_capacity.min(current + s.grow_step)
            } else if hit_rate > s.shrink_above_hit_rate && current > s.min_capacity {
                s.min_capacity.max(current.saturating_sub(s.shrink_step))
            } else {
                continue;
            };

            cache.set_max_size(target);
            info!(cache = ?kind, from = current, to = target, "Cache capacity adjusted");
            changes.push(CapacityChange {
                cache: kind,
                from: current,
                to: target,
            });
        }
        changes
    }

    // == Report ==
    pub fn get_optimization_report(&self, now: f64) -> OptimizationReport {
        let (total_keys_tracked, high_access_keys, low_access_keys) = {
            let state = self.lock();
            let mut high = 0;
            let mut low = 0;
            for metrics in state.metrics.values() {
                if metrics.access_count > REPORT_HIGH_ACCESS {
                    high += 1;
                } else if metrics.idle_secs(now) > COLD_AFTER_SECS {
                    low += 1;
                }
            }
            (state.metrics.len(), high, low)
        };

        let mut cache_efficiency = IndexMap::new();
        let mut memory_usage = IndexMap::new();
        for kind in CacheKind::ALL {
            let cache = self.manager.cache(kind);
            let stats = cache.stats();
            let memory = cache.memory_usage();
            cache_efficiency.insert(
                kind,
                CacheEfficiency {
                    hit_rate: stats.hit_rate(),
                    size: stats.size,
                    max_size: stats.max_size,
                },
            );
            memory_usage.insert(
                kind,
                CacheMemory {
                    memory_mb: memory.estimated_memory_mb(),
                    entries: memory.entries_count,
                },
            );
        }

        let mut recommendations = Vec::new();
        if high_access_keys > RECOMMEND_HOT {
            recommendations
                .push("Consider increasing cache capacity for frequently accessed data".to_string());
        }
        if low_access_keys > RECOMMEND_COLD {
            recommendations.push("Large amount of cold data; schedule regular cleanup".to_string());
        }

        OptimizationReport {
            total_keys_tracked,
            high_access_keys,
            low_access_keys,
            cache_efficiency,
            memory_usage,
            recommendations,
        }
    }
}
