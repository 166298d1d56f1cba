//! Cache Manager Module
//!
//! Owns the four namespaced caches used by the bot (database query results,
//! user interaction state, configuration, statistics) and the read-through
//! helpers that put them in front of the relational store.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{CachePersistence, CacheStats, LruCache, MemoryUsage, PersistMode};

// == Cache Kind ==
/// Identifies one of the managed caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Db,
    User,
    Config,
    Stats,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        CacheKind::Db,
        CacheKind::User,
        CacheKind::Config,
        CacheKind::Stats,
    ];

    /// Default capacity for this cache.
    pub fn default_max_size(self) -> usize {
        match self {
            CacheKind::Db => 500,
            CacheKind::User => 1000,
            CacheKind::Config => 100,
            CacheKind::Stats => 200,
        }
    }

    /// Default entry lifetime for this cache.
    pub fn default_ttl(self) -> Duration {
        match self {
            CacheKind::Db => Duration::from_secs(300),
            CacheKind::User => Duration::from_secs(1800),
            CacheKind::Config => Duration::from_secs(3600),
            CacheKind::Stats => Duration::from_secs(600),
        }
    }

    /// Persistence file name inside the cache directory.
    pub fn file_name(self) -> &'static str {
        match self {
            CacheKind::Db => "db_cache.json",
            CacheKind::User => "user_cache.json",
            CacheKind::Config => "config_cache.json",
            CacheKind::Stats => "stats_cache.json",
        }
    }
}

// == Manager Config ==
/// How the manager builds its caches.
#[derive(Debug, Clone, Default)]
pub struct CacheManagerConfig {
    /// Directory for JSON mirrors; None keeps every cache in memory only
    pub persistence_dir: Option<PathBuf>,
    pub persist_mode: PersistMode,
}

// == User State ==
/// Conversation state cached per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub state: Option<String>,
    #[serde(default)]
    pub data: Value,
}

// == Reports ==
/// Stats and memory estimate for one cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
    pub total_requests: u64,
    pub memory: MemoryUsage,
}

/// Aggregate view across all managed caches.
#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveStats {
    pub caches: IndexMap<CacheKind, CacheReport>,
    pub overall_hit_rate: f64,
    pub total_requests: u64,
    pub total_hits: u64,
    pub total_memory_mb: f64,
}

/// Expired entries removed per cache by one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub removed: IndexMap<CacheKind, usize>,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.removed.values().sum()
    }
}

// == Cache Manager ==
/// Owns the four managed caches.
#[derive(Debug)]
pub struct CacheManager {
    db_cache: LruCache,
    user_cache: LruCache,
    config_cache: LruCache,
    stats_cache: LruCache,
}

impl CacheManager {
    // == Constructors ==
    /// Builds the caches with default capacities and TTLs.
    pub fn new(config: &CacheManagerConfig) -> Self {
        let build = |kind: CacheKind| match &config.persistence_dir {
            Some(dir) => LruCache::with_persistence(
                kind.default_max_size(),
                kind.default_ttl(),
                CachePersistence::new(dir.join(kind.file_name()), config.persist_mode),
            ),
            None => LruCache::new(kind.default_max_size(), kind.default_ttl()),
        };

        Self {
            db_cache: build(CacheKind::Db),
            user_cache: build(CacheKind::User),
            config_cache: build(CacheKind::Config),
            stats_cache: build(CacheKind::Stats),
        }
    }

    /// Builds purely in-memory caches.
    pub fn in_memory() -> Self {
        Self::new(&CacheManagerConfig::default())
    }

    pub fn cache(&self, kind: CacheKind) -> &LruCache {
        match kind {
            CacheKind::Db => &self.db_cache,
            CacheKind::User => &self.user_cache,
            CacheKind::Config => &self.config_cache,
            CacheKind::Stats => &self.stats_cache,
        }
    }

    // == Database Query Cache ==
    pub fn get_db_cache(&self, key: &str) -> Option<Value> {
        self.db_cache.get(key)
    }

    pub fn set_db_cache(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.db_cache.set(key, value, ttl);
    }

    // == User State Cache ==
    pub fn get_user_state(&self, user_id: i64) -> Option<UserState> {
        self.user_cache.get_as(&user_state_key(user_id))
    }

    pub fn set_user_state(&self, user_id: i64, state: Option<String>, data: Value) {
        self.user_cache
            .set_as(&user_state_key(user_id), &UserState { state, data }, None);
    }

    pub fn clear_user_state(&self, user_id: i64) -> bool {
        self.user_cache.delete(&user_state_key(user_id))
    }

    // == Config Cache ==
    pub fn get_config(&self, key: &str) -> Option<Value> {
        self.config_cache.get(key)
    }

    pub fn set_config(&self, key: &str, value: Value) {
        self.config_cache.set(key, value, None);
    }

    // == Stats Cache ==
    pub fn get_stats(&self, key: &str) -> Option<Value> {
        self.stats_cache.get(key)
    }

    pub fn set_stats(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.stats_cache.set(key, value, ttl);
    }

    // == Invalidation ==
    /// Drops every db cache key containing `pattern`.
    ///
    /// Call after writes that make cached query results stale.
    pub fn invalidate_db_cache(&self, pattern: &str) -> usize {
        let removed = self.db_cache.invalidate_matching(pattern);
        debug!(pattern = %pattern, removed, "Invalidated db cache entries");
        removed
    }

    /// Empties the stats cache, returning how many entries it held.
    pub fn invalidate_stats_cache(&self) -> usize {
        let count = self.stats_cache.len();
        self.stats_cache.clear();
        count
    }

    pub fn clear_all_caches(&self) {
        for kind in CacheKind::ALL {
            self.cache(kind).clear();
        }
        info!("All caches cleared");
    }

    // == Maintenance ==
    pub fn cleanup_all_expired(&self) -> CleanupReport {
        let removed = CacheKind::ALL
            .into_iter()
            .map(|kind| (kind, self.cache(kind).cleanup_expired()))
            .collect();
        CleanupReport { removed }
    }

    /// Writes pending deferred mirrors, returning how many caches were saved.
    pub fn flush_all(&self) -> usize {
        CacheKind::ALL
            .into_iter()
            .filter(|kind| self.cache(*kind).flush())
            .count()
    }

    pub fn get_comprehensive_stats(&self) -> ComprehensiveStats {
        let caches: IndexMap<CacheKind, CacheReport> = CacheKind::ALL
            .into_iter()
            .map(|kind| {
                let cache = self.cache(kind);
                let stats = cache.stats();
                let report = CacheReport {
                    hit_rate: stats.hit_rate(),
                    total_requests: stats.total_requests(),
                    memory: cache.memory_usage(),
                    stats,
                };
                (kind, report)
            })
            .collect();

        let total_hits: u64 = caches.values().map(|r| r.stats.hits).sum();
        let total_requests: u64 = caches.values().map(|r| r.total_requests).sum();
        let total_memory_mb = caches
            .values()
            .map(|r| r.memory.estimated_memory_mb())
            .sum();
        let overall_hit_rate = if total_requests == 0 {
            0.0
        } else {
            total_hits as f64 / total_requests as f64
        };

        ComprehensiveStats {
            caches,
            overall_hit_rate,
            total_requests,
            total_hits,
            total_memory_mb,
        }
    }

    // == Read-Through Helpers ==
    /// Serves a database query from the db cache, calling `loader` on a miss.
    ///
    /// Loader errors propagate and nothing is cached for them. Nothing is
    /// invalidated automatically when the underlying rows change.
    pub fn cached_db_query<T, E, F>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        read_through(&self.db_cache, key, ttl, loader)
    }

    /// Serves a computed statistic from the stats cache.
    pub fn cached_stats<T, E, F>(&self, key: &str, ttl: Option<Duration>, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        read_through(&self.stats_cache, key, ttl, loader)
    }
}

fn read_through<T, E, F>(
    cache: &LruCache,
    key: &str,
    ttl: Option<Duration>,
    loader: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, E>,
{
    if let Some(hit) = cache.get_as::<T>(key) {
        return Ok(hit);
    }

    let value = loader()?;
    match serde_json::to_value(&value) {
        // Empty results are recomputed on every call
        Ok(Value::Null) => {}
        Ok(json) => cache.set(key, json, ttl),
        Err(e) => debug!(key = %key, error = %e, "Query result not cacheable"),
    }
    Ok(value)
}

fn user_state_key(user_id: i64) -> String {
    format!("user_state_{}", user_id)
}

// == Key Derivation ==
/// Builds a cache key from a function name and a hash of its arguments.
pub fn derive_cache_key<A: Hash + ?Sized>(name: &str, args: &A) -> String {
    let mut hasher = DefaultHasher::new();
    args.hash(&mut hasher);
    format!("{}_{:016x}", name, hasher.finish())
}

/// Key for a statistic, namespaced apart from query keys.
pub fn derive_stats_key<A: Hash + ?Sized>(name: &str, args: &A) -> String {
    derive_cache_key(&format!("stats_{}", name), args)
}
