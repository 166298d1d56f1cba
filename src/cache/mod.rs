//! Cache Module
//!
//! In-process caching for the bot: TTL-bound LRU caches with optional JSON
//! persistence, the manager owning the four namespaced caches, and the
//! adaptive layer on top of them.

mod entry;
mod lru;
mod manager;
mod persistence;
mod prefetch;
mod smart;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp, CacheEntry};
pub use lru::LruTracker;
pub use manager::{
    derive_cache_key, derive_stats_key, CacheKind, CacheManager, CacheManagerConfig,
    CacheReport, CleanupReport, ComprehensiveStats, UserState,
};
pub use persistence::{CachePersistence, PersistMode};
pub use prefetch::{NamingConventionPrefetcher, NoopPrefetcher, PrefetchLoader, Prefetcher};
pub use smart::{
    AdaptiveSettings, CacheEfficiency, CacheMemory, CacheMetrics, CapacityChange,
    OptimizationCycle, OptimizationReport, SmartCache,
};
pub use stats::{CacheStats, MemoryUsage};
pub use store::LruCache;
