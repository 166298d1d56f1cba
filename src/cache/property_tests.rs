//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache contract across generated operation
//! sequences.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use crate::cache::{CachePersistence, LruCache, PersistMode};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_DEFAULT_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}"
}

/// Generates JSON payloads of the shapes the bot caches
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,64}".prop_map(|s| json!(s)),
        prop::collection::vec(any::<i32>(), 0..8).prop_map(|v| json!(v)),
        ("[a-z]{1,8}", any::<bool>()).prop_map(|(name, flag)| json!({"name": name, "flag": flag})),
    ]
}

fn unique_keys(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Hits and misses track exactly what `get` returned.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let cache = LruCache::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL);
        let mut expected_hits = 0u64;
        let mut expected_misses = 0u64;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => cache.set(&key, value, None),
                CacheOp::Get { key } => match cache.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                CacheOp::Delete { key } => {
                    cache.delete(&key);
                }
            }
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.size, cache.len());
    }

    // A value read back before its TTL is the value that was stored.
    #[test]
    fn prop_roundtrip_before_ttl(key in key_strategy(), value in value_strategy()) {
        let cache = LruCache::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL);

        cache.set(&key, value.clone(), Some(Duration::from_secs(60)));

        prop_assert_eq!(cache.get(&key), Some(value));
    }

    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        first in value_strategy(),
        second in value_strategy()
    ) {
        let cache = LruCache::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL);

        cache.set(&key, first, None);
        cache.set(&key, second.clone(), None);

        prop_assert_eq!(cache.get(&key), Some(second));
        prop_assert_eq!(cache.len(), 1);
    }

    // Size never exceeds capacity, whatever the insert sequence.
    #[test]
    fn prop_capacity_enforcement(
        max_size in 1usize..20,
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..120)
    ) {
        let cache = LruCache::new(max_size, TEST_DEFAULT_TTL);

        for (key, value) in entries {
            cache.set(&key, value, None);
            prop_assert!(cache.len() <= max_size, "size {} exceeds {}", cache.len(), max_size);
        }
    }

    // With no reads, inserts past capacity evict in insertion order.
    #[test]
    fn prop_insertion_order_eviction(
        keys in prop::collection::vec(key_strategy(), 2..30),
        capacity in 1usize..10
    ) {
        let keys = unique_keys(keys);
        prop_assume!(keys.len() > capacity);

        let cache = LruCache::new(capacity, TEST_DEFAULT_TTL);
        for (i, key) in keys.iter().enumerate() {
            cache.set(key, json!(i), None);
        }

        let survivors: Vec<String> = keys[keys.len() - capacity..].to_vec();
        prop_assert_eq!(cache.keys(), survivors);
        prop_assert_eq!(cache.stats().evictions, (keys.len() - capacity) as u64);
    }

    // A read moves a key out of the eviction slot.
    #[test]
    fn prop_read_protects_from_eviction(
        keys in prop::collection::vec(key_strategy(), 3..10),
        new_key in key_strategy()
    ) {
        let keys = unique_keys(keys);
        prop_assume!(keys.len() >= 3);
        prop_assume!(!keys.contains(&new_key));

        let cache = LruCache::new(keys.len(), TEST_DEFAULT_TTL);
        for key in &keys {
            cache.set(key, json!(key), None);
        }

        // keys[1] was inserted after keys[0]; reading keys[0] makes keys[1] the LRU
        cache.get(&keys[0]);
        cache.set(&new_key, json!("new"), None);

        prop_assert!(cache.contains(&keys[0]));
        prop_assert!(!cache.contains(&keys[1]));
        prop_assert!(cache.contains(&new_key));
    }

    // A second sweep right after the first finds nothing.
    #[test]
    fn prop_cleanup_is_idempotent(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 0..30)
    ) {
        let cache = LruCache::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL);
        for (key, value) in entries {
            cache.set(&key, value, None);
        }

        cache.cleanup_expired();
        prop_assert_eq!(cache.cleanup_expired(), 0);
    }

    // Rebuilding from the persistence file restores every live entry.
    #[test]
    fn prop_persistence_roundtrip(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..25)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let first_cache = LruCache::with_persistence(
            TEST_MAX_ENTRIES,
            TEST_DEFAULT_TTL,
            CachePersistence::new(&path, PersistMode::WriteThrough),
        );
        for (key, value) in &entries {
            first_cache.set(key, value.clone(), None);
        }

        let restored = LruCache::with_persistence(
            TEST_MAX_ENTRIES,
            TEST_DEFAULT_TTL,
            CachePersistence::new(&path, PersistMode::WriteThrough),
        );

        prop_assert_eq!(restored.keys(), first_cache.keys());
        for key in first_cache.keys() {
            prop_assert_eq!(restored.get(&key), first_cache.get(&key));
        }
    }
}

// Time-sensitive TTL properties run fewer cases
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    #[test]
    fn prop_ttl_expiration_behavior(key in key_strategy(), value in value_strategy()) {
        let cache = LruCache::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL);

        cache.set(&key, value.clone(), Some(Duration::from_secs(1)));
        prop_assert_eq!(cache.get(&key), Some(value));

        sleep(Duration::from_millis(1100));

        prop_assert_eq!(cache.get(&key), None);
        prop_assert_eq!(cache.stats().expires, 1);
    }
}

// == Concurrent Access ==
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // Concurrent readers see whole values and the size bound holds.
    #[test]
    fn prop_concurrent_operation_correctness(
        initial in prop::collection::vec((key_strategy(), value_strategy()), 1..20),
        ops in prop::collection::vec(cache_op_strategy(), 10..50)
    ) {
        let cache = Arc::new(LruCache::new(16, TEST_DEFAULT_TTL));
        for (key, value) in &initial {
            cache.set(key, value.clone(), None);
        }

        let written: Vec<Value> = initial
            .iter()
            .map(|(_, v)| v.clone())
            .chain(ops.iter().filter_map(|op| match op {
                CacheOp::Set { value, .. } => Some(value.clone()),
                _ => None,
            }))
            .collect();

        let handles: Vec<_> = ops
            .into_iter()
            .map(|op| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || match op {
                    CacheOp::Set { key, value } => {
                        cache.set(&key, value, None);
                        None
                    }
                    CacheOp::Get { key } => cache.get(&key),
                    CacheOp::Delete { key } => {
                        cache.delete(&key);
                        None
                    }
                })
            })
            .collect();

        for handle in handles {
            let read = handle.join().expect("cache thread panicked");
            if let Some(value) = read {
                prop_assert!(written.contains(&value), "read a value nobody wrote: {}", value);
            }
        }

        let stats = cache.stats();
        prop_assert!(stats.size <= 16);
        prop_assert!((0.0..=1.0).contains(&stats.hit_rate()));
    }
}

// == Error Response Format ==
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // Every error renders as JSON with a string "error" field.
    #[test]
    fn prop_error_response_format(msg in "[a-zA-Z0-9 _-]{1,100}") {
        use crate::error::BotError;
        use axum::body::to_bytes;
        use axum::response::IntoResponse;

        let variants = vec![
            BotError::NotFound(msg.clone()),
            BotError::InvalidRequest(msg.clone()),
            BotError::Store(msg.clone()),
            BotError::Transport(msg.clone()),
            BotError::Push(msg.clone()),
            BotError::Internal(msg.clone()),
        ];

        let rt = tokio::runtime::Runtime::new().unwrap();
        for error in variants {
            let expected = error.to_string();
            let response = error.into_response();

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            prop_assert!(content_type.contains("application/json"));

            let bytes = rt.block_on(async { to_bytes(response.into_body(), usize::MAX).await.unwrap() });
            let body: Value = serde_json::from_slice(&bytes).expect("body should be JSON");
            prop_assert_eq!(body["error"].as_str(), Some(expected.as_str()));
        }
    }
}
