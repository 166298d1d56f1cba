//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and access metadata.
///
/// Timestamps are fractional Unix seconds so the entry serializes directly
/// into the persistence file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Creation timestamp (Unix seconds)
    pub created_at: f64,
    /// Time to live in seconds
    pub ttl: f64,
    /// Number of successful reads of this entry
    #[serde(default)]
    pub hit_count: u64,
    /// Last read timestamp (Unix seconds)
    #[serde(default)]
    pub last_accessed: f64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self::with_created_at(value, ttl, current_timestamp())
    }

    /// Creates an entry with an explicit creation time.
    pub fn with_created_at(value: Value, ttl: Duration, created_at: f64) -> Self {
        Self {
            value,
            created_at,
            ttl: ttl.as_secs_f64(),
            hit_count: 0,
            last_accessed: created_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry expires strictly after `created_at + ttl`; at the exact
    /// boundary it is still served.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp())
    }

    /// Expiry check against a caller-supplied clock reading.
    pub fn is_expired_at(&self, now: f64) -> bool {
        now > self.created_at + self.ttl
    }

    // == Access ==
    /// Records a read of this entry.
    pub fn access(&mut self) {
        self.hit_count += 1;
        self.last_accessed = current_timestamp();
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        let remaining = self.created_at + self.ttl - current_timestamp();
        if remaining > 0.0 {
            Duration::from_secs_f64(remaining)
        } else {
            Duration::ZERO
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in fractional seconds.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(json!("test_value"), Duration::from_secs(60));

        assert_eq!(entry.value, json!("test_value"));
        assert_eq!(entry.ttl, 60.0);
        assert_eq!(entry.hit_count, 0);
        assert_eq!(entry.last_accessed, entry.created_at);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(json!(1), Duration::from_secs(1));

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(1100));

        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::with_created_at(json!("v"), Duration::from_secs(10), 1000.0);

        assert!(!entry.is_expired_at(1010.0), "boundary instant is still live");
        assert!(entry.is_expired_at(1010.001));
    }

    #[test]
    fn test_access_updates_counters() {
        let mut entry = CacheEntry::with_created_at(json!("v"), Duration::from_secs(10), 1.0);
        entry.access();
        entry.access();

        assert_eq!(entry.hit_count, 2);
        assert!(entry.last_accessed > 1.0);
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new(json!("v"), Duration::from_secs(10));

        let remaining = entry.ttl_remaining();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining >= Duration::from_secs(9));
    }

    #[test]
    fn test_ttl_remaining_expired() {
        let entry = CacheEntry::with_created_at(json!("v"), Duration::from_secs(1), 0.0);
        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = CacheEntry::with_created_at(json!({"a": 1}), Duration::from_secs(5), 10.0);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["value"], json!({"a": 1}));
        assert_eq!(json["created_at"], json!(10.0));
        assert_eq!(json["ttl"], json!(5.0));
        assert_eq!(json["hit_count"], json!(0));
        assert_eq!(json["last_accessed"], json!(10.0));
    }
}
