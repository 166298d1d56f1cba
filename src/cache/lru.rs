//! LRU Tracker Module
//!
//! Recency ordering for cache eviction.

use indexmap::IndexSet;

// == LRU Tracker ==
/// Keys in recency order, least recently used at index 0.
///
/// Touching a key moves it to the end; eviction pops index 0.
#[derive(Debug, Default)]
pub struct LruTracker {
    order: IndexSet<String>,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, inserting it if unknown.
    pub fn touch(&mut self, key: &str) {
        match self.order.get_index_of(key) {
            Some(index) => {
                let last = self.order.len() - 1;
                self.order.move_index(index, last);
            }
            None => {
                self.order.insert(key.to_string());
            }
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.order.shift_remove(key);
    }

    // == Eviction ==
    /// Removes and returns the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<String> {
        self.order.shift_remove_index(0)
    }

    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.first()
    }

    /// Iterates keys from least to most recently used.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.contains(key)
    }
}
