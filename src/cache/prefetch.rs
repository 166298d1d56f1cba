//! Prefetch Module
//!
//! Predictive preloading hook for the smart cache. Predictions are guesses:
//! a wrong or missing prediction only costs a later cache miss.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::CacheKind;

/// Loads the value for a predicted key, if one can be produced.
pub type PrefetchLoader = Arc<dyn Fn(CacheKind, &str) -> Option<Value> + Send + Sync>;

// == Prefetcher ==
/// Predicts and loads keys likely to be read soon after `key`.
pub trait Prefetcher: Send + Sync {
    /// Keys related to `key`. May be empty.
    fn related_keys(&self, key: &str) -> Vec<String>;

    /// Produces a value for a predicted key. None means "do not cache".
    fn load(&self, kind: CacheKind, key: &str) -> Option<Value>;
}

// == Noop Prefetcher ==
/// Disables prediction entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPrefetcher;

impl Prefetcher for NoopPrefetcher {
    fn related_keys(&self, _key: &str) -> Vec<String> {
        Vec::new()
    }

    fn load(&self, _kind: CacheKind, _key: &str) -> Option<Value> {
        None
    }
}

// == Naming Convention Prefetcher ==
/// Derives related keys from the bot's key naming scheme.
///
/// `user_{id}` predicts `user_stats_{id}`, `user_submissions_{id}` and
/// `user_state_{id}`; `submission_{id}` predicts `submission_tags_{id}` and
/// `submission_user_{id}`. Only numeric ids are recognized.
#[derive(Default, Clone)]
pub struct NamingConventionPrefetcher {
    loader: Option<PrefetchLoader>,
}

impl NamingConventionPrefetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a loader; without one, predictions are never materialized.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn(CacheKind, &str) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            loader: Some(Arc::new(loader)),
        }
    }
}

impl std::fmt::Debug for NamingConventionPrefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamingConventionPrefetcher")
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}

const USER_RELATED: [&str; 3] = ["user_stats_", "user_submissions_", "user_state_"];
const SUBMISSION_RELATED: [&str; 2] = ["submission_tags_", "submission_user_"];

fn numeric_suffix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let id = key.strip_prefix(prefix)?;
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        Some(id)
    } else {
        None
    }
}

impl Prefetcher for NamingConventionPrefetcher {
    fn related_keys(&self, key: &str) -> Vec<String> {
        if let Some(id) = numeric_suffix(key, "user_") {
            USER_RELATED.iter().map(|p| format!("{p}{id}")).collect()
        } else if let Some(id) = numeric_suffix(key, "submission_") {
            SUBMISSION_RELATED
                .iter()
                .map(|p| format!("{p}{id}"))
                .collect()
        } else {
            Vec::new()
        }
    }

    fn load(&self, kind: CacheKind, key: &str) -> Option<Value> {
        self.loader.as_ref().and_then(|loader| loader(kind, key))
    }
}
