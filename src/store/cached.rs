//! Caching decorator over any `SubmissionStore`.
//!
//! Reads go through the db cache with per-query TTLs; statistics go through
//! the stats cache. With a smart layer attached, reads are tracked there and
//! cached under adaptive TTLs instead. Writers call the `on_*` hooks so stale
//! rows are dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::cache::{CacheKind, CacheManager, NamingConventionPrefetcher, SmartCache};
use crate::error::Result;
use crate::store::{Submission, SubmissionStats, SubmissionStore, User};

const SUBMISSION_TTL: Duration = Duration::from_secs(120);
const USER_TTL: Duration = Duration::from_secs(1800);
const REVIEWERS_TTL: Duration = Duration::from_secs(300);
const PENDING_TTL: Duration = Duration::from_secs(120);
const PENDING_COUNT_TTL: Duration = Duration::from_secs(60);
const STATS_TTL: Duration = Duration::from_secs(300);

const REVIEWERS_KEY: &str = "approved_reviewers";
const PENDING_PREFIX: &str = "pending_submissions";
const STATS_KEY: &str = "submission_stats";

pub struct CachedStore {
    inner: Arc<dyn SubmissionStore>,
    caches: Arc<CacheManager>,
    smart: Option<Arc<SmartCache>>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn SubmissionStore>, caches: Arc<CacheManager>) -> Self {
        Self {
            inner,
            caches,
            smart: None,
        }
    }

    /// Routes reads through `smart`, sharing its cache manager.
    pub fn with_smart(mut self, smart: Arc<SmartCache>) -> Self {
        self.caches = Arc::clone(smart.manager());
        self.smart = Some(smart);
        self
    }

    pub fn inner(&self) -> &Arc<dyn SubmissionStore> {
        &self.inner
    }

    fn read<T, F>(&self, kind: CacheKind, key: &str, ttl: Duration, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        match (&self.smart, kind) {
            (Some(smart), _) => smart.smart_query(kind, key, loader),
            (None, CacheKind::Stats) => self.caches.cached_stats(key, Some(ttl), loader),
            (None, _) => self.caches.cached_db_query(key, Some(ttl), loader),
        }
    }

    // == Invalidation Hooks ==
    /// A new submission changes every pending listing and the statistics.
    pub fn on_submission_created(&self, id: i64) {
        let removed = self.caches.invalidate_db_cache(PENDING_PREFIX);
        self.caches.cache(CacheKind::Db).delete(&submission_key(id));
        self.caches.invalidate_stats_cache();
        debug!(submission_id = id, removed, "Submission created, caches invalidated");
    }

    /// A status change moves the submission out of the pending listings.
    pub fn on_submission_updated(&self, id: i64) {
        self.on_submission_created(id);
    }

    pub fn on_reviewer_changed(&self) {
        self.caches.cache(CacheKind::Db).delete(REVIEWERS_KEY);
        debug!("Reviewer set changed, reviewer list invalidated");
    }

    pub fn on_user_updated(&self, user_id: i64) {
        self.caches.cache(CacheKind::Db).delete(&user_key(user_id));
    }
}

impl SubmissionStore for CachedStore {
    fn get_submission(&self, id: i64) -> Result<Option<Submission>> {
        self.read(CacheKind::Db, &submission_key(id), SUBMISSION_TTL, || {
            self.inner.get_submission(id)
        })
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.read(CacheKind::Db, &user_key(user_id), USER_TTL, || {
            self.inner.get_user(user_id)
        })
    }

    fn approved_reviewer_ids(&self) -> Result<Vec<i64>> {
        self.read(CacheKind::Db, REVIEWERS_KEY, REVIEWERS_TTL, || {
            self.inner.approved_reviewer_ids()
        })
    }

    fn pending_submissions(&self, limit: usize, offset: usize) -> Result<Vec<Submission>> {
        let key = format!("{}_{}_{}", PENDING_PREFIX, limit, offset);
        self.read(CacheKind::Db, &key, PENDING_TTL, || {
            self.inner.pending_submissions(limit, offset)
        })
    }

    fn pending_submissions_count(&self) -> Result<usize> {
        let key = format!("{}_count", PENDING_PREFIX);
        self.read(CacheKind::Db, &key, PENDING_COUNT_TTL, || {
            self.inner.pending_submissions_count()
        })
    }

    fn submission_stats(&self) -> Result<SubmissionStats> {
        self.read(CacheKind::Stats, STATS_KEY, STATS_TTL, || {
            self.inner.submission_stats()
        })
    }
}

// == Prefetching ==
/// Prefetcher that materializes predicted submission keys from `store`.
///
/// `submission_tags_{id}` loads the tag list and `submission_user_{id}` the
/// author's user row. Other predictions stay unloaded.
pub fn store_prefetcher(store: Arc<dyn SubmissionStore>) -> NamingConventionPrefetcher {
    NamingConventionPrefetcher::with_loader(move |kind, key| {
        if kind != CacheKind::Db {
            return None;
        }
        if let Some(id) = id_after(key, "submission_tags_") {
            let submission = store.get_submission(id).ok()??;
            return serde_json::to_value(submission.tags).ok();
        }
        if let Some(id) = id_after(key, "submission_user_") {
            let submission = store.get_submission(id).ok()??;
            let user = store.get_user(submission.user_id).ok()??;
            return serde_json::to_value(user).ok();
        }
        None
    })
}

fn id_after(key: &str, prefix: &str) -> Option<i64> {
    key.strip_prefix(prefix)?.parse().ok()
}

fn submission_key(id: i64) -> String {
    format!("submission_{}", id)
}

fn user_key(user_id: i64) -> String {
    format!("user_{}", user_id)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AdaptiveSettings, Prefetcher};
    use crate::store::{MemoryStore, SubmissionStatus};

    fn setup() -> (Arc<MemoryStore>, CachedStore) {
        let backing = Arc::new(MemoryStore::new());
        let cached = CachedStore::new(backing.clone(), Arc::new(CacheManager::in_memory()));
        (backing, cached)
    }

    #[test]
    fn test_submission_read_is_cached() {
        let (backing, cached) = setup();
        backing.insert_submission(Submission::new(1, 10, "alice", "hello"));

        let first = cached.get_submission(1).unwrap().unwrap();
        let queries = backing.query_count();
        let second = cached.get_submission(1).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(backing.query_count(), queries);
    }

    #[test]
    fn test_missing_submission_not_cached() {
        let (backing, cached) = setup();
        assert_eq!(cached.get_submission(5).unwrap(), None);

        backing.insert_submission(Submission::new(5, 10, "alice", "late"));
        assert!(cached.get_submission(5).unwrap().is_some());
    }

    #[test]
    fn test_store_error_propagates_and_is_not_cached() {
        let (backing, cached) = setup();
        backing.insert_submission(Submission::new(1, 10, "alice", "x"));
        backing.set_failing(true);
        assert!(cached.get_submission(1).is_err());

        backing.set_failing(false);
        assert!(cached.get_submission(1).unwrap().is_some());
    }

    #[test]
    fn test_created_hook_refreshes_pending_and_stats() {
        let (backing, cached) = setup();
        backing.insert_submission(Submission::new(1, 10, "alice", "a"));

        assert_eq!(cached.pending_submissions(10, 0).unwrap().len(), 1);
        assert_eq!(cached.submission_stats().unwrap().pending, 1);
        assert_eq!(cached.pending_submissions_count().unwrap(), 1);

        backing.insert_submission(Submission::new(2, 11, "bob", "b"));
        // Still served from cache until the hook runs
        assert_eq!(cached.pending_submissions(10, 0).unwrap().len(), 1);

        cached.on_submission_created(2);
        assert_eq!(cached.pending_submissions(10, 0).unwrap().len(), 2);
        assert_eq!(cached.submission_stats().unwrap().pending, 2);
        assert_eq!(cached.pending_submissions_count().unwrap(), 2);
    }

    #[test]
    fn test_updated_hook_drops_submission_row() {
        let (backing, cached) = setup();
        backing.insert_submission(Submission::new(3, 10, "alice", "a"));
        assert_eq!(
            cached.get_submission(3).unwrap().unwrap().status,
            SubmissionStatus::Pending
        );

        backing.set_submission_status(3, SubmissionStatus::Approved);
        cached.on_submission_updated(3);

        assert_eq!(
            cached.get_submission(3).unwrap().unwrap().status,
            SubmissionStatus::Approved
        );
        assert!(cached.pending_submissions(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_reviewer_and_user_hooks() {
        let (backing, cached) = setup();
        backing.approve_reviewer(7);
        backing.insert_user(User::new(7));
        assert_eq!(cached.approved_reviewer_ids().unwrap(), vec![7]);
        assert_eq!(cached.get_user(7).unwrap().unwrap().wxpusher_uid, None);

        backing.approve_reviewer(8);
        backing.insert_user(User::new(7).with_wxpusher_uid("UID_7"));
        assert_eq!(cached.approved_reviewer_ids().unwrap(), vec![7]);

        cached.on_reviewer_changed();
        cached.on_user_updated(7);
        assert_eq!(cached.approved_reviewer_ids().unwrap(), vec![7, 8]);
        assert_eq!(
            cached.get_user(7).unwrap().unwrap().wxpusher_uid.as_deref(),
            Some("UID_7")
        );
    }

    fn smart_setup() -> (Arc<MemoryStore>, Arc<SmartCache>, CachedStore) {
        let backing = Arc::new(MemoryStore::new());
        let caches = Arc::new(CacheManager::in_memory());
        let smart = Arc::new(SmartCache::new(
            caches.clone(),
            Arc::new(store_prefetcher(backing.clone())),
            AdaptiveSettings::default(),
        ));
        let cached = CachedStore::new(backing.clone(), caches).with_smart(smart.clone());
        (backing, smart, cached)
    }

    #[test]
    fn test_smart_reads_are_tracked() {
        let (backing, smart, cached) = smart_setup();
        backing.insert_submission(Submission::new(1, 10, "alice", "hello"));

        cached.get_submission(1).unwrap();
        cached.get_submission(1).unwrap();
        cached.submission_stats().unwrap();

        let metrics = smart.metrics("submission_1").unwrap();
        assert_eq!((metrics.access_count, metrics.hit_count, metrics.miss_count), (2, 1, 1));
        assert!(smart.manager().cache(CacheKind::Stats).contains(STATS_KEY));
    }

    #[test]
    fn test_smart_reads_propagate_store_errors() {
        let (backing, _, cached) = smart_setup();
        backing.set_failing(true);
        assert!(cached.approved_reviewer_ids().is_err());

        backing.set_failing(false);
        backing.approve_reviewer(4);
        assert_eq!(cached.approved_reviewer_ids().unwrap(), vec![4]);
    }

    #[test]
    fn test_submission_hit_prefetches_tags_and_author() {
        let (backing, smart, cached) = smart_setup();
        let mut submission = Submission::new(2, 10, "alice", "tagged");
        submission.tags = vec!["news".into()];
        backing.insert_submission(submission);
        backing.insert_user(User::new(10).with_wxpusher_uid("UID_10"));

        cached.get_submission(2).unwrap();
        cached.get_submission(2).unwrap();

        let db = smart.manager().cache(CacheKind::Db);
        assert_eq!(db.get("submission_tags_2"), Some(serde_json::json!(["news"])));
        assert!(db.contains("submission_user_2"));
    }

    #[test]
    fn test_prefetcher_ignores_unknown_keys() {
        let backing = Arc::new(MemoryStore::new());
        let prefetcher = store_prefetcher(backing);

        assert_eq!(prefetcher.load(CacheKind::Db, "submission_tags_99"), None);
        assert_eq!(prefetcher.load(CacheKind::User, "submission_tags_1"), None);
        assert_eq!(prefetcher.load(CacheKind::Db, "user_stats_1"), None);
    }
}
