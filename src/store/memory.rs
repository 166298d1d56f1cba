//! In-memory store used by tests and local runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{BotError, Result};
use crate::store::{
    ApplicationStatus, ReviewerApplication, Submission, SubmissionStats, SubmissionStatus,
    SubmissionStore, User,
};

#[derive(Debug, Default)]
struct Tables {
    submissions: BTreeMap<i64, Submission>,
    users: BTreeMap<i64, User>,
    applications: BTreeMap<i64, ReviewerApplication>,
}

/// Store backed by ordered maps, with failure injection and a query counter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BotError::Store("database unavailable".to_string()));
        }
        Ok(self.tables.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.write().submissions.insert(submission.id, submission);
    }

    pub fn set_submission_status(&self, id: i64, status: SubmissionStatus) -> bool {
        match self.write().submissions.get_mut(&id) {
            Some(submission) => {
                submission.status = status;
                true
            }
            None => false,
        }
    }

    pub fn insert_user(&self, user: User) {
        self.write().users.insert(user.user_id, user);
    }

    pub fn insert_application(&self, application: ReviewerApplication) {
        self.write().applications.insert(application.id, application);
    }

    /// Adds an approved reviewer application for `user_id`.
    pub fn approve_reviewer(&self, user_id: i64) {
        let mut tables = self.write();
        let id = tables.applications.keys().next_back().copied().unwrap_or(0) + 1;
        tables.applications.insert(
            id,
            ReviewerApplication {
                id,
                user_id,
                username: format!("reviewer_{user_id}"),
                status: ApplicationStatus::Approved,
            },
        );
    }

    /// Makes every query fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl SubmissionStore for MemoryStore {
    fn get_submission(&self, id: i64) -> Result<Option<Submission>> {
        Ok(self.read()?.submissions.get(&id).cloned())
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&user_id).cloned())
    }

    fn approved_reviewer_ids(&self) -> Result<Vec<i64>> {
        let tables = self.read()?;
        let mut ids: Vec<i64> = tables
            .applications
            .values()
            .filter(|a| a.status == ApplicationStatus::Approved)
            .map(|a| a.user_id)
            .collect();
        ids.dedup();
        Ok(ids)
    }

    fn pending_submissions(&self, limit: usize, offset: usize) -> Result<Vec<Submission>> {
        Ok(self
            .read()?
            .submissions
            .values()
            .filter(|s| s.status == SubmissionStatus::Pending)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn submission_stats(&self) -> Result<SubmissionStats> {
        let tables = self.read()?;
        let mut stats = SubmissionStats {
            total: tables.submissions.len(),
            ..SubmissionStats::default()
        };
        for submission in tables.submissions.values() {
            match submission.status {
                SubmissionStatus::Pending => stats.pending += 1,
                SubmissionStatus::Approved => stats.approved += 1,
                SubmissionStatus::Rejected => stats.rejected += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_paging_and_stats() {
        let store = MemoryStore::new();
        for id in 1..=5 {
            store.insert_submission(Submission::new(id, 100, "u", "c"));
        }
        store.set_submission_status(2, SubmissionStatus::Approved);

        let page: Vec<i64> = store
            .pending_submissions(2, 1)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(page, vec![3, 4]);

        let stats = store.submission_stats().unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.pending, 4);
        assert_eq!(stats.approved, 1);
    }

    #[test]
    fn test_failure_injection() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(matches!(store.get_submission(1), Err(BotError::Store(_))));
        store.set_failing(false);
        assert_eq!(store.get_submission(1).unwrap(), None);
        assert_eq!(store.query_count(), 2);
    }

    #[test]
    fn test_approved_reviewers_only() {
        let store = MemoryStore::new();
        store.approve_reviewer(7);
        store.insert_application(ReviewerApplication {
            id: 50,
            user_id: 8,
            username: "pending".into(),
            status: ApplicationStatus::Pending,
        });

        assert_eq!(store.approved_reviewer_ids().unwrap(), vec![7]);
    }
}
