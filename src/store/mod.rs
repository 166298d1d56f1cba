//! Store Module
//!
//! Read access to submissions, users and reviewer applications, plus a
//! caching decorator and recipient resolution for notifications.

mod cached;
mod memory;
mod records;

pub use cached::{store_prefetcher, CachedStore};
pub use memory::MemoryStore;
pub use records::{
    ApplicationStatus, Recipient, ReviewerApplication, Submission, SubmissionCategory,
    SubmissionKind, SubmissionStats, SubmissionStatus, User,
};

use std::collections::HashSet;

use crate::error::Result;

// == Store Trait ==
/// Read side of the relational store.
///
/// Calls are synchronous; async callers wrap them in `spawn_blocking` when
/// the backend does real I/O.
pub trait SubmissionStore: Send + Sync {
    fn get_submission(&self, id: i64) -> Result<Option<Submission>>;

    fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    /// User ids of every approved reviewer application.
    fn approved_reviewer_ids(&self) -> Result<Vec<i64>>;

    fn pending_submissions(&self, limit: usize, offset: usize) -> Result<Vec<Submission>>;

    fn submission_stats(&self) -> Result<SubmissionStats>;

    fn pending_submissions_count(&self) -> Result<usize> {
        Ok(self.submission_stats()?.pending)
    }
}

// == Recipient Resolution ==
/// Admins first in configured order, then approved reviewers who are not
/// admins. Duplicates are dropped and each recipient carries the WxPusher
/// UID from its user row, when one exists.
pub fn resolve_recipients(
    store: &dyn SubmissionStore,
    admin_ids: &[i64],
) -> Result<Vec<Recipient>> {
    let mut seen = HashSet::new();
    let mut recipients = Vec::new();

    for &admin_id in admin_ids {
        if seen.insert(admin_id) {
            recipients.push(Recipient {
                chat_id: admin_id,
                is_admin: true,
                wxpusher_uid: wxpusher_uid(store, admin_id)?,
            });
        }
    }

    for reviewer_id in store.approved_reviewer_ids()? {
        if seen.insert(reviewer_id) {
            recipients.push(Recipient {
                chat_id: reviewer_id,
                is_admin: false,
                wxpusher_uid: wxpusher_uid(store, reviewer_id)?,
            });
        }
    }

    Ok(recipients)
}

fn wxpusher_uid(store: &dyn SubmissionStore, user_id: i64) -> Result<Option<String>> {
    Ok(store
        .get_user(user_id)?
        .and_then(|user| user.wxpusher_uid)
        .filter(|uid| !uid.is_empty()))
}
