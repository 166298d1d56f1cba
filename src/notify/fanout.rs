//! Notification Fan-out Module
//!
//! Delivers review notices to every admin and approved reviewer, one send
//! per recipient, and mirrors them to the push providers. Approved
//! submissions are published to the configured channels and groups through
//! the same per-target loop.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{BotError, Result};
use crate::notify::transport::{truncate_chars, BotTransport, ReviewKeyboard, TEXT_LIMIT};
use crate::push::{PushPlusClient, PushQueue, PushTemplate, WxPusherClient};
use crate::store::{resolve_recipients, Recipient, Submission, SubmissionKind, SubmissionStore};

const PREVIEW_LIMIT: usize = 300;
const FALLBACK_PREVIEW_LIMIT: usize = 200;

// == Payload ==
/// Attached media for a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    Photo(String),
    Video(String),
}

/// One rendered notification, sent identically to every recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPayload {
    pub submission_id: i64,
    pub text: String,
    pub media: Option<Media>,
    pub keyboard: Option<ReviewKeyboard>,
}

impl SubmissionPayload {
    /// Review notice for a new submission or business request.
    pub fn for_submission(submission: &Submission) -> Self {
        let business = submission.is_business();
        let preview = if submission.content.chars().count() > PREVIEW_LIMIT {
            format!("{}...", truncate_chars(&submission.content, PREVIEW_LIMIT))
        } else {
            submission.content.clone()
        };
        let tags = if submission.tags.is_empty() {
            String::new()
        } else {
            format!("\n🏷️ Tags: {}", submission.tags.join(", "))
        };

        let mut text = format!(
            "📬 {} #{}\nType: {}\nUser: @{}\n\nContent:\n{}{}",
            if business { "Business cooperation" } else { "New submission" },
            submission.id,
            submission.kind.as_str(),
            submission.username,
            preview,
            tags,
        );
        if !business && submission.anonymous {
            text.push_str("\n\n👤 This submission is anonymous");
        }

        Self {
            submission_id: submission.id,
            text,
            media: media_for(submission),
            keyboard: Some(ReviewKeyboard::for_submission(submission.id)),
        }
    }

    /// Public post for channels and groups: content, tags and, unless the
    /// author asked for anonymity, the author line.
    ///
    /// A post over the Telegram text limit drops its tags and truncates the
    /// content; the author line is always kept.
    pub fn for_publication(submission: &Submission) -> Self {
        let tags = if submission.tags.is_empty() {
            String::new()
        } else {
            format!("\n\n🏷️ #{}", submission.tags.join(" #"))
        };
        let author = if submission.anonymous {
            String::new()
        } else {
            format!("\n\n👤 @{}", submission.username)
        };

        let mut text = format!("{}{}{}", submission.content, tags, author);
        if text.chars().count() > TEXT_LIMIT {
            let available = TEXT_LIMIT.saturating_sub(author.chars().count());
            text = format!("{}{}", truncate_chars(&submission.content, available), author);
        }

        Self {
            submission_id: submission.id,
            text,
            media: media_for(submission),
            keyboard: None,
        }
    }

    /// Plain text notice without media or keyboard.
    pub fn text_only(submission_id: i64, text: impl Into<String>) -> Self {
        Self {
            submission_id,
            text: text.into(),
            media: None,
            keyboard: None,
        }
    }
}

/// Media groups use their cover file; single uploads their own file.
fn media_for(submission: &Submission) -> Option<Media> {
    let file = submission
        .file_ids
        .first()
        .or(submission.file_id.as_ref())
        .cloned()?;
    match submission.kind {
        SubmissionKind::Photo => Some(Media::Photo(file)),
        SubmissionKind::Video => Some(Media::Video(file)),
        SubmissionKind::Text => None,
    }
}

// == Report ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub submission_id: i64,
    pub successful_sends: usize,
    pub failed_sends: usize,
    /// Chats the send failed for
    pub failed_recipients: Vec<i64>,
    /// True when the admin-only fallback was used
    pub fallback: bool,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.successful_sends + self.failed_sends
    }
}

// == Notifier ==
pub struct Notifier {
    store: Arc<dyn SubmissionStore>,
    transport: Arc<dyn BotTransport>,
    admin_ids: Vec<i64>,
    management_group_id: Option<i64>,
    pushplus: Option<Arc<PushPlusClient>>,
    wxpusher: Option<Arc<WxPusherClient>>,
    push_queue: Option<Arc<PushQueue>>,
    queue_wxpusher: bool,
    publish_targets: Vec<i64>,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        transport: Arc<dyn BotTransport>,
        admin_ids: Vec<i64>,
    ) -> Self {
        Self {
            store,
            transport,
            admin_ids,
            management_group_id: None,
            pushplus: None,
            wxpusher: None,
            push_queue: None,
            queue_wxpusher: false,
            publish_targets: Vec::new(),
        }
    }

    pub fn with_management_group(mut self, group_id: Option<i64>) -> Self {
        self.management_group_id = group_id;
        self
    }

    pub fn with_pushplus(mut self, client: Arc<PushPlusClient>) -> Self {
        self.pushplus = Some(client);
        self
    }

    pub fn with_wxpusher(mut self, client: Arc<WxPusherClient>) -> Self {
        self.wxpusher = Some(client);
        self
    }

    /// Chats approved submissions are published to, channels first.
    pub fn with_publish_targets(mut self, channel_ids: &[i64], group_ids: &[i64]) -> Self {
        self.publish_targets.clear();
        for &chat_id in channel_ids.iter().chain(group_ids) {
            if !self.publish_targets.contains(&chat_id) {
                self.publish_targets.push(chat_id);
            }
        }
        self
    }

    /// Routes WxPusher notices through `queue` when `queue_wxpusher` is set.
    /// Without the flag the queue still takes direct sends that failed.
    pub fn with_push_queue(mut self, queue: Arc<PushQueue>, queue_wxpusher: bool) -> Self {
        self.push_queue = Some(queue);
        self.queue_wxpusher = queue_wxpusher;
        self
    }

    pub fn admin_ids(&self) -> &[i64] {
        &self.admin_ids
    }

    pub fn publish_targets(&self) -> &[i64] {
        &self.publish_targets
    }

    // == New Submission ==
    /// Notifies admins and reviewers about a submission awaiting review.
    ///
    /// Returns `NotFound` for an unknown id. Store failures switch to the
    /// admin-only fallback instead of failing the call.
    pub async fn notify_new_submission(&self, submission_id: i64) -> Result<FanoutReport> {
        let submission = match self.store.get_submission(submission_id) {
            Ok(Some(submission)) => submission,
            Ok(None) => {
                error!(submission_id, "Cannot notify, submission does not exist");
                return Err(BotError::NotFound(format!("submission {}", submission_id)));
            }
            Err(e) => {
                error!(submission_id, error = %e, "Loading submission failed");
                return Ok(self.fallback(submission_id, None).await);
            }
        };

        let recipients = match resolve_recipients(self.store.as_ref(), &self.admin_ids) {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(submission_id, error = %e, "Resolving recipients failed");
                return Ok(self.fallback(submission_id, Some(&submission)).await);
            }
        };

        let payload = SubmissionPayload::for_submission(&submission);
        let report = self.fan_out(&recipients, &payload).await;

        let template = if submission.is_business() {
            PushTemplate::BusinessRequest { submission_id }
        } else {
            PushTemplate::NewSubmission { submission_id }
        };
        self.dispatch_pushes(&template, &recipients);

        Ok(report)
    }

    // == Fan-out Core ==
    /// Sends `payload` to each recipient in order. A failed send is logged
    /// and skipped; nothing is retried.
    pub async fn fan_out(
        &self,
        recipients: &[Recipient],
        payload: &SubmissionPayload,
    ) -> FanoutReport {
        let mut report = FanoutReport {
            submission_id: payload.submission_id,
            ..FanoutReport::default()
        };

        for recipient in recipients {
            let keyboard = payload.keyboard.as_ref();
            let sent = match &payload.media {
                Some(Media::Photo(file)) => {
                    self.transport
                        .send_photo(recipient.chat_id, file, &payload.text, keyboard)
                        .await
                }
                Some(Media::Video(file)) => {
                    self.transport
                        .send_video(recipient.chat_id, file, &payload.text, keyboard)
                        .await
                }
                None => {
                    self.transport
                        .send_message(recipient.chat_id, &payload.text, keyboard)
                        .await
                }
            };

            match sent {
                Ok(_) => {
                    report.successful_sends += 1;
                    debug!(chat_id = recipient.chat_id, "Notification delivered");
                }
                Err(e) => {
                    report.failed_sends += 1;
                    report.failed_recipients.push(recipient.chat_id);
                    warn!(chat_id = recipient.chat_id, error = %e, "Notification delivery failed");
                }
            }
        }

        info!(
            submission_id = payload.submission_id,
            successful = report.successful_sends,
            failed = report.failed_sends,
            "Notification fan-out complete"
        );
        report
    }

    // == Fallback ==
    async fn fallback(&self, submission_id: i64, submission: Option<&Submission>) -> FanoutReport {
        let text = match submission {
            Some(submission) => format!(
                "📬 New submission #{}\nType: {}\nUser: @{}\n\nContent: {}...",
                submission_id,
                submission.kind.as_str(),
                submission.username,
                truncate_chars(&submission.content, FALLBACK_PREVIEW_LIMIT),
            ),
            None => format!(
                "📬 New submission #{}\n\nDetails are unavailable, please check the review queue.",
                submission_id
            ),
        };

        let admins = chat_recipients(&self.admin_ids, true);

        let mut report = self
            .fan_out(&admins, &SubmissionPayload::text_only(submission_id, text))
            .await;
        report.fallback = true;
        warn!(
            submission_id,
            successful = report.successful_sends,
            admins = admins.len(),
            "Fallback notification sent to admins only"
        );
        report
    }

    // == Business Requests ==
    /// Sends the full business request to recipients and the management group.
    pub async fn notify_business_request(&self, submission_id: i64) -> Result<FanoutReport> {
        let submission = self
            .store
            .get_submission(submission_id)?
            .ok_or_else(|| BotError::NotFound(format!("submission {}", submission_id)))?;

        let mut recipients = match resolve_recipients(self.store.as_ref(), &self.admin_ids) {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(submission_id, error = %e, "Loading reviewers failed, admins only");
                chat_recipients(&self.admin_ids, true)
            }
        };
        if let Some(group_id) = self.management_group_id {
            if recipients.iter().all(|r| r.chat_id != group_id) {
                recipients.push(Recipient {
                    chat_id: group_id,
                    is_admin: false,
                    wxpusher_uid: None,
                });
            }
        }

        let text = format!(
            "📩 New business request #{}\nUser: @{} (ID: {})\n\nDetails:\n{}\n\nPlease handle it soon!",
            submission_id, submission.username, submission.user_id, submission.content
        );
        let payload = SubmissionPayload {
            keyboard: Some(ReviewKeyboard::for_submission(submission_id)),
            ..SubmissionPayload::text_only(submission_id, text)
        };
        let report = self.fan_out(&recipients, &payload).await;

        self.spawn_pushplus(PushTemplate::BusinessRequest { submission_id });
        Ok(report)
    }

    // == Urge ==
    /// Pushes a review reminder to PushPlus and every reviewer's WxPusher.
    pub fn notify_urge(&self, submission_id: i64, username: &str) {
        let template = PushTemplate::Urge {
            submission_id,
            username: username.to_string(),
        };
        let recipients = resolve_recipients(self.store.as_ref(), &self.admin_ids)
            .unwrap_or_else(|e| {
                warn!(submission_id, error = %e, "Resolving WxPusher recipients failed");
                Vec::new()
            });
        self.dispatch_pushes(&template, &recipients);
    }

    // == Publishing ==
    /// Posts an approved submission to every publish target.
    ///
    /// Business requests are never published. A target that rejects the post
    /// is logged and the remaining targets still receive it.
    pub async fn publish_submission(&self, submission_id: i64) -> Result<FanoutReport> {
        let submission = self
            .store
            .get_submission(submission_id)?
            .ok_or_else(|| BotError::NotFound(format!("submission {}", submission_id)))?;

        if submission.is_business() {
            info!(submission_id, "Business request, not published");
            return Ok(FanoutReport {
                submission_id,
                ..FanoutReport::default()
            });
        }
        if self.publish_targets.is_empty() {
            warn!(submission_id, "No channels or groups configured for publishing");
        }

        info!(
            submission_id,
            kind = submission.kind.as_str(),
            targets = self.publish_targets.len(),
            "Publishing submission"
        );
        let targets = chat_recipients(&self.publish_targets, false);
        let payload = SubmissionPayload::for_publication(&submission);
        Ok(self.fan_out(&targets, &payload).await)
    }

    // == Push Dispatch ==
    /// PushPlus always goes out directly. WxPusher goes through the queue
    /// when `queue_wxpusher` is set and falls back to a direct send if the
    /// queue refuses; a failed direct send is handed to the queue for retry.
    fn dispatch_pushes(&self, template: &PushTemplate, recipients: &[Recipient]) {
        self.spawn_pushplus(template.clone());

        let uids: Vec<String> = recipients
            .iter()
            .filter_map(|r| r.wxpusher_uid.clone())
            .collect();
        if uids.is_empty() {
            return;
        }

        if self.queue_wxpusher {
            if let Some(queue) = &self.push_queue {
                let queued = queue.queue_push(
                    template.title(),
                    template.content(),
                    Some(uids.clone()),
                    None,
                );
                match queued {
                    Ok(_) => return,
                    Err(e) => {
                        warn!(error = %e, "Queueing WxPusher notice failed, sending directly")
                    }
                }
            }
        }

        self.spawn_wxpusher(template.clone(), uids);
    }

    fn spawn_wxpusher(&self, template: PushTemplate, uids: Vec<String>) {
        let Some(client) = self.wxpusher.clone().filter(|c| c.is_configured()) else {
            debug!("WxPusher not configured, skipping");
            return;
        };
        let retry_queue = self.push_queue.clone();

        tokio::spawn(async move {
            let Err(e) = client.send_template(&template, Some(uids.as_slice())).await else {
                return;
            };
            let Some(queue) = retry_queue else {
                warn!(error = %e, "WxPusher notice failed");
                return;
            };

            warn!(error = %e, "WxPusher notice failed, queued for retry");
            let requeued =
                queue.queue_push(template.title(), template.content(), Some(uids), None);
            if let Err(e) = requeued {
                error!(error = %e, "WxPusher notice dropped");
            }
        });
    }

    fn spawn_pushplus(&self, template: PushTemplate) {
        let Some(client) = self.pushplus.clone().filter(|c| c.is_configured()) else {
            debug!("PushPlus not configured, skipping");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = client.send_template(&template).await {
                warn!(error = %e, "PushPlus notice failed");
            }
        });
    }
}

fn chat_recipients(chat_ids: &[i64], is_admin: bool) -> Vec<Recipient> {
    chat_ids
        .iter()
        .map(|&chat_id| Recipient {
            chat_id,
            is_admin,
            wxpusher_uid: None,
        })
        .collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::notify::transport::MessageHandle;
    use crate::push::{PushQueueConfig, PushSender, RetryPolicy};
    use crate::store::{CachedStore, MemoryStore, SubmissionCategory, User};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(i64, String),
        Photo(i64, String),
        Video(i64, String),
    }

    #[derive(Default)]
    struct RecordingTransport {
        failing: HashSet<i64>,
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingTransport {
        fn failing(ids: &[i64]) -> Self {
            Self {
                failing: ids.iter().copied().collect(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, chat_id: i64, sent: Sent) -> Result<MessageHandle> {
            self.sent.lock().unwrap().push(sent);
            if self.failing.contains(&chat_id) {
                return Err(BotError::Transport("blocked".to_string()));
            }
            Ok(MessageHandle {
                chat_id,
                message_id: 1,
            })
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BotTransport for RecordingTransport {
        async fn send_message(
            &self,
            chat_id: i64,
            text: &str,
            _: Option<&ReviewKeyboard>,
        ) -> Result<MessageHandle> {
            self.record(chat_id, Sent::Text(chat_id, text.to_string()))
        }

        async fn send_photo(
            &self,
            chat_id: i64,
            photo: &str,
            _: &str,
            _: Option<&ReviewKeyboard>,
        ) -> Result<MessageHandle> {
            self.record(chat_id, Sent::Photo(chat_id, photo.to_string()))
        }

        async fn send_video(
            &self,
            chat_id: i64,
            video: &str,
            _: &str,
            _: Option<&ReviewKeyboard>,
        ) -> Result<MessageHandle> {
            self.record(chat_id, Sent::Video(chat_id, video.to_string()))
        }
    }

    /// Queue-side sender that accepts everything and remembers the UIDs.
    #[derive(Default)]
    struct RecordingSender {
        uids: Mutex<Vec<Option<Vec<String>>>>,
    }

    impl RecordingSender {
        async fn wait_for_calls(&self, count: usize) -> Vec<Option<Vec<String>>> {
            for _ in 0..200 {
                let calls = self.uids.lock().unwrap().clone();
                if calls.len() >= count {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("queue sender never received {count} messages");
        }
    }

    #[async_trait]
    impl PushSender for RecordingSender {
        async fn send(&self, _: &str, _: &str, uids: Option<&[String]>) -> Result<()> {
            self.uids.lock().unwrap().push(uids.map(<[String]>::to_vec));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    async fn wxpusher_answering(reply: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send/message"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;
        server
    }

    fn wxpusher_client(server: &MockServer) -> Arc<WxPusherClient> {
        Arc::new(
            WxPusherClient::new(Some("AT".into()))
                .with_base_url(server.uri())
                .with_retry(RetryPolicy {
                    attempts: 1,
                    delay: Duration::from_millis(1),
                }),
        )
    }

    async fn wait_for_wxpusher(server: &MockServer, count: usize) {
        for _ in 0..200 {
            let received = server.received_requests().await.unwrap_or_default();
            if received.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("wxpusher never received {count} requests");
    }

    fn store_with_uid_admin() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_submission(Submission::new(1, 500, "alice", "hello"));
        store.insert_user(User::new(1).with_wxpusher_uid("U1"));
        store
    }

    fn recipients(ids: &[i64]) -> Vec<Recipient> {
        ids.iter()
            .map(|&chat_id| Recipient {
                chat_id,
                is_admin: false,
                wxpusher_uid: None,
            })
            .collect()
    }

    fn notifier(
        store: Arc<MemoryStore>,
        transport: Arc<RecordingTransport>,
        admins: Vec<i64>,
    ) -> Notifier {
        Notifier::new(store, transport, admins)
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_stop_fanout() {
        let transport = Arc::new(RecordingTransport::failing(&[3]));
        let notifier = notifier(Arc::new(MemoryStore::new()), transport.clone(), vec![]);
        let payload = SubmissionPayload::text_only(1, "hello");

        let report = notifier.fan_out(&recipients(&[1, 2, 3, 4, 5]), &payload).await;

        assert_eq!(report.successful_sends, 4);
        assert_eq!(report.failed_sends, 1);
        assert_eq!(report.failed_recipients, vec![3]);
        assert_eq!(transport.sent().len(), 5);
    }

    #[tokio::test]
    async fn test_blocked_recipient_counts() {
        let transport = Arc::new(RecordingTransport::failing(&[2]));
        let notifier = notifier(Arc::new(MemoryStore::new()), transport, vec![]);

        let report = notifier
            .fan_out(&recipients(&[1, 2, 3]), &SubmissionPayload::text_only(9, "x"))
            .await;

        assert_eq!(report.successful_sends, 2);
        assert_eq!(report.failed_sends, 1);
        assert_eq!(report.attempted(), 3);
    }

    #[tokio::test]
    async fn test_new_submission_reaches_admins_and_reviewers_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert_submission(Submission::new(10, 500, "alice", "hello world"));
        store.approve_reviewer(20);
        store.approve_reviewer(1);
        let transport = Arc::new(RecordingTransport::default());
        let notifier = notifier(store, transport.clone(), vec![1, 2]);

        let report = notifier.notify_new_submission(10).await.unwrap();

        assert_eq!(report.successful_sends, 3);
        assert!(!report.fallback);
        let chats: Vec<i64> = transport
            .sent()
            .iter()
            .map(|s| match s {
                Sent::Text(id, _) | Sent::Photo(id, _) | Sent::Video(id, _) => *id,
            })
            .collect();
        assert_eq!(chats, vec![1, 2, 20]);
    }

    #[tokio::test]
    async fn test_media_selection() {
        let store = Arc::new(MemoryStore::new());
        let mut group = Submission::new(1, 500, "a", "album");
        group.kind = SubmissionKind::Photo;
        group.file_ids = vec!["cover".into(), "second".into()];
        group.file_id = Some("single".into());
        store.insert_submission(group);

        let mut video = Submission::new(2, 500, "a", "clip");
        video.kind = SubmissionKind::Video;
        video.file_id = Some("vid".into());
        store.insert_submission(video);

        let mut photo_without_file = Submission::new(3, 500, "a", "nothing attached");
        photo_without_file.kind = SubmissionKind::Photo;
        store.insert_submission(photo_without_file);

        let transport = Arc::new(RecordingTransport::default());
        let notifier = notifier(store, transport.clone(), vec![1]);
        for id in 1..=3 {
            notifier.notify_new_submission(id).await.unwrap();
        }

        let sent = transport.sent();
        assert_eq!(sent[0], Sent::Photo(1, "cover".into()));
        assert_eq!(sent[1], Sent::Video(1, "vid".into()));
        assert!(matches!(sent[2], Sent::Text(1, _)));
    }

    #[test]
    fn test_payload_text() {
        let mut submission = Submission::new(7, 1, "bob", "x".repeat(350));
        submission.tags = vec!["news".into(), "tech".into()];
        submission.anonymous = true;

        let payload = SubmissionPayload::for_submission(&submission);
        assert!(payload.text.starts_with("📬 New submission #7\nType: text\nUser: @bob"));
        assert!(payload.text.contains(&format!("{}...", "x".repeat(300))));
        assert!(payload.text.contains("🏷️ Tags: news, tech"));
        assert!(payload.text.ends_with("👤 This submission is anonymous"));

        submission.category = SubmissionCategory::Business;
        let payload = SubmissionPayload::for_submission(&submission);
        assert!(payload.text.starts_with("📬 Business cooperation #7"));
        assert!(!payload.text.contains("anonymous"));
    }

    #[tokio::test]
    async fn test_unknown_submission_is_not_found() {
        let transport = Arc::new(RecordingTransport::default());
        let notifier = notifier(Arc::new(MemoryStore::new()), transport.clone(), vec![1]);

        let result = notifier.notify_new_submission(404).await;

        assert!(matches!(result, Err(BotError::NotFound(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_uses_admin_fallback() {
        let store = Arc::new(MemoryStore::new());
        store.approve_reviewer(30);
        store.set_failing(true);
        let transport = Arc::new(RecordingTransport::default());
        let notifier = notifier(store, transport.clone(), vec![1, 2]);

        let report = notifier.notify_new_submission(5).await.unwrap();

        assert!(report.fallback);
        assert_eq!(report.successful_sends, 2);
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], Sent::Text(1, text) if text.starts_with("📬 New submission #5")));
    }

    #[tokio::test]
    async fn test_business_request_includes_management_group() {
        let store = Arc::new(MemoryStore::new());
        let mut submission = Submission::new(8, 600, "corp", "partnership offer");
        submission.category = SubmissionCategory::Business;
        store.insert_submission(submission);
        store.insert_user(User::new(1));
        let transport = Arc::new(RecordingTransport::default());
        let notifier =
            notifier(store, transport.clone(), vec![1]).with_management_group(Some(-100));

        let report = notifier.notify_business_request(8).await.unwrap();

        assert_eq!(report.successful_sends, 2);
        let sent = transport.sent();
        assert!(matches!(&sent[1], Sent::Text(-100, text) if text.contains("partnership offer")));
    }

    #[tokio::test]
    async fn test_failed_direct_wxpusher_send_is_queued_for_retry() {
        let wxpusher =
            wxpusher_answering(json!({"code": 1000, "data": [{"uid": "U1", "code": 1002}]})).await;
        let sender = Arc::new(RecordingSender::default());
        let queue = Arc::new(PushQueue::start(sender.clone(), PushQueueConfig::default()));
        let notifier = notifier(store_with_uid_admin(), Arc::default(), vec![1])
            .with_wxpusher(wxpusher_client(&wxpusher))
            .with_push_queue(queue.clone(), false);

        notifier.notify_new_submission(1).await.unwrap();

        let calls = sender.wait_for_calls(1).await;
        assert_eq!(calls, vec![Some(vec!["U1".to_string()])]);
        assert_eq!(wxpusher.received_requests().await.unwrap().len(), 1);
        assert_eq!(queue.stats().queued, 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_refused_queue_falls_back_to_direct_send() {
        let wxpusher =
            wxpusher_answering(json!({"code": 1000, "data": [{"uid": "U1", "code": 1001}]})).await;
        let sender = Arc::new(RecordingSender::default());
        let queue = Arc::new(PushQueue::start(sender.clone(), PushQueueConfig::default()));
        queue.shutdown().await;
        let notifier = notifier(store_with_uid_admin(), Arc::default(), vec![1])
            .with_wxpusher(wxpusher_client(&wxpusher))
            .with_push_queue(queue.clone(), true);

        notifier.notify_new_submission(1).await.unwrap();

        wait_for_wxpusher(&wxpusher, 1).await;
        assert_eq!(queue.stats().rejected, 1);
        assert!(sender.uids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_business_request_reviewer_outage_falls_back_to_admins() {
        let backing = Arc::new(MemoryStore::new());
        let mut submission = Submission::new(8, 600, "corp", "partnership offer");
        submission.category = SubmissionCategory::Business;
        backing.insert_submission(submission);
        backing.approve_reviewer(30);
        let store = Arc::new(CachedStore::new(
            backing.clone(),
            Arc::new(CacheManager::in_memory()),
        ));
        // The submission row stays cached while the reviewer query fails
        store.get_submission(8).unwrap();
        backing.set_failing(true);

        let transport = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(store, transport.clone(), vec![1, 2])
            .with_management_group(Some(-100));

        let report = notifier.notify_business_request(8).await.unwrap();

        assert_eq!(report.successful_sends, 3);
        let chats: Vec<i64> = transport
            .sent()
            .iter()
            .map(|s| match s {
                Sent::Text(id, _) | Sent::Photo(id, _) | Sent::Video(id, _) => *id,
            })
            .collect();
        assert_eq!(chats, vec![1, 2, -100]);
    }

    #[tokio::test]
    async fn test_publish_continues_past_failing_channel() {
        let store = Arc::new(MemoryStore::new());
        let mut submission = Submission::new(5, 500, "dana", "sunset");
        submission.kind = SubmissionKind::Photo;
        submission.file_id = Some("photo_1".into());
        store.insert_submission(submission);
        let transport = Arc::new(RecordingTransport::failing(&[-1001]));
        let notifier = notifier(store, transport.clone(), vec![1])
            .with_publish_targets(&[-1001, -1002], &[-2001, -1002]);

        let report = notifier.publish_submission(5).await.unwrap();

        assert_eq!(report.successful_sends, 2);
        assert_eq!(report.failed_recipients, vec![-1001]);
        assert_eq!(
            transport.sent(),
            vec![
                Sent::Photo(-1001, "photo_1".into()),
                Sent::Photo(-1002, "photo_1".into()),
                Sent::Photo(-2001, "photo_1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_business_request_is_never_published() {
        let store = Arc::new(MemoryStore::new());
        let mut submission = Submission::new(6, 500, "corp", "ad");
        submission.category = SubmissionCategory::Business;
        store.insert_submission(submission);
        let transport = Arc::new(RecordingTransport::default());
        let notifier =
            notifier(store, transport.clone(), vec![1]).with_publish_targets(&[-1001], &[]);

        let report = notifier.publish_submission(6).await.unwrap();

        assert_eq!(report.attempted(), 0);
        assert!(transport.sent().is_empty());
        assert!(matches!(
            notifier.publish_submission(99).await,
            Err(BotError::NotFound(_))
        ));
    }

    #[test]
    fn test_publication_caption() {
        let mut submission = Submission::new(3, 1, "erin", "morning walk");
        submission.tags = vec!["life".into(), "photo".into()];

        let signed = SubmissionPayload::for_publication(&submission);
        assert_eq!(signed.text, "morning walk\n\n🏷️ #life #photo\n\n👤 @erin");
        assert!(signed.keyboard.is_none());

        submission.anonymous = true;
        let anonymous = SubmissionPayload::for_publication(&submission);
        assert_eq!(anonymous.text, "morning walk\n\n🏷️ #life #photo");
    }

    #[test]
    fn test_long_publication_keeps_author_line() {
        let mut submission = Submission::new(4, 1, "frank", "y".repeat(5000));
        submission.tags = vec!["long".into()];

        let payload = SubmissionPayload::for_publication(&submission);

        assert_eq!(payload.text.chars().count(), TEXT_LIMIT);
        assert!(payload.text.ends_with("\n\n👤 @frank"));
        assert!(!payload.text.contains("#long"));
    }
}
