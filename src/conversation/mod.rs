//! Threaded discussion with the AI reviewer for a single review.

mod thread;

pub use thread::{AI_USERNAME, Author, Comment, CommentAuthor, CommentData, Thread};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    backend::ReviewSource,
    errors::{AppError, Result},
    issues::{IssueAggregate, ReviewReport},
    models::Review,
    session::SessionWatch,
};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingReply {
    pub text: String,
    pub submitting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyOutcome {
    /// Whether the thread list was re-fetched after the reply landed.
    pub refreshed: bool,
    /// Whether the AI sent back a revised review that is now displayed.
    pub review_updated: bool,
}

/// Picks the thread with the most recent activity. Ties go to the thread
/// listed first.
pub fn default_thread(threads: &[Thread]) -> Option<u64> {
    threads
        .iter()
        .fold(None::<&Thread>, |best, t| match best {
            Some(b) if b.latest_activity() >= t.latest_activity() => Some(b),
            _ => Some(t),
        })
        .map(|t| t.id)
}

pub struct ConversationEngine {
    review_id: u64,
    source: Arc<dyn ReviewSource>,
    session: SessionWatch,
    review: Option<Review>,
    displayed: Option<ReviewReport>,
    threads: Vec<Thread>,
    expanded: HashSet<u64>,
    drafts: HashMap<u64, PendingReply>,
    expansion_seeded: bool,
    threads_error: Option<String>,
}

impl ConversationEngine {
    pub fn new(review_id: u64, source: Arc<dyn ReviewSource>, session: SessionWatch) -> Self {
        Self {
            review_id,
            source,
            session,
            review: None,
            displayed: None,
            threads: Vec::new(),
            expanded: HashSet::new(),
            drafts: HashMap::new(),
            expansion_seeded: false,
            threads_error: None,
        }
    }

    pub fn review_id(&self) -> u64 {
        self.review_id
    }

    pub fn review(&self) -> Option<&Review> {
        self.review.as_ref()
    }

    /// The review content currently on screen. Starts as the stored final
    /// result and is replaced whenever the AI revises it.
    pub fn displayed_report(&self) -> Option<&ReviewReport> {
        self.displayed.as_ref()
    }

    pub fn aggregate(&self) -> Option<IssueAggregate> {
        self.displayed.as_ref().map(ReviewReport::aggregate)
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread(&self, thread_id: u64) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == thread_id)
    }

    pub fn threads_error(&self) -> Option<&str> {
        self.threads_error.as_deref()
    }

    pub fn is_expanded(&self, thread_id: u64) -> bool {
        self.expanded.contains(&thread_id)
    }

    pub fn expanded_threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter().filter(|t| self.expanded.contains(&t.id))
    }

    pub fn pending(&self, thread_id: u64) -> Option<&PendingReply> {
        self.drafts.get(&thread_id)
    }

    pub fn draft(&self, thread_id: u64) -> &str {
        self.drafts
            .get(&thread_id)
            .map_or("", |p| p.text.as_str())
    }

    pub fn is_submitting(&self, thread_id: u64) -> bool {
        self.drafts.get(&thread_id).is_some_and(|p| p.submitting)
    }

    /// Loads the review and its threads together. A thread failure is kept
    /// as [`Self::threads_error`] so the review still shows.
    #[instrument(skip(self), fields(review_id = self.review_id))]
    pub async fn load(&mut self) -> Result<()> {
        self.session.borrow().require_authenticated()?;
        let source = self.source.clone();
        let (review, threads) = futures::join!(
            source.fetch_review(self.review_id),
            source.fetch_threads(self.review_id)
        );
        let review = review?;
        self.displayed = review.initial_report().cloned();
        self.review = Some(review);
        match threads {
            Ok(threads) => self.set_threads(threads),
            Err(e) => {
                warn!(error = %e, "could not load threads");
                self.threads_error = Some(e.to_string());
            }
        }
        Ok(())
    }

    pub async fn refresh_threads(&mut self) -> Result<()> {
        self.session.borrow().require_authenticated()?;
        let source = self.source.clone();
        match source.fetch_threads(self.review_id).await {
            Ok(threads) => {
                self.set_threads(threads);
                Ok(())
            }
            Err(e) => {
                self.threads_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Replaces the thread list. The first non-empty list expands its most
    /// recently active thread; later lists keep the user's expansion state.
    pub fn set_threads(&mut self, mut threads: Vec<Thread>) {
        for thread in threads.iter_mut() {
            thread.sort_comments();
        }
        if !self.expansion_seeded
            && let Some(id) = default_thread(&threads)
        {
            debug!(thread_id = id, "expanding most recent thread");
            self.expanded.insert(id);
            self.expansion_seeded = true;
        }
        let ids: HashSet<u64> = threads.iter().map(|t| t.id).collect();
        self.expanded.retain(|id| ids.contains(id));
        self.drafts.retain(|id, _| ids.contains(id));
        for id in &ids {
            self.drafts.entry(*id).or_default();
        }
        self.threads = threads;
        self.threads_error = None;
    }

    /// Flips one thread's expansion. Returns the new state, or `None` for an
    /// unknown thread.
    pub fn toggle(&mut self, thread_id: u64) -> Option<bool> {
        self.thread(thread_id)?;
        if self.expanded.remove(&thread_id) {
            Some(false)
        } else {
            self.expanded.insert(thread_id);
            Some(true)
        }
    }

    pub fn set_draft(&mut self, thread_id: u64, text: impl Into<String>) -> bool {
        match self.drafts.get_mut(&thread_id) {
            Some(pending) => {
                pending.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Validates the draft and marks it as submitting. Returns the message
    /// to send.
    pub fn begin_reply(&mut self, thread_id: u64) -> Result<String> {
        let pending = self
            .drafts
            .get(&thread_id)
            .ok_or_else(|| AppError::validation(format!("unknown thread {thread_id}")))?;
        if pending.text.trim().is_empty() {
            return Err(AppError::validation("reply must not be empty"));
        }
        if pending.submitting {
            return Err(AppError::validation("a reply is already being sent"));
        }
        self.session.borrow().require_authenticated()?;
        let pending = self
            .drafts
            .get_mut(&thread_id)
            .ok_or_else(|| AppError::validation(format!("unknown thread {thread_id}")))?;
        pending.submitting = true;
        Ok(pending.text.clone())
    }

    /// The reply was accepted: the draft is spent.
    pub fn complete_reply(&mut self, thread_id: u64) {
        if let Some(pending) = self.drafts.get_mut(&thread_id) {
            pending.text.clear();
            pending.submitting = false;
        }
    }

    /// The reply was not accepted: keep the draft for another try.
    pub fn fail_reply(&mut self, thread_id: u64) {
        if let Some(pending) = self.drafts.get_mut(&thread_id) {
            pending.submitting = false;
        }
    }

    /// Sends the draft for `thread_id`, then re-fetches every thread so the
    /// AI's answer shows up, then swaps in any review the AI revised.
    #[instrument(skip(self), fields(review_id = self.review_id))]
    pub async fn submit_reply(&mut self, thread_id: u64) -> Result<ReplyOutcome> {
        let message = self.begin_reply(thread_id)?;
        let source = self.source.clone();
        let response = match source.send_reply(thread_id, &message).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "reply failed; draft kept");
                self.fail_reply(thread_id);
                return Err(e);
            }
        };
        self.complete_reply(thread_id);

        let refreshed = match self.refresh_threads().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "reply sent but threads could not be refreshed");
                false
            }
        };
        let review_updated = match response.updated_review() {
            Some(report) => {
                info!("AI revised the review");
                self.displayed = Some(report.clone());
                true
            }
            None => false,
        };
        Ok(ReplyOutcome {
            refreshed,
            review_updated,
        })
    }

    /// Rates the AI review. Both a rating and feedback text are required.
    pub async fn submit_rating(&self, rating: u8, feedback: &str) -> Result<()> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(AppError::validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        if feedback.trim().is_empty() {
            return Err(AppError::validation("feedback must not be empty"));
        }
        self.session.borrow().require_authenticated()?;
        self.source
            .submit_rating(self.review_id, rating, feedback)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::backend::{ReplyResponse, ReviewTarget, TriggeredReview};
    use crate::session::tests::authenticated_watch;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn thread(id: u64, last_comment_minute: Option<i64>) -> Thread {
        Thread {
            id,
            title: Some(format!("t{id}")),
            status: "open".into(),
            thread_type: Some("main".into()),
            comments: Vec::new(),
            last_comment_at: last_comment_minute.map(at),
            created_at: at(0),
        }
    }

    fn comment(id: u64, user: &str, minute: i64, body: &str) -> Comment {
        Comment {
            id,
            user: Some(CommentAuthor {
                id: None,
                username: user.into(),
            }),
            comment: body.into(),
            comment_data: None,
            created_at: at(minute),
            kind: "question".into(),
        }
    }

    fn review() -> Review {
        serde_json::from_value(json!({
            "id": 42,
            "status": "completed",
            "created_at": "2024-05-01T09:00:00Z",
            "review_data": {"final_result": {"review": {
                "final": [{"file": "a.py", "critical_issues": ["eval"]}]
            }}}
        }))
        .unwrap()
    }

    #[derive(Default)]
    struct FakeReviews {
        threads: Mutex<Vec<Thread>>,
        threads_after_reply: Mutex<Option<Vec<Thread>>>,
        reply: Mutex<Option<Result<ReplyResponse>>>,
        fail_threads: bool,
        sent: Mutex<Vec<(u64, String)>>,
        ratings: Mutex<Vec<(u64, u8, String)>>,
    }

    #[async_trait]
    impl ReviewSource for FakeReviews {
        async fn fetch_review(&self, review_id: u64) -> Result<Review> {
            let mut r = review();
            r.id = review_id;
            Ok(r)
        }

        async fn fetch_threads(&self, _review_id: u64) -> Result<Vec<Thread>> {
            if self.fail_threads {
                return Err(AppError::transport("list threads", "500"));
            }
            Ok(self.threads.lock().unwrap().clone())
        }

        async fn send_reply(&self, thread_id: u64, message: &str) -> Result<ReplyResponse> {
            self.sent
                .lock()
                .unwrap()
                .push((thread_id, message.to_string()));
            if let Some(next) = self.threads_after_reply.lock().unwrap().take() {
                *self.threads.lock().unwrap() = next;
            }
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(ReplyResponse::default()))
        }

        async fn submit_rating(&self, review_id: u64, rating: u8, feedback: &str) -> Result<()> {
            self.ratings
                .lock()
                .unwrap()
                .push((review_id, rating, feedback.to_string()));
            Ok(())
        }

        async fn trigger_review(&self, _target: ReviewTarget) -> Result<TriggeredReview> {
            Ok(TriggeredReview::default())
        }
    }

    fn engine(source: FakeReviews) -> (ConversationEngine, Arc<FakeReviews>) {
        let source = Arc::new(source);
        let engine = ConversationEngine::new(42, source.clone(), authenticated_watch());
        (engine, source)
    }

    #[test]
    fn most_recent_thread_is_expanded_first() {
        let (mut engine, _) = engine(FakeReviews::default());
        engine.set_threads(vec![
            thread(1, Some(5)),
            thread(2, Some(30)),
            thread(3, Some(15)),
        ]);
        assert!(engine.is_expanded(2));
        assert!(!engine.is_expanded(1));
        assert!(!engine.is_expanded(3));
    }

    #[test]
    fn timestamps_past_the_hour_roll_over() {
        assert_eq!(at(60), Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap());
        assert!(thread(3, Some(60)).latest_activity() > thread(2, Some(59)).latest_activity());
    }

    #[test]
    fn activity_falls_back_to_creation_time() {
        let mut newer = thread(9, None);
        newer.created_at = at(50);
        assert_eq!(default_thread(&[thread(1, Some(20)), newer]), Some(9));
        assert_eq!(default_thread(&[thread(1, Some(20)), thread(2, Some(20))]), Some(1));
        assert_eq!(default_thread(&[]), None);
    }

    #[test]
    fn toggling_is_per_thread_and_survives_refresh() {
        let (mut engine, _) = engine(FakeReviews::default());
        engine.set_threads(vec![thread(1, Some(1)), thread(2, Some(2))]);
        assert_eq!(engine.toggle(1), Some(true));
        assert!(engine.is_expanded(1) && engine.is_expanded(2));
        assert_eq!(engine.toggle(2), Some(false));
        assert_eq!(engine.toggle(99), None);

        engine.set_threads(vec![
            thread(1, Some(1)),
            thread(2, Some(2)),
            thread(3, Some(60)),
        ]);
        assert!(engine.is_expanded(1));
        assert!(!engine.is_expanded(2));
        assert!(!engine.is_expanded(3));
    }

    #[test]
    fn comments_are_ordered_by_creation_time() {
        let (mut engine, _) = engine(FakeReviews::default());
        let mut t = thread(1, Some(9));
        t.comments = vec![
            comment(2, "ai_assistant", 8, "second"),
            comment(1, "octocat", 3, "first"),
        ];
        engine.set_threads(vec![t]);
        let bodies: Vec<_> = engine.threads()[0]
            .comments
            .iter()
            .map(|c| c.comment.as_str())
            .collect();
        assert_eq!(bodies, ["first", "second"]);
    }

    #[tokio::test]
    async fn empty_reply_is_rejected_without_sending() {
        let (mut engine, source) = engine(FakeReviews::default());
        engine.set_threads(vec![thread(1, Some(1))]);
        engine.set_draft(1, "   \n");
        let err = engine.submit_reply(1).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(source.sent.lock().unwrap().is_empty());
        assert!(!engine.is_submitting(1));
        assert_eq!(engine.draft(1), "   \n");
    }

    #[tokio::test]
    async fn successful_reply_clears_draft_and_reconciles() {
        let mut answered = thread(1, Some(20));
        answered.comments = vec![
            comment(1, "octocat", 10, "is this safe?"),
            comment(2, "ai_assistant", 11, "no:\n```py\neval(x)\n```"),
        ];
        let source = FakeReviews {
            threads: Mutex::new(vec![thread(1, Some(1))]),
            threads_after_reply: Mutex::new(Some(vec![answered])),
            reply: Mutex::new(Some(Ok(serde_json::from_value(json!({
                "ai_response": {"comment_data": {"updated_review": {"review": {
                    "final": [{"file": "a.py", "critical_issues": []}]
                }}}}
            }))
            .unwrap()))),
            ..Default::default()
        };
        let (mut engine, source) = engine(source);
        engine.load().await.unwrap();
        assert_eq!(engine.aggregate().unwrap().critical_count, 1);

        engine.set_draft(1, "is this safe?");
        let outcome = engine.submit_reply(1).await.unwrap();

        assert_eq!(
            outcome,
            ReplyOutcome {
                refreshed: true,
                review_updated: true
            }
        );
        assert_eq!(engine.draft(1), "");
        assert!(!engine.is_submitting(1));
        assert!(engine.is_expanded(1));
        assert_eq!(engine.thread(1).unwrap().comments.len(), 2);
        assert_eq!(engine.aggregate().unwrap().critical_count, 0);
        assert_eq!(
            source.sent.lock().unwrap().as_slice(),
            [(1, "is this safe?".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_reply_keeps_draft() {
        let source = FakeReviews {
            threads: Mutex::new(vec![thread(1, Some(1))]),
            reply: Mutex::new(Some(Err(AppError::transport("reply", "503")))),
            ..Default::default()
        };
        let (mut engine, _) = engine(source);
        engine.load().await.unwrap();
        engine.set_draft(1, "please recheck line 4");

        let err = engine.submit_reply(1).await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(engine.draft(1), "please recheck line 4");
        assert!(!engine.is_submitting(1));
        assert_eq!(engine.aggregate().unwrap().critical_count, 1);
    }

    #[tokio::test]
    async fn thread_failure_does_not_block_review() {
        let source = FakeReviews {
            fail_threads: true,
            ..Default::default()
        };
        let (mut engine, _) = engine(source);
        engine.load().await.unwrap();
        assert!(engine.review().is_some());
        assert!(engine.threads().is_empty());
        assert!(engine.threads_error().is_some());
    }

    #[test]
    fn begin_reply_marks_submitting_once() {
        let (mut engine, _) = engine(FakeReviews::default());
        engine.set_threads(vec![thread(1, Some(1))]);
        engine.set_draft(1, "hello");
        assert_eq!(engine.begin_reply(1).unwrap(), "hello");
        assert!(engine.is_submitting(1));
        assert!(matches!(engine.begin_reply(1), Err(AppError::Validation(_))));
        engine.fail_reply(1);
        assert!(!engine.is_submitting(1));
        assert_eq!(engine.draft(1), "hello");
    }

    #[tokio::test]
    async fn rating_is_validated_before_sending() {
        let (engine, source) = engine(FakeReviews::default());
        assert!(matches!(
            engine.submit_rating(0, "meh").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            engine.submit_rating(6, "meh").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            engine.submit_rating(4, "  ").await,
            Err(AppError::Validation(_))
        ));
        assert!(source.ratings.lock().unwrap().is_empty());

        engine.submit_rating(4, "useful").await.unwrap();
        assert_eq!(
            source.ratings.lock().unwrap().as_slice(),
            [(42, 4, "useful".to_string())]
        );
    }
}
