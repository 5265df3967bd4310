//! Capabilities the core consumes from the outside world.
//!
//! Loaders, the conversation engine and the session gate only talk to these
//! traits. [`http::ApiClient`] implements all of them against the REST
//! backend; tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    conversation::{CommentData, Thread},
    errors::AppError,
    loader::{PageRequest, Paginated},
    models::{Review, User},
};

pub mod http;

#[async_trait]
pub trait PageSource<T: Paginated>: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<T>, AppError>;
}

#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn fetch_review(&self, review_id: u64) -> Result<Review, AppError>;
    async fn fetch_threads(&self, review_id: u64) -> Result<Vec<Thread>, AppError>;
    async fn send_reply(&self, thread_id: u64, message: &str) -> Result<ReplyResponse, AppError>;
    async fn submit_rating(
        &self,
        review_id: u64,
        rating: u8,
        feedback: &str,
    ) -> Result<(), AppError>;
    /// Asks the backend to start a fresh AI review.
    async fn trigger_review(&self, target: ReviewTarget) -> Result<TriggeredReview, AppError>;
}

/// What a manually triggered review covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTarget {
    /// Addressed by repository and PR number, since the PR may not have
    /// been imported yet.
    PullRequest { repository_id: u64, pr_number: u64 },
    Commit { commit_id: u64 },
}

/// Acknowledgement for a triggered review. The review itself runs in the
/// background and shows up in the review history once it starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TriggeredReview {
    #[serde(default)]
    pub review_id: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    /// Set when the backend answered with the review already in progress.
    #[serde(skip)]
    pub already_exists: bool,
}

#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve_current_user(&self, token: &str) -> Result<User, AppError>;
}

/// Body returned by the reply endpoint. The AI's answer is only partially
/// decoded here; the full comment arrives with the next thread refresh.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplyResponse {
    #[serde(default)]
    pub ai_response: Option<AiReply>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AiReply {
    #[serde(default)]
    pub comment_data: Option<CommentData>,
}

impl ReplyResponse {
    pub fn updated_review(&self) -> Option<&crate::issues::ReviewReport> {
        self.ai_response
            .as_ref()?
            .comment_data
            .as_ref()?
            .updated_review
            .as_ref()
    }
}
