use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    issues::ReviewReport,
    models::null_as_default,
    segment::{Segment, segment},
};

/// Username the backend gives the AI reviewer.
pub const AI_USERNAME: &str = "ai_assistant";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub thread_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub last_comment_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Thread {
    pub fn latest_activity(&self) -> DateTime<Utc> {
        self.last_comment_at.unwrap_or(self.created_at)
    }

    pub fn display_title(&self) -> String {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => format!("Thread #{}", self.id),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == "open"
    }

    pub(crate) fn sort_comments(&mut self) {
        self.comments.sort_by_key(|c| c.created_at);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    #[serde(default)]
    pub id: Option<u64>,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub user: Option<CommentAuthor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment: String,
    #[serde(default)]
    pub comment_data: Option<CommentData>,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
}

/// Structured payload the AI attaches to its replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentData {
    #[serde(default)]
    pub feedback_status: Option<String>,
    #[serde(default)]
    pub feedback_explanation: Option<String>,
    #[serde(default)]
    pub feedback_suggestion: Option<String>,
    #[serde(default)]
    pub updated_review: Option<ReviewReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    Ai,
    Human,
}

impl Comment {
    pub fn author(&self) -> Author {
        match &self.user {
            Some(user) if user.username == AI_USERNAME => Author::Ai,
            _ => Author::Human,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == "error"
    }

    pub fn segments(&self) -> Vec<Segment<'_>> {
        segment(&self.comment)
    }

    /// The AI's structured analysis, when this comment carries one.
    pub fn analysis(&self) -> Option<&CommentData> {
        if self.author() == Author::Ai {
            self.comment_data.as_ref()
        } else {
            None
        }
    }
}
