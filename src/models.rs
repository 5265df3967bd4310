//! Resource shapes returned by the review backend.
//!
//! Every struct decodes leniently: unknown fields are ignored and optional
//! fields fall back to their defaults, since the backend serializers add
//! fields freely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::issues::ReviewReport;

/// Decodes an explicit `null` the same way as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub repo_name: String,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_login: Option<String>,
    #[serde(default)]
    pub github_native_id: Option<u64>,
}

impl Repository {
    pub fn is_owned_by(&self, username: &str) -> bool {
        self.owner_login.as_deref() == Some(username)
    }
}

/// Repositories split by whether the signed-in user owns them.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepositoryPartition<'a> {
    pub owned: Vec<&'a Repository>,
    pub collaborator: Vec<&'a Repository>,
}

pub fn partition_by_owner<'a>(repos: &'a [Repository], username: &str) -> RepositoryPartition<'a> {
    let (owned, collaborator) = repos.iter().partition(|r| r.is_owned_by(username));
    RepositoryPartition {
        owned,
        collaborator,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub pr_number: u64,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub author_github_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: u64,
    pub commit_hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub author_github_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Commit {
    pub fn short_hash(&self) -> &str {
        self.commit_hash.get(..7).unwrap_or(&self.commit_hash)
    }
}

/// A review as listed in a review history page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// The full review as returned by the detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub repository: Option<serde_json::Value>,
    #[serde(default)]
    pub review_data: Option<ReviewData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewData {
    #[serde(default)]
    pub final_result: Option<ReviewReport>,
}

impl Review {
    /// The report a view should show first, if the review has finished.
    pub fn initial_report(&self) -> Option<&ReviewReport> {
        self.review_data.as_ref()?.final_result.as_ref()
    }
}

/// Scope for the review history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ReviewContext {
    Pr,
    Commit,
}

impl ReviewContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewContext::Pr => "pr",
            ReviewContext::Commit => "commit",
        }
    }
}
