use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::models::{Commit, Organization, PullRequest, Repository, ReviewContext, ReviewSummary};

/// Free-form constraints forwarded verbatim to the backend as query
/// parameters. Empty values are dropped when the request is built.
pub type Filters = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Repositories,
    Organizations,
    PullRequests,
    Commits,
    Reviews,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Repositories => "repositories",
            Resource::Organizations => "organizations",
            Resource::PullRequests => "pull requests",
            Resource::Commits => "commits",
            Resource::Reviews => "reviews",
        };
        f.write_str(s)
    }
}

/// The scope an accumulated collection belongs to. Changing it starts the
/// collection over from page 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccumulationKey {
    /// Collections scoped to the signed-in user.
    CurrentUser,
    Repository(u64),
    ReviewHistory { context: ReviewContext, id: u64 },
}

/// An item type that can be fetched page by page.
pub trait Paginated: DeserializeOwned + Clone + Send + Sync + 'static {
    const RESOURCE: Resource;
}

impl Paginated for Repository {
    const RESOURCE: Resource = Resource::Repositories;
}

impl Paginated for Organization {
    const RESOURCE: Resource = Resource::Organizations;
}

impl Paginated for PullRequest {
    const RESOURCE: Resource = Resource::PullRequests;
}

impl Paginated for Commit {
    const RESOURCE: Resource = Resource::Commits;
}

impl Paginated for ReviewSummary {
    const RESOURCE: Resource = Resource::Reviews;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub resource: Resource,
    pub key: AccumulationKey,
    pub filters: Filters,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// A page shorter than requested is the last one, whatever it contains.
    pub fn is_final(&self) -> bool {
        self.items.len() < self.per_page as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Append,
    Replace,
}

impl MergeStrategy {
    pub fn for_page(page: u32) -> Self {
        if page <= 1 {
            MergeStrategy::Replace
        } else {
            MergeStrategy::Append
        }
    }
}
