use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};

use crate::{
    auth::AuthProvider,
    backend::{
        PageSource, ReplyResponse, ReviewSource, ReviewTarget, TriggeredReview, UserResolver,
    },
    conversation::Thread,
    errors::{AppError, Result},
    loader::{AccumulationKey, PageRequest, Paginated, Resource},
    models::{Review, User},
};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 800;

/// REST client for the review backend. Reads the bearer token from the
/// store on every request so a logout takes effect immediately.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
    tokens: Arc<dyn AuthProvider>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListBody::Bare(items) | ListBody::Paged { results: items } => items,
        }
    }
}

#[derive(Serialize)]
struct ReplyBody<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct TriggerPrBody {
    repository_id: u64,
    pr_number: u64,
}

#[derive(Serialize)]
struct RatingBody<'a> {
    rating: u8,
    feedback: &'a str,
}

/// Path and query pairs for one page of a collection.
pub fn page_query(request: &PageRequest) -> (&'static str, Vec<(String, String)>) {
    let path = match request.resource {
        Resource::Repositories => "/user/repos",
        Resource::Organizations => "/user/organizations",
        Resource::PullRequests => "/pull-requests",
        Resource::Commits => "/commits",
        Resource::Reviews => "/reviews/history/",
    };
    let mut query = Vec::new();
    match &request.key {
        AccumulationKey::CurrentUser => {}
        AccumulationKey::Repository(id) => query.push(("repo_id".to_string(), id.to_string())),
        AccumulationKey::ReviewHistory { context, id } => {
            query.push(("context".to_string(), context.as_str().to_string()));
            query.push(("id".to_string(), id.to_string()));
        }
    }
    query.extend(
        request
            .filters
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    query.push(("page".to_string(), request.page.to_string()));
    query.push(("per_page".to_string(), request.per_page.to_string()));
    (path, query)
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

impl ApiClient {
    pub fn new(api_base: &str, timeout: Duration, tokens: Arc<dyn AuthProvider>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("reviewdesk/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::transport("build http client", e))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn request_with(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(token.trim())
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.tokens.get_token()?.ok_or(AppError::NotAuthenticated)?;
        Ok(self.request_with(method, path, &token))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::transport(operation, e))?;
        Self::decode(operation, response).await
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::transport(
                operation,
                format!(
                    "status {}: {}",
                    status.as_u16(),
                    truncate_for_error(&body, ERROR_BODY_LIMIT)
                ),
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::transport(operation, e))
    }
}

#[async_trait]
impl<T: Paginated> PageSource<T> for ApiClient {
    #[instrument(skip(self), fields(resource = %request.resource, page = request.page))]
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<T>> {
        let (path, query) = page_query(request);
        let builder = self.request(Method::GET, path)?.query(&query);
        let body: ListBody<T> = self.send_json("list page", builder).await?;
        let items = body.into_items();
        debug!(received = items.len(), "page fetched");
        Ok(items)
    }
}

#[async_trait]
impl ReviewSource for ApiClient {
    async fn fetch_review(&self, review_id: u64) -> Result<Review> {
        let builder = self.request(Method::GET, &format!("/reviews/{review_id}/"))?;
        self.send_json("fetch review", builder).await
    }

    async fn fetch_threads(&self, review_id: u64) -> Result<Vec<Thread>> {
        let builder = self.request(Method::GET, &format!("/reviews/{review_id}/threads/"))?;
        let body: ListBody<Thread> = self.send_json("list threads", builder).await?;
        Ok(body.into_items())
    }

    #[instrument(skip(self, message))]
    async fn send_reply(&self, thread_id: u64, message: &str) -> Result<ReplyResponse> {
        let builder = self
            .request(Method::POST, &format!("/threads/{thread_id}/reply/"))?
            .json(&ReplyBody { message });
        self.send_json("send reply", builder).await
    }

    async fn submit_rating(&self, review_id: u64, rating: u8, feedback: &str) -> Result<()> {
        let builder = self
            .request(
                Method::POST,
                &format!("/reviews/{review_id}/submit_ai_rating/"),
            )?
            .json(&RatingBody { rating, feedback });
        let _: serde_json::Value = self.send_json("submit rating", builder).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn trigger_review(&self, target: ReviewTarget) -> Result<TriggeredReview> {
        const OPERATION: &str = "trigger review";
        let builder = match target {
            ReviewTarget::PullRequest {
                repository_id,
                pr_number,
            } => self
                .request(Method::POST, "/pull-requests/trigger-review/")?
                .json(&TriggerPrBody {
                    repository_id,
                    pr_number,
                }),
            ReviewTarget::Commit { commit_id } => self.request(
                Method::POST,
                &format!("/commits/{commit_id}/trigger_review/"),
            )?,
        };
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::transport(OPERATION, e))?;
        // 409 carries the review that is already queued or finished.
        if response.status() == StatusCode::CONFLICT {
            let mut existing: TriggeredReview = response
                .json()
                .await
                .map_err(|e| AppError::transport(OPERATION, e))?;
            existing.already_exists = true;
            debug!(review_id = ?existing.review_id, "review already exists");
            return Ok(existing);
        }
        Self::decode(OPERATION, response).await
    }
}

#[async_trait]
impl UserResolver for ApiClient {
    async fn resolve_current_user(&self, token: &str) -> Result<User> {
        let builder = self.request_with(Method::GET, "/user", token);
        self.send_json("resolve current user", builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Filters;
    use crate::models::ReviewContext;

    fn request(key: AccumulationKey, resource: Resource, filters: Filters) -> PageRequest {
        PageRequest {
            resource,
            key,
            filters,
            page: 2,
            per_page: 15,
        }
    }

    #[test]
    fn review_history_query_carries_context_and_id() {
        let (path, query) = page_query(&request(
            AccumulationKey::ReviewHistory {
                context: ReviewContext::Commit,
                id: 77,
            },
            Resource::Reviews,
            Filters::new(),
        ));
        assert_eq!(path, "/reviews/history/");
        let pairs: Vec<(&str, &str)> = query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("context", "commit"),
                ("id", "77"),
                ("page", "2"),
                ("per_page", "15")
            ]
        );
    }

    #[test]
    fn blank_filters_are_dropped() {
        let mut filters = Filters::new();
        filters.insert("author".into(), "octo".into());
        filters.insert("status".into(), "  ".into());
        let (path, query) = page_query(&request(
            AccumulationKey::Repository(5),
            Resource::PullRequests,
            filters,
        ));
        assert_eq!(path, "/pull-requests");
        assert!(query.contains(&("repo_id".into(), "5".into())));
        assert!(query.contains(&("author".into(), "octo".into())));
        assert!(!query.iter().any(|(k, _)| k == "status"));
    }

    #[test]
    fn list_body_accepts_bare_and_paged_shapes() {
        let bare: ListBody<u32> = serde_json::from_str("[1,2]").unwrap();
        let paged: ListBody<u32> =
            serde_json::from_str(r#"{"count": 2, "results": [3]}"#).unwrap();
        assert_eq!(bare.into_items(), [1, 2]);
        assert_eq!(paged.into_items(), [3]);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        assert_eq!(truncate_for_error("abcdef", 3), "abc...");
        assert_eq!(truncate_for_error("abc", 3), "abc");
    }
}
