//! Page-at-a-time accumulation of backend collections.
//!
//! One [`CollectionLoader`] backs each list a view shows (repositories,
//! organizations, pull requests, commits, review history). Page 1 replaces
//! the collection and later pages append to it. Every request is handed a
//! [`PageTicket`] stamped with the generation of the key/filter combination
//! it was issued for, so a response that arrives after the key or filters
//! moved on is dropped instead of overwriting newer data.

mod page;

pub use page::{AccumulationKey, Filters, MergeStrategy, Page, PageRequest, Paginated, Resource};

use tracing::{debug, instrument, trace, warn};

use crate::{
    backend::PageSource,
    errors::{AppError, Result},
    session::SessionWatch,
};

pub const DEFAULT_PER_PAGE: u32 = 15;

/// Proof that a page request was issued. Must be handed back to
/// [`CollectionLoader::apply`] with the fetch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    generation: u64,
    request: PageRequest,
}

impl PageTicket {
    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    pub fn page(&self) -> u32 {
        self.request.page
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied {
        strategy: MergeStrategy,
        received: usize,
        has_more: bool,
    },
    /// The response belonged to a superseded key or filter set.
    Stale,
}

pub struct CollectionLoader<T: Paginated> {
    per_page: u32,
    key: Option<AccumulationKey>,
    filters: Filters,
    generation: u64,
    items: Vec<T>,
    loaded_pages: u32,
    has_more: bool,
    in_flight: Option<PageTicket>,
    showing_previous: bool,
    last_error: Option<String>,
    session: SessionWatch,
}

impl<T: Paginated> CollectionLoader<T> {
    pub fn new(per_page: u32, session: SessionWatch) -> Self {
        Self {
            per_page: per_page.max(1),
            key: None,
            filters: Filters::new(),
            generation: 0,
            items: Vec::new(),
            loaded_pages: 0,
            has_more: true,
            in_flight: None,
            showing_previous: false,
            last_error: None,
            session,
        }
    }

    pub fn resource(&self) -> Resource {
        T::RESOURCE
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn loaded_pages(&self) -> u32 {
        self.loaded_pages
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn key(&self) -> Option<&AccumulationKey> {
        self.key.as_ref()
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True while the visible items belong to an earlier key or filter set
    /// whose replacement page 1 has not arrived (or failed).
    pub fn showing_previous_results(&self) -> bool {
        self.showing_previous
    }

    /// Registers a request for `page` and returns the ticket for it.
    ///
    /// Page 1 is always accepted: it starts a new generation, so whatever is
    /// still in flight becomes stale. Any other page must continue the
    /// current key and filters, follow the last loaded page, and wait for
    /// the previous request to finish.
    pub fn begin(
        &mut self,
        key: AccumulationKey,
        filters: Filters,
        page: u32,
    ) -> Result<PageTicket> {
        self.session.borrow().require_authenticated()?;
        if page == 0 {
            return Err(AppError::validation("page numbers start at 1"));
        }

        if page == 1 {
            let scope_changed = self.key.as_ref() != Some(&key) || self.filters != filters;
            self.generation += 1;
            if scope_changed {
                self.showing_previous = !self.items.is_empty();
                self.loaded_pages = 0;
                self.has_more = true;
                self.key = Some(key.clone());
                self.filters = filters.clone();
            }
        } else {
            if self.key.as_ref() != Some(&key) || self.filters != filters {
                return Err(AppError::validation(format!(
                    "page {page} requested for a different scope; start again from page 1"
                )));
            }
            if self.in_flight.is_some() {
                return Err(AppError::validation(format!(
                    "{} are still loading",
                    T::RESOURCE
                )));
            }
            if page != self.loaded_pages + 1 {
                return Err(AppError::validation(format!(
                    "page {page} requested but {} page(s) loaded",
                    self.loaded_pages
                )));
            }
            if !self.has_more {
                return Err(AppError::validation(format!("no more {}", T::RESOURCE)));
            }
        }

        let ticket = PageTicket {
            generation: self.generation,
            request: PageRequest {
                resource: T::RESOURCE,
                key,
                filters,
                page,
                per_page: self.per_page,
            },
        };
        trace!(?ticket, "page requested");
        self.in_flight = Some(ticket.clone());
        Ok(ticket)
    }

    /// Applies a fetch result. Either the whole page lands or nothing
    /// changes.
    pub fn apply(&mut self, ticket: PageTicket, result: Result<Vec<T>>) -> Result<LoadOutcome> {
        if ticket.generation != self.generation {
            debug!(
                resource = %T::RESOURCE,
                page = ticket.page(),
                "dropping response for superseded request"
            );
            return Ok(LoadOutcome::Stale);
        }
        self.in_flight = None;

        let items = match result {
            Ok(items) => items,
            Err(e) => {
                warn!(resource = %T::RESOURCE, page = ticket.page(), error = %e, "page load failed");
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let page = Page {
            items,
            number: ticket.request.page,
            per_page: ticket.request.per_page,
        };
        let strategy = MergeStrategy::for_page(page.number);
        let received = page.items.len();
        self.has_more = !page.is_final();
        match strategy {
            MergeStrategy::Replace => self.items = page.items,
            MergeStrategy::Append => self.items.extend(page.items),
        }
        self.loaded_pages = page.number;
        self.showing_previous = false;
        self.last_error = None;
        debug!(
            resource = %T::RESOURCE,
            page = page.number,
            received,
            total = self.items.len(),
            has_more = self.has_more,
            "page applied"
        );
        Ok(LoadOutcome::Applied {
            strategy,
            received,
            has_more: self.has_more,
        })
    }

    /// Fetches and applies one page. Holding `&mut self` across the fetch
    /// serializes calls for this collection.
    #[instrument(skip(self, source, filters), fields(resource = %T::RESOURCE))]
    pub async fn load_page(
        &mut self,
        source: &dyn PageSource<T>,
        key: AccumulationKey,
        filters: Filters,
        page: u32,
    ) -> Result<LoadOutcome> {
        let ticket = self.begin(key, filters, page)?;
        let result = source.fetch_page(ticket.request()).await;
        self.apply(ticket, result)
    }

    /// Loads page 1 for a (possibly new) key and filter set.
    pub async fn reset(
        &mut self,
        source: &dyn PageSource<T>,
        key: AccumulationKey,
        filters: Filters,
    ) -> Result<LoadOutcome> {
        self.load_page(source, key, filters, 1).await
    }

    /// Loads the page after the last one applied.
    pub async fn load_more(&mut self, source: &dyn PageSource<T>) -> Result<LoadOutcome> {
        let Some(key) = self.key.clone() else {
            return Err(AppError::validation("nothing loaded yet"));
        };
        let next = self.loaded_pages + 1;
        self.load_page(source, key, self.filters.clone(), next).await
    }

    /// Keeps loading until a short page arrives or `max_pages` are loaded.
    pub async fn load_all(
        &mut self,
        source: &dyn PageSource<T>,
        key: AccumulationKey,
        filters: Filters,
        max_pages: u32,
    ) -> Result<()> {
        self.reset(source, key, filters).await?;
        while self.has_more && self.loaded_pages < max_pages {
            self.load_more(source).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::watch;

    use super::*;
    use crate::models::Commit;
    use crate::session::{SessionState, tests::authenticated_watch};

    fn commit(id: u64) -> Commit {
        Commit {
            id,
            commit_hash: format!("{id:040x}"),
            message: format!("commit {id}"),
            author_github_id: None,
            timestamp: None,
        }
    }

    fn ids(loader: &CollectionLoader<Commit>) -> Vec<u64> {
        loader.items().iter().map(|c| c.id).collect()
    }

    fn filters(pairs: &[(&str, &str)]) -> Filters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Serves pages from a table keyed by (author filter, page).
    #[derive(Default)]
    struct TablePages {
        pages: HashMap<(String, u32), Vec<u64>>,
        fail_pages: Vec<(String, u32)>,
        calls: Mutex<Vec<PageRequest>>,
    }

    impl TablePages {
        fn with(mut self, author: &str, page: u32, ids: impl IntoIterator<Item = u64>) -> Self {
            self.pages
                .insert((author.to_string(), page), ids.into_iter().collect());
            self
        }

        fn failing(mut self, author: &str, page: u32) -> Self {
            self.fail_pages.push((author.to_string(), page));
            self
        }
    }

    #[async_trait]
    impl PageSource<Commit> for TablePages {
        async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Commit>> {
            self.calls.lock().unwrap().push(request.clone());
            let author = request.filters.get("author").cloned().unwrap_or_default();
            let slot = (author, request.page);
            if self.fail_pages.contains(&slot) {
                return Err(AppError::transport("list commits", "502 Bad Gateway"));
            }
            Ok(self
                .pages
                .get(&slot)
                .map(|ids| ids.iter().copied().map(commit).collect())
                .unwrap_or_default())
        }
    }

    fn loader(per_page: u32) -> CollectionLoader<Commit> {
        CollectionLoader::new(per_page, authenticated_watch())
    }

    const REPO: AccumulationKey = AccumulationKey::Repository(7);

    #[tokio::test]
    async fn full_pages_accumulate_in_order() {
        let source = TablePages::default()
            .with("", 1, 1..=3)
            .with("", 2, 4..=6)
            .with("", 3, 7..=9);
        let mut loader = loader(3);

        loader.reset(&source, REPO, Filters::new()).await.unwrap();
        loader.load_more(&source).await.unwrap();
        let outcome = loader.load_more(&source).await.unwrap();

        assert_eq!(ids(&loader), (1..=9).collect::<Vec<_>>());
        assert_eq!(loader.loaded_pages(), 3);
        assert!(loader.has_more());
        assert_eq!(
            outcome,
            LoadOutcome::Applied {
                strategy: MergeStrategy::Append,
                received: 3,
                has_more: true
            }
        );
    }

    #[tokio::test]
    async fn short_or_empty_page_ends_loading() {
        let source = TablePages::default().with("", 1, 1..=3).with("", 2, [4]);
        let mut loader = loader(3);
        loader.load_all(&source, REPO, Filters::new(), 10).await.unwrap();
        assert_eq!(ids(&loader), [1, 2, 3, 4]);
        assert!(!loader.has_more());
        assert!(matches!(
            loader.load_more(&source).await,
            Err(AppError::Validation(_))
        ));

        let empty = TablePages::default();
        let mut loader = self::loader(3);
        loader.reset(&empty, REPO, Filters::new()).await.unwrap();
        assert!(loader.items().is_empty());
        assert!(!loader.has_more());
    }

    #[tokio::test]
    async fn filter_change_replaces_with_first_page() {
        let source = TablePages::default()
            .with("", 1, 1..=2)
            .with("", 2, 3..=4)
            .with("ana", 1, [10, 11]);
        let mut loader = loader(2);
        loader.reset(&source, REPO, Filters::new()).await.unwrap();
        loader.load_more(&source).await.unwrap();
        assert_eq!(ids(&loader), [1, 2, 3, 4]);

        loader
            .reset(&source, REPO, filters(&[("author", "ana")]))
            .await
            .unwrap();
        assert_eq!(ids(&loader), [10, 11]);
        assert_eq!(loader.loaded_pages(), 1);
        assert!(!loader.showing_previous_results());
    }

    #[tokio::test]
    async fn failed_first_page_keeps_last_known_good_list() {
        let source = TablePages::default()
            .with("", 1, 1..=2)
            .failing("bob", 1);
        let mut loader = loader(2);
        loader.reset(&source, REPO, Filters::new()).await.unwrap();

        let err = loader
            .reset(&source, REPO, filters(&[("author", "bob")]))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(ids(&loader), [1, 2]);
        assert!(loader.showing_previous_results());
        assert!(loader.last_error().is_some());
        assert!(!loader.is_loading());
        // accumulation restarts at page 1 for the new filters
        assert_eq!(loader.loaded_pages(), 0);
        assert!(loader.load_more(&source).await.is_err());
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.last().map(|r| r.page), Some(1));
    }

    #[tokio::test]
    async fn failed_later_page_keeps_list_and_allows_retry() {
        let source = TablePages::default().with("", 1, 1..=2).failing("", 2);
        let mut loader = loader(2);
        loader.reset(&source, REPO, Filters::new()).await.unwrap();
        assert!(loader.load_more(&source).await.is_err());
        assert_eq!(ids(&loader), [1, 2]);
        assert!(loader.has_more());
        assert_eq!(loader.loaded_pages(), 1);
    }

    #[test]
    fn stale_first_page_is_ignored_after_scope_change() {
        let mut loader = loader(2);
        let old = loader.begin(REPO, Filters::new(), 1).unwrap();
        let new = loader
            .begin(AccumulationKey::Repository(8), Filters::new(), 1)
            .unwrap();

        let applied = loader.apply(new, Ok(vec![commit(80), commit(81)])).unwrap();
        assert!(matches!(applied, LoadOutcome::Applied { .. }));
        let stale = loader.apply(old, Ok(vec![commit(70)])).unwrap();
        assert_eq!(stale, LoadOutcome::Stale);
        assert_eq!(ids(&loader), [80, 81]);
        assert_eq!(loader.key(), Some(&AccumulationKey::Repository(8)));
    }

    #[test]
    fn stale_failure_is_ignored_too() {
        let mut loader = loader(2);
        let old = loader.begin(REPO, filters(&[("author", "a")]), 1).unwrap();
        let new = loader.begin(REPO, filters(&[("author", "b")]), 1).unwrap();
        let stale = loader
            .apply(old, Err(AppError::transport("list commits", "timeout")))
            .unwrap();
        assert_eq!(stale, LoadOutcome::Stale);
        assert!(loader.last_error().is_none());
        assert!(loader.is_loading());
        loader.apply(new, Ok(vec![commit(1)])).unwrap();
        assert!(!loader.is_loading());
    }

    #[test]
    fn later_page_is_stale_once_a_refresh_starts() {
        let mut loader = loader(2);
        let first = loader.begin(REPO, Filters::new(), 1).unwrap();
        loader.apply(first, Ok(vec![commit(1), commit(2)])).unwrap();

        let second = loader.begin(REPO, Filters::new(), 2).unwrap();
        let refresh = loader.begin(REPO, Filters::new(), 1).unwrap();
        let stale = loader
            .apply(second, Ok(vec![commit(3), commit(4)]))
            .unwrap();

        assert_eq!(stale, LoadOutcome::Stale);
        assert_eq!(ids(&loader), [1, 2]);
        assert!(loader.is_loading());
        loader.apply(refresh, Ok(vec![commit(5)])).unwrap();
        assert_eq!(ids(&loader), [5]);
        assert!(!loader.has_more());
    }

    #[test]
    fn next_page_waits_for_the_previous_one() {
        let mut loader = loader(2);
        let first = loader.begin(REPO, Filters::new(), 1).unwrap();
        assert!(matches!(
            loader.begin(REPO, Filters::new(), 2),
            Err(AppError::Validation(_))
        ));
        loader.apply(first, Ok(vec![commit(1), commit(2)])).unwrap();

        let second = loader.begin(REPO, Filters::new(), 2).unwrap();
        assert!(matches!(
            loader.begin(REPO, Filters::new(), 3),
            Err(AppError::Validation(_))
        ));
        loader.apply(second, Ok(vec![commit(3), commit(4)])).unwrap();
        assert!(matches!(
            loader.begin(REPO, Filters::new(), 5),
            Err(AppError::Validation(_))
        ));
        assert_eq!(ids(&loader), [1, 2, 3, 4]);
    }

    #[test]
    fn requests_wait_for_an_authenticated_session() {
        let (_tx, rx) = watch::channel(SessionState::default());
        let mut loader: CollectionLoader<Commit> = CollectionLoader::new(2, rx);
        assert!(matches!(
            loader.begin(REPO, Filters::new(), 1),
            Err(AppError::NotAuthenticated)
        ));
        assert!(!loader.is_loading());
    }

    #[tokio::test]
    async fn forwards_scope_and_filters_to_the_source() {
        let source = TablePages::default().with("ana", 1, [1]);
        let mut loader = loader(5);
        loader
            .reset(&source, REPO, filters(&[("author", "ana")]))
            .await
            .unwrap();
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].resource, Resource::Commits);
        assert_eq!(calls[0].key, REPO);
        assert_eq!(calls[0].per_page, 5);
        assert_eq!(calls[0].filters.get("author").map(String::as_str), Some("ana"));
    }
}
