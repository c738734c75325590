use super::{
    FilterCondition, FilteredResult, PageState, PagedResult, ResettableResult, SortDescriptor,
    SortedResult,
};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a [`QueryHandler`] is asked for.
///
/// `F` is the caller's filter model; unfiltered queries use `()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery<F = ()> {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub sorts: Vec<SortDescriptor>,
    pub conditions: Vec<FilterCondition>,
    pub filter: F,
}

impl PageQuery {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self::filtered(page, page_size, ())
    }
}

impl<F> PageQuery<F> {
    pub fn filtered(page: usize, page_size: usize, filter: F) -> Self {
        Self {
            page: page.max(1),
            page_size,
            sorts: Vec::new(),
            conditions: Vec::new(),
            filter,
        }
    }

    pub fn sorted(mut self, sorts: Vec<SortDescriptor>) -> Self {
        self.sorts = sorts;
        self
    }

    pub fn condition(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}

impl<F: Clone> PageQuery<F> {
    fn at(&self, page: usize) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }

    /// Page 1 under new ordering and filter.
    fn restart(&self, sorts: Vec<SortDescriptor>, filter: F) -> Self {
        Self {
            page: 1,
            page_size: self.page_size,
            sorts,
            conditions: self.conditions.clone(),
            filter,
        }
    }
}

/// One page of items and the size of the whole set.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

/// Produces pages on demand.
///
/// Implemented for async closures taking a [`PageQuery`] and a cancellation
/// token.
///
/// # Examples
///
/// ```
/// use restract::paging::{PageContent, PageQuery, PagedResult, QueryPage, ResettableResult};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), restract::Error> {
/// let numbers: Vec<u32> = (1..=25).collect();
/// let handler = Arc::new(move |query: PageQuery, _cancel: CancellationToken| {
///     let start = (query.page - 1) * query.page_size;
///     let items = numbers.iter().skip(start).take(query.page_size).copied().collect();
///     let total_count = numbers.len();
///     async move { Ok::<_, restract::Error>(PageContent { items, total_count }) }
/// });
///
/// let cancel = CancellationToken::new();
/// let page = QueryPage::<u32>::load(handler, PageQuery::new(1, 10), &cancel).await?;
/// let last = page.get_last(&cancel).await?.unwrap();
/// assert_eq!(last.items(), &[21, 22, 23, 24, 25]);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait QueryHandler<T, F = ()>: Send + Sync {
    async fn query(&self, query: PageQuery<F>, cancel: &CancellationToken) -> Result<PageContent<T>>;
}

#[async_trait]
impl<T, F, H, Fut> QueryHandler<T, F> for H
where
    T: Send + 'static,
    F: Send + 'static,
    H: Fn(PageQuery<F>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PageContent<T>>> + Send,
{
    async fn query(&self, query: PageQuery<F>, cancel: &CancellationToken) -> Result<PageContent<T>> {
        (self)(query, cancel.clone()).await
    }
}

struct Hooked<T, F, H> {
    inner: Arc<dyn QueryHandler<T, F>>,
    hook: H,
}

#[async_trait]
impl<T, F, H> QueryHandler<T, F> for Hooked<T, F, H>
where
    T: Send + 'static,
    F: Send + 'static,
    H: Fn(&mut PageQuery<F>) + Send + Sync,
{
    async fn query(&self, mut query: PageQuery<F>, cancel: &CancellationToken) -> Result<PageContent<T>> {
        (self.hook)(&mut query);
        self.inner.query(query, cancel).await
    }
}

/// Wraps `handler` so `hook` sees every query right before it is sent.
///
/// The hook may add conditions or change the page size. Its changes apply to
/// that one call; the page keeps navigating from the query it was built with.
pub fn on_query_created<T, F, H>(
    handler: Arc<dyn QueryHandler<T, F>>,
    hook: H,
) -> Arc<dyn QueryHandler<T, F>>
where
    T: Send + 'static,
    F: Send + 'static,
    H: Fn(&mut PageQuery<F>) + Send + Sync + 'static,
{
    Arc::new(Hooked { inner: handler, hook })
}

/// A page produced by a [`QueryHandler`].
///
/// Navigation re-queries the handler; targets outside
/// `1..=max(total_pages, 1)` yield `None` without a query.
pub struct QueryPage<T, F = ()> {
    items: Vec<T>,
    state: PageState,
    query: PageQuery<F>,
    handler: Arc<dyn QueryHandler<T, F>>,
}

impl<T: fmt::Debug, F: fmt::Debug> fmt::Debug for QueryPage<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPage")
            .field("items", &self.items)
            .field("state", &self.state)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl<T: Clone, F: Clone> Clone for QueryPage<T, F> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            state: self.state,
            query: self.query.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<T, F> QueryPage<T, F>
where
    T: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    /// Runs `query` and wraps the outcome.
    pub async fn load(
        handler: Arc<dyn QueryHandler<T, F>>,
        query: PageQuery<F>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        tracing::debug!(
            page = query.page,
            page_size = query.page_size,
            sorts = query.sorts.len(),
            conditions = query.conditions.len(),
            "Querying page"
        );
        let content = handler.query(query.clone(), cancel).await?;
        Ok(Self {
            items: content.items,
            state: PageState {
                page: query.page,
                page_size: query.page_size,
                total_count: content.total_count,
            },
            query,
            handler,
        })
    }

    pub fn query(&self) -> &PageQuery<F> {
        &self.query
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    async fn goto(&self, page: usize, cancel: &CancellationToken) -> Result<Option<Self>> {
        if !self.state.contains(page) {
            return Ok(None);
        }
        Self::load(Arc::clone(&self.handler), self.query.at(page), cancel)
            .await
            .map(Some)
    }
}

#[async_trait]
impl<T, F> ResettableResult for QueryPage<T, F>
where
    T: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn items(&self) -> &[T] {
        &self.items
    }

    fn total_count(&self) -> usize {
        self.state.total_count
    }

    /// Drops the ordering; the filter stays.
    async fn reset(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        let query = self.query.restart(Vec::new(), self.query.filter.clone());
        Self::load(Arc::clone(&self.handler), query, cancel)
            .await
            .map(Some)
    }
}

#[async_trait]
impl<T, F> PagedResult for QueryPage<T, F>
where
    T: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    fn page(&self) -> usize {
        self.state.page
    }

    fn page_size(&self) -> usize {
        self.state.page_size
    }

    fn has_next_page(&self) -> bool {
        self.state.has_next()
    }

    fn has_previous_page(&self) -> bool {
        self.state.has_previous()
    }

    fn has_first_page(&self) -> bool {
        self.state.has_first()
    }

    fn has_last_page(&self) -> bool {
        self.state.has_last()
    }

    async fn get_first(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.goto(1, cancel).await
    }

    async fn get_previous(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        match self.state.page.checked_sub(1) {
            Some(page) => self.goto(page, cancel).await,
            None => Ok(None),
        }
    }

    async fn get_next(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.goto(self.state.page + 1, cancel).await
    }

    async fn get_last(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.goto(self.state.total_pages().max(1), cancel).await
    }

    async fn get_page(&self, page: usize, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.goto(page, cancel).await
    }
}

#[async_trait]
impl<T, F> SortedResult for QueryPage<T, F>
where
    T: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    fn sorts(&self) -> &[SortDescriptor] {
        &self.query.sorts
    }

    /// Re-queries from page 1 with the new ordering.
    async fn sort(&self, sorts: &[SortDescriptor], cancel: &CancellationToken) -> Result<Self> {
        let query = self.query.restart(sorts.to_vec(), self.query.filter.clone());
        Self::load(Arc::clone(&self.handler), query, cancel).await
    }
}

#[async_trait]
impl<T, F> FilteredResult for QueryPage<T, F>
where
    T: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    type Filter = F;

    fn filter(&self) -> &F {
        &self.query.filter
    }

    async fn with_filter(&self, filter: F, cancel: &CancellationToken) -> Result<Self> {
        let query = self.query.restart(self.query.sorts.clone(), filter);
        Self::load(Arc::clone(&self.handler), query, cancel).await
    }
}
