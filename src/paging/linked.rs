use super::{
    format_sorts, parse_sorts, query_value, with_query_value, LinkSet, PageState, PagedResult,
    ResettableResult, SortDescriptor, SortedResult,
};
use crate::client::Client;
use crate::config::PagingConfig;
use crate::descriptor::ReturnShape;
use crate::error::Result;
use crate::response::{DispatchContext, FromResponse, RawResponse};
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A page returned by a contract method, navigated through its `Link`
/// header.
///
/// The total count comes from the total-count header (the item count when
/// absent). The page number is inferred from the `prev` or `next` link and
/// the page size from the `first` or `last` link. Without a `Link` header
/// the request URL is the only (`first`) link.
#[derive(Debug, Clone)]
pub struct LinkedPage<T> {
    items: Vec<T>,
    links: LinkSet,
    state: PageState,
    sorts: Vec<SortDescriptor>,
    request_url: Url,
    client: Client,
}

impl<T> LinkedPage<T> {
    /// Builds a page from a response's headers.
    pub fn from_headers(items: Vec<T>, headers: &HeaderMap, request_url: Url, client: Client) -> Self {
        let config = client.paging_config();
        let total_count = headers
            .get(config.total_count_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());
        let values: Vec<&str> = headers
            .get_all(config.link_header.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let links = if values.is_empty() {
            LinkSet {
                first: Some(request_url.to_string()),
                ..LinkSet::default()
            }
        } else {
            LinkSet::parse(&values.join(", "))
        };
        Self::new(items, links, total_count, request_url, client)
    }

    pub fn new(
        items: Vec<T>,
        links: LinkSet,
        total_count: Option<usize>,
        request_url: Url,
        client: Client,
    ) -> Self {
        let config = client.paging_config();
        let total_count = total_count.unwrap_or(items.len());
        let number = |link: &Option<String>, key: &str| {
            link.as_deref()
                .and_then(|l| query_value(l, key))
                .and_then(|v| v.trim().parse::<usize>().ok())
        };

        let (page, page_size) = if links.first.is_none() && links.last.is_none() {
            (1, total_count)
        } else {
            let page = number(&links.prev, &config.page_key)
                .map(|p| p + 1)
                .or_else(|| number(&links.next, &config.page_key).map(|p| p.saturating_sub(1)))
                .unwrap_or(1)
                .max(1);
            let page_size = number(&links.first, &config.page_size_key)
                .or_else(|| number(&links.last, &config.page_size_key))
                .unwrap_or(total_count);
            (page, page_size)
        };

        let sorts = query_value(request_url.as_str(), &config.sort_key)
            .map(|s| parse_sorts(&s))
            .unwrap_or_default();

        Self {
            items,
            links,
            state: PageState {
                page,
                page_size,
                total_count,
            },
            sorts,
            request_url,
            client,
        }
    }

    pub fn links(&self) -> &LinkSet {
        &self.links
    }

    pub fn request_url(&self) -> &Url {
        &self.request_url
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    fn config(&self) -> &PagingConfig {
        self.client.paging_config()
    }

    /// The `first` (else `last`) link with its page parameter set to `page`.
    fn page_url(&self, page: usize) -> Option<Url> {
        let template = self.links.first.as_ref().or(self.links.last.as_ref())?;
        let url = self.request_url.join(template).ok()?;
        Some(with_query_value(&url, &self.config().page_key, Some(&page.to_string())))
    }
}

impl<T> LinkedPage<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn follow(&self, link: Option<&String>, cancel: &CancellationToken) -> Result<Option<Self>> {
        let Some(link) = link else {
            return Ok(None);
        };
        let url = self.request_url.join(link)?;
        self.open(url, cancel).await.map(Some)
    }

    async fn open(&self, url: Url, cancel: &CancellationToken) -> Result<Self> {
        tracing::debug!(url = %url, "Following page link");
        self.client.fetch(url, cancel).await
    }
}

#[async_trait]
impl<T> FromResponse for LinkedPage<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn shape() -> ReturnShape {
        ReturnShape::Paged
    }

    async fn from_response(response: RawResponse, context: &DispatchContext) -> Result<Self> {
        let meta = response.meta().clone();
        let items = if meta.status == StatusCode::NO_CONTENT {
            Vec::new()
        } else {
            let body = response.bytes().await?;
            context.deserialize(&meta, &body)?
        };
        Ok(Self::from_headers(items, &meta.headers, meta.url, context.client().clone()))
    }
}

#[async_trait]
impl<T> ResettableResult for LinkedPage<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    type Item = T;

    fn items(&self) -> &[T] {
        &self.items
    }

    fn total_count(&self) -> usize {
        self.state.total_count
    }

    /// Page 1 without sorting. Falls back to the request URL when there is no
    /// link to rewrite.
    async fn reset(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        let url = self.page_url(1).unwrap_or_else(|| self.request_url.clone());
        let url = with_query_value(&url, &self.config().sort_key, None);
        self.open(url, cancel).await.map(Some)
    }
}

#[async_trait]
impl<T> PagedResult for LinkedPage<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn page(&self) -> usize {
        self.state.page
    }

    fn page_size(&self) -> usize {
        self.state.page_size
    }

    fn has_next_page(&self) -> bool {
        self.links.next.is_some()
    }

    fn has_previous_page(&self) -> bool {
        self.links.prev.is_some()
    }

    fn has_first_page(&self) -> bool {
        self.links.first.is_some()
    }

    fn has_last_page(&self) -> bool {
        self.links.last.is_some()
    }

    async fn get_first(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.follow(self.links.first.as_ref(), cancel).await
    }

    async fn get_previous(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.follow(self.links.prev.as_ref(), cancel).await
    }

    async fn get_next(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.follow(self.links.next.as_ref(), cancel).await
    }

    async fn get_last(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.follow(self.links.last.as_ref(), cancel).await
    }

    async fn get_page(&self, page: usize, cancel: &CancellationToken) -> Result<Option<Self>> {
        if page == 0 {
            return Ok(None);
        }
        match self.page_url(page) {
            Some(url) => self.open(url, cancel).await.map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<T> SortedResult for LinkedPage<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn sorts(&self) -> &[SortDescriptor] {
        &self.sorts
    }

    async fn sort(&self, sorts: &[SortDescriptor], cancel: &CancellationToken) -> Result<Self> {
        let url = sorted_url(&self.request_url, self.config(), sorts);
        self.open(url, cancel).await
    }
}

fn sorted_url(url: &Url, config: &PagingConfig, sorts: &[SortDescriptor]) -> Url {
    let expression = format_sorts(sorts);
    let value = (!expression.is_empty()).then_some(expression.as_str());
    with_query_value(url, &config.sort_key, value)
}

/// A sortable, unpaged list returned by a contract method.
///
/// Sorting rewrites the sort parameter of the request URL and fetches again.
#[derive(Debug, Clone)]
pub struct SortedList<T> {
    items: Vec<T>,
    sorts: Vec<SortDescriptor>,
    request_url: Url,
    client: Client,
}

impl<T> SortedList<T> {
    pub fn new(items: Vec<T>, request_url: Url, client: Client) -> Self {
        let sorts = query_value(request_url.as_str(), &client.paging_config().sort_key)
            .map(|s| parse_sorts(&s))
            .unwrap_or_default();
        Self {
            items,
            sorts,
            request_url,
            client,
        }
    }

    pub fn request_url(&self) -> &Url {
        &self.request_url
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

#[async_trait]
impl<T> FromResponse for SortedList<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn shape() -> ReturnShape {
        ReturnShape::Sorted
    }

    async fn from_response(response: RawResponse, context: &DispatchContext) -> Result<Self> {
        let meta = response.meta().clone();
        let items = if meta.status == StatusCode::NO_CONTENT {
            Vec::new()
        } else {
            let body = response.bytes().await?;
            context.deserialize(&meta, &body)?
        };
        Ok(Self::new(items, meta.url, context.client().clone()))
    }
}

#[async_trait]
impl<T> ResettableResult for SortedList<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    type Item = T;

    fn items(&self) -> &[T] {
        &self.items
    }

    fn total_count(&self) -> usize {
        self.items.len()
    }

    async fn reset(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        self.sort(&[], cancel).await.map(Some)
    }
}

#[async_trait]
impl<T> SortedResult for SortedList<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn sorts(&self) -> &[SortDescriptor] {
        &self.sorts
    }

    async fn sort(&self, sorts: &[SortDescriptor], cancel: &CancellationToken) -> Result<Self> {
        let url = sorted_url(&self.request_url, self.client.paging_config(), sorts);
        tracing::debug!(url = %url, "Re-sorting list");
        self.client.fetch(url, cancel).await
    }
}
