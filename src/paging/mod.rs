//! Navigable paged and sorted results.
//!
//! Three families share the same traits:
//!
//! * [`LinkedPage`] and [`SortedList`] come back from contract calls and
//!   navigate by following `Link` headers and rewriting query parameters.
//! * [`QueryPage`] asks a [`QueryHandler`] for each page, optionally
//!   narrowed by a caller-defined filter.
//! * [`LocalPage`] windows an in-memory collection.
//!
//! Navigation never mutates a result; every step yields a new one. A step
//! that has nowhere to go yields `None`.

mod filter;
mod link;
mod linked;
mod local;
mod mapped;
mod query;
mod sort;

pub use filter::{FilterAction, FilterCondition, FilterLogic};
pub use link::LinkSet;
pub use linked::{LinkedPage, SortedList};
pub use local::LocalPage;
pub use mapped::{MappedPage, PagedResultExt};
pub use query::{on_query_created, PageContent, PageQuery, QueryHandler, QueryPage};
pub use sort::{format_sorts, parse_sorts, SortDescriptor, SortDirection};

use crate::error::Result;
use crate::format::encode_query;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Position of a page within a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageState {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
}

impl PageState {
    /// `ceil(total_count / page_size)`. A zero page size puts everything on
    /// one page.
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            usize::from(self.total_count > 0)
        } else {
            self.total_count.div_ceil(self.page_size)
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_first(&self) -> bool {
        self.page > 1
    }

    pub fn has_last(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Whether `page` can be navigated to. An empty set still has page 1.
    pub fn contains(&self, page: usize) -> bool {
        page >= 1 && page <= self.total_pages().max(1)
    }

    pub(crate) fn at(self, page: usize) -> Self {
        Self { page, ..self }
    }
}

/// A result that can be reset to its initial form.
#[async_trait]
pub trait ResettableResult: Send + Sync + Sized {
    type Item: Send + Sync;

    /// Items of the current page.
    fn items(&self) -> &[Self::Item];

    /// Number of items across all pages.
    fn total_count(&self) -> usize;

    /// The first page with no sorting applied, or `None` when the result
    /// cannot be reset.
    async fn reset(&self, cancel: &CancellationToken) -> Result<Option<Self>>;
}

/// A page of a larger result set.
#[async_trait]
pub trait PagedResult: ResettableResult {
    /// 1-based page number.
    fn page(&self) -> usize;

    fn page_size(&self) -> usize;

    fn has_next_page(&self) -> bool;
    fn has_previous_page(&self) -> bool;
    fn has_first_page(&self) -> bool;
    fn has_last_page(&self) -> bool;

    fn total_pages(&self) -> usize {
        PageState {
            page: self.page(),
            page_size: self.page_size(),
            total_count: self.total_count(),
        }
        .total_pages()
    }

    async fn get_first(&self, cancel: &CancellationToken) -> Result<Option<Self>>;
    async fn get_previous(&self, cancel: &CancellationToken) -> Result<Option<Self>>;
    async fn get_next(&self, cancel: &CancellationToken) -> Result<Option<Self>>;
    async fn get_last(&self, cancel: &CancellationToken) -> Result<Option<Self>>;

    /// Jumps to a 1-based page.
    async fn get_page(&self, page: usize, cancel: &CancellationToken) -> Result<Option<Self>>;
}

/// A result whose ordering can be changed.
#[async_trait]
pub trait SortedResult: ResettableResult {
    /// Sort keys currently applied, most significant first.
    fn sorts(&self) -> &[SortDescriptor];

    /// The same result ordered by `sorts`. An empty slice removes ordering.
    async fn sort(&self, sorts: &[SortDescriptor], cancel: &CancellationToken) -> Result<Self>;
}

/// A result narrowed by a filter model.
#[async_trait]
pub trait FilteredResult: PagedResult {
    type Filter: Send + Sync;

    fn filter(&self) -> &Self::Filter;

    /// The first page of the result under `filter`, keeping page size and
    /// ordering.
    async fn with_filter(&self, filter: Self::Filter, cancel: &CancellationToken) -> Result<Self>;
}

/// Value of the first query parameter named `key` (ASCII case-insensitive)
/// in `link`, which may be absolute or relative.
pub(crate) fn query_value(link: &str, key: &str) -> Option<String> {
    let (_, query) = link.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.into_owned())
}

/// Returns `url` with the query parameter `key` set to `value`.
///
/// The first occurrence is replaced in place and later duplicates dropped;
/// a missing key is appended. `None` removes the parameter.
pub(crate) fn with_query_value(url: &Url, key: &str, value: Option<&str>) -> Url {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut seen = false;
    for (k, v) in url.query_pairs().into_owned() {
        if !k.eq_ignore_ascii_case(key) {
            pairs.push((k, v));
        } else if !seen {
            seen = true;
            if let Some(value) = value {
                pairs.push((k, value.to_string()));
            }
        }
    }
    if !seen {
        if let Some(value) = value {
            pairs.push((key.to_string(), value.to_string()));
        }
    }

    let mut url = url.clone();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&encode_query(&pairs)));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_state_flags() {
        let state = PageState {
            page: 2,
            page_size: 10,
            total_count: 25,
        };
        assert_eq!(state.total_pages(), 3);
        assert!(state.has_next() && state.has_previous());
        assert!(state.has_first() && state.has_last());

        let last = state.at(3);
        assert!(!last.has_next() && !last.has_last());
        assert!(last.contains(1) && !last.contains(4) && !last.contains(0));
    }

    #[test]
    fn empty_result_still_has_page_one() {
        let state = PageState {
            page: 1,
            page_size: 10,
            total_count: 0,
        };
        assert_eq!(state.total_pages(), 0);
        assert!(state.contains(1));
        assert!(!state.contains(2));
        assert!(!state.has_next() && !state.has_previous());
    }

    #[test]
    fn query_values_are_case_insensitive() {
        let link = "/items?Page=3&pageSize=20&sort=name%3Adesc#top";
        assert_eq!(query_value(link, "page").as_deref(), Some("3"));
        assert_eq!(query_value(link, "PAGESIZE").as_deref(), Some("20"));
        assert_eq!(query_value(link, "sort").as_deref(), Some("name:desc"));
        assert_eq!(query_value("/items", "page"), None);
    }

    #[test]
    fn query_values_are_replaced_appended_or_removed() {
        let url = Url::parse("http://api.test/items?page=1&q=a&page=9").unwrap();

        let replaced = with_query_value(&url, "page", Some("4"));
        assert_eq!(replaced.query(), Some("page=4&q=a"));

        let appended = with_query_value(&url, "sort", Some("name"));
        assert_eq!(appended.query(), Some("page=1&q=a&page=9&sort=name"));

        let removed = with_query_value(&url, "page", None);
        assert_eq!(removed.query(), Some("q=a"));

        let bare = Url::parse("http://api.test/items?sort=x").unwrap();
        assert_eq!(with_query_value(&bare, "sort", None).query(), None);
    }
}
