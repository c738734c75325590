use super::{PageState, PagedResult, ResettableResult};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A window over an in-memory collection.
///
/// Pages share the collection; navigation never copies items.
#[derive(Debug)]
pub struct LocalPage<T> {
    all: Arc<Vec<T>>,
    state: PageState,
}

impl<T> Clone for LocalPage<T> {
    fn clone(&self) -> Self {
        Self {
            all: Arc::clone(&self.all),
            state: self.state,
        }
    }
}

impl<T> LocalPage<T> {
    /// Page `page` (1-based, clamped to at least 1) of `items`. A zero page
    /// size shows everything on one page.
    pub fn new(items: Vec<T>, page: usize, page_size: usize) -> Self {
        Self {
            state: PageState {
                page: page.max(1),
                page_size,
                total_count: items.len(),
            },
            all: Arc::new(items),
        }
    }

    /// A single empty page.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 1, 0)
    }

    /// Every item of the collection, across all pages.
    pub fn all_items(&self) -> &[T] {
        &self.all
    }

    fn at(&self, page: usize) -> Option<Self> {
        self.state.contains(page).then(|| Self {
            all: Arc::clone(&self.all),
            state: self.state.at(page),
        })
    }
}

#[async_trait]
impl<T: Send + Sync> ResettableResult for LocalPage<T> {
    type Item = T;

    fn items(&self) -> &[T] {
        let PageState { page, page_size, .. } = self.state;
        if page_size == 0 {
            return &self.all;
        }
        let start = (page - 1).saturating_mul(page_size).min(self.all.len());
        let end = start.saturating_add(page_size).min(self.all.len());
        &self.all[start..end]
    }

    fn total_count(&self) -> usize {
        self.state.total_count
    }

    async fn reset(&self, _cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.at(1))
    }
}

#[async_trait]
impl<T: Send + Sync> PagedResult for LocalPage<T> {
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

    async fn get_first(&self, _cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.at(1))
    }

    async fn get_previous(&self, _cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.state.page.checked_sub(1).and_then(|p| self.at(p)))
    }

    async fn get_next(&self, _cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.at(self.state.page + 1))
    }

    async fn get_last(&self, _cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.at(self.state.total_pages().max(1)))
    }

    async fn get_page(&self, page: usize, _cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.at(page))
    }
}
