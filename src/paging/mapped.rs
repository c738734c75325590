use super::{PagedResult, ResettableResult, SortDescriptor, SortedResult};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type ItemMap<T, U> = Arc<dyn Fn(&T) -> U + Send + Sync>;

/// A result whose items are projected through a function.
///
/// Navigation goes through the source result; every page reached is
/// projected with the same function.
pub struct MappedPage<P: ResettableResult, U> {
    source: P,
    items: Vec<U>,
    map: ItemMap<P::Item, U>,
}

impl<P, U> fmt::Debug for MappedPage<P, U>
where
    P: ResettableResult + fmt::Debug,
    U: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedPage")
            .field("source", &self.source)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl<P: ResettableResult, U> MappedPage<P, U> {
    fn project(source: P, map: ItemMap<P::Item, U>) -> Self {
        let items = source.items().iter().map(|item| map(item)).collect();
        Self { source, items, map }
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn into_source(self) -> P {
        self.source
    }

    fn wrap(&self, source: P) -> Self {
        Self::project(source, Arc::clone(&self.map))
    }
}

/// Item projection for any navigable result.
pub trait PagedResultExt: ResettableResult {
    /// Projects every item through `map`, now and on every page reached later.
    fn map_items<U, F>(self, map: F) -> MappedPage<Self, U>
    where
        F: Fn(&Self::Item) -> U + Send + Sync + 'static,
    {
        MappedPage::project(self, Arc::new(map))
    }
}

impl<P: ResettableResult> PagedResultExt for P {}

#[async_trait]
impl<P, U> ResettableResult for MappedPage<P, U>
where
    P: ResettableResult,
    U: Send + Sync,
{
    type Item = U;

    fn items(&self) -> &[U] {
        &self.items
    }

    fn total_count(&self) -> usize {
        self.source.total_count()
    }

    async fn reset(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.source.reset(cancel).await?.map(|s| self.wrap(s)))
    }
}

#[async_trait]
impl<P, U> PagedResult for MappedPage<P, U>
where
    P: PagedResult,
    U: Send + Sync,
{
    fn page(&self) -> usize {
        self.source.page()
    }

    fn page_size(&self) -> usize {
        self.source.page_size()
    }

    fn has_next_page(&self) -> bool {
        self.source.has_next_page()
    }

    fn has_previous_page(&self) -> bool {
        self.source.has_previous_page()
    }

    fn has_first_page(&self) -> bool {
        self.source.has_first_page()
    }

    fn has_last_page(&self) -> bool {
        self.source.has_last_page()
    }

    async fn get_first(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.source.get_first(cancel).await?.map(|s| self.wrap(s)))
    }

    async fn get_previous(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.source.get_previous(cancel).await?.map(|s| self.wrap(s)))
    }

    async fn get_next(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.source.get_next(cancel).await?.map(|s| self.wrap(s)))
    }

    async fn get_last(&self, cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.source.get_last(cancel).await?.map(|s| self.wrap(s)))
    }

    async fn get_page(&self, page: usize, cancel: &CancellationToken) -> Result<Option<Self>> {
        Ok(self.source.get_page(page, cancel).await?.map(|s| self.wrap(s)))
    }
}

#[async_trait]
impl<P, U> SortedResult for MappedPage<P, U>
where
    P: SortedResult,
    U: Send + Sync,
{
    fn sorts(&self) -> &[SortDescriptor] {
        self.source.sorts()
    }

    async fn sort(&self, sorts: &[SortDescriptor], cancel: &CancellationToken) -> Result<Self> {
        let sorted = self.source.sort(sorts, cancel).await?;
        Ok(self.wrap(sorted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::LocalPage;

    #[tokio::test]
    async fn projection_follows_navigation() {
        let cancel = CancellationToken::new();
        let page = LocalPage::new(vec![1u32, 2, 3, 4, 5], 1, 2).map_items(|n| format!("#{}", n));
        assert_eq!(page.items(), &["#1", "#2"]);
        assert_eq!(page.total_pages(), 3);

        let next = page.get_next(&cancel).await.unwrap().unwrap();
        assert_eq!(next.page(), 2);
        assert_eq!(next.items(), &["#3", "#4"]);
        assert_eq!(next.source().items(), &[3, 4]);
    }
}
