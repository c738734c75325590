//! A holder for the currently displayed page.
//!
//! [`DataSource`] keeps one navigable result as its current view and swaps it
//! as callers move around. Observers subscribe to a broadcast channel; an
//! event is published only after the new view is in place, so a receiver
//! that reacts by calling [`DataSource::current`] always sees the new data.

use crate::error::{Error, Result};
use crate::paging::{
    FilteredResult, PageQuery, PagedResult, QueryHandler, QueryPage, ResettableResult, SortDescriptor,
    SortedResult,
};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 16;

/// What changed in a [`DataSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceEvent {
    /// The view was loaded, moved to another page, re-sorted or re-filtered.
    DataChanged,
    /// The current page was fetched again.
    Refreshed,
    /// The view went back to its initial form.
    Reset,
}

type Loader<P> = Box<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<P>> + Send + Sync>;

/// The current view over a navigable result.
///
/// Navigation methods return `Ok(false)` when there is nowhere to go; the
/// view and the channel are left untouched in that case.
///
/// # Examples
///
/// ```
/// use restract::paging::{LocalPage, ResettableResult};
/// use restract::{DataSource, DataSourceEvent};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), restract::Error> {
/// let source = DataSource::new(LocalPage::new(vec![1, 2, 3, 4], 1, 2));
/// let mut events = source.subscribe();
/// let cancel = CancellationToken::new();
///
/// assert!(source.move_next(&cancel).await?);
/// assert_eq!(events.try_recv().ok(), Some(DataSourceEvent::DataChanged));
/// assert_eq!(source.current().unwrap().items(), &[3, 4]);
///
/// assert!(!source.move_next(&cancel).await?);
/// # Ok(())
/// # }
/// ```
pub struct DataSource<P> {
    current: RwLock<Option<Arc<P>>>,
    loader: Option<Loader<P>>,
    loading: Mutex<()>,
    events: broadcast::Sender<DataSourceEvent>,
}

impl<P> fmt::Debug for DataSource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("loaded", &self.current.read().is_some())
            .field("lazy", &self.loader.is_some())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

impl<P> DataSource<P>
where
    P: ResettableResult + 'static,
{
    /// A source showing `initial`.
    pub fn new(initial: P) -> Self {
        Self::build(Some(Arc::new(initial)), None)
    }

    /// A source that calls `loader` the first time data is needed.
    pub fn with_loader<F, Fut>(loader: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P>> + Send + 'static,
    {
        Self::build(None, Some(Box::new(move |cancel| loader(cancel).boxed())))
    }

    fn build(current: Option<Arc<P>>, loader: Option<Loader<P>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: RwLock::new(current),
            loader,
            loading: Mutex::new(()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataSourceEvent> {
        self.events.subscribe()
    }

    /// The current view, if loaded.
    pub fn current(&self) -> Option<Arc<P>> {
        self.current.read().clone()
    }

    /// Returns the current view, loading it first if needed.
    ///
    /// Concurrent first callers share one load.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Configuration`] when nothing is loaded and there is
    /// no loader, or with whatever the loader fails with.
    pub async fn ensure_loaded(&self, cancel: &CancellationToken) -> Result<Arc<P>> {
        if let Some(current) = self.current() {
            return Ok(current);
        }
        let _loading = self.loading.lock().await;
        if let Some(current) = self.current() {
            return Ok(current);
        }
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| Error::Configuration("data source has no data and no loader".to_string()))?;

        tracing::debug!("Loading data source");
        let loaded = Arc::new(loader(cancel.clone()).await?);
        *self.current.write() = Some(Arc::clone(&loaded));
        self.notify(DataSourceEvent::DataChanged);
        Ok(loaded)
    }

    /// Returns to the initial form of the current result.
    pub async fn reset(&self, cancel: &CancellationToken) -> Result<bool> {
        let current = self.ensure_loaded(cancel).await?;
        let reset = current.reset(cancel).await?;
        Ok(self.swap(reset, DataSourceEvent::Reset))
    }

    fn swap(&self, next: Option<P>, event: DataSourceEvent) -> bool {
        let Some(next) = next else {
            return false;
        };
        *self.current.write() = Some(Arc::new(next));
        self.notify(event);
        true
    }

    fn notify(&self, event: DataSourceEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

impl<T, F> DataSource<QueryPage<T, F>>
where
    T: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    /// A lazily loaded source over a query handler, starting at `query`.
    pub fn from_query(handler: Arc<dyn QueryHandler<T, F>>, query: PageQuery<F>) -> Self {
        Self::with_loader(move |cancel| {
            let handler = Arc::clone(&handler);
            let query = query.clone();
            async move { QueryPage::load(handler, query, &cancel).await }
        })
    }
}

impl<P> DataSource<P>
where
    P: PagedResult + 'static,
{
    pub async fn move_first(&self, cancel: &CancellationToken) -> Result<bool> {
        let current = self.ensure_loaded(cancel).await?;
        let next = current.get_first(cancel).await?;
        Ok(self.swap(next, DataSourceEvent::DataChanged))
    }

    pub async fn move_previous(&self, cancel: &CancellationToken) -> Result<bool> {
        let current = self.ensure_loaded(cancel).await?;
        if !current.has_previous_page() {
            return Ok(false);
        }
        let next = current.get_previous(cancel).await?;
        Ok(self.swap(next, DataSourceEvent::DataChanged))
    }

    pub async fn move_next(&self, cancel: &CancellationToken) -> Result<bool> {
        let current = self.ensure_loaded(cancel).await?;
        if !current.has_next_page() {
            return Ok(false);
        }
        let next = current.get_next(cancel).await?;
        Ok(self.swap(next, DataSourceEvent::DataChanged))
    }

    pub async fn move_last(&self, cancel: &CancellationToken) -> Result<bool> {
        let current = self.ensure_loaded(cancel).await?;
        let next = current.get_last(cancel).await?;
        Ok(self.swap(next, DataSourceEvent::DataChanged))
    }

    /// Moves to a 1-based page.
    pub async fn move_to(&self, page: usize, cancel: &CancellationToken) -> Result<bool> {
        let current = self.ensure_loaded(cancel).await?;
        let next = current.get_page(page, cancel).await?;
        Ok(self.swap(next, DataSourceEvent::DataChanged))
    }

    /// Fetches the current page again.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<bool> {
        let current = self.ensure_loaded(cancel).await?;
        let next = current.get_page(current.page(), cancel).await?;
        Ok(self.swap(next, DataSourceEvent::Refreshed))
    }
}

impl<P> DataSource<P>
where
    P: SortedResult + 'static,
{
    pub async fn sort(&self, sorts: &[SortDescriptor], cancel: &CancellationToken) -> Result<bool> {
        let current = self.ensure_loaded(cancel).await?;
        let sorted = current.sort(sorts, cancel).await?;
        Ok(self.swap(Some(sorted), DataSourceEvent::DataChanged))
    }
}

impl<P> DataSource<P>
where
    P: FilteredResult + 'static,
{
    /// Re-queries from page 1 under `filter`.
    pub async fn set_filter(&self, filter: P::Filter, cancel: &CancellationToken) -> Result<()> {
        let current = self.ensure_loaded(cancel).await?;
        let filtered = current.with_filter(filter, cancel).await?;
        self.swap(Some(filtered), DataSourceEvent::DataChanged);
        Ok(())
    }
}
