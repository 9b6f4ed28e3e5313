//! # Cursor Paginator
//!
//! Accumulates the pages of one collection query for a UI list.
//!
//! - [`load_more`](Paginator::load_more) fetches the page at the current
//!   cursor and appends the items not seen before, in arrival order.
//! - [`reset`](Paginator::reset) and [`set_query`](Paginator::set_query)
//!   discard everything and reload from the first page.
//! - Observers follow [`PaginationStatus`] through a `watch` channel.
//!
//! ## Staleness
//!
//! Each fetch captures the slot generation and owns a `CancellationToken`.
//! Reset, a query change, or dropping the paginator bumps the generation and
//! cancels the token; a response that arrives afterwards is logged and
//! dropped without touching state.
//!
//! Fetches run on spawned tasks that hold only a weak reference to the
//! paginator, so dropping it releases the state even while a request is out.

use crate::error::{CatalogError, Result};
use crate::models::Identify;
use crate::pagination::{Cursor, Page};
use async_trait::async_trait;
use core_async::sync::{watch, CancellationToken, DropGuard};
use core_async::task::JoinHandle;
use core_runtime::events::{CatalogEvent, CoreEvent, EventBus};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, debug_span, instrument, trace, warn, Instrument};

/// Source of pages for a [`Paginator`].
///
/// `cursor` is `None` for the first page. Implementations should pass
/// `cancel` down to [`HttpClient::execute_cancellable`] and report
/// cancellation as [`CatalogError::Cancelled`].
///
/// [`HttpClient::execute_cancellable`]: bridge_traits::HttpClient::execute_cancellable
#[async_trait]
pub trait PageFetcher<T, Q>: Send + Sync {
    async fn fetch_page(
        &self,
        query: &Q,
        cursor: Option<&Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<T>>;
}

/// [`PageFetcher`] backed by a closure. See [`page_fn`].
pub struct FnFetcher<F> {
    f: F,
}

/// Adapt an async closure into a [`PageFetcher`].
///
/// ```ignore
/// let paginator = Paginator::new(
///     page_fn(|query: String, cursor, _cancel| async move {
///         backend.search(&query, cursor).await
///     }),
///     "ambient".to_string(),
/// );
/// ```
pub fn page_fn<T, Q, F, Fut>(f: F) -> FnFetcher<F>
where
    F: Fn(Q, Option<Cursor>, CancellationToken) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    FnFetcher { f }
}

#[async_trait]
impl<T, Q, F, Fut> PageFetcher<T, Q> for FnFetcher<F>
where
    T: Send + 'static,
    Q: Clone + Send + Sync + 'static,
    F: Fn(Q, Option<Cursor>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page<T>>> + Send + 'static,
{
    async fn fetch_page(
        &self,
        query: &Q,
        cursor: Option<&Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<T>> {
        (self.f)(query.clone(), cursor.cloned(), cancel.clone()).await
    }
}

/// What observers need to re-render a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationStatus {
    pub generation: u64,
    /// Number of accumulated items
    pub len: usize,
    pub loading: bool,
    pub error: Option<CatalogError>,
    pub exhausted: bool,
}

impl PaginationStatus {
    pub fn has_more(&self) -> bool {
        !self.exhausted
    }
}

/// Full copy of a paginator's state.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationState<T> {
    pub items: Vec<T>,
    pub cursor: Option<Cursor>,
    pub loading: bool,
    pub error: Option<CatalogError>,
    pub exhausted: bool,
    pub generation: u64,
}

struct Slot<T: Identify, Q> {
    query: Q,
    generation: u64,
    items: Vec<T>,
    seen: HashSet<T::Id>,
    cursor: Option<Cursor>,
    loading: bool,
    error: Option<CatalogError>,
    exhausted: bool,
    /// Cancels the outstanding fetch when replaced or dropped.
    in_flight: Option<DropGuard>,
}

impl<T: Identify, Q> Slot<T, Q> {
    fn new(query: Q) -> Self {
        Self {
            query,
            generation: 0,
            items: Vec::new(),
            seen: HashSet::new(),
            cursor: None,
            loading: false,
            error: None,
            exhausted: false,
            in_flight: None,
        }
    }

    fn clear(&mut self) {
        self.generation += 1;
        self.items.clear();
        self.seen.clear();
        self.cursor = None;
        self.loading = false;
        self.error = None;
        self.exhausted = false;
        self.in_flight = None;
    }

    fn status(&self) -> PaginationStatus {
        PaginationStatus {
            generation: self.generation,
            len: self.items.len(),
            loading: self.loading,
            error: self.error.clone(),
            exhausted: self.exhausted,
        }
    }
}

enum Outcome {
    Stale,
    Cancelled,
    Loaded {
        added: usize,
        total: usize,
        exhausted: bool,
    },
    Failed(CatalogError),
}

struct Shared<T: Identify, Q> {
    fetcher: Arc<dyn PageFetcher<T, Q>>,
    slot: Mutex<Slot<T, Q>>,
    status: watch::Sender<PaginationStatus>,
    events: Option<EventBus>,
    label: String,
}

impl<T: Identify, Q> Shared<T, Q> {
    fn lock(&self) -> MutexGuard<'_, Slot<T, Q>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the slot and publish the resulting status before unlocking.
    fn update<R>(&self, f: impl FnOnce(&mut Slot<T, Q>) -> R) -> R {
        let mut slot = self.lock();
        let result = f(&mut slot);
        let status = slot.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        result
    }

    fn emit(&self, event: CatalogEvent) {
        if let Some(events) = &self.events {
            let _ = events.emit(CoreEvent::Catalog(event));
        }
    }

    /// Release the loading flag of a fetch task that died before applying
    /// its page. Items and cursor stay so the next `load_more` retries.
    fn abandon(&self, generation: u64, reason: &str) {
        self.update(|slot| {
            if slot.generation == generation && slot.loading {
                slot.loading = false;
                slot.in_flight = None;
                slot.error = Some(CatalogError::Transport(format!(
                    "page fetch task failed: {}",
                    reason
                )));
            }
        });
    }

    fn apply(&self, generation: u64, cancel: &CancellationToken, result: Result<Page<T>>) {
        let outcome = self.update(|slot| {
            if slot.generation != generation || cancel.is_cancelled() {
                return Outcome::Stale;
            }

            slot.loading = false;
            slot.in_flight = None;

            match result {
                Ok(page) => {
                    let before = slot.items.len();
                    for item in page.items {
                        if slot.seen.insert(item.identity()) {
                            slot.items.push(item);
                        }
                    }
                    slot.exhausted = page.next_cursor.is_none();
                    slot.cursor = page.next_cursor;
                    slot.error = None;
                    Outcome::Loaded {
                        added: slot.items.len() - before,
                        total: slot.items.len(),
                        exhausted: slot.exhausted,
                    }
                }
                Err(CatalogError::Cancelled) => Outcome::Cancelled,
                Err(error) => {
                    // Items and cursor stay; the next load_more retries this page.
                    slot.error = Some(error.clone());
                    Outcome::Failed(error)
                }
            }
        });

        match outcome {
            Outcome::Stale => debug!(generation, "Discarding page for superseded query"),
            Outcome::Cancelled => trace!(generation, "Page fetch cancelled"),
            Outcome::Loaded {
                added,
                total,
                exhausted,
            } => {
                debug!(generation, added, total, exhausted, "Page loaded");
                self.emit(CatalogEvent::PageLoaded {
                    collection: self.label.clone(),
                    generation,
                    added,
                    total,
                    exhausted,
                });
            }
            Outcome::Failed(error) => {
                warn!(generation, error = %error, "Page fetch failed");
                self.emit(CatalogEvent::PageFailed {
                    collection: self.label.clone(),
                    generation,
                    message: error.to_string(),
                });
            }
        }
    }
}

/// Incremental loader for one cursor-paginated collection.
///
/// Does not fetch on construction; call [`load_more`](Self::load_more) or
/// [`reset`](Self::reset) to load the first page.
pub struct Paginator<T: Identify, Q> {
    shared: Arc<Shared<T, Q>>,
}

impl<T, Q> Paginator<T, Q>
where
    T: Identify + Clone + Send + Sync + 'static,
    Q: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(fetcher: impl PageFetcher<T, Q> + 'static, query: Q) -> Self {
        Self::from_fetcher(Arc::new(fetcher), query)
    }

    pub fn from_fetcher(fetcher: Arc<dyn PageFetcher<T, Q>>, query: Q) -> Self {
        Self::build(fetcher, query, None, "collection".to_string())
    }

    /// Paginator that also reports `CatalogEvent`s on `events`, tagged with
    /// `label`.
    pub fn with_events(
        fetcher: Arc<dyn PageFetcher<T, Q>>,
        query: Q,
        events: EventBus,
        label: impl Into<String>,
    ) -> Self {
        Self::build(fetcher, query, Some(events), label.into())
    }

    fn build(
        fetcher: Arc<dyn PageFetcher<T, Q>>,
        query: Q,
        events: Option<EventBus>,
        label: String,
    ) -> Self {
        let (status, _) = watch::channel(PaginationStatus::default());
        Self {
            shared: Arc::new(Shared {
                fetcher,
                slot: Mutex::new(Slot::new(query)),
                status,
                events,
                label,
            }),
        }
    }

    /// Fetch the next page and wait for it to be applied.
    ///
    /// Returns immediately without fetching while another page is loading or
    /// once the collection is exhausted. Failures land in
    /// [`error`](Self::error); cancellation is silent.
    #[instrument(skip(self), fields(collection = %self.shared.label))]
    pub async fn load_more(&self) {
        if let Some((generation, handle)) = self.start_fetch() {
            if let Err(e) = handle.await {
                warn!(generation, error = %e, "Page fetch task failed");
                self.shared.abandon(generation, &e.to_string());
            }
        }
    }

    fn start_fetch(&self) -> Option<(u64, JoinHandle<()>)> {
        let started = self.shared.update(|slot| {
            if slot.loading || slot.exhausted {
                return None;
            }
            let cancel = CancellationToken::new();
            slot.in_flight = Some(cancel.clone().drop_guard());
            slot.loading = true;
            Some((slot.generation, slot.query.clone(), slot.cursor.clone(), cancel))
        });

        let Some((generation, query, cursor, cancel)) = started else {
            trace!("load_more ignored: loading or exhausted");
            return None;
        };

        let span = debug_span!(
            "page_fetch",
            collection = %self.shared.label,
            generation,
            first_page = cursor.is_none()
        );
        let fetcher = Arc::clone(&self.shared.fetcher);
        let shared = Arc::downgrade(&self.shared);

        let handle = core_async::spawn(
            async move {
                let result = fetcher.fetch_page(&query, cursor.as_ref(), &cancel).await;
                match shared.upgrade() {
                    Some(shared) => shared.apply(generation, &cancel, result),
                    None => trace!("Paginator dropped while fetching"),
                }
            }
            .instrument(span),
        );
        Some((generation, handle))
    }

    /// Cancel any in-flight fetch, clear all state and load the first page.
    #[instrument(skip(self), fields(collection = %self.shared.label))]
    pub async fn reset(&self) {
        let generation = self.shared.update(|slot| {
            slot.clear();
            slot.generation
        });
        self.announce_reset(generation);
        self.load_more().await;
    }

    /// Switch to a different query. Equal queries are a no-op; anything else
    /// behaves like [`reset`](Self::reset).
    pub async fn set_query(&self, query: Q) {
        let changed = self.shared.update(|slot| {
            if slot.query == query {
                return None;
            }
            slot.query = query;
            slot.clear();
            Some(slot.generation)
        });

        match changed {
            Some(generation) => {
                self.announce_reset(generation);
                self.load_more().await;
            }
            None => trace!("Query unchanged"),
        }
    }

    fn announce_reset(&self, generation: u64) {
        debug!(collection = %self.shared.label, generation, "Pagination reset");
        self.shared.emit(CatalogEvent::QueryReset {
            collection: self.shared.label.clone(),
            generation,
        });
    }

    pub fn items(&self) -> Vec<T> {
        self.shared.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loading(&self) -> bool {
        self.shared.lock().loading
    }

    pub fn error(&self) -> Option<CatalogError> {
        self.shared.lock().error.clone()
    }

    /// False once a page arrived without a cursor.
    pub fn has_more(&self) -> bool {
        !self.shared.lock().exhausted
    }

    pub fn query(&self) -> Q {
        self.shared.lock().query.clone()
    }

    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }

    pub fn status(&self) -> PaginationStatus {
        self.shared.status.borrow().clone()
    }

    pub fn snapshot(&self) -> PaginationState<T> {
        let slot = self.shared.lock();
        PaginationState {
            items: slot.items.clone(),
            cursor: slot.cursor.clone(),
            loading: slot.loading,
            error: slot.error.clone(),
            exhausted: slot.exhausted,
            generation: slot.generation,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PaginationStatus> {
        self.shared.status.subscribe()
    }
}

impl<T: Identify, Q> fmt::Debug for Paginator<T, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginator")
            .field("collection", &self.shared.label)
            .field("status", &*self.shared.status.borrow())
            .finish()
    }
}
