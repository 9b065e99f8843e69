//! # Paginated Query Coordinator
//!
//! Issues one logical search at a time and makes sure only the latest
//! request's response is ever shown.
//!
//! Every `run` cancels the in-flight request and mints a new lineage token in
//! the same critical section. The token travels with the request and is
//! compared against the latest minted one at the single point of
//! application, so a late response from a superseded request is dropped no
//! matter how the transport behaves.
//!
//! ## Outcomes
//!
//! | Response                       | Visible state                         |
//! |--------------------------------|---------------------------------------|
//! | success, still latest          | result replaced, error cleared        |
//! | anything, superseded           | untouched                             |
//! | cancellation, still latest     | loading cleared, nothing else         |
//! | other error, still latest      | error set, previous result kept       |

use std::sync::{Arc, Mutex, MutexGuard};

use core_async::sync::CancellationToken;
use core_async::task::JoinHandle;
use core_runtime::events::{BrowseEvent, CoreEvent, EventBus};
use tracing::{debug, instrument, warn};

use crate::error::{BrowseError, Result};
use crate::filter::FilterState;
use crate::observe::{Observable, Subscription};
use crate::pagination::PageRequest;
use crate::search::{ItemPatch, QueryResult, SearchBackend, SearchParams};

/// Published state of the coordinator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySnapshot {
    /// Result of the latest applied response
    pub result: QueryResult,
    /// A request is in flight
    pub loading: bool,
    /// Message of the latest failure; cleared by the next applied response
    pub error: Option<String>,
    /// Lineage of the response currently shown (0 before the first one)
    pub lineage: u64,
    /// Filter of the latest issued request
    pub filter: FilterState,
    /// Page of the latest issued request
    pub page: u32,
}

/// What happened to one `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The response replaced the visible result.
    Applied,
    /// A newer request was issued first; the response was discarded.
    Superseded,
    /// The request was cancelled while still the latest.
    Cancelled,
    /// The request failed; the previous result is still shown.
    Failed(String),
}

#[derive(Default)]
struct RequestState {
    lineage: u64,
    inflight: Option<CancellationToken>,
    last: Option<(FilterState, u32)>,
}

struct RecordedPatch {
    lineage: u64,
    patch: ItemPatch,
}

pub struct PaginatedQueryCoordinator {
    backend: Arc<dyn SearchBackend>,
    page_size: u32,
    with_provenance: bool,
    request: Mutex<RequestState>,
    patches: Mutex<Vec<RecordedPatch>>,
    state: Observable<QuerySnapshot>,
    events: Option<EventBus>,
}

impl PaginatedQueryCoordinator {
    pub fn new(backend: Arc<dyn SearchBackend>, page_size: u32) -> Self {
        Self {
            backend,
            page_size,
            with_provenance: false,
            request: Mutex::new(RequestState::default()),
            patches: Mutex::new(Vec::new()),
            state: Observable::new(QuerySnapshot::default()),
            events: None,
        }
    }

    /// Request lexical/semantic provenance with every search.
    pub fn with_provenance(mut self, enabled: bool) -> Self {
        self.with_provenance = enabled;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Issues a search for `filter` at `page`, superseding any in-flight one.
    pub async fn run(&self, filter: FilterState, page: u32) -> QueryOutcome {
        let page = page.max(1);
        let (lineage, token) = self.begin(&filter, page);
        self.run_with(lineage, token, filter, page).await
    }

    /// Runs on a background task. Requires a runtime.
    ///
    /// The request supersedes earlier ones when `spawn_run` is called, not
    /// when the task first gets polled.
    pub fn spawn_run(self: &Arc<Self>, filter: FilterState, page: u32) -> JoinHandle<QueryOutcome> {
        let page = page.max(1);
        let (lineage, token) = self.begin(&filter, page);
        let this = Arc::clone(self);
        core_async::spawn(async move { this.run_with(lineage, token, filter, page).await })
    }

    /// Re-runs the last issued filter and page (defaults before the first run).
    pub async fn refresh(&self) -> QueryOutcome {
        let (filter, page) = self.last_request();
        self.run(filter, page).await
    }

    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<QueryOutcome> {
        let (filter, page) = self.last_request();
        self.spawn_run(filter, page)
    }

    #[instrument(skip(self, token, filter))]
    async fn run_with(
        &self,
        lineage: u64,
        token: CancellationToken,
        filter: FilterState,
        page: u32,
    ) -> QueryOutcome {
        debug!("Query issued");

        self.state.update_if(|snapshot| {
            if self.latest_lineage() != lineage {
                return false;
            }
            snapshot.loading = true;
            snapshot.filter = filter.clone();
            snapshot.page = page;
            true
        });
        self.emit(BrowseEvent::QueryStarted { lineage, page });

        let params = SearchParams::new(filter, PageRequest::new(page, self.page_size))
            .with_provenance(self.with_provenance);

        // Dropping the search future aborts the request.
        let response = core_async::select! {
            _ = token.cancelled() => Err(BrowseError::Cancelled),
            result = self.backend.search(&params) => result,
        };

        self.apply(lineage, response)
    }

    /// Cancels the in-flight request, if any. The visible result stays.
    pub fn cancel(&self) {
        let token = lock(&self.request).inflight.take();
        if let Some(token) = token {
            debug!("Cancelling in-flight query");
            token.cancel();
        }
        self.state.update_if(|snapshot| std::mem::replace(&mut snapshot.loading, false));
    }

    /// Merges `patch` into the visible result and remembers it so a response
    /// issued before the patch cannot revert it.
    ///
    /// Returns `true` when a visible item was updated.
    pub fn apply_patch(&self, patch: ItemPatch) -> bool {
        if patch.is_empty() {
            return false;
        }

        let lineage = self.latest_lineage();
        {
            let mut patches = lock(&self.patches);
            match patches
                .iter_mut()
                .find(|recorded| recorded.lineage == lineage && recorded.patch.id == patch.id)
            {
                Some(recorded) => recorded.patch.merge(&patch),
                None => patches.push(RecordedPatch {
                    lineage,
                    patch: patch.clone(),
                }),
            }
        }

        self.state
            .update_if(|snapshot| patch.apply_to_result(&mut snapshot.result))
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.state.get()
    }

    pub fn state(&self) -> &Observable<QuerySnapshot> {
        &self.state
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&QuerySnapshot) + Send + Sync + 'static,
    {
        self.state.subscribe(observer)
    }

    /// Latest minted lineage token.
    pub fn latest_lineage(&self) -> u64 {
        lock(&self.request).lineage
    }

    fn last_request(&self) -> (FilterState, u32) {
        lock(&self.request)
            .last
            .clone()
            .unwrap_or_else(|| (FilterState::default(), 1))
    }

    fn begin(&self, filter: &FilterState, page: u32) -> (u64, CancellationToken) {
        let mut request = lock(&self.request);
        if let Some(previous) = request.inflight.take() {
            previous.cancel();
        }
        request.lineage += 1;
        let token = CancellationToken::new();
        request.inflight = Some(token.clone());
        request.last = Some((filter.clone(), page));
        (request.lineage, token)
    }

    /// Applies a settled response issued under `lineage`.
    pub(crate) fn apply(&self, lineage: u64, response: Result<QueryResult>) -> QueryOutcome {
        let mut outcome = QueryOutcome::Superseded;
        let mut event = None;

        self.state.update_if(|snapshot| {
            if self.latest_lineage() != lineage {
                return false;
            }

            match response {
                Ok(mut result) => {
                    {
                        let mut patches = lock(&self.patches);
                        patches.retain(|recorded| recorded.lineage >= lineage);
                        for recorded in patches.iter() {
                            recorded.patch.apply_to_result(&mut result);
                        }
                    }

                    event = Some(BrowseEvent::QueryApplied {
                        lineage,
                        total: result.total,
                        item_count: result.items.len(),
                    });
                    snapshot.result = result;
                    snapshot.error = None;
                    snapshot.loading = false;
                    snapshot.lineage = lineage;
                    outcome = QueryOutcome::Applied;
                    true
                }
                Err(err) if err.is_cancellation() => {
                    outcome = QueryOutcome::Cancelled;
                    std::mem::replace(&mut snapshot.loading, false)
                }
                Err(err) => {
                    let message = err.to_string();
                    event = Some(BrowseEvent::QueryFailed {
                        lineage,
                        message: message.clone(),
                    });
                    snapshot.error = Some(message.clone());
                    snapshot.loading = false;
                    outcome = QueryOutcome::Failed(message);
                    true
                }
            }
        });

        match &outcome {
            QueryOutcome::Applied => debug!(lineage, "Query result applied"),
            QueryOutcome::Superseded => debug!(lineage, "Discarding superseded response"),
            QueryOutcome::Cancelled => debug!(lineage, "Query cancelled"),
            QueryOutcome::Failed(message) => warn!(lineage, error = %message, "Query failed"),
        }

        if let Some(event) = event {
            self.emit(event);
        }
        outcome
    }

    fn emit(&self, event: BrowseEvent) {
        if let Some(events) = &self.events {
            events.emit(CoreEvent::Browse(event)).ok();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
