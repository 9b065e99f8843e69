//! # Browse Session
//!
//! Wires the browse and sync components into one session with explicit
//! subscriptions:
//!
//! - location changes write the navigable location, then re-run the query
//!   when the filter or page moved
//! - every published query snapshot reconciles the selection against the
//!   visible ids
//! - free-text query and expression edits pass through their own debounce
//!   gate before they touch the location
//! - a finished sync refreshes the current query
//!
//! A session spawns background tasks and must be created inside a runtime.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bridge_traits::navigation::NavigationHost;
use core_browse::pagination::has_next;
use core_browse::{
    BrowseLocation, DebounceGate, FilterState, FilterStateCodec, ItemPatch, Modifiers,
    Observable, PaginatedQueryCoordinator, QuerySnapshot, SelectionModel, Subscription,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{BrowseEvent, CoreEvent, EventBus, EventStream};
use core_sync::{StatusPoller, SyncOrchestrator, SyncRunId, SyncSnapshot};
use tracing::{debug, info, instrument, warn};

use crate::{CoreDependencies, Result};

pub struct BrowseSession {
    location: Observable<BrowseLocation>,
    coordinator: Arc<PaginatedQueryCoordinator>,
    selection: Arc<Mutex<SelectionModel<String>>>,
    sync: Arc<SyncOrchestrator>,
    events: EventBus,
    query_gate: DebounceGate<String>,
    expression_gate: DebounceGate<String>,
    _poller: StatusPoller,
    _subscriptions: Vec<Subscription>,
}

impl BrowseSession {
    /// Build a session over the HTTP backends described by `config`
    pub fn from_config(config: CoreConfig) -> Result<Self> {
        let deps = CoreDependencies::from_config(&config);
        Self::new(config, deps)
    }

    #[instrument(skip_all, fields(base_url = %config.base_url))]
    pub fn new(config: CoreConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let url_sync = config.features.url_sync;
        let events = EventBus::new(config.event_buffer_size);

        let initial = if url_sync {
            initial_location(deps.navigation.as_ref())
        } else {
            BrowseLocation::default()
        };
        let location = Observable::new(initial.clone());

        let coordinator = Arc::new(
            PaginatedQueryCoordinator::new(deps.search.clone(), config.page_size)
                .with_provenance(config.features.hybrid_provenance)
                .with_events(events.clone()),
        );
        let selection = Arc::new(Mutex::new(SelectionModel::new()));

        let sync = Arc::new(SyncOrchestrator::from_config(
            &config,
            deps.sync.clone(),
            events.clone(),
        ));
        let refresh_target = Arc::downgrade(&coordinator);
        sync.set_completion_callback(move |source_id| {
            refresh_after_sync(&refresh_target, source_id);
        });

        let subscriptions = vec![
            location.subscribe(location_writer(
                &initial,
                url_sync.then(|| deps.navigation.clone()),
                coordinator.clone(),
                events.clone(),
            )),
            coordinator.subscribe(selection_reconciler(selection.clone(), events.clone())),
        ];

        let query_location = location.clone();
        let query_gate = DebounceGate::new(config.debounce_delay, move |text: String| {
            commit_filter(&query_location, |filter| filter.with_query(text));
        });
        let expression_location = location.clone();
        let expression_gate = DebounceGate::new(config.debounce_delay, move |text: String| {
            commit_filter(&expression_location, |filter| filter.with_expression(text));
        });

        coordinator.spawn_run(initial.filter.clone(), initial.page);
        let poller = StatusPoller::spawn(sync.clone());

        info!(
            url_sync,
            sources = config.sync_sources.len(),
            "Browse session started"
        );

        Ok(Self {
            location,
            coordinator,
            selection,
            sync,
            events,
            query_gate,
            expression_gate,
            _poller: poller,
            _subscriptions: subscriptions,
        })
    }

    // ------------------------------------------------------------------
    // Location and filter
    // ------------------------------------------------------------------

    pub fn location(&self) -> BrowseLocation {
        self.location.get()
    }

    pub fn filter(&self) -> FilterState {
        self.location.get().filter
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_location<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&BrowseLocation) + Send + Sync + 'static,
    {
        self.location.subscribe(observer)
    }

    /// Record a keystroke in the free-text query; committed after the
    /// debounce window
    pub fn set_query_text(&self, text: impl Into<String>) {
        self.query_gate.push(text.into());
    }

    /// Commit the pending free-text query now
    pub fn submit_query(&self) {
        self.query_gate.flush();
    }

    /// Record an edit of the filter expression; committed after the debounce
    /// window
    pub fn set_expression(&self, text: impl Into<String>) {
        self.expression_gate.push(text.into());
    }

    pub fn submit_expression(&self) {
        self.expression_gate.flush();
    }

    /// Apply a structured filter edit immediately
    ///
    /// Returns `true` when the filter changed; the page then resets to 1.
    pub fn update_filter<F>(&self, edit: F) -> bool
    where
        F: FnOnce(FilterState) -> FilterState,
    {
        commit_filter(&self.location, edit)
    }

    /// Reset every filter field to its default
    pub fn clear_filters(&self) -> bool {
        self.query_gate.cancel();
        self.expression_gate.cancel();
        commit_filter(&self.location, |_| FilterState::default())
    }

    pub fn set_page(&self, page: u32) -> bool {
        replace_location(&self.location, |current| current.clone().with_page(page))
    }

    pub fn next_page(&self) -> bool {
        let current = self.location.get().page;
        let total_pages = self.coordinator.snapshot().result.total_pages;
        has_next(current, total_pages) && self.set_page(current + 1)
    }

    pub fn previous_page(&self) -> bool {
        let current = self.location.get().page;
        current > 1 && self.set_page(current - 1)
    }

    /// Open (or with `None`, close) an item's detail view
    pub fn open_item(&self, item: Option<String>) -> bool {
        replace_location(&self.location, |current| current.clone().with_item(item))
    }

    /// Adopt a location reached through back/forward navigation
    ///
    /// Pending debounced edits belong to the location being left and are
    /// dropped.
    #[instrument(skip(self))]
    pub fn handle_location_change(&self, location: &str) -> bool {
        self.query_gate.cancel();
        self.expression_gate.cancel();

        let decoded = FilterStateCodec::decode(location);
        let changed = self.location.set_if_changed(decoded);
        debug!(changed, "Navigated location adopted");
        changed
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    pub fn query(&self) -> QuerySnapshot {
        self.coordinator.snapshot()
    }

    pub fn coordinator(&self) -> &Arc<PaginatedQueryCoordinator> {
        &self.coordinator
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_query<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&QuerySnapshot) + Send + Sync + 'static,
    {
        self.coordinator.subscribe(observer)
    }

    /// Re-run the current query on a background task
    pub fn refresh(&self) {
        self.coordinator.spawn_refresh();
    }

    /// Merge an action handler's field update into the visible result
    pub fn apply_patch(&self, patch: ItemPatch) -> bool {
        self.coordinator.apply_patch(patch)
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Click on the item `id` shown at `index` of the visible page
    pub fn toggle_selection(&self, id: &str, index: usize, modifiers: Modifiers) {
        let list = self.coordinator.snapshot().result.ids();
        self.change_selection(|selection| {
            selection.toggle(&id.to_string(), index, modifiers, &list)
        });
    }

    pub fn select_all(&self) {
        let list = self.coordinator.snapshot().result.ids();
        self.change_selection(|selection| selection.select_all(&list));
    }

    pub fn clear_selection(&self) {
        self.change_selection(SelectionModel::clear);
    }

    /// Selected ids in visible order
    pub fn selected_ids(&self) -> Vec<String> {
        let list = self.coordinator.snapshot().result.ids();
        lock(&self.selection).selected_in_order(&list)
    }

    pub fn is_selected(&self, id: &str) -> bool {
        lock(&self.selection).is_selected(&id.to_string())
    }

    fn change_selection(&self, change: impl FnOnce(&mut SelectionModel<String>)) {
        let selected = {
            let mut selection = lock(&self.selection);
            let before: HashSet<String> = selection.selected().clone();
            change(&mut selection);
            (*selection.selected() != before).then(|| selection.len())
        };

        if let Some(selected) = selected {
            self.events
                .emit(CoreEvent::Browse(BrowseEvent::SelectionChanged { selected }))
                .ok();
        }
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    pub fn sync(&self) -> &Arc<SyncOrchestrator> {
        &self.sync
    }

    pub fn sync_snapshot(&self) -> SyncSnapshot {
        self.sync.snapshot()
    }

    pub fn start_sync(&self, source_id: &str) -> Result<SyncRunId> {
        Ok(self.sync.start(source_id)?)
    }

    pub fn cancel_sync(&self, source_id: &str) -> Result<bool> {
        Ok(self.sync.cancel(source_id)?)
    }

    pub async fn cancel_all_syncs(&self) -> usize {
        self.sync.cancel_all().await
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Query, location and selection events only.
    pub fn subscribe_browse_events(&self) -> EventStream {
        EventStream::browse(self.events.subscribe())
    }

    /// Sync job and backend activity events only.
    pub fn subscribe_sync_events(&self) -> EventStream {
        EventStream::sync(self.events.subscribe())
    }
}

impl Drop for BrowseSession {
    fn drop(&mut self) {
        self.coordinator.cancel();
        debug!("Browse session closed");
    }
}

fn initial_location(navigation: &dyn NavigationHost) -> BrowseLocation {
    match navigation.current_location() {
        Ok(location) => FilterStateCodec::decode(&location),
        Err(err) => {
            warn!(error = %err, "Could not read the current location; using defaults");
            BrowseLocation::default()
        }
    }
}

/// Observer that mirrors the location into the host and re-runs the query
/// when filter or page changed
fn location_writer(
    initial: &BrowseLocation,
    navigation: Option<Arc<dyn NavigationHost>>,
    coordinator: Arc<PaginatedQueryCoordinator>,
    events: EventBus,
) -> impl Fn(&BrowseLocation) + Send + Sync + 'static {
    let last_query = Mutex::new((initial.filter.clone(), initial.page));

    move |location: &BrowseLocation| {
        let encoded = FilterStateCodec::encode(location);
        if let Some(navigation) = &navigation {
            if let Err(err) = navigation.replace_location(&encoded) {
                warn!(error = %err, "Failed to write navigable location");
            }
        }
        debug!(location = %encoded, "Location changed");
        events
            .emit(CoreEvent::Browse(BrowseEvent::LocationChanged {
                location: encoded,
            }))
            .ok();

        let key = (location.filter.clone(), location.page);
        let rerun = {
            let mut last = lock(&last_query);
            if *last == key {
                false
            } else {
                *last = key.clone();
                true
            }
        };
        if rerun {
            coordinator.spawn_run(key.0, key.1);
        }
    }
}

fn selection_reconciler(
    selection: Arc<Mutex<SelectionModel<String>>>,
    events: EventBus,
) -> impl Fn(&QuerySnapshot) + Send + Sync + 'static {
    move |snapshot: &QuerySnapshot| {
        let ids = snapshot.result.ids();
        let selected = {
            let mut selection = lock(&selection);
            selection.reconcile(&ids).then(|| selection.len())
        };

        if let Some(selected) = selected {
            debug!(selected, "Selection reconciled with visible items");
            events
                .emit(CoreEvent::Browse(BrowseEvent::SelectionChanged { selected }))
                .ok();
        }
    }
}

fn refresh_after_sync(coordinator: &Weak<PaginatedQueryCoordinator>, source_id: &str) {
    match coordinator.upgrade() {
        Some(coordinator) => {
            info!(source_id, "Sync finished; refreshing results");
            coordinator.spawn_refresh();
        }
        None => debug!(source_id, "Sync finished after the session closed"),
    }
}

fn commit_filter<F>(location: &Observable<BrowseLocation>, edit: F) -> bool
where
    F: FnOnce(FilterState) -> FilterState,
{
    replace_location(location, |current| {
        current.clone().with_filter(edit(current.filter.clone()))
    })
}

fn replace_location<F>(location: &Observable<BrowseLocation>, next: F) -> bool
where
    F: FnOnce(&BrowseLocation) -> BrowseLocation,
{
    location.update_if(|current| {
        let next = next(current);
        if next == *current {
            return false;
        }
        *current = next;
        true
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
