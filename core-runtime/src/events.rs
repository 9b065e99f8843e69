//! # Event Bus System
//!
//! Typed, broadcast-based event bus for the catalog client core.
//!
//! ## Overview
//!
//! The browse session and the sync orchestrator publish every observable
//! transition here so hosts can drive UI affordances (toasts, badges,
//! diagnostics) without reaching into component state:
//! - **Event Types**: [`BrowseEvent`] and [`SyncEvent`] wrapped in [`CoreEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Filtered subscription (sync-only, browse-only)
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::RemoteActivity {
//!         source_id: "chub".to_string(),
//!         in_progress: true,
//!     }))
//!     .ok();
//!
//! let event = receiver.try_recv().unwrap();
//! assert_eq!(event.description(), "Backend sync activity changed");
//! ```
//!
//! ## Event Types
//!
//! ### Browse Events
//! - `LocationChanged`: Encoded navigable location was rewritten
//! - `QueryStarted`: A search request was issued under a new lineage
//! - `QueryApplied`: A response was accepted and is now visible
//! - `QueryFailed`: A request failed; the previous result stays visible
//! - `SelectionChanged`: The selected id set changed
//!
//! ### Sync Events
//! - `Started`: Local stream opened for a source
//! - `Progress`: Progress frame applied
//! - `Completed`: Source reported 100%
//! - `Failed`: Source reported an error or the stream failed
//! - `Cancelled`: Local stream aborted
//! - `RemoteActivity`: Status poll saw a backend job start or stop
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Filter, query and selection events
    Browse(BrowseEvent),
    /// Sync job events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Browse(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Browse(BrowseEvent::QueryFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Cancelled { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::RemoteActivity { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Browse Events
// ============================================================================

/// Events emitted by the browse session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BrowseEvent {
    /// The navigable location was rewritten.
    LocationChanged {
        /// Encoded query string, without the leading `?`.
        location: String,
    },
    /// A search request was issued.
    QueryStarted {
        /// Lineage token minted for the request.
        lineage: u64,
        /// Requested page (1-based).
        page: u32,
    },
    /// A response was accepted and replaced the visible result.
    QueryApplied {
        /// Lineage of the accepted response.
        lineage: u64,
        /// Total matching items reported by the backend.
        total: u64,
        /// Items on the visible page.
        item_count: usize,
    },
    /// A request failed with a non-cancellation error.
    QueryFailed {
        /// Lineage of the failed request.
        lineage: u64,
        /// Human-readable error message.
        message: String,
    },
    /// The selected id set changed.
    SelectionChanged {
        /// Number of selected items.
        selected: usize,
    },
}

impl BrowseEvent {
    fn description(&self) -> &str {
        match self {
            BrowseEvent::LocationChanged { .. } => "Location updated",
            BrowseEvent::QueryStarted { .. } => "Search started",
            BrowseEvent::QueryApplied { .. } => "Search results applied",
            BrowseEvent::QueryFailed { .. } => "Search failed",
            BrowseEvent::SelectionChanged { .. } => "Selection changed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to per-source synchronization jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Local stream opened.
    Started {
        /// Configured source id.
        source_id: String,
        /// Run id minted for this start.
        run_id: String,
    },
    /// Progress frame applied.
    Progress {
        /// Configured source id.
        source_id: String,
        /// Run id of the stream that produced the frame.
        run_id: String,
        /// Progress percentage (0-100).
        percent: u8,
        /// Label of the item currently being processed.
        current_item: Option<String>,
        /// Running count of new items.
        new_items: u64,
    },
    /// Source reported completion.
    Completed {
        /// Configured source id.
        source_id: String,
        /// Run id of the completed stream.
        run_id: String,
        /// Number of new items added.
        new_items: u64,
    },
    /// Source reported an error, or the stream could not be opened.
    Failed {
        /// Configured source id.
        source_id: String,
        /// Run id of the failed stream.
        run_id: String,
        /// Human-readable error message.
        message: String,
    },
    /// Local stream aborted.
    Cancelled {
        /// Configured source id.
        source_id: String,
        /// Run id of the aborted stream, when one was running.
        run_id: Option<String>,
    },
    /// The status poll saw a backend job start or stop.
    RemoteActivity {
        /// Configured source id.
        source_id: String,
        /// Whether the backend reports the job in progress.
        in_progress: bool,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
            SyncEvent::RemoteActivity { .. } => "Backend sync activity changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{BrowseEvent, CoreEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
///
/// let mut subscriber1 = event_bus.subscribe();
/// let mut subscriber2 = event_bus.subscribe();
///
/// event_bus
///     .emit(CoreEvent::Browse(BrowseEvent::LocationChanged {
///         location: "q=vampire".to_string(),
///     }))
///     .ok();
///
/// assert!(subscriber1.try_recv().is_ok());
/// assert!(subscriber2.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::default();
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is listening. Publishers in the core ignore that
    /// error with `.ok()`: events are advisory.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use core_runtime::events::EventBus;
    ///
    /// # async fn example() {
    /// let event_bus = EventBus::new(100);
    /// let mut subscriber = event_bus.subscribe();
    ///
    /// core_async::spawn(async move {
    ///     while let Ok(event) = subscriber.recv().await {
    ///         tracing::debug!(event = event.description(), "Received event");
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Subscription that only yields events accepted by its filter.
///
/// ```rust
/// use core_runtime::events::{BrowseEvent, CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let mut sync_only = EventStream::sync(bus.subscribe());
///
/// bus.emit(CoreEvent::Browse(BrowseEvent::SelectionChanged { selected: 1 })).ok();
/// assert!(sync_only.try_recv().is_none());
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Unfiltered stream over `receiver`.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Stream of sync job and backend activity events.
    pub fn sync(receiver: Receiver<CoreEvent>) -> Self {
        Self::new(receiver).filter(|event| matches!(event, CoreEvent::Sync(_)))
    }

    /// Stream of query, location and selection events.
    pub fn browse(receiver: Receiver<CoreEvent>) -> Self {
        Self::new(receiver).filter(|event| matches!(event, CoreEvent::Browse(_)))
    }

    /// Replace the filter. Events it rejects are skipped by `recv` and `try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// This will skip events that don't match the filter and return the next matching event.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            // If no filter, return immediately
            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            // Apply filter
            if filter(&event) {
                return Ok(event);
            }

            // Event didn't match filter, continue to next event
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    // If no filter, return immediately
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    // Apply filter
                    if filter(&event) {
                        return Some(Ok(event));
                    }

                    // Event didn't match filter, continue
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(source: &str, percent: u8) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Progress {
            source_id: source.to_string(),
            run_id: "run-1".to_string(),
            percent,
            current_item: Some("X".to_string()),
            new_items: 0,
        })
    }

    #[core_async::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[core_async::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[core_async::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Browse(BrowseEvent::SelectionChanged { selected: 0 });

        assert!(bus.emit(event).is_err());
    }

    #[core_async::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::Started {
            source_id: "chub".to_string(),
            run_id: "run-1".to_string(),
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[core_async::test]
    async fn test_sync_and_browse_streams_split_events() {
        let bus = EventBus::new(10);
        let mut sync = EventStream::sync(bus.subscribe());
        let mut browse = EventStream::browse(bus.subscribe());

        let query_event = CoreEvent::Browse(BrowseEvent::QueryStarted {
            lineage: 1,
            page: 1,
        });
        bus.emit(query_event.clone()).ok();

        let sync_event = progress("chub", 10);
        bus.emit(sync_event.clone()).ok();

        assert_eq!(sync.recv().await.unwrap(), sync_event);
        assert_eq!(browse.recv().await.unwrap(), query_event);
        assert!(browse.try_recv().is_none());
    }

    #[core_async::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for percent in 0..5 {
            bus.emit(progress("chub", percent * 20)).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            source_id: "chub".to_string(),
            run_id: "run-1".to_string(),
            message: "rate limited".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let query_failed = CoreEvent::Browse(BrowseEvent::QueryFailed {
            lineage: 3,
            message: "HTTP 500".to_string(),
        });
        assert_eq!(query_failed.severity(), EventSeverity::Warning);

        let completed = CoreEvent::Sync(SyncEvent::Completed {
            source_id: "chub".to_string(),
            run_id: "run-1".to_string(),
            new_items: 4,
        });
        assert_eq!(completed.severity(), EventSeverity::Info);

        assert_eq!(progress("chub", 50).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Browse(BrowseEvent::QueryApplied {
            lineage: 2,
            total: 120,
            item_count: 48,
        });
        assert_eq!(event.description(), "Search results applied");
    }

    #[core_async::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = core_async::spawn(async move {
            for selected in 0..10 {
                bus1.emit(CoreEvent::Browse(BrowseEvent::SelectionChanged { selected }))
                    .ok();
            }
        });

        let handle2 = core_async::spawn(async move {
            for percent in 0..10 {
                bus2.emit(progress("janny", percent * 10)).ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Sync(SyncEvent::Cancelled {
            source_id: "chub".to_string(),
            run_id: Some("run-9".to_string()),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Sync");
        assert_eq!(json["payload"]["event"], "Cancelled");
        assert_eq!(json["payload"]["source_id"], "chub");

        let deserialized: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[core_async::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());

        assert!(stream.try_recv().is_none());
    }

    #[core_async::test]
    async fn test_try_recv_skips_filtered_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Info);

        bus.emit(progress("chub", 10)).ok();
        let remote = CoreEvent::Sync(SyncEvent::RemoteActivity {
            source_id: "chub".to_string(),
            in_progress: false,
        });
        bus.emit(remote.clone()).ok();

        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, remote);
        assert!(stream.try_recv().is_none());
    }
}
