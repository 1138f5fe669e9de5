//! Event types for the mixpath progress channel
//!
//! Provides the event definitions and EventBus shared by the engine and any
//! presentation layer that wants live search updates.

mod search_types;

pub use search_types::{ProgressSnapshot, SearchStatus};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Engine event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to a UI. The stream is one-way and lossy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A search request passed validation and started
    SearchStarted {
        /// Request identifier
        request_id: Uuid,
        /// Strategy requested by the caller
        algorithm: String,
        /// When the search started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic update during a long search
    SearchProgress {
        /// Request identifier
        request_id: Uuid,
        /// Current status
        status: SearchStatus,
        /// Progress details
        snapshot: ProgressSnapshot,
        /// When the snapshot was taken
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Search finished
    ///
    /// Emitted for successful and unsuccessful searches alike; `success`
    /// mirrors the result's flag.
    SearchCompleted {
        /// Request identifier
        request_id: Uuid,
        /// Whether a path was produced
        success: bool,
        /// Total cost of the returned path
        total_weight: Option<f64>,
        /// Nodes settled over the whole request
        nodes_explored: u64,
        /// Wall-clock search time (milliseconds)
        search_time_ms: u64,
        /// When the search finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EngineEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            EngineEvent::SearchStarted { .. } => "SearchStarted",
            EngineEvent::SearchProgress { .. } => "SearchProgress",
            EngineEvent::SearchCompleted { .. } => "SearchCompleted",
        }
    }

    /// Request this event belongs to
    pub fn request_id(&self) -> Uuid {
        match self {
            EngineEvent::SearchStarted { request_id, .. }
            | EngineEvent::SearchProgress { request_id, .. }
            | EngineEvent::SearchCompleted { request_id, .. } => *request_id,
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the search)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// Sending never requires a running runtime, so synchronous search workers
/// can publish directly.
///
/// # Examples
///
/// ```
/// use mixpath_common::events::{EventBus, EngineEvent};
/// use uuid::Uuid;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(EngineEvent::SearchStarted {
///     request_id: Uuid::new_v4(),
///     algorithm: "dijkstra".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "SearchStarted");
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
