//! Event types and broadcast bus
//!
//! Components publish milestones here so embedding applications can observe
//! validations, alerts and package builds without registering callbacks on each
//! component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events published by the Pinpoint components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PinpointEvent {
    /// A consensus run finished (cache hits are not re-announced)
    ValidationCompleted {
        location: String,
        region: String,
        approved: bool,
        quality_score: f64,
        source_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The quality monitor raised a drift alert
    DriftAlertRaised {
        alert_id: Uuid,
        location_id: String,
        alert_type: String,
        severity: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A coordinate package was assembled
    PackageBuilt {
        location_name: String,
        chapter_count: usize,
        overall_quality: f64,
        processing_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Low user feedback forced a location back through verification
    ReverificationRequested {
        location_name: String,
        chapter_id: String,
        rating: u8,
        timestamp: DateTime<Utc>,
    },
}

impl PinpointEvent {
    /// Short name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            PinpointEvent::ValidationCompleted { .. } => "ValidationCompleted",
            PinpointEvent::DriftAlertRaised { .. } => "DriftAlertRaised",
            PinpointEvent::PackageBuilt { .. } => "PackageBuilt",
            PinpointEvent::ReverificationRequested { .. } => "ReverificationRequested",
        }
    }
}

/// Broadcast bus for [`PinpointEvent`]s
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use pinpoint_common::events::{EventBus, PinpointEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(PinpointEvent::ReverificationRequested {
///     location_name: "Gyeongbokgung".to_string(),
///     chapter_id: "ch-1".to_string(),
///     rating: 1,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PinpointEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PinpointEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PinpointEvent,
    ) -> Result<usize, broadcast::error::SendError<PinpointEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PinpointEvent) {
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
