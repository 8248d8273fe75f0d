//! # Event Bus System
//!
//! Broadcasts synchronization lifecycle events using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: `SyncEvent` for run progress, `AdapterEvent` for adapter
//!   lifecycle, both wrapped in `CoreEvent`
//! - **EventBus**: Central broadcast channel for publishing events
//!
//! Publishing never blocks and never fails the publisher: the engine discards
//! the "no subscribers" error.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//! use bridge_traits::{RepoId, SyncStatus, SyncTarget};
//!
//! let event_bus = EventBus::new(16);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Completed {
//!         target: SyncTarget::Repo(RepoId(1)),
//!         status: SyncStatus::Success,
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```

use bridge_traits::{ContentSourceId, RepoId, SyncStatus, SyncTarget};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default number of events buffered per subscriber
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Synchronization run events
    Sync(SyncEvent),
    /// Adapter lifecycle events
    Adapter(AdapterEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Adapter(e) => e.description(),
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A run was admitted and its result record created.
    Started {
        target: SyncTarget,
        result_id: String,
    },
    /// A phase began for one source of a repo.
    PhaseStarted {
        repo_id: RepoId,
        source_id: ContentSourceId,
        phase: String,
    },
    /// Percent-complete of the current phase group was persisted.
    Progress {
        target: SyncTarget,
        status: SyncStatus,
        percent: u32,
    },
    /// The run reached `SUCCESS` or, after isolated source failures, `FAILURE`.
    Completed {
        target: SyncTarget,
        status: SyncStatus,
    },
    /// The run aborted with an error.
    Failed {
        target: SyncTarget,
        message: String,
    },
    /// The run observed a cancellation request and stopped.
    Cancelled { repo_id: RepoId },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::PhaseStarted { .. } => "Sync phase started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

// ============================================================================
// Adapter Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AdapterEvent {
    Started {
        source_id: ContentSourceId,
        adapter_type: String,
    },
    InitializationFailed {
        source_id: ContentSourceId,
        message: String,
    },
    Stopped { source_id: ContentSourceId },
}

impl AdapterEvent {
    fn description(&self) -> &str {
        match self {
            AdapterEvent::Started { .. } => "Adapter started",
            AdapterEvent::InitializationFailed { .. } => "Adapter failed to initialize",
            AdapterEvent::Stopped { .. } => "Adapter stopped",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by the engine components
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Sync(SyncEvent::Cancelled {
            repo_id: RepoId(1),
        });

        // Should error when no subscribers
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_event_emission_with_subscribers() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::Progress {
            target: SyncTarget::Repo(RepoId(3)),
            status: SyncStatus::PackageBits,
            percent: 40,
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 1);
        assert_eq!(sub.recv().await.unwrap(), event);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CoreEvent::Adapter(AdapterEvent::Stopped {
            source_id: ContentSourceId(9),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Adapter");
        assert_eq!(json["payload"]["event"], "Stopped");
        assert_eq!(event.description(), "Adapter stopped");
    }
}
