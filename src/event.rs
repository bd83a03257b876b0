//! Relay event notifications
//!
//! Events are data-only notices for a notification layer to broadcast
//! (e.g. over WebSocket rooms). They never carry chunk payloads; processed
//! bytes only reach subscribers through delivery tasks or polling.

use tokio::sync::broadcast;

use crate::session::{SessionId, SubscriberId};

/// Notification emitted by sessions and the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A session was created and its worker started
    SessionStarted {
        session_id: SessionId,
        device_id: String,
    },
    /// A raw chunk entered the ingest buffer
    ChunkIngested { session_id: SessionId, size: usize },
    /// The worker emitted a processed chunk
    ChunkProcessed {
        session_id: SessionId,
        size: usize,
        timestamp_ms: u64,
        degraded: bool,
    },
    /// A subscriber's processed buffer was full and a chunk was dropped for it
    BufferFull {
        session_id: SessionId,
        subscriber_id: SubscriberId,
    },
    /// A subscriber joined the session
    SubscriberJoined {
        session_id: SessionId,
        subscriber_id: SubscriberId,
    },
    /// A subscriber left or was detached from the session
    SubscriberLeft {
        session_id: SessionId,
        subscriber_id: SubscriberId,
    },
    /// The session was stopped and removed
    SessionStopped { session_id: SessionId },
}

impl RelayEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> SessionId {
        match self {
            RelayEvent::SessionStarted { session_id, .. }
            | RelayEvent::ChunkIngested { session_id, .. }
            | RelayEvent::ChunkProcessed { session_id, .. }
            | RelayEvent::BufferFull { session_id, .. }
            | RelayEvent::SubscriberJoined { session_id, .. }
            | RelayEvent::SubscriberLeft { session_id, .. }
            | RelayEvent::SessionStopped { session_id } => *session_id,
        }
    }

    /// Stable event name for the notification layer
    pub fn kind(&self) -> &'static str {
        match self {
            RelayEvent::SessionStarted { .. } => "session_started",
            RelayEvent::ChunkIngested { .. } => "chunk_ingested",
            RelayEvent::ChunkProcessed { .. } => "chunk_processed",
            RelayEvent::BufferFull { .. } => "buffer_full",
            RelayEvent::SubscriberJoined { .. } => "subscriber_joined",
            RelayEvent::SubscriberLeft { .. } => "subscriber_left",
            RelayEvent::SessionStopped { .. } => "session_stopped",
        }
    }
}

/// Broadcast hub for relay events
///
/// Emitting never blocks. Listeners that fall behind skip events
/// (`RecvError::Lagged`) rather than slowing the pipeline.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    /// Create a hub retaining up to `capacity` undelivered events per listener
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Get a receiver for all subsequent events
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Send an event to all listeners
    ///
    /// Returns the number of listeners, or 0 if nobody is listening.
    pub fn emit(&self, event: RelayEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}
