//! Session registry implementation
//!
//! The central registry that owns every session, starts its processing
//! worker and tears it down on removal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::error::{RelayError, Result};
use crate::event::{EventBus, RelayEvent};
use crate::pipeline::{worker, ChunkTransform, TimestampTransform};
use crate::session::{Session, SessionId, SessionSummary};

use super::config::RelayConfig;

/// Central registry for all sessions
///
/// Thread-safe via `RwLock`: inserts and removals take the write lock,
/// lookups and listings share the read lock.
pub struct SessionRegistry {
    /// Map of session id to session
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,

    /// Next raw id to hand out; ids are never reused
    next_id: AtomicU64,

    /// Transform applied by every session's worker
    transform: Arc<dyn ChunkTransform>,

    /// Event hub shared with every session
    events: EventBus,

    /// Configuration
    config: RelayConfig,
}

impl SessionRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RelayConfig) -> Self {
        Self::with_transform(config, Arc::new(TimestampTransform))
    }

    /// Create a new registry with custom configuration and transform
    pub fn with_transform(config: RelayConfig, transform: Arc<dyn ChunkTransform>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            transform,
            events: EventBus::new(config.event_capacity),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get a receiver for relay events
    pub fn events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Create a session and start its processing worker
    ///
    /// If the id space is exhausted nothing is registered and
    /// `IdExhausted` is returned.
    pub async fn create(&self, device_id: impl Into<String>) -> Result<SessionId> {
        let id = self.allocate_id()?;
        let device_id = device_id.into();

        let session = Arc::new(Session::new(
            id,
            device_id.clone(),
            &self.config,
            self.events.clone(),
        ));

        let handle = worker::spawn(
            Arc::clone(&session),
            Arc::clone(&self.transform),
            self.config.ingest_poll_timeout,
        );
        session.attach_worker(handle).await;

        self.sessions.write().await.insert(id, session);

        tracing::info!(
            session = %id,
            device = %device_id,
            "Session created"
        );

        self.events.emit(RelayEvent::SessionStarted {
            session_id: id,
            device_id,
        });

        Ok(id)
    }

    /// Look up a session by id
    pub async fn lookup(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RelayError::NotFound(id))
    }

    /// Stop a session without removing it
    ///
    /// The session stays listed (inactive) until `remove` is called.
    pub async fn stop(&self, id: SessionId) -> Result<()> {
        self.lookup(id).await?.stop();
        Ok(())
    }

    /// Stop a session, detach its subscribers and erase it
    pub async fn remove(&self, id: SessionId) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        let session = sessions.get(&id).cloned().ok_or(RelayError::NotFound(id))?;

        session.stop();
        self.events.emit(RelayEvent::SessionStopped { session_id: id });

        let detached = session.detach_all().await;
        let discarded = session.clear_buffers();

        sessions.remove(&id);
        session.mark_removed();

        tracing::info!(
            session = %id,
            detached = detached,
            discarded = discarded,
            remaining = sessions.len(),
            "Session removed"
        );

        Ok(())
    }

    /// Get a point-in-time snapshot of every session, ordered by id
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions.values() {
            summaries.push(session.summary().await);
        }
        summaries.sort_by_key(|summary| summary.id);

        summaries
    }

    /// Get total number of sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Get number of sessions still accepting chunks
    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| session.is_active())
            .count()
    }

    /// Remove every session
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.sessions.read().await.keys().copied().collect();

        for id in ids {
            // A concurrent remove may already have taken it
            let _ = self.remove(id).await;
        }

        tracing::info!("Session registry shut down");
    }

    fn allocate_id(&self) -> Result<SessionId> {
        self.next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(SessionId::from_raw)
            .map_err(|_| RelayError::IdExhausted)
    }

    #[cfg(test)]
    fn with_next_id(self, next: u64) -> Self {
        self.next_id.store(next, Ordering::SeqCst);
        self
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
