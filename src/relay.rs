//! Relay operations for the transport layer
//!
//! `MediaRelay` is the surface an HTTP/WebSocket layer calls into. It is
//! cheap to clone and can be stored directly in handler state.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use crate::error::{RelayError, Result};
use crate::event::RelayEvent;
use crate::pipeline::{dispatcher, Delivery};
use crate::registry::{RelayConfig, SessionRegistry};
use crate::session::{ProcessedChunk, SessionId, SessionStats, SessionSummary, SubscriberId};

/// Entry point for producers, subscribers and the notification layer
///
/// # Example
/// ```no_run
/// use chunk_relay::{MediaRelay, RelayConfig};
///
/// # async fn example() -> chunk_relay::Result<()> {
/// let relay = MediaRelay::new(RelayConfig::default());
///
/// let session = relay.start_session("glasses-01").await?;
/// let mut deliveries = relay.request_push_delivery(session, "viewer".into()).await?;
///
/// relay.ingest(session, vec![0u8; 1024]).await?;
///
/// if let Some(delivery) = deliveries.recv().await {
///     println!("Delivery: {:?}", delivery);
/// }
///
/// relay.stop_session(session).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MediaRelay {
    registry: Arc<SessionRegistry>,
}

impl MediaRelay {
    /// Create a relay with its own registry
    pub fn new(config: RelayConfig) -> Self {
        Self::with_registry(Arc::new(SessionRegistry::with_config(config)))
    }

    /// Create a relay over an existing registry
    pub fn with_registry(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a session for a producing device
    pub async fn start_session(&self, device_id: impl Into<String>) -> Result<SessionId> {
        self.registry.create(device_id).await
    }

    /// Submit a raw chunk to a session
    ///
    /// Returns immediately; `BufferFull` signals backpressure.
    pub async fn ingest(&self, session_id: SessionId, data: impl Into<Bytes>) -> Result<()> {
        self.registry.lookup(session_id).await?.add_chunk(data.into())
    }

    /// Stop a session and remove it from the registry
    pub async fn stop_session(&self, session_id: SessionId) -> Result<()> {
        self.registry.remove(session_id).await
    }

    /// Add a subscriber to a session
    pub async fn subscribe(
        &self,
        session_id: SessionId,
        subscriber_id: SubscriberId,
    ) -> Result<()> {
        self.registry
            .lookup(session_id)
            .await?
            .add_subscriber(subscriber_id)
            .await;
        Ok(())
    }

    /// Remove a subscriber from a session
    ///
    /// Unknown sessions and non-members are ignored.
    pub async fn unsubscribe(
        &self,
        session_id: SessionId,
        subscriber_id: &SubscriberId,
    ) -> Result<()> {
        if let Ok(session) = self.registry.lookup(session_id).await {
            session.remove_subscriber(subscriber_id).await;
        }
        Ok(())
    }

    /// Start pushing processed chunks to a subscriber
    ///
    /// Subscribes the subscriber first if needed. A repeated request for the
    /// same subscriber replaces the previous delivery task, whose receiver
    /// then closes.
    pub async fn request_push_delivery(
        &self,
        session_id: SessionId,
        subscriber_id: SubscriberId,
    ) -> Result<mpsc::Receiver<Delivery>> {
        let session = self.registry.lookup(session_id).await?;

        session.add_subscriber(subscriber_id.clone()).await;
        let subscription = session
            .subscription(&subscriber_id)
            .await
            .ok_or(RelayError::NotFound(session_id))?;

        Ok(dispatcher::spawn(
            session,
            subscriber_id,
            subscription,
            self.registry.config().into(),
        ))
    }

    /// Pull one processed chunk for a subscriber, waiting up to `timeout`
    ///
    /// Returns `Ok(None)` if nothing arrived in time or the subscriber is not
    /// a member of the session.
    pub async fn poll_processed(
        &self,
        session_id: SessionId,
        subscriber_id: &SubscriberId,
        timeout: Duration,
    ) -> Result<Option<ProcessedChunk>> {
        let session = self.registry.lookup(session_id).await?;

        match session.subscription(subscriber_id).await {
            Some(subscription) => Ok(subscription.next_chunk(timeout).await),
            None => Ok(None),
        }
    }

    /// List every registered session
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        self.registry.list().await
    }

    /// Get statistics for one session
    pub async fn session_stats(&self, session_id: SessionId) -> Result<SessionStats> {
        Ok(self.registry.lookup(session_id).await?.stats())
    }

    /// Get a receiver for relay events
    pub fn events(&self) -> broadcast::Receiver<RelayEvent> {
        self.registry.events()
    }

    /// Remove every session
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

impl Default for MediaRelay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
