//! Session entity
//!
//! A session owns the ingest buffer, the subscriber set and the lifecycle
//! flags for one stream. The registry owns sessions; the processing worker
//! and delivery tasks hold `Arc` clones and poll the flags.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::buffer::{ChunkBuffer, PushError};
use crate::error::{RelayError, Result};
use crate::event::{EventBus, RelayEvent};
use crate::registry::RelayConfig;

use super::chunk::{ProcessedChunk, SessionId, SubscriberId};
use super::state::SessionPhase;
use super::stats::{SessionCounters, SessionStats, SessionSummary};
use super::subscriber::Subscription;

/// One logical real-time stream from ingest through delivery
pub struct Session {
    id: SessionId,

    /// Producing device
    device_id: String,

    /// Wall-clock creation time
    created_at: DateTime<Utc>,

    /// Monotonic creation time (for uptime)
    started: Instant,

    /// Cleared by `stop()`; never set again
    active: AtomicBool,

    /// Set once the processing worker is running
    worker_started: AtomicBool,

    /// Set when the registry erases the session
    removed: AtomicBool,

    /// Raw chunks waiting for the processing worker
    ingest: ChunkBuffer<Bytes>,

    /// Subscribers keyed by id, each with its own processed buffer
    subscribers: RwLock<HashMap<SubscriberId, Arc<Subscription>>>,

    /// Capacity of each subscriber's processed buffer
    processed_capacity: usize,

    /// Handle for the processing worker task
    worker: Mutex<Option<JoinHandle<()>>>,

    counters: SessionCounters,

    events: EventBus,
}

impl Session {
    /// Create a new session
    pub(crate) fn new(
        id: SessionId,
        device_id: String,
        config: &RelayConfig,
        events: EventBus,
    ) -> Self {
        Self {
            id,
            device_id,
            created_at: Utc::now(),
            started: Instant::now(),
            active: AtomicBool::new(true),
            worker_started: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            ingest: ChunkBuffer::new(config.ingest_capacity),
            subscribers: RwLock::new(HashMap::new()),
            processed_capacity: config.processed_capacity,
            worker: Mutex::new(None),
            counters: SessionCounters::default(),
            events,
        }
    }

    /// Get the session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the producing device id
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Get the wall-clock creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Check if the session still accepts chunks
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Get the current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_flags(
            self.worker_started.load(Ordering::SeqCst),
            self.is_active(),
            self.removed.load(Ordering::SeqCst),
        )
    }

    /// Submit a raw chunk from the producer
    ///
    /// Never waits: a saturated ingest buffer is reported immediately as
    /// `BufferFull` so the producer can retry or drop.
    pub fn add_chunk(&self, raw: Bytes) -> Result<()> {
        if !self.phase().accepts_chunks() {
            return Err(RelayError::Inactive(self.id));
        }
        if raw.is_empty() {
            return Err(RelayError::EmptyChunk(self.id));
        }

        let size = raw.len();
        match self.ingest.push(raw) {
            Ok(()) => {}
            // Lost a race with `stop()`
            Err(PushError::Closed(_)) => return Err(RelayError::Inactive(self.id)),
            Err(PushError::Full(_)) => {
                self.counters.record_rejected();
                tracing::warn!(
                    session = %self.id,
                    capacity = self.ingest.capacity(),
                    "Ingest buffer full, rejecting chunk"
                );
                return Err(RelayError::BufferFull(self.id));
            }
        }

        self.counters.record_ingested(size);
        self.events.emit(RelayEvent::ChunkIngested {
            session_id: self.id,
            size,
        });

        Ok(())
    }

    /// Stop accepting chunks
    ///
    /// Idempotent. Returns true if this call performed the transition. The
    /// ingest buffer is closed before the active flag clears, so no chunk is
    /// accepted once this returns. The worker and delivery tasks notice on
    /// their next poll tick.
    pub fn stop(&self) -> bool {
        self.ingest.close();
        let was_active = self.active.swap(false, Ordering::SeqCst);

        if was_active {
            tracing::info!(
                session = %self.id,
                pending = self.ingest.len(),
                "Session stopping"
            );
        }

        was_active
    }

    /// Add a subscriber
    ///
    /// Returns false if the subscriber was already a member.
    pub async fn add_subscriber(&self, subscriber_id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write().await;

        if subscribers.contains_key(&subscriber_id) {
            return false;
        }

        subscribers.insert(
            subscriber_id.clone(),
            Arc::new(Subscription::new(self.processed_capacity)),
        );

        tracing::info!(
            session = %self.id,
            subscriber = %subscriber_id,
            subscribers = subscribers.len(),
            "Subscriber added"
        );

        self.events.emit(RelayEvent::SubscriberJoined {
            session_id: self.id,
            subscriber_id,
        });

        true
    }

    /// Remove a subscriber
    ///
    /// Returns false if the subscriber was not a member.
    pub async fn remove_subscriber(&self, subscriber_id: &SubscriberId) -> bool {
        let removed = self.subscribers.write().await.remove(subscriber_id);

        match removed {
            Some(subscription) => {
                subscription.detach();
                tracing::info!(
                    session = %self.id,
                    subscriber = %subscriber_id,
                    "Subscriber removed"
                );
                self.events.emit(RelayEvent::SubscriberLeft {
                    session_id: self.id,
                    subscriber_id: subscriber_id.clone(),
                });
                true
            }
            None => false,
        }
    }

    /// Check if a subscriber is a member
    pub async fn is_subscribed(&self, subscriber_id: &SubscriberId) -> bool {
        self.subscribers.read().await.contains_key(subscriber_id)
    }

    /// Get a subscriber's membership handle
    pub async fn subscription(&self, subscriber_id: &SubscriberId) -> Option<Arc<Subscription>> {
        self.subscribers.read().await.get(subscriber_id).cloned()
    }

    /// Get the number of subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Detach every subscriber, returning how many were detached
    pub async fn detach_all(&self) -> usize {
        let detached: Vec<(SubscriberId, Arc<Subscription>)> =
            self.subscribers.write().await.drain().collect();

        for (subscriber_id, subscription) in &detached {
            subscription.detach();
            self.events.emit(RelayEvent::SubscriberLeft {
                session_id: self.id,
                subscriber_id: subscriber_id.clone(),
            });
        }

        detached.len()
    }

    /// Hand a processed chunk to every subscriber
    ///
    /// Never waits on a slow subscriber. Returns the subscribers whose
    /// buffers were full and therefore missed this chunk.
    pub(crate) async fn fan_out(&self, chunk: &ProcessedChunk) -> Vec<SubscriberId> {
        let subscribers = self.subscribers.read().await;

        let dropped: Vec<SubscriberId> = subscribers
            .iter()
            .filter(|(_, subscription)| !subscription.offer(chunk.clone()))
            .map(|(subscriber_id, _)| subscriber_id.clone())
            .collect();

        if !dropped.is_empty() {
            self.counters.record_dropped(dropped.len());
        }

        dropped
    }

    pub(crate) fn ingest(&self) -> &ChunkBuffer<Bytes> {
        &self.ingest
    }

    pub(crate) fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) async fn attach_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock().await = Some(handle);
    }

    pub(crate) fn mark_worker_started(&self) {
        self.worker_started.store(true, Ordering::SeqCst);
    }

    /// Drop chunks still waiting in the ingest buffer
    pub(crate) fn clear_buffers(&self) -> usize {
        self.ingest.clear()
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    /// Wait for the processing worker to exit
    ///
    /// Returns immediately if the worker was never attached or was already
    /// awaited.
    pub async fn wait_worker(&self) {
        let handle = self.worker.lock().await.take();

        if let Some(task) = handle {
            if let Err(e) = task.await {
                tracing::error!(session = %self.id, error = %e, "Processing worker panicked");
            }
        }
    }

    /// Check if the processing worker has exited
    pub async fn is_worker_finished(&self) -> bool {
        match self.worker.lock().await.as_ref() {
            Some(task) => task.is_finished(),
            None => true,
        }
    }

    /// Get a point-in-time summary
    pub async fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            device_id: self.device_id.clone(),
            active: self.is_active(),
            created_at: self.created_at,
            subscriber_count: self.subscriber_count().await,
            ingest_depth: self.ingest.len(),
        }
    }

    /// Get session statistics
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(self.started.elapsed())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("phase", &self.phase())
            .field("ingest_depth", &self.ingest.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(config: RelayConfig) -> Session {
        Session::new(
            SessionId::from_raw(1),
            "glasses-01".into(),
            &config,
            EventBus::new(64),
        )
    }

    fn session() -> Session {
        session_with(RelayConfig::default())
    }

    #[test]
    fn test_backpressure() {
        let session = session_with(RelayConfig::default().ingest_capacity(3));

        for _ in 0..3 {
            assert!(session.add_chunk(Bytes::from_static(b"frame")).is_ok());
        }

        let result = session.add_chunk(Bytes::from_static(b"frame"));
        assert_eq!(result, Err(RelayError::BufferFull(session.id())));

        let stats = session.stats();
        assert_eq!(stats.chunks_ingested, 3);
        assert_eq!(stats.chunks_rejected, 1);
        assert_eq!(session.ingest().len(), 3);
    }

    #[test]
    fn test_empty_chunk_rejected() {
        let session = session();

        let result = session.add_chunk(Bytes::new());
        assert_eq!(result, Err(RelayError::EmptyChunk(session.id())));
        assert!(session.ingest().is_empty());
    }

    #[test]
    fn test_stop_idempotent() {
        let session = session();

        assert!(session.stop());
        assert!(!session.stop());
        assert!(!session.is_active());
        assert_eq!(session.phase(), SessionPhase::Stopping);
    }

    #[test]
    fn test_add_chunk_after_stop() {
        let session = session();
        session.stop();

        let result = session.add_chunk(Bytes::from_static(b"late"));
        assert_eq!(result, Err(RelayError::Inactive(session.id())));
        assert!(session.ingest().is_empty());
    }

    #[test]
    fn test_stop_closes_ingest() {
        let session = session();
        session.add_chunk(Bytes::from_static(b"early")).unwrap();

        session.stop();

        // A producer that passed the phase check before the stop still loses
        assert!(session.ingest().is_closed());
        assert_eq!(
            session.ingest().push(Bytes::from_static(b"racing")),
            Err(PushError::Closed(Bytes::from_static(b"racing")))
        );
        assert_eq!(session.ingest().len(), 1);
    }

    #[test]
    fn test_no_chunk_accepted_after_stop_returns() {
        let session = Arc::new(session_with(RelayConfig::default().ingest_capacity(1_000_000)));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    let mut accepted = 0usize;
                    loop {
                        match session.add_chunk(Bytes::from_static(b"frame")) {
                            Ok(()) => accepted += 1,
                            Err(RelayError::Inactive(_)) => return accepted,
                            Err(_) => std::thread::yield_now(),
                        }
                    }
                })
            })
            .collect();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(session.stop());
        let depth_at_stop = session.ingest().len();

        let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();

        assert_eq!(session.ingest().len(), depth_at_stop);
        assert_eq!(accepted, depth_at_stop);
        assert_eq!(session.stats().chunks_ingested, depth_at_stop as u64);
    }

    #[test]
    fn test_phase_progression() {
        let session = session();
        assert_eq!(session.phase(), SessionPhase::Created);

        session.mark_worker_started();
        assert_eq!(session.phase(), SessionPhase::Active);

        session.stop();
        session.mark_removed();
        assert_eq!(session.phase(), SessionPhase::Removed);
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let session = session();
        let viewer = SubscriberId::from("viewer-1");

        assert!(session.add_subscriber(viewer.clone()).await);
        assert!(!session.add_subscriber(viewer.clone()).await);
        assert!(session.is_subscribed(&viewer).await);
        assert_eq!(session.subscriber_count().await, 1);

        let subscription = session.subscription(&viewer).await.unwrap();
        assert!(session.remove_subscriber(&viewer).await);
        assert!(!subscription.is_attached());
        assert!(!session.remove_subscriber(&viewer).await);
        assert_eq!(session.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_fan_out_replicates_to_every_subscriber() {
        let session = session();
        let a = SubscriberId::from("a");
        let b = SubscriberId::from("b");
        session.add_subscriber(a.clone()).await;
        session.add_subscriber(b.clone()).await;

        let chunk = ProcessedChunk::new(0, Bytes::from_static(b"payload"), 1);
        let dropped = session.fan_out(&chunk).await;
        assert!(dropped.is_empty());

        for id in [&a, &b] {
            let subscription = session.subscription(id).await.unwrap();
            assert_eq!(subscription.pending(), 1);
        }
    }

    #[tokio::test]
    async fn test_fan_out_reports_full_subscriber() {
        let session = session_with(RelayConfig::default().processed_capacity(1));
        let slow = SubscriberId::from("slow");
        session.add_subscriber(slow.clone()).await;

        let chunk = ProcessedChunk::new(0, Bytes::from_static(b"payload"), 1);
        assert!(session.fan_out(&chunk).await.is_empty());
        assert_eq!(session.fan_out(&chunk).await, vec![slow]);
        assert_eq!(session.stats().dropped_deliveries, 1);
    }

    #[tokio::test]
    async fn test_detach_all() {
        let session = session();
        session.add_subscriber("a".into()).await;
        session.add_subscriber("b".into()).await;

        assert_eq!(session.detach_all().await, 2);
        assert_eq!(session.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_summary() {
        let session = session();
        session.add_chunk(Bytes::from_static(b"one")).unwrap();
        session.add_chunk(Bytes::from_static(b"two")).unwrap();
        session.add_subscriber("viewer".into()).await;

        let summary = session.summary().await;
        assert_eq!(summary.id, session.id());
        assert_eq!(summary.device_id, "glasses-01");
        assert!(summary.active);
        assert_eq!(summary.subscriber_count, 1);
        assert_eq!(summary.ingest_depth, 2);
    }
}
