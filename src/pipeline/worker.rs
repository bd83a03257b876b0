//! Processing worker
//!
//! One task per session drains the ingest buffer, applies the transform and
//! replicates the result to every subscriber. The worker observes a stop
//! request only by polling the session's active flag after each ingest pop,
//! so it exits at most one poll timeout after `Session::stop`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::event::RelayEvent;
use crate::session::{ProcessedChunk, Session};

use super::transform::{wall_clock_ms, ChunkTransform, TransformError};

/// Spawn the processing worker for a session
pub(crate) fn spawn(
    session: Arc<Session>,
    transform: Arc<dyn ChunkTransform>,
    poll_timeout: Duration,
) -> JoinHandle<()> {
    session.mark_worker_started();
    tokio::spawn(run(session, transform, poll_timeout))
}

async fn run(session: Arc<Session>, transform: Arc<dyn ChunkTransform>, poll_timeout: Duration) {
    let session_id = session.id();
    let mut sequence: u64 = 0;

    tracing::debug!(session = %session_id, "Processing worker started");

    while session.is_active() {
        let Some(raw) = session.ingest().pop(poll_timeout).await else {
            continue;
        };

        session.counters().record_consumed();

        let chunk = process(&session, transform.as_ref(), sequence, raw);
        sequence += 1;

        let size = chunk.len();
        let timestamp_ms = chunk.timestamp_ms;
        let degraded = chunk.degraded;

        for subscriber_id in session.fan_out(&chunk).await {
            tracing::warn!(
                session = %session_id,
                subscriber = %subscriber_id,
                sequence = chunk.sequence,
                "Processed buffer full, dropping chunk for subscriber"
            );
            session.events().emit(RelayEvent::BufferFull {
                session_id,
                subscriber_id,
            });
        }

        session.counters().record_processed(size, degraded);
        session.events().emit(RelayEvent::ChunkProcessed {
            session_id,
            size,
            timestamp_ms,
            degraded,
        });
    }

    tracing::debug!(
        session = %session_id,
        processed = sequence,
        discarded = session.ingest().len(),
        "Processing worker stopped"
    );
}

/// Transform one chunk, falling back to the raw payload on failure
fn process(
    session: &Session,
    transform: &dyn ChunkTransform,
    sequence: u64,
    raw: Bytes,
) -> ProcessedChunk {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| transform.apply(&raw, session.id())))
        .unwrap_or_else(|payload| Err(TransformError::Panicked(panic_message(payload))));

    match outcome {
        Ok(output) => ProcessedChunk::new(sequence, output.data, output.timestamp_ms),
        Err(e) => {
            tracing::warn!(
                session = %session.id(),
                sequence = sequence,
                size = raw.len(),
                error = %e,
                "Transform failed, forwarding raw chunk"
            );
            ProcessedChunk::degraded(sequence, raw, wall_clock_ms().unwrap_or(0))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::event::EventBus;
    use crate::pipeline::transform::{
        TimestampTransform, TransformError, TransformOutput, TIMESTAMP_PREFIX_LEN,
    };
    use crate::registry::RelayConfig;
    use crate::session::{SessionId, SubscriberId};

    /// Fails every other chunk
    struct FlakyTransform {
        calls: AtomicU64,
    }

    impl ChunkTransform for FlakyTransform {
        fn apply(
            &self,
            raw: &Bytes,
            session_id: SessionId,
        ) -> Result<TransformOutput, TransformError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(TransformError::Rejected("odd chunk".into()));
            }
            TimestampTransform.apply(raw, session_id)
        }
    }

    /// Panics on the first chunk only
    struct PanickyTransform {
        calls: AtomicU64,
    }

    impl ChunkTransform for PanickyTransform {
        fn apply(
            &self,
            raw: &Bytes,
            session_id: SessionId,
        ) -> Result<TransformOutput, TransformError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("decoder state corrupted");
            }
            TimestampTransform.apply(raw, session_id)
        }
    }

    fn new_session(config: &RelayConfig) -> Arc<Session> {
        Arc::new(Session::new(
            SessionId::from_raw(1),
            "device".into(),
            config,
            EventBus::new(256),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_processes_in_order() {
        let config = RelayConfig::default();
        let session = new_session(&config);
        let viewer = SubscriberId::from("viewer");
        session.add_subscriber(viewer.clone()).await;
        let subscription = session.subscription(&viewer).await.unwrap();

        let handle = spawn(
            Arc::clone(&session),
            Arc::new(TimestampTransform),
            config.ingest_poll_timeout,
        );

        for i in 0..3u8 {
            session.add_chunk(Bytes::from(vec![i; 32])).unwrap();
        }

        for i in 0..3u8 {
            let chunk = subscription.next_chunk(Duration::from_secs(5)).await.unwrap();
            assert_eq!(chunk.sequence, i as u64);
            assert_eq!(chunk.len(), 32 + TIMESTAMP_PREFIX_LEN);
            assert_eq!(chunk.data[TIMESTAMP_PREFIX_LEN + 1], i);
            assert!(!chunk.degraded);
        }

        session.stop();
        handle.await.unwrap();

        let stats = session.stats();
        assert_eq!(stats.chunks_consumed, 3);
        assert_eq!(stats.chunks_processed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transform_failure_forwards_raw() {
        let config = RelayConfig::default();
        let session = new_session(&config);
        let viewer = SubscriberId::from("viewer");
        session.add_subscriber(viewer.clone()).await;
        let subscription = session.subscription(&viewer).await.unwrap();

        let handle = spawn(
            Arc::clone(&session),
            Arc::new(FlakyTransform {
                calls: AtomicU64::new(0),
            }),
            config.ingest_poll_timeout,
        );

        session.add_chunk(Bytes::from_static(b"first chunk")).unwrap();
        session.add_chunk(Bytes::from_static(b"second chunk")).unwrap();
        session.add_chunk(Bytes::from_static(b"third chunk")).unwrap();

        let first = subscription.next_chunk(Duration::from_secs(5)).await.unwrap();
        let second = subscription.next_chunk(Duration::from_secs(5)).await.unwrap();
        let third = subscription.next_chunk(Duration::from_secs(5)).await.unwrap();

        assert!(!first.degraded);
        assert!(second.degraded);
        assert_eq!(second.data, Bytes::from_static(b"second chunk"));
        // Worker keeps going after the failure
        assert!(!third.degraded);

        session.stop();
        handle.await.unwrap();
        assert_eq!(session.stats().degraded_chunks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_exits_within_poll_timeout() {
        let config = RelayConfig::default().ingest_poll_timeout(Duration::from_millis(250));
        let session = new_session(&config);

        let handle = spawn(
            Arc::clone(&session),
            Arc::new(TimestampTransform),
            config.ingest_poll_timeout,
        );
        tokio::task::yield_now().await;

        let stopped_at = Instant::now();
        session.stop();
        handle.await.unwrap();

        assert!(stopped_at.elapsed() <= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_subscriber_does_not_block_worker() {
        let config = RelayConfig::default().processed_capacity(1);
        let session = new_session(&config);
        let mut events = session.events().subscribe();
        session.add_subscriber("slow".into()).await;

        let handle = spawn(
            Arc::clone(&session),
            Arc::new(TimestampTransform),
            config.ingest_poll_timeout,
        );

        session.add_chunk(Bytes::from_static(b"one")).unwrap();
        session.add_chunk(Bytes::from_static(b"two")).unwrap();

        let mut saw_buffer_full = false;
        let mut processed = 0;
        while processed < 2 {
            match events.recv().await.unwrap() {
                RelayEvent::ChunkProcessed { .. } => processed += 1,
                RelayEvent::BufferFull { subscriber_id, .. } => {
                    assert_eq!(subscriber_id.as_str(), "slow");
                    saw_buffer_full = true;
                }
                _ => {}
            }
        }
        assert!(saw_buffer_full);

        session.stop();
        handle.await.unwrap();
        assert_eq!(session.stats().dropped_deliveries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transform_panic_keeps_worker_alive() {
        let config = RelayConfig::default();
        let session = new_session(&config);
        let viewer = SubscriberId::from("viewer");
        session.add_subscriber(viewer.clone()).await;
        let subscription = session.subscription(&viewer).await.unwrap();

        let handle = spawn(
            Arc::clone(&session),
            Arc::new(PanickyTransform {
                calls: AtomicU64::new(0),
            }),
            config.ingest_poll_timeout,
        );

        session.add_chunk(Bytes::from_static(b"poison")).unwrap();
        session.add_chunk(Bytes::from_static(b"healthy")).unwrap();

        let first = subscription.next_chunk(Duration::from_secs(5)).await.unwrap();
        let second = subscription.next_chunk(Duration::from_secs(5)).await.unwrap();

        assert!(first.degraded);
        assert_eq!(first.data, Bytes::from_static(b"poison"));
        assert!(!second.degraded);
        assert_eq!(second.sequence, 1);
        assert!(!handle.is_finished());

        session.stop();
        handle.await.unwrap();
        assert_eq!(session.stats().degraded_chunks, 1);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7u8)), "non-string panic payload");
    }
}
