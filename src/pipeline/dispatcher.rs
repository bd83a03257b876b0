//! Fanout dispatcher
//!
//! A delivery task per (session, subscriber) that pushes processed chunks
//! into the subscriber's transport channel at a paced rate. The task stops
//! when the session stops, the subscriber leaves, a newer delivery request
//! supersedes it, or the transport drops its receiver.
//!
//! Sends never wait. A delivery that finds the transport channel full is
//! dropped, so after a stop the task exits within one poll timeout plus one
//! pacing interval however slowly the transport reads.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;

use crate::registry::RelayConfig;
use crate::session::{ProcessedChunk, Session, SubscriberId, Subscription};

/// Item handed to a subscriber's transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A processed chunk
    Chunk(ProcessedChunk),
    /// Nothing arrived within the poll timeout; the stream is still alive
    Keepalive,
}

/// Delivery task settings, taken from the relay configuration
#[derive(Debug, Clone, Copy)]
pub(crate) struct DispatchSettings {
    /// How long to wait for a processed chunk before re-checking liveness
    pub poll_timeout: Duration,
    /// Minimum spacing between delivered chunks
    pub interval: Duration,
    /// Send `Delivery::Keepalive` on poll timeouts
    pub keepalive: bool,
    /// Capacity of the transport channel
    pub channel_capacity: usize,
}

impl From<&RelayConfig> for DispatchSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            poll_timeout: config.delivery_poll_timeout,
            interval: config.delivery_interval,
            keepalive: config.keepalive,
            channel_capacity: config.delivery_channel_capacity,
        }
    }
}

/// Why a delivery task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    SessionStopped,
    Unsubscribed,
    Superseded,
    TransportClosed,
}

/// Spawn a delivery task and return the transport's receiving end
pub(crate) fn spawn(
    session: Arc<Session>,
    subscriber_id: SubscriberId,
    subscription: Arc<Subscription>,
    settings: DispatchSettings,
) -> mpsc::Receiver<Delivery> {
    let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
    let generation = subscription.begin_delivery();

    tokio::spawn(async move {
        tracing::debug!(
            session = %session.id(),
            subscriber = %subscriber_id,
            generation = generation,
            "Delivery task started"
        );

        let (reason, delivered) = run(&session, &subscription, generation, &tx, settings).await;

        tracing::debug!(
            session = %session.id(),
            subscriber = %subscriber_id,
            reason = ?reason,
            delivered = delivered,
            "Delivery task stopped"
        );
    });

    rx
}

async fn run(
    session: &Session,
    subscription: &Subscription,
    generation: u64,
    tx: &mpsc::Sender<Delivery>,
    settings: DispatchSettings,
) -> (ExitReason, u64) {
    let mut pacing = tokio::time::interval(settings.interval.max(Duration::from_millis(1)));
    pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut delivered: u64 = 0;

    loop {
        if !session.is_active() {
            return (ExitReason::SessionStopped, delivered);
        }
        if !subscription.is_attached() {
            return (ExitReason::Unsubscribed, delivered);
        }
        if !subscription.is_current_delivery(generation) {
            return (ExitReason::Superseded, delivered);
        }

        let delivery = match subscription.next_chunk(settings.poll_timeout).await {
            Some(chunk) if !subscription.is_current_delivery(generation) => {
                // Popped on behalf of a receiver nobody reads anymore
                record_dropped(session, subscription);
                tracing::debug!(
                    session = %session.id(),
                    sequence = chunk.sequence,
                    "Superseded delivery task discarded a chunk"
                );
                return (ExitReason::Superseded, delivered);
            }
            Some(chunk) => {
                // First tick completes immediately; later ticks enforce spacing
                pacing.tick().await;
                Delivery::Chunk(chunk)
            }
            None if settings.keepalive => Delivery::Keepalive,
            None => continue,
        };

        let is_chunk = matches!(delivery, Delivery::Chunk(_));

        // Never wait on the transport; a full channel loses this delivery
        match tx.try_send(delivery) {
            Ok(()) => {
                if is_chunk {
                    delivered += 1;
                }
            }
            Err(TrySendError::Closed(_)) => return (ExitReason::TransportClosed, delivered),
            Err(TrySendError::Full(Delivery::Chunk(chunk))) => {
                record_dropped(session, subscription);
                tracing::warn!(
                    session = %session.id(),
                    sequence = chunk.sequence,
                    dropped = subscription.dropped(),
                    "Transport channel full, dropping chunk"
                );
            }
            Err(TrySendError::Full(Delivery::Keepalive)) => {}
        }
    }
}

fn record_dropped(session: &Session, subscription: &Subscription) {
    subscription.record_dropped();
    session.counters().record_dropped(1);
}
