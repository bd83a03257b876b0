//! Relay demo: one simulated capture device, two live viewers
//!
//! Run with: cargo run --example relay_demo [CHUNKS]
//!
//! The producer pushes 8KB chunks at roughly 5 fps. Viewer "push" receives
//! chunks from a paced delivery task; viewer "pull" polls for them. Both see
//! every chunk. Set `RUST_LOG=chunk_relay=debug` to watch the worker and
//! delivery tasks start and stop.

use std::time::Duration;

use chunk_relay::{Delivery, MediaRelay, RelayConfig, RelayError, RelayEvent, SubscriberId};
use tracing_subscriber::EnvFilter;

const CHUNK_SIZE: usize = 8192;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chunk_relay=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let chunks: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(20);

    let config = RelayConfig::default()
        .ingest_capacity(32)
        .processed_capacity(32)
        .enable_keepalive();
    let relay = MediaRelay::new(config);

    // Notification layer: print lightweight events
    let mut events = relay.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RelayEvent::ChunkIngested { .. } | RelayEvent::ChunkProcessed { .. } => {}
                other => println!("[event] {}: {:?}", other.kind(), other),
            }
        }
    });

    let session = relay.start_session("demo-camera").await?;
    println!("Started {}", session);

    // Push viewer
    let mut deliveries = relay.request_push_delivery(session, "push".into()).await?;
    let push_viewer = tokio::spawn(async move {
        let mut received = 0;
        while let Some(delivery) = deliveries.recv().await {
            match delivery {
                Delivery::Chunk(chunk) => {
                    received += 1;
                    println!(
                        "[push] chunk #{} size={} ts={}",
                        chunk.sequence,
                        chunk.len(),
                        chunk.timestamp_ms
                    );
                }
                Delivery::Keepalive => println!("[push] keepalive"),
            }
        }
        received
    });

    // Pull viewer
    let pull_id = SubscriberId::from("pull");
    relay.subscribe(session, pull_id.clone()).await?;
    let pull_relay = relay.clone();
    let pull_viewer = tokio::spawn(async move {
        let mut received = 0;
        loop {
            match pull_relay
                .poll_processed(session, &pull_id, Duration::from_millis(500))
                .await
            {
                Ok(Some(_)) => received += 1,
                Ok(None) => {}
                Err(_) => break,
            }
        }
        received
    });

    // Producer
    for i in 0..chunks {
        let payload = vec![(i % 256) as u8; CHUNK_SIZE];
        match relay.ingest(session, payload).await {
            Ok(()) => {}
            Err(e @ RelayError::BufferFull(_)) => println!("[producer] {}, dropping", e),
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // Let the viewers drain before stopping
    tokio::time::sleep(Duration::from_secs(1)).await;

    for summary in relay.list_sessions().await {
        println!(
            "Session {} device={} active={} subscribers={} depth={}",
            summary.id,
            summary.device_id,
            summary.active,
            summary.subscriber_count,
            summary.ingest_depth
        );
    }

    let stats = relay.session_stats(session).await?;
    println!(
        "Stats: ingested={} processed={} degraded={} dropped={}",
        stats.chunks_ingested,
        stats.chunks_processed,
        stats.degraded_chunks,
        stats.dropped_deliveries
    );

    relay.stop_session(session).await?;

    let pushed = push_viewer.await?;
    let pulled = pull_viewer.await?;
    println!("Viewer push received {} chunks, viewer pull received {}", pushed, pulled);

    Ok(())
}
