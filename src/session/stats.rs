//! Per-session counters and snapshots

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::chunk::SessionId;

/// Point-in-time view of a session, as reported by registry listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session id
    pub id: SessionId,
    /// Producing device
    pub device_id: String,
    /// Whether the session still accepts chunks
    pub active: bool,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Number of attached subscribers
    pub subscriber_count: usize,
    /// Chunks waiting in the ingest buffer
    pub ingest_depth: usize,
}

/// Session-level statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Chunks accepted by `add_chunk`
    pub chunks_ingested: u64,
    /// Bytes accepted by `add_chunk`
    pub bytes_ingested: u64,
    /// Chunks rejected because the ingest buffer was full
    pub chunks_rejected: u64,
    /// Chunks taken off the ingest buffer by the worker
    pub chunks_consumed: u64,
    /// Chunks emitted by the worker (including degraded ones)
    pub chunks_processed: u64,
    /// Bytes emitted by the worker
    pub bytes_processed: u64,
    /// Chunks forwarded raw after a transform failure
    pub degraded_chunks: u64,
    /// Per-subscriber copies dropped because a processed buffer was full
    pub dropped_deliveries: u64,
    /// Time since the session was created
    pub uptime: Duration,
}

impl SessionStats {
    /// Calculate the ingest bitrate in bits per second
    pub fn ingest_bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_ingested * 8) / secs
        } else {
            0
        }
    }
}

/// Lock-free counters updated from the producer and worker sides
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    chunks_ingested: AtomicU64,
    bytes_ingested: AtomicU64,
    chunks_rejected: AtomicU64,
    chunks_consumed: AtomicU64,
    chunks_processed: AtomicU64,
    bytes_processed: AtomicU64,
    degraded_chunks: AtomicU64,
    dropped_deliveries: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn record_ingested(&self, size: usize) {
        self.chunks_ingested.fetch_add(1, Ordering::Relaxed);
        self.bytes_ingested.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.chunks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consumed(&self) {
        self.chunks_consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self, size: usize, degraded: bool) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(size as u64, Ordering::Relaxed);
        if degraded {
            self.degraded_chunks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_dropped(&self, count: usize) {
        self.dropped_deliveries
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, uptime: Duration) -> SessionStats {
        SessionStats {
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            bytes_ingested: self.bytes_ingested.load(Ordering::Relaxed),
            chunks_rejected: self.chunks_rejected.load(Ordering::Relaxed),
            chunks_consumed: self.chunks_consumed.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            degraded_chunks: self.degraded_chunks.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
            uptime,
        }
    }
}
