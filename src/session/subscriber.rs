//! Per-subscriber delivery state

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::buffer::ChunkBuffer;

use super::chunk::ProcessedChunk;

/// A subscriber's membership in one session
///
/// Each subscriber owns a replica of the session's processed output, so
/// concurrent subscribers never compete for the same chunk.
#[derive(Debug)]
pub struct Subscription {
    /// Processed chunks waiting for this subscriber
    queue: ChunkBuffer<ProcessedChunk>,
    /// Cleared when the subscriber leaves or the session is removed
    attached: AtomicBool,
    /// Bumped on each push-delivery request; older delivery tasks exit
    delivery_generation: AtomicU64,
    /// Chunks this subscriber missed
    dropped: AtomicU64,
}

impl Subscription {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: ChunkBuffer::new(capacity),
            attached: AtomicBool::new(true),
            delivery_generation: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer a processed chunk without waiting
    ///
    /// Returns false if the chunk was dropped because the buffer is full.
    pub(crate) fn offer(&self, chunk: ProcessedChunk) -> bool {
        match self.queue.push(chunk) {
            Ok(()) => true,
            Err(_) => {
                self.record_dropped();
                false
            }
        }
    }

    /// Count a chunk this subscriber will never receive
    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the next processed chunk, waiting up to `timeout`
    pub async fn next_chunk(&self, timeout: Duration) -> Option<ProcessedChunk> {
        self.queue.pop(timeout).await
    }

    /// Check if the subscriber is still a member of its session
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.queue.clear();
    }

    /// Start a new delivery generation, superseding any running task
    pub(crate) fn begin_delivery(&self) -> u64 {
        self.delivery_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Check if a delivery task started at `generation` is still current
    pub(crate) fn is_current_delivery(&self, generation: u64) -> bool {
        self.delivery_generation.load(Ordering::SeqCst) == generation
    }

    /// Number of chunks waiting for this subscriber
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of chunks this subscriber missed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
