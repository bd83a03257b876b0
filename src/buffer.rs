//! Bounded chunk buffer
//!
//! A fixed-capacity FIFO shared between one producer side and one consumer
//! task. Producers never wait: `push` rejects immediately when the buffer is
//! full or closed. Consumers wait for at most a caller-supplied timeout so
//! they can periodically re-check whether they should keep running.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Why a push was rejected; the item is handed back either way
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError<T> {
    /// The buffer is at capacity
    Full(T),
    /// The buffer was closed and accepts nothing further
    Closed(T),
}

impl<T> PushError<T> {
    /// Take back the rejected item
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }
}

/// Fixed-capacity FIFO with non-blocking push and timeout-bounded pop
#[derive(Debug)]
pub struct ChunkBuffer<T> {
    /// Maximum number of queued items
    capacity: usize,
    /// Queued items, oldest first
    items: Mutex<VecDeque<T>>,
    /// Only written while `items` is locked
    closed: AtomicBool,
    /// Wakes a waiting consumer after a push
    notify: Notify,
}

impl<T> ChunkBuffer<T> {
    /// Create a buffer holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Append an item without waiting
    ///
    /// Returns the item back if the buffer is at capacity or closed.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut items = self.lock();
            if self.closed.load(Ordering::SeqCst) {
                return Err(PushError::Closed(item));
            }
            if items.len() >= self.capacity {
                return Err(PushError::Full(item));
            }
            items.push_back(item);
        }

        self.notify.notify_one();
        Ok(())
    }

    /// Refuse all further pushes
    ///
    /// Queued items stay poppable. Once this returns, no concurrent `push`
    /// can still succeed. Returns true if this call closed the buffer.
    pub fn close(&self) -> bool {
        let _items = self.lock();
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Check if the buffer has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Take the oldest item if one is queued
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive
    ///
    /// Returns `None` if the buffer stayed empty for the whole timeout.
    pub async fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a push between the check
            // and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Drop every queued item, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let dropped = items.len();
        items.clear();
        dropped
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Check if the next push would be rejected
    pub fn is_full(&self) -> bool {
        self.lock().len() >= self.capacity
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // Queue operations cannot leave the deque half-updated, so a poisoned
        // lock still guards consistent data.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
