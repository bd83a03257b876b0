//! Identifier and payload types shared by the pipeline stages

use std::str::FromStr;

use bytes::Bytes;

/// Unique identifier for a session
///
/// Allocated from a monotonic counter by the registry, so an id is never
/// handed out twice within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    const PREFIX: &'static str = "session-";

    /// Wrap a raw counter value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

/// Error returned when a string is not a valid session id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid session id: {0:?}")]
pub struct ParseSessionIdError(String);

impl FromStr for SessionId {
    type Err = ParseSessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(Self::PREFIX)
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(SessionId)
            .ok_or_else(|| ParseSessionIdError(s.to_string()))
    }
}

/// Opaque identity of a subscriber, chosen by the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Create a subscriber id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chunk after the processing stage
///
/// Cheap to clone: every subscriber's copy shares the same `Bytes` allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedChunk {
    /// Position in the session's ingest order, starting at 0
    pub sequence: u64,
    /// Transformed payload (timestamp prefix + adjusted body)
    pub data: Bytes,
    /// Wall-clock processing time in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Whether the transform failed and `data` is the raw chunk unmodified
    pub degraded: bool,
}

impl ProcessedChunk {
    /// Create a chunk produced by a successful transform
    pub fn new(sequence: u64, data: Bytes, timestamp_ms: u64) -> Self {
        Self {
            sequence,
            data,
            timestamp_ms,
            degraded: false,
        }
    }

    /// Create a chunk that forwards the raw payload after a transform failure
    pub fn degraded(sequence: u64, raw: Bytes, timestamp_ms: u64) -> Self {
        Self {
            sequence,
            data: raw,
            timestamp_ms,
            degraded: true,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
