//! Per-chunk transform
//!
//! The default transform prefixes each chunk with an 8-byte big-endian
//! millisecond timestamp and brightens a sparse sample of the leading bytes:
//! over the first tenth of the payload, every tenth byte gets +10
//! (saturating at 255). The cost stays a small fraction of the payload size
//! regardless of chunk length.
//!
//! ```text
//! raw:     [b0 b1 .. b9 b10 .. bN-1]
//! output:  [ts(8, BE)][b0+10 b1 .. b9 b10+10 .. bN-1]
//!                      ^ touched while offset < N/10, stride 10
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;

use crate::session::SessionId;

/// Length of the timestamp prefix in bytes
pub const TIMESTAMP_PREFIX_LEN: usize = 8;

/// Amount added to each sampled byte
pub const BRIGHTNESS_DELTA: u8 = 10;

/// Distance between sampled bytes
pub const SAMPLE_STRIDE: usize = 10;

/// Only the first `len / SAMPLE_SPAN_DIVISOR` payload bytes are sampled
pub const SAMPLE_SPAN_DIVISOR: usize = 10;

/// Error raised by a transform; handled per chunk inside the worker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Wall clock reads earlier than the Unix epoch
    #[error("System clock is before the Unix epoch")]
    ClockBeforeEpoch,

    /// Transform refused this chunk
    #[error("Transform rejected chunk: {0}")]
    Rejected(String),

    /// Transform panicked; the worker caught it and carried on
    #[error("Transform panicked: {0}")]
    Panicked(String),
}

/// Output of a successful transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    /// Transformed payload
    pub data: Bytes,
    /// Timestamp captured for this chunk (ms since the Unix epoch)
    pub timestamp_ms: u64,
}

/// A per-chunk transform run by the processing worker
///
/// Implementations must be cheap: the worker calls `apply` inline for every
/// chunk of the session. Report failures by returning `Err`. A panic is
/// caught and treated as a failed chunk, but it still unwinds through the
/// implementation, so any state it guards must stay consistent.
pub trait ChunkTransform: Send + Sync {
    /// Transform one raw chunk
    fn apply(&self, raw: &Bytes, session_id: SessionId) -> Result<TransformOutput, TransformError>;
}

/// Default transform: timestamp prefix plus sparse brightness adjustment
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampTransform;

impl ChunkTransform for TimestampTransform {
    fn apply(
        &self,
        raw: &Bytes,
        _session_id: SessionId,
    ) -> Result<TransformOutput, TransformError> {
        let timestamp_ms = wall_clock_ms()?;

        Ok(TransformOutput {
            data: apply_at(raw, timestamp_ms),
            timestamp_ms,
        })
    }
}

/// Apply the default transform with an explicit timestamp
///
/// Pure: identical input and timestamp always give identical output.
pub fn apply_at(raw: &[u8], timestamp_ms: u64) -> Bytes {
    let mut output = BytesMut::with_capacity(TIMESTAMP_PREFIX_LEN + raw.len());
    output.put_u64(timestamp_ms);
    output.extend_from_slice(raw);

    let span = raw.len() / SAMPLE_SPAN_DIVISOR;
    for offset in (0..span).step_by(SAMPLE_STRIDE) {
        let index = TIMESTAMP_PREFIX_LEN + offset;
        output[index] = output[index].saturating_add(BRIGHTNESS_DELTA);
    }

    output.freeze()
}

/// Read the wall clock as milliseconds since the Unix epoch
pub fn wall_clock_ms() -> Result<u64, TransformError> {
    u64::try_from(Utc::now().timestamp_millis()).map_err(|_| TransformError::ClockBeforeEpoch)
}

/// Read the timestamp prefix back from a transformed chunk
pub fn timestamp_of(data: &[u8]) -> Option<u64> {
    let prefix: [u8; TIMESTAMP_PREFIX_LEN] = data.get(..TIMESTAMP_PREFIX_LEN)?.try_into().ok()?;
    Some(u64::from_be_bytes(prefix))
}
