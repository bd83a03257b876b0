//! Session-scoped relay for live media chunks
//!
//! A producing device pushes raw binary chunks into a session; a processing
//! worker applies a lightweight per-chunk transform; every subscriber of the
//! session receives its own copy of each processed chunk, either pushed by a
//! paced delivery task or pulled on demand.
//!
//! Memory is bounded per session: ingest and per-subscriber buffers have a
//! fixed capacity, producers see `BufferFull` instead of blocking, and slow
//! subscribers lose chunks instead of stalling the pipeline.
//!
//! Stopping is cooperative. `stop` flips a flag; the worker and delivery
//! tasks observe it on their next poll timeout (see `RelayConfig`).
//!
//! ```text
//! producer ─► ingest buffer ─► worker ─► transform ─┬─► subscriber A buffer ─► delivery task ─► transport
//!                                                   └─► subscriber B buffer ─► delivery task ─► transport
//! ```

pub mod buffer;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod session;

pub use buffer::{ChunkBuffer, PushError};
pub use error::{RelayError, Result};
pub use event::{EventBus, RelayEvent};
pub use pipeline::{ChunkTransform, Delivery, TimestampTransform, TransformError};
pub use registry::{RelayConfig, SessionRegistry};
pub use relay::MediaRelay;
pub use session::{
    ProcessedChunk, Session, SessionId, SessionPhase, SessionStats, SessionSummary, SubscriberId,
};
