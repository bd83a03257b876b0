//! Session registry
//!
//! The registry owns every session and mediates all access by id. Each
//! session gets a processing worker at creation; each subscriber requesting
//! push delivery gets its own delivery task.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<SessionRegistry>
//!                   ┌──────────────────────────────┐
//!                   │ sessions: HashMap<Id,        │
//!                   │   Session {                  │
//!                   │     ingest: ChunkBuffer,     │
//!                   │     subscribers: {           │
//!                   │       id → ChunkBuffer },    │
//!                   │   }                          │
//!                   │ >                            │
//!                   └──────────────┬───────────────┘
//!                                  │
//!        ┌─────────────────────────┼─────────────────────────┐
//!        │                         │                         │
//!        ▼                         ▼                         ▼
//!   [Producer]              [Processing worker]        [Delivery task]
//!   add_chunk() ──► ingest ──► transform ──► fan_out ──► subscriber buffer ──► transport
//! ```
//!
//! # Replicated fanout
//!
//! The worker hands every processed chunk to each subscriber's own bounded
//! buffer. Payloads are `bytes::Bytes`, so replicas share one allocation.
//! A full subscriber buffer drops the chunk for that subscriber only.

pub mod config;
pub mod store;

pub use config::RelayConfig;
pub use store::SessionRegistry;
