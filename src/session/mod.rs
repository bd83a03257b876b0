//! Session state
//!
//! A session is one logical stream: chunks arrive from a single producing
//! device, pass through the processing worker, and are replicated to every
//! subscriber's processed buffer.

pub mod chunk;
pub mod entry;
pub mod state;
pub mod stats;
pub mod subscriber;

pub use chunk::{ParseSessionIdError, ProcessedChunk, SessionId, SubscriberId};
pub use entry::Session;
pub use state::SessionPhase;
pub use stats::{SessionStats, SessionSummary};
pub use subscriber::Subscription;
