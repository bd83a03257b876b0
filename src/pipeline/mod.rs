//! Processing and delivery stages
//!
//! - `transform`: the per-chunk transform and its trait seam
//! - `worker`: one task per session, ingest buffer → transform → subscribers
//! - `dispatcher`: one task per (session, subscriber), subscriber buffer → transport

pub mod dispatcher;
pub mod transform;
pub mod worker;

pub use dispatcher::Delivery;
pub use transform::{
    apply_at, timestamp_of, ChunkTransform, TimestampTransform, TransformError, TransformOutput,
};
