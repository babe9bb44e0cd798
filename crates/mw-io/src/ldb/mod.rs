//! Embedded `sled`-backed CDC store (§4.4, §4.7, §4.8): row keyspace,
//! append-only log keyspace, and the `QueryableSink` surface the HTTP query
//! service reads from.

mod projector;
mod sink;

pub use projector::{plan_batch, LdbPlan};
pub use sink::LdbSink;
