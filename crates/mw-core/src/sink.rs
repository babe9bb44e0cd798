//! The shared backend abstraction (§9): both the ES and LDB sinks satisfy
//! `Sink`. The LDB sink additionally satisfies `QueryableSink`, which the
//! query service (§4.8) consumes — the ES sink has no query surface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::event::DecodedEvent;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Opens/creates whatever the sink needs (ES client, sled handle, ...).
    async fn initialize(&mut self) -> anyhow::Result<()>;

    /// Returns -1 if no prior offset exists (fresh start).
    async fn last_offset(&self) -> anyhow::Result<i64>;

    /// Atomically projects a non-empty batch of events and advances the
    /// stored offset to the batch's maximum offset. Implementations must
    /// not advance the offset unless every write in the batch is durable.
    async fn flush(&mut self, batch: &[DecodedEvent]) -> anyhow::Result<()>;

    /// Retention sweep (§4.7). A no-op for sinks without a bounded log
    /// (the ES sink relies on index lifecycle management out of band).
    async fn clear_log(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub database: String,
    pub table: String,
    pub begin_time: Option<String>,
    pub end_time: Option<String>,
    pub offset: usize,
    pub limit: usize,
    pub reverse: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    pub database: String,
    pub table: String,
    pub pk: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

/// `{"k": <key-as-string>, "v": <value-as-object>}` — kept as opaque
/// fragments so query responses never re-encode a row's numeric fields.
#[derive(Debug, Clone, Serialize)]
pub struct QueryEntry {
    pub k: String,
    pub v: BTreeMap<String, Box<RawValue>>,
}

#[async_trait]
pub trait QueryableSink: Sink {
    async fn query_log(&self, opt: &LogQuery) -> anyhow::Result<Vec<QueryEntry>>;
    async fn query_row(&self, opt: &RowQuery) -> anyhow::Result<Vec<QueryEntry>>;

    /// Rewrites (or clears, for `offset <= 0`) the stored offset. Used by
    /// operational tooling; not exercised by the normal flush path.
    async fn reset_offset(&mut self, offset: i64) -> anyhow::Result<()>;
}
