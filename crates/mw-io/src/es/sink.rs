//! ES sink (§4.3, §4.6): projects a batch through one `_bulk` request, then
//! writes the offset document only once every item in the bulk acked.

use async_trait::async_trait;
use elasticsearch::{BulkOperation, BulkParts, Elasticsearch, GetParts, IndexParts};
use mw_core::{Config, DecodedEvent, Sink};
use serde_json::{json, Value};
use tracing::error;

use super::client::build_client;
use super::projector::{plan_bulk, RowOp};

/// The offset document lives at `<prefix>/_doc/offset`, a single row
/// outside any table's own index, mirroring the original's dedicated
/// "offset" document convention.
fn offset_index(prefix: &str) -> String {
    prefix.to_string()
}

pub struct EsSink {
    client: Elasticsearch,
    config: Config,
}

impl EsSink {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(EsSink {
            client: build_client()?,
            config,
        })
    }
}

#[async_trait]
impl Sink for EsSink {
    async fn initialize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn last_offset(&self) -> anyhow::Result<i64> {
        let prefix = &self.config.max_well.prefix;
        let resp = self
            .client
            .get(GetParts::IndexId(&offset_index(prefix), "offset"))
            .send()
            .await?;

        if resp.status_code().as_u16() == 404 {
            return Ok(-1);
        }

        let body: Value = resp.error_for_status_code()?.json().await?;
        let data = body
            .get("_source")
            .and_then(|s| s.get("data"))
            .and_then(Value::as_str)
            .unwrap_or("-1");
        Ok(data.parse().unwrap_or(-1))
    }

    /// Builds the bulk body, sends it, and aborts (without touching the
    /// offset document) if any item failed — an all-or-nothing flush per
    /// batch (§4.6).
    async fn flush(&mut self, batch: &[DecodedEvent]) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let plan = plan_bulk(batch, &self.config);
        let mut ops: Vec<BulkOperation<Value>> = Vec::with_capacity(plan.row_ops.len() + plan.log_ops.len());

        for op in plan.row_ops {
            match op {
                RowOp::Index { index, id, doc } => {
                    ops.push(BulkOperation::index(json!(doc)).index(&index).id(&id).into());
                }
                RowOp::Delete { index, id } => {
                    ops.push(BulkOperation::delete(&id).index(&index).into());
                }
            }
        }
        for op in plan.log_ops {
            ops.push(
                BulkOperation::index(json!(op.doc))
                    .index(&op.index)
                    .id(&op.id)
                    .into(),
            );
        }

        if !ops.is_empty() {
            let resp = self
                .client
                .bulk(BulkParts::None)
                .body(ops)
                .send()
                .await?
                .error_for_status_code()?;

            let body: Value = resp.json().await?;
            if body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
                error!(?body, "bulk request reported item-level failures");
                anyhow::bail!("bulk flush had item-level failures, offset not advanced");
            }
        }

        let last_offset = batch.last().map(|e| e.offset).unwrap_or(-1);
        let prefix = self.config.max_well.prefix.clone();
        self.client
            .index(IndexParts::IndexId(&offset_index(&prefix), "offset"))
            .body(json!({ "data": last_offset.to_string() }))
            .send()
            .await?
            .error_for_status_code()?;

        Ok(())
    }

    /// ES relies on index lifecycle policies set up out of band; the sink
    /// itself never sweeps.
    async fn clear_log(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
