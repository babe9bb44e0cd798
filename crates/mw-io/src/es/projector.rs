//! ES projector (§4.3): turns a batch of decoded events into the bulk
//! index/delete operations the flush path issues in one request.

use std::collections::BTreeMap;

use mw_core::keys::{es_index_name, es_log_id, es_log_index_name, fingerprint, format_timestamp};
use mw_core::{Config, DecodedEvent, EventType};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// `{data, old?, meta?}` — the ES row document body.
#[derive(Debug, Clone, Serialize)]
pub struct RowDoc {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, Value>>,
}

pub enum RowOp {
    Index {
        index: String,
        id: String,
        doc: RowDoc,
    },
    Delete {
        index: String,
        id: String,
    },
}

pub struct LogOp {
    pub index: String,
    pub id: String,
    pub doc: BTreeMap<String, Value>,
}

#[derive(Default)]
pub struct BulkPlan {
    pub row_ops: Vec<RowOp>,
    pub log_ops: Vec<LogOp>,
}

fn raw_to_value(raw: &serde_json::value::RawValue) -> Value {
    serde_json::from_str(raw.get()).unwrap_or(Value::Null)
}

pub fn plan_bulk(events: &[DecodedEvent], config: &Config) -> BulkPlan {
    let mut plan = BulkPlan::default();

    for ev in events {
        plan_row(ev, config, &mut plan);
        plan_log(ev, config, &mut plan);
    }

    plan
}

fn plan_row(ev: &DecodedEvent, config: &Config, plan: &mut BulkPlan) {
    if !ev.event_type.is_row_mutating() {
        return;
    }

    let Some(key) = &ev.key else {
        warn!(database = %ev.database, table = %ev.table, offset = ev.offset, "row-mutating event with malformed key");
        return;
    };

    if config.db_config(&ev.database).disable {
        return;
    }

    let index = es_index_name(&config.max_well.prefix, &ev.database, &ev.table);
    let id = fingerprint(key);

    if ev.event_type == EventType::Delete {
        plan.row_ops.push(RowOp::Delete { index, id });
        return;
    }

    let data = ev.data().map(raw_to_value).unwrap_or(Value::Null);
    let old = ev.old().map(raw_to_value);
    let meta = if config.max_well.without_meta {
        None
    } else {
        Some(
            ev.meta_without_old()
                .into_iter()
                .map(|(k, v)| (k.to_string(), raw_to_value(v)))
                .collect(),
        )
    };

    plan.row_ops.push(RowOp::Index {
        index,
        id,
        doc: RowDoc { data, old, meta },
    });
}

fn plan_log(ev: &DecodedEvent, config: &Config, plan: &mut BulkPlan) {
    // Log emission runs for every event type (including no-ops) — it is
    // gated only by key well-formedness and `TableConfigs.DisableRow`,
    // exactly mirroring `dump.es.go`'s `appendLog`, which has no type
    // switch at all.
    let Some(key) = &ev.key else {
        return;
    };

    let db_table = format!("{}.{}", ev.database, ev.table);
    if config.table_config(&db_table).disable_row {
        return;
    }

    let ts = format_timestamp(ev.ts);
    let id = es_log_id(&ev.database, &ev.table, &ts, ev.offset);

    let mut doc: BTreeMap<String, Value> = ev
        .fields
        .iter()
        .map(|(k, v)| {
            let value = match k.as_str() {
                // Re-serialized to strings: the log index stores `data`
                // and `old` as opaque escaped JSON text rather than nested
                // objects, matching the original's explicit re-marshal.
                "data" | "old" => Value::String(v.get().to_string()),
                _ => raw_to_value(v),
            };
            (k.clone(), value)
        })
        .collect();
    doc.insert("key".to_string(), Value::String(fingerprint(key)));

    plan.log_ops.push(LogOp {
        index: es_log_index_name(&config.max_well.prefix),
        id,
        doc,
    });
}
