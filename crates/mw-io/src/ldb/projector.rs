//! LDB projector (§4.4): builds the row/log writes for a batch. Pure with
//! respect to the store — the sink decides how to merge these into a sled
//! batch and how to track the set of tables with live log entries.

use std::collections::BTreeSet;

use mw_core::keys::{format_timestamp, ldb_log_key, ldb_row_key};
use mw_core::{Config, DecodedEvent};
use serde::Serialize;
use tracing::warn;

#[derive(Serialize)]
struct RowEnvelope<'a> {
    data: &'a serde_json::value::RawValue,
    meta: std::collections::BTreeMap<&'a str, &'a serde_json::value::RawValue>,
}

pub struct LdbPlan {
    pub row_puts: Vec<(Vec<u8>, Vec<u8>)>,
    pub row_deletes: Vec<Vec<u8>>,
    pub log_puts: Vec<(Vec<u8>, Vec<u8>)>,
    /// `(database, table)` pairs this batch wrote at least one log entry
    /// for — the sink folds these into the persisted `key:logtables` set.
    pub touched_tables: BTreeSet<(String, String)>,
}

pub fn plan_batch(events: &[DecodedEvent], config: &Config) -> LdbPlan {
    let mut plan = LdbPlan {
        row_puts: Vec::new(),
        row_deletes: Vec::new(),
        log_puts: Vec::new(),
        touched_tables: BTreeSet::new(),
    };

    for ev in events {
        plan_row(ev, config, &mut plan);
        plan_log(ev, config, &mut plan);
    }

    plan
}

fn plan_row(ev: &DecodedEvent, config: &Config, plan: &mut LdbPlan) {
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

    let Some(pk) = key.single_pk() else {
        warn!(database = %ev.database, table = %ev.table, offset = ev.offset, "multi-column or missing primary key, skipping row projection");
        return;
    };

    let row_key = ldb_row_key(&ev.database, &ev.table, pk);

    if ev.event_type == mw_core::EventType::Delete {
        plan.row_deletes.push(row_key);
        return;
    }

    let Some(data) = ev.data() else {
        warn!(database = %ev.database, table = %ev.table, offset = ev.offset, "row-mutating event has no data field");
        return;
    };

    let value = if config.max_well.without_meta {
        data.get().as_bytes().to_vec()
    } else {
        let meta = ev.meta_without_data();
        serde_json::to_vec(&RowEnvelope { data, meta }).expect("RawValue serialization never fails")
    };

    plan.row_puts.push((row_key, value));
}

fn plan_log(ev: &DecodedEvent, config: &Config, plan: &mut LdbPlan) {
    let db_table = format!("{}.{}", ev.database, ev.table);
    if config.table_config(&db_table).disable_row {
        return;
    }

    let ts = format_timestamp(ev.ts);
    let log_key = ldb_log_key(&ev.database, &ev.table, &ts, ev.offset);
    plan.log_puts.push((log_key, ev.raw_value.clone()));
    plan.touched_tables
        .insert((ev.database.clone(), ev.table.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_core::config::{DbConfig, MaxwellConfig, MiscConfig, TableConfig};
    use std::collections::HashMap;

    fn test_config(without_meta: bool) -> Config {
        Config {
            max_well: MaxwellConfig {
                cache_size: 10,
                without_meta,
                kafka_version: "2.3.0".into(),
                brokers: vec!["localhost:9092".into()],
                topic: "t".into(),
                prefix: "maxwell".into(),
                dir: "/tmp".into(),
            },
            misc: MiscConfig::default(),
            db_configs: HashMap::from([("@default".into(), DbConfig::default())]),
            table_configs: HashMap::from([("@default".into(), TableConfig::default())]),
        }
    }

    #[test]
    fn insert_writes_row_and_log() {
        let config = test_config(true);
        let key = br#"{"database":"db","table":"t","pk.id":7}"#;
        let value = br#"{"database":"db","table":"t","type":"insert","ts":1700000000,"data":{"id":7}}"#;
        let ev = mw_core::decode(key, value, 100).unwrap();

        let plan = plan_batch(&[ev], &config);
        assert_eq!(plan.row_puts.len(), 1);
        assert_eq!(plan.row_puts[0].1, br#"{"id":7}"#);
        assert_eq!(plan.log_puts.len(), 1);
        assert!(plan.touched_tables.contains(&("db".to_string(), "t".to_string())));
    }

    #[test]
    fn multi_pk_skips_row_but_not_log() {
        let config = test_config(true);
        let key = br#"{"database":"db","table":"t","pk.a":1,"pk.b":2}"#;
        let value = br#"{"database":"db","table":"t","type":"insert","ts":1700000000,"data":{"a":1,"b":2}}"#;
        let ev = mw_core::decode(key, value, 100).unwrap();

        let plan = plan_batch(&[ev], &config);
        assert!(plan.row_puts.is_empty());
        assert_eq!(plan.log_puts.len(), 1);
    }

    #[test]
    fn delete_emits_row_delete() {
        let config = test_config(true);
        let key = br#"{"database":"db","table":"t","pk.id":7}"#;
        let value = br#"{"database":"db","table":"t","type":"delete","ts":1700000000,"data":{"id":7}}"#;
        let ev = mw_core::decode(key, value, 100).unwrap();

        let plan = plan_batch(&[ev], &config);
        assert_eq!(plan.row_deletes.len(), 1);
        assert!(plan.row_puts.is_empty());
    }

    #[test]
    fn disabled_database_skips_row_but_not_log() {
        let mut config = test_config(true);
        config
            .db_configs
            .insert("db".into(), DbConfig { disable: true });
        let key = br#"{"database":"db","table":"t","pk.id":7}"#;
        let value = br#"{"database":"db","table":"t","type":"insert","ts":1700000000,"data":{"id":7}}"#;
        let ev = mw_core::decode(key, value, 100).unwrap();

        let plan = plan_batch(&[ev], &config);
        assert!(plan.row_puts.is_empty());
        assert_eq!(plan.log_puts.len(), 1);
    }

    #[test]
    fn with_meta_wraps_envelope() {
        let config = test_config(false);
        let key = br#"{"database":"db","table":"t","pk.id":7}"#;
        let value = br#"{"database":"db","table":"t","type":"insert","ts":1700000000,"xid":9,"data":{"id":7}}"#;
        let ev = mw_core::decode(key, value, 100).unwrap();

        let plan = plan_batch(&[ev], &config);
        let parsed: serde_json::Value = serde_json::from_slice(&plan.row_puts[0].1).unwrap();
        assert_eq!(parsed["data"]["id"], 7);
        assert_eq!(parsed["meta"]["xid"], 9);
    }
}
