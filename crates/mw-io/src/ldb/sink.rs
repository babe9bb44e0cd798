//! LDB sink (§4.4, §4.6, §4.7, §4.8): an embedded, ordered KV store backed
//! by `sled`, playing the role the original's custom LevelDB wrapper does.
//! One `sled::Db` handle is shared read/write by the flush path and
//! read-only by the query service and retention sweeper (§5) — sled
//! serialises its own writes, so no external lock is needed.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use mw_core::keys::{
    format_timestamp, ldb_log_bound, ldb_row_key, ldb_row_prefix, logtables_key, offset_key,
    TIMESTAMP_MAX, TIMESTAMP_MIN,
};
use mw_core::{Config, DecodedEvent, LogQuery, QueryEntry, QueryableSink, RowQuery, Sink};
use sled::{Batch, Db};
use tracing::{info, warn};

use super::projector::plan_batch;

pub struct LdbSink {
    db: Db,
    config: Config,
}

impl LdbSink {
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let db = sled::open(&config.max_well.dir)?;
        Ok(LdbSink { db, config })
    }

    /// A second handle over the same underlying store (`sled::Db` is an
    /// `Arc` wrapper internally), for the query service to read from
    /// concurrently with the flush path.
    pub fn share(&self, config: Config) -> Self {
        LdbSink {
            db: self.db.clone(),
            config,
        }
    }

    fn logtables(&self) -> anyhow::Result<BTreeSet<(String, String)>> {
        match self.db.get(logtables_key())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(BTreeSet::new()),
        }
    }
}

#[async_trait]
impl Sink for LdbSink {
    async fn initialize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn last_offset(&self) -> anyhow::Result<i64> {
        match self.db.get(offset_key())? {
            Some(bytes) if bytes.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(i64::from_be_bytes(buf))
            }
            _ => Ok(-1),
        }
    }

    /// Builds one `sled::Batch` covering row writes, log writes, the
    /// (possibly updated) table set, and the offset — applied atomically,
    /// then fsynced, so data and offset advance together or not at all.
    async fn flush(&mut self, batch_events: &[DecodedEvent]) -> anyhow::Result<()> {
        if batch_events.is_empty() {
            return Ok(());
        }

        let plan = plan_batch(batch_events, &self.config);
        let mut batch = Batch::default();

        for (key, value) in &plan.row_puts {
            batch.insert(key.as_slice(), value.as_slice());
        }
        for key in &plan.row_deletes {
            batch.remove(key.as_slice());
        }
        for (key, value) in &plan.log_puts {
            batch.insert(key.as_slice(), value.as_slice());
        }

        if !plan.touched_tables.is_empty() {
            let mut tables = self.logtables()?;
            let before = tables.len();
            tables.extend(plan.touched_tables.iter().cloned());
            if tables.len() != before {
                batch.insert(logtables_key(), serde_json::to_vec(&tables)?);
            }
        }

        let last_offset = batch_events.last().map(|e| e.offset).unwrap_or(-1);
        batch.insert(offset_key(), last_offset.to_be_bytes().to_vec());

        self.db.apply_batch(batch)?;
        self.db.flush_async().await?;
        info!(count = batch_events.len(), offset = last_offset, "save");
        Ok(())
    }

    /// Retention sweep (§4.7). Retention of zero yields `cutoff == now`, so
    /// every log entry up to the current time is deleted (§9 Open Question
    /// 2) — there is no "keep forever" special case.
    async fn clear_log(&mut self) -> anyhow::Result<()> {
        let tables = self.logtables()?;
        if tables.is_empty() {
            return Ok(());
        }

        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
        let mut surviving = BTreeSet::new();

        for (database, table) in &tables {
            let retention = self
                .config
                .table_config(&format!("{database}.{table}"))
                .retention;

            let cutoff_ts = now - retention.as_secs() as i64;
            let cutoff = format_timestamp(cutoff_ts.max(0));
            let lower = ldb_log_bound(database, table, TIMESTAMP_MIN);
            let upper = ldb_log_bound(database, table, &cutoff);

            let mut batch = Batch::default();
            let mut doomed = 0usize;
            for kv in self.db.range(lower..upper) {
                let (key, _) = kv?;
                batch.remove(key);
                doomed += 1;
            }

            if doomed > 0 {
                self.db.apply_batch(batch)?;
                self.db.flush_async().await?;
                info!(%database, %table, doomed, "retention sweep");
            }

            let still_has_logs = {
                let prefix = ldb_log_bound(database, table, TIMESTAMP_MIN);
                let upper_all = ldb_log_bound(database, table, TIMESTAMP_MAX);
                self.db.range(prefix..upper_all).next().is_some()
            };
            if still_has_logs {
                surviving.insert((database.clone(), table.clone()));
            }
        }

        if surviving != tables {
            self.db
                .insert(logtables_key(), serde_json::to_vec(&surviving)?)?;
            self.db.flush_async().await?;
        }

        Ok(())
    }
}

#[async_trait]
impl QueryableSink for LdbSink {
    async fn query_log(&self, opt: &LogQuery) -> anyhow::Result<Vec<QueryEntry>> {
        let begin = opt.begin_time.clone().unwrap_or_else(|| TIMESTAMP_MIN.to_string());
        let end = opt.end_time.clone().unwrap_or_else(|| TIMESTAMP_MAX.to_string());
        let lower = ldb_log_bound(&opt.database, &opt.table, &begin);
        let upper = ldb_log_bound(&opt.database, &opt.table, &end);
        let limit = if opt.limit == 0 { 100 } else { opt.limit };

        let entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .db
            .range(lower..upper)
            .filter_map(|r| r.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();

        let ordered: Vec<_> = if opt.reverse {
            entries.into_iter().rev().collect()
        } else {
            entries
        };

        Ok(ordered
            .into_iter()
            .skip(opt.offset)
            .take(limit)
            .map(|(k, v)| to_query_entry(&k, &v))
            .collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn query_row(&self, opt: &RowQuery) -> anyhow::Result<Vec<QueryEntry>> {
        let limit = if opt.limit == 0 { 1 } else { opt.limit };

        if let (Some(pk), 1) = (&opt.pk, limit) {
            let key = ldb_row_key(&opt.database, &opt.table, pk);
            return match self.db.get(&key)? {
                Some(v) => Ok(vec![to_query_entry(&key, &v)?]),
                None => Ok(vec![]),
            };
        }

        let prefix = ldb_row_prefix(&opt.database, &opt.table);
        let start = match &opt.pk {
            Some(pk) => ldb_row_key(&opt.database, &opt.table, pk),
            None => prefix.clone(),
        };

        let mut out = Vec::new();
        for kv in self.db.scan_prefix(&prefix) {
            let (k, v) = kv?;
            if k.as_ref() < start.as_slice() {
                continue;
            }
            out.push((k.to_vec(), v.to_vec()));
        }

        out.into_iter()
            .skip(opt.offset)
            .take(limit)
            .map(|(k, v)| to_query_entry(&k, &v))
            .collect()
    }

    async fn reset_offset(&mut self, offset: i64) -> anyhow::Result<()> {
        if offset <= 0 {
            self.db.remove(offset_key())?;
        } else {
            self.db.insert(offset_key(), offset.to_be_bytes().to_vec())?;
        }
        self.db.flush_async().await?;
        Ok(())
    }
}

fn to_query_entry(key: &[u8], value: &[u8]) -> anyhow::Result<QueryEntry> {
    let k = String::from_utf8_lossy(key).to_string();
    let v = match serde_json::from_slice(value) {
        Ok(v) => v,
        Err(_) => {
            warn!(%k, "query result value is not a JSON object, returning empty body");
            Default::default()
        }
    };
    Ok(QueryEntry { k, v })
}
