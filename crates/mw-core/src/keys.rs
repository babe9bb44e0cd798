//! Key coder (§4.2): deterministic primary-key fingerprints and the ordered
//! byte-key schema the LDB sink scans over.

use chrono::{TimeZone, Utc};

use crate::event::{unquote, DecodedKey};

pub const TIMESTAMP_FMT: &str = "%Y%m%d%H%M%S";
pub const TIMESTAMP_MIN: &str = "19700101000000";
pub const TIMESTAMP_MAX: &str = "20501231235959";

/// Formats a Unix-seconds timestamp as `TIMESTAMP_FMT`, in UTC. The
/// original formats via `time.Unix(ts, 0)`, which renders in the host's
/// local zone; pinning to UTC here keeps every derived key reproducible
/// independent of where the sink runs (the config record carries no
/// timezone field to do otherwise).
pub fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
        .format(TIMESTAMP_FMT)
        .to_string()
}

pub const ROW_PREFIX: &str = "row:";
pub const LOG_PREFIX: &str = "log:";
pub const KEY_PREFIX: &str = "key:";

/// `database#table#v1#v2#…` over the key's sorted non-database/table
/// fields. Stable for the lifetime of a row: the same (database, table,
/// pk values) always produce the same fingerprint.
pub fn fingerprint(key: &DecodedKey) -> String {
    let mut out = String::with_capacity(32);
    out.push_str(&key.database);
    out.push('#');
    out.push_str(&key.table);
    for (_, v) in &key.other_fields {
        out.push('#');
        out.push_str(unquote(v));
    }
    out
}

/// `<prefix>-<database>-<table>` — the ES row index name.
pub fn es_index_name(prefix: &str, database: &str, table: &str) -> String {
    format!("{prefix}-{database}-{table}")
}

/// `<prefix>_log` — the ES append-only log index name.
pub fn es_log_index_name(prefix: &str) -> String {
    format!("{prefix}_log")
}

/// `<database>#<table>#<YYYYMMDDhhmmss>#<offset>` — the ES log document id.
pub fn es_log_id(database: &str, table: &str, timestamp: &str, offset: i64) -> String {
    format!("{database}#{table}#{timestamp}#{offset}")
}

/// `row:<database>.<table>-<pk0pad>`, first pk value left-padded to 12
/// characters with spaces. This keeps lexicographic scan order aligned
/// with numeric order for ids up to 12 digits; ids longer than that degrade
/// silently, matching the source (§9 Open Question 1 — left unfixed).
pub fn ldb_row_key(database: &str, table: &str, pk: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(ROW_PREFIX.len() + database.len() + table.len() + 14);
    out.extend_from_slice(ROW_PREFIX.as_bytes());
    out.extend_from_slice(database.as_bytes());
    out.push(b'.');
    out.extend_from_slice(table.as_bytes());
    out.push(b'-');
    out.extend_from_slice(format!("{pk:>12}").as_bytes());
    out
}

/// Prefix-only row key for range scans: `row:<database>.<table>-`.
pub fn ldb_row_prefix(database: &str, table: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(ROW_PREFIX.len() + database.len() + table.len() + 2);
    out.extend_from_slice(ROW_PREFIX.as_bytes());
    out.extend_from_slice(database.as_bytes());
    out.push(b'.');
    out.extend_from_slice(table.as_bytes());
    out.push(b'-');
    out
}

/// `log:<database>.<table>-<YYYYMMDDhhmmss>-<offset0pad12>`.
pub fn ldb_log_key(database: &str, table: &str, timestamp: &str, offset: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(LOG_PREFIX.len() + database.len() + table.len() + 28);
    out.extend_from_slice(LOG_PREFIX.as_bytes());
    out.extend_from_slice(database.as_bytes());
    out.push(b'.');
    out.extend_from_slice(table.as_bytes());
    out.push(b'-');
    out.extend_from_slice(timestamp.as_bytes());
    out.push(b'-');
    out.extend_from_slice(format!("{offset:012}").as_bytes());
    out
}

/// `log:<database>.<table>-<YYYYMMDDhhmmss>`, with no offset suffix — an
/// exclusive range bound. Any well-formed log key at this timestamp sorts
/// strictly after this bound (it has a `-<offset>` suffix appended), so
/// using it as a half-open interval's upper edge keeps entries at exactly
/// `timestamp` while dropping everything strictly before it.
pub fn ldb_log_bound(database: &str, table: &str, timestamp: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(LOG_PREFIX.len() + database.len() + table.len() + 16);
    out.extend_from_slice(LOG_PREFIX.as_bytes());
    out.extend_from_slice(database.as_bytes());
    out.push(b'.');
    out.extend_from_slice(table.as_bytes());
    out.push(b'-');
    out.extend_from_slice(timestamp.as_bytes());
    out
}

/// `key:offset`.
pub fn offset_key() -> Vec<u8> {
    format!("{KEY_PREFIX}offset").into_bytes()
}

/// `key:logtables`.
pub fn logtables_key() -> Vec<u8> {
    format!("{KEY_PREFIX}logtables").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DecodedKey;

    #[test]
    fn fingerprint_sorts_by_field_name() {
        let key = DecodedKey::parse(br#"{"database":"db","table":"t","pk.a":3,"pk.b":"x"}"#).unwrap();
        assert_eq!(fingerprint(&key), "db#t#3#x");
    }

    #[test]
    fn fingerprint_single_pk() {
        let key = DecodedKey::parse(br#"{"database":"db","table":"t","pk.id":7}"#).unwrap();
        assert_eq!(fingerprint(&key), "db#t#7");
    }

    #[test]
    fn row_key_pads_to_twelve() {
        let key = ldb_row_key("db", "t", "7");
        let expected = format!("row:db.t-{:>12}", "7");
        assert_eq!(key, expected.into_bytes());
    }

    #[test]
    fn log_key_layout() {
        let k = ldb_log_key("db", "t", "20231114221320", 100);
        assert_eq!(k, b"log:db.t-20231114221320-000000000100".to_vec());
    }

    #[test]
    fn log_bound_sorts_before_any_offset_at_that_timestamp() {
        let bound = ldb_log_bound("db", "t", "20231114221320");
        let key = ldb_log_key("db", "t", "20231114221320", 0);
        assert!(bound < key);
    }
}
