use std::collections::BTreeMap;

use serde_json::value::RawValue;

use crate::error::DecodeError;

/// The Maxwell event discriminant (§3 of the design).
///
/// `BootstrapStart`/`BootstrapComplete`/`TableCreate` are no-op for
/// projection: they consume a Kafka offset but produce no sink write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Insert,
    Update,
    BootstrapInsert,
    Delete,
    BootstrapStart,
    BootstrapComplete,
    TableCreate,
}

impl EventType {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "insert" => EventType::Insert,
            "update" => EventType::Update,
            "bootstrap-insert" => EventType::BootstrapInsert,
            "delete" => EventType::Delete,
            "bootstrap-start" => EventType::BootstrapStart,
            "bootstrap-complete" => EventType::BootstrapComplete,
            "table-create" => EventType::TableCreate,
            _ => return None,
        })
    }

    /// True for types that consume an offset but never reach a projector.
    pub fn is_noop(self) -> bool {
        matches!(
            self,
            EventType::BootstrapStart | EventType::BootstrapComplete | EventType::TableCreate
        )
    }

    /// True for types that carry a well-formed primary key and should be
    /// considered for row projection.
    pub fn is_row_mutating(self) -> bool {
        matches!(
            self,
            EventType::Insert | EventType::Update | EventType::BootstrapInsert | EventType::Delete
        )
    }

    pub fn is_delete(self) -> bool {
        matches!(self, EventType::Delete)
    }
}

/// The decoded key payload: `{"database": ..., "table": ..., "pk.<name>": ...}`.
///
/// `other_fields` holds every field besides `database`/`table`, sorted
/// ascending by field name — this is exactly the ordering the fingerprint
/// (§4.2) is built over.
#[derive(Debug, Clone)]
pub struct DecodedKey {
    pub database: String,
    pub table: String,
    pub other_fields: Vec<(String, Box<RawValue>)>,
    /// Total number of top-level fields in the key object, including
    /// `database`/`table`. The LDB row projector requires this to be
    /// exactly 3 (database, table, one `pk.*`) before it will write a row.
    pub total_fields: usize,
}

impl DecodedKey {
    /// Parses a Maxwell key payload. Returns `None` if `raw` does not begin
    /// with `{` (the only malformation the original tolerates outside of a
    /// hard decode error) — per §4.1, such keys are skipped for log
    /// projection rather than treated as fatal.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.first() != Some(&b'{') {
            return None;
        }

        let m: BTreeMap<String, Box<RawValue>> = serde_json::from_slice(raw).ok()?;
        let mut database = String::new();
        let mut table = String::new();
        let mut other_fields = Vec::with_capacity(m.len().saturating_sub(2));

        for (k, v) in m.iter() {
            match k.as_str() {
                "database" => database = unquote(v).to_lowercase(),
                "table" => table = unquote(v).to_lowercase(),
                _ => other_fields.push((k.clone(), v.clone())),
            }
        }
        other_fields.sort_by(|a, b| a.0.cmp(&b.0));

        Some(DecodedKey {
            database,
            table,
            total_fields: m.len(),
            other_fields,
        })
    }

    /// The single `pk.*` value, if this key carries exactly one primary-key
    /// field (the shape the LDB row store supports — §4.4, §9 Open
    /// Question 3).
    pub fn single_pk(&self) -> Option<&str> {
        if self.total_fields != 3 {
            return None;
        }
        self.other_fields
            .iter()
            .find(|(k, _)| k.starts_with("pk."))
            .map(|(_, v)| unquote(v))
    }
}

/// Strips a leading/trailing `"` from a raw JSON fragment without
/// re-parsing it — mirrors the original's naive byte-slice unquoting
/// (`v[1:len(v)-1]`), including its disregard for escape sequences.
pub fn unquote(raw: &RawValue) -> &str {
    let s = raw.get();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// A decoded Maxwell envelope plus the untouched original value bytes
/// (preserved so log writes never re-serialize a re-parsed structure).
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    pub database: String,
    pub table: String,
    pub event_type: EventType,
    pub ts: i64,
    pub offset: i64,
    pub key: Option<DecodedKey>,
    /// Every top-level field of the value object (`data`, `old`, `xid`,
    /// `commit`, `position`, ...), kept as opaque JSON fragments.
    pub fields: BTreeMap<String, Box<RawValue>>,
    pub raw_value: Vec<u8>,
}

impl DecodedEvent {
    pub fn data(&self) -> Option<&RawValue> {
        self.fields.get("data").map(|b| b.as_ref())
    }

    pub fn old(&self) -> Option<&RawValue> {
        self.fields.get("old").map(|b| b.as_ref())
    }

    /// All fields except `data`/`old` — the `meta` envelope used by the ES
    /// row document (§3).
    pub fn meta_without_old(&self) -> BTreeMap<&str, &RawValue> {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != "data" && k.as_str() != "old")
            .map(|(k, v)| (k.as_str(), v.as_ref()))
            .collect()
    }

    /// All fields except `data` — the `meta` envelope used by the LDB row
    /// store, which (per the original's more aggressive split) folds `old`
    /// into meta rather than carrying it alongside `data`.
    pub fn meta_without_data(&self) -> BTreeMap<&str, &RawValue> {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != "data")
            .map(|(k, v)| (k.as_str(), v.as_ref()))
            .collect()
    }
}

/// Decodes a raw Kafka `(key, value)` pair into a [`DecodedEvent`].
///
/// The value must parse as a JSON object carrying a recognized `type`;
/// either failure is fatal per §4.1/§7 — the caller should abort the
/// pipeline rather than skip, since both indicate a producer/version
/// mismatch that would otherwise desync the sink forever.
pub fn decode(key: &[u8], value: &[u8], offset: i64) -> Result<DecodedEvent, DecodeError> {
    let fields: BTreeMap<String, Box<RawValue>> =
        serde_json::from_slice(value).map_err(DecodeError::ValueNotObject)?;

    let type_raw = fields
        .get("type")
        .ok_or(DecodeError::MissingField("type"))?;
    let type_str = unquote(type_raw);
    let event_type =
        EventType::parse(type_str).ok_or_else(|| DecodeError::UnknownEventType(type_str.to_string()))?;

    let database = fields
        .get("database")
        .map(|v| unquote(v).to_lowercase())
        .unwrap_or_default();
    let table = fields
        .get("table")
        .map(|v| unquote(v).to_lowercase())
        .unwrap_or_default();
    let ts = fields
        .get("ts")
        .and_then(|v| v.get().parse::<i64>().ok())
        .unwrap_or(0);

    Ok(DecodedEvent {
        database,
        table,
        event_type,
        ts,
        offset,
        key: DecodedKey::parse(key),
        fields,
        raw_value: value.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_with_single_pk() {
        let key = br#"{"database":"db","table":"t","pk.id":7}"#;
        let value = br#"{"database":"db","table":"t","type":"insert","ts":1700000000,"data":{"id":7,"n":"a"}}"#;
        let ev = decode(key, value, 100).unwrap();
        assert_eq!(ev.database, "db");
        assert_eq!(ev.table, "t");
        assert!(ev.event_type.is_row_mutating());
        assert_eq!(ev.ts, 1700000000);
        let k = ev.key.unwrap();
        assert_eq!(k.single_pk(), Some("7"));
    }

    #[test]
    fn noop_types_skip_projection() {
        let value = br#"{"database":"db","table":"t","type":"bootstrap-start","ts":1}"#;
        let ev = decode(b"{}", value, 1).unwrap();
        assert!(ev.event_type.is_noop());
        assert!(!ev.event_type.is_row_mutating());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let value = br#"{"database":"db","table":"t","type":"weird","ts":1}"#;
        let err = decode(b"{}", value, 1).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventType(_)));
    }

    #[test]
    fn malformed_key_is_tolerated() {
        let value = br#"{"database":"db","table":"t","type":"bootstrap-start","ts":1}"#;
        let ev = decode(b"not-json", value, 1).unwrap();
        assert!(ev.key.is_none());
    }

    #[test]
    fn multi_column_key_has_no_single_pk() {
        let key = br#"{"database":"db","table":"t","pk.a":3,"pk.b":"x"}"#;
        let k = DecodedKey::parse(key).unwrap();
        assert_eq!(k.total_fields, 4);
        assert_eq!(k.single_pk(), None);
    }
}
