//! Entity Record and Parameter List types shared across the dispatch core.

use serde_json::{Map, Value};

/// Field-name → value mapping for one entity row. Keeps insertion order so
/// replies echo fields in the order the caller (or the driver) produced them.
pub type Record = Map<String, Value>;

/// Ordered values bound positionally to a SQL template's `?` placeholders.
pub type Params = Vec<Value>;

/// Interpret a bus payload as an Entity Record; `None` for any non-object shape.
pub fn into_record(body: Value) -> Option<Record> {
    match body {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Numeric `recid` of a persisted record. Absent or non-integer both count as
/// missing, which the update/delete protocol rejects before touching the pool.
pub fn recid(record: &Record) -> Option<i64> {
    record.get("recid").and_then(Value::as_i64)
}

/// Compact JSON rendering used when a record is quoted inside a failure reply.
pub fn compact(record: &Record) -> String {
    serde_json::to_string(record).unwrap_or_default()
}
