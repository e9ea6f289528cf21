pub mod activity;
pub mod user;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Opaque, caller-supplied JSON object (`user_info`, log `details`).
pub type Blob = serde_json::Map<String, Value>;

/// Upper bound on the serialized size of a caller-supplied blob.
pub const MAX_BLOB_BYTES: usize = 16 * 1024;

/// Turns a `json!({...})` literal into a [`Blob`]. Non-object values yield an empty map.
pub fn blob(value: Value) -> Blob {
    match value {
        Value::Object(map) => map,
        _ => Blob::new(),
    }
}

/// Accepts an object, `null`, or a JSON-encoded object string.
///
/// Rows written by older clients store `user_info` / `details` as text.
pub(crate) fn deserialize_blob<'de, D>(deserializer: D) -> Result<Blob, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(Blob::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Ok(Blob::new()),
        },
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // `timestamp without time zone` columns come back without an offset
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

pub(crate) fn deserialize_opt_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
    }
}
