//! Value converters applied to projected column values.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Transformation applied to a non-null column value before loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueConverter {
    /// `[{Key, Value}, ...]` into `{key: value}`.
    Tags,
    /// Any supported date representation into an RFC 3339 UTC string.
    Timestamp,
}

impl ValueConverter {
    pub fn convert(&self, value: Value) -> Value {
        match self {
            Self::Tags => beautify_tags(value),
            Self::Timestamp => normalize_timestamp(value),
        }
    }
}

/// Turn a tag list into a map. Some APIs spell the fields in lower case.
///
/// An empty list becomes null. Values that are not a tag list pass through.
fn beautify_tags(value: Value) -> Value {
    let Value::Array(tags) = value else {
        return value;
    };
    let Some(first) = tags.first() else {
        return Value::Null;
    };

    let (key_name, value_name) = if first.get("key").is_some() {
        ("key", "value")
    } else {
        ("Key", "Value")
    };

    let mut map = Map::with_capacity(tags.len());
    for tag in &tags {
        let Some(key) = tag.get(key_name).and_then(Value::as_str) else {
            continue;
        };
        let value = tag.get(value_name).cloned().unwrap_or(Value::Null);
        map.insert(key.to_string(), value);
    }
    Value::Object(map)
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn normalize_timestamp(value: Value) -> Value {
    let parsed = match &value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                let secs = n.as_f64()?;
                DateTime::from_timestamp_millis((secs * 1000.0) as i64)
            }),
        _ => None,
    };

    match parsed {
        Some(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        None => value,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    // Lambda reports offsets without a colon, e.g. 2023-01-01T00:00:00.000+0000
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}
