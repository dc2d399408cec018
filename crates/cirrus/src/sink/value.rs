//! Coercion of JSON row values into column storage types.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::convert::ValueConverter;
use crate::descriptor::{ColumnSpec, StorageType};

/// A row value ready to be bound to its column.
///
/// Every variant is nullable; JSON null becomes SQL `NULL`, never the
/// string `"null"`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
    Boolean(Option<bool>),
    Integer(Option<i32>),
    BigInt(Option<i64>),
    Float(Option<f64>),
    TextArray(Option<Vec<String>>),
    Json(Option<Value>),
    /// Text the database casts itself (`inet`, enumerations).
    Cast(Option<String>),
}

impl SqlValue {
    /// Coerce `value` into the column's storage type.
    ///
    /// Strings holding a number or boolean are accepted for those types.
    /// Returns a description of the mismatch when the value does not fit.
    pub fn coerce(column: &ColumnSpec, value: &Value) -> Result<Self, String> {
        let mismatch = || format!("column '{}' cannot store {value}", column.name);

        Ok(match &column.storage_type {
            StorageType::Text => Self::Text(non_null(value).map(text)),
            StorageType::Timestamp => Self::Timestamp(
                non_null(value)
                    .map(|value| timestamp(value).ok_or_else(mismatch))
                    .transpose()?,
            ),
            StorageType::Boolean => Self::Boolean(
                non_null(value)
                    .map(|value| boolean(value).ok_or_else(mismatch))
                    .transpose()?,
            ),
            StorageType::Integer => Self::Integer(
                non_null(value)
                    .map(|value| {
                        integer(value)
                            .and_then(|n| i32::try_from(n).ok())
                            .ok_or_else(mismatch)
                    })
                    .transpose()?,
            ),
            StorageType::BigInt => Self::BigInt(
                non_null(value)
                    .map(|value| integer(value).ok_or_else(mismatch))
                    .transpose()?,
            ),
            StorageType::Float => Self::Float(
                non_null(value)
                    .map(|value| float(value).ok_or_else(mismatch))
                    .transpose()?,
            ),
            StorageType::TextArray => Self::TextArray(
                non_null(value)
                    .map(|value| match value {
                        Value::Array(items) => Ok(items.iter().map(text).collect()),
                        _ => Err(mismatch()),
                    })
                    .transpose()?,
            ),
            StorageType::Json => Self::Json(non_null(value).cloned()),
            StorageType::Inet => Self::Cast(non_null(value).map(text)),
            StorageType::Enum(variants) => Self::Cast(
                non_null(value)
                    .map(|value| {
                        let value = text(value);
                        if variants.contains(&value) {
                            Ok(value)
                        } else {
                            Err(mismatch())
                        }
                    })
                    .transpose()?,
            ),
        })
    }

    /// The stored value as JSON, the way it would be read back.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(v) | Self::Cast(v) => v.clone().map_or(Value::Null, Value::String),
            Self::Timestamp(v) => v.map_or(Value::Null, |ts| {
                Value::String(ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
            }),
            Self::Boolean(v) => v.map_or(Value::Null, Value::Bool),
            Self::Integer(v) => v.map_or(Value::Null, Value::from),
            Self::BigInt(v) => v.map_or(Value::Null, Value::from),
            Self::Float(v) => v.map_or(Value::Null, Value::from),
            Self::TextArray(v) => v
                .as_ref()
                .map_or(Value::Null, |items| items.iter().cloned().collect()),
            Self::Json(v) => v.clone().unwrap_or(Value::Null),
        }
    }
}

fn non_null(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

/// Strings are stored as-is; anything else as its JSON text.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    // The timestamp converter normalizes every format it understands.
    let normalized = ValueConverter::Timestamp.convert(value.clone());
    let text = normalized.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Whole numbers only. Anything outside the `i64` range is a mismatch.
fn integer(value: &Value) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    let in_range = |f: &f64| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64;
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(in_range).map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
