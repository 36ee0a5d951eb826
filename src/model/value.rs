//! Simple attribute values and their canonical wire encodings.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{ScimError, ScimResult};
use crate::schema::descriptor::DataType;

/// A single non-complex SCIM value.
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    DateTime(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl SimpleValue {
    pub fn data_type(&self) -> DataType {
        match self {
            SimpleValue::String(_) => DataType::String,
            SimpleValue::Boolean(_) => DataType::Boolean,
            SimpleValue::Integer(_) => DataType::Integer,
            SimpleValue::DateTime(_) => DataType::DateTime,
            SimpleValue::Binary(_) => DataType::Binary,
        }
    }

    /// Canonical string form used on the wire for every non-binary type;
    /// binary values encode as base64.
    pub fn as_wire_string(&self) -> String {
        match self {
            SimpleValue::String(s) => s.clone(),
            SimpleValue::Boolean(b) => b.to_string(),
            SimpleValue::Integer(i) => i.to_string(),
            SimpleValue::DateTime(dt) => format_datetime(*dt),
            SimpleValue::Binary(bytes) => BASE64.encode(bytes),
        }
    }

    /// Parse a wire string according to the target data type.
    pub fn parse(data_type: DataType, raw: &str) -> ScimResult<SimpleValue> {
        match data_type {
            DataType::String => Ok(SimpleValue::String(raw.to_string())),
            DataType::Boolean => match raw.to_lowercase().as_str() {
                "true" => Ok(SimpleValue::Boolean(true)),
                "false" => Ok(SimpleValue::Boolean(false)),
                _ => Err(ScimError::InvalidAttributeValue(format!(
                    "'{}' is not a boolean",
                    raw
                ))),
            },
            DataType::Integer => raw.trim().parse::<i64>().map(SimpleValue::Integer).map_err(
                |_| ScimError::InvalidAttributeValue(format!("'{}' is not an integer", raw)),
            ),
            DataType::DateTime => parse_datetime(raw).map(SimpleValue::DateTime),
            DataType::Binary => BASE64.decode(raw.trim()).map(SimpleValue::Binary).map_err(
                |_| ScimError::InvalidAttributeValue(format!("'{}' is not valid base64", raw)),
            ),
            DataType::Complex => Err(ScimError::InvalidAttributeValue(
                "Complex attributes have no simple value".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SimpleValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SimpleValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SimpleValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            SimpleValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2011-05-13T04:42:34.000Z`.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts ISO-8601 with optional sub-second precision and any offset;
/// the result is normalized to UTC.
pub fn parse_datetime(raw: &str) -> ScimResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ScimError::InvalidAttributeValue(format!("'{}' is not an ISO-8601 timestamp", raw))
        })
}
