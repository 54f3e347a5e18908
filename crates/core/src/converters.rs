//! String value deserializers.
//!
//! Query string and form values arrive as plain strings. Deserializers turn
//! them into typed JSON values; they are tried in a fixed order and the
//! first one that accepts the input wins. Unrecognized input stays a string.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

static INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("valid integer pattern"));

static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?([0-9]+\.[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$|^[+-]?[0-9]+[eE][+-]?[0-9]+$")
        .expect("valid float pattern")
});

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

pub trait StringDeserializer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` when the value is not in this deserializer's format.
    fn deserialize(&self, value: &str) -> Option<Value>;
}

pub struct NullDeserializer;

impl StringDeserializer for NullDeserializer {
    fn name(&self) -> &'static str {
        "null"
    }

    fn deserialize(&self, value: &str) -> Option<Value> {
        matches!(value.trim().to_lowercase().as_str(), "null" | "none").then_some(Value::Null)
    }
}

pub struct BooleanDeserializer;

impl StringDeserializer for BooleanDeserializer {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn deserialize(&self, value: &str) -> Option<Value> {
        match value.trim().to_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        }
    }
}

pub struct IntegerDeserializer;

impl StringDeserializer for IntegerDeserializer {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn deserialize(&self, value: &str) -> Option<Value> {
        let value = value.trim();
        if !INTEGER.is_match(value) {
            return None;
        }
        value.parse::<i64>().ok().map(|v| Value::Number(v.into()))
    }
}

pub struct FloatDeserializer;

impl StringDeserializer for FloatDeserializer {
    fn name(&self) -> &'static str {
        "float"
    }

    fn deserialize(&self, value: &str) -> Option<Value> {
        let value = value.trim();
        if !FLOAT.is_match(value) {
            return None;
        }
        value
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    }
}

/// Dates are normalized to their ISO representation.
pub struct DateDeserializer;

impl StringDeserializer for DateDeserializer {
    fn name(&self) -> &'static str {
        "date"
    }

    fn deserialize(&self, value: &str) -> Option<Value> {
        NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
            .ok()
            .map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
    }
}

pub struct TimeDeserializer;

impl StringDeserializer for TimeDeserializer {
    fn name(&self) -> &'static str {
        "time"
    }

    fn deserialize(&self, value: &str) -> Option<Value> {
        let value = value.trim();
        TIME_FORMATS
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
    }
}

pub struct DateTimeDeserializer;

impl StringDeserializer for DateTimeDeserializer {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn deserialize(&self, value: &str) -> Option<Value> {
        let value = value.trim();
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
            return Some(Value::String(dt.to_rfc3339()));
        }
        DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
    }
}

/// `[a, b, 3]` becomes a list whose items are deserialized again.
pub struct ListDeserializer;

impl StringDeserializer for ListDeserializer {
    fn name(&self) -> &'static str {
        "list"
    }

    fn deserialize(&self, value: &str) -> Option<Value> {
        let inner = value.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
        if inner.is_empty() {
            return Some(Value::Array(Vec::new()));
        }
        let items = inner
            .split(',')
            .map(|item| deserialize_scalar(item.trim()))
            .collect();
        Some(Value::Array(items))
    }
}

/// Ordered set of deserializers.
pub struct DeserializerManager {
    deserializers: Vec<Box<dyn StringDeserializer>>,
}

impl Default for DeserializerManager {
    fn default() -> Self {
        Self {
            deserializers: vec![
                Box::new(NullDeserializer),
                Box::new(BooleanDeserializer),
                Box::new(IntegerDeserializer),
                Box::new(FloatDeserializer),
                Box::new(DateTimeDeserializer),
                Box::new(DateDeserializer),
                Box::new(TimeDeserializer),
                Box::new(ListDeserializer),
            ],
        }
    }
}

impl DeserializerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a deserializer that runs before the built-in ones.
    pub fn register_first<D: StringDeserializer + 'static>(&mut self, deserializer: D) {
        self.deserializers.insert(0, Box::new(deserializer));
    }

    pub fn deserialize(&self, value: &str) -> Value {
        self.deserializers
            .iter()
            .find_map(|d| d.deserialize(value))
            .unwrap_or_else(|| Value::String(value.to_string()))
    }
}

fn deserialize_scalar(value: &str) -> Value {
    let scalars: [&dyn StringDeserializer; 7] = [
        &NullDeserializer,
        &BooleanDeserializer,
        &IntegerDeserializer,
        &FloatDeserializer,
        &DateTimeDeserializer,
        &DateDeserializer,
        &TimeDeserializer,
    ];
    scalars
        .iter()
        .find_map(|d| d.deserialize(value))
        .unwrap_or_else(|| Value::String(value.to_string()))
}

/// Deserialize a single value with the default deserializers.
pub fn deserialize(value: &str) -> Value {
    static MANAGER: Lazy<DeserializerManager> = Lazy::new(DeserializerManager::default);
    MANAGER.deserialize(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(deserialize("42"), json!(42));
        assert_eq!(deserialize("-7"), json!(-7));
        assert_eq!(deserialize("+7"), json!(7));
        assert_eq!(deserialize("3.5"), json!(3.5));
        assert_eq!(deserialize("True"), json!(true));
        assert_eq!(deserialize("null"), Value::Null);
        assert_eq!(deserialize("hello"), json!("hello"));
        assert_eq!(deserialize("12a"), json!("12a"));
    }

    #[test]
    fn test_temporal_values() {
        assert_eq!(deserialize("2024-02-29"), json!("2024-02-29"));
        assert_eq!(deserialize("2024-02-30"), json!("2024-02-30"));
        assert_eq!(deserialize("10:15"), json!("10:15:00"));
        assert_eq!(
            deserialize("2024-01-05T10:15:00"),
            json!("2024-01-05T10:15:00")
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!(deserialize("[1, two, 3.0]"), json!([1, "two", 3.0]));
        assert_eq!(deserialize("[]"), json!([]));
        assert_eq!(deserialize("[x"), json!("[x"));
    }
}
