//! Value validation against entity schemas.

use crate::error::{ModelError, ModelResult, ValidationErrors};
use crate::schema::{EntitySchema, FieldDescriptor, FieldType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};

/// Check one value against a field, returning the failure message.
pub fn validate_value(field: &FieldDescriptor, value: &Value) -> Result<(), String> {
    if value.is_null() {
        return if field.nullable {
            Ok(())
        } else {
            Err("must not be null".to_string())
        };
    }

    match field.field_type {
        FieldType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
            _ => Err("must be an integer".to_string()),
        },
        FieldType::Float => match value {
            Value::Number(_) => Ok(()),
            _ => Err("must be a number".to_string()),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(()),
            _ => Err("must be a boolean".to_string()),
        },
        FieldType::String | FieldType::Text => {
            let Value::String(s) = value else {
                return Err("must be a string".to_string());
            };
            match field.max_length {
                Some(max) if s.chars().count() > max => {
                    Err(format!("must be at most {} characters long", max))
                }
                _ => Ok(()),
            }
        }
        FieldType::Date => parse_str(value, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
            .then_some(())
            .ok_or_else(|| "must be an ISO date (YYYY-MM-DD)".to_string()),
        FieldType::Time => parse_str(value, |s| {
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok()
                || NaiveTime::parse_from_str(s, "%H:%M").is_ok()
        })
        .then_some(())
        .ok_or_else(|| "must be an ISO time (HH:MM[:SS])".to_string()),
        FieldType::DateTime => parse_str(value, |s| {
            DateTime::parse_from_rfc3339(s).is_ok()
                || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
                || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        })
        .then_some(())
        .ok_or_else(|| "must be an ISO datetime".to_string()),
        FieldType::Uuid => parse_str(value, |s| uuid::Uuid::parse_str(s).is_ok())
            .then_some(())
            .ok_or_else(|| "must be a UUID".to_string()),
        FieldType::Json => Ok(()),
    }
}

fn parse_str(value: &Value, check: impl Fn(&str) -> bool) -> bool {
    matches!(value, Value::String(s) if check(s))
}

/// Validate a mapping for create (`for_update == false`) or update.
///
/// Keys that are not stored, writable attributes are reported. On create,
/// every required column must be present.
pub fn validate_dict(
    schema: &EntitySchema,
    data: &Map<String, Value>,
    for_update: bool,
) -> ModelResult<()> {
    let mut errors = ValidationErrors::new();

    for (key, value) in data {
        match schema.field(key) {
            None => errors.add(key.clone(), "is not a valid attribute"),
            Some(field) if field.is_relationship() => {}
            Some(field) if !field.writable => errors.add(key.clone(), "is read only"),
            Some(field) => {
                if let Err(message) = validate_value(field, value) {
                    errors.add(key.clone(), message);
                }
            }
        }
    }

    if !for_update {
        for field in schema.fields().iter().filter(|f| f.is_required()) {
            if !data.contains_key(field.name) {
                errors.add(field.name, "is required");
            }
        }
    }

    errors.into_result()
}

/// Validate find filters: each key must be an exposed, non-relationship
/// attribute. Arrays are checked item by item as IN lists.
pub fn validate_for_find(schema: &EntitySchema, filters: &Map<String, Value>) -> ModelResult<()> {
    let mut errors = ValidationErrors::new();

    for (key, value) in filters {
        let field = match schema.field(key) {
            Some(field) if field.is_exposed() && field.is_stored() => field,
            _ => {
                errors.add(key.clone(), "is not a valid filter");
                continue;
            }
        };

        let mut nullable = field.clone();
        nullable.nullable = true;
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in items {
            if let Err(message) = validate_value(&nullable, item) {
                errors.add(key.clone(), message);
                break;
            }
        }
    }

    errors.into_result()
}

/// Validate primary key values, in key column order.
pub fn validate_primary_key(schema: &EntitySchema, values: &[Value]) -> ModelResult<()> {
    let columns = schema.primary_key_columns();
    if columns.is_empty() || columns.len() != values.len() {
        return Err(ModelError::MissingPrimaryKey);
    }

    let mut errors = ValidationErrors::new();
    for (column, value) in columns.iter().zip(values) {
        let Some(field) = schema.field(column) else {
            continue;
        };
        if value.is_null() {
            errors.add(*column, "must not be null");
        } else if let Err(message) = validate_value(field, value) {
            errors.add(*column, message);
        }
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::fixtures::{Membership, Post, User};
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_value_types() {
        let schema = Post::schema();
        let date = schema.field("published_on").unwrap();
        assert!(validate_value(date, &json!("2024-02-29")).is_ok());
        assert!(validate_value(date, &json!("2024-02-30")).is_err());
        assert!(validate_value(date, &Value::Null).is_ok());

        let title = schema.field("title").unwrap();
        assert!(validate_value(title, &json!("x".repeat(200))).is_ok());
        assert!(validate_value(title, &json!("x".repeat(201))).is_err());
        assert!(validate_value(title, &Value::Null).is_err());

        let id = schema.field("id").unwrap();
        assert!(validate_value(id, &json!(1.5)).is_err());
    }

    #[test]
    fn test_validate_dict_create_and_update() {
        let schema = User::schema();
        let err = validate_dict(schema, &map(json!({"name": "alice"})), false).unwrap_err();
        match err {
            ModelError::Validation(errors) => {
                assert!(errors.contains("email"));
                assert!(!errors.contains("id"));
                assert!(!errors.contains("_login_count"));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(validate_dict(schema, &map(json!({"name": "alice"})), true).is_ok());
        assert!(validate_dict(schema, &map(json!({"display_name": "x"})), true).is_err());
        assert!(validate_dict(schema, &map(json!({"bogus": 1})), true).is_err());
    }

    #[test]
    fn test_validate_for_find() {
        let schema = User::schema();
        assert!(validate_for_find(schema, &map(json!({"id": [1, 2], "name": "alice"}))).is_ok());
        assert!(validate_for_find(schema, &map(json!({"id": [1, "x"]}))).is_err());
        assert!(validate_for_find(schema, &map(json!({"posts": 1}))).is_err());
        assert!(validate_for_find(schema, &map(json!({"password_hash": "x"}))).is_err());
    }

    #[test]
    fn test_validate_for_find_rejects_hybrids() {
        let schema = User::schema();
        let err = validate_for_find(schema, &map(json!({"display_name": "ada <ada@x.org>"})))
            .unwrap_err();
        assert!(err.to_string().contains("display_name"));
        assert!(err.to_string().contains("is not a valid filter"));
    }

    #[test]
    fn test_validate_primary_key() {
        assert!(validate_primary_key(Membership::schema(), &[json!(1), json!(2)]).is_ok());
        assert!(validate_primary_key(Membership::schema(), &[json!(1)]).is_err());
        assert!(validate_primary_key(User::schema(), &[Value::Null]).is_err());
    }
}
