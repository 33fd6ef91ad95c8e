//! Value type checking, coercion and declared validation rules.

use crate::config::{FieldDescriptor, FieldType, ValidationRule};
use crate::error::ApiError;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Canonical datetime form: RFC 3339, UTC, microseconds. Lexicographic order matches time order.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

/// Whether a JSON value (non-null) has the shape of the given type.
pub fn value_fits(ty: FieldType, v: &Value) -> bool {
    match ty {
        FieldType::String | FieldType::Enumeration => v.is_string(),
        FieldType::Integer => v.is_i64() || v.is_u64(),
        FieldType::Float => v.is_number(),
        FieldType::Boolean => v.is_boolean(),
        FieldType::Datetime => v.as_str().and_then(parse_datetime).is_some(),
        FieldType::Identifier | FieldType::Reference => {
            v.as_str().map(|s| !s.is_empty()).unwrap_or(false) || v.is_i64() || v.is_u64()
        }
    }
}

/// Type-check and normalize a non-null value. Does not apply declared rules.
pub fn coerce_type(field: &FieldDescriptor, v: &Value) -> Result<Value, ApiError> {
    let mismatch = || {
        ApiError::field(
            &field.name,
            format!("{} must be of type {}", field.name, field.field_type.as_str()),
        )
    };
    if !value_fits(field.field_type, v) {
        return Err(mismatch());
    }
    Ok(match field.field_type {
        FieldType::Float => {
            let f = v.as_f64().ok_or_else(mismatch)?;
            Value::Number(Number::from_f64(f).ok_or_else(mismatch)?)
        }
        FieldType::Datetime => {
            let dt = v.as_str().and_then(parse_datetime).ok_or_else(mismatch)?;
            Value::String(format_datetime(dt))
        }
        FieldType::Enumeration => {
            let s = v.as_str().unwrap_or_default();
            if !field.variants.iter().any(|x| x == s) {
                return Err(ApiError::field(
                    &field.name,
                    format!("{} must be one of: {}", field.name, field.variants.join(", ")),
                ));
            }
            v.clone()
        }
        _ => v.clone(),
    })
}

/// Full body-value check: type, then declared rules. Null handling is the caller's concern.
pub fn coerce_value(field: &FieldDescriptor, v: &Value) -> Result<Value, ApiError> {
    let v = coerce_type(field, v)?;
    validate_field(field, &v)?;
    Ok(v)
}

/// Parse a query-string or path value for the field's type.
pub fn coerce_text(field: &FieldDescriptor, s: &str) -> Result<Value, ApiError> {
    let bad = || {
        ApiError::field(
            &field.name,
            format!("'{}' is not a valid {} for {}", s, field.field_type.as_str(), field.name),
        )
    };
    let raw = match field.field_type {
        FieldType::Integer => Value::Number(s.trim().parse::<i64>().map_err(|_| bad())?.into()),
        FieldType::Float => {
            let f = s.trim().parse::<f64>().map_err(|_| bad())?;
            Value::Number(Number::from_f64(f).ok_or_else(bad)?)
        }
        FieldType::Boolean => {
            if s.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if s.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                return Err(bad());
            }
        }
        _ => Value::String(s.to_string()),
    };
    coerce_type(field, &raw)
}

fn validate_field(field: &FieldDescriptor, v: &Value) -> Result<(), ApiError> {
    let col = field.name.as_str();
    let rule: &ValidationRule = &field.rules.rule;
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(ApiError::field(col, format!("{} must be at most {} characters", col, max)));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(ApiError::field(col, format!("{} must be at least {} characters", col, min)));
            }
        }
    }
    if let Some(re) = &field.rules.pattern {
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(ApiError::field(col, format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(ApiError::field(
                col,
                format!(
                    "{} must be one of: {:?}",
                    col,
                    allowed.iter().take(5).collect::<Vec<_>>()
                ),
            ));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(ApiError::field(col, format!("{} must be at least {}", col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(ApiError::field(col, format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), ApiError> {
    match format.to_lowercase().as_str() {
        "email" => {
            if let Some(s) = v.as_str() {
                if !s.contains('@') || s.len() < 3 {
                    return Err(ApiError::field(col, format!("{} must be a valid email", col)));
                }
            }
        }
        "uuid" => {
            if let Some(s) = v.as_str() {
                if uuid::Uuid::parse_str(s).is_err() {
                    return Err(ApiError::field(col, format!("{} must be a valid UUID", col)));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
