//! Resource-agnostic request body checks.
//!
//! Every check returns `None` when the body passes and a human-readable
//! message otherwise. Absent fields pass every check except [`required`].

use serde_json::{Map, Value};

use crate::error::ApiError;

pub type Body = Map<String, Value>;

/// Wire type of a request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    NullableString,
    /// Id of another element, carried as a string.
    Reference,
}

impl FieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::String | FieldType::Reference => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::NullableString => value.is_string() || value.is_null(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Number => "a number",
            FieldType::Boolean => "a boolean",
            FieldType::Object => "an object",
            FieldType::NullableString => "a string or null",
            FieldType::Reference => "an element id",
        }
    }
}

pub fn unknown_fields(body: &Body, allowed: &[&str]) -> Option<String> {
    let unknown: Vec<&str> = body
        .keys()
        .map(String::as_str)
        .filter(|k| !allowed.contains(k))
        .collect();
    if unknown.is_empty() {
        None
    } else {
        Some(format!(
            "Unknown field(s): {}. Allowed fields: {}",
            unknown.join(", "),
            allowed.join(", ")
        ))
    }
}

pub fn check_type(body: &Body, field: &str, ty: FieldType) -> Option<String> {
    match body.get(field) {
        Some(value) if !ty.accepts(value) => {
            Some(format!("Field '{}' must be {}", field, ty.describe()))
        }
        _ => None,
    }
}

pub fn non_empty_string(body: &Body, field: &str) -> Option<String> {
    match body.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => None,
        Some(_) => Some(format!("Field '{}' must be a non-empty string", field)),
        None => None,
    }
}

pub fn one_of(body: &Body, field: &str, choices: &[&str]) -> Option<String> {
    let value = body.get(field)?;
    if value.as_str().is_some_and(|s| choices.contains(&s)) {
        return None;
    }
    Some(format!(
        "Invalid value for '{}': {}. Allowed values: {}",
        field,
        value,
        choices.join(", ")
    ))
}

pub fn required(body: &Body, field: &str) -> Option<String> {
    if body.contains_key(field) {
        None
    } else {
        Some(format!("Missing required field: {}", field))
    }
}

/// Run checks in order; the first failure wins.
pub fn run(body: &Body, checks: &[&dyn Fn(&Body) -> Option<String>]) -> Result<(), ApiError> {
    match checks.iter().find_map(|check| check(body)) {
        Some(message) => Err(ApiError::Validation(message)),
        None => Ok(()),
    }
}

/// Request body as a map; a missing body is an empty one.
pub fn body_object(body: Option<&Value>) -> Result<Body, ApiError> {
    match body {
        None | Some(Value::Null) => Ok(Body::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(ApiError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
    }
}
