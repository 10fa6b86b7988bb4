use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ErrorKind, Failure, NormalizedError};

pub const MSG_UNAUTHORIZED: &str = "Session expired. Please log in again.";
pub const MSG_FORBIDDEN: &str = "You do not have permission to perform this action.";
pub const MSG_NOT_FOUND: &str = "The requested resource was not found.";
pub const MSG_VALIDATION: &str = "Validation failed. Please check your input.";
pub const MSG_SERVER: &str = "Server error. Please try again later.";

/// Maps a raw failure to the caller-facing taxonomy. Pure: no logging, no session side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorNormalizationStage;

impl ErrorNormalizationStage {
    pub fn normalize(&self, failure: Failure) -> NormalizedError {
        let status = match failure.status() {
            Some(s) => s,
            None => {
                let message = failure.to_string();
                return NormalizedError::new(ErrorKind::Unknown, message, failure);
            }
        };
        match status {
            401 => NormalizedError::new(ErrorKind::Unauthorized, MSG_UNAUTHORIZED, failure),
            403 => NormalizedError::new(ErrorKind::Forbidden, MSG_FORBIDDEN, failure),
            404 => NormalizedError::new(ErrorKind::NotFound, MSG_NOT_FOUND, failure),
            422 => {
                let message = body_message(failure.body()).unwrap_or_else(|| MSG_VALIDATION.to_string());
                let fields = failure.body().and_then(|b| b.get("errors")).and_then(field_errors);
                let err = NormalizedError::new(ErrorKind::Validation, message, failure);
                match fields {
                    Some(f) => err.with_field_errors(f),
                    None => err,
                }
            }
            s if s >= 500 => NormalizedError::new(ErrorKind::ServerError, MSG_SERVER, failure),
            s => {
                let message = body_message(failure.body()).unwrap_or_else(|| format!("HTTP {}", s));
                NormalizedError::new(ErrorKind::Unknown, message, failure)
            }
        }
    }
}

fn body_message(body: Option<&Value>) -> Option<String> {
    match body? {
        Value::Object(map) => map.get("message").and_then(|m| m.as_str()).filter(|m| !m.is_empty()).map(str::to_string),
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

// `errors` is normally {field: [messages]}; a bare string per field is accepted too.
fn field_errors(errors: &Value) -> Option<BTreeMap<String, Vec<String>>> {
    let obj = errors.as_object()?;
    let mut out = BTreeMap::new();
    for (field, v) in obj {
        let messages: Vec<String> = match v {
            Value::Array(items) => items.iter().filter_map(|m| m.as_str().map(str::to_string)).collect(),
            Value::String(s) => vec![s.clone()],
            _ => continue,
        };
        out.insert(field.clone(), messages);
    }
    Some(out)
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod normalize_tests;
