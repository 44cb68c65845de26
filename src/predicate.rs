//! Declarative completion predicates over parsed JSON response bodies.
//!
//! Predicates are data, not closures, so the flow script can live in the
//! policy tables. Field paths are dotted (`order.id`, `items.0.sku`); a
//! missing field never errors, it simply does not satisfy the test.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Field exists and is not null.
    Present { field: String },
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    /// Non-empty array, string or object.
    NonEmpty { field: String },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl Predicate {
    pub fn matches(&self, body: &Value) -> bool {
        match self {
            Predicate::Present { field } => lookup(body, field).is_some_and(|v| !v.is_null()),
            Predicate::Eq { field, value } => lookup(body, field).is_some_and(|v| v == value),
            Predicate::In { field, values } => {
                lookup(body, field).is_some_and(|v| values.iter().any(|candidate| candidate == v))
            }
            Predicate::NonEmpty { field } => match lookup(body, field) {
                Some(Value::Array(items)) => !items.is_empty(),
                Some(Value::String(text)) => !text.is_empty(),
                Some(Value::Object(map)) => !map.is_empty(),
                _ => false,
            },
            Predicate::All { of } => of.iter().all(|p| p.matches(body)),
            Predicate::Any { of } => of.iter().any(|p| p.matches(body)),
            Predicate::Not { predicate } => !predicate.matches(body),
        }
    }

    /// Every field path this predicate reads, used for table validation.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Predicate::Present { field }
            | Predicate::Eq { field, .. }
            | Predicate::In { field, .. }
            | Predicate::NonEmpty { field } => vec![field.as_str()],
            Predicate::All { of } | Predicate::Any { of } => {
                of.iter().flat_map(|p| p.fields()).collect()
            }
            Predicate::Not { predicate } => predicate.fields(),
        }
    }
}

pub fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(body, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

/// Extract a scalar at `path` as a string, for captured cross-step values.
pub fn extract_string(body: &Value, path: &str) -> Option<String> {
    match lookup(body, path)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
