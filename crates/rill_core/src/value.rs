//! Value model and helpers for truthiness, text conversion and equality.

use crate::resource::ResourceRef;

pub use serde_json::Value;

/// What a variable holds
#[derive(Clone)]
pub enum Binding {
    /// Plain data
    Value(Value),
    /// Handle to a subscription-scoped resource
    Resource(ResourceRef),
}

impl Binding {
    /// Data view of the binding; resources expose their snapshot
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Resource(r) => r.snapshot(),
        }
    }

    /// Resource handle, if this binding holds one
    #[must_use]
    pub fn as_resource(&self) -> Option<&ResourceRef> {
        match self {
            Self::Resource(r) => Some(r),
            Self::Value(_) => None,
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Resource(r) => f.debug_tuple("Resource").field(&r.kind()).finish(),
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Truthiness used by filters and boolean predicates.
///
/// `null`, `false`, `0` and the empty string are false; everything else,
/// including empty arrays and objects, is true.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form used by templates, `join` and string operators.
///
/// Strings are unquoted, `null` is empty, arrays join their items with
/// commas and objects render as compact JSON.
#[must_use]
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Deep structural equality.
///
/// Numbers compare by numeric value, so `2` equals `2.0`.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => left == right,
    }
}
