//! Conversions between Rust field types and [`Value`].
//!
//! `From<T> for Value` is used when a record's fields are read into a payload
//! and [`FromValue`] when a decoded payload is written back into them.

use crate::value::{EnvironmentKey, Map, ObjectRef, Value};

/// Conversion from a decoded [`Value`] into a record field type.
pub trait FromValue: Sized {
    /// Converts `value`, or describes why it does not fit.
    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, found: &Value) -> String {
    format!("expected {expected}, found {}", crate::stringify::stringify(found))
}

// ========== Into Value ==========

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<()> for Value {
    /// Unit is null.
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl From<EnvironmentKey> for Value {
    fn from(key: EnvironmentKey) -> Self {
        Value::Environment(key)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    /// `None` is null, `Some(v)` is `v` itself.
    fn from(option: Option<T>) -> Self {
        match option {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(elements: Vec<T>) -> Self {
        Value::Array(elements.into_iter().map(Into::into).collect())
    }
}

// ========== From Value ==========

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, String> {
        value.as_int().ok_or_else(|| mismatch("an integer", &value))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, String> {
        value.as_bool().ok_or_else(|| mismatch("a boolean", &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(mismatch("a string", &other)),
        }
    }
}

impl FromValue for Map {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Map(map) => Ok(map),
            other => Err(mismatch("a map", &other)),
        }
    }
}

impl FromValue for ObjectRef {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(object) => Ok(object),
            other => Err(mismatch("an object", &other)),
        }
    }
}

impl FromValue for EnvironmentKey {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Environment(key) => Ok(key),
            other => EnvironmentKey::from_array(&other)
                .ok_or_else(|| mismatch("an environment key", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    /// Null is `None`; anything else must convert to `T`.
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Array(elements) => elements.into_iter().map(T::from_value).collect(),
            other => Err(mismatch("an array", &other)),
        }
    }
}
