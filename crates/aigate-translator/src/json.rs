//! Small keyhole accessors over `serde_json::Value`. Converters read
//! optional fields through these so a missing or mistyped field degrades to
//! `None` instead of failing the translation.

use serde_json::{Map, Value};

pub fn obj(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object()
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

pub fn i64_field(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_i64)
}

pub fn f64_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

pub fn bool_field(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

pub fn array_field<'a>(value: &'a Value, key: &str) -> Option<&'a [Value]> {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice)
}

/// Copies `key` from `src` into `dst` when present, whatever its type.
pub fn copy_field(dst: &mut Map<String, Value>, src: &Value, key: &str) {
    if let Some(found) = src.get(key) {
        dst.insert(key.to_string(), found.clone());
    }
}
