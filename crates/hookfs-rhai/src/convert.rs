//! Conversion between Rhai values and VFS values.
//!
//! Maps have no VFS counterpart and become flat `key value ...` lists,
//! which is the shape `stat` results are decoded from. Function pointers
//! and closures travel as opaque native values.

use hookfs_core::{NativeValue, Value};
use rhai::{Array, Dynamic, EvalAltResult, FnPtr, Map};

pub fn to_value(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::empty();
    }
    if value.is_string() {
        return value.into_string().map(Value::Str).unwrap_or_default();
    }
    if let Ok(i) = value.as_int() {
        return Value::Int(i);
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if value.is::<Array>() {
        let items = value.into_array().unwrap_or_default();
        return Value::List(items.into_iter().map(to_value).collect());
    }
    if value.is::<Map>() {
        let map = value.try_cast::<Map>().unwrap_or_default();
        let mut items = Vec::with_capacity(map.len() * 2);
        for (key, item) in map {
            items.push(Value::Str(key.to_string()));
            items.push(to_value(item));
        }
        return Value::List(items);
    }
    if value.is::<FnPtr>() {
        if let Some(f) = value.clone().try_cast::<FnPtr>() {
            return Value::Native(NativeValue::new(f));
        }
    }
    Value::Str(value.to_string())
}

pub fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Str(s) => Dynamic::from(s.clone()),
        Value::Int(i) => Dynamic::from(*i),
        Value::Bool(b) => Dynamic::from(*b),
        Value::List(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
        Value::Native(native) => match native.downcast_ref::<FnPtr>() {
            Some(f) => Dynamic::from(f.clone()),
            None => Dynamic::from(value.to_string()),
        },
    }
}

/// The value carried by a Rhai error.
///
/// Thrown values come back as they were thrown, looking through the
/// function-call wrappers Rhai adds on the way out. Any other error is
/// reported by its message.
pub fn error_value(err: Box<EvalAltResult>) -> Value {
    match *err {
        EvalAltResult::ErrorRuntime(value, _) => to_value(value),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => error_value(inner),
        other => Value::Str(other.to_string()),
    }
}
