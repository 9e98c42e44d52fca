//! Script values crossing the host/handler boundary.
//!
//! Handlers live in a scripting environment, so every argument and result
//! is a loosely-typed script value. Integer coercion and string rendering
//! follow script conventions: `"42"` is an integer, a list renders as its
//! space-separated elements.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Opaque host value (for example a script closure).
#[derive(Clone)]
pub struct NativeValue {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl NativeValue {
    /// Wrap a host value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    /// Borrow the wrapped value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeValue<{}>", self.type_name)
    }
}

/// A script value.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Native(NativeValue),
}

impl Default for Value {
    fn default() -> Self {
        Value::Str(String::new())
    }
}

impl Value {
    /// The empty value.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a list value.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// True for the empty string and the empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Str(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Borrow as a string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce to an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Str(s) => s.trim().parse().ok(),
            Value::List(items) if items.len() == 1 => items[0].as_int(),
            _ => None,
        }
    }

    /// Coerce to a list.
    ///
    /// The empty string is the empty list and any other scalar is a
    /// one-element list. Opaque values have no list form.
    pub fn into_list(self) -> Result<Vec<Value>, Value> {
        match self {
            Value::List(items) => Ok(items),
            Value::Str(s) if s.is_empty() => Ok(Vec::new()),
            native @ Value::Native(_) => Err(native),
            scalar => Ok(vec![scalar]),
        }
    }

    /// Coerce to a list of strings.
    pub fn into_string_list(self) -> Result<Vec<String>, Value> {
        Ok(self.into_list()?.iter().map(Value::to_string).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    match item {
                        Value::Str(s) if s.is_empty() || s.contains(char::is_whitespace) => {
                            write!(f, "{{{s}}}")?
                        }
                        Value::List(_) => write!(f, "{{{item}}}")?,
                        other => write!(f, "{other}")?,
                    }
                }
                Ok(())
            }
            Value::Native(native) => write!(f, "<{}>", native.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            (Value::Native(_), _) | (_, Value::Native(_)) => false,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => a.to_string() == b.to_string(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Str(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::List(items) => items.serialize(serializer),
            Value::Native(native) => serializer.serialize_str(&format!("<{}>", native.type_name())),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_coercion() {
        assert_eq!(Value::from("42").as_int(), Some(42));
        assert_eq!(Value::from(" 7 ").as_int(), Some(7));
        assert_eq!(Value::from(true).as_int(), Some(1));
        assert_eq!(Value::from("file").as_int(), None);
        assert_eq!(Value::list(["12"]).as_int(), Some(12));
    }

    #[test]
    fn test_into_list() {
        assert_eq!(Value::empty().into_list().unwrap(), Vec::<Value>::new());
        assert_eq!(Value::from("mem1").into_list().unwrap(), vec![Value::from("mem1")]);
        let native = Value::Native(NativeValue::new(5u8));
        assert!(native.into_list().is_err());
    }

    #[test]
    fn test_display_quotes_words() {
        let v = Value::list([Value::from("a b"), Value::from(""), Value::from(3i64)]);
        assert_eq!(v.to_string(), "{a b} {} 3");
    }

    #[test]
    fn test_equality_is_string_based() {
        assert_eq!(Value::from("3"), Value::from(Value::Int(3).to_string()));
        assert_eq!(Value::from(1i64), Value::from("1"));
        assert_ne!(Value::list(["a"]), Value::from("b"));
    }

    #[test]
    fn test_serialize() {
        let v = Value::list([Value::from("size"), Value::from(42i64)]);
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"["size",42]"#);
    }

    #[test]
    fn test_native_downcast() {
        let native = NativeValue::new(String::from("closure"));
        assert_eq!(native.downcast_ref::<String>().map(String::as_str), Some("closure"));
        assert!(native.downcast_ref::<i64>().is_none());
    }
}
