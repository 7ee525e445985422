//! Core value types for the state store.

use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Mapping node of a value tree.
pub type Map = BTreeMap<String, Value>;

/// A node in a value tree.
///
/// Containers are reference counted. Cloning a `Value` never copies a
/// subtree, and writes go through [`Arc::make_mut`] so a tree held by a
/// reader is never changed underneath it.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Arc<Vec<Value>>),
    Object(Arc<Map>),
}

impl Value {
    /// An empty mapping.
    pub fn object() -> Self {
        Value::Object(Arc::new(Map::new()))
    }

    /// A sequence holding `items`.
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Identity comparison.
    ///
    /// Scalars compare by value, containers by allocation. Two containers
    /// with equal contents but separate allocations are not identical.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
                false
            }
            (a, b) => a == b,
        }
    }

    /// Convert any serializable value into a tree.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Deserialize this tree into a typed value.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(serde_json::Value::from(self.clone()))
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => serializer.collect_seq(items.iter()),
            Value::Object(map) => serializer.collect_map(map.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(Arc::new(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => serde_json::Value::Array(
                items.iter().cloned().map(serde_json::Value::from).collect(),
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(serde_json::Number::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(Arc::new(map))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        let source = json!({"user": {"name": "ada", "tags": ["a", "b"]}, "count": 3});
        let value = Value::from(source.clone());

        assert!(value.is_object());
        let back: serde_json::Value = value.into();
        assert_eq!(back, source);
    }

    #[test]
    fn test_ptr_eq() {
        let a = Value::from(json!({"x": [1, 2]}));
        let b = a.clone();
        let c = Value::from(json!({"x": [1, 2]}));

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a, c);
        assert!(Value::from(1).ptr_eq(&Value::from(1)));
        assert!(!Value::from(1).ptr_eq(&Value::from("1")));
    }

    #[test]
    fn test_typed_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Profile {
            name: String,
            age: u32,
        }

        let profile = Profile {
            name: "grace".to_string(),
            age: 85,
        };
        let value = Value::from_serialize(&profile).unwrap();
        assert_eq!(value.as_object().unwrap()["age"], Value::from(85));

        let parsed: Profile = value.deserialize_into().unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn test_deserialize_type_error() {
        let value = Value::from("not a number");
        let result: Result<u32> = value.deserialize_into();
        assert!(matches!(result, Err(StoreError::Deserialization(_))));
    }

    #[test]
    fn test_display_is_json() {
        let value = Value::from(json!({"a": [1, null, true]}));
        assert_eq!(value.to_string(), r#"{"a":[1,null,true]}"#);
    }
}
