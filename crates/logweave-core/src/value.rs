//! The recursive value union every pipeline stage operates on.
//!
//! [`Value`] models a JSON-compatible datum extended with a byte-string
//! variant (database BLOB columns). Equality and hashing are *numeric*:
//! `Int(5)` equals `Float(5.0)` and the two hash identically, so uniqueness
//! tracking and join-key maps treat them as one value. Mapping values are
//! stored in a [`BTreeMap`] — insertion order is irrelevant to the data
//! model, and the sorted representation keeps comparisons deterministic.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A recursive JSON-compatible datum.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes (BLOB columns; not representable in JSON).
    Bytes(Vec<u8>),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// String-keyed mapping.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of this value's kind, for error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of an `Int` or `Float`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Borrows the string payload of a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows the element list of an `Array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrows the entry map of an `Object`.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Converts into a [`serde_json::Value`].
    ///
    /// Bytes are rendered through [`String::from_utf8_lossy`] and
    /// non-finite floats degrade to JSON null, both lossy by necessity.
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(b),
            Self::Int(i) => serde_json::Value::Number(i.into()),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s),
            Self::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(&b).into_owned()),
            Self::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Self::into_json).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

// ── Numeric equality and hashing ───────────────────────────────────
//
// A float with an exact i64 representation is canonically an int; this is
// what makes Eq/Hash agree across the Int/Float cross-equality below.

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn float_as_exact_int(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && (i64::MIN as f64..=i64::MAX as f64).contains(&f) {
        let i = f as i64;
        if (i as f64 - f).abs() < f64::EPSILON {
            return Some(i);
        }
    }
    None
}

fn float_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        // -0.0 and 0.0 compare equal.
        0.0f64.to_bits()
    } else {
        f.to_bits()
    }
}

#[allow(clippy::cast_precision_loss)]
fn num_eq(a: f64, b: f64) -> bool {
    float_bits(a) == float_bits(b)
}

impl PartialEq for Value {
    #[allow(clippy::cast_precision_loss)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => num_eq(*a, *b),
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => {
                float_as_exact_int(*b) == Some(*a)
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => state.write_u8(0),
            Self::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Self::Int(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            Self::Float(f) => {
                // Hash exactly-integral floats as ints so Int(5) and
                // Float(5.0) land in the same bucket.
                if let Some(i) = float_as_exact_int(*f) {
                    state.write_u8(2);
                    i.hash(state);
                } else {
                    state.write_u8(3);
                    float_bits(*f).hash(state);
                }
            }
            Self::Str(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Self::Bytes(b) => {
                state.write_u8(5);
                b.hash(state);
            }
            Self::Array(items) => {
                state.write_u8(6);
                items.hash(state);
            }
            Self::Object(map) => {
                state.write_u8(7);
                map.hash(state);
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_int_float_cross_equality() {
        assert_eq!(Value::Int(5), Value::Float(5.0));
        assert_eq!(Value::Float(5.0), Value::Int(5));
        assert_ne!(Value::Int(5), Value::Float(5.5));
        assert_ne!(Value::Int(5), Value::Str("5".into()));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        let mut set = HashSet::new();
        set.insert(Value::Int(5));
        assert!(set.contains(&Value::Float(5.0)));
        assert!(!set.contains(&Value::Float(5.5)));
    }

    #[test]
    fn test_negative_zero_and_nan() {
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn test_json_round_trip() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"id": 1, "score": 2.5, "tags": ["a", null], "nested": {"ok": true}}"#,
        )
        .unwrap();
        let value = Value::from(json.clone());
        assert_eq!(value.into_json(), json);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Value::Null.kind_name(), "null");
        assert_eq!(Value::Bytes(vec![1]).kind_name(), "bytes");
        assert_eq!(Value::Array(vec![]).kind_name(), "array");
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Float(3.5).as_f64(), Some(3.5));
        assert_eq!(Value::Str("x".into()).as_f64(), None);
        assert_eq!(Value::Str("x".into()).as_str(), Some("x"));
        assert!(Value::Null.is_null());
    }
}
