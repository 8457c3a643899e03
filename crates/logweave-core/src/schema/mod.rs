//! Structural schemas induced from value samples.
//!
//! A [`Schema`] is a closed tagged union over the value kinds plus two
//! synthetic shapes: `Dict` (map-typed objects whose keys are data, not
//! structure) and `Unknown` (incompatible kinds co-occurred). Every schema
//! carries a nullable flag and a uniqueness flag; kind-specific payloads
//! hold the length/value bounds and nested schemas.
//!
//! The shape invariant: a schema must [`accept`](Schema::accepts) every
//! value it was induced from.

mod induction;

pub use induction::SchemaInducer;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::value::Value;

/// Inclusive length bounds observed for strings, bytes, arrays, and dicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenRange {
    /// Smallest observed length.
    pub min: usize,
    /// Largest observed length.
    pub max: usize,
}

impl LenRange {
    /// Bounds covering exactly the lengths in `min..=max`.
    #[must_use]
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Whether `len` falls inside the bounds.
    #[must_use]
    pub const fn contains(&self, len: usize) -> bool {
        self.min <= len && len <= self.max
    }
}

/// One field of an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name.
    pub name: String,
    /// `true` iff the field was present in every non-null sample.
    pub always_exists: bool,
    /// Schema of the field's values.
    pub schema: Schema,
}

/// Kind-specific schema payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaKind {
    /// Only nulls were observed.
    Null,
    /// Incompatible kinds co-occurred, or an empty array had no elements
    /// to induce from.
    Unknown,
    /// UTF-8 strings. Length bounds are absent for derived schemas with no
    /// observed sample (e.g. dict keys).
    Str {
        /// Observed length bounds, if any.
        len: Option<LenRange>,
    },
    /// Byte strings.
    Bytes {
        /// Observed length bounds.
        len: LenRange,
    },
    /// Integers with observed value bounds.
    Int {
        /// Smallest observed value.
        min: i64,
        /// Largest observed value.
        max: i64,
    },
    /// Floats with observed value bounds (integers widen into these when
    /// both kinds co-occur).
    Float {
        /// Smallest observed value.
        min: f64,
        /// Largest observed value.
        max: f64,
    },
    /// Booleans, tracking which literals were observed.
    Bool {
        /// `false` was observed.
        saw_false: bool,
        /// `true` was observed.
        saw_true: bool,
    },
    /// Arrays sharing one element schema.
    Array {
        /// Observed element-count bounds.
        len: LenRange,
        /// Schema of the concatenated elements.
        element: Box<Schema>,
    },
    /// Objects with a bounded, named field list.
    Object {
        /// Fields in sorted name order.
        fields: Vec<FieldSchema>,
    },
    /// Map-typed objects: string keys are data, all values share a schema.
    Dict {
        /// Observed entry-count bounds.
        len: LenRange,
        /// Schema of the concatenated values.
        value: Box<Schema>,
    },
}

/// A structural type descriptor for a column of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Kind-specific payload.
    pub kind: SchemaKind,
    /// Whether null was observed (or can appear after joining).
    pub nullable: bool,
    /// Whether no duplicate non-null value was observed.
    pub unique: bool,
}

impl Schema {
    /// Schema of an all-null sample.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            kind: SchemaKind::Null,
            nullable: true,
            unique: true,
        }
    }

    /// Schema for incompatible or unobserved data.
    #[must_use]
    pub const fn unknown(nullable: bool) -> Self {
        Self {
            kind: SchemaKind::Unknown,
            nullable,
            unique: false,
        }
    }

    /// String schema.
    #[must_use]
    pub const fn str_(nullable: bool, len: Option<LenRange>, unique: bool) -> Self {
        Self {
            kind: SchemaKind::Str { len },
            nullable,
            unique,
        }
    }

    /// Bytes schema. Byte strings never participate in uniqueness tracking.
    #[must_use]
    pub const fn bytes(nullable: bool, len: LenRange) -> Self {
        Self {
            kind: SchemaKind::Bytes { len },
            nullable,
            unique: false,
        }
    }

    /// Integer schema.
    #[must_use]
    pub const fn int(nullable: bool, min: i64, max: i64, unique: bool) -> Self {
        Self {
            kind: SchemaKind::Int { min, max },
            nullable,
            unique,
        }
    }

    /// Float schema.
    #[must_use]
    pub const fn float(nullable: bool, min: f64, max: f64, unique: bool) -> Self {
        Self {
            kind: SchemaKind::Float { min, max },
            nullable,
            unique,
        }
    }

    /// Boolean schema; unique iff only one literal was observed.
    #[must_use]
    pub const fn bool_(nullable: bool, saw_false: bool, saw_true: bool) -> Self {
        Self {
            kind: SchemaKind::Bool {
                saw_false,
                saw_true,
            },
            nullable,
            unique: !(saw_false && saw_true),
        }
    }

    /// Array schema.
    #[must_use]
    pub fn array(nullable: bool, len: LenRange, element: Schema) -> Self {
        Self {
            kind: SchemaKind::Array {
                len,
                element: Box::new(element),
            },
            nullable,
            unique: false,
        }
    }

    /// Object schema.
    #[must_use]
    pub const fn object(nullable: bool, fields: Vec<FieldSchema>) -> Self {
        Self {
            kind: SchemaKind::Object { fields },
            nullable,
            unique: false,
        }
    }

    /// Dict schema.
    #[must_use]
    pub fn dict(nullable: bool, len: LenRange, value: Schema) -> Self {
        Self {
            kind: SchemaKind::Dict {
                len,
                value: Box::new(value),
            },
            nullable,
            unique: false,
        }
    }

    /// Whether this is a scalar (non-container) schema.
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::Null
                | SchemaKind::Str { .. }
                | SchemaKind::Bytes { .. }
                | SchemaKind::Int { .. }
                | SchemaKind::Float { .. }
                | SchemaKind::Bool { .. }
        )
    }

    /// Whether this is a scalar or an array of scalars.
    #[must_use]
    pub fn is_basic(&self) -> bool {
        match &self.kind {
            SchemaKind::Array { element, .. } => element.is_primitive(),
            _ => self.is_primitive(),
        }
    }

    /// Whether this schema (or its array element, recursively) is unknown.
    #[must_use]
    pub fn is_unknownish(&self) -> bool {
        match &self.kind {
            SchemaKind::Unknown => true,
            SchemaKind::Array { element, .. } => element.is_unknownish(),
            _ => false,
        }
    }

    /// Looks up an object field by name.
    pub fn find_field(&self, name: &str) -> CoreResult<&FieldSchema> {
        let SchemaKind::Object { fields } = &self.kind else {
            return Err(CoreError::SchemaShape {
                expected: "object",
                got: self.kind_name(),
            });
        };
        fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| CoreError::FieldNotFound(name.to_owned()))
    }

    /// Copy of this schema with nullability widened by `nullable`.
    #[must_use]
    pub fn or_nullable(&self, nullable: bool) -> Self {
        Self {
            kind: self.kind.clone(),
            nullable: self.nullable || nullable,
            unique: self.unique,
        }
    }

    /// Short name of the schema kind, for error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            SchemaKind::Null => "null",
            SchemaKind::Unknown => "unknown",
            SchemaKind::Str { .. } => "string",
            SchemaKind::Bytes { .. } => "bytes",
            SchemaKind::Int { .. } => "int",
            SchemaKind::Float { .. } => "float",
            SchemaKind::Bool { .. } => "bool",
            SchemaKind::Array { .. } => "array",
            SchemaKind::Object { .. } => "object",
            SchemaKind::Dict { .. } => "dict",
        }
    }

    /// Whether `value` conforms to this schema, respecting nullability and
    /// length/value bounds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.nullable;
        }
        match (&self.kind, value) {
            (SchemaKind::Unknown, _) => true,
            (SchemaKind::Str { len }, Value::Str(s)) => {
                len.map_or(true, |len| len.contains(s.chars().count()))
            }
            (SchemaKind::Bytes { len }, Value::Bytes(b)) => len.contains(b.len()),
            (SchemaKind::Int { min, max }, Value::Int(i)) => min <= i && i <= max,
            (SchemaKind::Float { min, max }, Value::Float(f)) => *min <= *f && *f <= *max,
            (SchemaKind::Float { min, max }, Value::Int(i)) => {
                *min <= *i as f64 && *i as f64 <= *max
            }
            (
                SchemaKind::Bool {
                    saw_false,
                    saw_true,
                },
                Value::Bool(b),
            ) => {
                if *b {
                    *saw_true
                } else {
                    *saw_false
                }
            }
            (SchemaKind::Array { len, element }, Value::Array(items)) => {
                len.contains(items.len()) && items.iter().all(|item| element.accepts(item))
            }
            (SchemaKind::Object { fields }, Value::Object(map)) => {
                fields
                    .iter()
                    .all(|f| match map.get(&f.name) {
                        Some(v) => f.schema.accepts(v),
                        None => !f.always_exists,
                    })
                    && map.keys().all(|k| fields.iter().any(|f| &f.name == k))
            }
            (SchemaKind::Dict { len, value }, Value::Object(map)) => {
                len.contains(map.len()) && map.values().all(|v| value.accepts(v))
            }
            _ => false,
        }
    }

    /// Shape-only comparison: same kinds and nested structure, ignoring
    /// nullability, uniqueness, and bounds.
    #[must_use]
    pub fn soft_eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (SchemaKind::Str { .. }, SchemaKind::Str { .. })
            | (SchemaKind::Bytes { .. }, SchemaKind::Bytes { .. })
            | (SchemaKind::Int { .. }, SchemaKind::Int { .. })
            | (SchemaKind::Float { .. }, SchemaKind::Float { .. })
            | (SchemaKind::Bool { .. }, SchemaKind::Bool { .. })
            | (SchemaKind::Null, SchemaKind::Null)
            | (SchemaKind::Unknown, SchemaKind::Unknown) => true,
            (SchemaKind::Array { element: a, .. }, SchemaKind::Array { element: b, .. })
            | (SchemaKind::Dict { value: a, .. }, SchemaKind::Dict { value: b, .. }) => {
                a.soft_eq(b)
            }
            (SchemaKind::Object { fields: a }, SchemaKind::Object { fields: b }) => {
                a.len() == b.len()
                    && a.iter().all(|fa| {
                        b.iter()
                            .any(|fb| fa.name == fb.name && fa.schema.soft_eq(&fb.schema))
                    })
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_accepts_nullability() {
        let schema = Schema::int(false, 0, 10, true);
        assert!(!schema.accepts(&Value::Null));
        assert!(Schema::int(true, 0, 10, true).accepts(&Value::Null));
    }

    #[test]
    fn test_accepts_bounds() {
        let schema = Schema::int(false, 1, 3, true);
        assert!(schema.accepts(&Value::Int(2)));
        assert!(!schema.accepts(&Value::Int(4)));

        let schema = Schema::str_(false, Some(LenRange::new(1, 3)), false);
        assert!(schema.accepts(&Value::Str("ab".into())));
        assert!(!schema.accepts(&Value::Str("abcd".into())));
    }

    #[test]
    fn test_accepts_float_covers_int() {
        let schema = Schema::float(false, 0.0, 10.0, false);
        assert!(schema.accepts(&Value::Int(5)));
        assert!(schema.accepts(&Value::Float(2.5)));
        assert!(!schema.accepts(&Value::Float(10.5)));
    }

    #[test]
    fn test_accepts_object_fields() {
        let schema = Schema::object(
            false,
            vec![
                FieldSchema {
                    name: "id".into(),
                    always_exists: true,
                    schema: Schema::int(false, 0, 100, true),
                },
                FieldSchema {
                    name: "note".into(),
                    always_exists: false,
                    schema: Schema::str_(false, None, false),
                },
            ],
        );

        let mut map = BTreeMap::new();
        map.insert("id".into(), Value::Int(7));
        assert!(schema.accepts(&Value::Object(map.clone())));

        map.remove("id");
        assert!(!schema.accepts(&Value::Object(map.clone())));

        map.insert("id".into(), Value::Int(7));
        map.insert("stray".into(), Value::Bool(true));
        assert!(!schema.accepts(&Value::Object(map)));
    }

    #[test]
    fn test_is_basic() {
        assert!(Schema::int(false, 0, 1, false).is_basic());
        let arr = Schema::array(false, LenRange::new(0, 2), Schema::int(false, 0, 1, false));
        assert!(arr.is_basic());
        let nested = Schema::array(false, LenRange::new(0, 2), arr);
        assert!(!nested.is_basic());
    }

    #[test]
    fn test_soft_eq_ignores_bounds() {
        let a = Schema::int(false, 0, 10, true);
        let b = Schema::int(true, 5, 500, false);
        assert!(a.soft_eq(&b));
        assert!(!a.soft_eq(&Schema::str_(false, None, false)));

        let arr_a = Schema::array(false, LenRange::new(0, 1), a);
        let dict = Schema::dict(
            false,
            LenRange::new(0, 1),
            Schema::int(false, 0, 10, false),
        );
        assert!(!arr_a.soft_eq(&dict));
    }

    #[test]
    fn test_find_field() {
        let schema = Schema::object(
            false,
            vec![FieldSchema {
                name: "id".into(),
                always_exists: true,
                schema: Schema::int(false, 0, 1, true),
            }],
        );
        assert!(schema.find_field("id").is_ok());
        assert!(matches!(
            schema.find_field("missing"),
            Err(CoreError::FieldNotFound(_))
        ));
        assert!(matches!(
            Schema::null().find_field("id"),
            Err(CoreError::SchemaShape { .. })
        ));
    }
}
