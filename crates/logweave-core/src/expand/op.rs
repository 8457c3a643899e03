//! The closed set of expansion operators.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::schema::{LenRange, Schema, SchemaKind};
use crate::value::Value;

/// One expansion step from a nested column to a flatter derived column.
///
/// Each variant drives *both* transforms — [`apply`](Self::apply) for
/// values and [`derive_schema`](Self::derive_schema) for schemas — so the
/// two can never drift apart, and [`suffix`](Self::suffix) encodes the
/// step into the derived column's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpandOp {
    /// Element at a fixed index of an array; null when the array is short.
    ArrayIdx(usize),
    /// Element count of an array.
    ArrayLen,
    /// Concatenation of an array of arrays (null sub-arrays pass through
    /// as single null elements).
    ArrayFlatten,
    /// Per-element field projection over an array of objects.
    ArrayExpand(String),
    /// Per-element field-presence flags over an array of objects.
    ArrayExpandExists(String),
    /// Field projection out of an object; null when absent.
    ObjectExpand(String),
    /// Presence flag for an object field.
    ObjectFieldExists(String),
    /// Key list of a dict.
    DictKey,
    /// Value list of a dict.
    DictValue,
    /// Per-element key lists over an array of dicts.
    ArrayDictKey,
    /// Per-element value lists over an array of dicts.
    ArrayDictValue,
}

fn expect_array(value: &Value) -> CoreResult<&[Value]> {
    value.as_array().ok_or(CoreError::ValueKind {
        expected: "array",
        got: value.kind_name(),
    })
}

fn expect_object(value: &Value) -> CoreResult<&std::collections::BTreeMap<String, Value>> {
    value.as_object().ok_or(CoreError::ValueKind {
        expected: "object",
        got: value.kind_name(),
    })
}

impl ExpandOp {
    /// Name suffix encoding this step, appended to the parent column name.
    #[must_use]
    pub fn suffix(&self) -> String {
        match self {
            Self::ArrayIdx(idx) => format!("[{idx}]"),
            Self::ArrayLen => "#length".into(),
            Self::ArrayFlatten => "#flatten".into(),
            Self::ArrayExpand(field) => format!("[].{field}"),
            Self::ArrayExpandExists(field) => format!("[].{field}#exists"),
            Self::ObjectExpand(field) => format!(".{field}"),
            Self::ObjectFieldExists(field) => format!(".{field}#exists"),
            Self::DictKey => "#key".into(),
            Self::DictValue => "#value".into(),
            Self::ArrayDictKey => "[]#key".into(),
            Self::ArrayDictValue => "[]#value".into(),
        }
    }

    /// Null-propagating value transform: null in, null out.
    pub fn apply_nullable(&self, value: &Value) -> CoreResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        self.apply(value)
    }

    /// Row-wise value transform for a non-null input.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValueKind`] when the value does not have the
    /// kind this operator consumes — a contract violation, since operators
    /// are only derived for matching schemas.
    #[allow(clippy::cast_possible_wrap)]
    pub fn apply(&self, value: &Value) -> CoreResult<Value> {
        match self {
            Self::ArrayIdx(idx) => {
                let items = expect_array(value)?;
                Ok(items.get(*idx).cloned().unwrap_or(Value::Null))
            }
            Self::ArrayLen => {
                let items = expect_array(value)?;
                Ok(Value::Int(items.len() as i64))
            }
            Self::ArrayFlatten => {
                let items = expect_array(value)?;
                let mut flat = Vec::new();
                for item in items {
                    if item.is_null() {
                        flat.push(Value::Null);
                    } else {
                        flat.extend_from_slice(expect_array(item)?);
                    }
                }
                Ok(Value::Array(flat))
            }
            Self::ArrayExpand(field) => {
                let items = expect_array(value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        out.push(Value::Null);
                    } else {
                        out.push(expect_object(item)?.get(field).cloned().unwrap_or(Value::Null));
                    }
                }
                Ok(Value::Array(out))
            }
            Self::ArrayExpandExists(field) => {
                let items = expect_array(value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        out.push(Value::Null);
                    } else {
                        out.push(Value::Bool(expect_object(item)?.contains_key(field)));
                    }
                }
                Ok(Value::Array(out))
            }
            Self::ObjectExpand(field) => {
                let map = expect_object(value)?;
                Ok(map.get(field).cloned().unwrap_or(Value::Null))
            }
            Self::ObjectFieldExists(field) => {
                let map = expect_object(value)?;
                Ok(Value::Bool(map.contains_key(field)))
            }
            Self::DictKey => {
                let map = expect_object(value)?;
                Ok(Value::Array(
                    map.keys().map(|k| Value::Str(k.clone())).collect(),
                ))
            }
            Self::DictValue => {
                let map = expect_object(value)?;
                Ok(Value::Array(map.values().cloned().collect()))
            }
            Self::ArrayDictKey => {
                let items = expect_array(value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        out.push(Value::Null);
                    } else {
                        out.push(Value::Array(
                            expect_object(item)?
                                .keys()
                                .map(|k| Value::Str(k.clone()))
                                .collect(),
                        ));
                    }
                }
                Ok(Value::Array(out))
            }
            Self::ArrayDictValue => {
                let items = expect_array(value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        out.push(Value::Null);
                    } else {
                        out.push(Value::Array(expect_object(item)?.values().cloned().collect()));
                    }
                }
                Ok(Value::Array(out))
            }
        }
    }

    /// Schema transform matching [`apply`](Self::apply).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaShape`] when the parent schema does not
    /// have the shape this operator consumes.
    #[allow(clippy::cast_possible_wrap, clippy::too_many_lines)]
    pub fn derive_schema(&self, schema: &Schema) -> CoreResult<Schema> {
        let shape_err = |expected: &'static str| CoreError::SchemaShape {
            expected,
            got: schema.kind_name(),
        };

        match self {
            Self::ArrayIdx(_) => {
                let SchemaKind::Array { element, .. } = &schema.kind else {
                    return Err(shape_err("array"));
                };
                Ok(element.or_nullable(schema.nullable))
            }
            Self::ArrayLen => {
                let SchemaKind::Array { len, .. } = &schema.kind else {
                    return Err(shape_err("array"));
                };
                Ok(Schema {
                    kind: SchemaKind::Int {
                        min: len.min as i64,
                        max: len.max as i64,
                    },
                    nullable: schema.nullable,
                    unique: false,
                })
            }
            Self::ArrayFlatten => {
                let SchemaKind::Array { len, element } = &schema.kind else {
                    return Err(shape_err("array"));
                };
                let SchemaKind::Array {
                    len: inner_len,
                    element: inner_element,
                } = &element.kind
                else {
                    return Err(shape_err("array of arrays"));
                };
                // Null sub-arrays contribute a single null element, so the
                // lower bound only multiplies when sub-arrays cannot be null.
                let min = if element.nullable {
                    0
                } else {
                    len.min * inner_len.min
                };
                Ok(Schema {
                    kind: SchemaKind::Array {
                        len: LenRange::new(min, len.max * inner_len.max),
                        element: inner_element.clone(),
                    },
                    nullable: element.nullable || schema.nullable,
                    unique: false,
                })
            }
            Self::ArrayExpand(field) => {
                let SchemaKind::Array { len, element } = &schema.kind else {
                    return Err(shape_err("array of objects"));
                };
                let field_schema = element.find_field(field)?.schema.clone();
                Ok(Schema::array(
                    schema.nullable,
                    *len,
                    field_schema.or_nullable(element.nullable),
                ))
            }
            Self::ArrayExpandExists(field) => {
                let SchemaKind::Array { len, element } = &schema.kind else {
                    return Err(shape_err("array of objects"));
                };
                element.find_field(field)?;
                Ok(Schema::array(
                    schema.nullable,
                    *len,
                    Schema::bool_(element.nullable, true, true),
                ))
            }
            Self::ObjectExpand(field) => {
                let field_schema = schema.find_field(field)?.schema.clone();
                Ok(field_schema.or_nullable(schema.nullable))
            }
            Self::ObjectFieldExists(field) => {
                schema.find_field(field)?;
                Ok(Schema::bool_(schema.nullable, true, true))
            }
            Self::DictKey => {
                let SchemaKind::Dict { len, .. } = &schema.kind else {
                    return Err(shape_err("dict"));
                };
                Ok(Schema::array(
                    schema.nullable,
                    *len,
                    Schema::str_(schema.nullable, None, true),
                ))
            }
            Self::DictValue => {
                let SchemaKind::Dict { len, value } = &schema.kind else {
                    return Err(shape_err("dict"));
                };
                Ok(Schema::array(schema.nullable, *len, (**value).clone()))
            }
            Self::ArrayDictKey => {
                let SchemaKind::Array { len, element } = &schema.kind else {
                    return Err(shape_err("array of dicts"));
                };
                let SchemaKind::Dict { len: dict_len, .. } = &element.kind else {
                    return Err(shape_err("array of dicts"));
                };
                Ok(Schema::array(
                    schema.nullable,
                    *len,
                    Schema::array(
                        element.nullable,
                        *dict_len,
                        Schema::str_(element.nullable, None, true),
                    ),
                ))
            }
            Self::ArrayDictValue => {
                let SchemaKind::Array { len, element } = &schema.kind else {
                    return Err(shape_err("array of dicts"));
                };
                let SchemaKind::Dict {
                    len: dict_len,
                    value,
                } = &element.kind
                else {
                    return Err(shape_err("array of dicts"));
                };
                Ok(Schema::array(
                    schema.nullable,
                    *len,
                    Schema::array(element.nullable, *dict_len, (**value).clone()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(json: &str) -> Value {
        Value::from(serde_json::from_str::<serde_json::Value>(json).unwrap())
    }

    #[test]
    fn test_suffixes_encode_access_paths() {
        assert_eq!(ExpandOp::ObjectExpand("id".into()).suffix(), ".id");
        assert_eq!(ExpandOp::ArrayExpand("id".into()).suffix(), "[].id");
        assert_eq!(ExpandOp::ArrayIdx(3).suffix(), "[3]");
        assert_eq!(ExpandOp::ArrayLen.suffix(), "#length");
        assert_eq!(ExpandOp::ArrayFlatten.suffix(), "#flatten");
        assert_eq!(
            ExpandOp::ObjectFieldExists("x".into()).suffix(),
            ".x#exists"
        );
        assert_eq!(ExpandOp::DictKey.suffix(), "#key");
        assert_eq!(ExpandOp::ArrayDictValue.suffix(), "[]#value");
    }

    #[test]
    fn test_null_propagates() {
        let op = ExpandOp::ObjectExpand("id".into());
        assert_eq!(op.apply_nullable(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_object_expand() {
        let op = ExpandOp::ObjectExpand("id".into());
        assert_eq!(op.apply(&v(r#"{"id": 7}"#)).unwrap(), Value::Int(7));
        assert_eq!(op.apply(&v(r#"{"other": 7}"#)).unwrap(), Value::Null);
        assert!(op.apply(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_array_idx_short_is_null() {
        let op = ExpandOp::ArrayIdx(2);
        assert_eq!(op.apply(&v("[10, 20, 30]")).unwrap(), Value::Int(30));
        assert_eq!(op.apply(&v("[10]")).unwrap(), Value::Null);
    }

    #[test]
    fn test_array_len() {
        assert_eq!(ExpandOp::ArrayLen.apply(&v("[1, 2]")).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_array_flatten_null_aware() {
        let op = ExpandOp::ArrayFlatten;
        assert_eq!(
            op.apply(&v("[[1, 2], null, [3]]")).unwrap(),
            v("[1, 2, null, 3]")
        );
    }

    #[test]
    fn test_array_expand_and_exists() {
        let input = v(r#"[{"id": 1}, null, {"other": 2}]"#);
        assert_eq!(
            ExpandOp::ArrayExpand("id".into()).apply(&input).unwrap(),
            v("[1, null, null]")
        );
        assert_eq!(
            ExpandOp::ArrayExpandExists("id".into())
                .apply(&input)
                .unwrap(),
            v("[true, null, false]")
        );
    }

    #[test]
    fn test_dict_key_value() {
        let input = v(r#"{"b": 2, "a": 1}"#);
        assert_eq!(ExpandOp::DictKey.apply(&input).unwrap(), v(r#"["a", "b"]"#));
        assert_eq!(ExpandOp::DictValue.apply(&input).unwrap(), v("[1, 2]"));
    }

    #[test]
    fn test_schema_object_expand_widens_nullability() {
        let schema = Schema::object(
            true,
            vec![crate::schema::FieldSchema {
                name: "id".into(),
                always_exists: true,
                schema: Schema::int(false, 1, 9, true),
            }],
        );
        let derived = ExpandOp::ObjectExpand("id".into())
            .derive_schema(&schema)
            .unwrap();
        assert!(derived.nullable);
        assert_eq!(derived.kind, SchemaKind::Int { min: 1, max: 9 });
    }

    #[test]
    fn test_schema_array_len_bounds_become_value_bounds() {
        let schema = Schema::array(false, LenRange::new(2, 5), Schema::int(false, 0, 1, false));
        let derived = ExpandOp::ArrayLen.derive_schema(&schema).unwrap();
        assert_eq!(derived.kind, SchemaKind::Int { min: 2, max: 5 });
        assert!(!derived.unique);
    }

    #[test]
    fn test_schema_flatten_length_arithmetic() {
        let inner = Schema::array(false, LenRange::new(1, 3), Schema::int(false, 0, 9, false));
        let outer = Schema::array(false, LenRange::new(2, 4), inner);
        let derived = ExpandOp::ArrayFlatten.derive_schema(&outer).unwrap();
        let SchemaKind::Array { len, .. } = derived.kind else {
            panic!("expected array");
        };
        assert_eq!(len, LenRange::new(2, 12));

        // Nullable sub-arrays zero the lower bound.
        let inner = Schema::array(true, LenRange::new(1, 3), Schema::int(false, 0, 9, false));
        let outer = Schema::array(false, LenRange::new(2, 4), inner);
        let derived = ExpandOp::ArrayFlatten.derive_schema(&outer).unwrap();
        let SchemaKind::Array { len, .. } = derived.kind else {
            panic!("expected array");
        };
        assert_eq!(len.min, 0);
    }

    #[test]
    fn test_schema_shape_mismatch() {
        let err = ExpandOp::DictKey.derive_schema(&Schema::null());
        assert!(matches!(err, Err(CoreError::SchemaShape { .. })));
    }

    #[test]
    fn test_value_and_schema_transforms_agree() {
        // For each op applied to a representative column, the derived
        // schema must accept every derived value.
        let values = [
            v(r#"[{"id": 1, "tag": "a"}, {"id": 2, "tag": "b"}]"#),
            v(r#"[{"id": 3, "tag": "c"}]"#),
            Value::Null,
        ];
        let schema = crate::schema::SchemaInducer::default()
            .induce(&values)
            .unwrap();

        for op in [
            ExpandOp::ArrayLen,
            ExpandOp::ArrayIdx(0),
            ExpandOp::ArrayIdx(1),
            ExpandOp::ArrayExpand("id".into()),
            ExpandOp::ArrayExpandExists("tag".into()),
        ] {
            let derived_schema = op.derive_schema(&schema).unwrap();
            for value in &values {
                let derived = op.apply_nullable(value).unwrap();
                assert!(
                    derived_schema.accepts(&derived),
                    "{op:?} produced {derived:?} rejected by {derived_schema:?}"
                );
            }
        }
    }
}
