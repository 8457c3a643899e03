//! Bottom-up schema induction from value samples.

use std::collections::{BTreeSet, HashSet};

use crate::error::{CoreError, CoreResult};
use crate::schema::{FieldSchema, LenRange, Schema};
use crate::value::Value;

/// Infers a [`Schema`] from a sample of values.
///
/// Induction is pure and recursive: arrays recurse on the concatenation of
/// all elements, objects recurse per field. Objects with too many optional
/// fields (or too many fields overall) fall back to the `Dict` shape, which
/// bounds schema size for map-typed data such as per-ID dictionaries.
#[derive(Debug, Clone)]
pub struct SchemaInducer {
    /// Maximum count of fields that are absent from some sample before an
    /// object degrades to a dict.
    pub max_optional_fields: usize,
    /// Maximum total field count before an object degrades to a dict.
    pub max_fields: usize,
}

impl Default for SchemaInducer {
    fn default() -> Self {
        Self {
            max_optional_fields: 5,
            max_fields: 30,
        }
    }
}

/// Per-kind observation state accumulated over one sample scan.
#[derive(Default)]
struct Scan<'a> {
    has_null: bool,
    has_str: bool,
    has_int: bool,
    has_float: bool,
    has_bool: bool,
    has_bytes: bool,
    has_array: bool,
    has_object: bool,

    str_len: Option<LenRange>,
    bytes_len: Option<LenRange>,
    container_len: Option<LenRange>,

    int_min: Option<i64>,
    int_max: Option<i64>,
    num_min: Option<f64>,
    num_max: Option<f64>,

    saw_true: bool,
    saw_false: bool,

    seen_str: HashSet<&'a str>,
    dup_str: bool,
    seen_int: HashSet<i64>,
    dup_int: bool,
    seen_num: HashSet<u64>,
    dup_num: bool,
}

fn widen_len(range: &mut Option<LenRange>, len: usize) {
    match range {
        Some(r) => {
            r.min = r.min.min(len);
            r.max = r.max.max(len);
        }
        None => *range = Some(LenRange::new(len, len)),
    }
}

fn canonical_num_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

impl<'a> Scan<'a> {
    #[allow(clippy::cast_precision_loss)]
    fn observe(&mut self, value: &'a Value) {
        match value {
            Value::Null => self.has_null = true,
            Value::Str(s) => {
                self.has_str = true;
                widen_len(&mut self.str_len, s.chars().count());
                if !self.seen_str.insert(s) {
                    self.dup_str = true;
                }
            }
            Value::Int(i) => {
                self.has_int = true;
                self.int_min = Some(self.int_min.map_or(*i, |m| m.min(*i)));
                self.int_max = Some(self.int_max.map_or(*i, |m| m.max(*i)));
                let f = *i as f64;
                self.num_min = Some(self.num_min.map_or(f, |m| m.min(f)));
                self.num_max = Some(self.num_max.map_or(f, |m| m.max(f)));
                if !self.seen_int.insert(*i) {
                    self.dup_int = true;
                }
                // Cross-check the numeric set: Int(5) and Float(5.0) are
                // one value for uniqueness purposes.
                if !self.seen_num.insert(canonical_num_bits(f)) {
                    self.dup_num = true;
                }
            }
            Value::Float(f) => {
                self.has_float = true;
                self.num_min = Some(self.num_min.map_or(*f, |m| m.min(*f)));
                self.num_max = Some(self.num_max.map_or(*f, |m| m.max(*f)));
                if !self.seen_num.insert(canonical_num_bits(*f)) {
                    self.dup_num = true;
                }
            }
            Value::Bool(b) => {
                self.has_bool = true;
                if *b {
                    self.saw_true = true;
                } else {
                    self.saw_false = true;
                }
            }
            Value::Bytes(b) => {
                self.has_bytes = true;
                widen_len(&mut self.bytes_len, b.len());
            }
            Value::Array(items) => {
                self.has_array = true;
                widen_len(&mut self.container_len, items.len());
            }
            Value::Object(map) => {
                self.has_object = true;
                widen_len(&mut self.container_len, map.len());
            }
        }
    }

    /// Two non-null kinds are compatible only when both are numeric.
    fn has_conflict(&self) -> bool {
        let kinds = [
            self.has_str,
            self.has_bool,
            self.has_bytes,
            self.has_array,
            self.has_object,
            self.has_int || self.has_float,
        ];
        kinds.iter().filter(|present| **present).count() > 1
    }
}

impl SchemaInducer {
    /// Creates an inducer with explicit object-to-dict fallback caps.
    #[must_use]
    pub const fn new(max_optional_fields: usize, max_fields: usize) -> Self {
        Self {
            max_optional_fields,
            max_fields,
        }
    }

    /// Induces a schema from a sample of values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptySample`] for an empty sample; this is a
    /// caller contract violation, not a data error.
    pub fn induce(&self, values: &[Value]) -> CoreResult<Schema> {
        let refs: Vec<&Value> = values.iter().collect();
        self.induce_refs(&refs)
    }

    fn induce_refs(&self, values: &[&Value]) -> CoreResult<Schema> {
        if values.is_empty() {
            return Err(CoreError::EmptySample);
        }

        let mut scan = Scan::default();
        for value in values {
            scan.observe(value);
        }

        if scan.has_conflict() {
            return Ok(Schema::unknown(scan.has_null));
        }

        if scan.has_str {
            let len = scan.str_len.expect("string observed");
            return Ok(Schema::str_(scan.has_null, Some(len), !scan.dup_str));
        }
        if scan.has_bytes {
            let len = scan.bytes_len.expect("bytes observed");
            return Ok(Schema::bytes(scan.has_null, len));
        }
        if scan.has_float {
            // Int and Float co-occurring widen to Float with merged bounds.
            let min = scan.num_min.expect("float observed");
            let max = scan.num_max.expect("float observed");
            return Ok(Schema::float(scan.has_null, min, max, !scan.dup_num));
        }
        if scan.has_int {
            let min = scan.int_min.expect("int observed");
            let max = scan.int_max.expect("int observed");
            return Ok(Schema::int(scan.has_null, min, max, !scan.dup_int));
        }
        if scan.has_bool {
            return Ok(Schema::bool_(scan.has_null, scan.saw_false, scan.saw_true));
        }
        if scan.has_array {
            return self.induce_array(values, &scan);
        }
        if scan.has_object {
            return self.induce_object(values, &scan);
        }

        debug_assert!(scan.has_null);
        Ok(Schema::null())
    }

    fn induce_array(&self, values: &[&Value], scan: &Scan<'_>) -> CoreResult<Schema> {
        let mut elements: Vec<&Value> = Vec::new();
        for value in values {
            if let Value::Array(items) = value {
                elements.extend(items.iter());
            }
        }

        let element = if elements.is_empty() {
            Schema::unknown(false)
        } else {
            self.induce_refs(&elements)?
        };

        let len = scan.container_len.expect("array observed");
        Ok(Schema::array(scan.has_null, len, element))
    }

    fn induce_object(&self, values: &[&Value], scan: &Scan<'_>) -> CoreResult<Schema> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for value in values {
            if let Value::Object(map) = value {
                names.extend(map.keys().map(String::as_str));
            }
        }

        let mut optional = 0usize;
        for name in &names {
            let always = values.iter().all(|v| match v {
                Value::Object(map) => map.contains_key(*name),
                _ => true,
            });
            if !always {
                optional += 1;
            }
        }

        if optional > self.max_optional_fields || names.len() > self.max_fields {
            // Map-typed data: model keys as data and recurse over all values.
            let mut entry_values: Vec<&Value> = Vec::new();
            for value in values {
                if let Value::Object(map) = value {
                    entry_values.extend(map.values());
                }
            }
            let value_schema = self.induce_refs(&entry_values)?;
            let len = scan.container_len.expect("object observed");
            return Ok(Schema::dict(scan.has_null, len, value_schema));
        }

        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let mut field_values: Vec<&Value> = Vec::new();
            let mut always_exists = true;
            for value in values {
                if let Value::Object(map) = value {
                    match map.get(name) {
                        Some(v) => field_values.push(v),
                        None => always_exists = false,
                    }
                }
            }
            fields.push(FieldSchema {
                name: name.to_owned(),
                always_exists,
                schema: self.induce_refs(&field_values)?,
            });
        }

        Ok(Schema::object(scan.has_null, fields))
    }
}
