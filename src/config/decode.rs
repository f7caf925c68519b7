//! Typed decoding of opaque adapter params.
//!
//! Adapter params arrive as loosely-typed YAML (`serde_yaml::Value`). Each
//! builder declares a [`ConfigSchema`]; [`decode`] maps the value onto it and
//! produces [`TypedParams`], a value with structural equality that doubles as
//! the checker cache key.
//!
//! # Design Decisions
//! - Key lookup is case-insensitive (`providerurl` matches `ProviderURL`)
//! - Unknown keys are ignored
//! - Type errors and missing required fields are reported separately, and
//!   every occurrence is collected rather than stopping at the first one
//! - Missing paths use dotted declared names, e.g. `Flist.Wl`

use std::collections::BTreeMap;

use serde_yaml::Value;
use thiserror::Error;

/// Value type of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Int,
    Bool,
    StringList,
    Struct(ConfigSchema),
}

impl FieldKind {
    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Bool => "bool",
            FieldKind::StringList => "[]string",
            FieldKind::Struct(_) => "struct",
        }
    }
}

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<TypedValue>,
}

/// Declared shape of an adapter's params.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSchema {
    fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an optional field.
    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
            default: None,
        });
        self
    }

    /// Adds a field that must be present in the input.
    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: true,
            default: None,
        });
        self
    }

    /// Adds an optional field that falls back to `default` when absent.
    pub fn with_default(mut self, name: &'static str, kind: FieldKind, default: TypedValue) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
            default: Some(default),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypedValue {
    String(String),
    Int(i64),
    Bool(bool),
    StringList(Vec<String>),
    Struct(TypedParams),
}

/// Decoded params keyed by declared field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypedParams {
    values: BTreeMap<String, TypedValue>,
}

impl TypedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: TypedValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(TypedValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(TypedValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(TypedValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(TypedValue::StringList(l)) => Some(l),
            _ => None,
        }
    }

    pub fn get_struct(&self, name: &str) -> Option<&TypedParams> {
        match self.values.get(name) {
            Some(TypedValue::Struct(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Why an opaque value could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fields were present but held values of the wrong type.
    #[error("{} error(s) decoding:\n\n{}", .errors.len(), bullet_list(.errors))]
    Type { errors: Vec<String> },

    /// Required fields were absent.
    #[error("Missing {}", .missing.join(","))]
    Missing { missing: Vec<String> },
}

fn bullet_list(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("* {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl DecodeError {
    /// Required paths that were absent. Empty for type errors.
    pub fn missing(&self) -> &[String] {
        match self {
            DecodeError::Missing { missing } => missing,
            DecodeError::Type { .. } => &[],
        }
    }
}

/// Decodes `src` against `schema`. A null `src` is treated as an empty map.
pub fn decode(src: &Value, schema: &ConfigSchema) -> Result<TypedParams, DecodeError> {
    let mut walk = Walk::default();
    let params = match src {
        Value::Null => walk.fields(&Value::Null, schema, &[]),
        Value::Mapping(_) => walk.fields(src, schema, &[]),
        other => {
            walk.type_errors.push(format!(
                "'' expected a map, got unconvertible type '{}'",
                found_type(other)
            ));
            TypedParams::new()
        }
    };

    if !walk.type_errors.is_empty() {
        return Err(DecodeError::Type {
            errors: walk.type_errors,
        });
    }
    if !walk.missing.is_empty() {
        tracing::debug!(missing = ?walk.missing, "Required adapter params missing");
        return Err(DecodeError::Missing {
            missing: walk.missing,
        });
    }
    Ok(params)
}

#[derive(Default)]
struct Walk {
    type_errors: Vec<String>,
    missing: Vec<String>,
}

impl Walk {
    fn fields(&mut self, map: &Value, schema: &ConfigSchema, prefix: &[&str]) -> TypedParams {
        let mut out = TypedParams::new();
        for spec in schema.fields() {
            let mut path: Vec<&str> = prefix.to_vec();
            path.push(spec.name);
            let dotted = path.join(".");

            match lookup(map, spec.name) {
                Some(value) => {
                    if let Some(typed) = self.value(value, &spec.kind, &path, &dotted) {
                        out.insert(spec.name, typed);
                    }
                }
                None => {
                    if spec.required {
                        self.missing.push(dotted);
                    }
                    if let Some(default) = &spec.default {
                        out.insert(spec.name, default.clone());
                    } else if let FieldKind::Struct(nested) = &spec.kind {
                        // nested required fields are still reported
                        let inner = self.fields(&Value::Null, nested, &path);
                        out.insert(spec.name, TypedValue::Struct(inner));
                    }
                }
            }
        }
        out
    }

    fn value(&mut self, value: &Value, kind: &FieldKind, path: &[&str], dotted: &str) -> Option<TypedValue> {
        match (kind, value) {
            (FieldKind::String, Value::String(s)) => Some(TypedValue::String(s.clone())),
            (FieldKind::Int, Value::Number(n)) if n.as_i64().is_some() => {
                n.as_i64().map(TypedValue::Int)
            }
            (FieldKind::Bool, Value::Bool(b)) => Some(TypedValue::Bool(*b)),
            (FieldKind::StringList, Value::Sequence(items)) => {
                let mut list = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => list.push(s.clone()),
                        other => self.type_errors.push(format!(
                            "'{dotted}[{i}]' expected type 'string', got unconvertible type '{}'",
                            found_type(other)
                        )),
                    }
                }
                Some(TypedValue::StringList(list))
            }
            (FieldKind::Struct(nested), Value::Mapping(_)) => {
                Some(TypedValue::Struct(self.fields(value, nested, path)))
            }
            (kind, other) => {
                self.type_errors.push(format!(
                    "'{dotted}' expected type '{}', got unconvertible type '{}'",
                    kind.type_name(),
                    found_type(other)
                ));
                None
            }
        }
    }
}

/// Case-insensitive key lookup. Null values count as absent.
fn lookup<'a>(map: &'a Value, name: &str) -> Option<&'a Value> {
    let Value::Mapping(mapping) = map else {
        return None;
    };
    mapping.iter().find_map(|(key, value)| match key {
        Value::String(k) if k.eq_ignore_ascii_case(name) && !value.is_null() => Some(value),
        _ => None,
    })
}

fn found_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float64",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Sequence(_) => "[]interface {}",
        Value::Mapping(_) => "map",
        Value::Tagged(_) => "tagged",
    }
}
