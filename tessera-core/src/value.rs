//! Attribute values and the casting rules that canonicalize raw storage data.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single attribute value as held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
        }
    }
}

/// Canonical text rendering. Booleans render as `1`/`0` and null as the
/// empty string, which is also the form used when building cache keys.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => f.write_str("1"),
            Value::Bool(false) => f.write_str("0"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// The closed set of attribute kinds. Each kind has one canonical in-memory
/// representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Boolean,
    Integer,
    Float,
    String,
    /// Text constrained to a fixed option set.
    Enumeration(Vec<String>),
}

impl ValueKind {
    /// The value a non-nullable attribute takes when storage hands back null.
    fn zero(&self) -> Value {
        match self {
            ValueKind::Boolean => Value::Bool(false),
            ValueKind::Integer => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::String | ValueKind::Enumeration(_) => Value::Text(String::new()),
        }
    }

    /// Render an enumeration option set the way storage reports it, e.g.
    /// `enum('active','inactive')`. Returns `None` for other kinds.
    pub fn enum_type_string(&self) -> Option<String> {
        match self {
            ValueKind::Enumeration(options) => {
                let quoted: Vec<String> = options
                    .iter()
                    .map(|o| format!("'{}'", o.replace('\'', "''")))
                    .collect();
                Some(format!("enum({})", quoted.join(",")))
            }
            _ => None,
        }
    }
}

/// Cast a raw storage value to the canonical representation for `kind`.
///
/// Null is passed through untouched for nullable attributes. With `strict`
/// set, values that cannot be represented (unparsable numbers, enumeration
/// values outside the option set) fail with a [`SchemaError`]; otherwise they
/// are coerced.
pub fn cast_value(
    attribute: &str,
    kind: &ValueKind,
    nullable: bool,
    raw: Value,
    strict: bool,
) -> Result<Value, SchemaError> {
    let raw = match raw {
        Value::Null if nullable => return Ok(Value::Null),
        Value::Null => kind.zero(),
        other => other,
    };

    match kind {
        ValueKind::Boolean => Ok(Value::Bool(cast_boolean(&raw))),
        ValueKind::Integer => cast_integer(attribute, raw, strict).map(Value::Int),
        ValueKind::Float => cast_float(attribute, raw, strict).map(Value::Float),
        ValueKind::String => Ok(Value::Text(raw.to_string())),
        ValueKind::Enumeration(options) => cast_enumeration(attribute, options, raw, strict),
    }
}

fn cast_boolean(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Text(s) => {
            let s = s.trim().to_ascii_lowercase();
            !matches!(s.as_str(), "" | "0" | "false" | "off" | "no")
        }
    }
}

fn cast_integer(attribute: &str, raw: Value, strict: bool) -> Result<i64, SchemaError> {
    match raw {
        Value::Null => Ok(0),
        Value::Bool(b) => Ok(b as i64),
        Value::Int(i) => Ok(i),
        Value::Float(f) => integer_from_float(attribute, f, strict),
        Value::Text(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(i);
            }
            match trimmed.parse::<f64>() {
                Ok(f) => integer_from_float(attribute, f, strict),
                Err(_) if strict => Err(SchemaError::InvalidValue {
                    attribute: attribute.to_string(),
                    reason: format!("'{}' is not an integer", s),
                }),
                Err(_) => Ok(0),
            }
        }
    }
}

/// Truncate toward zero. Values outside the `i64` range (and non-finite
/// ones) are rejected when strict and become 0 otherwise.
fn integer_from_float(attribute: &str, f: f64, strict: bool) -> Result<i64, SchemaError> {
    let truncated = f.trunc();
    // i64::MAX is not representable; 2^63 is the first value past it
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < 9_223_372_036_854_775_808.0 {
        return Ok(truncated as i64);
    }
    if strict {
        return Err(SchemaError::InvalidValue {
            attribute: attribute.to_string(),
            reason: format!("{} is out of integer range", f),
        });
    }
    Ok(0)
}

fn cast_float(attribute: &str, raw: Value, strict: bool) -> Result<f64, SchemaError> {
    match raw {
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::Int(i) => Ok(i as f64),
        Value::Float(f) => Ok(f),
        Value::Text(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(f),
            _ if strict => Err(SchemaError::InvalidValue {
                attribute: attribute.to_string(),
                reason: format!("'{}' is not a number", s),
            }),
            _ => Ok(0.0),
        },
    }
}

fn cast_enumeration(
    attribute: &str,
    options: &[String],
    raw: Value,
    strict: bool,
) -> Result<Value, SchemaError> {
    let text = raw.to_string();
    if strict && !options.iter().any(|o| *o == text) {
        return Err(SchemaError::EnumOutOfRange {
            attribute: attribute.to_string(),
            value: text,
            options: options.to_vec(),
        });
    }
    Ok(Value::Text(text))
}
