//! Literal values.
//!
//! [`Value`] is the literal type of the predicate language and the type the
//! in-memory evaluator works on. It converts losslessly to and from
//! `serde_json::Value`, which is what travels over the wire.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::utils::error::{Error, QueryError, QueryErrorKind, Result};

/// A literal value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// JSON `null`.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int64(i64),
    /// A floating point number.
    Float64(f64),
    /// A string.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// An object, keys kept in insertion order.
    Map(IndexMap<String, Value>),
}

/// JSON type tags as understood by the `$type` selector operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean,
    /// Any number.
    Number,
    /// A string.
    String,
    /// An array.
    Array,
    /// An object.
    Object,
}

impl JsonType {
    /// Returns the wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }

    /// Parses a wire type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "null" => Some(JsonType::Null),
            "boolean" => Some(JsonType::Boolean),
            "number" => Some(JsonType::Number),
            "string" => Some(JsonType::String),
            "array" => Some(JsonType::Array),
            "object" => Some(JsonType::Object),
            _ => None,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Returns the name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Returns the JSON type of this value.
    pub fn json_type(&self) -> JsonType {
        match self {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Int64(_) | Value::Float64(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::List(_) => JsonType::Array,
            Value::Map(_) => JsonType::Object,
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is an `Int64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float, if this is any number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the items, if this is a `List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a key, if this is a `Map`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Converts into a `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        self.clone().into()
    }

    /// Compares two values using the document database collation order:
    /// `null < false < true < numbers < strings < arrays < objects`.
    ///
    /// Numbers compare numerically regardless of representation.
    pub fn collate(&self, other: &Value) -> Ordering {
        let rank = |v: &Value| -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int64(_) | Value::Float64(_) => 2,
                Value::String(_) => 3,
                Value::List(_) => 4,
                Value::Map(_) => 5,
            }
        };

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (a, b) if rank(a) == 2 && rank(b) == 2 => {
                let a = a.as_f64().unwrap_or(0.0);
                let b = b.as_f64().unwrap_or(0.0);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.collate(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b) {
                    let ord = ka.cmp(kb).then_with(|| va.collate(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    /// Equality under collation: `1 == 1.0`.
    pub fn collates_equal(&self, other: &Value) -> bool {
        self.collate(other) == Ordering::Equal
    }

    /// Adds two values. Strings concatenate; numbers promote to float when mixed.
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Int64(a), Value::Int64(b)) => a
                .checked_add(*b)
                .map(Value::Int64)
                .ok_or_else(|| overflow("+")),
            _ => self.float_op(other, "+", |a, b| a + b),
        }
    }

    /// Subtracts `other` from this value.
    pub fn sub(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int64(a), Value::Int64(b)) => a
                .checked_sub(*b)
                .map(Value::Int64)
                .ok_or_else(|| overflow("-")),
            _ => self.float_op(other, "-", |a, b| a - b),
        }
    }

    /// Multiplies two values.
    pub fn mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int64(a), Value::Int64(b)) => a
                .checked_mul(*b)
                .map(Value::Int64)
                .ok_or_else(|| overflow("*")),
            _ => self.float_op(other, "*", |a, b| a * b),
        }
    }

    /// Divides this value by `other`. Integer division by zero is an error.
    pub fn div(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int64(_), Value::Int64(0)) => Err(division_by_zero()),
            (Value::Int64(a), Value::Int64(b)) => Ok(Value::Int64(a.wrapping_div(*b))),
            _ => self.float_op(other, "/", |a, b| a / b),
        }
    }

    /// Remainder of dividing this value by `other`.
    pub fn rem(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int64(_), Value::Int64(0)) => Err(division_by_zero()),
            (Value::Int64(a), Value::Int64(b)) => Ok(Value::Int64(a.wrapping_rem(*b))),
            _ => self.float_op(other, "%", |a, b| a % b),
        }
    }

    /// Numeric negation.
    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Int64(i) => i
                .checked_neg()
                .map(Value::Int64)
                .ok_or_else(|| overflow("-")),
            Value::Float64(f) => Ok(Value::Float64(-f)),
            other => Err(type_error("-", other, other)),
        }
    }

    fn float_op(&self, other: &Value, op: &str, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float64(f(a, b))),
            _ => Err(type_error(op, self, other)),
        }
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> Error {
    Error::Query(QueryError::new(
        QueryErrorKind::InvalidQuery,
        format!(
            "cannot apply `{op}` to {} and {}",
            left.type_name(),
            right.type_name()
        ),
    ))
}

fn overflow(op: &str) -> Error {
    Error::Query(QueryError::new(
        QueryErrorKind::InvalidQuery,
        format!("integer overflow in `{op}`"),
    ))
}

fn division_by_zero() -> Error {
    Error::Query(QueryError::new(
        QueryErrorKind::InvalidQuery,
        "division by zero",
    ))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int64(i),
                None => Value::Float64(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int64(i) => serde_json::Value::from(i),
            Value::Float64(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int64(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
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

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion_keeps_number_kinds() {
        assert_eq!(Value::from(json!(5)), Value::Int64(5));
        assert_eq!(Value::from(json!(5.5)), Value::Float64(5.5));
        assert_eq!(Value::Float64(2.0).to_json(), json!(2.0));
        assert_eq!(Value::Int64(2).to_json(), json!(2));
    }

    #[test]
    fn test_json_conversion_keeps_key_order() {
        let json = json!({"zeta": 1, "alpha": 2});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json().to_string(), json.to_string());
    }

    #[test]
    fn test_collation_order() {
        let ordered = [
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Int64(-3),
            Value::Float64(2.5),
            Value::Int64(10),
            Value::from("a"),
            Value::from("b"),
            Value::from(vec![1]),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(pair[0].collate(&pair[1]), Ordering::Less, "{pair:?}");
        }
        assert!(Value::Int64(1).collates_equal(&Value::Float64(1.0)));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(Value::Int64(10).add(&Value::Int64(5)).unwrap(), Value::Int64(15));
        assert_eq!(
            Value::Int64(1).add(&Value::Float64(0.5)).unwrap(),
            Value::Float64(1.5)
        );
        assert_eq!(
            Value::from("Sky").add(&Value::from("walker")).unwrap(),
            Value::from("Skywalker")
        );
        assert_eq!(Value::Int64(7).rem(&Value::Int64(2)).unwrap(), Value::Int64(1));
        assert_eq!(Value::Int64(3).neg().unwrap(), Value::Int64(-3));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert!(Value::Int64(1).div(&Value::Int64(0)).is_err());
        assert!(Value::from("a").sub(&Value::Int64(1)).is_err());
        assert!(Value::Int64(i64::MAX).add(&Value::Int64(1)).is_err());
    }

    #[test]
    fn test_serde_untagged_shape() {
        let value: Value = serde_json::from_str(r#"["Luke", 19, true, null]"#).unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::from("Luke"),
                Value::Int64(19),
                Value::Bool(true),
                Value::Null
            ])
        );
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"["Luke",19,true,null]"#);
    }

    #[test]
    fn test_json_type_names() {
        assert_eq!(Value::from("x").json_type().as_str(), "string");
        assert_eq!(JsonType::parse("array"), Some(JsonType::Array));
        assert_eq!(JsonType::parse("date"), None);
    }
}
