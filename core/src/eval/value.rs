// Runtime value model: everything the evaluator computes with, including the
// insertion-ordered map and the failed-lookup sentinel.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::EvalErrorKind;
use crate::parser::ast::Node;

/// Key-value mapping that iterates in insertion order.
pub type LinearMap = IndexMap<String, Value>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(LinearMap),
    /// Result of a failed variable lookup. Carries the name and the reason so
    /// a later forced use can explain itself; until then it reads as false
    /// and prints as an empty string.
    Nil { name: String, reason: String },
    /// AST fragment bound into scope, used for mixin body expansion.
    Tree(Rc<Node>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Nil { .. } => "nil",
            Value::Tree(_) => "block",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Nil { .. } => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Tree(node) => !node.children.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Nil { .. })
    }

    /// Convert any serializable host value into the engine's value space.
    /// Integers widen to f64 on the way through.
    pub fn from_serialize<T: Serialize>(data: &T) -> Result<Value, serde_json::Error> {
        Ok(serde_json::to_value(data)?.into())
    }

    /// Back out to serde_json for the `json` built-in. Sentinels and block
    /// fragments serialise as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Nil { .. } | Value::Tree(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < i64::MAX as f64 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn as_number(&self) -> Result<f64, EvalErrorKind> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Nil { name, reason } => Err(EvalErrorKind::UndefinedVariable {
                name: name.clone(),
                reason: reason.clone(),
            }),
            other => Err(EvalErrorKind::Type(format!(
                "expecting a number, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Same-kind equality with numeric widening already applied; comparing a
    /// null or mixing kinds is an error rather than false.
    pub fn equals(&self, other: &Value) -> Result<bool, EvalErrorKind> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(a == b),
            (Value::String(a), Value::String(b)) => Ok(a == b),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (a, b) if a.is_null() || b.is_null() => Err(EvalErrorKind::Type(
                "invalid type for comparison, cannot compare a nil value".to_string(),
            )),
            _ => Err(EvalErrorKind::Type(
                "incompatible types for comparison".to_string(),
            )),
        }
    }

    /// Ordering for the relational operators: numbers and strings only.
    pub fn compare(&self, other: &Value) -> Result<std::cmp::Ordering, EvalErrorKind> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).ok_or_else(|| {
                EvalErrorKind::Type("cannot order NaN values".to_string())
            }),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (a, b) if a.is_null() || b.is_null() => Err(EvalErrorKind::Type(
                "invalid type for comparison, cannot compare a nil value".to_string(),
            )),
            _ => Err(EvalErrorKind::Type(
                "incompatible types for comparison".to_string(),
            )),
        }
    }
}

// String form: shortest round-trip floats, lists joined with a space, maps
// joined with commas as key:value, and null/sentinel values as the empty
// string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null | Value::Nil { .. } | Value::Tree(_) => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                let mut del = "";
                for item in items {
                    write!(f, "{}{}", del, item)?;
                    del = " ";
                }
                Ok(())
            }
            Value::Map(m) => {
                let mut del = "";
                for (k, v) in m {
                    write!(f, "{}{}:{}", del, k, v)?;
                    del = ",";
                }
                Ok(())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
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
