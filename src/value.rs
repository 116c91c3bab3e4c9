//! The value model shared by entry attributes and action results.
//!
//! Attributes are JSON-like: scalars, ordered sequences and ordered mappings.
//! Action results may additionally be live entry handles, which is what lets a
//! pipeline hop from one entry to the next. Entry handles never reach storage
//! as such; they serialize as their location.

// used to print out readable forms of a value
use std::fmt;
// used to order numbers and texts in query comparisons
use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::entry::Entry;

pub type Map = IndexMap<String, Value>;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(Map),
    Entry(Arc<Entry>),
}

impl Value {
    /// Numeric-looking text becomes a number, everything else stays text.
    pub fn coerce(literal: &str) -> Value {
        if let Ok(i) = literal.parse::<i64>() {
            Value::Int(i)
        } else if let Ok(f) = literal.parse::<f64>() {
            if f.is_finite() && literal.chars().any(|c| c.is_ascii_digit()) {
                Value::Float(f)
            } else {
                Value::Text(literal.to_string())
            }
        } else {
            Value::Text(literal.to_string())
        }
    }
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Entry(_) => true,
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
    pub fn as_entry(&self) -> Option<&Arc<Entry>> {
        match self {
            Value::Entry(e) => Some(e),
            _ => None,
        }
    }
    pub fn into_entry(self) -> Option<Arc<Entry>> {
        match self {
            Value::Entry(e) => Some(e),
            _ => None,
        }
    }
    /// Membership test used by `key:val` conditions and tags.
    pub fn contains(&self, needle: &Value) -> bool {
        match self {
            Value::List(l) => l.iter().any(|v| v == needle),
            _ => false,
        }
    }
    /// Ordering is only defined between two numbers or two texts.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(_) | Value::Float(_) => self.as_f64(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Entry(e) => match e.location() {
                Some(location) => serde_json::Value::String(location.display().to_string()),
                None => serde_json::Value::String(e.name()),
            },
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Text(s.to_string()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::Text(s) }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Int(i) }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Int(i64::from(i)) }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self { Value::Float(f) }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}
impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self { Value::List(l) }
}
impl From<Map> for Value {
    fn from(m: Map) -> Self { Value::Map(m) }
}
impl From<Arc<Entry>> for Value {
    fn from(e: Arc<Entry>) -> Self { Value::Entry(e) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Entry(a), Value::Entry(b)) => Arc::ptr_eq(a, b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Entry(e) => write!(f, "{}", e),
            other => write!(f, "{}", other.to_json()),
        }
    }
}
