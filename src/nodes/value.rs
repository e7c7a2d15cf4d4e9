//! Runtime values stored in node property bags and carried over connections

use super::data_type::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Core data that flows between nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Empty/absent value
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Enumeration variant, identified by its name
    Enum { type_name: String, variant: String },
    /// Uniform ordered collection typed by its element type
    List { element: ValueType, items: Vec<Value> },
    /// Opaque host data serialized by the host
    Blob { type_name: String, bytes: Vec<u8> },
    /// Execution path marker; `true` once the path has been signaled
    Signal(bool),
}

impl Value {
    /// Builds a list of the given element type
    pub fn list(element: ValueType, items: Vec<Value>) -> Self {
        Value::List { element, items }
    }

    /// Builds a list of floats
    pub fn floats(items: &[f64]) -> Self {
        Value::list(ValueType::Float, items.iter().map(|v| Value::Float(*v)).collect())
    }

    /// Builds a list of texts
    pub fn texts(items: &[&str]) -> Self {
        Value::list(ValueType::Text, items.iter().map(|v| Value::Text(v.to_string())).collect())
    }

    /// Type-appropriate default/empty instance for a declared type
    pub fn default_for(ty: &ValueType) -> Self {
        match ty {
            ValueType::Any | ValueType::Custom(_) => Value::Null,
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Text => Value::Text(String::new()),
            ValueType::ExecutionPath => Value::Signal(false),
            ValueType::Enum { name, variants } => match variants.first() {
                Some(first) => Value::Enum { type_name: name.clone(), variant: first.clone() },
                None => Value::Null,
            },
            ValueType::List(element) => Value::list((**element).clone(), Vec::new()),
        }
    }

    /// Actual runtime type of this value
    ///
    /// `Null` reports `Any`, since it carries no type of its own. Enum values
    /// only know their variant, so the variant list is left empty.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Enum { type_name, .. } => ValueType::Enum { name: type_name.clone(), variants: Vec::new() },
            Value::List { element, .. } => ValueType::list(element.clone()),
            Value::Blob { type_name, .. } => ValueType::Custom(type_name.clone()),
            Value::Signal(_) => ValueType::ExecutionPath,
        }
    }

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

    /// Numeric view of ints and floats
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Whether this is an execution path that has been signaled
    pub fn is_signaled(&self) -> bool {
        matches!(self, Value::Signal(true))
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Enum { variant, .. } => write!(f, "{}", variant),
            Value::List { items, .. } => {
                let parts: Vec<String> = items.iter().map(|item| item.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            Value::Blob { type_name, bytes } => write!(f, "<{} ({} bytes)>", type_name, bytes.len()),
            Value::Signal(signaled) => write!(f, "{}", if *signaled { "signaled" } else { "idle" }),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}
