//! Cell value types.
//!
//! Every cell in a record store is exactly one of six kinds: missing, bool,
//! int64, uint64, double, or string. A series constrains all of its cells to
//! a single non-missing kind.
//!
//! Two variant types cover the two access patterns:
//! - `Value` owns its payload and is used for messages, shard rows, and
//!   predicate tuples.
//! - `ValueRef` borrows string payloads from the string store and is used
//!   for row-local reads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The five concrete cell types a series can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Bool,
    Int64,
    UInt64,
    Double,
    Str,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::UInt64 => "uint64",
            PrimitiveType::Double => "double",
            PrimitiveType::Str => "string",
        };
        f.write_str(name)
    }
}

/// Owned cell value. `None` is the missing-value sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(String),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// The primitive type of this value, or `None` for the missing sentinel.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            Value::None => None,
            Value::Bool(_) => Some(PrimitiveType::Bool),
            Value::Int64(_) => Some(PrimitiveType::Int64),
            Value::UInt64(_) => Some(PrimitiveType::UInt64),
            Value::Double(_) => Some(PrimitiveType::Double),
            Value::Str(_) => Some(PrimitiveType::Str),
        }
    }

    pub fn as_ref(&self) -> ValueRef<'_> {
        match self {
            Value::None => ValueRef::None,
            Value::Bool(v) => ValueRef::Bool(*v),
            Value::Int64(v) => ValueRef::Int64(*v),
            Value::UInt64(v) => ValueRef::UInt64(*v),
            Value::Double(v) => ValueRef::Double(*v),
            Value::Str(v) => ValueRef::Str(v),
        }
    }

    /// JSON rendition for operation reports.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::from(*v),
            Value::Int64(v) => serde_json::Value::from(*v),
            Value::UInt64(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Value::from(*v),
            Value::Str(v) => serde_json::Value::from(v.as_str()),
        }
    }
}

/// Borrowed cell value; string payloads point into the string store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    None,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(&'a str),
}

impl<'a> ValueRef<'a> {
    pub fn is_none(&self) -> bool {
        matches!(self, ValueRef::None)
    }

    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            ValueRef::None => None,
            ValueRef::Bool(_) => Some(PrimitiveType::Bool),
            ValueRef::Int64(_) => Some(PrimitiveType::Int64),
            ValueRef::UInt64(_) => Some(PrimitiveType::UInt64),
            ValueRef::Double(_) => Some(PrimitiveType::Double),
            ValueRef::Str(_) => Some(PrimitiveType::Str),
        }
    }

    pub fn to_owned(&self) -> Value {
        match self {
            ValueRef::None => Value::None,
            ValueRef::Bool(v) => Value::Bool(*v),
            ValueRef::Int64(v) => Value::Int64(*v),
            ValueRef::UInt64(v) => Value::UInt64(*v),
            ValueRef::Double(v) => Value::Double(*v),
            ValueRef::Str(v) => Value::Str((*v).to_string()),
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
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
