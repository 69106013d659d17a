//! Core data types for the document store
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Value`: A flat primitive field value
//! - `Document`: An identified record of named fields
//! - `ChangeEvent`: Notification emitted after every mutation
//! - `Mutation`: The unit written to the write-ahead log

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::storage::error::{StorageError, StorageResult};

/// Well-known collection names
pub mod collections {
    pub const USERS: &str = "users";
    pub const POSTS: &str = "posts";
    pub const REMINDERS: &str = "reminders";
    pub const PPAS: &str = "ppas";
    pub const ACCOUNTS: &str = "accounts";
}

/// A single field value.
///
/// Records are flat: arrays and nested objects are rejected when converting
/// from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

impl Value {
    /// Rank used to order values of different kinds
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Number(_) => 2,
            Value::String(_) => 3,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the string content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values of the same kind.
    ///
    /// Returns `None` when the kinds differ; integers and floats are one kind.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Some(x.total_cmp(&y)),
                _ => None,
            },
        }
    }

    /// Total order across all kinds, used for sorting query results
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|| self.kind_rank().cmp(&other.kind_rank()))
    }

    /// Convert a JSON value into a field value
    pub fn from_json(field: &str, value: serde_json::Value) -> StorageResult<Self> {
        match value {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Number(f))
                } else {
                    Err(StorageError::InvalidField {
                        field: field.to_string(),
                        reason: format!("number {} is out of range", n),
                    })
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(_) => Err(StorageError::InvalidField {
                field: field.to_string(),
                reason: "arrays are not supported".to_string(),
            }),
            serde_json::Value::Object(_) => Err(StorageError::InvalidField {
                field: field.to_string(),
                reason: "nested objects are not supported".to_string(),
            }),
        }
    }

    /// Convert into a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Field name → value map of a document
pub type Fields = BTreeMap<String, Value>;

/// Encode a serializable record into document fields.
///
/// The record must serialize to a JSON object. An `id` key is dropped because
/// the document id lives outside the field map.
pub fn to_fields<T: Serialize>(record: &T) -> StorageResult<Fields> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(map) => map
            .into_iter()
            .filter(|(key, _)| key != "id")
            .map(|(key, value)| {
                let value = Value::from_json(&key, value)?;
                Ok((key, value))
            })
            .collect(),
        other => Err(StorageError::Serialization(format!(
            "record must serialize to an object, got {}",
            other
        ))),
    }
}

/// A stored record: id plus flat fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Look up a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a string field
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Decode into a typed record.
    ///
    /// The document id is exposed to the record as an `id` key.
    pub fn decode<T: DeserializeOwned>(&self) -> StorageResult<T> {
        let mut map = serde_json::Map::with_capacity(self.fields.len() + 1);
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.to_json());
        }
        map.insert("id".to_string(), serde_json::Value::String(self.id.clone()));
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }

    /// Rough in-memory size, used for stats
    pub fn estimated_size(&self) -> usize {
        let field_size: usize = self
            .fields
            .iter()
            .map(|(k, v)| {
                k.len()
                    + match v {
                        Value::String(s) => s.len() + 24,
                        _ => 16,
                    }
            })
            .sum();
        self.id.len() + field_size + 24
    }
}

/// Kind of change applied to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Put,
    Delete,
}

/// Notification emitted after a mutation has been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
}

/// A single logged mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    Put {
        collection: String,
        document: Document,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl Mutation {
    pub fn collection(&self) -> &str {
        match self {
            Mutation::Put { collection, .. } | Mutation::Delete { collection, .. } => collection,
        }
    }
}

/// Check that a collection name or document id is a usable path segment
pub fn validate_segment(kind: &str, segment: &str) -> StorageResult<()> {
    if segment.is_empty() {
        return Err(StorageError::InvalidPath(format!("{} cannot be empty", kind)));
    }
    if segment.contains('/') {
        return Err(StorageError::InvalidPath(format!(
            "{} '{}' must not contain '/'",
            kind, segment
        )));
    }
    Ok(())
}
