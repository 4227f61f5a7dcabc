//! Document Model
//!
//! Defines the generic structured value the cache stores and serves:
//! nested maps, ordered sequences, scalars and tabular values.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Reserved object key marking a serialized tabular value.
///
/// A tabular document serializes to `{"__columns__": [[name, [cells]], ..]}`
/// so it can be told apart from an ordinary map on decode. A user map that
/// carries exactly this shape will be read back as a table.
const TABLE_KEY: &str = "__columns__";

// == Document ==
/// A generic structured value.
///
/// This is the unit the cache manager accepts and returns. Maps are keyed
/// by strings with no meaningful ordering; tables are ordered sequences of
/// named, equal-length columns.
///
/// Non-finite floats (`NaN`, infinities) have no JSON representation and
/// are normalized to [`Document::Null`] when serialized for storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Document>),
    Map(BTreeMap<String, Document>),
    /// Named equal-length columns, in column order
    Table(Vec<(String, Vec<Document>)>),
}

impl Document {
    // == JSON Conversion ==
    /// Converts the document into a JSON value.
    ///
    /// Non-finite floats become JSON null. Tables become an object holding
    /// the reserved column marker.
    pub fn to_json_value(&self) -> Value {
        match self {
            Document::Null => Value::Null,
            Document::Bool(b) => Value::Bool(*b),
            Document::Int(i) => Value::Number((*i).into()),
            Document::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Document::Str(s) => Value::String(s.clone()),
            Document::Seq(items) => Value::Array(items.iter().map(Document::to_json_value).collect()),
            Document::Map(map) => {
                let mut obj = serde_json::Map::new();
                for (key, value) in map {
                    obj.insert(key.clone(), value.to_json_value());
                }
                Value::Object(obj)
            }
            Document::Table(columns) => {
                let encoded: Vec<Value> = columns
                    .iter()
                    .map(|(name, cells)| {
                        Value::Array(vec![
                            Value::String(name.clone()),
                            Value::Array(cells.iter().map(Document::to_json_value).collect()),
                        ])
                    })
                    .collect();
                let mut obj = serde_json::Map::new();
                obj.insert(TABLE_KEY.to_string(), Value::Array(encoded));
                Value::Object(obj)
            }
        }
    }

    /// Builds a document from a JSON value.
    pub fn from_json_value(value: Value) -> Document {
        match value {
            Value::Null => Document::Null,
            Value::Bool(b) => Document::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Document::Int(i)
                } else {
                    Document::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Document::Str(s),
            Value::Array(items) => {
                Document::Seq(items.into_iter().map(Document::from_json_value).collect())
            }
            Value::Object(obj) => {
                if let Some(columns) = decode_table_object(&obj) {
                    return Document::Table(columns);
                }
                Document::Map(
                    obj.into_iter()
                        .map(|(k, v)| (k, Document::from_json_value(v)))
                        .collect(),
                )
            }
        }
    }

    /// Serializes the document to a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&self.to_json_value())
            .map_err(|e| CacheError::EncodeFailure(format!("document to JSON: {e}")))
    }

    /// Parses a document from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Document> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CacheError::DecodeFailure(format!("document from JSON: {e}")))?;
        Ok(Document::from_json_value(value))
    }

    /// Parses a document from JSON bytes.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Document> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CacheError::DecodeFailure(format!("document from JSON: {e}")))?;
        Ok(Document::from_json_value(value))
    }

    // == Typed Bridges ==
    /// Converts any serializable value into a document.
    ///
    /// Fails when the value has no JSON mapping (for example a map with
    /// non-string keys).
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Document> {
        let json = serde_json::to_value(value)
            .map_err(|e| CacheError::EncodeFailure(format!("unserializable value: {e}")))?;
        Ok(Document::from_json_value(json))
    }

    /// Converts the document into a concrete deserializable type.
    pub fn into_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json_value())
            .map_err(|e| CacheError::DecodeFailure(format!("unexpected document shape: {e}")))
    }

    // == Size Estimate ==
    /// Rough in-memory footprint of the document in bytes.
    ///
    /// Used for size accounting on values that are not serialized before
    /// storage; containers count a fixed overhead per node.
    pub fn approx_size(&self) -> u64 {
        const NODE_OVERHEAD: u64 = 24;
        match self {
            Document::Null | Document::Bool(_) | Document::Int(_) | Document::Float(_) => 8,
            Document::Str(s) => NODE_OVERHEAD + s.len() as u64,
            Document::Seq(items) => {
                NODE_OVERHEAD + items.iter().map(Document::approx_size).sum::<u64>()
            }
            Document::Map(map) => {
                NODE_OVERHEAD
                    + map
                        .iter()
                        .map(|(k, v)| k.len() as u64 + v.approx_size())
                        .sum::<u64>()
            }
            Document::Table(columns) => {
                NODE_OVERHEAD
                    + columns
                        .iter()
                        .map(|(name, cells)| {
                            name.len() as u64
                                + cells.iter().map(Document::approx_size).sum::<u64>()
                        })
                        .sum::<u64>()
            }
        }
    }
}

/// Recognizes the reserved table shape inside a JSON object.
fn decode_table_object(obj: &serde_json::Map<String, Value>) -> Option<Vec<(String, Vec<Document>)>> {
    if obj.len() != 1 {
        return None;
    }
    let encoded = obj.get(TABLE_KEY)?.as_array()?;
    let mut columns = Vec::with_capacity(encoded.len());
    for pair in encoded {
        let pair = pair.as_array()?;
        if pair.len() != 2 {
            return None;
        }
        let name = pair[0].as_str()?.to_string();
        let cells = pair[1]
            .as_array()?
            .iter()
            .cloned()
            .map(Document::from_json_value)
            .collect();
        columns.push((name, cells));
    }
    Some(columns)
}

// == Convenience Conversions ==
impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Bool(b)
    }
}

impl From<i64> for Document {
    fn from(i: i64) -> Self {
        Document::Int(i)
    }
}

impl From<f64> for Document {
    fn from(f: f64) -> Self {
        Document::Float(f)
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::Str(s.to_string())
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::Str(s)
    }
}

impl From<Vec<Document>> for Document {
    fn from(items: Vec<Document>) -> Self {
        Document::Seq(items)
    }
}

impl From<BTreeMap<String, Document>> for Document {
    fn from(map: BTreeMap<String, Document>) -> Self {
        Document::Map(map)
    }
}
