//! Documents observed by the indexing layer
//!
//! A document is a flat, read-only mapping from field name to [`FieldValue`]
//! with a stable [`DocumentId`]. The base store owns documents; extractors
//! only read them.
//!
//! Nested JSON objects are flattened into dotted field names when a document
//! is built from JSON, so `{"user": {"id": 1}}` exposes a field `user.id`.

use crate::error::{Error, Result};
use crate::types::DocumentId;
use crate::value::{FieldValue, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Create an empty document
    pub fn new(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field, builder style
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Add or replace a field
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Primary key
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Look up a field
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Look up a field that must hold a single scalar
    pub fn get_scalar(&self, name: &str) -> Option<&Scalar> {
        self.fields.get(name).and_then(FieldValue::as_scalar)
    }

    /// Iterate fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a document from a JSON object
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` if `json` is not an object, or if a field
    /// holds a nested array or an array containing objects.
    pub fn from_json(id: impl Into<DocumentId>, json: &serde_json::Value) -> Result<Self> {
        let mut doc = Document::new(id);
        let object = json.as_object().ok_or_else(|| {
            Error::InvalidDocument(format!("expected a JSON object, got {}", json_type(json)))
        })?;
        flatten_into(&mut doc.fields, "", object)?;
        Ok(doc)
    }

    /// Render the document as a JSON object (dotted names stay flat)
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    FieldValue::Scalar(s) => scalar_to_json(s),
                    FieldValue::Array(items) => {
                        serde_json::Value::Array(items.iter().map(scalar_to_json).collect())
                    }
                };
                (k.clone(), value)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

fn flatten_into(
    fields: &mut BTreeMap<String, FieldValue>,
    prefix: &str,
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            serde_json::Value::Object(inner) => flatten_into(fields, &name, inner)?,
            serde_json::Value::Array(items) => {
                let scalars = items
                    .iter()
                    .map(|item| {
                        json_to_scalar(item).ok_or_else(|| {
                            Error::InvalidDocument(format!(
                                "field '{}' contains a non-scalar element ({})",
                                name,
                                json_type(item)
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                fields.insert(name, FieldValue::Array(scalars));
            }
            other => {
                // Objects and arrays are handled above
                if let Some(scalar) = json_to_scalar(other) {
                    fields.insert(name, FieldValue::Scalar(scalar));
                }
            }
        }
    }
    Ok(())
}

fn json_to_scalar(value: &serde_json::Value) -> Option<Scalar> {
    match value {
        serde_json::Value::Null => Some(Scalar::Null),
        serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Scalar::Int(i)),
            None => n.as_f64().map(Scalar::Float),
        },
        serde_json::Value::String(s) => Some(Scalar::String(s.clone())),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

fn scalar_to_json(scalar: &Scalar) -> serde_json::Value {
    match scalar {
        Scalar::Null => serde_json::Value::Null,
        Scalar::Bool(b) => serde_json::Value::Bool(*b),
        Scalar::Int(i) => serde_json::Value::from(*i),
        Scalar::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Scalar::String(s) => serde_json::Value::String(s.clone()),
        Scalar::Bytes(b) => {
            serde_json::Value::Array(b.iter().map(|x| serde_json::Value::from(*x)).collect())
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
