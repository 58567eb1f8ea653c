//! Document representation for the index backend.
//!
//! The pipeline core does not interpret document fields beyond the id and
//! the run timestamp; everything else is produced by the pluggable document
//! mapper and passed through opaquely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding the backend-native string identifier of a document.
pub const ID_FIELD: &str = "id";

/// Field stamped with the run's start time in epoch milliseconds.
///
/// Used by the timestamp delete strategy to sweep out documents that were
/// not refreshed by the current full reindex.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// A flat field set uploaded to the index backend.
///
/// Serializes to a plain JSON object, which is what document-index backends
/// accept on their add/bulk endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexDocument {
    fields: serde_json::Map<String, Value>,
}

impl IndexDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document carrying only its id field.
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.set_field(ID_FIELD, Value::String(id.into()));
        doc
    }

    /// Set a field, replacing any previous value.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Read a field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The document's backend-native id, if set.
    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    /// The run timestamp stamped onto this document, if set.
    pub fn timestamp(&self) -> Option<i64> {
        self.fields.get(TIMESTAMP_FIELD).and_then(Value::as_i64)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
