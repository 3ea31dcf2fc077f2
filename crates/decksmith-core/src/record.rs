use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{FieldKind, RecordType};

/// A generated field value: a closed set, either a scalar string or an
/// ordered list of strings. Anything else a provider emits fails
/// deserialization and surfaces as a generation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::List(_) => FieldKind::TextList,
        }
    }
}

/// One item's generated content, keyed by normalized field name. Serializes
/// as a plain JSON object so the cache file stays human-diffable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredRecord(pub BTreeMap<String, FieldValue>);

impl StructuredRecord {
    pub fn get(&self, json_name: &str) -> Option<&FieldValue> {
        self.0.get(json_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Checks the record against a compiled schema: every field present, kind
    /// matching. Returns the first problem found, for the generation layer to
    /// wrap into its error.
    pub fn conformance_error(&self, record_type: &RecordType) -> Option<String> {
        for field in &record_type.fields {
            match self.0.get(&field.json_name) {
                None => return Some(format!("missing field '{}'", field.json_name)),
                Some(value) if value.kind() != field.kind => {
                    let expected = match field.kind {
                        FieldKind::Text => "a string",
                        FieldKind::TextList => "a list of strings",
                    };
                    return Some(format!(
                        "field '{}' should be {expected}",
                        field.json_name
                    ));
                }
                Some(_) => {}
            }
        }
        None
    }
}
