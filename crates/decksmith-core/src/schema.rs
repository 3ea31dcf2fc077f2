use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{DecksmithError, Result};

/// Name of the synthesized-audio note field appended when audio is enabled.
pub const AUDIO_FIELD: &str = "audio";

/// One model-generated attribute of a note. `description` is the generation
/// instruction handed to the provider, not documentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub list: bool,
}

/// Declarative description of a note's shape: model-generated fields, the
/// field holding the input item itself, caller-provided fields, and an
/// optional explicit ordering for the rendered note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub fields: Vec<FieldSpec>,
    pub item_field: String,
    #[serde(default)]
    pub provided_fields: Vec<String>,
    #[serde(default)]
    pub field_order: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextList,
}

#[derive(Debug, Clone)]
pub struct CompiledField {
    /// Field name as it appears on notes and templates (may contain spaces).
    pub display_name: String,
    /// Normalized name used in the wire schema and generated records.
    pub json_name: String,
    pub description: String,
    pub kind: FieldKind,
}

/// A compiled schema: the typed record shape requested from the generation
/// provider. Fixed once compiled.
#[derive(Debug, Clone)]
pub struct RecordType {
    pub fields: Vec<CompiledField>,
}

pub fn normalize_name(name: &str) -> String {
    name.replace(' ', "_")
}

impl SchemaDefinition {
    /// Compiles the declarative spec into a typed record shape. Fails before
    /// any network call if two fields normalize to the same name, counting
    /// model fields, provided fields, and the item field together.
    pub fn compile(&self) -> Result<RecordType> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());

        for spec in &self.fields {
            let json_name = normalize_name(&spec.name);
            if !seen.insert(json_name.clone()) {
                return Err(DecksmithError::DuplicateField { name: json_name });
            }
            fields.push(CompiledField {
                display_name: spec.name.clone(),
                json_name,
                description: spec.description.clone(),
                kind: if spec.list {
                    FieldKind::TextList
                } else {
                    FieldKind::Text
                },
            });
        }

        for name in self
            .provided_fields
            .iter()
            .chain(std::iter::once(&self.item_field))
        {
            let json_name = normalize_name(name);
            if !seen.insert(json_name.clone()) {
                return Err(DecksmithError::DuplicateField { name: json_name });
            }
        }

        Ok(RecordType { fields })
    }

    /// Field order for rendered notes: the explicit override if configured,
    /// otherwise item field first, model fields in declaration order, provided
    /// fields appended. The audio field is appended when audio generation is
    /// enabled and the order does not already list it.
    pub fn note_field_order(&self, gen_audio: bool) -> Vec<String> {
        let mut order = match &self.field_order {
            Some(order) if !order.is_empty() => order.clone(),
            _ => {
                let mut order = vec![self.item_field.clone()];
                order.extend(self.fields.iter().map(|f| f.name.clone()));
                order.extend(self.provided_fields.iter().cloned());
                order
            }
        };
        if gen_audio && !order.iter().any(|f| f == AUDIO_FIELD) {
            order.push(AUDIO_FIELD.to_string());
        }
        order
    }
}

impl RecordType {
    /// JSON Schema object handed to the generation provider as the
    /// structured-output target. Every field is required; descriptions ride
    /// along as generation guidance.
    pub fn json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            let prop = match field.kind {
                FieldKind::Text => json!({
                    "type": "string",
                    "description": field.description,
                }),
                FieldKind::TextList => json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": field.description,
                }),
            };
            properties.insert(field.json_name.clone(), prop);
            required.push(serde_json::Value::String(field.json_name.clone()));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}
