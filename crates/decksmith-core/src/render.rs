use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

/// One deck-ready note: a stable guid and the rendered field values in
/// template order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub guid: String,
    pub fields: Vec<String>,
}

/// Renders the merged data map into ordered field values.
///
/// Per field in `field_order` that is present in `data`:
/// - the audio field is wrapped in a `[sound:…]` reference,
/// - strings pass through unchanged,
/// - lists of strings join with `<br>`,
/// - numbers convert to their canonical string form,
/// - anything else is dropped from the output and logged at error level.
///
/// The drop is deliberate: an absent field collapses its conditional card
/// section, and callers rely on that. Fields absent from `data` are skipped
/// silently.
pub fn render_fields(
    field_order: &[String],
    data: &serde_json::Map<String, Value>,
    audio_field: &str,
) -> Vec<String> {
    let mut rendered = Vec::with_capacity(field_order.len());

    for name in field_order {
        let Some(value) = data.get(name) else {
            continue;
        };

        if name == audio_field {
            if let Value::String(file_name) = value {
                rendered.push(format!("[sound:{file_name}]"));
                continue;
            }
        }

        match value {
            Value::String(text) => rendered.push(text.clone()),
            Value::Array(items) => match join_string_items(items) {
                Some(joined) => rendered.push(joined),
                None => {
                    error!(
                        "unsupported field value for '{name}': list with non-string element; field dropped"
                    );
                }
            },
            Value::Number(number) => rendered.push(number.to_string()),
            other => {
                error!(
                    "unsupported field value for '{name}': {}; field dropped",
                    kind_name(other)
                );
            }
        }
    }

    rendered
}

fn join_string_items(items: &[Value]) -> Option<String> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(text) => lines.push(text.as_str()),
            _ => return None,
        }
    }
    Some(lines.join("<br>"))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
