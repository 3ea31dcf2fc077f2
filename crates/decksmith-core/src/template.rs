use serde::{Deserialize, Serialize};

/// One card layout: question format on the front, answer format on the back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardTemplate {
    pub name: String,
    pub qfmt: String,
    pub afmt: String,
}

pub const DEFAULT_CSS: &str = ".card {\n  font-family: arial;\n  font-size: 20px;\n  text-align: center;\n}\n.label {\n  font-weight: bold;\n}\n";

/// Derives the card templates from the note field order. The front shows only
/// the item field. The back wraps every other field in a conditional section
/// keyed by field name, so notes with an empty or absent value render no
/// section label at all.
pub fn build_templates(item_field: &str, field_order: &[String]) -> Vec<CardTemplate> {
    let mut afmt = String::from("{{FrontSide}}\n<hr id=\"answer\">\n");
    for field in field_order {
        if field == item_field {
            continue;
        }
        afmt.push_str(&format!(
            "{{{{#{field}}}}}<div class=\"section\"><span class=\"label\">{field}</span><br>{{{{{field}}}}}</div>{{{{/{field}}}}}\n"
        ));
    }

    vec![CardTemplate {
        name: "Card 1".to_string(),
        qfmt: format!("{{{{{item_field}}}}}"),
        afmt,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_shows_only_the_item_field() {
        let order = vec!["word".to_string(), "explanation".to_string()];
        let templates = build_templates("word", &order);
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].qfmt, "{{word}}");
        assert!(!templates[0].qfmt.contains("explanation"));
    }

    #[test]
    fn back_wraps_each_field_in_a_conditional_section() {
        let order = vec![
            "word".to_string(),
            "explanation".to_string(),
            "cultural note".to_string(),
        ];
        let templates = build_templates("word", &order);
        let afmt = &templates[0].afmt;

        assert!(afmt.starts_with("{{FrontSide}}"));

        // The field reference must live strictly inside its conditional block,
        // so an empty or absent value collapses the whole section.
        let start = afmt.find("{{#cultural note}}").unwrap();
        let end = afmt.find("{{/cultural note}}").unwrap();
        assert!(afmt[start..end].contains("{{cultural note}}"));
        assert!(!afmt[..start].contains("{{cultural note}}"));
        assert!(!afmt[end..].contains("{{cultural note}}"));
    }

    #[test]
    fn item_field_is_not_repeated_on_the_back() {
        let order = vec!["word".to_string(), "explanation".to_string()];
        let templates = build_templates("word", &order);
        assert!(!templates[0].afmt.contains("{{#word}}"));
    }
}
