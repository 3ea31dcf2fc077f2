use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::warn;

/// Field separator used by legacy flat-file note exports: every line holds all
/// fields of one note joined by this control character.
const FIELD_SEPARATOR: char = '\x1f';

/// Positional layout of a legacy export line.
const FREQUENCY_INDEX: usize = 0;
const WORD_INDEX: usize = 1;

pub struct ImportedBatch {
    pub items: Vec<String>,
    pub provided: BTreeMap<String, Vec<Value>>,
}

/// Reads a plain word list, one item per line. The `frequency` provided field
/// defaults to the 1-based rank of the word in the list.
pub async fn read_word_list(path: &Path) -> Result<ImportedBatch> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading word list {}", path.display()))?;

    let items: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    let mut provided = BTreeMap::new();
    provided.insert(
        "frequency".to_string(),
        (1..=items.len()).map(|rank| json!(rank)).collect(),
    );

    Ok(ImportedBatch { items, provided })
}

/// Parses one legacy export line into (word, frequency) by fixed position.
pub fn parse_legacy_line(line: &str) -> Option<(String, String)> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    let word = fields.get(WORD_INDEX)?;
    let frequency = fields.get(FREQUENCY_INDEX)?;
    if word.is_empty() {
        return None;
    }
    Some((word.to_string(), frequency.to_string()))
}

/// Reads a legacy flat-file export. Malformed lines are skipped with a
/// warning; the batch carries the words plus their original frequency values.
pub async fn read_legacy_export(path: &Path) -> Result<ImportedBatch> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading legacy export {}", path.display()))?;

    let mut items = Vec::new();
    let mut frequencies = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        match parse_legacy_line(line) {
            Some((word, frequency)) => {
                items.push(word);
                frequencies.push(Value::String(frequency));
            }
            None => warn!(
                "skipping malformed line {} of {}",
                number + 1,
                path.display()
            ),
        }
    }

    let mut provided = BTreeMap::new();
    provided.insert("frequency".to_string(), frequencies);

    Ok(ImportedBatch { items, provided })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_line_extracts_word_and_frequency_by_position() {
        let line = "17\x1f달리다\x1fverb\x1fbasic\x1f\x1fto run";
        assert_eq!(
            parse_legacy_line(line),
            Some(("달리다".to_string(), "17".to_string()))
        );
    }

    #[test]
    fn legacy_line_without_a_word_is_rejected() {
        assert_eq!(parse_legacy_line("17"), None);
        assert_eq!(parse_legacy_line("17\x1f"), None);
    }

    #[tokio::test]
    async fn word_list_gets_rank_frequencies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        tokio::fs::write(&path, "run\n\n  walk  \njump\n")
            .await
            .unwrap();

        let batch = read_word_list(&path).await.unwrap();
        assert_eq!(batch.items, ["run", "walk", "jump"]);
        assert_eq!(
            batch.provided.get("frequency").unwrap(),
            &vec![json!(1), json!(2), json!(3)]
        );
    }

    #[tokio::test]
    async fn legacy_export_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, "1\x1f하다\x1fverb\nbroken-line\n2\x1f가다\x1fverb\n")
            .await
            .unwrap();

        let batch = read_legacy_export(&path).await.unwrap();
        assert_eq!(batch.items, ["하다", "가다"]);
        assert_eq!(
            batch.provided.get("frequency").unwrap(),
            &vec![Value::String("1".into()), Value::String("2".into())]
        );
    }
}
