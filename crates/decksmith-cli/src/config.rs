use std::path::Path;

use anyhow::{Context, Result};
use decksmith_core::{DeckConfig, LlmConfig, SchemaDefinition, TtsConfig};
use serde::Deserialize;

fn default_gen_audio() -> bool {
    true
}

/// One deck's full configuration, loaded from a JSON file: identity, the
/// declarative schema, and provider settings.
#[derive(Debug, Deserialize)]
pub struct DeckSpec {
    pub deck: DeckConfig,
    pub schema: SchemaDefinition,
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: Option<TtsConfig>,
    #[serde(default = "default_gen_audio")]
    pub gen_audio: bool,
}

pub async fn load(path: &Path) -> Result<DeckSpec> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading deck spec {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing deck spec {}", path.display()))
}
