use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{DecksmithError, Result};

pub const GOOGLE_TTS_ENDPOINT: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
pub const GOOGLE_TTS_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Extension of the clips the synthesizer produces (MP3 output encoding).
pub const AUDIO_FILE_EXT: &str = "mp3";

fn default_speaking_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub language_code: String,
    pub voice_name: String,
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f64,
}

/// Seam for pronunciation synthesis: text in, encoded audio bytes out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Google Cloud Text-to-Speech REST client. The response carries the clip as
/// base64 `audioContent`. No explicit timeout beyond the client default.
pub struct GoogleTts {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    config: TtsConfig,
}

impl GoogleTts {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, config: TtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            config,
        }
    }

    /// Builds a synthesizer against the public endpoint, reading the API key
    /// from the environment.
    pub fn from_env(config: TtsConfig) -> Result<Self> {
        let api_key =
            std::env::var(GOOGLE_TTS_KEY_ENV).map_err(|_| DecksmithError::MissingApiKey {
                env_var: GOOGLE_TTS_KEY_ENV.to_string(),
            })?;
        Ok(Self::new(GOOGLE_TTS_ENDPOINT, api_key, config))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "input": { "text": text },
                "voice": {
                    "languageCode": self.config.language_code,
                    "name": self.config.voice_name,
                },
                "audioConfig": {
                    "audioEncoding": "MP3",
                    "speakingRate": self.config.speaking_rate,
                },
            }))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let encoded = response["audioContent"]
            .as_str()
            .ok_or_else(|| DecksmithError::Synthesis {
                text: text.to_string(),
                reason: format!("invalid provider response: {response:?}"),
            })?;

        BASE64
            .decode(encoded)
            .map_err(|err| DecksmithError::Synthesis {
                text: text.to_string(),
                reason: format!("audio payload is not valid base64: {err}"),
            })
    }
}
