use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecksmithError {
    #[error("Schema error: duplicate field name '{name}' after normalization")]
    DuplicateField { name: String },

    #[error("Content generation failed for '{item}': {reason}")]
    Generation { item: String, reason: String },

    #[error("Speech synthesis failed for '{text}': {reason}")]
    Synthesis { text: String, reason: String },

    #[error("Batch input mismatch: {reason}")]
    BatchInput { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Package write failed: {0}")]
    Package(#[from] zip::result::ZipError),

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },
}

pub type Result<T> = std::result::Result<T, DecksmithError>;
