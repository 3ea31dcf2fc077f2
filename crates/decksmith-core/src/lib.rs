//! Decksmith Core Library
//!
//! Cache-backed generation of flashcard deck packages: structured vocabulary
//! records from a language model, synthesized pronunciation audio, rendered
//! notes, and a single exportable bundle. Completed items persist in on-disk
//! caches, so interrupted or repeated runs never re-pay provider calls.

pub mod cache;
pub mod error;
pub mod llm;
pub mod package;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod schema;
pub mod template;
pub mod tts;

// Re-export commonly used items at crate root
pub use cache::{AudioCache, ContentCache, default_cache_root};
pub use error::{DecksmithError, Result};
pub use llm::{ContentGenerator, LlmConfig, OpenRouterGenerator};
pub use package::{Deck, NoteModel, Package};
pub use pipeline::{BatchInput, DeckConfig, DeckGenerator};
pub use record::{FieldValue, StructuredRecord};
pub use render::{Note, render_fields};
pub use schema::{FieldKind, FieldSpec, RecordType, SchemaDefinition};
pub use template::{CardTemplate, build_templates};
pub use tts::{GoogleTts, SpeechSynthesizer, TtsConfig};
