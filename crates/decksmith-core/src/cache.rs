use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::{error::Result, record::StructuredRecord, tts::SpeechSynthesizer};

/// Persistent mapping from raw item text to its generated record.
///
/// Grows monotonically; entries are never evicted unless the cache file is
/// deleted externally. One pipeline instance per cache directory: concurrent
/// writers racing on the same cache file are not supported.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: BTreeMap<String, StructuredRecord>,
}

impl ContentCache {
    /// Reads a persisted cache. Corruption is non-fatal: a parse failure logs
    /// a warning and yields an empty cache so generation can proceed. A
    /// missing file is a silent fresh start.
    pub async fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no content cache at {}, starting fresh", path.display());
                return Self::default();
            }
            Err(err) => {
                warn!(
                    "content cache at {} is unreadable ({err}); starting with an empty cache",
                    path.display()
                );
                return Self::default();
            }
        };

        match serde_json::from_str::<BTreeMap<String, StructuredRecord>>(&raw) {
            Ok(entries) => {
                info!(
                    "loaded {} cached records from {}",
                    entries.len(),
                    path.display()
                );
                Self { entries }
            }
            Err(err) => {
                warn!(
                    "content cache at {} is corrupted ({err}); starting with an empty cache",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&StructuredRecord> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: String, record: StructuredRecord) {
        self.entries.insert(key, record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the full in-memory mapping, pretty-printed. Total and
    /// idempotent: the whole snapshot is written every time, so the on-disk
    /// file is always a complete, self-consistent state.
    pub async fn flush(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let pretty = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, pretty).await?;
        Ok(())
    }
}

/// Root directory for caches when the caller does not pick one.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("decksmith")
}

/// Durable store of synthesized audio, separate from the per-run media
/// directory. Keyed by the rendered file name (guid-derived), not by the item
/// text: guid assignment must stay stable across runs for hits, and changing
/// the guid policy silently invalidates the cache.
#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Materializes the clip for `file_name` into `media_dir`. A cache hit
    /// copies the durable file and makes no synthesis call; a miss synthesizes,
    /// writes the run copy, and stores the durable copy for future runs.
    pub async fn resolve(
        &self,
        synth: &dyn SpeechSynthesizer,
        text: &str,
        file_name: &str,
        media_dir: &Path,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        fs::create_dir_all(media_dir).await?;

        let cached = self.dir.join(file_name);
        let output = media_dir.join(file_name);

        if fs::try_exists(&cached).await? {
            fs::copy(&cached, &output).await?;
            debug!("audio cache hit for {file_name}");
            return Ok(output);
        }

        let bytes = synth.synthesize(text).await?;
        fs::write(&output, &bytes).await?;
        fs::copy(&output, &cached).await?;
        info!("audio content written to {}", output.display());
        Ok(output)
    }
}
