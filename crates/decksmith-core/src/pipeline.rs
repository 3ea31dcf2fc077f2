use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{fs, sync::Mutex};
use tracing::{error, info, warn};

use crate::{
    cache::{AudioCache, ContentCache},
    error::{DecksmithError, Result},
    llm::ContentGenerator,
    package::{Deck, NoteModel, Package},
    render::{Note, render_fields},
    schema::{AUDIO_FIELD, RecordType, SchemaDefinition},
    template::{DEFAULT_CSS, build_templates},
    tts::{AUDIO_FILE_EXT, SpeechSynthesizer},
};

/// Deck identity. External configuration, not derived state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    pub model_id: i64,
    pub deck_id: i64,
    pub deck_name: String,
}

impl DeckConfig {
    /// Deck name with spaces removed: the package file stem and the prefix of
    /// fallback guids.
    pub fn name_prefix(&self) -> String {
        self.deck_name.replace(' ', "")
    }
}

/// One batch of work: items plus parallel caller-provided field values and
/// optional explicit guids. All vectors must match `items` in length.
#[derive(Debug, Clone, Default)]
pub struct BatchInput {
    pub items: Vec<String>,
    pub provided: BTreeMap<String, Vec<Value>>,
    pub guids: Option<Vec<String>>,
}

impl BatchInput {
    fn validate(&self) -> Result<()> {
        let expected = self.items.len();
        for (field, values) in &self.provided {
            if values.len() != expected {
                return Err(DecksmithError::BatchInput {
                    reason: format!(
                        "provided field '{field}' has {} values for {expected} items",
                        values.len()
                    ),
                });
            }
        }
        if let Some(guids) = &self.guids {
            if guids.len() != expected {
                return Err(DecksmithError::BatchInput {
                    reason: format!("{} guids for {expected} items", guids.len()),
                });
            }
        }
        Ok(())
    }
}

/// The batch orchestrator. Owns both caches for its whole run; items are
/// processed strictly one at a time, and the content cache is flushed before
/// the run ends on every path: success, error, or termination signal.
pub struct DeckGenerator {
    schema: SchemaDefinition,
    record_type: RecordType,
    field_order: Vec<String>,
    deck_config: DeckConfig,
    gen_audio: bool,
    cache_path: PathBuf,
    content_cache: Arc<Mutex<ContentCache>>,
    audio_cache: AudioCache,
}

impl DeckGenerator {
    /// Compiles the schema (fatal on duplicate field names, before any network
    /// call) and loads the persistent caches from `cache_dir`.
    pub async fn new(
        schema: SchemaDefinition,
        deck_config: DeckConfig,
        cache_dir: &Path,
        gen_audio: bool,
    ) -> Result<Self> {
        let record_type = schema.compile()?;
        let field_order = schema.note_field_order(gen_audio);
        let cache_path = cache_dir.join("content_cache.json");
        let content_cache = Arc::new(Mutex::new(ContentCache::load(&cache_path).await));
        let audio_cache = AudioCache::new(cache_dir.join("audio"));

        Ok(Self {
            schema,
            record_type,
            field_order,
            deck_config,
            gen_audio,
            cache_path,
            content_cache,
            audio_cache,
        })
    }

    /// Registers a task that flushes this pipeline's content cache when the
    /// process receives SIGINT (or SIGTERM on unix), then exits with the
    /// conventional 128+signo status instead of swallowing the signal. Call at
    /// most once per process.
    pub fn install_signal_flush(&self) {
        let cache = Arc::clone(&self.content_cache);
        let path = self.cache_path.clone();
        tokio::spawn(async move {
            let signo = wait_for_termination().await;
            warn!("termination signal received; flushing content cache before exit");
            flush_shared_cache(&cache, &path).await;
            std::process::exit(128 + signo);
        });
    }

    /// Runs the batch: per item, resolve content (cache or generator), resolve
    /// audio (cache or synthesizer), render, accumulate. The content cache is
    /// flushed exactly once before this returns, on the success and the error
    /// path alike; the package is written only after the whole batch succeeds.
    pub async fn run(
        &self,
        generator: &dyn ContentGenerator,
        synthesizer: Option<&dyn SpeechSynthesizer>,
        input: &BatchInput,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        input.validate()?;
        if self.gen_audio && synthesizer.is_none() {
            return Err(DecksmithError::BatchInput {
                reason: "audio generation is enabled but no synthesizer was supplied".to_string(),
            });
        }

        fs::create_dir_all(output_dir).await?;
        let media_dir = output_dir.join("media");

        let outcome = self
            .process_batch(generator, synthesizer, input, &media_dir)
            .await;

        // Flush before surfacing any batch error, so completed items survive
        // and the next run resumes from the cache. A batch error takes
        // precedence over a flush error; on a successful batch a failed flush
        // is itself an error, since the cache file is the durable record of
        // progress.
        let flush_result = {
            let cache = self.content_cache.lock().await;
            let result = cache.flush(&self.cache_path).await;
            if result.is_ok() {
                info!(
                    "content cache flushed to {} ({} records)",
                    self.cache_path.display(),
                    cache.len()
                );
            }
            result
        };

        let (deck, media_files) = match outcome {
            Ok(outcome) => {
                flush_result?;
                outcome
            }
            Err(err) => {
                if let Err(flush_err) = flush_result {
                    error!("failed to flush content cache: {flush_err}");
                }
                return Err(err);
            }
        };

        let model = NoteModel {
            model_id: self.deck_config.model_id,
            name: self.deck_config.deck_name.clone(),
            fields: self.field_order.clone(),
            templates: build_templates(&self.schema.item_field, &self.field_order),
            css: DEFAULT_CSS.to_string(),
        };
        let package = Package {
            model,
            deck,
            media_files,
        };
        let package_path = output_dir.join(format!("{}.apkg", self.deck_config.name_prefix()));
        package.write_to_file(&package_path)?;
        info!(
            "deck '{}' written to {}",
            self.deck_config.deck_name,
            package_path.display()
        );

        Ok(package_path)
    }

    async fn process_batch(
        &self,
        generator: &dyn ContentGenerator,
        synthesizer: Option<&dyn SpeechSynthesizer>,
        input: &BatchInput,
        media_dir: &Path,
    ) -> Result<(Deck, Vec<PathBuf>)> {
        let mut deck = Deck::new(self.deck_config.deck_id, self.deck_config.deck_name.clone());
        let mut media_files = Vec::new();
        let total = input.items.len();

        for (i, item) in input.items.iter().enumerate() {
            let guid = match &input.guids {
                Some(guids) => guids[i].clone(),
                None => format!("{}-{}", self.deck_config.name_prefix(), i + 1),
            };

            let cached = self.content_cache.lock().await.get(item).cloned();
            let record = match cached {
                Some(record) => {
                    info!("({}/{total}) content for '{item}' served from cache", i + 1);
                    record
                }
                None => {
                    info!("({}/{total}) generating content for '{item}'", i + 1);
                    let record = generator.generate(item, &self.record_type).await?;
                    self.content_cache
                        .lock()
                        .await
                        .put(item.clone(), record.clone());
                    record
                }
            };

            // Merge model fields (mapped back to their display names through
            // the compiled schema, so underscores in user-declared names
            // survive), the item itself, and per-item provided values into one
            // data map.
            let mut data = serde_json::Map::new();
            for field in &self.record_type.fields {
                if let Some(value) = record.get(&field.json_name) {
                    data.insert(field.display_name.clone(), serde_json::to_value(value)?);
                }
            }
            data.insert(self.schema.item_field.clone(), Value::String(item.clone()));
            for (field, values) in &input.provided {
                data.insert(field.clone(), values[i].clone());
            }

            if self.gen_audio {
                let synth = synthesizer.expect("checked before the batch started");
                let file_name = format!("{guid}.{AUDIO_FILE_EXT}");
                let path = self
                    .audio_cache
                    .resolve(synth, item, &file_name, media_dir)
                    .await?;
                data.insert(AUDIO_FIELD.to_string(), Value::String(file_name));
                media_files.push(path);
            }

            let fields = render_fields(&self.field_order, &data, AUDIO_FIELD);
            deck.add_note(Note { guid, fields });
        }

        Ok((deck, media_files))
    }
}

/// Flush body of the signal task. Errors are logged, not propagated: the
/// caller exits immediately after.
async fn flush_shared_cache(cache: &Mutex<ContentCache>, path: &Path) {
    let cache = cache.lock().await;
    if let Err(err) = cache.flush(path).await {
        error!("failed to flush content cache: {err}");
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> i32 {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => 2,
                _ = terminate.recv() => 15,
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            2
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> i32 {
    let _ = tokio::signal::ctrl_c().await;
    2
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        fs::File,
        io::Read,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;
    use zip::ZipArchive;

    use super::*;
    use crate::{
        record::{FieldValue, StructuredRecord},
        schema::{FieldKind, FieldSpec},
    };

    fn schema() -> SchemaDefinition {
        SchemaDefinition {
            fields: vec![
                FieldSpec {
                    name: "explanation".to_string(),
                    description: "Explanation of the word".to_string(),
                    list: false,
                },
                FieldSpec {
                    name: "example sentences".to_string(),
                    description: "Example sentences".to_string(),
                    list: true,
                },
            ],
            item_field: "word".to_string(),
            provided_fields: vec!["frequency".to_string()],
            field_order: None,
        }
    }

    fn deck_config() -> DeckConfig {
        DeckConfig {
            model_id: 1234567890,
            deck_id: 9876543210,
            deck_name: "Test Deck".to_string(),
        }
    }

    fn batch(items: &[&str]) -> BatchInput {
        let mut provided = BTreeMap::new();
        provided.insert(
            "frequency".to_string(),
            (1..=items.len()).map(|rank| json!(rank)).collect(),
        );
        BatchInput {
            items: items.iter().map(|s| s.to_string()).collect(),
            provided,
            guids: None,
        }
    }

    /// Deterministic generator that conforms to whatever record type it is
    /// handed, optionally failing from the nth call onward.
    struct MockGenerator {
        calls: AtomicUsize,
        fail_from: Option<usize>,
    }

    impl MockGenerator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from: None,
            }
        }

        fn failing_from(call: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from: Some(call),
            }
        }
    }

    #[async_trait]
    impl ContentGenerator for MockGenerator {
        async fn generate(
            &self,
            item: &str,
            record_type: &RecordType,
        ) -> Result<StructuredRecord> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(fail_from) = self.fail_from {
                if call >= fail_from {
                    return Err(DecksmithError::Generation {
                        item: item.to_string(),
                        reason: "mock provider failure".to_string(),
                    });
                }
            }

            let mut map = BTreeMap::new();
            for field in &record_type.fields {
                let value = match field.kind {
                    FieldKind::Text => FieldValue::Text(format!("{} of {item}", field.json_name)),
                    FieldKind::TextList => FieldValue::List(vec![
                        format!("{item} - first"),
                        format!("{item} - second"),
                    ]),
                };
                map.insert(field.json_name.clone(), value);
            }
            Ok(StructuredRecord(map))
        }
    }

    struct MockSynth {
        calls: AtomicUsize,
    }

    impl MockSynth {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for MockSynth {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("mp3:{text}").into_bytes())
        }
    }

    fn read_notes(package_path: &Path) -> serde_json::Value {
        let mut archive = ZipArchive::new(File::open(package_path).unwrap()).unwrap();
        let mut manifest = String::new();
        archive
            .by_name("deck.json")
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        parsed["deck"]["notes"].clone()
    }

    #[tokio::test]
    async fn second_run_serves_everything_from_cache() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let input = batch(&["run", "walk", "jump"]);

        let generator = MockGenerator::new();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &cache_dir, false)
            .await
            .unwrap();
        let first = pipeline
            .run(&generator, None, &input, &dir.path().join("out1"))
            .await
            .unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);

        // Fresh pipeline over the same cache directory: zero provider calls,
        // identical rendered notes.
        let generator = MockGenerator::new();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &cache_dir, false)
            .await
            .unwrap();
        let second = pipeline
            .run(&generator, None, &input, &dir.path().join("out2"))
            .await
            .unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(read_notes(&first), read_notes(&second));
    }

    #[tokio::test]
    async fn notes_follow_field_order_with_fallback_guids() {
        let dir = tempdir().unwrap();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &dir.path().join("cache"), false)
            .await
            .unwrap();
        let package = pipeline
            .run(&MockGenerator::new(), None, &batch(&["run"]), &dir.path().join("out"))
            .await
            .unwrap();

        let notes = read_notes(&package);
        assert_eq!(notes[0]["guid"], "TestDeck-1");
        // Order: word, explanation, example sentences, frequency.
        assert_eq!(
            notes[0]["fields"],
            json!(["run", "explanation of run", "run - first<br>run - second", "1"])
        );
    }

    #[tokio::test]
    async fn explicit_guids_are_honored() {
        let dir = tempdir().unwrap();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &dir.path().join("cache"), false)
            .await
            .unwrap();
        let mut input = batch(&["run"]);
        input.guids = Some(vec!["legacy-7".to_string()]);
        let package = pipeline
            .run(&MockGenerator::new(), None, &input, &dir.path().join("out"))
            .await
            .unwrap();
        assert_eq!(read_notes(&package)[0]["guid"], "legacy-7");
    }

    #[tokio::test]
    async fn failed_batch_flushes_completed_items_and_resumes() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let input = batch(&["one", "two", "three", "four"]);

        // Fails on the third provider call: two items complete.
        let generator = MockGenerator::failing_from(3);
        let pipeline = DeckGenerator::new(schema(), deck_config(), &cache_dir, false)
            .await
            .unwrap();
        let result = pipeline
            .run(&generator, None, &input, &dir.path().join("out1"))
            .await;
        assert!(matches!(result, Err(DecksmithError::Generation { .. })));

        // No package, but the cache holds exactly the two completed records.
        assert!(!dir.path().join("out1/TestDeck.apkg").exists());
        let cache = ContentCache::load(&cache_dir.join("content_cache.json")).await;
        assert_eq!(cache.len(), 2);
        assert!(cache.get("one").is_some());
        assert!(cache.get("two").is_some());

        // The rerun only pays for the remaining items.
        let generator = MockGenerator::new();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &cache_dir, false)
            .await
            .unwrap();
        pipeline
            .run(&generator, None, &input, &dir.path().join("out2"))
            .await
            .unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn signal_flush_persists_completed_records() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let pipeline = DeckGenerator::new(schema(), deck_config(), &cache_dir, false)
            .await
            .unwrap();

        // Two items had completed when the termination arrived.
        let generator = MockGenerator::new();
        {
            let mut cache = pipeline.content_cache.lock().await;
            for item in ["one", "two"] {
                let record = generator
                    .generate(item, &pipeline.record_type)
                    .await
                    .unwrap();
                cache.put(item.to_string(), record);
            }
        }

        // The flush the signal task runs before exiting with 128+signo.
        flush_shared_cache(&pipeline.content_cache, &pipeline.cache_path).await;

        let reloaded = ContentCache::load(&pipeline.cache_path).await;
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.get("one").is_some());
        assert!(reloaded.get("two").is_some());
    }

    #[tokio::test]
    async fn underscored_field_names_survive_the_merge() {
        let dir = tempdir().unwrap();
        let schema = SchemaDefinition {
            fields: vec![FieldSpec {
                name: "wiktionary_link".to_string(),
                description: "Dictionary link for the word".to_string(),
                list: false,
            }],
            item_field: "word".to_string(),
            provided_fields: vec![],
            field_order: None,
        };
        let pipeline = DeckGenerator::new(schema, deck_config(), &dir.path().join("cache"), false)
            .await
            .unwrap();
        let input = BatchInput {
            items: vec!["run".to_string()],
            provided: BTreeMap::new(),
            guids: None,
        };
        let package = pipeline
            .run(&MockGenerator::new(), None, &input, &dir.path().join("out"))
            .await
            .unwrap();

        // The literal underscore in the declared name must round-trip through
        // the merge, or the field vanishes from every note.
        assert_eq!(
            read_notes(&package)[0]["fields"],
            json!(["run", "wiktionary_link of run"])
        );
    }

    #[tokio::test]
    async fn flush_failure_on_a_successful_batch_is_an_error() {
        let dir = tempdir().unwrap();
        // A file where the cache directory should be makes the flush fail.
        let cache_dir = dir.path().join("cache");
        std::fs::write(&cache_dir, b"occupied").unwrap();

        let pipeline = DeckGenerator::new(schema(), deck_config(), &cache_dir, false)
            .await
            .unwrap();
        let result = pipeline
            .run(
                &MockGenerator::new(),
                None,
                &batch(&["run"]),
                &dir.path().join("out"),
            )
            .await;

        assert!(matches!(result, Err(DecksmithError::Io(_))));
        assert!(!dir.path().join("out/TestDeck.apkg").exists());
    }

    #[tokio::test]
    async fn audio_is_cached_and_referenced_from_notes() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let input = batch(&["run"]);

        let synth = MockSynth::new();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &cache_dir, true)
            .await
            .unwrap();
        let package = pipeline
            .run(
                &MockGenerator::new(),
                Some(&synth),
                &input,
                &dir.path().join("out1"),
            )
            .await
            .unwrap();
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);

        let notes = read_notes(&package);
        let fields = notes[0]["fields"].as_array().unwrap();
        assert_eq!(
            fields.last().unwrap().as_str().unwrap(),
            "[sound:TestDeck-1.mp3]"
        );
        let media = dir.path().join("out1/media/TestDeck-1.mp3");
        assert_eq!(std::fs::read(&media).unwrap(), b"mp3:run");

        // Same guid on the next run: the durable copy is reused byte for byte.
        let synth = MockSynth::new();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &cache_dir, true)
            .await
            .unwrap();
        pipeline
            .run(
                &MockGenerator::new(),
                Some(&synth),
                &input,
                &dir.path().join("out2"),
            )
            .await
            .unwrap();
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
        let reused = dir.path().join("out2/media/TestDeck-1.mp3");
        assert_eq!(std::fs::read(&reused).unwrap(), b"mp3:run");
    }

    #[tokio::test]
    async fn audio_enabled_without_synthesizer_is_rejected() {
        let dir = tempdir().unwrap();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &dir.path().join("cache"), true)
            .await
            .unwrap();
        let result = pipeline
            .run(&MockGenerator::new(), None, &batch(&["run"]), &dir.path().join("out"))
            .await;
        assert!(matches!(result, Err(DecksmithError::BatchInput { .. })));
    }

    #[tokio::test]
    async fn mismatched_provided_lengths_are_rejected() {
        let dir = tempdir().unwrap();
        let pipeline = DeckGenerator::new(schema(), deck_config(), &dir.path().join("cache"), false)
            .await
            .unwrap();
        let mut input = batch(&["run", "walk"]);
        input
            .provided
            .insert("frequency".to_string(), vec![json!(1)]);
        let result = pipeline
            .run(&MockGenerator::new(), None, &input, &dir.path().join("out"))
            .await;
        assert!(matches!(result, Err(DecksmithError::BatchInput { .. })));
    }
}
