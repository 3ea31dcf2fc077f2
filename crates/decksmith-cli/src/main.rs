mod config;
mod import;

use std::{path::PathBuf, time::Duration};

use anyhow::{Result, bail};
use clap::Parser;
use console::style;
use decksmith_core::{
    BatchInput, DeckGenerator, GoogleTts, OpenRouterGenerator, SpeechSynthesizer,
    default_cache_root,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use crate::import::ImportedBatch;

#[derive(Parser)]
#[command(name = "decksmith")]
#[command(
    about = "Generate flashcard deck packages with LLM-written content and synthesized pronunciation audio"
)]
struct Cli {
    /// Deck specification file (deck identity, schema, provider settings)
    #[arg(short, long)]
    config: PathBuf,

    /// Word list: one item per line, frequency = rank
    #[arg(short, long, conflicts_with = "legacy")]
    words: Option<PathBuf>,

    /// Legacy flat-file export with control-character-separated note fields
    #[arg(short, long)]
    legacy: Option<PathBuf>,

    /// Output directory for the package and its media
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Cache directory (defaults to a per-deck directory under the user cache)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Process only the first N items
    #[arg(long)]
    limit: Option<usize>,

    /// Skip audio synthesis even if the deck spec enables it
    #[arg(long)]
    no_audio: bool,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let spec = config::load(&cli.config).await?;
    let gen_audio = spec.gen_audio && !cli.no_audio;

    // Validate API keys early, before any import work
    let generator = match OpenRouterGenerator::from_env(spec.llm) {
        Ok(generator) => generator,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    let synthesizer: Option<GoogleTts> = if gen_audio {
        let Some(tts) = spec.tts else {
            bail!("deck spec enables audio but has no tts section");
        };
        match GoogleTts::from_env(tts) {
            Ok(synth) => Some(synth),
            Err(e) => {
                eprintln!("{} {}", style("Error:").red().bold(), e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let ImportedBatch {
        mut items,
        mut provided,
    } = match (&cli.words, &cli.legacy) {
        (Some(words), None) => import::read_word_list(words).await?,
        (None, Some(legacy)) => import::read_legacy_export(legacy).await?,
        _ => bail!("provide exactly one of --words or --legacy"),
    };

    if let Some(limit) = cli.limit {
        items.truncate(limit);
        for values in provided.values_mut() {
            values.truncate(limit);
        }
    }
    // Only fields the schema declares as provided get merged into notes.
    provided.retain(|field, _| spec.schema.provided_fields.contains(field));

    println!(
        "\n{}  {}\n",
        style("decksmith").cyan().bold(),
        style("Deck Generator").dim()
    );
    println!(
        "{} {} items for deck '{}'",
        style("→").cyan(),
        items.len(),
        style(&spec.deck.deck_name).yellow()
    );

    let cache_dir = cli
        .cache_dir
        .unwrap_or_else(|| default_cache_root().join(spec.deck.name_prefix()));
    let deck_name = spec.deck.deck_name.clone();
    let pipeline = DeckGenerator::new(spec.schema, spec.deck, &cache_dir, gen_audio).await?;
    pipeline.install_signal_flush();

    let input = BatchInput {
        items,
        provided,
        guids: None,
    };

    let spinner = create_spinner(&format!("Generating '{deck_name}'..."));
    let package_path = pipeline
        .run(
            &generator,
            synthesizer.as_ref().map(|s| s as &dyn SpeechSynthesizer),
            &input,
            &cli.output,
        )
        .await?;
    spinner.finish_with_message(format!(
        "{} Deck generated ({} notes)",
        style("✓").green().bold(),
        input.items.len()
    ));

    println!(
        "\n{} {}\n",
        style("Saved:").dim(),
        style(package_path.display()).cyan()
    );

    Ok(())
}
