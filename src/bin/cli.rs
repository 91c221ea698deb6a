// Polyglot Reader - Sentence-Synchronized Multilingual Audiobook Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use polyglot_core::audio::{AudioResolver, InMemoryAudioMaps, JsonAudioMapSource, SimulatedOutput};
use polyglot_core::content::{ChapterAddress, ContentProvider, Language, LanguageSlots, StaticContentProvider};
use polyglot_core::playback::{load_layout, PlaybackEngine, PlaybackMode, PlaybackNotification};
use polyglot_core::progress::{ProgressStore, SqliteProgressStore};
use polyglot_core::{EngineConfig, PlaybackError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyglot-cli")]
#[command(about = "Polyglot CLI - sentence-synchronized playback from the terminal", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Progress database, overrides the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print subdivisions and chapters of a book
    Outline {
        /// Content bundle (JSON)
        #[arg(short, long)]
        book: PathBuf,
    },
    /// Resolve the audio range of one sentence
    Resolve {
        /// Content index (JSON)
        #[arg(long)]
        index: PathBuf,
        /// Playback map (JSON)
        #[arg(long)]
        map: PathBuf,
        /// Sentence id
        sentence: String,
        /// Language code
        language: String,
    },
    /// Play a book with simulated audio output
    Play {
        /// Content bundle (JSON)
        #[arg(short, long)]
        book: PathBuf,
        /// Content index (JSON); without it every sentence gets uniform audio
        #[arg(long, requires = "map")]
        index: Option<PathBuf>,
        /// Playback map (JSON)
        #[arg(long, requires = "index")]
        map: Option<PathBuf>,
        /// Language slots in order, e.g. "en,es,fr"
        #[arg(short, long, value_delimiter = ',')]
        languages: Vec<String>,
        /// "sentence" or "paragraph"
        #[arg(short, long)]
        mode: Option<String>,
        /// Start chapter as SUBDIVISION:CHAPTER (zero based)
        #[arg(long)]
        chapter: Option<String>,
        /// Stop after this many segments
        #[arg(long)]
        segments: Option<usize>,
        /// Clock speed-up of the simulated output
        #[arg(long, default_value_t = 20.0)]
        time_scale: f64,
        /// Sentence length for uniform audio
        #[arg(long, default_value_t = 2000.0)]
        sentence_ms: f64,
    },
    /// Show saved progress for a book, or the most recently played books
    Progress {
        book_id: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Forget saved progress for a book
    Reset {
        book_id: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "polyglot_core=debug,polyglot_cli=debug"
    } else {
        "polyglot_core=info,polyglot_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    Ok(config)
}

fn parse_chapter(value: &str) -> anyhow::Result<ChapterAddress> {
    let Some((subdivision, chapter)) = value.split_once(':') else {
        bail!("Chapter must look like SUBDIVISION:CHAPTER, got '{}'", value);
    };
    Ok(ChapterAddress::new(
        subdivision.trim().parse().context("Invalid subdivision index")?,
        chapter.trim().parse().context("Invalid chapter index")?,
    ))
}

async fn outline(book: PathBuf) -> anyhow::Result<()> {
    let content = StaticContentProvider::from_json_file(&book)
        .with_context(|| format!("Failed to read book {}", book.display()))?;
    let structure = content.book_structure();
    println!("{} ({})", structure.title, structure.book_id);
    println!("Languages: {:?}", content.available_languages());

    for (s, subdivision) in structure.subdivisions.iter().enumerate() {
        println!("[{}] {}", s, subdivision.title);
        for (c, chapter) in subdivision.chapters.iter().enumerate() {
            let layout = load_layout(&content, ChapterAddress::new(s, c))?;
            println!(
                "  [{}:{}] {} - {} sentences",
                s,
                c,
                chapter.title,
                layout.sentence_count()
            );
            for span in layout.paragraphs() {
                println!(
                    "      {} {:?} {}..{}",
                    span.paragraph_id,
                    span.paragraph_type,
                    span.start,
                    span.end()
                );
            }
        }
    }
    Ok(())
}

async fn resolve(index: PathBuf, map: PathBuf, sentence: String, language: String) -> anyhow::Result<()> {
    let resolver = AudioResolver::from_source(&JsonAudioMapSource::new(index, map))
        .context("Failed to load audio maps")?;
    let segment = resolver
        .resolve(&sentence, &Language::new(&language))
        .with_context(|| format!("Cannot resolve '{}' in '{}'", sentence, language))?;
    println!("{}", serde_json::to_string_pretty(&segment)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn play(
    mut config: EngineConfig,
    book: PathBuf,
    maps: Option<(PathBuf, PathBuf)>,
    languages: Vec<String>,
    mode: Option<String>,
    chapter: Option<String>,
    segments: Option<usize>,
    time_scale: f64,
    sentence_ms: f64,
) -> anyhow::Result<()> {
    if !languages.is_empty() {
        config.languages = LanguageSlots::from_codes(&languages)?;
    }
    if let Some(mode) = mode {
        config.default_mode = PlaybackMode::parse(&mode)
            .with_context(|| format!("Unknown playback mode '{}'", mode))?;
    }
    config.validate()?;

    let content = Arc::new(
        StaticContentProvider::from_json_file(&book)
            .with_context(|| format!("Failed to read book {}", book.display()))?,
    );
    let resolver = match maps {
        Some((index, map)) => AudioResolver::from_source(&JsonAudioMapSource::new(index, map))
            .context("Failed to load audio maps")?,
        None => {
            let langs: Vec<Language> = config
                .languages
                .configured()
                .map(|(_, language)| language.clone())
                .collect();
            AudioResolver::from_source(&InMemoryAudioMaps::uniform(content.as_ref(), &langs, sentence_ms)?)?
        }
    };
    let store = SqliteProgressStore::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let output = SimulatedOutput::with_time_scale(time_scale);

    let (handle, task) = PlaybackEngine::start(content.clone(), resolver, output, store, config).await?;
    let mut notifications = handle.subscribe();

    if let Some(chapter) = chapter {
        handle.select_chapter(parse_chapter(&chapter)?).await?;
    }
    let start = handle.snapshot();
    println!(
        "Starting at chapter {}:{} sentence {}/{}",
        start.chapter.subdivision,
        start.chapter.chapter,
        start.position + 1,
        start.chapter_sentence_count
    );
    handle.play().await?;

    let mut played = 0usize;
    loop {
        let notification = tokio::select! {
            received = notifications.recv() => received,
            _ = tokio::signal::ctrl_c() => break,
        };
        let notification = match notification {
            Ok(notification) => notification,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed notifications");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match notification {
            PlaybackNotification::SegmentStarted {
                sentence_id,
                language,
                chunk_id,
                ..
            } => {
                let text = content.translation(&sentence_id, &language).unwrap_or_default();
                println!("[{}] {} ({}) {}", language, sentence_id, chunk_id, text);
                played += 1;
                if segments.is_some_and(|limit| played >= limit) {
                    break;
                }
            }
            PlaybackNotification::ChapterChanged { chapter, origin } => {
                println!("-- chapter {}:{} ({:?})", chapter.subdivision, chapter.chapter, origin);
            }
            PlaybackNotification::AudioUnavailable {
                sentence_id,
                language,
                reason,
            } => {
                println!("No audio for {} in {}: {}", sentence_id, language, reason);
                break;
            }
            PlaybackNotification::MappingError { message } => {
                eprintln!("Playback stopped: {}", message);
                break;
            }
            PlaybackNotification::EndOfBook => {
                println!("-- end of book");
                break;
            }
            PlaybackNotification::StateChanged { .. } => {}
        }
    }

    let last = handle.shutdown().await?;
    task.await.context("Engine task panicked")?;
    println!(
        "Stopped at chapter {}:{} sentence {} ({:.0}%)",
        last.chapter.subdivision,
        last.chapter.chapter,
        last.position + 1,
        last.slider_fraction() * 100.0
    );
    Ok(())
}

async fn progress(config: EngineConfig, book_id: Option<String>, limit: usize) -> anyhow::Result<()> {
    let store = SqliteProgressStore::open(&config.database_path).await?;
    let entries = match book_id {
        Some(book_id) => store.load(&book_id).await?.into_iter().collect(),
        None => store.recent(limit).await?,
    };
    if entries.is_empty() {
        println!("No saved progress");
    }
    for entry in entries {
        println!(
            "{} \"{}\" chapter {}:{} sentence {} mode {} ({})",
            entry.book_id,
            entry.book_title,
            entry.chapter.subdivision,
            entry.chapter.chapter,
            entry.position + 1,
            entry.mode.as_str(),
            entry.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn reset(config: EngineConfig, book_id: String) -> anyhow::Result<()> {
    let store = SqliteProgressStore::open(&config.database_path).await?;
    if store.delete(&book_id).await? {
        println!("Progress for {} removed", book_id);
    } else {
        println!("No progress saved for {}", book_id);
    }
    Ok(())
}

/// Listener-facing summary ahead of the full error chain
fn report(err: &anyhow::Error) {
    let Some(playback) = err.downcast_ref::<PlaybackError>() else {
        return;
    };
    eprintln!("{}", playback.user_message());
    if playback.is_storage_error() {
        eprintln!("The progress database could not be used; pass --db to choose another file.");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    let result = match cli.command {
        Commands::Outline { book } => outline(book).await,
        Commands::Resolve {
            index,
            map,
            sentence,
            language,
        } => resolve(index, map, sentence, language).await,
        Commands::Play {
            book,
            index,
            map,
            languages,
            mode,
            chapter,
            segments,
            time_scale,
            sentence_ms,
        } => {
            let maps = index.zip(map);
            play(config, book, maps, languages, mode, chapter, segments, time_scale, sentence_ms).await
        }
        Commands::Progress { book_id, limit } => progress(config, book_id, limit).await,
        Commands::Reset { book_id } => reset(config, book_id).await,
    };
    if let Err(err) = &result {
        report(err);
    }
    result
}
