use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use splicer::analysis::{
    AnalysisError, AnalysisProvider, AnalysisSource, AudioAnalysis, Field, FieldValue,
    JsonDirProvider, Parsers,
};
use splicer::audio::{FfmpegCodec, SampleBuffer};
use splicer::db::Database;
use splicer::quantum::Kind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "splicer", version, about = "Rhythm-aware audio splicing over track analyses")]
struct Cli {
    /// Path to the SQLite cache database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Directory of exported analysis documents (<track id>.json)
    #[arg(long, global = true)]
    analysis_dir: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    #[value(alias = "section")]
    Sections,
    #[value(alias = "bar")]
    Bars,
    #[value(alias = "beat")]
    Beats,
    #[value(alias = "tatum")]
    Tatums,
    #[value(alias = "segment")]
    Segments,
}

impl KindArg {
    fn kind(self) -> Kind {
        match self {
            Self::Sections => Kind::Section,
            Self::Bars => Kind::Bar,
            Self::Beats => Kind::Beat,
            Self::Tatums => Kind::Tatum,
            Self::Segments => Kind::Segment,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show a track's global fields and collection sizes
    Info {
        /// Track id, or an audio file with an exported analysis
        source: String,

        /// Re-fetch fields even if cached
        #[arg(long)]
        refresh: bool,
    },

    /// Print every quantum of a kind with its place in the hierarchy
    Context {
        /// Track id, or an audio file with an exported analysis
        source: String,

        #[arg(short, long, value_enum)]
        kind: KindArg,
    },

    /// Render selected quanta of a track into a new audio file
    Splice {
        /// Audio to cut from
        audio: PathBuf,

        /// Track id of the analysis (defaults to the audio file itself)
        source: Option<String>,

        #[arg(short, long, value_enum, default_value = "beats")]
        kind: KindArg,

        /// Keep only quanta at this zero-based position within their parent
        /// (e.g. 0 for downbeats)
        #[arg(long)]
        position: Option<usize>,

        /// Play the selected quanta last to first
        #[arg(long)]
        reverse: bool,

        /// Output file (.wav, otherwise MP3)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Blend two audio files
    Mix {
        a: PathBuf,
        b: PathBuf,

        /// Weight of the longer input, 0 to 1
        #[arg(long, default_value = "0.5")]
        ratio: f64,

        /// Output file (.wav, otherwise MP3)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List analyses stored in the cache
    Cached,

    /// Remove a track's analysis from the cache
    Forget { track_id: String },
}

/// Global fields shown by `info`, in display order.
const INFO_FIELDS: [Field; 8] = [
    Field::Duration,
    Field::Tempo,
    Field::TimeSignature,
    Field::Key,
    Field::Mode,
    Field::Loudness,
    Field::EndOfFadeIn,
    Field::StartOfFadeOut,
];

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = splicer::config::AppConfig::load();

    // Resolve paths: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(splicer::config::default_db_path);
    log::info!("Database: {}", db_path.display());
    let analysis_dir = cli
        .analysis_dir
        .or(config.analysis_dir.clone())
        .unwrap_or_else(splicer::config::default_analysis_dir);
    log::info!("Analyses: {}", analysis_dir.display());

    let db = Database::open(&db_path).context("Failed to open database")?;
    let provider: Rc<dyn AnalysisProvider> = Rc::new(JsonDirProvider::new(analysis_dir));
    let codec = FfmpegCodec::new(&config.audio);

    match cli.command {
        Commands::Info { source, refresh } => {
            let (mut analysis, source_path) = open_analysis(&db, &provider, &source)?;
            if refresh {
                for field in Field::ALL {
                    optional(analysis.refresh(field).map(|_| ()))?;
                }
            }
            print_info(&analysis)?;
            store(&db, &analysis, source_path.as_deref())?;
        }

        Commands::Context { source, kind } => {
            let (analysis, source_path) = open_analysis(&db, &provider, &source)?;
            let quanta = analysis
                .quanta(kind.kind())
                .with_context(|| format!("No {} for {}", kind.kind(), analysis.id()))?;
            for q in quanta {
                println!("{:<28} {}", q.to_string(), analysis.context_string(q)?);
            }
            store(&db, &analysis, source_path.as_deref())?;
        }

        Commands::Splice {
            audio,
            source,
            kind,
            position,
            reverse,
            output,
        } => {
            let source = match source {
                Some(s) => s,
                None => audio.to_string_lossy().to_string(),
            };
            let (analysis, source_path) = open_analysis(&db, &provider, &source)?;
            let all = analysis
                .quanta(kind.kind())
                .with_context(|| format!("No {} for {}", kind.kind(), analysis.id()))?;
            let selected = match position {
                Some(n) => all.that(|q| {
                    matches!(analysis.local_context(q), Ok((index, _)) if index == n)
                }),
                None => all.clone(),
            };
            if selected.is_empty() {
                anyhow::bail!("Nothing selected from {} {}", all.len(), kind.kind());
            }

            let buffer = SampleBuffer::load(&audio, &codec)
                .with_context(|| format!("Failed to decode {}", audio.display()))?;
            let rendered = if reverse {
                splicer::audio::assemble(&buffer, selected.iter().rev())
            } else {
                splicer::audio::assemble(&buffer, &selected)
            }
            .context("Assembly failed")?;
            let written = rendered
                .into_trimmed()
                .save(&output, &codec)
                .context("Failed to write output")?;
            println!(
                "Spliced {} of {} {} into {}",
                selected.len(),
                all.len(),
                kind.kind(),
                written.display()
            );
            store(&db, &analysis, source_path.as_deref())?;
        }

        Commands::Mix { a, b, ratio, output } => {
            let first = load_audio(&a, &codec)?;
            let second = load_audio(&b, &codec)?;
            let mixed = splicer::audio::mix(&first, &second, ratio).context("Mix failed")?;
            let written = mixed
                .save(&output, &codec)
                .context("Failed to write output")?;
            println!(
                "Mixed {:.2}s of audio into {}",
                mixed.duration(),
                written.display()
            );
        }

        Commands::Cached => {
            let analyses = db.list_analyses().context("Query failed")?;
            if analyses.is_empty() {
                println!("No cached analyses.");
                return Ok(());
            }
            println!(
                "{:<24} {:>6}  {:<19}  {}",
                "Track", "Fields", "Updated", "Source"
            );
            for s in &analyses {
                println!(
                    "{:<24} {:>6}  {:<19}  {}",
                    s.track_id,
                    s.field_count,
                    s.updated_at,
                    s.source_path.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Forget { track_id } => {
            if db.forget_analysis(&track_id).context("Delete failed")? {
                println!("Forgot {track_id}");
            } else {
                println!("{track_id} is not cached");
            }
        }
    }

    Ok(())
}

/// Build the record for `source`, preferring the cache for both the
/// file-to-id resolution and the field values.
fn open_analysis(
    db: &Database,
    provider: &Rc<dyn AnalysisProvider>,
    source: &str,
) -> Result<(AudioAnalysis, Option<String>)> {
    let (id, source_path) = match AnalysisSource::classify(source)? {
        AnalysisSource::Id(id) => (id, None),
        AnalysisSource::Path(path) => {
            let key = std::fs::canonicalize(&path)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            let id = match db.find_by_source(&key)? {
                Some(id) => id,
                None => AudioAnalysis::new(&key, provider.clone(), Parsers::standard())?
                    .id()
                    .to_string(),
            };
            (id, Some(key))
        }
    };

    let analysis = match db.load_snapshot(&id)? {
        Some(snapshot) => AudioAnalysis::restore(snapshot, provider.clone(), Parsers::standard()),
        None => AudioAnalysis::from_id(id, provider.clone(), Parsers::standard()),
    };
    Ok((analysis, source_path))
}

fn store(db: &Database, analysis: &AudioAnalysis, source_path: Option<&str>) -> Result<()> {
    db.store_analysis(&analysis.snapshot(), source_path)
        .context("Failed to cache analysis")?;
    Ok(())
}

fn load_audio(path: &Path, codec: &FfmpegCodec) -> Result<SampleBuffer> {
    SampleBuffer::load(path, codec).with_context(|| format!("Failed to decode {}", path.display()))
}

/// Treat a field the provider doesn't have as absent.
fn optional<T>(result: splicer::analysis::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(AnalysisError::FieldNotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn print_info(analysis: &AudioAnalysis) -> Result<()> {
    println!("Track: {}", analysis.id());
    if let Some(meta) = optional(analysis.metadata())? {
        for key in ["artist", "title", "release"] {
            if let Some(v) = meta.get(key) {
                println!("  {key:<18} {v}");
            }
        }
    }

    for field in INFO_FIELDS {
        let shown = match optional(analysis.get(field))? {
            Some(FieldValue::Scalar(m)) => fmt_measured(m.value, m.confidence),
            Some(FieldValue::Integer(m)) => fmt_measured(m.value, m.confidence),
            Some(other) => format!("<{}>", other.type_name()),
            None => "-".to_string(),
        };
        println!("  {:<18} {}", field.name(), shown);
    }

    println!();
    for kind in Kind::ALL {
        let count = match optional(analysis.quanta(kind))? {
            Some(list) => list.len().to_string(),
            None => "-".to_string(),
        };
        println!("  {:<18} {}", Field::for_kind(kind).name(), count);
    }
    Ok(())
}

fn fmt_measured(value: impl std::fmt::Display, confidence: Option<f64>) -> String {
    match confidence {
        Some(c) => format!("{value} (confidence {c:.2})"),
        None => value.to_string(),
    }
}
