use text2sql::config::Settings;
use text2sql::db::demo::init_demo_db;
use text2sql::db::{render_row, Database, SqliteDatabase};
use text2sql::eval::{
    console_table, csv_table, evaluate, load_dataset, markdown_table, run_multi_provider, write_details,
    BenchmarkOptions,
};
use text2sql::execution_loop::TextToSqlPipeline;
use text2sql::feedback::{FeedbackEntry, FeedbackLog, Vote, DEFAULT_MAX_EXAMPLES};
use text2sql::prompting::ExamplePair;
use text2sql::providers::ProviderRegistry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const BUILTIN_PROVIDERS: [&str; 3] = ["naive", "openai", "ollama"];

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(about = "Natural-language questions to validated, read-only SQL")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Thumbs {
    Up,
    Down,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question against a SQLite database
    Ask {
        /// The question in natural language
        question: String,

        /// Generator: naive, openai or ollama
        #[arg(short, long, default_value = "naive")]
        provider: String,

        /// SQLite database (default: SQLITE_DB_PATH or data/demo_music.sqlite)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Hide result rows
        #[arg(long)]
        no_show_rows: bool,

        /// Maximum rows to print
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Rate the answer
        #[arg(long, value_enum)]
        thumbs: Option<Thumbs>,

        /// Corrected SQL to run instead, logged as a few-shot example
        #[arg(long)]
        correction: Option<String>,
    },
    /// Run the EM/EX benchmark for one provider
    Bench {
        /// Spider-style JSON dataset
        dataset: PathBuf,

        /// Generator: naive, openai or ollama
        provider: String,

        /// Folder holding per-item databases (db_id/db_id.sqlite)
        #[arg(long)]
        db_root: Option<PathBuf>,

        /// Fallback SQLite database
        #[arg(long)]
        default_db: Option<PathBuf>,

        /// Only the first N items
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Benchmark several providers and write comparison reports
    Compare {
        /// Spider-style JSON dataset
        dataset: PathBuf,

        /// Default SQLite database
        #[arg(long = "db")]
        default_db: Option<PathBuf>,

        /// Folder holding per-item databases (db_id/db_id.sqlite)
        #[arg(long)]
        db_root: Option<PathBuf>,

        /// Providers to benchmark
        #[arg(long, num_args = 1.., default_values_t = vec!["naive".to_string()])]
        providers: Vec<String>,

        /// Benchmark every available built-in provider
        #[arg(long)]
        all_available: bool,

        /// Only the first N items
        #[arg(long)]
        limit: Option<usize>,

        /// Markdown report path
        #[arg(long)]
        output_md: Option<PathBuf>,

        /// CSV report path; details JSON is written beside it
        #[arg(long)]
        output_csv: Option<PathBuf>,
    },
    /// Create (or recreate) the demo music database
    InitDemo {
        /// Target path (default: SQLITE_DB_PATH or data/demo_music.sqlite)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::from_env();

    match args.command {
        Commands::Ask {
            question,
            provider,
            db_path,
            no_show_rows,
            limit,
            thumbs,
            correction,
        } => {
            let db_path = db_path.unwrap_or_else(|| settings.db_path.clone());
            ask(&settings, &question, &provider, &db_path, !no_show_rows, limit, thumbs, correction)
        }
        Commands::Bench {
            dataset,
            provider,
            db_root,
            default_db,
            limit,
        } => {
            let mut opts = BenchmarkOptions::new(default_db.unwrap_or_else(|| settings.db_path.clone()));
            opts.db_root = db_root;
            opts.limit = limit;
            bench(&settings, &dataset, &provider, &opts)
        }
        Commands::Compare {
            dataset,
            default_db,
            db_root,
            providers,
            all_available,
            limit,
            output_md,
            output_csv,
        } => {
            let mut opts = BenchmarkOptions::new(default_db.unwrap_or_else(|| settings.db_path.clone()));
            opts.db_root = db_root;
            opts.limit = limit;
            compare(&settings, &dataset, providers, all_available, &opts, output_md, output_csv)
        }
        Commands::InitDemo { path } => {
            let path = path.unwrap_or_else(|| settings.db_path.clone());
            init_demo_db(&path).with_context(|| format!("failed to create {}", path.display()))?;
            println!("Demo database created at {}", path.display());
            Ok(())
        }
    }
}

fn build_pipeline(settings: &Settings) -> TextToSqlPipeline {
    let log = FeedbackLog::new(&settings.feedback_path);
    let examples: Vec<ExamplePair> = match log.load_examples(DEFAULT_MAX_EXAMPLES) {
        Ok(examples) => examples,
        Err(e) => {
            warn!("Could not load feedback examples: {}", e);
            Vec::new()
        }
    };
    info!("Loaded {} feedback examples", examples.len());
    TextToSqlPipeline::new(ProviderRegistry::from_settings(settings)).with_examples(examples)
}

#[allow(clippy::too_many_arguments)]
fn ask(
    settings: &Settings,
    question: &str,
    provider: &str,
    db_path: &Path,
    show_rows: bool,
    limit: usize,
    thumbs: Option<Thumbs>,
    correction: Option<String>,
) -> Result<()> {
    let pipeline = build_pipeline(settings);
    let db = SqliteDatabase::new(db_path);

    let output = pipeline.run(question, provider, &db)?;
    let (sql, rows, summary) = match &correction {
        Some(corrected) => {
            let rows = db
                .execute(corrected)
                .with_context(|| "corrected SQL failed to execute")?;
            let summary = format!("User-corrected SQL executed. {} rows.", rows.len());
            (corrected.clone(), rows, summary)
        }
        None => (output.sql, output.rows, output.summary),
    };

    println!("\nSQL:\n{}", sql);
    if show_rows {
        if rows.is_empty() {
            println!("No rows returned");
        } else {
            println!("\nResults:");
            for row in rows.iter().take(limit) {
                println!("{}", render_row(row));
            }
        }
    }
    println!("\nSummary:\n{}", summary);

    let mut entry = FeedbackEntry::new(question, provider, sql.as_str(), rows.len(), summary.as_str());
    if let Some(thumbs) = thumbs {
        entry = entry.with_vote(match thumbs {
            Thumbs::Up => Vote::Up,
            Thumbs::Down => Vote::Down,
        });
    }
    if let Some(corrected) = correction {
        entry = entry.with_correction(corrected);
    }
    if let Err(e) = FeedbackLog::new(&settings.feedback_path).append(&entry) {
        warn!("Could not log feedback: {}", e);
    }
    Ok(())
}

fn bench(settings: &Settings, dataset: &Path, provider: &str, opts: &BenchmarkOptions) -> Result<()> {
    let items = load_dataset(dataset).with_context(|| format!("failed to load {}", dataset.display()))?;
    let pipeline = build_pipeline(settings);
    let metrics = evaluate(&items, provider, opts, &pipeline)?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn compare(
    settings: &Settings,
    dataset: &Path,
    providers: Vec<String>,
    all_available: bool,
    opts: &BenchmarkOptions,
    output_md: Option<PathBuf>,
    output_csv: Option<PathBuf>,
) -> Result<()> {
    let items = load_dataset(dataset).with_context(|| format!("failed to load {}", dataset.display()))?;
    let pipeline = build_pipeline(settings);

    let providers = if all_available {
        let available: Vec<String> = BUILTIN_PROVIDERS
            .iter()
            .filter(|p| pipeline.registry().is_available(p))
            .map(|p| p.to_string())
            .collect();
        info!("Available providers: {:?}", available);
        available
    } else {
        providers
    };

    let report = run_multi_provider(&items, &providers, opts, &pipeline);
    println!("{}", console_table(&report));

    if let Some(path) = &output_md {
        write_report(path, &markdown_table(&report))?;
        println!("Saved markdown to {}", path.display());
    }
    if let Some(path) = &output_csv {
        write_report(path, &csv_table(&report)?)?;
        println!("Saved CSV to {}", path.display());
    }

    let details = match &output_csv {
        Some(csv) => {
            let stem = csv.file_stem().and_then(|s| s.to_str()).unwrap_or("benchmark");
            csv.with_file_name(format!("{}_details.json", stem))
        }
        None => PathBuf::from("eval/benchmark_details.json"),
    };
    write_details(&details, &report)?;
    Ok(())
}

fn write_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
