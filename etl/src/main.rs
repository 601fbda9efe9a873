//! listings-etl CLI - extract, clean and load listings datasets
//!
//! # Main Commands
//!
//! ```bash
//! listings-etl run                         # Full ETL for the `listado` collection
//! listings-etl run -c reviews --no-verify  # Another collection
//! listings-etl serve                       # Start HTTP server (port 3000)
//! listings-etl runs list                   # Recorded runs
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! listings-etl transform listings.json     # Transform a local file, print JSON
//! listings-etl verify out.db listado 120   # Check a table's row count
//! listings-etl steps                       # Show the transform steps
//! ```

use clap::{Parser, Subcommand};
use listings_etl::{
    count_rows, parse_csv_file_auto, parse_json_documents, parse_json_lines, run_etl, steps_description,
    Dataset, EtlConfig, EtlOptions, Loader, RunLogger, RunRegistry, Source, TransformPipeline, DEFAULT_COLLECTION,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "listings-etl")]
#[command(about = "Extract, clean and load short-term-rental listings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: extract -> transform -> SQLite + spreadsheet
    Run {
        /// Collection to extract
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,

        /// Directory store (overrides LISTINGS_SOURCE_DIR)
        #[arg(short, long)]
        source_dir: Option<PathBuf>,

        /// Output directory (overrides LISTINGS_OUTPUT_DIR)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Table name (default: collection name)
        #[arg(short, long)]
        table: Option<String>,

        /// Skip the SQLite target
        #[arg(long)]
        no_relational: bool,

        /// Skip the spreadsheet target
        #[arg(long)]
        no_spreadsheet: bool,

        /// Skip the row-count check
        #[arg(long)]
        no_verify: bool,
    },

    /// Transform a local JSON, JSON-lines or CSV file without loading it
    Transform {
        /// Input file
        input: PathBuf,

        /// Output file for the transformed documents (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that a SQLite table holds the expected number of rows
    Verify {
        /// SQLite database
        db: PathBuf,
        /// Table name
        table: String,
        /// Expected row count
        expected: usize,
    },

    /// Show the transform steps
    Steps,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Inspect recorded runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
}

#[derive(Subcommand)]
enum RunsAction {
    /// List recorded runs, most recent first
    List,

    /// Show details of a run
    Show {
        /// Run ID
        id: String,
    },

    /// Delete a run
    Delete {
        /// Run ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            collection,
            source_dir,
            output_dir,
            table,
            no_relational,
            no_spreadsheet,
            no_verify,
        } => {
            cmd_run(RunArgs {
                collection,
                source_dir,
                output_dir,
                table,
                no_relational,
                no_spreadsheet,
                no_verify,
            })
            .await
        }

        Commands::Transform { input, output } => cmd_transform(&input, output.as_deref()),

        Commands::Verify { db, table, expected } => cmd_verify(&db, &table, expected),

        Commands::Steps => {
            println!("{}", steps_description());
            Ok(())
        }

        Commands::Serve { port } => cmd_serve(port).await,

        Commands::Runs { action } => cmd_runs(action),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

struct RunArgs {
    collection: String,
    source_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    table: Option<String>,
    no_relational: bool,
    no_spreadsheet: bool,
    no_verify: bool,
}

async fn cmd_run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = EtlConfig::from_env()?;
    if let Some(dir) = args.source_dir {
        config.source_dir = dir;
        config.data_api = None;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    let mut options = EtlOptions::from_config(&config, &args.collection);
    if let Some(table) = args.table {
        options.table = table;
    }
    if args.no_relational {
        options.relational_path = None;
    }
    if args.no_spreadsheet {
        options.spreadsheet_path = None;
    }
    options.verify = !args.no_verify;

    let logger = RunLogger::with_file("etl", RunLogger::new_run_id(), &config.log_dir, None)?;
    let source = Source::from_config(&config);
    let mut loader = Loader::new();

    let summary = run_etl(&source, &mut loader, &options, &logger).await?;

    eprintln!();
    eprintln!("Transformation report:");
    for line in &summary.record.report {
        eprintln!("  - {}", line);
    }
    eprint!("{}", loader.summary());
    eprintln!(
        "Run {}: {} -> {} rows, {} columns ({} warnings, {} errors)",
        summary.record.id,
        summary.record.extracted_rows,
        summary.record.final_rows,
        summary.record.final_columns,
        summary.record.warnings,
        summary.record.errors
    );
    if let Some(path) = logger.file_path() {
        eprintln!("Log: {}", path.display());
    }
    Ok(())
}

fn read_dataset(input: &Path) -> Result<Dataset, Box<dyn std::error::Error>> {
    let extension = input.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let dataset = match extension {
        "csv" => {
            let parsed = parse_csv_file_auto(input)?;
            tracing::info!(
                "Read {} rows (encoding {}, separator '{}')",
                parsed.dataset.len(),
                parsed.encoding,
                parsed.delimiter.escape_default()
            );
            parsed.dataset
        }
        "jsonl" | "ndjson" => Dataset::from_documents(&parse_json_lines(&fs::read(input)?)?)?,
        _ => Dataset::from_documents(&parse_json_documents(&fs::read(input)?)?)?,
    };
    Ok(dataset)
}

fn cmd_transform(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Processing: {}", input.display());

    let logger = RunLogger::new("etl", RunLogger::new_run_id());
    let mut pipeline = TransformPipeline::new(read_dataset(input)?, &logger);
    pipeline.run();
    eprint!("{}", pipeline.summary());

    let json = serde_json::to_string_pretty(&pipeline.dataset().to_documents())?;
    write_output(&json, output)?;
    Ok(())
}

fn cmd_verify(db: &Path, table: &str, expected: usize) -> Result<(), Box<dyn std::error::Error>> {
    let actual = count_rows(db, table)?;
    if actual == expected {
        eprintln!("Verification passed: {} rows in '{}'", actual, table);
        Ok(())
    } else {
        Err(format!("Row count mismatch: '{}' holds {} rows, expected {}", table, actual, expected).into())
    }
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = EtlConfig::from_env()?;
    listings_etl::server::start_server(port, config).await?;
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

fn cmd_runs(action: RunsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = EtlConfig::from_env()?;
    let mut registry = RunRegistry::with_dir(&config.runs_dir);

    match action {
        RunsAction::List => {
            let runs = registry.list();
            if runs.is_empty() {
                eprintln!("No runs recorded in {}", registry.dir().display());
                return Ok(());
            }
            for run in runs {
                println!("{}", run.headline());
            }
        }

        RunsAction::Show { id } => match registry.get(&id) {
            Some(run) => println!("{}", serde_json::to_string_pretty(run)?),
            None => return Err(format!("Run not found: {}", id).into()),
        },

        RunsAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("Run deleted: {}", id);
        }
    }

    Ok(())
}
