use aggrelite_core::document::{load_collection, load_json};
use aggrelite_core::logging::{self, LogLevel};
use aggrelite_core::{log_info, Pipeline, PipelineOptions, ScalarUnwind};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "aggrelite")]
#[command(about = "AggreLite CLI - run aggregation pipelines over JSON document files")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace); overrides AGGRELITE_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline over a collection and print the result as a JSON array
    Run {
        /// Pipeline file (JSON array of stages)
        pipeline: PathBuf,
        /// Collection file (JSON array, or JSON Lines for .jsonl/.ndjson)
        #[arg(long, short)]
        input: PathBuf,
        /// Write the result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,
        /// $unwind policy for scalar values: drop or singleton
        #[arg(long, default_value_t = ScalarUnwind::Drop)]
        scalar_unwind: ScalarUnwind,
        /// Fail on references to missing fields
        #[arg(long)]
        strict_paths: bool,
    },
    /// Parse a pipeline file and print its stages
    Check {
        /// Pipeline file (JSON array of stages)
        pipeline: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_from_env();
    if let Some(level) = cli.log_level {
        logging::set_log_level(level);
    }

    match cli.command {
        Commands::Run {
            pipeline,
            input,
            output,
            pretty,
            scalar_unwind,
            strict_paths,
        } => {
            let options = PipelineOptions::new()
                .with_scalar_unwind(scalar_unwind)
                .with_strict_field_paths(strict_paths);
            run_pipeline(&pipeline, &input, output.as_deref(), pretty, options)
        }
        Commands::Check { pipeline } => check_pipeline(&pipeline),
    }
}

fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let json = load_json(path)
        .with_context(|| format!("Failed to read pipeline: {}", path.display()))?;
    Pipeline::from_json(&json).with_context(|| format!("Invalid pipeline in: {}", path.display()))
}

/// Run pipeline file over collection file
fn run_pipeline(
    pipeline_path: &Path,
    input: &Path,
    output: Option<&Path>,
    pretty: bool,
    options: PipelineOptions,
) -> Result<()> {
    let pipeline = load_pipeline(pipeline_path)?.with_options(options);

    let docs = load_collection(input)
        .with_context(|| format!("Failed to load collection: {}", input.display()))?;
    log_info!("loaded {} documents from {}", docs.len(), input.display());

    let results = pipeline
        .execute(docs)
        .with_context(|| format!("Pipeline failed: {}", pipeline_path.display()))?;

    let results = Value::Array(results);
    let json = if pretty {
        serde_json::to_string_pretty(&results)
    } else {
        serde_json::to_string(&results)
    }
    .with_context(|| "Failed to serialize result")?;

    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write to file: {}", path.display()))?;
            log_info!("wrote result to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Validate pipeline file and print one line per stage
fn check_pipeline(path: &Path) -> Result<()> {
    let pipeline = load_pipeline(path)?;

    for (i, stage) in pipeline.stages().iter().enumerate() {
        println!("{:>3}  {}", i, stage);
    }
    println!(
        "OK: {} stages in {}",
        pipeline.stages().len(),
        path.display()
    );
    Ok(())
}
