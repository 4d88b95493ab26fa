// ==============================================================================
// main.rs - Variant Merge Entry Point
// ==============================================================================
// Description: Command-line front end: loads variant tables, runs a merge
//              strategy and writes the packaged result
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2025-11-19
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use variant_merge::merge::{Merge, MergeConfig, MergeStrategy, PivotJoinOptions, StrategyKind};
use variant_merge::output::{DirectorySink, RunSummary};
use variant_merge::parsers::ParseOptions;
use variant_merge::validator::SourceLoader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Merge strategy (union-count, pivot-join, allele-normalize)
    #[arg(short, long, env = "VARIANT_MERGE_STRATEGY")]
    strategy: String,

    /// Input column delimiter: a single character, or "\t" / "tab"
    #[arg(short, long, env = "VARIANT_MERGE_DELIMITER", default_value = "\\t")]
    delimiter: String,

    /// Drop input lines starting with this prefix (repeatable, e.g. "##")
    #[arg(long = "ignore-prefix")]
    ignore_prefixes: Vec<String>,

    /// Select/rename input columns as LOGICAL=SOURCE (repeatable)
    #[arg(long = "column")]
    columns: Vec<String>,

    /// Inputs have no header line; columns are named by position ("0", "1", ...)
    /// and must be mapped with --column, e.g. --column CHROM=0
    #[arg(long, requires = "columns")]
    no_header: bool,

    /// Pivot join: reject inputs that describe more than one sample
    #[arg(long)]
    single_sample: bool,

    /// Directory receiving the result file
    #[arg(short, long, env = "VARIANT_MERGE_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Input tables (plain or gzip-compressed)
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn parse_delimiter(value: &str) -> Result<char> {
    match value {
        "\\t" | "tab" | "\t" => Ok('\t'),
        _ => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => anyhow::bail!("Delimiter must be a single character, got \"{}\"", value),
            }
        }
    }
}

fn parse_columns(columns: &[String]) -> Result<Vec<(String, String)>> {
    columns
        .iter()
        .map(|mapping| {
            let (logical, source) = mapping
                .split_once('=')
                .with_context(|| format!("Column mapping \"{}\" must be LOGICAL=SOURCE", mapping))?;
            Ok((logical.trim().to_string(), source.trim().to_string()))
        })
        .collect()
}

fn build_config(args: &Args) -> Result<MergeConfig> {
    let mut parse_options = ParseOptions::default();
    for prefix in &args.ignore_prefixes {
        parse_options = parse_options.ignore_prefix(prefix.clone());
    }
    if !args.columns.is_empty() {
        parse_options = parse_options.with_columns(parse_columns(&args.columns)?);
    }
    if args.no_header {
        parse_options = parse_options.without_header();
    }

    Ok(MergeConfig {
        delimiter: parse_delimiter(&args.delimiter)?,
        parse_options,
        pivot: PivotJoinOptions {
            single_sample: args.single_sample,
            ..PivotJoinOptions::default()
        },
    })
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "variant_merge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Variant merge starting...");

    let args = Args::parse();

    let kind: StrategyKind = args.strategy.parse()?;
    let config = build_config(&args)?;

    let validated = SourceLoader::new()
        .load_all(&args.files)
        .context("Failed to load input files")?;
    let input_summaries: Vec<_> = validated.iter().map(|v| v.summary()).collect();
    let sources = validated.into_iter().map(|v| v.source).collect();

    let mut strategy = MergeStrategy::select(kind, sources, &config)
        .with_context(|| format!("Failed to prepare {} merge", kind))?;

    let result = strategy.process().and_then(|_| strategy.save());
    if let Err(e) = result {
        warn!("Merge failed: {}", e);
        return Err(e).with_context(|| format!("{} merge failed", kind));
    }

    let tables = strategy.outputs()?.to_vec();

    let mut sink = DirectorySink::new(&args.output_dir);
    let artifact = strategy
        .emit(&mut sink)
        .context("Failed to write merge result")?;

    if let Some(path) = &args.summary {
        RunSummary::new(kind, input_summaries, &tables, &artifact)
            .write(path)
            .with_context(|| format!("Failed to write run summary {:?}", path))?;
        info!("Run summary written to {:?}", path);
    }

    info!("Merge complete, result: {}", artifact.file_name);
    Ok(())
}
