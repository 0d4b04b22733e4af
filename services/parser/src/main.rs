//! Parser - Turns the raw housing-price workbook into clean tables
//!
//! Responsibilities:
//! - Read every yearly sheet of the workbook (local file or download)
//! - Normalize headers and coerce numbers
//! - Split commune rows from country rows and build the country aggregate
//! - Reconcile commune names against the current and former commune lists
//! - Write commune_level_data.csv and country_level_data.csv
//!
//! Unmatched commune names are reported, not rejected, unless --strict is set.
//!
//! Usage:
//!   cargo run --bin parser
//!   cargo run --bin parser -- --spreadsheet data/vente-maison-2010-2021.xlsx --strict

mod aggregate;
mod classify;
mod columns;
mod config;
mod fetch;
mod ingest;
mod pipeline;
mod reconcile;
mod records;
mod reference;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, PipelineConfig, TableSelector};
use crate::fetch::{Manifest, Resolver};
use crate::ingest::LocalityRewriter;
use crate::pipeline::PipelineOutput;

const SPREADSHEET_SOURCE: &str = "housing-prices";
const CURRENT_COMMUNES_SOURCE: &str = "current-communes";
const FORMER_COMMUNES_SOURCE: &str = "former-communes";

const COMMUNE_OUTPUT: &str = "commune_level_data.csv";
const COUNTRY_OUTPUT: &str = "country_level_data.csv";

#[derive(Parser, Debug)]
#[command(name = "parser", about = "Cleans the housing-price workbook into commune and country tables")]
struct Args {
    /// Path to the pipeline config file (built-in defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workbook path or URL (default: collected artifact, then configured URL)
    #[arg(long)]
    spreadsheet: Option<String>,

    /// Current communes page, path or URL
    #[arg(long)]
    current_communes: Option<String>,

    /// Former communes page, path or URL
    #[arg(long)]
    former_communes: Option<String>,

    /// Fail when a commune name is unmatched or a (locality, year) repeats
    #[arg(long, default_value = "false")]
    strict: bool,

    /// Dry run - report only, don't write output files
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn read_reference_names(
    resolver: &Resolver<'_>,
    explicit: Option<&str>,
    source_id: &str,
    selector: &TableSelector,
) -> Result<Vec<String>> {
    let input = resolver.resolve(explicit, source_id)?;
    println!("Reference [{}]: {}", source_id, input);
    let html = resolver.read_text(&input).await?;
    let names = reference::table_column(&html, selector)
        .with_context(|| format!("Failed to read names from {}", input))?;
    info!(source = source_id, names = names.len(), "reference names read");
    Ok(names)
}

fn print_report(output: &PipelineOutput) {
    println!("\n=== Reconciliation Report ===");
    println!("Canonical commune names: {}", output.canonical.len());
    println!("Commune-level rows: {}", output.communes.len());
    println!("Country-level rows: {}", output.country.len());
    println!("Discarded rows: {}", output.discarded);

    if output.unmatched.is_empty() {
        println!("All commune names matched ✓");
    } else {
        println!("Unmatched commune names ({}):", output.unmatched.len());
        for name in &output.unmatched {
            println!("  ✗ {}", name);
        }
    }

    if !output.misclassified.is_empty() {
        println!("Commune names kept out of the commune table by a marker:");
        for name in &output.misclassified {
            println!("  ⚠ {}", name);
        }
    }

    if !output.duplicates.is_empty() {
        println!("Repeated (locality, year) pairs ({}):", output.duplicates.len());
        for (locality, year) in output.duplicates.iter().take(10) {
            println!("  ⚠ {} {}", locality, year);
        }
        if output.duplicates.len() > 10 {
            println!("  ... and {} more", output.duplicates.len() - 10);
        }
    }
}

fn write_outputs(dir: &Path, output: &PipelineOutput) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let communes_path = dir.join(COMMUNE_OUTPUT);
    records::write_records(&communes_path, &output.communes)?;
    println!("Wrote {} rows to {}", output.communes.len(), communes_path.display());

    let country_path = dir.join(COUNTRY_OUTPUT);
    records::write_records(&country_path, &output.country)?;
    println!("Wrote {} rows to {}", output.country.len(), country_path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let args = Args::parse();
    let env = Config::from_env();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    println!("=== Housing Prices Parser ===");
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });
    println!("Output directory: {}", env.output_dir.display());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(env.http_timeout_secs))
        .user_agent("lux-housing-pipeline/0.1 (batch data preparation)")
        .build()?;
    let manifest = Manifest::load(&env.raw_fs_dir).await?;
    let resolver = Resolver::new(&client, manifest, &config.sources);

    // Stage 1: ingestion. A downloaded workbook only lives for this block.
    let spreadsheet = resolver.resolve(args.spreadsheet.as_deref(), SPREADSHEET_SOURCE)?;
    println!("Spreadsheet: {}", spreadsheet);
    let records = {
        let workbook = resolver.local_file(&spreadsheet, SPREADSHEET_SOURCE).await?;
        let raw_rows = ingest::read_workbook(workbook.path(), &config.ingestion)?;
        let rewriter = LocalityRewriter::new(&config.ingestion.locality_rewrites)?;
        ingest::clean_localities(raw_rows, &rewriter)
    };
    info!(rows = records.len(), "workbook ingested");

    if records.is_empty() {
        anyhow::bail!("No rows read from the workbook - check skip_rows and sheet names");
    }

    // Stage 2: reference names
    let current = read_reference_names(
        &resolver,
        args.current_communes.as_deref(),
        CURRENT_COMMUNES_SOURCE,
        &config.reconciliation.current_table,
    )
    .await?;
    let former = read_reference_names(
        &resolver,
        args.former_communes.as_deref(),
        FORMER_COMMUNES_SOURCE,
        &config.reconciliation.former_table,
    )
    .await?;

    // Stage 3: classification, aggregation, validation
    let output = pipeline::run(records, &current, &former, &config)?;
    print_report(&output);

    if !output.misclassified.is_empty() {
        warn!(count = output.misclassified.len(), "marker matched a commune name");
    }

    if args.strict && !output.is_clean() {
        anyhow::bail!(
            "Validation failed: {} unmatched commune name(s), {} repeated (locality, year) pair(s)",
            output.unmatched.len(),
            output.duplicates.len()
        );
    }

    if args.dry_run {
        println!("\nDry run - no files written");
        return Ok(());
    }

    println!();
    write_outputs(&env.output_dir, &output)?;

    println!("\n=== Parsing Complete ===");
    println!("Ready for analysis: cargo run --bin analysis");

    Ok(())
}
