//! Analysis - Price indices and charts from the parser's tables
//!
//! Responsibilities:
//! - Read commune_level_data.csv and country_level_data.csv
//! - Index every locality's prices against its base-year prices (base = 100)
//! - Write commune_level_index.csv and country_level_index.csv
//! - Chart the per-m² index of a few hand-picked communes
//!
//! Usage:
//!   cargo run --bin analysis
//!   cargo run --bin analysis -- --input-dir data/output --no-plots

mod config;
mod index;
mod plot;
mod records;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{AnalysisConfig, Config};
use crate::records::IndexedRecord;

const COMMUNE_INPUT: &str = "commune_level_data.csv";
const COUNTRY_INPUT: &str = "country_level_data.csv";
const COMMUNE_OUTPUT: &str = "commune_level_index.csv";
const COUNTRY_OUTPUT: &str = "country_level_index.csv";

#[derive(Parser, Debug)]
#[command(name = "analysis", about = "Computes base-year price indices and charts")]
struct Args {
    /// Path to the pipeline config file (built-in defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the parser output (default: OUTPUT_DIR)
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory for the charts (default: PLOTS_DIR)
    #[arg(long)]
    plots_dir: Option<PathBuf>,

    /// Skip chart rendering
    #[arg(long, default_value = "false")]
    no_plots: bool,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn index_table(input: &Path, output: &Path, base_year: i32) -> Result<Vec<IndexedRecord>> {
    let records = records::read_records(input)?;
    info!(path = %input.display(), rows = records.len(), "table read");

    let indexed = index::price_index(records, base_year);
    let missing = index::localities_without_base(&indexed);
    if !missing.is_empty() {
        warn!(count = missing.len(), base_year, "localities without a base-year row");
        for locality in missing.iter().take(10) {
            println!("  ⚠ no {} prices for {}", base_year, locality);
        }
        if missing.len() > 10 {
            println!("  ... and {} more", missing.len() - 10);
        }
    }

    records::write_indexed(output, &indexed)?;
    println!("Wrote {} rows to {}", indexed.len(), output.display());
    Ok(indexed)
}

fn render_plots(dir: &Path, config: &AnalysisConfig, communes: &[IndexedRecord]) -> Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create plots directory {}", dir.display()))?;

    let mut rendered = 0;
    for spec in &config.plots {
        let points = plot::series(communes, &spec.locality);
        if points.is_empty() {
            warn!(locality = %spec.locality, "no indexed points, chart skipped");
            println!("  ✗ {} (no data)", spec.locality);
            continue;
        }

        let path = dir.join(format!("{}.pdf", spec.file_stem));
        plot::render(&path, &spec.locality, &points)?;
        println!("  ✓ {} → {}", spec.locality, path.display());
        rendered += 1;
    }
    Ok(rendered)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let args = Args::parse();
    let env = Config::from_env();

    let config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    let input_dir = args.input_dir.unwrap_or_else(|| env.output_dir.clone());
    let plots_dir = args.plots_dir.unwrap_or_else(|| env.plots_dir.clone());

    println!("=== Housing Prices Analysis ===");
    println!("Input directory: {}", input_dir.display());
    println!("Base year: {}", config.base_year);

    println!("\n=== Commune Level ===");
    let communes = index_table(
        &input_dir.join(COMMUNE_INPUT),
        &input_dir.join(COMMUNE_OUTPUT),
        config.base_year,
    )?;

    println!("\n=== Country Level ===");
    let country = index_table(
        &input_dir.join(COUNTRY_INPUT),
        &input_dir.join(COUNTRY_OUTPUT),
        config.base_year,
    )?;

    let rendered = if args.no_plots {
        0
    } else {
        println!("\n=== Charts ({}) ===", plots_dir.display());
        render_plots(&plots_dir, &config, &communes)?
    };

    println!("\n=== Analysis Complete ===");
    println!("Commune rows indexed: {}", communes.len());
    println!("Country rows indexed: {}", country.len());
    println!("Charts written: {}", rendered);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "locality,year,n_offers,average_price_nominal_euros,average_price_m2_nominal_euros";

    #[test]
    fn test_index_table_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join(COUNTRY_INPUT);
        let output = dir.path().join(COUNTRY_OUTPUT);
        std::fs::write(
            &input,
            format!(
                "{}\nGrand-Duchy of Luxembourg,2010,5100,600000.0,4000.0\n\
                 Grand-Duchy of Luxembourg,2011,5400,660000.0,4400.0\n",
                HEADER
            ),
        )
        .unwrap();

        let rows = index_table(&input, &output, 2010).unwrap();
        assert_eq!(rows.len(), 2);
        assert!((rows[1].pl.unwrap() - 110.0).abs() < 1e-9);

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.starts_with(&format!("{},p0,p0_m2,pl,pl_m2", HEADER)));
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_index_table_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = index_table(
            &dir.path().join(COMMUNE_INPUT),
            &dir.path().join(COMMUNE_OUTPUT),
            2010,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_render_plots_skips_localities_without_points() {
        let dir = tempfile::tempdir().unwrap();
        let plots = dir.path().join("plots");
        let rendered = render_plots(&plots, &AnalysisConfig::default(), &[]).unwrap();
        assert_eq!(rendered, 0);
        assert!(plots.is_dir());
        assert_eq!(std::fs::read_dir(&plots).unwrap().count(), 0);
    }
}
