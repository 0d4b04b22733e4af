//! Runtime and pipeline configuration.
//!
//! Environment variables carry locations; `config/pipeline.json` carries every
//! dataset-specific string the parser matches against. Each section defaults
//! to the values of the shipped file, so the parser runs without `--config`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub raw_fs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            raw_fs_dir: PathBuf::from(
                std::env::var("RAW_FS_DIR").unwrap_or_else(|_| "./data/raw".to_string()),
            ),
            output_dir: PathBuf::from(
                std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "./data/output".to_string()),
            ),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sources: Vec<SourceEntry>,
    pub ingestion: IngestionConfig,
    pub classification: ClassificationConfig,
    pub reconciliation: ReconciliationConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {}", path.display()))?;
        let mut config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config {}", path.display()))?;
        if config.sources.is_empty() {
            config.sources = default_sources();
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    pub format: String,
    pub url: String,
}

fn default_sources() -> Vec<SourceEntry> {
    let source = |id: &str, format: &str, url: &str| SourceEntry {
        id: id.to_string(),
        format: format.to_string(),
        url: url.to_string(),
    };
    vec![
        source("housing-prices", "xlsx", "https://is.gd/1vvBAc"),
        source(
            "current-communes",
            "html",
            "https://b-rodrigues.github.io/list_communes/",
        ),
        source(
            "former-communes",
            "html",
            "https://b-rodrigues.github.io/former_communes/",
        ),
    ]
}

// =============================================================================
// Ingestion
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Sheet names; each must parse as the year its rows belong to
    pub sheets: Vec<String>,
    /// Rows skipped before the header, counted from the first used row
    pub skip_rows: usize,
    pub sheet_skip_rows: HashMap<String, usize>,
    /// Normalized header -> output field
    pub renames: BTreeMap<String, String>,
    /// Applied in order to every locality before classification
    pub locality_rewrites: Vec<RewriteRule>,
}

impl IngestionConfig {
    pub fn skip_rows_for(&self, sheet: &str) -> usize {
        self.sheet_skip_rows
            .get(sheet)
            .copied()
            .unwrap_or(self.skip_rows)
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        let renames = [
            ("commune", "locality"),
            ("nombre_doffres", "n_offers"),
            ("prix_moyen_annonc_en_courant", "average_price_nominal_euros"),
            ("prix_moyen_annonce_en_courant", "average_price_nominal_euros"),
            ("prix_moyen_annonc_au_m_en_courant", "average_price_m2_nominal_euros"),
            ("prix_moyen_annonce_au_m_en_courant", "average_price_m2_nominal_euros"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        Self {
            sheets: (2010..=2021).map(|y| y.to_string()).collect(),
            skip_rows: 6,
            sheet_skip_rows: HashMap::new(),
            renames,
            locality_rewrites: vec![
                RewriteRule::new("Luxembourg.*", "Luxembourg"),
                RewriteRule::new("P.*tange", "Pétange"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub replacement: String,
}

impl RewriteRule {
    pub fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub country_price_marker: String,
    pub country_offers_marker: String,
    /// Any locality matching this is kept out of the commune-level table
    pub exclusion_marker: String,
    pub country_label: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            country_price_marker: "nationale".to_string(),
            country_offers_marker: "Total d.offres".to_string(),
            exclusion_marker: "nationale|offre|Source".to_string(),
            country_label: "Grand-Duchy of Luxembourg".to_string(),
        }
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub encoding_repairs: Vec<EncodingRepair>,
    pub footnote_pattern: String,
    pub current_table: TableSelector,
    pub former_table: TableSelector,
    pub corrections: Vec<Correction>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            encoding_repairs: vec![
                EncodingRepair::new("Ã©", "é"),
                EncodingRepair::new("Ã»", "û"),
                EncodingRepair::new("Ã¤", "ä"),
            ],
            footnote_pattern: " .$".to_string(),
            current_table: TableSelector {
                table_index: 1,
                column: "Name".to_string(),
                occurrence: 1,
            },
            former_table: TableSelector {
                table_index: 2,
                column: "Name".to_string(),
                occurrence: 0,
            },
            corrections: vec![
                Correction::new("Cl.mency", "Clémency"),
                Correction::new("Erpeldange", "Erpeldange"),
                Correction::new("City", "Luxembourg"),
                Correction::new("K.*jeng", "Kaerjeng"),
                Correction::new("P.*tange", "Pétange"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodingRepair {
    pub from: String,
    pub to: String,
}

impl EncodingRepair {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Locates one column of one `<table>` on a reference page
#[derive(Debug, Clone, Deserialize)]
pub struct TableSelector {
    /// Position among every `<table>` element of the document
    pub table_index: usize,
    /// Header text of the column, compared case-insensitively
    pub column: String,
    /// Which of several same-named columns to use, 0 for the first
    #[serde(default)]
    pub occurrence: usize,
}

/// A name matching `pattern` is replaced as a whole by `name`
#[derive(Debug, Clone, Deserialize)]
pub struct Correction {
    pub pattern: String,
    pub name: String,
}

impl Correction {
    pub fn new(pattern: &str, name: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            name: name.to_string(),
        }
    }
}
