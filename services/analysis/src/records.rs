use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const INDEX_HEADERS: [&str; 9] = [
    "locality",
    "year",
    "n_offers",
    "average_price_nominal_euros",
    "average_price_m2_nominal_euros",
    "p0",
    "p0_m2",
    "pl",
    "pl_m2",
];

/// A row of `commune_level_data.csv` or `country_level_data.csv`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceRecord {
    pub locality: String,
    pub year: i32,
    pub n_offers: Option<i64>,
    pub average_price_nominal_euros: Option<f64>,
    pub average_price_m2_nominal_euros: Option<f64>,
}

/// A price row with its base-year values and indices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedRecord {
    pub locality: String,
    pub year: i32,
    pub n_offers: Option<i64>,
    pub average_price_nominal_euros: Option<f64>,
    pub average_price_m2_nominal_euros: Option<f64>,
    pub p0: Option<f64>,
    pub p0_m2: Option<f64>,
    pub pl: Option<f64>,
    pub pl_m2: Option<f64>,
}

pub fn read_records(path: &Path) -> Result<Vec<PriceRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for (line_idx, result) in reader.deserialize().enumerate() {
        let record: PriceRecord =
            result.with_context(|| format!("{}: line {}", path.display(), line_idx + 2))?;
        records.push(record);
    }
    Ok(records)
}

/// Write indexed records as CSV; the header is written even when there are no rows.
pub fn write_indexed(path: &Path, records: &[IndexedRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(INDEX_HEADERS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
