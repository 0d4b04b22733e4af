use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CSV_HEADERS: [&str; 5] = [
    "locality",
    "year",
    "n_offers",
    "average_price_nominal_euros",
    "average_price_m2_nominal_euros",
];

/// A spreadsheet row after renaming and numeric coercion, before the
/// locality has been cleaned
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub locality: Option<String>,
    pub year: i32,
    pub n_offers: Option<i64>,
    pub average_price_nominal_euros: Option<f64>,
    pub average_price_m2_nominal_euros: Option<f64>,
}

/// One locality in one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub locality: String,
    pub year: i32,
    pub n_offers: Option<i64>,
    pub average_price_nominal_euros: Option<f64>,
    pub average_price_m2_nominal_euros: Option<f64>,
}

/// Write records as CSV; the header is written even when there are no rows.
pub fn write_records(path: &Path, records: &[PriceRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(CSV_HEADERS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(locality: &str, year: i32, price: Option<f64>) -> PriceRecord {
        PriceRecord {
            locality: locality.to_string(),
            year,
            n_offers: Some(12),
            average_price_nominal_euros: price,
            average_price_m2_nominal_euros: None,
        }
    }

    #[test]
    fn test_write_records_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commune_level_data.csv");
        write_records(
            &path,
            &[record("Pétange", 2010, Some(350000.5)), record("Mamer", 2011, None)],
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "locality,year,n_offers,average_price_nominal_euros,average_price_m2_nominal_euros"
        );
        assert_eq!(lines[1], "Pétange,2010,12,350000.5,");
        assert_eq!(lines[2], "Mamer,2011,12,,");
    }

    #[test]
    fn test_write_records_empty_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("country_level_data.csv");
        write_records(&path, &[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_written_records_read_back_with_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![record("Mamer", 2011, None)];
        write_records(&path, &records).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let read: Vec<PriceRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(read, records);
    }
}
