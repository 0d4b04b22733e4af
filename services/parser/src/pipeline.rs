//! The I/O-free part of a parser run: from cleaned spreadsheet records and
//! the two reference name lists to the output tables and their reports.

use anyhow::Result;
use tracing::{debug, info};

use crate::aggregate::{country_aggregate, duplicate_keys};
use crate::classify::{partition, Markers};
use crate::config::PipelineConfig;
use crate::reconcile::{
    find_matched, find_unmatched, repair_localities, CanonicalCommunes, NameCleaner,
};
use crate::records::PriceRecord;

#[derive(Debug)]
pub struct PipelineOutput {
    pub communes: Vec<PriceRecord>,
    pub country: Vec<PriceRecord>,
    pub canonical: CanonicalCommunes,
    /// Commune-level localities missing from the canonical set
    pub unmatched: Vec<String>,
    /// Canonical commune names that a marker kept out of the commune table
    pub misclassified: Vec<String>,
    pub duplicates: Vec<(String, i32)>,
    pub discarded: usize,
}

impl PipelineOutput {
    pub fn is_clean(&self) -> bool {
        self.unmatched.is_empty() && self.duplicates.is_empty()
    }
}

pub fn run(
    records: Vec<PriceRecord>,
    current_communes: &[String],
    former_communes: &[String],
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    let markers = Markers::new(&config.classification)?;
    let cleaner = NameCleaner::new(&config.reconciliation)?;

    let mut parts = partition(records, &markers);
    repair_localities(&mut parts.communes, &cleaner);
    info!(
        communes = parts.communes.len(),
        country_prices = parts.country_prices.len(),
        country_offers = parts.country_offers.len(),
        discarded = parts.discarded.len(),
        "rows classified"
    );

    let country = country_aggregate(
        &parts.country_prices,
        &parts.country_offers,
        &config.classification.country_label,
    );

    let canonical = CanonicalCommunes::build(current_communes, former_communes, &cleaner);
    if canonical.is_empty() {
        anyhow::bail!("AMBIGUITY: reference tables yielded no commune names");
    }
    info!(
        current = current_communes.len(),
        former = former_communes.len(),
        canonical = canonical.len(),
        "canonical commune names built"
    );
    debug!(names = ?canonical.names(), "canonical set");

    let unmatched = find_unmatched(&parts.communes, &canonical);
    let misclassified = find_matched(parts.non_commune(), &canonical);
    let duplicates = duplicate_keys(&parts.communes);

    Ok(PipelineOutput {
        discarded: parts.discarded.len(),
        communes: parts.communes,
        country,
        canonical,
        unmatched,
        misclassified,
        duplicates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(locality: &str, year: i32, n_offers: i64, price: f64) -> PriceRecord {
        PriceRecord {
            locality: locality.to_string(),
            year,
            n_offers: Some(n_offers),
            average_price_nominal_euros: Some(price),
            average_price_m2_nominal_euros: Some(price / 100.0),
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn sample_records() -> Vec<PriceRecord> {
        let mut records = Vec::new();
        for year in [2010, 2011] {
            records.push(record("Luxembourg", year, 900, 800000.0));
            records.push(record("ClÃ©mency", year, 12, 500000.0));
            records.push(record("Kaerjeng", year, 40, 520000.0));
            records.push(record("Moyenne nationale", year, 1, 600000.0));
            records.push(record("Total d'offres", year, 5000, 0.0));
            records.push(record("Source : Observatoire de l'Habitat", year, 0, 0.0));
        }
        records
    }

    #[test]
    fn test_run_end_to_end() {
        let output = run(
            sample_records(),
            &names(&["Luxembourg City", "Käerjeng *"]),
            &names(&["Clemency"]),
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(output.communes.len(), 6);
        assert!(output.communes.iter().any(|r| r.locality == "Clémency"));
        assert!(output.unmatched.is_empty());
        assert!(output.misclassified.is_empty());
        assert!(output.duplicates.is_empty());
        assert!(output.is_clean());
        assert_eq!(output.discarded, 2);

        assert_eq!(output.country.len(), 2);
        assert_eq!(output.country[0].locality, "Grand-Duchy of Luxembourg");
        assert_eq!(output.country[0].n_offers, Some(5000));
        assert_eq!(output.country[0].average_price_nominal_euros, Some(600000.0));
    }

    #[test]
    fn test_run_reports_unmatched() {
        let output = run(
            sample_records(),
            &names(&["Luxembourg City"]),
            &[],
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(output.unmatched, vec!["Clémency", "Kaerjeng"]);
        assert!(!output.is_clean());
    }

    #[test]
    fn test_run_without_reference_names_fails() {
        let result = run(sample_records(), &[], &[], &PipelineConfig::default());
        assert!(result.unwrap_err().to_string().contains("AMBIGUITY"));
    }

    #[test]
    fn test_run_reports_duplicates() {
        let mut records = sample_records();
        records.push(record("Kaerjeng", 2010, 1, 1.0));
        let output = run(
            records,
            &names(&["Luxembourg City", "Kaerjeng"]),
            &names(&["Clemency"]),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(output.duplicates, vec![("Kaerjeng".to_string(), 2010)]);
    }
}
