//! Splitting ingested rows into commune-level and country-level rows.

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::ClassificationConfig;
use crate::records::PriceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalityClass {
    /// National average price row
    CountryPrice,
    /// National offer count row
    CountryOffers,
    /// Footnotes, sources and other non-locality rows
    Discarded,
    Commune,
}

/// Compiled classification markers. Matching is containment, so a marker
/// anywhere in the locality string decides the class.
#[derive(Debug)]
pub struct Markers {
    country_price: Regex,
    country_offers: Regex,
    exclusion: Regex,
}

impl Markers {
    pub fn new(config: &ClassificationConfig) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).with_context(|| format!("Invalid marker pattern '{}'", pattern))
        };
        Ok(Self {
            country_price: compile(&config.country_price_marker)?,
            country_offers: compile(&config.country_offers_marker)?,
            exclusion: compile(&config.exclusion_marker)?,
        })
    }

    pub fn classify(&self, locality: &str) -> LocalityClass {
        if self.country_price.is_match(locality) {
            LocalityClass::CountryPrice
        } else if self.country_offers.is_match(locality) {
            LocalityClass::CountryOffers
        } else if self.exclusion.is_match(locality) {
            LocalityClass::Discarded
        } else {
            LocalityClass::Commune
        }
    }

    /// Both country markers match; the row is taken as a price row.
    pub fn is_ambiguous(&self, locality: &str) -> bool {
        self.country_price.is_match(locality) && self.country_offers.is_match(locality)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Partition {
    pub communes: Vec<PriceRecord>,
    pub country_prices: Vec<PriceRecord>,
    pub country_offers: Vec<PriceRecord>,
    pub discarded: Vec<PriceRecord>,
}

impl Partition {
    /// Every row that did not end up in the commune-level table
    pub fn non_commune(&self) -> impl Iterator<Item = &PriceRecord> {
        self.country_prices
            .iter()
            .chain(&self.country_offers)
            .chain(&self.discarded)
    }
}

pub fn partition(records: Vec<PriceRecord>, markers: &Markers) -> Partition {
    let mut out = Partition::default();

    for record in records {
        if markers.is_ambiguous(&record.locality) {
            warn!(
                locality = %record.locality,
                year = record.year,
                "locality matches both country markers"
            );
        }

        match markers.classify(&record.locality) {
            LocalityClass::CountryPrice => out.country_prices.push(record),
            LocalityClass::CountryOffers => out.country_offers.push(record),
            LocalityClass::Discarded => {
                debug!(locality = %record.locality, year = record.year, "row discarded");
                out.discarded.push(record)
            }
            LocalityClass::Commune => out.communes.push(record),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Markers {
        Markers::new(&ClassificationConfig::default()).unwrap()
    }

    fn record(locality: &str, year: i32) -> PriceRecord {
        PriceRecord {
            locality: locality.to_string(),
            year,
            n_offers: None,
            average_price_nominal_euros: None,
            average_price_m2_nominal_euros: None,
        }
    }

    #[test]
    fn test_classify_country_rows() {
        let m = markers();
        assert_eq!(m.classify("Moyenne nationale"), LocalityClass::CountryPrice);
        assert_eq!(m.classify("Total d'offres"), LocalityClass::CountryOffers);
        assert_eq!(m.classify("Total d’offres"), LocalityClass::CountryOffers);
    }

    #[test]
    fn test_classify_discarded_rows() {
        let m = markers();
        assert_eq!(
            m.classify("Source : Observatoire de l'Habitat"),
            LocalityClass::Discarded
        );
        assert_eq!(m.classify("Nombre d'offres insuffisant"), LocalityClass::Discarded);
    }

    #[test]
    fn test_classify_communes_by_default() {
        let m = markers();
        assert_eq!(m.classify("Esch-sur-Alzette"), LocalityClass::Commune);
        assert_eq!(m.classify("Pétange"), LocalityClass::Commune);
    }

    #[test]
    fn test_ambiguous_marker_collision() {
        let m = markers();
        assert!(m.is_ambiguous("Total d'offres nationale"));
        assert_eq!(m.classify("Total d'offres nationale"), LocalityClass::CountryPrice);
        assert!(!m.is_ambiguous("Moyenne nationale"));
    }

    #[test]
    fn test_invalid_marker_fails() {
        let config = ClassificationConfig {
            exclusion_marker: "[".to_string(),
            ..ClassificationConfig::default()
        };
        assert!(Markers::new(&config).is_err());
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let records = vec![
            record("Mamer", 2010),
            record("Moyenne nationale", 2010),
            record("Total d'offres", 2010),
            record("Source : Observatoire de l'Habitat", 2010),
            record("Schengen", 2010),
        ];

        let parts = partition(records, &markers());

        assert_eq!(parts.communes.len(), 2);
        assert_eq!(parts.country_prices.len(), 1);
        assert_eq!(parts.country_offers.len(), 1);
        assert_eq!(parts.discarded.len(), 1);
        assert_eq!(parts.non_commune().count(), 3);
        assert_eq!(parts.communes[0].locality, "Mamer");
        assert_eq!(parts.communes[1].locality, "Schengen");
    }
}
