//! Header normalization and the mapping of sheet columns to record fields.

use anyhow::Result;
use std::collections::BTreeMap;

pub const LOCALITY: &str = "locality";
pub const N_OFFERS: &str = "n_offers";
pub const PRICE_NOMINAL: &str = "average_price_nominal_euros";
pub const PRICE_M2_NOMINAL: &str = "average_price_m2_nominal_euros";

/// Normalize a human-authored header to a snake-case identifier.
///
/// Keeps alphanumeric and whitespace characters, lower-cases, joins
/// whitespace runs with a single `_`, then drops whatever is not ASCII. Accented
/// letters are therefore dropped rather than transliterated:
/// `"Prix moyen annoncé en courant"` becomes `prix_moyen_annonc_en_courant`.
/// Leading and trailing whitespace never produces a leading or trailing `_`.
pub fn clean_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(char::is_ascii)
        .collect()
}

/// Column index of each output field within a sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub locality: usize,
    pub n_offers: usize,
    pub price_nominal: usize,
    pub price_m2_nominal: usize,
}

impl ColumnMap {
    /// Resolve fields from raw headers. A header already named like an output
    /// field maps to it directly; the first column wins when several map to
    /// the same field.
    pub fn from_headers(headers: &[String], renames: &BTreeMap<String, String>) -> Result<Self> {
        let mut found: BTreeMap<&str, usize> = BTreeMap::new();
        let mut normalized = Vec::with_capacity(headers.len());

        for (idx, header) in headers.iter().enumerate() {
            let cleaned = clean_name(header);
            let target = renames.get(&cleaned).map(String::as_str).unwrap_or(&cleaned);
            for field in [LOCALITY, N_OFFERS, PRICE_NOMINAL, PRICE_M2_NOMINAL] {
                if target == field {
                    found.entry(field).or_insert(idx);
                }
            }
            normalized.push(cleaned);
        }

        let require = |field: &str| -> Result<usize> {
            found.get(field).copied().ok_or_else(|| {
                anyhow::anyhow!(
                    "AMBIGUITY: no column maps to '{}'. Normalized headers: {:?}",
                    field,
                    normalized
                )
            })
        };

        Ok(Self {
            locality: require(LOCALITY)?,
            n_offers: require(N_OFFERS)?,
            price_nominal: require(PRICE_NOMINAL)?,
            price_m2_nominal: require(PRICE_M2_NOMINAL)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestionConfig;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // -------------------------------------------------------------------------
    // HEADER NORMALIZATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_clean_name_drops_accents() {
        assert_eq!(
            clean_name("Prix moyen annoncé en courant"),
            "prix_moyen_annonc_en_courant"
        );
    }

    #[test]
    fn test_clean_name_apostrophe() {
        assert_eq!(clean_name("Nombre d'offres"), "nombre_doffres");
    }

    #[test]
    fn test_clean_name_superscript_and_punctuation() {
        assert_eq!(
            clean_name("Prix moyen annoncé au m² en courant (€)"),
            "prix_moyen_annonc_au_m_en_courant"
        );
    }

    #[test]
    fn test_clean_name_collapses_whitespace() {
        assert_eq!(clean_name("  Commune \t\n "), "commune");
        assert_eq!(clean_name("Nombre   d'offres"), "nombre_doffres");
    }

    #[test]
    fn test_clean_name_is_stable() {
        let once = clean_name("Prix moyen annoncé en courant");
        assert_eq!(clean_name(&once), once);
    }

    #[test]
    fn test_clean_name_empty() {
        assert_eq!(clean_name(""), "");
        assert_eq!(clean_name("€ –"), "");
    }

    // -------------------------------------------------------------------------
    // COLUMN MAPPING
    // -------------------------------------------------------------------------

    #[test]
    fn test_column_map_from_sheet_headers() {
        let renames = IngestionConfig::default().renames;
        let map = ColumnMap::from_headers(
            &headers(&[
                "",
                "Commune",
                "Nombre d'offres",
                "Prix moyen annoncé en courant",
                "Prix moyen annoncé au m² en courant",
            ]),
            &renames,
        )
        .unwrap();
        assert_eq!(
            map,
            ColumnMap {
                locality: 1,
                n_offers: 2,
                price_nominal: 3,
                price_m2_nominal: 4
            }
        );
    }

    #[test]
    fn test_column_map_renamed_to_nominal_price() {
        let renames = IngestionConfig::default().renames;
        let cleaned = clean_name("Prix moyen annoncé en courant");
        assert_eq!(renames.get(&cleaned).map(String::as_str), Some(PRICE_NOMINAL));
    }

    #[test]
    fn test_column_map_accepts_output_names() {
        let map = ColumnMap::from_headers(
            &headers(&[
                "locality",
                "n_offers",
                "average_price_nominal_euros",
                "average_price_m2_nominal_euros",
            ]),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(map.price_m2_nominal, 3);
    }

    #[test]
    fn test_column_map_missing_column_fails() {
        let renames = IngestionConfig::default().renames;
        let result = ColumnMap::from_headers(
            &headers(&["Commune", "Nombre d'offres", "Prix moyen annoncé en courant"]),
            &renames,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("AMBIGUITY"));
        assert!(err.contains(PRICE_M2_NOMINAL));
    }

    #[test]
    fn test_column_map_first_duplicate_wins() {
        let renames = IngestionConfig::default().renames;
        let map = ColumnMap::from_headers(
            &headers(&[
                "Commune",
                "Commune",
                "Nombre d'offres",
                "Prix moyen annoncé en courant",
                "Prix moyen annoncée en courant",
                "Prix moyen annoncé au m² en courant",
            ]),
            &renames,
        )
        .unwrap();
        assert_eq!(map.locality, 0);
        assert_eq!(map.price_nominal, 3);
    }
}
