//! Commune name reconciliation.
//!
//! The reference pages and the price workbook spell some communes differently.
//! Names from both reference lists go through the same cleaning (encoding
//! repair, footnote removal, corrections) and become one sorted set that the
//! commune-level rows are checked against.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;

use crate::config::ReconciliationConfig;
use crate::records::PriceRecord;

#[derive(Debug)]
pub struct NameCleaner {
    repairs: Vec<(String, String)>,
    footnote: Regex,
    corrections: Vec<(Regex, String)>,
}

impl NameCleaner {
    pub fn new(config: &ReconciliationConfig) -> Result<Self> {
        let footnote = Regex::new(&config.footnote_pattern)
            .with_context(|| format!("Invalid footnote pattern '{}'", config.footnote_pattern))?;

        let corrections = config
            .corrections
            .iter()
            .map(|c| {
                let re = Regex::new(&c.pattern)
                    .with_context(|| format!("Invalid correction pattern '{}'", c.pattern))?;
                Ok((re, c.name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            repairs: config
                .encoding_repairs
                .iter()
                .map(|r| (r.from.clone(), r.to.clone()))
                .collect(),
            footnote,
            corrections,
        })
    }

    /// Replace mis-decoded sequences ("Ã©") with the letter they stand for.
    pub fn repair_encoding(&self, name: &str) -> String {
        self.repairs
            .iter()
            .fold(name.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }

    /// Drop a trailing footnote mark such as the `*` in "Mamer *".
    ///
    /// The name is trimmed before and after matching, so surrounding
    /// whitespace never survives into the canonical set.
    pub fn strip_footnote(&self, name: &str) -> String {
        self.footnote.replace(name.trim(), "").trim().to_string()
    }

    /// Apply each correction in turn; a matching name is replaced whole.
    pub fn correct(&self, name: &str) -> String {
        let mut value = name.to_string();
        for (re, canonical) in &self.corrections {
            if re.is_match(&value) {
                value = canonical.clone();
            }
        }
        value
    }

    pub fn clean(&self, name: &str) -> String {
        self.correct(&self.strip_footnote(&self.repair_encoding(name)))
    }
}

/// Sorted, duplicate-free set of valid commune names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalCommunes {
    names: Vec<String>,
}

impl CanonicalCommunes {
    pub fn build(current: &[String], former: &[String], cleaner: &NameCleaner) -> Self {
        let names: BTreeSet<String> = former
            .iter()
            .chain(current)
            .map(|name| cleaner.clean(name))
            .filter(|name| !name.is_empty())
            .collect();
        Self {
            names: names.into_iter().collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .binary_search_by(|probe| probe.as_str().cmp(name))
            .is_ok()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Rewrite every record's locality through the encoding repairs.
pub fn repair_localities(records: &mut [PriceRecord], cleaner: &NameCleaner) {
    for record in records {
        record.locality = cleaner.repair_encoding(&record.locality);
    }
}

/// Distinct localities absent from the canonical set, sorted
pub fn find_unmatched<'a>(
    records: impl IntoIterator<Item = &'a PriceRecord>,
    canonical: &CanonicalCommunes,
) -> Vec<String> {
    records
        .into_iter()
        .filter(|r| !canonical.contains(&r.locality))
        .map(|r| r.locality.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct localities that are canonical commune names, sorted. Applied to
/// rows classified away from the commune table, a hit means a marker caught a
/// real commune.
pub fn find_matched<'a>(
    records: impl IntoIterator<Item = &'a PriceRecord>,
    canonical: &CanonicalCommunes,
) -> Vec<String> {
    records
        .into_iter()
        .filter(|r| canonical.contains(&r.locality))
        .map(|r| r.locality.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
