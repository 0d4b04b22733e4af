//! Base-year price indices.
//!
//! For every locality the base-year nominal price and price per m² are carried
//! forward to the following years, and each year's value is expressed as a
//! percentage of that base. Years before the base year, and every year of a
//! locality without a base-year row, get no index.

use std::collections::HashMap;

use crate::records::{IndexedRecord, PriceRecord};

/// Index every record; output keeps the input order.
pub fn price_index(records: Vec<PriceRecord>, base_year: i32) -> Vec<IndexedRecord> {
    let mut by_locality: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        by_locality.entry(&record.locality).or_default().push(idx);
    }

    let mut bases: Vec<(Option<f64>, Option<f64>)> = vec![(None, None); records.len()];
    for rows in by_locality.values_mut() {
        rows.sort_by_key(|&idx| records[idx].year);

        let mut carry: Option<(Option<f64>, Option<f64>)> = None;
        for &idx in rows.iter() {
            let record = &records[idx];
            if record.year == base_year {
                carry = Some((
                    record.average_price_nominal_euros,
                    record.average_price_m2_nominal_euros,
                ));
            }
            if let Some(base) = carry {
                bases[idx] = base;
            }
        }
    }

    records
        .into_iter()
        .zip(bases)
        .map(|(record, (p0, p0_m2))| IndexedRecord {
            pl: ratio(record.average_price_nominal_euros, p0),
            pl_m2: ratio(record.average_price_m2_nominal_euros, p0_m2),
            locality: record.locality,
            year: record.year,
            n_offers: record.n_offers,
            average_price_nominal_euros: record.average_price_nominal_euros,
            average_price_m2_nominal_euros: record.average_price_m2_nominal_euros,
            p0,
            p0_m2,
        })
        .collect()
}

/// `value / base * 100`; a zero base gives no index
fn ratio(value: Option<f64>, base: Option<f64>) -> Option<f64> {
    match (value, base) {
        (Some(value), Some(base)) if base != 0.0 => Some(value / base * 100.0),
        _ => None,
    }
}

/// Localities with no base-year row, sorted
pub fn localities_without_base(records: &[IndexedRecord]) -> Vec<String> {
    let mut has_base: HashMap<&str, bool> = HashMap::new();
    for record in records {
        *has_base.entry(&record.locality).or_default() |= record.p0.is_some() || record.p0_m2.is_some();
    }
    let mut missing: Vec<String> = has_base
        .into_iter()
        .filter(|(_, has)| !has)
        .map(|(locality, _)| locality.to_string())
        .collect();
    missing.sort();
    missing
}
