use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::records::PriceRecord;

/// Join the national price rows with the national offer-count rows on year.
///
/// The price row's own offer count is not a count of offers and is replaced by
/// the offer row's. Years present on only one side are dropped. One row per
/// year, sorted by year; when a side has several rows for a year the first is
/// used.
pub fn country_aggregate(
    prices: &[PriceRecord],
    offers: &[PriceRecord],
    label: &str,
) -> Vec<PriceRecord> {
    let mut offers_by_year: BTreeMap<i32, Option<i64>> = BTreeMap::new();
    for offer in offers {
        match offers_by_year.entry(offer.year) {
            Entry::Vacant(slot) => {
                slot.insert(offer.n_offers);
            }
            Entry::Occupied(_) => {
                warn!(year = offer.year, locality = %offer.locality, "duplicate offer-count row ignored");
            }
        }
    }

    let mut seen = BTreeSet::new();
    let mut joined = Vec::new();
    for price in prices {
        if !seen.insert(price.year) {
            warn!(year = price.year, locality = %price.locality, "duplicate country price row ignored");
            continue;
        }
        match offers_by_year.get(&price.year) {
            Some(n_offers) => joined.push(PriceRecord {
                locality: label.to_string(),
                year: price.year,
                n_offers: *n_offers,
                average_price_nominal_euros: price.average_price_nominal_euros,
                average_price_m2_nominal_euros: price.average_price_m2_nominal_euros,
            }),
            None => debug!(year = price.year, "no offer count for year, row dropped"),
        }
    }

    for year in offers_by_year.keys().filter(|y| !seen.contains(*y)) {
        debug!(year, "no country price for year, offer count dropped");
    }

    joined.sort_by_key(|r| r.year);
    joined
}

/// `(locality, year)` pairs occurring more than once, sorted
pub fn duplicate_keys(records: &[PriceRecord]) -> Vec<(String, i32)> {
    let mut counts: BTreeMap<(&str, i32), usize> = BTreeMap::new();
    for record in records {
        *counts.entry((record.locality.as_str(), record.year)).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((locality, year), _)| (locality.to_string(), year))
        .collect()
}
