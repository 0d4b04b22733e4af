//! Workbook ingestion: one sheet per year, fixed header offset.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::columns::ColumnMap;
use crate::config::{IngestionConfig, RewriteRule};
use crate::records::{PriceRecord, RawRow};

/// Read every configured sheet and concatenate the rows, tagging each with
/// the year its sheet is named after.
pub fn read_workbook(path: &Path, config: &IngestionConfig) -> Result<Vec<RawRow>> {
    info!(path = %path.display(), "opening workbook");

    // calamine picks the format (xls, xlsx, xlsb, ods) from the extension
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let available = workbook.sheet_names().to_vec();
    let mut rows = Vec::new();

    for sheet in &config.sheets {
        if !available.iter().any(|s| s == sheet) {
            anyhow::bail!(
                "AMBIGUITY: sheet '{}' not found. Workbook sheets: {:?}",
                sheet,
                available
            );
        }

        let year: i32 = sheet
            .trim()
            .parse()
            .with_context(|| format!("Sheet name '{}' is not a year", sheet))?;

        let range = workbook
            .worksheet_range(sheet)
            .with_context(|| format!("Failed to read sheet '{}'", sheet))?;

        let skip_rows = config.skip_rows_for(sheet);
        let sheet_rows = read_sheet(&range, year, skip_rows, &config.renames)
            .with_context(|| format!("Sheet '{}'", sheet))?;

        info!(sheet = %sheet, skip_rows, rows = sheet_rows.len(), "sheet read");
        rows.extend(sheet_rows);
    }

    Ok(rows)
}

/// Parse one sheet. The range starts at the first used cell, so blank leading
/// rows are never counted in `skip_rows`.
pub fn read_sheet(
    range: &Range<Data>,
    year: i32,
    skip_rows: usize,
    renames: &BTreeMap<String, String>,
) -> Result<Vec<RawRow>> {
    let mut lines = range.rows().skip(skip_rows);

    let header_row = lines.next().with_context(|| {
        format!(
            "AMBIGUITY: no header row after skipping {} rows ({} rows in sheet)",
            skip_rows,
            range.height()
        )
    })?;

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell_text(cell).unwrap_or_default())
        .collect();
    let columns = ColumnMap::from_headers(&headers, renames)?;
    debug!(?columns, "column mapping");

    let mut rows = Vec::new();
    for line in lines {
        if line.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }

        rows.push(RawRow {
            locality: line.get(columns.locality).and_then(cell_text),
            year,
            n_offers: line.get(columns.n_offers).and_then(cell_int),
            average_price_nominal_euros: line.get(columns.price_nominal).and_then(cell_float),
            average_price_m2_nominal_euros: line
                .get(columns.price_m2_nominal)
                .and_then(cell_float),
        });
    }

    Ok(rows)
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty | Data::Error(_) => return None,
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Lenient float coercion: anything non-numeric becomes missing
fn cell_float(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn cell_int(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(i) => Some(*i),
        Data::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| cell_float(&Data::String(s.to_string())).map(|f| f.trunc() as i64))
        }
        other => cell_float(other).map(|f| f.trunc() as i64),
    }
}

// =============================================================================
// Locality cleaning
// =============================================================================

/// Ordered regex rewrites that unify spellings across yearly sheets
/// (e.g. "Luxembourg-Ville" and "Luxembourg")
#[derive(Debug)]
pub struct LocalityRewriter {
    rules: Vec<(Regex, String)>,
}

impl LocalityRewriter {
    pub fn new(rules: &[RewriteRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let re = Regex::new(&rule.pattern)
                    .with_context(|| format!("Invalid locality rewrite '{}'", rule.pattern))?;
                Ok((re, rule.replacement.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn apply(&self, locality: &str) -> String {
        let mut value = locality.to_string();
        for (re, replacement) in &self.rules {
            value = re
                .replace_all(&value, NoExpand(replacement.as_str()))
                .into_owned();
        }
        value.trim().to_string()
    }
}

/// Rewrite and trim localities, dropping rows left without one.
pub fn clean_localities(rows: Vec<RawRow>, rewriter: &LocalityRewriter) -> Vec<PriceRecord> {
    let total = rows.len();
    let mut records = Vec::with_capacity(total);

    for row in rows {
        let locality = match row.locality.as_deref().map(|l| rewriter.apply(l)) {
            Some(l) if !l.is_empty() => l,
            _ => continue,
        };

        if row.average_price_nominal_euros.is_none() {
            debug!(locality = %locality, year = row.year, "missing nominal price");
        }

        records.push(PriceRecord {
            locality,
            year: row.year,
            n_offers: row.n_offers,
            average_price_nominal_euros: row.average_price_nominal_euros,
            average_price_m2_nominal_euros: row.average_price_m2_nominal_euros,
        });
    }

    let dropped = total - records.len();
    if dropped > 0 {
        info!(dropped, "rows without locality removed");
    }
    records
}
