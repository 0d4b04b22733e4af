//! Reading commune names out of HTML reference tables.
//!
//! Tables are expanded into a rectangular grid first: a cell spanning several
//! rows or columns is repeated in every slot it covers, so column positions in
//! body rows line up with the header.

use anyhow::{Context, Result};
use encoding_rs::{Encoding, WINDOWS_1252};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::config::TableSelector;

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("Invalid selector"));

/// Decode a downloaded page. Honours a BOM, then tries UTF-8, and falls back
/// to Windows-1252 so stray Latin-1 bytes still become the intended letters.
pub fn decode_html(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HtmlTable {
    /// Leading rows made only of header cells, or placed in `<thead>`
    pub header_rows: Vec<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl HtmlTable {
    /// Names of the columns, taken from the last header row
    pub fn column_names(&self) -> &[String] {
        self.header_rows.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Position of the `occurrence`-th column named `name`
    pub fn column_index(&self, name: &str, occurrence: usize) -> Option<usize> {
        self.column_names()
            .iter()
            .enumerate()
            .filter(|(_, header)| header.trim().eq_ignore_ascii_case(name.trim()))
            .nth(occurrence)
            .map(|(idx, _)| idx)
    }
}

#[derive(Debug)]
struct Cell {
    text: String,
    is_header: bool,
    rowspan: usize,
    colspan: usize,
}

/// Every `<table>` in document order, nested tables included
pub fn extract_tables(html: &str) -> Vec<HtmlTable> {
    let document = Html::parse_document(html);
    document.select(&TABLE).map(parse_table).collect()
}

/// Values of the selected column, with empty cells left out
pub fn table_column(html: &str, selector: &TableSelector) -> Result<Vec<String>> {
    let tables = extract_tables(html);
    let table = tables.get(selector.table_index).with_context(|| {
        format!(
            "AMBIGUITY: table {} requested but the page has {} tables",
            selector.table_index,
            tables.len()
        )
    })?;

    let idx = table
        .column_index(&selector.column, selector.occurrence)
        .with_context(|| {
            format!(
                "AMBIGUITY: column '{}' (occurrence {}) not found. Columns: {:?}",
                selector.column,
                selector.occurrence,
                table.column_names()
            )
        })?;

    let values: Vec<String> = table
        .rows
        .iter()
        .filter_map(|row| row.get(idx))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();

    if values.is_empty() {
        anyhow::bail!("AMBIGUITY: column '{}' has no values", selector.column);
    }
    Ok(values)
}

fn parse_table(table: ElementRef<'_>) -> HtmlTable {
    let mut raw_rows: Vec<(bool, Vec<Cell>)> = Vec::new();

    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => raw_rows.push((false, parse_row(child))),
            section @ ("thead" | "tbody" | "tfoot") => {
                for tr in child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|e| e.value().name() == "tr")
                {
                    raw_rows.push((section == "thead", parse_row(tr)));
                }
            }
            _ => {}
        }
    }

    let header_count = raw_rows
        .iter()
        .take_while(|(in_thead, cells)| {
            *in_thead || (!cells.is_empty() && cells.iter().all(|c| c.is_header))
        })
        .count();

    let mut grid = expand_spans(raw_rows.into_iter().map(|(_, cells)| cells).collect());
    let rows = grid.split_off(header_count.min(grid.len()));

    HtmlTable {
        header_rows: grid,
        rows,
    }
}

fn parse_row(tr: ElementRef<'_>) -> Vec<Cell> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| matches!(e.value().name(), "td" | "th"))
        .map(|cell| {
            let span = |attr: &str| {
                cell.value()
                    .attr(attr)
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(1)
                    .clamp(1, 1000)
            };
            Cell {
                text: collapse_whitespace(&cell.text().collect::<String>()),
                is_header: cell.value().name() == "th",
                rowspan: span("rowspan"),
                colspan: span("colspan"),
            }
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lay cells out on a grid, repeating spanned cells.
fn expand_spans(rows: Vec<Vec<Cell>>) -> Vec<Vec<String>> {
    // per column: text still owed to the rows below and how many rows remain
    let mut carry: Vec<Option<(String, usize)>> = Vec::new();
    let mut grid = Vec::with_capacity(rows.len());

    for cells in rows {
        let mut out: Vec<String> = Vec::new();
        let mut cells = cells.into_iter();
        let mut col = 0;

        loop {
            if let Some(text) = take_carry(&mut carry, col) {
                out.push(text);
                col += 1;
                continue;
            }

            match cells.next() {
                Some(cell) => {
                    for _ in 0..cell.colspan {
                        if cell.rowspan > 1 {
                            if carry.len() <= col {
                                carry.resize(col + 1, None);
                            }
                            carry[col] = Some((cell.text.clone(), cell.rowspan - 1));
                        }
                        out.push(cell.text.clone());
                        col += 1;
                    }
                }
                None => {
                    if carry.iter().skip(col).any(Option::is_some) {
                        out.push(String::new());
                        col += 1;
                        continue;
                    }
                    break;
                }
            }
        }

        grid.push(out);
    }

    grid
}

fn take_carry(carry: &mut [Option<(String, usize)>], col: usize) -> Option<String> {
    let slot = carry.get_mut(col)?;
    let (text, remaining) = slot.as_mut()?;
    let text = text.clone();
    *remaining -= 1;
    if *remaining == 0 {
        *slot = None;
    }
    Some(text)
}
