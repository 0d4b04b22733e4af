//! PDF line charts of the per-m² price index for hand-picked localities.

use anyhow::{Context, Result};
use plotters::prelude::*;
use std::path::Path;
use svg2pdf::usvg;

use crate::records::IndexedRecord;

const CHART_SIZE: (u32, u32) = (960, 600);

/// `(year, pl_m2)` points for one locality, sorted by year. Years without an
/// index are left out.
pub fn series(records: &[IndexedRecord], locality: &str) -> Vec<(i32, f64)> {
    let mut points: Vec<(i32, f64)> = records
        .iter()
        .filter(|r| r.locality == locality)
        .filter_map(|r| r.pl_m2.map(|value| (r.year, value)))
        .collect();
    points.sort_by_key(|(year, _)| *year);
    points
}

/// Axis bounds with a little headroom; never an empty range
fn bounds(points: &[(i32, f64)]) -> ((i32, i32), (f64, f64)) {
    let first_year = points.iter().map(|(y, _)| *y).min().unwrap_or(0);
    let last_year = points.iter().map(|(y, _)| *y).max().unwrap_or(0);
    let low = points.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
    let high = points.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);

    let (low, high) = if low.is_finite() && high.is_finite() {
        (low, high)
    } else {
        (0.0, 100.0)
    };
    let pad = ((high - low) * 0.1).max(1.0);

    ((first_year, last_year.max(first_year + 1)), (low - pad, high + pad))
}

/// Draw `points` as an SVG line chart
pub fn render_svg(locality: &str, points: &[(i32, f64)]) -> Result<String> {
    let ((x0, x1), (y0, y1)) = bounds(points);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(locality, ("sans-serif", 28))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .x_desc("year")
            .y_desc("pl_m2")
            .x_labels((x1 - x0 + 1) as usize)
            .draw()?;

        chart.draw_series(LineSeries::new(points.iter().copied(), &BLUE))?;
        chart.draw_series(points.iter().map(|&point| Circle::new(point, 3, BLUE.filled())))?;

        root.present()?;
    }
    Ok(svg)
}

/// Convert an SVG document to a single-page PDF
pub fn svg_to_pdf(svg: &str) -> Result<Vec<u8>> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &options).context("Failed to parse chart SVG")?;
    svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to convert chart to PDF: {:?}", e))
}

/// Write `points` as a PDF line chart to `path`
pub fn render(path: &Path, locality: &str, points: &[(i32, f64)]) -> Result<()> {
    let svg = render_svg(locality, points)?;
    let pdf = svg_to_pdf(&svg)?;
    std::fs::write(path, pdf)
        .with_context(|| format!("Failed to write chart {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(locality: &str, year: i32, pl_m2: Option<f64>) -> IndexedRecord {
        IndexedRecord {
            locality: locality.to_string(),
            year,
            n_offers: None,
            average_price_nominal_euros: None,
            average_price_m2_nominal_euros: None,
            p0: None,
            p0_m2: None,
            pl: None,
            pl_m2,
        }
    }

    #[test]
    fn test_series_sorted_and_filtered() {
        let records = vec![
            indexed("Mamer", 2012, Some(110.0)),
            indexed("Schengen", 2010, Some(100.0)),
            indexed("Mamer", 2010, Some(100.0)),
            indexed("Mamer", 2011, None),
        ];
        assert_eq!(series(&records, "Mamer"), vec![(2010, 100.0), (2012, 110.0)]);
    }

    #[test]
    fn test_series_unknown_locality() {
        let records = vec![indexed("Mamer", 2010, Some(100.0))];
        assert!(series(&records, "Wincrange").is_empty());
    }

    #[test]
    fn test_bounds_single_point() {
        let ((x0, x1), (y0, y1)) = bounds(&[(2010, 100.0)]);
        assert_eq!((x0, x1), (2010, 2011));
        assert!(y0 < 100.0 && y1 > 100.0);
    }

    #[test]
    fn test_svg_to_pdf_writes_pdf_document() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50">
            <rect x="10" y="10" width="80" height="30" fill="blue"/>
        </svg>"#;
        let pdf = svg_to_pdf(svg).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_svg_to_pdf_rejects_garbage() {
        assert!(svg_to_pdf("not an svg").is_err());
    }

    #[test]
    fn test_bounds_padding() {
        let (_, (y0, y1)) = bounds(&[(2010, 100.0), (2020, 200.0)]);
        assert_eq!(y0, 90.0);
        assert_eq!(y1, 210.0);
    }
}
