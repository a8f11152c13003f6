//! SVG charts via Plotters.
//!
//! Same two charts as the terminal renderer, written to files:
//! - `biomass_vs_dbh.svg`: observed trees per species and each fitted curve
//! - `residuals.svg`: log residual vs fitted biomass

use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::domain::{BiomassFit, TreeResidual};
use crate::error::AppError;
use crate::fit::BiomassFits;
use crate::plot::ascii::sample_curve;

const CHART_SIZE: (u32, u32) = (960, 640);
const CURVE_POINTS: usize = 200;

/// Paths of the files written by [`write_svg_charts`].
#[derive(Debug, Clone)]
pub struct SvgCharts {
    pub biomass: PathBuf,
    pub residuals: PathBuf,
}

/// Write both charts into `dir` (created if missing).
pub fn write_svg_charts(dir: &Path, residuals: &[TreeResidual], fits: &BiomassFits) -> Result<SvgCharts, AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::input(format!("Failed to create chart directory '{}': {e}", dir.display())))?;

    let charts = SvgCharts {
        biomass: dir.join("biomass_vs_dbh.svg"),
        residuals: dir.join("residuals.svg"),
    };

    draw_biomass(&charts.biomass, residuals, fits)
        .map_err(|e| AppError::compute(format!("Failed to draw '{}': {e}", charts.biomass.display())))?;
    draw_residuals(&charts.residuals, residuals)
        .map_err(|e| AppError::compute(format!("Failed to draw '{}': {e}", charts.residuals.display())))?;

    log::info!("wrote {} and {}", charts.biomass.display(), charts.residuals.display());
    Ok(charts)
}

fn by_species(residuals: &[TreeResidual]) -> BTreeMap<&str, Vec<&TreeResidual>> {
    let mut groups: BTreeMap<&str, Vec<&TreeResidual>> = BTreeMap::new();
    for r in residuals {
        groups.entry(r.tree.species.as_str()).or_default().push(r);
    }
    groups
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo.is_finite() && hi > lo {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    } else {
        (0.0, 1.0)
    }
}

fn draw_biomass(path: &Path, residuals: &[TreeResidual], fits: &BiomassFits) -> Result<(), Box<dyn Error>> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let (d_lo, d_hi) = bounds(residuals.iter().map(|r| r.tree.dbh));
    let d_min = d_lo.max(f64::MIN_POSITIVE);
    let curves: Vec<(&BiomassFit, Vec<(f64, f64)>)> = std::iter::once(&fits.global)
        .chain(&fits.species)
        .map(|f| (f, sample_curve(f, d_min, d_hi, CURVE_POINTS)))
        .collect();
    let (y_lo, y_hi) = bounds(
        residuals
            .iter()
            .map(|r| r.tree.biomass)
            .chain(curves.iter().flat_map(|(_, c)| c.iter().map(|&(_, y)| y))),
    );

    let mut chart = ChartBuilder::on(&root)
        .caption("Aboveground biomass vs DBH", ("sans-serif", 22))
        .margin(12)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(d_lo..d_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc("DBH")
        .y_desc("biomass")
        .x_labels(8)
        .y_labels(8)
        .draw()?;

    let groups = by_species(residuals);
    for (i, (species, trees)) in groups.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(
                trees
                    .iter()
                    .map(|r| Circle::new((r.tree.dbh, r.tree.biomass), 3, color.filled())),
            )?
            .label(*species)
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));

        if let Some((_, curve)) = curves.iter().find(|(f, _)| f.group == *species) {
            chart.draw_series(LineSeries::new(curve.iter().copied(), color.stroke_width(2)))?;
        }
    }

    chart
        .draw_series(LineSeries::new(curves[0].1.iter().copied(), BLACK.stroke_width(2)))?
        .label("pooled fit")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], BLACK.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_residuals(path: &Path, residuals: &[TreeResidual]) -> Result<(), Box<dyn Error>> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_lo, x_hi) = bounds(residuals.iter().map(|r| r.fitted));
    let spread = residuals
        .iter()
        .map(|r| r.log_residual.abs())
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max)
        .max(1e-6)
        * 1.1;

    let mut chart = ChartBuilder::on(&root)
        .caption("Log residuals vs fitted", ("sans-serif", 22))
        .margin(12)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(x_lo..x_hi, -spread..spread)?;

    chart
        .configure_mesh()
        .x_desc("fitted biomass")
        .y_desc("ln(observed / a·DBH^b)")
        .draw()?;

    chart.draw_series(LineSeries::new(vec![(x_lo, 0.0), (x_hi, 0.0)], BLACK.mix(0.6)))?;

    for (i, (species, trees)) in by_species(residuals).iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(
                trees
                    .iter()
                    .map(|r| Circle::new((r.fitted, r.log_residual), 3, color.filled())),
            )?
            .label(*species)
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
