//! ASCII plotting for terminal output.
//!
//! Fixed-size character grid, deterministic output. Two charts:
//! - biomass vs DBH: observed `o`, fitted curve `-`, largest residuals `^` / `v`
//! - log residual vs fitted: points `o`, zero line `.`

use std::collections::HashSet;

use crate::domain::{BiomassFit, TreeResidual};
use crate::models::predict_corrected;
use crate::report::Rankings;

/// Observed biomass against DBH with the fitted curve drawn through it.
pub fn render_biomass_plot(
    residuals: &[TreeResidual],
    fit: &BiomassFit,
    width: usize,
    height: usize,
    rankings: Option<&Rankings>,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (d_min, d_max) = range(residuals.iter().map(|r| r.tree.dbh)).unwrap_or((1.0, 100.0));
    let curve = sample_curve(fit, d_min, d_max, width);

    let values = residuals
        .iter()
        .map(|r| r.tree.biomass)
        .chain(curve.iter().map(|&(_, y)| y));
    let (y_min, y_max) = range(values).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    draw_curve(&mut grid, &curve, (d_min, d_max), (y_min, y_max));

    let (above, below): (HashSet<&str>, HashSet<&str>) = rankings
        .map(|r| {
            (
                r.above.iter().map(|x| x.tree.id.as_str()).collect(),
                r.below.iter().map(|x| x.tree.id.as_str()).collect(),
            )
        })
        .unwrap_or_default();

    for r in residuals {
        let x = map_x(r.tree.dbh, d_min, d_max, width);
        let y = map_y(r.tree.biomass, y_min, y_max, height);
        grid[y][x] = if above.contains(r.tree.id.as_str()) {
            '^'
        } else if below.contains(r.tree.id.as_str()) {
            'v'
        } else {
            'o'
        };
    }

    let mut out = format!(
        "Plot ({}): dbh=[{d_min:.1}, {d_max:.1}] | biomass=[{y_min:.2}, {y_max:.2}]\n",
        fit.group
    );
    push_grid(&mut out, grid);
    out
}

/// Log residuals against fitted biomass.
pub fn render_residual_plot(residuals: &[TreeResidual], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = range(residuals.iter().map(|r| r.fitted)).unwrap_or((0.0, 1.0));
    let spread = residuals
        .iter()
        .map(|r| r.log_residual.abs())
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max)
        .max(1e-6);
    let (y_min, y_max) = pad_range(-spread, spread, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let zero = map_y(0.0, y_min, y_max, height);
    for cell in grid[zero].iter_mut() {
        *cell = '.';
    }
    for r in residuals {
        let x = map_x(r.fitted, x_min, x_max, width);
        let y = map_y(r.log_residual, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = format!(
        "Residuals: fitted=[{x_min:.2}, {x_max:.2}] | ln(obs/fit)=[{y_min:.3}, {y_max:.3}]\n"
    );
    push_grid(&mut out, grid);
    out
}

fn push_grid(out: &mut String, grid: Vec<Vec<char>>) {
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values.filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    (min.is_finite() && max.is_finite() && max > min).then_some((min, max))
}

/// Evenly spaced `(dbh, biomass)` points along the (bias-corrected) curve.
pub(crate) fn sample_curve(fit: &BiomassFit, d_min: f64, d_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let d = d_min + u * (d_max - d_min);
            (d, predict_corrected(fit.model, fit.quality.bias_correction, d))
        })
        .collect()
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let pad = ((max - min).abs() * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(v: f64, min: f64, max: f64, width: usize) -> usize {
    let u = ((v - min) / (max - min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(v: f64, min: f64, max: f64, height: usize) -> usize {
    let u = ((v - min) / (max - min)).clamp(0.0, 1.0);
    // Row 0 is the top of the chart.
    (height as f64 - 1.0 - u * (height as f64 - 1.0)).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_range: (f64, f64), y_range: (f64, f64)) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(d, y) in curve {
        if !y.is_finite() {
            continue;
        }
        let x = map_x(d, x_range.0, x_range.1, width);
        let yy = map_y(y, y_range.0, y_range.1, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, (x0, y0), (x, yy), '-'),
            None => grid[yy][x] = '-',
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], from: (usize, usize), to: (usize, usize), ch: char) {
    let (mut x0, mut y0) = (from.0 as isize, from.1 as isize);
    let (x1, y1) = (to.0 as isize, to.1 as isize);

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if let Some(cell) = grid.get_mut(y0 as usize).and_then(|row| row.get_mut(x0 as usize)) {
            if *cell == ' ' {
                *cell = ch;
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, FitSpace, PowerLaw, TreeObs};

    fn flat_fit() -> BiomassFit {
        BiomassFit {
            group: "all".to_string(),
            space: FitSpace::Raw,
            model: PowerLaw { a: 100.0, b: 0.0 },
            params: Vec::new(),
            quality: FitQuality {
                n: 2,
                iterations: 1,
                sse: 0.0,
                sigma: 0.0,
                rmse: 0.0,
                r_squared: 1.0,
                aic: 0.0,
                bias_correction: 1.0,
            },
        }
    }

    fn resid(id: &str, dbh: f64, biomass: f64, fitted: f64) -> TreeResidual {
        TreeResidual {
            tree: TreeObs {
                id: id.to_string(),
                species: "PSME".to_string(),
                dbh,
                biomass,
            },
            group: "all".to_string(),
            fitted,
            residual: biomass - fitted,
            log_residual: biomass.ln() - fitted.ln(),
        }
    }

    #[test]
    fn biomass_plot_golden_snapshot() {
        let points = vec![resid("T1", 1.0, 100.0, 100.0), resid("T2", 10.0, 110.0, 100.0)];
        let txt = render_biomass_plot(&points, &flat_fit(), 12, 5, None);
        let expected = concat!(
            "Plot (all): dbh=[1.0, 10.0] | biomass=[99.50, 110.50]\n",
            "           o\n",
            "            \n",
            "            \n",
            "            \n",
            "o-----------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn highlighted_trees_use_markers() {
        let points = vec![resid("T1", 1.0, 100.0, 100.0), resid("T2", 10.0, 110.0, 100.0)];
        let rankings = Rankings {
            above: vec![points[1].clone()],
            below: Vec::new(),
        };
        let txt = render_biomass_plot(&points, &flat_fit(), 12, 5, Some(&rankings));
        assert!(txt.lines().nth(1).unwrap().ends_with('^'));
    }

    #[test]
    fn residual_plot_has_zero_line() {
        let points = vec![
            resid("T1", 10.0, 110.0, 100.0),
            resid("T2", 20.0, 380.0, 400.0),
            resid("T3", 30.0, 900.0, 900.0),
        ];
        let txt = render_residual_plot(&points, 20, 7);
        let rows: Vec<&str> = txt.lines().skip(1).collect();
        assert_eq!(rows.len(), 7);
        // Symmetric range: zero sits in the middle row. T3 has zero residual at the right edge.
        assert!(rows[3].starts_with('.'));
        assert!(rows[3].ends_with('o'));
        assert!(rows[0].starts_with('o'));
    }
}
