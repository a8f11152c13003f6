//! CSV ingest and normalization.
//!
//! This module turns raw inventory tables into clean in-memory observations:
//!
//! - tree table -> `TreeObs` (species, DBH, biomass)
//! - plot table -> `PlotObs` (stratum, plot, basal area per unit area)
//! - strata table (or an inline `area` column) -> `Stratum`
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic order** (first appearance in the file)
//! - **Separation of concerns**: no statistics here

use std::collections::HashMap;

use csv::StringRecord;

use crate::domain::{DatasetStats, PlotInput, PlotObs, Stratum, TreeColumns, TreeObs};
use crate::error::AppError;
use crate::math::min_max;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Tree ingest output.
#[derive(Debug, Clone)]
pub struct TreeTable {
    pub trees: Vec<TreeObs>,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Plot ingest output (before the stratum join).
#[derive(Debug, Clone)]
pub struct PlotTable {
    pub plots: Vec<PlotObs>,
    /// Areas from an inline `area` column, keyed by stratum id.
    pub inline_areas: Vec<Stratum>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Parse and clean the tree table.
///
/// Rows with missing, non-numeric, or non-positive DBH/biomass are dropped
/// (the log-log model needs strictly positive values) and recorded as
/// row errors.
pub fn parse_trees(
    text: &str,
    columns: &TreeColumns,
    species_filter: &[String],
) -> Result<TreeTable, AppError> {
    let mut reader = reader_for(text);
    let header_map = read_header_map(&mut reader)?;

    let species_col = normalize_header_name(&columns.species);
    let dbh_col = normalize_header_name(&columns.dbh);
    let biomass_col = normalize_header_name(&columns.biomass);
    let id_col = normalize_header_name(&columns.id);

    for required in [&species_col, &dbh_col, &biomass_col] {
        ensure_column(&header_map, required)?;
    }

    let filter: Vec<String> = species_filter.iter().map(|s| s.trim().to_ascii_uppercase()).collect();

    let mut trees = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header, and CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let id = get_optional(&record, &header_map, &id_col)
            .map(str::to_string)
            .unwrap_or_else(|| format!("row{line}"));

        let Some(species) = get_optional(&record, &header_map, &species_col) else {
            row_errors.push(RowError {
                line,
                id: Some(id),
                message: format!("Missing `{species_col}` value."),
            });
            continue;
        };
        let species = species.to_ascii_uppercase();

        if !filter.is_empty() && !filter.contains(&species) {
            continue;
        }

        let dbh = match parse_positive(get_optional(&record, &header_map, &dbh_col), &dbh_col) {
            Ok(v) => v,
            Err(message) => {
                row_errors.push(RowError { line, id: Some(id), message });
                continue;
            }
        };
        let biomass = match parse_positive(get_optional(&record, &header_map, &biomass_col), &biomass_col) {
            Ok(v) => v,
            Err(message) => {
                row_errors.push(RowError { line, id: Some(id), message });
                continue;
            }
        };

        trees.push(TreeObs {
            id,
            species,
            dbh,
            biomass,
        });
    }

    let stats = compute_tree_stats(&trees)
        .ok_or_else(|| AppError::insufficient("No valid tree rows remain after cleaning/filtering."))?;

    Ok(TreeTable {
        trees,
        stats,
        row_errors,
        rows_read,
    })
}

/// Parse the plot table, either plot-level (`bapa`) or tree-tally (`dbh`).
pub fn parse_plots(text: &str, input: PlotInput) -> Result<PlotTable, AppError> {
    let mut reader = reader_for(text);
    let header_map = read_header_map(&mut reader)?;

    ensure_column(&header_map, "stratum")?;
    ensure_column(&header_map, "plot")?;
    match input {
        PlotInput::PlotLevel => ensure_column(&header_map, "bapa")?,
        PlotInput::TreeTally { expansion, .. } => {
            ensure_column(&header_map, "dbh")?;
            if !(expansion.is_finite() && expansion > 0.0) {
                return Err(AppError::input("Tally expansion factor must be finite and > 0."));
            }
        }
    }
    let has_area = header_map.contains_key("area");

    let mut plots: Vec<PlotObs> = Vec::new();
    let mut plot_index: HashMap<(String, String), usize> = HashMap::new();
    let mut inline_areas: Vec<Stratum> = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let (Some(stratum), Some(plot)) = (
            get_optional(&record, &header_map, "stratum"),
            get_optional(&record, &header_map, "plot"),
        ) else {
            row_errors.push(RowError {
                line,
                id: None,
                message: "Missing `stratum` or `plot` value.".to_string(),
            });
            continue;
        };
        let stratum = stratum.to_string();
        let plot = plot.to_string();

        if has_area {
            if let Some(area) = parse_opt_f64(get_optional(&record, &header_map, "area")) {
                record_inline_area(&mut inline_areas, &stratum, area)?;
            }
        }

        match input {
            PlotInput::PlotLevel => {
                let bapa = match parse_opt_f64(get_optional(&record, &header_map, "bapa")) {
                    Some(v) if v >= 0.0 => v,
                    Some(_) => {
                        row_errors.push(RowError {
                            line,
                            id: Some(plot),
                            message: "Negative `bapa` value.".to_string(),
                        });
                        continue;
                    }
                    None => {
                        row_errors.push(RowError {
                            line,
                            id: Some(plot),
                            message: "Missing/invalid `bapa` value.".to_string(),
                        });
                        continue;
                    }
                };
                let key = (stratum.clone(), plot.clone());
                if plot_index.contains_key(&key) {
                    row_errors.push(RowError {
                        line,
                        id: Some(plot),
                        message: "Duplicate plot id within stratum.".to_string(),
                    });
                    continue;
                }
                plot_index.insert(key, plots.len());
                plots.push(PlotObs { stratum, plot, bapa });
            }
            PlotInput::TreeTally { unit, expansion } => {
                // An empty DBH registers the plot with no tally trees.
                let raw_dbh = get_optional(&record, &header_map, "dbh");
                let contribution = match raw_dbh {
                    None => 0.0,
                    Some(raw) => match raw.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0) {
                        Some(d) => unit.basal_area_constant() * d * d * expansion,
                        None => {
                            row_errors.push(RowError {
                                line,
                                id: Some(plot),
                                message: format!("Invalid `dbh` value '{raw}'."),
                            });
                            continue;
                        }
                    },
                };
                let key = (stratum.clone(), plot.clone());
                let slot = *plot_index.entry(key).or_insert_with(|| {
                    plots.push(PlotObs {
                        stratum,
                        plot,
                        bapa: 0.0,
                    });
                    plots.len() - 1
                });
                plots[slot].bapa += contribution;
            }
        }
    }

    if plots.is_empty() {
        return Err(AppError::insufficient("No valid plot rows remain after cleaning."));
    }

    Ok(PlotTable {
        plots,
        inline_areas,
        row_errors,
        rows_read,
    })
}

/// Parse a strata table with `stratum` and `area` columns.
pub fn parse_strata(text: &str) -> Result<Vec<Stratum>, AppError> {
    let mut reader = reader_for(text);
    let header_map = read_header_map(&mut reader)?;
    ensure_column(&header_map, "stratum")?;
    ensure_column(&header_map, "area")?;

    let mut strata: Vec<Stratum> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::input(format!("Strata table line {line}: {e}")))?;
        let Some(id) = get_optional(&record, &header_map, "stratum") else {
            continue;
        };
        let area = parse_opt_f64(get_optional(&record, &header_map, "area"))
            .filter(|a| *a > 0.0)
            .ok_or_else(|| AppError::input(format!("Strata table line {line}: area must be a positive number.")))?;
        if strata.iter().any(|s| s.id == id) {
            return Err(AppError::input(format!("Strata table line {line}: duplicate stratum '{id}'.")));
        }
        strata.push(Stratum {
            id: id.to_string(),
            area,
        });
    }

    if strata.is_empty() {
        return Err(AppError::insufficient("Strata table has no rows."));
    }
    Ok(strata)
}

/// Resolve stratum areas for every stratum present in the plot table.
///
/// An explicit strata table wins over inline `area` columns. Every stratum
/// must have both an area and plots: a plot whose stratum has no area, or a
/// table row for a stratum without plots, is an input error.
pub fn join_strata(plots: &[PlotObs], inline: &[Stratum], table: Option<&[Stratum]>) -> Result<Vec<Stratum>, AppError> {
    let source = match table {
        Some(t) => t,
        None if !inline.is_empty() => inline,
        None => {
            return Err(AppError::input(
                "Stratum areas are required: provide a strata table or an `area` column.",
            ));
        }
    };

    let mut strata: Vec<Stratum> = source.to_vec();
    for p in plots {
        if !strata.iter().any(|s| s.id == p.stratum) {
            return Err(AppError::input(format!(
                "Plot '{}' belongs to stratum '{}', which has no area.",
                p.plot, p.stratum
            )));
        }
    }

    if let Some(empty) = strata.iter().find(|s| !plots.iter().any(|p| p.stratum == s.id)) {
        return Err(AppError::input(format!(
            "Stratum '{}' is listed in the strata table but has no plots.",
            empty.id
        )));
    }

    // First appearance in the plot table.
    strata.sort_by_key(|s| plots.iter().position(|p| p.stratum == s.id).unwrap_or(usize::MAX));
    Ok(strata)
}

fn record_inline_area(areas: &mut Vec<Stratum>, stratum: &str, area: f64) -> Result<(), AppError> {
    if !(area > 0.0) {
        return Err(AppError::input(format!("Stratum '{stratum}' has a non-positive area.")));
    }
    match areas.iter().find(|s| s.id == stratum) {
        Some(existing) if (existing.area - area).abs() > 1e-9 * existing.area.max(1.0) => {
            Err(AppError::input(format!(
                "Stratum '{stratum}' has conflicting areas ({} vs {area}).",
                existing.area
            )))
        }
        Some(_) => Ok(()),
        None => {
            areas.push(Stratum {
                id: stratum.to_string(),
                area,
            });
            Ok(())
        }
    }
}

fn reader_for(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
}

fn read_header_map(reader: &mut csv::Reader<&[u8]>) -> Result<HashMap<String, usize>, AppError> {
    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    Ok(build_header_map(&headers))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn ensure_column(header_map: &HashMap<String, usize>, name: &str) -> Result<(), AppError> {
    if header_map.contains_key(name) {
        Ok(())
    } else {
        Err(AppError::input(format!("Missing required column: `{name}`")))
    }
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = *header_map.get(name)?;
    let value = record.get(idx)?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("na") {
        None
    } else {
        Some(value)
    }
}

fn parse_opt_f64(raw: Option<&str>) -> Option<f64> {
    let v = raw?.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

fn parse_positive(raw: Option<&str>, column: &str) -> Result<f64, String> {
    match parse_opt_f64(raw) {
        Some(v) if v > 0.0 => Ok(v),
        Some(v) => Err(format!("Non-positive `{column}` value ({v}).")),
        None => Err(format!("Missing/invalid `{column}` value.")),
    }
}

fn compute_tree_stats(trees: &[TreeObs]) -> Option<DatasetStats> {
    let dbh: Vec<f64> = trees.iter().map(|t| t.dbh).collect();
    let biomass: Vec<f64> = trees.iter().map(|t| t.biomass).collect();
    let (dbh_min, dbh_max) = min_max(&dbh)?;
    let (biomass_min, biomass_max) = min_max(&biomass)?;

    let mut species: Vec<&str> = trees.iter().map(|t| t.species.as_str()).collect();
    species.sort_unstable();
    species.dedup();

    Some(DatasetStats {
        n_trees: trees.len(),
        n_species: species.len(),
        dbh_min,
        dbh_max,
        biomass_min,
        biomass_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiameterUnit;

    #[test]
    fn trees_drop_bad_rows_and_normalize_species() {
        let csv = "\u{feff}Tree_ID,Species,DBH,Biomass\n\
                   t1,psme,10.0,12.5\n\
                   t2,PSME,,30\n\
                   t3,pipo,20,-1\n\
                   t4,PIPO,25,NA\n\
                   t5,PIPO,30,410.2\n";
        let table = parse_trees(csv, &TreeColumns::default(), &[]).unwrap();
        assert_eq!(table.rows_read, 5);
        assert_eq!(table.trees.len(), 2);
        assert_eq!(table.row_errors.len(), 3);
        assert_eq!(table.trees[0].species, "PSME");
        assert_eq!(table.stats.n_species, 2);
        assert!((table.stats.dbh_max - 30.0).abs() < 1e-12);
    }

    #[test]
    fn trees_honor_custom_columns_and_filter() {
        let csv = "spcd,d,agb\nA,10,5\nB,12,7\nA,14,9\n";
        let columns = TreeColumns {
            species: "spcd".to_string(),
            dbh: "d".to_string(),
            biomass: "agb".to_string(),
            id: "tree_id".to_string(),
        };
        let table = parse_trees(csv, &columns, &["a".to_string()]).unwrap();
        assert_eq!(table.trees.len(), 2);
        assert_eq!(table.trees[1].id, "row4");
    }

    #[test]
    fn trees_missing_column_is_input_error() {
        let err = parse_trees("species,dbh\nA,1\n", &TreeColumns::default(), &[]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }

    #[test]
    fn plot_level_rows_with_inline_area() {
        let csv = "stratum,plot,bapa,area\nA,1,120,50\nA,2,,50\nB,1,80,20\nA,3,100,50\n";
        let table = parse_plots(csv, PlotInput::PlotLevel).unwrap();
        assert_eq!(table.plots.len(), 3);
        assert_eq!(table.row_errors.len(), 1);
        assert_eq!(table.inline_areas.len(), 2);

        let strata = join_strata(&table.plots, &table.inline_areas, None).unwrap();
        assert_eq!(strata[0].id, "A");
        assert!((strata[1].area - 20.0).abs() < 1e-12);
    }

    #[test]
    fn conflicting_inline_areas_are_rejected() {
        let csv = "stratum,plot,bapa,area\nA,1,120,50\nA,2,90,60\n";
        assert!(parse_plots(csv, PlotInput::PlotLevel).is_err());
    }

    #[test]
    fn tree_tally_aggregates_basal_area_per_plot() {
        // Two 10" trees on plot 1 at 5 TPA each, plot 2 empty.
        let csv = "stratum,plot,dbh\nA,1,10\nA,1,10\nA,2,\n";
        let input = PlotInput::TreeTally {
            unit: DiameterUnit::Inches,
            expansion: 5.0,
        };
        let table = parse_plots(csv, input).unwrap();
        assert_eq!(table.plots.len(), 2);
        let expected = 2.0 * 0.005_454_154 * 100.0 * 5.0;
        assert!((table.plots[0].bapa - expected).abs() < 1e-6);
        assert_eq!(table.plots[1].bapa, 0.0);
    }

    #[test]
    fn strata_join_requires_area_for_every_plot() {
        let plots = vec![
            PlotObs { stratum: "A".into(), plot: "1".into(), bapa: 10.0 },
            PlotObs { stratum: "C".into(), plot: "1".into(), bapa: 10.0 },
        ];
        let strata = parse_strata("stratum,area\nA,10\nB,5\n").unwrap();
        let err = join_strata(&plots, &[], Some(&strata)).unwrap_err();
        assert!(err.message().contains("'C'"));
        assert!(join_strata(&plots, &[], None).is_err());
    }

    #[test]
    fn strata_table_rows_without_plots_are_rejected() {
        let plots = vec![
            PlotObs { stratum: "B".into(), plot: "1".into(), bapa: 40.0 },
            PlotObs { stratum: "A".into(), plot: "1".into(), bapa: 90.0 },
        ];
        let strata = parse_strata("stratum,area\nA,10\nB,5\nC,7\n").unwrap();
        let err = join_strata(&plots, &[], Some(&strata)).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
        assert!(err.message().contains("'C'"), "{}", err.message());

        let joined = join_strata(&plots, &[], Some(&strata[..2])).unwrap();
        let ids: Vec<&str> = joined.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }
}
