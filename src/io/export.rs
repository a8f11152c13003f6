//! Export per-tree results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::path::Path;

use serde::Serialize;

use crate::domain::TreeResidual;
use crate::error::AppError;

/// Flat CSV row; `TreeResidual` nests the observation, which csv can't serialize.
#[derive(Debug, Serialize)]
struct ResidualRow<'a> {
    tree_id: &'a str,
    species: &'a str,
    dbh: f64,
    biomass: f64,
    model: &'a str,
    fitted: f64,
    residual: f64,
    log_residual: f64,
}

/// Write per-tree fitted values and residuals to a CSV file.
pub fn write_residuals_csv(path: &Path, residuals: &[TreeResidual]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    for r in residuals {
        writer
            .serialize(ResidualRow {
                tree_id: &r.tree.id,
                species: &r.tree.species,
                dbh: r.tree.dbh,
                biomass: r.tree.biomass,
                model: &r.group,
                fitted: r.fitted,
                residual: r.residual,
                log_residual: r.log_residual,
            })
            .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush export CSV: {e}")))?;
    log::info!("wrote {} residual rows to {}", residuals.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TreeObs;

    #[test]
    fn writes_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("fst-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("residuals.csv");

        let rows = vec![TreeResidual {
            tree: TreeObs {
                id: "T1".to_string(),
                species: "PSME".to_string(),
                dbh: 20.0,
                biomass: 110.0,
            },
            group: "PSME".to_string(),
            fitted: 100.0,
            residual: 10.0,
            log_residual: 1.1_f64.ln(),
        }];
        write_residuals_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "tree_id,species,dbh,biomass,model,fitted,residual,log_residual"
        );
        assert!(lines.next().unwrap().starts_with("T1,PSME,20.0,110.0,PSME,100.0,10.0,"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
