//! Synthetic inventory generation.
//!
//! Produces a tree biomass table from known power-law parameters with
//! multiplicative log-normal error, and a stratified plot table with known
//! per-stratum means/SDs. The output is reproducible for a given seed and is
//! meant for demos, offline runs, and sanity checks of the estimators.

use std::path::{Path, PathBuf};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{PlotObs, PowerLaw, SimulateConfig, Stratum, TreeObs};
use crate::error::AppError;

/// Species used for the synthetic biomass table: code, true model, DBH range (cm).
pub const SPECIES: [(&str, PowerLaw, f64, f64); 4] = [
    ("PSME", PowerLaw { a: 0.0998, b: 2.4 }, 8.0, 95.0),
    ("PIPO", PowerLaw { a: 0.0671, b: 2.49 }, 10.0, 80.0),
    ("ABGR", PowerLaw { a: 0.1161, b: 2.33 }, 6.0, 70.0),
    ("ACMA", PowerLaw { a: 0.1634, b: 2.35 }, 5.0, 60.0),
];

/// Strata used for the synthetic plot table: id, area (acres), mean BAPA, SD.
pub const STRATA: [(&str, f64, f64, f64); 3] = [
    ("MU1", 120.0, 140.0, 30.0),
    ("MU2", 80.0, 95.0, 20.0),
    ("MU3", 45.0, 60.0, 35.0),
];

/// Paths written by [`write_dataset`].
#[derive(Debug, Clone)]
pub struct SimulatedFiles {
    pub trees: PathBuf,
    pub plots: PathBuf,
    pub strata: PathBuf,
}

/// Generate synthetic trees for every species in [`SPECIES`].
pub fn simulate_trees(config: &SimulateConfig) -> Result<Vec<TreeObs>, AppError> {
    if config.trees_per_species == 0 {
        return Err(AppError::input("Trees per species must be > 0."));
    }
    if !(config.log_sigma.is_finite() && config.log_sigma >= 0.0) {
        return Err(AppError::input("Log-scale error SD must be finite and >= 0."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, config.log_sigma)
        .map_err(|e| AppError::compute(format!("Noise distribution error: {e}")))?;

    let mut trees = Vec::with_capacity(SPECIES.len() * config.trees_per_species);
    for (code, model, dbh_min, dbh_max) in SPECIES {
        for i in 0..config.trees_per_species {
            let dbh: f64 = rng.gen_range(dbh_min..=dbh_max);
            let biomass = model.a * dbh.powf(model.b) * noise.sample(&mut rng).exp();
            trees.push(TreeObs {
                id: format!("{code}-{:03}", i + 1),
                species: code.to_string(),
                dbh: round_to(dbh, 1),
                biomass: round_to(biomass, 2),
            });
        }
    }
    Ok(trees)
}

/// Generate synthetic plots for every stratum in [`STRATA`].
///
/// Basal area is truncated at zero (an open plot).
pub fn simulate_plots(config: &SimulateConfig) -> Result<(Vec<PlotObs>, Vec<Stratum>), AppError> {
    if config.plots_per_stratum < 2 {
        return Err(AppError::input("Plots per stratum must be >= 2."));
    }

    // Offset the stream so trees and plots are independent for the same seed.
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(0x9e37_79b9));

    let mut plots = Vec::with_capacity(STRATA.len() * config.plots_per_stratum);
    let mut strata = Vec::with_capacity(STRATA.len());
    for (id, area, mean, sd) in STRATA {
        let dist = Normal::new(mean, sd)
            .map_err(|e| AppError::compute(format!("Plot distribution error: {e}")))?;
        for i in 0..config.plots_per_stratum {
            plots.push(PlotObs {
                stratum: id.to_string(),
                plot: format!("{id}-{:02}", i + 1),
                bapa: round_to(dist.sample(&mut rng).max(0.0), 1),
            });
        }
        strata.push(Stratum {
            id: id.to_string(),
            area,
        });
    }
    Ok((plots, strata))
}

/// Write `trees.csv`, `plots.csv`, and `strata.csv` into `config.out_dir`.
pub fn write_dataset(config: &SimulateConfig) -> Result<SimulatedFiles, AppError> {
    std::fs::create_dir_all(&config.out_dir).map_err(|e| {
        AppError::input(format!("Failed to create '{}': {e}", config.out_dir.display()))
    })?;

    let trees = simulate_trees(config)?;
    let (plots, strata) = simulate_plots(config)?;

    let files = SimulatedFiles {
        trees: config.out_dir.join("trees.csv"),
        plots: config.out_dir.join("plots.csv"),
        strata: config.out_dir.join("strata.csv"),
    };

    write_rows(&files.trees, &["tree_id", "species", "dbh", "biomass"], trees.iter().map(|t| {
        vec![t.id.clone(), t.species.clone(), t.dbh.to_string(), t.biomass.to_string()]
    }))?;
    write_rows(&files.plots, &["stratum", "plot", "bapa"], plots.iter().map(|p| {
        vec![p.stratum.clone(), p.plot.clone(), p.bapa.to_string()]
    }))?;
    write_rows(&files.strata, &["stratum", "area"], strata.iter().map(|s| {
        vec![s.id.clone(), s.area.to_string()]
    }))?;

    log::info!(
        "wrote {} trees, {} plots, {} strata to {}",
        trees.len(),
        plots.len(),
        strata.len(),
        config.out_dir.display()
    );
    Ok(files)
}

fn write_rows(
    path: &Path,
    header: &[&str],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", path.display())))?;
    writer
        .write_record(header)
        .map_err(|e| AppError::input(format!("Failed to write header to '{}': {e}", path.display())))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| AppError::input(format!("Failed to write row to '{}': {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush '{}': {e}", path.display())))?;
    Ok(())
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (v * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SimulateConfig {
        SimulateConfig {
            out_dir: std::env::temp_dir().join(format!("forest-stats-sim-{seed}")),
            seed,
            trees_per_species: 25,
            plots_per_stratum: 12,
            log_sigma: 0.15,
        }
    }

    #[test]
    fn same_seed_same_trees() {
        let a = simulate_trees(&config(7)).unwrap();
        let b = simulate_trees(&config(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), SPECIES.len() * 25);
        assert!(a.iter().all(|t| t.dbh > 0.0 && t.biomass > 0.0));
    }

    #[test]
    fn plots_cover_every_stratum() {
        let (plots, strata) = simulate_plots(&config(3)).unwrap();
        assert_eq!(strata.len(), STRATA.len());
        for s in &strata {
            let n = plots.iter().filter(|p| p.stratum == s.id).count();
            assert_eq!(n, 12);
        }
        assert!(plots.iter().all(|p| p.bapa >= 0.0));
    }

    #[test]
    fn write_dataset_creates_readable_csvs() {
        let cfg = config(11);
        let files = write_dataset(&cfg).unwrap();
        let trees = std::fs::read_to_string(&files.trees).unwrap();
        assert!(trees.starts_with("tree_id,species,dbh,biomass"));
        let strata = std::fs::read_to_string(&files.strata).unwrap();
        assert_eq!(strata.lines().count(), STRATA.len() + 1);
    }
}
