//! Write JSON reports.
//!
//! A report is the portable record of a run: settings, estimates, and enough
//! diagnostics to compare runs later. Schemas live in `domain::BiomassReportFile`
//! and `sampling::SamplingReportFile`.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::error::AppError;

/// Tool name stamped into every report.
pub const TOOL_NAME: &str = "fst";

/// Write any report as pretty JSON.
pub fn write_report_json<T: Serialize>(path: &Path, report: &T) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create report JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .map_err(|e| AppError::input(format!("Failed to write report JSON: {e}")))?;
    log::info!("wrote report {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{Allocation, allocate};
    use crate::domain::{AllocationMethod, StratumSpec};

    #[test]
    fn report_is_pretty_json_with_the_allocation() {
        let dir = std::env::temp_dir().join(format!("fst-report-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("alloc.json");

        let strata = vec![
            StratumSpec { id: "MU1".into(), area: 120.0, sd: 30.0 },
            StratumSpec { id: "MU2".into(), area: 80.0, sd: 20.0 },
        ];
        let alloc = allocate(12, &strata, AllocationMethod::Optimal, 2).unwrap();
        write_report_json(&path, &alloc).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"method\": \"optimal\""), "{text}");
        let back: Allocation = serde_json::from_str(&text).unwrap();
        assert_eq!(back.total, 12);
        assert_eq!(back.rows.len(), 2);
        std::fs::remove_dir_all(&dir).ok();

        let err = write_report_json(&dir.join("missing").join("alloc.json"), &alloc).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }
}
