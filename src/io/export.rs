//! Export per-measurement drift results to CSV, and read them back for trend plots.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.
//! Failed fits are exported too (`status = failed`) so gaps in a trend are visible.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Chip, Convergence, Dither, LineMeasurement};
use crate::error::AppError;

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRow {
    pub exposure: String,
    pub mjd: u32,
    pub chip: Chip,
    pub fiber: usize,
    pub dither: Dither,
    pub dithpix: Option<f64>,
    pub amplitude: f64,
    pub center: f64,
    pub width: f64,
    pub amplitude_ratio: f64,
    pub delta_center: f64,
    pub delta_width: f64,
    pub status: Convergence,
    pub reason: String,
}

impl From<&LineMeasurement> for DriftRow {
    fn from(m: &LineMeasurement) -> Self {
        let r = &m.result;
        DriftRow {
            exposure: m.exposure.clone(),
            mjd: m.mjd,
            chip: m.chip,
            fiber: m.fiber,
            dither: m.dither,
            dithpix: m.dithpix,
            amplitude: r.profile.amplitude,
            center: r.profile.center,
            width: r.profile.width,
            amplitude_ratio: r.comparison.amplitude_ratio,
            delta_center: r.comparison.delta_center,
            delta_width: r.comparison.delta_width,
            status: r.convergence,
            reason: r.failure.map(|f| f.describe()).unwrap_or_default(),
        }
    }
}

/// Write measurements to a CSV file.
pub fn write_drift_csv(path: &Path, measurements: &[LineMeasurement]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);

    for m in measurements {
        writer
            .serialize(DriftRow::from(m))
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV: {e}")))?;

    log::info!("wrote {} rows to {}", measurements.len(), path.display());
    Ok(())
}

/// Read a CSV written by [`write_drift_csv`].
pub fn read_drift_csv(path: &Path) -> Result<Vec<DriftRow>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open drift CSV '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize().enumerate() {
        // +2: header line plus 1-based numbering.
        let row: DriftRow =
            record.map_err(|e| AppError::new(2, format!("Invalid drift CSV line {}: {e}", idx + 2)))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Comparison, FailureReason, FitResult, GaussianProfile};

    fn measurement(exposure: &str, dither: Dither, failure: Option<FailureReason>) -> LineMeasurement {
        let reference = GaussianProfile::new(53864.0, 939.646, 1.2745);
        let profile = GaussianProfile::new(53000.0, 939.9, 1.25);
        LineMeasurement {
            exposure: exposure.to_string(),
            mjd: 56531,
            chip: Chip::A,
            fiber: 150,
            dither,
            dithpix: Some(12.994),
            reference,
            result: FitResult {
                profile,
                convergence: if failure.is_none() { Convergence::Converged } else { Convergence::Failed },
                comparison: Comparison {
                    amplitude_ratio: 53000.0 / 53864.0,
                    delta_center: 939.9 - 939.646,
                    delta_width: 1.25 - 1.2745,
                },
                termination: None,
                evaluations: 12,
                rms_residual: 3.0,
                failure,
            },
        }
    }

    #[test]
    fn csv_rows_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drift.csv");
        let ms = vec![
            measurement("09690003", Dither::A, None),
            measurement("09690005", Dither::B, Some(FailureReason::NoSignal)),
        ];
        write_drift_csv(&path, &ms).unwrap();

        let rows = read_drift_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], DriftRow::from(&ms[0]));
        assert_eq!(rows[1].dither, Dither::B);
        assert_eq!(rows[1].status, Convergence::Failed);
        assert_eq!(rows[1].reason, "flat window");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("exposure,mjd,chip,fiber,dither,dithpix,"));
    }

    #[test]
    fn malformed_csv_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "exposure,mjd,chip,fiber,dither,dithpix,amplitude,center,width,amplitude_ratio,delta_center,delta_width,status,reason\n\
             1,notanumber,a,150,A,,1,1,1,1,0,0,converged,\n",
        )
        .unwrap();
        let err = read_drift_csv(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
