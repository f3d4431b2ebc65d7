//! Reporting utilities: per-chip drift summaries and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{Chip, Dither, LineMeasurement};

/// Center-offset statistics of the converged fits at one dither position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetStats {
    pub n: usize,
    pub mean: f64,
    /// Population standard deviation (0 for a single fit).
    pub std: f64,
}

/// Per-chip roll-up of a drift run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChipSummary {
    pub chip: Chip,
    pub measured: usize,
    pub converged: usize,
    pub dither_a: Option<OffsetStats>,
    pub dither_b: Option<OffsetStats>,
}

impl ChipSummary {
    /// Mean B minus mean A center offset; the dither step as seen by the line.
    pub fn dither_separation(&self) -> Option<f64> {
        Some(self.dither_b?.mean - self.dither_a?.mean)
    }
}

/// Summarize measurements per chip, in `chips` order; chips without
/// measurements are omitted.
pub fn summarize(measurements: &[LineMeasurement], chips: &[Chip]) -> Vec<ChipSummary> {
    chips
        .iter()
        .filter_map(|&chip| {
            let on_chip: Vec<&LineMeasurement> = measurements.iter().filter(|m| m.chip == chip).collect();
            if on_chip.is_empty() {
                return None;
            }
            let converged: Vec<&LineMeasurement> =
                on_chip.iter().copied().filter(|m| m.result.is_converged()).collect();
            Some(ChipSummary {
                chip,
                measured: on_chip.len(),
                converged: converged.len(),
                dither_a: offset_stats(&converged, Dither::A),
                dither_b: offset_stats(&converged, Dither::B),
            })
        })
        .collect()
}

fn offset_stats(measurements: &[&LineMeasurement], dither: Dither) -> Option<OffsetStats> {
    let values: Vec<f64> = measurements
        .iter()
        .filter(|m| m.dither == dither)
        .map(|m| m.result.comparison.delta_center)
        .collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(OffsetStats {
        n: values.len(),
        mean,
        std: var.sqrt(),
    })
}


#[cfg(test)]
mod tests {
    use super::testutil::measurement;
    use super::*;
    use crate::domain::{FailureReason, GaussianProfile};

    #[test]
    fn summary_splits_dithers_and_ignores_failures() {
        let ms = vec![
            measurement("1", Chip::A, Dither::A, Some(12.994), GaussianProfile::new(5e4, 939.4, 1.27), None),
            measurement("2", Chip::A, Dither::B, Some(13.499), GaussianProfile::new(5e4, 939.9, 1.27), None),
            measurement("3", Chip::A, Dither::A, Some(12.994), GaussianProfile::new(5e4, 939.6, 1.27), None),
            measurement(
                "4",
                Chip::A,
                Dither::B,
                Some(13.499),
                GaussianProfile::new(1.0, 935.0, 1.27),
                Some(FailureReason::NotSignificant),
            ),
        ];

        let summary = summarize(&ms, &[Chip::A, Chip::B]);
        assert_eq!(summary.len(), 1);
        let a = &summary[0];
        assert_eq!((a.measured, a.converged), (4, 3));

        let da = a.dither_a.unwrap();
        assert_eq!(da.n, 2);
        assert!((da.mean - (939.5 - 939.646)).abs() < 1e-9);
        assert!((da.std - 0.1).abs() < 1e-9);

        let db = a.dither_b.unwrap();
        assert_eq!(db.n, 1);
        assert_eq!(db.std, 0.0);
        assert!((a.dither_separation().unwrap() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn separation_needs_both_dithers() {
        let ms = vec![measurement(
            "1",
            Chip::C,
            Dither::A,
            Some(12.994),
            GaussianProfile::new(5e4, 939.4, 1.27),
            None,
        )];
        let summary = summarize(&ms, &Chip::ALL);
        assert_eq!(summary[0].chip, Chip::C);
        assert_eq!(summary[0].dither_separation(), None);
    }
}
