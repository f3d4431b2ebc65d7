//! Shared monitoring workflows used by the CLI handlers.
//!
//! Keeping these in one place avoids mixing the core workflow:
//! discover exposures -> qualify arcs -> measure lines -> collect/sort
//! with presentation. The handlers in `app` only print and export.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::data::{SimConfig, exposure_path, generate_night};
use crate::domain::{
    Chip, DriftConfig, Exposure, ExposureHeader, FitResult, LineMeasurement, LineReference, ReferenceSet,
    SpectralWindow,
};
use crate::error::AppError;
use crate::fit::{LineProfileFitter, extract_window, locate_peak, measure_line};
use crate::io::{ExposureEntry, discover_night, find_exposure, read_exposure, write_exposure};
use crate::math::SolverOptions;

/// Fibers per chip on the APOGEE detectors.
pub const MAX_FIBERS: usize = 300;

/// Why a discovered exposure file produced no measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub mjd: u32,
    pub exposure: String,
    pub chip: Chip,
    pub reason: String,
}

/// All outputs of a single `thar drift` run.
#[derive(Debug, Clone)]
pub struct DriftRun {
    /// Sorted by MJD, then exposure, then chip.
    pub measurements: Vec<LineMeasurement>,
    /// Files that could not be measured (read errors, window out of range).
    pub skipped: Vec<Skipped>,
    /// Exposure files discovered for the selected chips, arcs or not.
    pub scanned: usize,
}

enum Outcome {
    Measured(Box<LineMeasurement>),
    NotThar,
    Skipped(Skipped),
}

/// Measure every ThAr arc of every selected chip over the MJD range.
pub fn run_drift(config: &DriftConfig) -> Result<DriftRun, AppError> {
    if config.mjd_start > config.mjd_end {
        return Err(AppError::new(
            2,
            format!("Invalid MJD range: {} > {}.", config.mjd_start, config.mjd_end),
        ));
    }
    if config.fiber >= MAX_FIBERS {
        return Err(AppError::new(2, format!("Fiber must be < {MAX_FIBERS} (got {}).", config.fiber)));
    }

    let mut entries = Vec::new();
    for mjd in config.mjd_start..=config.mjd_end {
        let night = discover_night(&config.data_root, mjd)?;
        let before = entries.len();
        entries.extend(night.into_iter().filter(|e| config.chips.contains(&e.chip)));
        log::info!("mjd {mjd}: {} exposure files", entries.len() - before);
    }

    let outcomes: Vec<Outcome> = entries
        .par_iter()
        .map(|entry| measure_entry(entry, config))
        .collect();

    let mut measurements = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Measured(m) => measurements.push(*m),
            Outcome::NotThar => {}
            Outcome::Skipped(s) => skipped.push(s),
        }
    }
    measurements.sort_by(|a, b| (a.mjd, &a.exposure, a.chip).cmp(&(b.mjd, &b.exposure, b.chip)));

    let failed = measurements.iter().filter(|m| !m.result.is_converged()).count();
    log::info!(
        "measured {} lines ({failed} failed fits), skipped {} files",
        measurements.len(),
        skipped.len()
    );

    Ok(DriftRun {
        measurements,
        skipped,
        scanned: entries.len(),
    })
}

fn measure_entry(entry: &ExposureEntry, config: &DriftConfig) -> Outcome {
    let skip = |reason: String| {
        log::warn!("skipping {}: {reason}", entry.path.display());
        Outcome::Skipped(Skipped {
            mjd: entry.mjd,
            exposure: entry.exposure.clone(),
            chip: entry.chip,
            reason,
        })
    };

    let exposure = match read_exposure(&entry.path) {
        Ok(e) => e,
        Err(e) => return skip(e.to_string()),
    };
    if !exposure.header.is_thar_arc() {
        log::debug!("{} is {}, not a ThAr arc", entry.path.display(), exposure.header.image_label());
        return Outcome::NotThar;
    }
    let Some(line) = config.references.get(exposure.chip) else {
        return skip(format!("no reference line for chip {}", exposure.chip));
    };

    match measure_line(&exposure.frame, config.fiber, line, &config.solver) {
        Ok(result) => {
            if let Some(reason) = result.failure {
                log::warn!(
                    "{} chip {}: fit failed ({})",
                    exposure.exposure,
                    exposure.chip,
                    reason.describe()
                );
            }
            Outcome::Measured(Box::new(measurement(&exposure, config.fiber, line, result)))
        }
        Err(e) => skip(e.to_string()),
    }
}

fn measurement(exposure: &Exposure, fiber: usize, line: &LineReference, result: FitResult) -> LineMeasurement {
    LineMeasurement {
        exposure: exposure.exposure.clone(),
        mjd: exposure.mjd,
        chip: exposure.chip,
        fiber,
        dither: exposure.header.dither(),
        dithpix: exposure.header.dithpix,
        reference: line.profile,
        result,
    }
}

/// One exposure of a night listing.
#[derive(Debug, Clone)]
pub struct NightEntry {
    pub exposure: String,
    pub header: ExposureHeader,
    /// ThAr center offset on the listing chip, when the exposure is a measurable ThAr arc.
    pub thar_offset: Option<f64>,
    /// Set when the listed file could not be loaded; the header is then empty.
    pub read_error: Option<String>,
}

/// List a night's exposures, one entry per exposure number.
///
/// The header is taken from the first chip found; the ThAr offset is measured
/// on `chip` when that chip's file exists and its fit converges. An unreadable
/// file yields an entry carrying the read error instead of aborting the listing.
pub fn run_list(
    data_root: &Path,
    mjd: u32,
    chip: Chip,
    fiber: usize,
    references: &ReferenceSet,
    solver: &SolverOptions,
) -> Result<Vec<NightEntry>, AppError> {
    let mut by_exposure: BTreeMap<String, Vec<ExposureEntry>> = BTreeMap::new();
    for entry in discover_night(data_root, mjd)? {
        by_exposure.entry(entry.exposure.clone()).or_default().push(entry);
    }

    let groups: Vec<(String, Vec<ExposureEntry>)> = by_exposure.into_iter().collect();
    let entries: Vec<NightEntry> = groups
        .par_iter()
        .map(|(exposure, files)| {
            let file = files.iter().find(|f| f.chip == chip).unwrap_or(&files[0]);
            let loaded = match read_exposure(&file.path) {
                Ok(loaded) => loaded,
                Err(e) => {
                    log::warn!("cannot read {}: {e}", file.path.display());
                    return NightEntry {
                        exposure: exposure.clone(),
                        header: ExposureHeader::default(),
                        thar_offset: None,
                        read_error: Some(e.to_string()),
                    };
                }
            };

            let thar_offset = if loaded.chip == chip && loaded.header.is_thar_arc() {
                references
                    .get(chip)
                    .and_then(|line| measure_line(&loaded.frame, fiber, line, solver).ok())
                    .filter(|r| r.is_converged())
                    .map(|r| r.comparison.delta_center)
            } else {
                None
            };

            NightEntry {
                exposure: exposure.clone(),
                header: loaded.header,
                thar_offset,
                read_error: None,
            }
        })
        .collect();
    Ok(entries)
}

/// Inputs and outputs of a single-exposure profile inspection.
#[derive(Debug, Clone)]
pub struct ProfileRun {
    pub exposure: String,
    pub mjd: u32,
    pub chip: Chip,
    pub fiber: usize,
    pub header: ExposureHeader,
    pub line: LineReference,
    pub window: SpectralWindow,
    pub peak: usize,
    pub result: FitResult,
}

/// Fit the monitored line of one fiber of one exposure.
pub fn run_profile(
    data_root: &Path,
    chip: Chip,
    exposure: &str,
    fiber: usize,
    references: &ReferenceSet,
    solver: &SolverOptions,
) -> Result<ProfileRun, AppError> {
    if fiber >= MAX_FIBERS {
        return Err(AppError::new(2, format!("Fiber must be < {MAX_FIBERS} (got {fiber}).")));
    }
    let line = *references
        .get(chip)
        .ok_or_else(|| AppError::new(2, format!("No reference line for chip {chip}.")))?;

    let path = find_exposure(data_root, chip, exposure)?;
    let loaded = read_exposure(&path)?;
    if !loaded.header.is_thar_arc() {
        log::warn!("{exposure} is {}, fitting anyway", loaded.header.image_label());
    }

    let fitter = LineProfileFitter::new(&line, *solver);
    let window = extract_window(&loaded.frame, fiber, line.profile.center, line.half_width)?;
    let peak = locate_peak(&window, line.profile.center);
    let result = fitter.fit(&window, &line.profile.recentered(peak as f64));

    Ok(ProfileRun {
        exposure: loaded.exposure,
        mjd: loaded.mjd,
        chip,
        fiber,
        header: loaded.header,
        line,
        window,
        peak,
        result,
    })
}

/// Generate a synthetic night and write it under `data_root`.
pub fn run_simulate(data_root: &Path, config: &SimConfig) -> Result<Vec<PathBuf>, AppError> {
    let night = generate_night(config)?;
    let mut written = Vec::with_capacity(night.len());
    for exposure in &night {
        let path = exposure_path(data_root, exposure);
        write_exposure(&path, exposure)?;
        log::debug!("wrote {}", path.display());
        written.push(path);
    }
    log::info!("wrote {} exposure files for mjd {}", written.len(), config.mjd);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Convergence;

    fn sim_config(mjd: u32) -> SimConfig {
        SimConfig {
            mjd,
            count: 2,
            rows: 4,
            seed: 1,
            noise: 0.0,
            throughput_jitter: 0.0,
            drift_sigma: 0.0,
            references: ReferenceSet::builtin(),
        }
    }

    fn drift_config(root: &Path, chips: Vec<Chip>) -> DriftConfig {
        DriftConfig {
            data_root: root.to_path_buf(),
            mjd_start: 56531,
            mjd_end: 56532,
            chips,
            fiber: 2,
            references: ReferenceSet::builtin(),
            solver: SolverOptions::default(),
            export: None,
        }
    }

    #[test]
    fn drift_measures_only_thar_arcs_in_order() {
        let root = tempfile::tempdir().unwrap();
        run_simulate(root.path(), &sim_config(56531)).unwrap();
        run_simulate(root.path(), &sim_config(56532)).unwrap();

        let run = run_drift(&drift_config(root.path(), vec![Chip::A, Chip::C])).unwrap();
        // 2 nights x 4 exposures x 2 chips
        assert_eq!(run.scanned, 16);
        assert!(run.skipped.is_empty());
        // 2 nights x 2 ThAr arcs x 2 chips
        assert_eq!(run.measurements.len(), 8);
        assert!(run.measurements.iter().all(|m| m.result.convergence == Convergence::Converged));

        let keys: Vec<(u32, &str, Chip)> =
            run.measurements.iter().map(|m| (m.mjd, m.exposure.as_str(), m.chip)).collect();
        assert_eq!(keys[0], (56531, "09690001", Chip::A));
        assert_eq!(keys[1], (56531, "09690001", Chip::C));
        assert_eq!(keys[7], (56532, "09700002", Chip::C));
    }

    #[test]
    fn drift_skips_fibers_missing_from_frame() {
        let root = tempfile::tempdir().unwrap();
        run_simulate(root.path(), &sim_config(56531)).unwrap();

        let config = DriftConfig {
            fiber: 10,
            ..drift_config(root.path(), vec![Chip::B])
        };
        let run = run_drift(&config).unwrap();
        assert!(run.measurements.is_empty());
        assert_eq!(run.skipped.len(), 2);
        assert!(run.skipped[0].reason.contains("row range"));
    }

    #[test]
    fn drift_rejects_bad_arguments() {
        let root = tempfile::tempdir().unwrap();
        let reversed = DriftConfig {
            mjd_start: 56533,
            ..drift_config(root.path(), vec![Chip::A])
        };
        assert_eq!(run_drift(&reversed).unwrap_err().exit_code(), 2);

        let fiber = DriftConfig {
            fiber: 300,
            ..drift_config(root.path(), vec![Chip::A])
        };
        assert_eq!(run_drift(&fiber).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn list_reports_offsets_for_thar_only() {
        let root = tempfile::tempdir().unwrap();
        run_simulate(root.path(), &sim_config(56531)).unwrap();

        let entries = run_list(
            root.path(),
            56531,
            Chip::A,
            0,
            &ReferenceSet::builtin(),
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(entries.len(), 4);
        let a = entries[0].thar_offset.unwrap();
        let b = entries[1].thar_offset.unwrap();
        assert!((b - a - crate::data::DITHER_SHIFT).abs() < 1e-6);
        assert_eq!(entries[2].header.image_label(), "ArcLamp-Une");
        assert!(entries[2].thar_offset.is_none());
        assert!(entries[3].thar_offset.is_none());
        assert!(entries.iter().all(|e| e.read_error.is_none()));
    }

    #[test]
    fn list_keeps_going_past_unreadable_file() {
        let root = tempfile::tempdir().unwrap();
        run_simulate(root.path(), &sim_config(56531)).unwrap();
        let night = crate::io::night_dir(root.path(), 56531);
        std::fs::write(night.join(crate::io::exposure_file_name(Chip::A, "09690099")), "{\"exposure\": ").unwrap();

        let entries = run_list(
            root.path(),
            56531,
            Chip::A,
            0,
            &ReferenceSet::builtin(),
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries[0].thar_offset.is_some());
        let broken = &entries[4];
        assert_eq!(broken.exposure, "09690099");
        assert!(broken.thar_offset.is_none());
        assert!(broken.read_error.as_deref().unwrap().contains("Invalid exposure JSON"));
    }

    #[test]
    fn profile_fits_requested_fiber() {
        let root = tempfile::tempdir().unwrap();
        run_simulate(root.path(), &sim_config(56531)).unwrap();
        let refs = ReferenceSet::builtin();
        let opts = SolverOptions::default();

        let run = run_profile(root.path(), Chip::B, "09690002", 0, &refs, &opts).unwrap();
        assert!(run.result.is_converged());
        assert_eq!(run.window.len(), 30);
        assert_eq!(run.peak, 925);

        assert_eq!(run_profile(root.path(), Chip::B, "09690002", 300, &refs, &opts).unwrap_err().exit_code(), 2);
        assert_eq!(run_profile(root.path(), Chip::B, "09690099", 0, &refs, &opts).unwrap_err().exit_code(), 3);
        assert_eq!(run_profile(root.path(), Chip::B, "09690002", 7, &refs, &opts).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn profile_still_fits_non_thar_exposure() {
        let root = tempfile::tempdir().unwrap();
        run_simulate(root.path(), &sim_config(56531)).unwrap();

        let run = run_profile(
            root.path(),
            Chip::A,
            "09690003",
            0,
            &ReferenceSet::builtin(),
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(run.header.image_label(), "ArcLamp-Une");
        assert!(!run.result.is_converged());
    }
}
