//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - read from exposure/reference JSON files
//! - exported to CSV for trend plots

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{SolverOptions, Termination};

/// `DITHPIX` header value of dither position A.
pub const DITHER_A_PIX: f64 = 12.994;
/// `DITHPIX` header value of dither position B.
pub const DITHER_B_PIX: f64 = 13.499;

const DITHER_MATCH_TOL: f64 = 0.01;

/// Detector arm of the spectrograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Chip {
    A,
    B,
    C,
}

impl Chip {
    pub const ALL: [Chip; 3] = [Chip::A, Chip::B, Chip::C];

    /// Single-letter label used in file names and reports.
    pub fn label(self) -> &'static str {
        match self {
            Chip::A => "a",
            Chip::B => "b",
            Chip::C => "c",
        }
    }
}

impl std::fmt::Display for Chip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Dither mechanism position.
///
/// Moving between A and B shifts the arc lines by roughly a pixel, which is
/// expected and must not be mistaken for drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dither {
    A,
    B,
    #[serde(rename = "?")]
    Unknown,
}

impl Dither {
    pub fn from_dithpix(dithpix: f64) -> Self {
        if (dithpix - DITHER_A_PIX).abs() < DITHER_MATCH_TOL {
            Dither::A
        } else if (dithpix - DITHER_B_PIX).abs() < DITHER_MATCH_TOL {
            Dither::B
        } else {
            Dither::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dither::A => "A",
            Dither::B => "B",
            Dither::Unknown => "?",
        }
    }
}

/// Gaussian line model `A * exp(-(x - C)^2 / (2 W^2))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianProfile {
    pub amplitude: f64,
    pub center: f64,
    pub width: f64,
}

impl GaussianProfile {
    pub fn new(amplitude: f64, center: f64, width: f64) -> Self {
        Self {
            amplitude,
            center,
            width,
        }
    }

    /// Copy of this profile with the center replaced.
    pub fn recentered(self, center: f64) -> Self {
        Self { center, ..self }
    }

    pub fn is_finite(&self) -> bool {
        self.amplitude.is_finite() && self.center.is_finite() && self.width.is_finite()
    }
}

/// Reference-relative deltas of a fitted profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// `fitted.amplitude / reference.amplitude`; ~1.0 for a stable lamp.
    pub amplitude_ratio: f64,
    /// `fitted.center - reference.center` (pixels); the drift signal.
    pub delta_center: f64,
    /// `fitted.width - reference.width` (pixels); focus indicator.
    pub delta_width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Convergence {
    Converged,
    Failed,
}

/// Why a fit was classified as failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The window has no dynamic range; there is nothing to fit.
    NoSignal,
    /// The solver stopped without meeting a tolerance criterion.
    Solver(Termination),
    NonFinite,
    NonPositiveAmplitude,
    /// Width collapsed to zero or grew beyond the window span.
    WidthOutOfRange,
    CenterOutsideWindow,
    /// Fitted amplitude does not stand out from the residual scatter.
    NotSignificant,
}

impl FailureReason {
    pub fn describe(self) -> String {
        match self {
            FailureReason::NoSignal => "flat window".to_string(),
            FailureReason::Solver(t) => format!("solver stopped: {}", t.describe()),
            FailureReason::NonFinite => "non-finite parameters".to_string(),
            FailureReason::NonPositiveAmplitude => "non-positive amplitude".to_string(),
            FailureReason::WidthOutOfRange => "width out of range".to_string(),
            FailureReason::CenterOutsideWindow => "center outside window".to_string(),
            FailureReason::NotSignificant => "amplitude below noise".to_string(),
        }
    }
}

/// Output of a single line fit.
///
/// On failure the last solver iterate is still reported; consumers must treat
/// `profile` and `comparison` as suspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub profile: GaussianProfile,
    pub convergence: Convergence,
    pub comparison: Comparison,
    /// Solver termination (absent when the solver was not run).
    pub termination: Option<Termination>,
    pub evaluations: usize,
    /// Root-mean-square residual of the final iterate.
    pub rms_residual: f64,
    pub failure: Option<FailureReason>,
}

impl FitResult {
    pub fn is_converged(&self) -> bool {
        self.convergence == Convergence::Converged
    }
}

/// A contiguous run of intensity samples along one detector row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralWindow {
    /// Pixel coordinate of `samples[0]`.
    pub start: usize,
    pub samples: Vec<f64>,
}

impl SpectralWindow {
    pub fn new(start: usize, samples: Vec<f64>) -> Self {
        Self { start, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// One past the last pixel coordinate.
    pub fn end(&self) -> usize {
        self.start + self.samples.len()
    }

    pub fn pixel(&self, idx: usize) -> f64 {
        (self.start + idx) as f64
    }

    /// Pixel coordinates as floats (the fit abscissa).
    pub fn pixels(&self) -> Vec<f64> {
        (0..self.samples.len()).map(|i| self.pixel(i)).collect()
    }

    /// Distance between the first and the last pixel.
    pub fn span(&self) -> f64 {
        self.samples.len().saturating_sub(1) as f64
    }

    pub fn contains(&self, x: f64) -> bool {
        !self.is_empty() && x >= self.start as f64 && x <= (self.end() - 1) as f64
    }
}

/// Row-major 2-D detector frame; each row is one fiber.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Frame {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, AppError> {
        if rows == 0 || cols == 0 {
            return Err(AppError::new(2, "Frame must have at least one row and one column."));
        }
        if data.len() != rows * cols {
            return Err(AppError::new(
                2,
                format!("Frame data has {} samples, expected {rows}x{cols}.", data.len()),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Result<Self, AppError> {
        Self::new(rows, cols, vec![0.0; rows * cols])
    }

    /// Build a frame from nested rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, AppError> {
        let n_rows = rows.len();
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(n_rows * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(AppError::new(
                    2,
                    format!("Frame row {i} has {} columns, expected {cols}.", row.len()),
                ));
            }
            data.extend(row);
        }
        Self::new(n_rows, cols, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row >= self.rows {
            return None;
        }
        let off = row * self.cols;
        Some(&self.data[off..off + self.cols])
    }

    pub fn row_mut(&mut self, row: usize) -> Option<&mut [f64]> {
        if row >= self.rows {
            return None;
        }
        let off = row * self.cols;
        Some(&mut self.data[off..off + self.cols])
    }

    /// Nested-row view used by the JSON container.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.cols).map(|c| c.to_vec()).collect()
    }
}

/// Reference profile of the monitored line on one chip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineReference {
    pub chip: Chip,
    pub profile: GaussianProfile,
    /// Pixels on each side of the reference center used for the fit window.
    pub half_width: usize,
}

/// The injected (chip -> reference) mapping for a monitoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSet {
    /// Exposure the references were calibrated on (informational).
    #[serde(default)]
    pub master: Option<String>,
    pub lines: Vec<LineReference>,
}

impl ReferenceSet {
    /// Hand-calibrated ThAr references from MJD 56531 (average of dithers A and B).
    pub fn builtin() -> Self {
        Self {
            master: Some("56531/09690003".to_string()),
            lines: vec![
                LineReference {
                    chip: Chip::A,
                    profile: GaussianProfile::new(53864.0, 939.646, 1.2745),
                    half_width: 15,
                },
                LineReference {
                    chip: Chip::B,
                    profile: GaussianProfile::new(46184.2, 924.366, 1.071),
                    half_width: 15,
                },
                LineReference {
                    chip: Chip::C,
                    profile: GaussianProfile::new(31715.0, 1776.62, 0.803),
                    half_width: 15,
                },
            ],
        }
    }

    pub fn get(&self, chip: Chip) -> Option<&LineReference> {
        self.lines.iter().find(|l| l.chip == chip)
    }

    /// Same set with every half-width replaced.
    pub fn with_half_width(mut self, half_width: usize) -> Self {
        for line in &mut self.lines {
            line.half_width = half_width;
        }
        self
    }
}

/// Header keywords the monitor reads from an exposure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureHeader {
    #[serde(rename = "IMAGETYP", default)]
    pub image_type: Option<String>,
    #[serde(rename = "LAMPTHAR", default)]
    pub lamp_thar: Option<i64>,
    #[serde(rename = "LAMPUNE", default)]
    pub lamp_une: Option<i64>,
    #[serde(rename = "NFRAMES", default)]
    pub nframes: Option<i64>,
    #[serde(rename = "DITHPIX", default)]
    pub dithpix: Option<f64>,
    #[serde(rename = "DATE-OBS", default)]
    pub date_obs: Option<String>,
    #[serde(rename = "CARTID", default)]
    pub cart_id: Option<i64>,
    #[serde(rename = "PLATEID", default)]
    pub plate_id: Option<i64>,
    #[serde(rename = "OBSCMNT", default)]
    pub comment: Option<String>,
    /// Keywords the monitor does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExposureHeader {
    pub fn is_arc(&self) -> bool {
        self.image_type.as_deref() == Some("ArcLamp")
    }

    /// ThAr arc exposures are the only ones carrying the monitored lines.
    pub fn is_thar_arc(&self) -> bool {
        self.is_arc() && self.lamp_thar == Some(1)
    }

    pub fn dither(&self) -> Dither {
        self.dithpix.map(Dither::from_dithpix).unwrap_or(Dither::Unknown)
    }

    /// Image type with the lit lamp appended for arcs, e.g. `ArcLamp-Thar`.
    pub fn image_label(&self) -> String {
        let base = self.image_type.clone().unwrap_or_else(|| "-".to_string());
        if !self.is_arc() {
            return base;
        }
        if self.lamp_une == Some(1) {
            format!("{base}-Une")
        } else if self.lamp_thar == Some(1) {
            format!("{base}-Thar")
        } else {
            format!("{base}----")
        }
    }

    /// `HH:MM` UT extracted from `DATE-OBS`.
    pub fn ut_time(&self) -> Option<&str> {
        self.date_obs.as_deref().and_then(|d| d.get(11..16))
    }
}

/// JSON exposure container (one chip of one exposure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureFile {
    pub exposure: String,
    pub mjd: u32,
    pub chip: Chip,
    pub header: ExposureHeader,
    pub pixels: Vec<Vec<f64>>,
}

/// A loaded exposure ready for measurement.
#[derive(Debug, Clone)]
pub struct Exposure {
    pub path: PathBuf,
    pub exposure: String,
    pub mjd: u32,
    pub chip: Chip,
    pub header: ExposureHeader,
    pub frame: Frame,
}

/// One fitted line on one chip of one exposure.
#[derive(Debug, Clone)]
pub struct LineMeasurement {
    pub exposure: String,
    pub mjd: u32,
    pub chip: Chip,
    pub fiber: usize,
    pub dither: Dither,
    pub dithpix: Option<f64>,
    pub reference: GaussianProfile,
    pub result: FitResult,
}

/// A full drift run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags, the environment and the reference file.
#[derive(Debug, Clone)]
pub struct DriftConfig {
    pub data_root: PathBuf,
    pub mjd_start: u32,
    pub mjd_end: u32,
    pub chips: Vec<Chip>,
    pub fiber: usize,
    pub references: ReferenceSet,
    pub solver: SolverOptions,
    pub export: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dither_classification_tolerates_header_rounding() {
        assert_eq!(Dither::from_dithpix(12.994), Dither::A);
        assert_eq!(Dither::from_dithpix(12.9941), Dither::A);
        assert_eq!(Dither::from_dithpix(13.499), Dither::B);
        assert_eq!(Dither::from_dithpix(13.2), Dither::Unknown);
    }

    #[test]
    fn frame_rejects_ragged_rows() {
        let err = Frame::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let frame = Frame::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(frame.row(1), Some(&[3.0, 4.0][..]));
        assert_eq!(frame.row(2), None);
    }

    #[test]
    fn empty_frames_are_rejected() {
        assert_eq!(Frame::zeros(0, 2048).unwrap_err().exit_code(), 2);
        assert_eq!(Frame::zeros(4, 0).unwrap_err().exit_code(), 2);
        assert_eq!(Frame::new(0, 3, Vec::new()).unwrap_err().exit_code(), 2);
        assert_eq!(Frame::zeros(2, 3).unwrap().row(1), Some(&[0.0; 3][..]));
    }

    #[test]
    fn header_labels_lamp_and_ut() {
        let header: ExposureHeader = serde_json::from_str(
            r#"{"IMAGETYP":"ArcLamp","LAMPTHAR":1,"LAMPUNE":0,"DATE-OBS":"2013-08-26T21:41:35","EXPTIME":10.6}"#,
        )
        .unwrap();
        assert!(header.is_thar_arc());
        assert_eq!(header.image_label(), "ArcLamp-Thar");
        assert_eq!(header.ut_time(), Some("21:41"));
        assert!(header.extra.contains_key("EXPTIME"));

        let quartz = ExposureHeader {
            image_type: Some("QuartzFlat".to_string()),
            ..ExposureHeader::default()
        };
        assert!(!quartz.is_thar_arc());
        assert_eq!(quartz.image_label(), "QuartzFlat");
    }

    #[test]
    fn window_pixel_geometry() {
        let w = SpectralWindow::new(920, vec![0.0; 40]);
        assert_eq!(w.end(), 960);
        assert_eq!(w.pixel(3), 923.0);
        assert_eq!(w.span(), 39.0);
        assert!(w.contains(959.0));
        assert!(!w.contains(959.5));
    }
}
