//! Gaussian line fitting and reference comparison.
//!
//! Given:
//! - a spectral window `(x_i, y_i)` around a ThAr line
//! - an initial profile (normally the reference re-centered on the peak pixel)
//!
//! we run Levenberg–Marquardt on `A * exp(-(x - C)^2 / (2 W^2)) - y` and then
//! decide whether the result is a usable line measurement.
//!
//! A fit never errors. Cosmic rays, saturated lines or a missing lamp are
//! expected in a night of data, so every outcome is a `FitResult` and the
//! caller logs/flags the failures.

use crate::domain::{
    Comparison, Convergence, FailureReason, FitResult, Frame, GaussianProfile, LineReference, SpectralWindow,
};
use crate::error::RangeError;
use crate::fit::window::{extract_band_window, extract_window, locate_peak};
use crate::math::{SolverOptions, levenberg_marquardt};
use crate::models::{GaussianProblem, from_params, to_params};

/// Minimum ratio of fitted amplitude to RMS residual for a real line.
pub const MIN_SIGNIFICANCE: f64 = 5.0;

/// Compare a fitted profile to its reference.
pub fn compare_to_reference(fitted: &GaussianProfile, reference: &GaussianProfile) -> Comparison {
    Comparison {
        amplitude_ratio: fitted.amplitude / reference.amplitude,
        delta_center: fitted.center - reference.center,
        delta_width: fitted.width - reference.width,
    }
}

/// Fit a Gaussian to `window` starting from `initial`.
///
/// `reference` is only used for the comparison fields of the result.
pub fn fit_profile(
    window: &SpectralWindow,
    initial: &GaussianProfile,
    reference: &GaussianProfile,
    opts: &SolverOptions,
) -> FitResult {
    let x = window.pixels();
    let y = &window.samples;
    let problem = GaussianProblem { x: &x, y };

    if let Some(reason) = precheck(window) {
        let rms = rms_of(initial, &x, y);
        return FitResult {
            profile: *initial,
            convergence: Convergence::Failed,
            comparison: compare_to_reference(initial, reference),
            termination: None,
            evaluations: 0,
            rms_residual: rms,
            failure: Some(reason),
        };
    }

    let report = levenberg_marquardt(&problem, to_params(initial), opts);
    let mut profile = from_params(&report.params);
    // The model depends on W only through W^2.
    profile.width = profile.width.abs();

    let rms = (report.sse / window.len() as f64).sqrt();
    let failure = classify(window, &profile, report.termination, rms);
    let convergence = if failure.is_none() {
        Convergence::Converged
    } else {
        Convergence::Failed
    };

    log::debug!(
        "fit [{}, {}): A={:.1} C={:.3} W={:.3} rms={:.3} evals={} termination={:?}",
        window.start,
        window.end(),
        profile.amplitude,
        profile.center,
        profile.width,
        rms,
        report.evaluations,
        report.termination
    );

    FitResult {
        profile,
        convergence,
        comparison: compare_to_reference(&profile, reference),
        termination: Some(report.termination),
        evaluations: report.evaluations,
        rms_residual: rms,
        failure,
    }
}

fn precheck(window: &SpectralWindow) -> Option<FailureReason> {
    if window.samples.iter().any(|v| !v.is_finite()) {
        return Some(FailureReason::NonFinite);
    }
    let min = window.samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = window.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(max > min) {
        return Some(FailureReason::NoSignal);
    }
    None
}

fn classify(
    window: &SpectralWindow,
    profile: &GaussianProfile,
    termination: crate::math::Termination,
    rms: f64,
) -> Option<FailureReason> {
    if !termination.is_success() {
        return Some(FailureReason::Solver(termination));
    }
    if !profile.is_finite() || !rms.is_finite() {
        return Some(FailureReason::NonFinite);
    }
    if profile.amplitude <= 0.0 {
        return Some(FailureReason::NonPositiveAmplitude);
    }
    if profile.width <= 0.0 || profile.width > window.span() {
        return Some(FailureReason::WidthOutOfRange);
    }
    if !window.contains(profile.center) {
        return Some(FailureReason::CenterOutsideWindow);
    }
    if profile.amplitude < MIN_SIGNIFICANCE * rms {
        return Some(FailureReason::NotSignificant);
    }
    None
}

fn rms_of(profile: &GaussianProfile, x: &[f64], y: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = crate::models::evaluate(profile, xi) - yi;
            r * r
        })
        .sum();
    (sse / x.len() as f64).sqrt()
}

/// Fits the monitored line of one chip against its reference profile.
///
/// Stateless apart from the read-only reference; one instance can be shared
/// across threads.
#[derive(Debug, Clone, Copy)]
pub struct LineProfileFitter {
    pub reference: GaussianProfile,
    pub half_width: usize,
    pub options: SolverOptions,
}

impl LineProfileFitter {
    pub fn new(line: &LineReference, options: SolverOptions) -> Self {
        Self {
            reference: line.profile,
            half_width: line.half_width,
            options,
        }
    }

    /// Fit `window` from `initial`, comparing against this fitter's reference.
    pub fn fit(&self, window: &SpectralWindow, initial: &GaussianProfile) -> FitResult {
        fit_profile(window, initial, &self.reference, &self.options)
    }

    /// Window around the reference center, re-center on the peak, fit.
    pub fn measure(&self, frame: &Frame, fiber_row: usize) -> Result<FitResult, RangeError> {
        let window = extract_window(frame, fiber_row, self.reference.center, self.half_width)?;
        Ok(self.fit_recentered(&window))
    }

    /// Same as [`measure`](Self::measure) on the mean of a band of rows.
    pub fn measure_band(&self, frame: &Frame, rows: std::ops::Range<usize>) -> Result<FitResult, RangeError> {
        let window = extract_band_window(frame, rows, self.reference.center, self.half_width)?;
        Ok(self.fit_recentered(&window))
    }

    fn fit_recentered(&self, window: &SpectralWindow) -> FitResult {
        let peak = locate_peak(window, self.reference.center);
        let initial = self.reference.recentered(peak as f64);
        self.fit(window, &initial)
    }
}

/// Measure one line: the composed procedure used by every driver.
pub fn measure_line(
    frame: &Frame,
    fiber_row: usize,
    line: &LineReference,
    opts: &SolverOptions,
) -> Result<FitResult, RangeError> {
    LineProfileFitter::new(line, *opts).measure(frame, fiber_row)
}
