//! Pixel window extraction and peak location.
//!
//! Windows are never clipped at the detector edge: a truncated line profile
//! biases the fitted center, so an out-of-bounds request is a `RangeError`.

use std::ops::Range;

use crate::domain::{Frame, SpectralWindow};
use crate::error::RangeError;

/// Column range `[floor(center) - half_width, floor(center) + half_width)`.
fn window_columns(cols: usize, center_guess: f64, half_width: usize) -> Result<Range<usize>, RangeError> {
    if half_width == 0 {
        return Err(RangeError::EmptyWindow);
    }
    if !center_guess.is_finite() {
        return Err(RangeError::NonFiniteCenter(center_guess));
    }

    let hw = half_width as i64;
    let start = center_guess.floor() as i64 - hw;
    let end = start + 2 * hw;
    let outside = start < 0
        || end > cols as i64
        || center_guess - (half_width as f64) < 0.0
        || center_guess + (half_width as f64) > (cols as f64);
    if outside {
        return Err(RangeError::Columns { start, end, cols });
    }

    Ok(start as usize..end as usize)
}

/// Extract `2 * half_width` samples of one fiber row around `center_guess`.
pub fn extract_window(
    frame: &Frame,
    fiber_row: usize,
    center_guess: f64,
    half_width: usize,
) -> Result<SpectralWindow, RangeError> {
    let cols = window_columns(frame.cols(), center_guess, half_width)?;
    let row = frame.row(fiber_row).ok_or(RangeError::Rows {
        start: fiber_row,
        end: fiber_row + 1,
        rows: frame.rows(),
    })?;

    Ok(SpectralWindow::new(cols.start, row[cols].to_vec()))
}

/// Like [`extract_window`], but each sample is the mean over a band of rows.
///
/// Used on raw frames where no single extracted fiber exists.
pub fn extract_band_window(
    frame: &Frame,
    rows: Range<usize>,
    center_guess: f64,
    half_width: usize,
) -> Result<SpectralWindow, RangeError> {
    let cols = window_columns(frame.cols(), center_guess, half_width)?;
    if rows.is_empty() || rows.end > frame.rows() {
        return Err(RangeError::Rows {
            start: rows.start,
            end: rows.end,
            rows: frame.rows(),
        });
    }

    let n_rows = rows.len() as f64;
    let mut samples = vec![0.0; cols.len()];
    for r in rows {
        if let Some(row) = frame.row(r) {
            for (acc, v) in samples.iter_mut().zip(&row[cols.clone()]) {
                *acc += v;
            }
        }
    }
    for v in &mut samples {
        *v /= n_rows;
    }

    Ok(SpectralWindow::new(cols.start, samples))
}

/// Pixel coordinate of the brightest sample.
///
/// Ties resolve to the lowest pixel; non-finite samples are ignored. The line
/// can move several pixels between exposures, so the fit is seeded from this
/// empirical maximum rather than from `expected_center`.
pub fn locate_peak(window: &SpectralWindow, expected_center: f64) -> usize {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in window.samples.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, bv)) if v <= bv => {}
            _ => best = Some((i, v)),
        }
    }

    let peak = window.start + best.map(|(i, _)| i).unwrap_or(0);
    log::trace!("peak at pixel {peak} (expected {expected_center:.3})");
    peak
}
