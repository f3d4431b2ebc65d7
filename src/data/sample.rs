//! Synthetic night generation.
//!
//! Produces a night of exposures shaped like reduced APOGEE frames: every
//! fiber row carries the chip's ThAr line at its reference position, shifted
//! by the dither offset, with throughput jitter and Gaussian read noise. One
//! UNe arc and one quartz flat are added so qualification logic has something
//! to skip.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use chrono::Duration;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{
    Chip, DITHER_A_PIX, DITHER_B_PIX, Exposure, ExposureHeader, Frame, GaussianProfile, ReferenceSet, mjd_to_date,
};
use crate::error::AppError;
use crate::models::evaluate;

/// Line shift between dither positions A and B (pixels).
pub const DITHER_SHIFT: f64 = 0.488;

/// First MJD of the exposure numbering scheme (`<mjd - 55562><seq>`).
const EXPOSURE_MJD_BASE: u32 = 55562;

/// Columns per simulated chip.
pub const SIM_COLS: usize = 2048;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub mjd: u32,
    /// Number of ThAr exposures (dithers alternate A, B, A, ...).
    pub count: usize,
    /// Fiber rows per frame.
    pub rows: usize,
    pub seed: u64,
    /// Read noise sigma (counts).
    pub noise: f64,
    /// Relative sigma of lamp throughput jitter.
    pub throughput_jitter: f64,
    /// Sigma of the random center drift (pixels).
    pub drift_sigma: f64,
    pub references: ReferenceSet,
}

/// Exposure number for the `seq`-th (1-based) exposure of a night.
pub fn exposure_number(mjd: u32, seq: usize) -> String {
    format!("{:04}{:04}", mjd.saturating_sub(EXPOSURE_MJD_BASE), seq)
}

/// Generate all chips of all exposures for one night.
pub fn generate_night(config: &SimConfig) -> Result<Vec<Exposure>, AppError> {
    if config.count == 0 {
        return Err(AppError::new(2, "Exposure count must be > 0."));
    }
    if config.rows == 0 {
        return Err(AppError::new(2, "Row count must be > 0."));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::new(2, "Noise sigma must be >= 0."));
    }

    let mut rng = StdRng::seed_from_u64(sample_seed(config));
    let noise = Normal::new(0.0, config.noise)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let jitter = Normal::new(0.0, config.throughput_jitter.max(0.0))
        .map_err(|e| AppError::new(4, format!("Jitter distribution error: {e}")))?;
    let drift = Normal::new(0.0, config.drift_sigma.max(0.0))
        .map_err(|e| AppError::new(4, format!("Drift distribution error: {e}")))?;

    let start = mjd_to_date(config.mjd)
        .ok_or_else(|| AppError::new(2, format!("MJD {} is out of the calendar range.", config.mjd)))?
        .and_hms_opt(22, 0, 0)
        .ok_or_else(|| AppError::new(4, "Invalid start-of-night time."))?;
    let mut out = Vec::new();
    let mut seq = 1usize;

    for i in 0..config.count {
        let (dithpix, shift) = if i % 2 == 0 {
            (DITHER_A_PIX, -DITHER_SHIFT / 2.0)
        } else {
            (DITHER_B_PIX, DITHER_SHIFT / 2.0)
        };
        let date_obs = start + Duration::minutes(10 * (seq as i64 - 1));
        let header = ExposureHeader {
            image_type: Some("ArcLamp".to_string()),
            lamp_thar: Some(1),
            lamp_une: Some(0),
            nframes: Some(12),
            dithpix: Some(dithpix),
            date_obs: Some(date_obs.format("%Y-%m-%dT%H:%M:%S").to_string()),
            cart_id: Some(1),
            plate_id: Some(6000),
            comment: Some("ThAr cal".to_string()),
            ..ExposureHeader::default()
        };

        let center_drift = drift.sample(&mut rng);
        let throughput = (1.0 + jitter.sample(&mut rng)).max(0.0);

        for line in &config.references.lines {
            let truth = GaussianProfile::new(
                line.profile.amplitude * throughput,
                line.profile.center + shift + center_drift,
                line.profile.width,
            );
            let frame = line_frame(&truth, config.rows, &noise, &mut rng)?;
            out.push(exposure(config.mjd, seq, line.chip, header.clone(), frame));
        }
        seq += 1;
    }

    // Non-ThAr exposures: a UNe arc (no ThAr line) and a quartz flat.
    let une = ExposureHeader {
        image_type: Some("ArcLamp".to_string()),
        lamp_thar: Some(0),
        lamp_une: Some(1),
        nframes: Some(12),
        dithpix: Some(DITHER_A_PIX),
        date_obs: Some((start + Duration::minutes(10 * (seq as i64 - 1))).format("%Y-%m-%dT%H:%M:%S").to_string()),
        comment: Some("UNe cal".to_string()),
        ..ExposureHeader::default()
    };
    let quartz = ExposureHeader {
        image_type: Some("QuartzFlat".to_string()),
        nframes: Some(3),
        dithpix: Some(DITHER_A_PIX),
        date_obs: Some((start + Duration::minutes(10 * seq as i64)).format("%Y-%m-%dT%H:%M:%S").to_string()),
        comment: Some("flat".to_string()),
        ..ExposureHeader::default()
    };
    for header in [une, quartz] {
        for line in &config.references.lines {
            let frame = flat_frame(config.rows, 1000.0, &noise, &mut rng)?;
            out.push(exposure(config.mjd, seq, line.chip, header.clone(), frame));
        }
        seq += 1;
    }

    Ok(out)
}

/// Output path of a generated exposure under `data_root`.
pub fn exposure_path(data_root: &std::path::Path, exposure: &Exposure) -> PathBuf {
    crate::io::night_dir(data_root, exposure.mjd).join(crate::io::exposure_file_name(exposure.chip, &exposure.exposure))
}

fn exposure(mjd: u32, seq: usize, chip: Chip, header: ExposureHeader, frame: Frame) -> Exposure {
    let exposure = exposure_number(mjd, seq);
    Exposure {
        path: PathBuf::new(),
        exposure,
        mjd,
        chip,
        header,
        frame,
    }
}

fn line_frame(truth: &GaussianProfile, rows: usize, noise: &Normal<f64>, rng: &mut StdRng) -> Result<Frame, AppError> {
    let mut data = Vec::with_capacity(rows * SIM_COLS);
    for r in 0..rows {
        // Mild fiber-to-fiber throughput variation.
        let fiber_gain = 0.9 + 0.1 * ((r as f64) * 0.05).cos();
        for x in 0..SIM_COLS {
            let profile = GaussianProfile {
                amplitude: truth.amplitude * fiber_gain,
                ..*truth
            };
            data.push(evaluate(&profile, x as f64) + noise.sample(rng));
        }
    }
    Frame::new(rows, SIM_COLS, data)
}

fn flat_frame(rows: usize, level: f64, noise: &Normal<f64>, rng: &mut StdRng) -> Result<Frame, AppError> {
    let data = (0..rows * SIM_COLS).map(|_| level + noise.sample(rng)).collect();
    Frame::new(rows, SIM_COLS, data)
}

fn sample_seed(config: &SimConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.mjd.hash(&mut hasher);
    config.count.hash(&mut hasher);
    config.rows.hash(&mut hasher);
    config.seed.hash(&mut hasher);
    config.noise.to_bits().hash(&mut hasher);
    hasher.finish()
}
