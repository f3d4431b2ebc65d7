//! Exposure discovery and loading.
//!
//! Exposures are stored one chip per file as
//! `<data_root>/<mjd>/ap1D-<chip>-<exposure>.json` (see `domain::ExposureFile`).
//! Discovery is a plain directory listing; the file name carries the chip and
//! exposure number so a night can be indexed without parsing pixel data.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::domain::{Chip, Exposure, ExposureFile, Frame};
use crate::error::AppError;

const PREFIX: &str = "ap1D-";
const SUFFIX: &str = ".json";

/// File name of one chip of one exposure.
pub fn exposure_file_name(chip: Chip, exposure: &str) -> String {
    format!("{PREFIX}{}-{exposure}{SUFFIX}", chip.label())
}

pub fn night_dir(data_root: &Path, mjd: u32) -> PathBuf {
    data_root.join(mjd.to_string())
}

/// Parse `ap1D-<chip>-<exposure>.json` into `(chip, exposure)`.
pub fn parse_file_name(name: &str) -> Option<(Chip, String)> {
    let stem = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    let (chip, exposure) = stem.split_once('-')?;
    let chip = match chip {
        "a" => Chip::A,
        "b" => Chip::B,
        "c" => Chip::C,
        _ => return None,
    };
    if exposure.is_empty() || !exposure.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((chip, exposure.to_string()))
}

/// An exposure file found on disk (not yet loaded).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExposureEntry {
    pub mjd: u32,
    pub exposure: String,
    pub chip: Chip,
    pub path: PathBuf,
}

/// List the exposure files of one night, sorted by exposure then chip.
///
/// A missing night directory is not an error: nights without data are common.
pub fn discover_night(data_root: &Path, mjd: u32) -> Result<Vec<ExposureEntry>, AppError> {
    let dir = night_dir(data_root, mjd);
    if !dir.is_dir() {
        log::info!("no data directory for mjd {mjd}: {}", dir.display());
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(&dir)
        .map_err(|e| AppError::new(2, format!("Failed to list '{}': {e}", dir.display())))?;

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::new(2, format!("Failed to list '{}': {e}", dir.display())))?;
        let name = entry.file_name();
        let Some((chip, exposure)) = name.to_str().and_then(parse_file_name) else {
            continue;
        };
        out.push(ExposureEntry {
            mjd,
            exposure,
            chip,
            path: entry.path(),
        });
    }

    out.sort_by(|a, b| a.exposure.cmp(&b.exposure).then(a.chip.cmp(&b.chip)));
    Ok(out)
}

/// Find one chip of an exposure in any night under `data_root`.
pub fn find_exposure(data_root: &Path, chip: Chip, exposure: &str) -> Result<PathBuf, AppError> {
    let name = exposure_file_name(chip, exposure);
    let nights = std::fs::read_dir(data_root)
        .map_err(|e| AppError::new(2, format!("Failed to list '{}': {e}", data_root.display())))?;

    let mut candidates: Vec<PathBuf> = nights
        .filter_map(|n| n.ok())
        .map(|n| n.path().join(&name))
        .filter(|p| p.is_file())
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        AppError::new(
            3,
            format!("No file {name} found under '{}'.", data_root.display()),
        )
    })
}

/// Load and validate one exposure file.
pub fn read_exposure(path: &Path) -> Result<Exposure, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open exposure '{}': {e}", path.display())))?;
    let raw: ExposureFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid exposure JSON '{}': {e}", path.display())))?;

    let frame = Frame::from_rows(raw.pixels)
        .map_err(|e| AppError::new(2, format!("Invalid pixel array in '{}': {e}", path.display())))?;

    Ok(Exposure {
        path: path.to_path_buf(),
        exposure: raw.exposure,
        mjd: raw.mjd,
        chip: raw.chip,
        header: raw.header,
        frame,
    })
}

/// Write one exposure file (used by the simulator).
pub fn write_exposure(path: &Path, exposure: &Exposure) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", parent.display())))?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create exposure '{}': {e}", path.display())))?;

    let raw = ExposureFile {
        exposure: exposure.exposure.clone(),
        mjd: exposure.mjd,
        chip: exposure.chip,
        header: exposure.header.clone(),
        pixels: exposure.frame.to_rows(),
    };
    serde_json::to_writer(BufWriter::new(file), &raw)
        .map_err(|e| AppError::new(2, format!("Failed to write exposure JSON: {e}")))?;

    Ok(())
}
