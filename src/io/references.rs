//! Reference profile loading and run configuration from the environment.
//!
//! The reference set is read once per run and handed to the fitter; nothing
//! downstream mutates it. Validation lives here so the fitter can assume a
//! well-formed reference.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::domain::ReferenceSet;
use crate::error::AppError;

/// Default location of the reduced exposures.
pub const DEFAULT_DATA_ROOT: &str = "/data/apogee/quickred";

const ENV_DATA_ROOT: &str = "THAR_DATA_ROOT";
const ENV_REFERENCES: &str = "THAR_REFERENCES";

/// Data root from the CLI flag, else `THAR_DATA_ROOT` (`.env` honored), else the default.
pub fn resolve_data_root(flag: Option<&Path>) -> PathBuf {
    if let Some(p) = flag {
        return p.to_path_buf();
    }
    dotenvy::dotenv().ok();
    std::env::var(ENV_DATA_ROOT)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_ROOT))
}

/// Reference set from the CLI flag, else `THAR_REFERENCES`, else the built-in set.
pub fn resolve_references(flag: Option<&Path>) -> Result<ReferenceSet, AppError> {
    let path = match flag {
        Some(p) => Some(p.to_path_buf()),
        None => {
            dotenvy::dotenv().ok();
            std::env::var(ENV_REFERENCES).ok().map(PathBuf::from)
        }
    };

    match path {
        Some(p) => {
            log::info!("loading reference profiles from {}", p.display());
            read_references(&p)
        }
        None => Ok(ReferenceSet::builtin()),
    }
}

/// Read and validate a reference JSON file.
pub fn read_references(path: &Path) -> Result<ReferenceSet, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open references '{}': {e}", path.display())))?;
    let set: ReferenceSet = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid references JSON '{}': {e}", path.display())))?;
    validate_references(&set)?;
    Ok(set)
}

pub fn validate_references(set: &ReferenceSet) -> Result<(), AppError> {
    if set.lines.is_empty() {
        return Err(AppError::new(2, "Reference set has no lines."));
    }
    for (i, line) in set.lines.iter().enumerate() {
        if set.lines[..i].iter().any(|l| l.chip == line.chip) {
            return Err(AppError::new(2, format!("Duplicate reference for chip {}.", line.chip)));
        }
        let p = &line.profile;
        if !(p.amplitude.is_finite() && p.amplitude > 0.0) {
            return Err(AppError::new(
                2,
                format!("Reference amplitude for chip {} must be > 0 (got {}).", line.chip, p.amplitude),
            ));
        }
        if !(p.center.is_finite() && p.center >= 0.0) {
            return Err(AppError::new(
                2,
                format!("Reference center for chip {} must be a pixel coordinate (got {}).", line.chip, p.center),
            ));
        }
        if !(p.width.is_finite() && p.width > 0.0) {
            return Err(AppError::new(
                2,
                format!("Reference width for chip {} must be > 0 (got {}).", line.chip, p.width),
            ));
        }
        if line.half_width == 0 {
            return Err(AppError::new(2, format!("Half-width for chip {} must be > 0.", line.chip)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chip, GaussianProfile, LineReference};

    #[test]
    fn builtin_references_are_valid() {
        let set = ReferenceSet::builtin();
        validate_references(&set).unwrap();
        assert_eq!(set.get(Chip::C).unwrap().profile.center, 1776.62);
    }

    #[test]
    fn reads_reference_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refs.json");
        std::fs::write(
            &path,
            r#"{"lines":[{"chip":"a","profile":{"amplitude":44941.0,"center":939.646,"width":1.287},"half_width":20}]}"#,
        )
        .unwrap();

        let set = resolve_references(Some(&path)).unwrap();
        assert_eq!(set.master, None);
        let a = set.get(Chip::A).unwrap();
        assert_eq!(a.half_width, 20);
        assert_eq!(a.profile, GaussianProfile::new(44941.0, 939.646, 1.287));
        assert!(set.get(Chip::B).is_none());
    }

    #[test]
    fn rejects_malformed_references() {
        let good = LineReference {
            chip: Chip::A,
            profile: GaussianProfile::new(1.0, 10.0, 1.0),
            half_width: 10,
        };
        let cases = [
            LineReference { profile: GaussianProfile::new(0.0, 10.0, 1.0), ..good },
            LineReference { profile: GaussianProfile::new(1.0, 10.0, -1.0), ..good },
            LineReference { profile: GaussianProfile::new(1.0, f64::NAN, 1.0), ..good },
            LineReference { half_width: 0, ..good },
        ];
        for line in cases {
            let set = ReferenceSet { master: None, lines: vec![line] };
            assert_eq!(validate_references(&set).unwrap_err().exit_code(), 2);
        }

        let dup = ReferenceSet { master: None, lines: vec![good, good] };
        assert!(validate_references(&dup).is_err());
        assert!(validate_references(&ReferenceSet { master: None, lines: vec![] }).is_err());
    }

    #[test]
    fn explicit_data_root_wins() {
        assert_eq!(resolve_data_root(Some(Path::new("/tmp/x"))), PathBuf::from("/tmp/x"));
    }
}
