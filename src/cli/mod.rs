//! Command-line parsing for the ThAr line-stability monitor.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::Chip;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "thar", version, about = "APOGEE ThAr arc-line drift monitor")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the ThAr line in every arc exposure over an MJD range and print the drift table.
    Drift(DriftArgs),
    /// List a night's exposures with their ThAr offset.
    List(ListArgs),
    /// Fit one fiber of one exposure and print (optionally plot) the profile.
    Profile(ProfileArgs),
    /// Plot center offset vs MJD from a drift CSV export.
    Trend(TrendArgs),
    /// Write a synthetic night of exposures.
    Simulate(SimulateArgs),
}

/// Where exposures and reference profiles come from.
#[derive(Debug, Parser, Clone)]
pub struct SourceArgs {
    /// Root of the `<mjd>/ap1D-<chip>-<exposure>.json` tree (default: `THAR_DATA_ROOT`).
    #[arg(long, value_name = "DIR")]
    pub data_root: Option<PathBuf>,

    /// Reference profile JSON (default: `THAR_REFERENCES`, else built-in references).
    #[arg(long, value_name = "JSON")]
    pub references: Option<PathBuf>,

    /// Fit window half-width in pixels (overrides the reference file).
    #[arg(long)]
    pub half_width: Option<usize>,
}

#[derive(Debug, Parser, Clone)]
pub struct DriftArgs {
    /// First MJD of the range (default: current MJD).
    #[arg(short = 's', long = "start", visible_alias = "m1", value_name = "MJD")]
    pub mjd_start: Option<u32>,

    /// Last MJD of the range (default: first MJD).
    #[arg(short = 'e', long = "end", visible_alias = "m2", value_name = "MJD")]
    pub mjd_end: Option<u32>,

    /// Chips to measure.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = Chip::ALL)]
    pub chip: Vec<Chip>,

    /// Fiber row to fit.
    #[arg(long, default_value_t = 150)]
    pub fiber: usize,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Export per-measurement results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct ListArgs {
    /// Night to list (default: current MJD).
    #[arg(short = 'm', long, value_name = "MJD")]
    pub mjd: Option<u32>,

    /// Chip used for the ThAr offset column.
    #[arg(long, value_enum, default_value_t = Chip::A)]
    pub chip: Chip,

    /// Fiber row used for the ThAr offset column.
    #[arg(long, default_value_t = 150)]
    pub fiber: usize,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct ProfileArgs {
    /// Exposure number, e.g. 09690003.
    #[arg(short = 'n', long = "exposure", value_name = "EXP")]
    pub exposure: String,

    #[arg(long, value_enum, default_value_t = Chip::A)]
    pub chip: Chip,

    /// Fiber row to fit (< 300).
    #[arg(long, default_value_t = 150)]
    pub fiber: usize,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Render an ASCII plot of data, fit and reference.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct TrendArgs {
    /// CSV file produced by `thar drift --export`.
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    /// Only plot this chip.
    #[arg(long, value_enum)]
    pub chip: Option<Chip>,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Night to generate.
    #[arg(short = 'm', long, value_name = "MJD")]
    pub mjd: u32,

    /// Number of ThAr arc exposures (dithers alternate A, B).
    #[arg(long, default_value_t = 6)]
    pub count: usize,

    /// Fiber rows per frame.
    #[arg(long, default_value_t = 160)]
    pub rows: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Read noise sigma (counts).
    #[arg(long, default_value_t = 20.0)]
    pub noise: f64,

    /// Relative sigma of the lamp throughput jitter.
    #[arg(long, default_value_t = 0.02)]
    pub jitter: f64,

    /// Sigma of the per-exposure line drift (pixels).
    #[arg(long, default_value_t = 0.02)]
    pub drift: f64,

    /// Output root (default: `THAR_DATA_ROOT`).
    #[arg(long, value_name = "DIR")]
    pub data_root: Option<PathBuf>,

    /// Reference profile JSON the synthetic lines are drawn from.
    #[arg(long, value_name = "JSON")]
    pub references: Option<PathBuf>,
}
