//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - resolves the data root and reference profiles
//! - runs the requested workflow (`pipeline`)
//! - prints reports/plots and writes optional exports

use clap::Parser;

use crate::cli::{Command, DriftArgs, ListArgs, ProfileArgs, SimulateArgs, SourceArgs, TrendArgs};
use crate::data::SimConfig;
use crate::domain::{DriftConfig, ReferenceSet, current_mjd};
use crate::error::AppError;
use crate::io::{resolve_data_root, resolve_references, validate_references};
use crate::math::SolverOptions;

pub mod pipeline;

/// Entry point for the `thar` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse_from(std::env::args());
    init_logging(cli.verbose);

    match cli.command {
        Command::Drift(args) => handle_drift(args),
        Command::List(args) => handle_list(args),
        Command::Profile(args) => handle_profile(args),
        Command::Trend(args) => handle_trend(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .try_init()
        .unwrap_or(());
}

fn handle_drift(args: DriftArgs) -> Result<(), AppError> {
    let config = drift_config_from_args(&args)?;
    let run = pipeline::run_drift(&config)?;

    if run.scanned == 0 {
        return Err(AppError::new(
            3,
            format!(
                "No exposures found for MJD {}..{} under '{}'.",
                config.mjd_start,
                config.mjd_end,
                config.data_root.display()
            ),
        ));
    }

    println!(
        "{}",
        crate::report::format_drift_report(&run, &config.references, &config.chips)
    );
    if run.measurements.is_empty() {
        println!("No ThAr arc exposures among {} files.", run.scanned);
    }

    if let Some(path) = &config.export {
        crate::io::write_drift_csv(path, &run.measurements)?;
    }
    Ok(())
}

fn handle_list(args: ListArgs) -> Result<(), AppError> {
    let data_root = resolve_data_root(args.source.data_root.as_deref());
    let references = references_from_args(&args.source)?;
    let mjd = args.mjd.unwrap_or_else(current_mjd);

    let entries = pipeline::run_list(
        &data_root,
        mjd,
        args.chip,
        args.fiber,
        &references,
        &SolverOptions::default(),
    )?;
    if entries.is_empty() {
        return Err(AppError::new(
            3,
            format!("No exposures found for MJD {mjd} under '{}'.", data_root.display()),
        ));
    }

    print!("{}", crate::report::format_night_listing(mjd, args.chip, &entries));
    Ok(())
}

fn handle_profile(args: ProfileArgs) -> Result<(), AppError> {
    let data_root = resolve_data_root(args.source.data_root.as_deref());
    let references = references_from_args(&args.source)?;

    let run = pipeline::run_profile(
        &data_root,
        args.chip,
        &args.exposure,
        args.fiber,
        &references,
        &SolverOptions::default(),
    )?;

    print!("{}", crate::report::format_profile(&run));
    if args.plot {
        println!();
        print!("{}", crate::plot::render_profile_plot(&run, args.width, args.height));
    }
    Ok(())
}

fn handle_trend(args: TrendArgs) -> Result<(), AppError> {
    let mut rows = crate::io::read_drift_csv(&args.input)?;
    if let Some(chip) = args.chip {
        rows.retain(|r| r.chip == chip);
    }
    if rows.is_empty() {
        return Err(AppError::new(3, format!("No rows to plot in '{}'.", args.input.display())));
    }

    print!("{}", crate::plot::render_trend_plot(&rows, args.width, args.height));
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let data_root = resolve_data_root(args.data_root.as_deref());
    let references = resolve_references(args.references.as_deref())?;
    let config = SimConfig {
        mjd: args.mjd,
        count: args.count,
        rows: args.rows,
        seed: args.seed,
        noise: args.noise,
        throughput_jitter: args.jitter,
        drift_sigma: args.drift,
        references,
    };

    let written = pipeline::run_simulate(&data_root, &config)?;
    println!(
        "Wrote {} exposure files to '{}'.",
        written.len(),
        crate::io::night_dir(&data_root, args.mjd).display()
    );
    Ok(())
}

fn references_from_args(source: &SourceArgs) -> Result<ReferenceSet, AppError> {
    let mut references = resolve_references(source.references.as_deref())?;
    if let Some(hw) = source.half_width {
        references = references.with_half_width(hw);
        validate_references(&references)?;
    }
    Ok(references)
}

pub fn drift_config_from_args(args: &DriftArgs) -> Result<DriftConfig, AppError> {
    let mjd_start = args.mjd_start.unwrap_or_else(current_mjd);
    let mut chips = args.chip.clone();
    chips.sort();
    chips.dedup();

    Ok(DriftConfig {
        data_root: resolve_data_root(args.source.data_root.as_deref()),
        mjd_start,
        mjd_end: args.mjd_end.unwrap_or(mjd_start),
        chips,
        fiber: args.fiber,
        references: references_from_args(&args.source)?,
        solver: SolverOptions::default(),
        export: args.export.clone(),
    })
}
