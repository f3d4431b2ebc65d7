//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays free of presentation concerns
//! - output changes are localized (the golden tests below pin the layouts)

use chrono::NaiveDate;

use crate::app::pipeline::{DriftRun, NightEntry, ProfileRun, Skipped};
use crate::domain::{Chip, DITHER_A_PIX, FitResult, LineMeasurement, ReferenceSet, mjd_to_date};
use crate::report::{ChipSummary, OffsetStats, summarize};

/// Format a full drift report: per chip a master line, the measurement table
/// and a summary; then the skipped files.
pub fn format_drift_report(run: &DriftRun, references: &ReferenceSet, chips: &[Chip]) -> String {
    let mut out = String::new();

    for &chip in chips {
        let rows: Vec<&LineMeasurement> = run.measurements.iter().filter(|m| m.chip == chip).collect();
        if rows.is_empty() {
            continue;
        }
        if let Some(line) = references.get(chip) {
            out.push_str(&format_master_line(chip, references.master.as_deref(), rows[0].fiber, line));
            out.push('\n');
        }
        out.push_str(&format_drift_table(&rows));
        out.push('\n');
    }

    let summaries = summarize(&run.measurements, chips);
    if !summaries.is_empty() {
        out.push_str("Summary:\n");
        for s in &summaries {
            out.push_str(&format_chip_summary(s));
            out.push('\n');
        }
    }

    if !run.skipped.is_empty() {
        out.push_str(&format!("\nSkipped ({}):\n", run.skipped.len()));
        out.push_str(&format_skipped(&run.skipped));
    }

    out
}

/// Reference ("master") line heading a chip's table.
pub fn format_master_line(
    chip: Chip,
    master: Option<&str>,
    fiber: usize,
    line: &crate::domain::LineReference,
) -> String {
    let p = &line.profile;
    format!(
        "chip {chip} | master {} | fiber {fiber} | I={:.0} X={:.3} W={:.3} | half-width {}",
        master.unwrap_or("-"),
        p.amplitude,
        p.center,
        p.width,
        line.half_width,
    )
}

/// Fixed-width measurement table, one row per exposure.
pub fn format_drift_table(rows: &[&LineMeasurement]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>3} {:<8} {:<3} {:>6} {:>6} {:>8} {:>7} {:>9} {:>7} {:>6} {:>7} {:>5} {}",
            "#", "file", "A/B", "D", "D-Do", "I", "I/Io,%", "X", "X-Xo", "W", "W-Wo", "mjd", "status"
        )
        .trim_end(),
    );
    out.push('\n');

    for (i, m) in rows.iter().enumerate() {
        let r = &m.result;
        let (d, dd) = match m.dithpix {
            Some(v) => (format!("{v:.3}"), format!("{:+.3}", v - DITHER_A_PIX)),
            None => ("-".to_string(), "-".to_string()),
        };
        out.push_str(
            format!(
                "{:>3} {:<8} {:<3} {:>6} {:>6} {:>8.0} {:>7.1} {:>9.3} {:>+7.3} {:>6.3} {:>+7.3} {:>5} {}",
                i + 1,
                truncate(&m.exposure, 8),
                m.dither.label(),
                d,
                dd,
                r.profile.amplitude,
                r.comparison.amplitude_ratio * 100.0,
                r.profile.center,
                r.comparison.delta_center,
                r.profile.width,
                r.comparison.delta_width,
                m.mjd,
                status(r),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn status(r: &FitResult) -> String {
    match r.failure {
        None => "ok".to_string(),
        Some(reason) => format!("FAIL {}", reason.describe()),
    }
}

pub fn format_chip_summary(s: &ChipSummary) -> String {
    let mut out = format!("chip {}: n={} converged={}", s.chip, s.measured, s.converged);
    out.push_str(&format!(" | A: {}", fmt_stats(s.dither_a)));
    out.push_str(&format!(" | B: {}", fmt_stats(s.dither_b)));
    if let Some(sep) = s.dither_separation() {
        out.push_str(&format!(" | B-A={sep:+.3}"));
    }
    out
}

fn fmt_stats(stats: Option<OffsetStats>) -> String {
    match stats {
        Some(s) => format!("n={} X-Xo={:+.3}±{:.3}", s.n, s.mean, s.std),
        None => "n=0".to_string(),
    }
}

pub fn format_skipped(skipped: &[Skipped]) -> String {
    let mut out = String::new();
    for s in skipped {
        out.push_str(&format!("  {} {} {}: {}\n", s.mjd, s.exposure, s.chip, s.reason));
    }
    out
}

/// Night listing: one line per exposure.
pub fn format_night_listing(mjd: u32, chip: Chip, entries: &[NightEntry]) -> String {
    let date = mjd_to_date(mjd)
        .map(|d: NaiveDate| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut out = format!("Night {mjd} ({date}): {} exposures, ThAr offset on chip {chip}\n", entries.len());
    out.push_str(
        format!(
            "{:<5} {:<8} {:<14} {:>3} {:<10} {:<9} {:>7} {}",
            "UT", "file", "type", "nfr", "dither", "cart-plt", "X-Xo", "comment"
        )
        .trim_end(),
    );
    out.push('\n');
    for e in entries {
        out.push_str(&format_night_line(e));
        out.push('\n');
    }
    out
}

pub fn format_night_line(e: &NightEntry) -> String {
    if e.read_error.is_some() {
        return format!("{:<5} {:<8} cannot read file", "--:--", truncate(&e.exposure, 8));
    }
    let h = &e.header;
    let nframes = h.nframes.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
    let cart_plate = match (h.cart_id, h.plate_id) {
        (Some(c), Some(p)) => format!("{c}-{p}"),
        _ => "-".to_string(),
    };
    let offset = e.thar_offset.map(|v| format!("{v:+.3}")).unwrap_or_else(|| "-".to_string());
    let comment: String = h.comment.as_deref().unwrap_or("").chars().take(8).collect();
    let dither = match h.dithpix {
        Some(pix) => format!("{} ({pix:>6.2})", h.dither().label()),
        None => h.dither().label().to_string(),
    };

    format!(
        "{:<5} {:<8} {:<14} {:>3} {:<10} {:<9} {:>7} {}",
        h.ut_time().unwrap_or("--:--"),
        truncate(&e.exposure, 8),
        truncate(&h.image_label(), 14),
        nframes,
        dither,
        cart_plate,
        offset,
        comment,
    )
    .trim_end()
    .to_string()
}

/// Fit / Ref / Dif block for one inspected profile.
pub fn format_profile(run: &ProfileRun) -> String {
    let r = &run.result;
    let p = &r.profile;
    let q = &run.line.profile;
    let c = &r.comparison;

    let mut out = String::new();
    out.push_str(&format!(
        "Exposure {} | mjd {} | chip {} | fiber {} | {} | dither {}\n",
        run.exposure,
        run.mjd,
        run.chip,
        run.fiber,
        run.header.image_label(),
        run.header.dither().label(),
    ));
    out.push_str(&format!(
        "Window: [{}, {}) | peak at {}\n",
        run.window.start,
        run.window.end(),
        run.peak
    ));
    out.push_str(&format!("Fit: I={:>9.1} X={:>9.3} W={:>6.3}\n", p.amplitude, p.center, p.width));
    out.push_str(&format!("Ref: I={:>9.1} X={:>9.3} W={:>6.3}\n", q.amplitude, q.center, q.width));
    out.push_str(&format!(
        "Dif: I/Io={:.4} X-Xo={:+.3} W-Wo={:+.3}\n",
        c.amplitude_ratio, c.delta_center, c.delta_width
    ));

    let termination = r.termination.map(|t| t.describe()).unwrap_or("solver not run");
    match r.failure {
        None => out.push_str(&format!(
            "Status: converged ({termination}, {} evaluations, rms {:.2})\n",
            r.evaluations, r.rms_residual
        )),
        Some(reason) => out.push_str(&format!(
            "Status: FAILED, {} ({termination}, {} evaluations, rms {:.2})\n",
            reason.describe(),
            r.evaluations,
            r.rms_residual
        )),
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dither, ExposureHeader, FailureReason, GaussianProfile};
    use crate::report::testutil::measurement;

    #[test]
    fn drift_table_golden() {
        let ms = [
            measurement("09690003", Chip::A, Dither::A, Some(12.994), GaussianProfile::new(53000.0, 939.9, 1.3012), None),
            measurement("09690004", Chip::A, Dither::B, Some(13.499), GaussianProfile::new(54000.0, 940.1, 1.3012), None),
            measurement(
                "09690005",
                Chip::A,
                Dither::Unknown,
                None,
                GaussianProfile::new(100.0, 930.5, 9.0),
                Some(FailureReason::NotSignificant),
            ),
        ];
        let rows: Vec<&LineMeasurement> = ms.iter().collect();

        let expected = concat!(
            "  # file     A/B      D   D-Do        I  I/Io,%         X    X-Xo      W    W-Wo   mjd status\n",
            "  1 09690003 A   12.994 +0.000    53000    98.4   939.900  +0.254  1.301  +0.027 56531 ok\n",
            "  2 09690004 B   13.499 +0.505    54000   100.3   940.100  +0.454  1.301  +0.027 56531 ok\n",
            "  3 09690005 ?        -      -      100     0.2   930.500  -9.146  9.000  +7.726 56531 FAIL amplitude below noise\n",
        );
        assert_eq!(format_drift_table(&rows), expected);
    }

    #[test]
    fn drift_report_sections() {
        let run = DriftRun {
            measurements: vec![measurement(
                "09690003",
                Chip::A,
                Dither::A,
                Some(12.994),
                GaussianProfile::new(53000.0, 939.9, 1.3012),
                None,
            )],
            skipped: vec![Skipped {
                mjd: 56531,
                exposure: "09690007".to_string(),
                chip: Chip::B,
                reason: "bad file".to_string(),
            }],
            scanned: 2,
        };
        let txt = format_drift_report(&run, &ReferenceSet::builtin(), &Chip::ALL);

        assert!(txt.starts_with(
            "chip a | master 56531/09690003 | fiber 150 | I=53864 X=939.646 W=1.274 | half-width 15\n"
        ));
        assert!(txt.contains("Summary:\nchip a: n=1 converged=1 | A: n=1 X-Xo=+0.254±0.000 | B: n=0\n"));
        assert!(txt.ends_with("Skipped (1):\n  56531 09690007 b: bad file\n"));
        assert!(!txt.contains("chip b |"));
    }

    #[test]
    fn night_lines_golden() {
        let thar = NightEntry {
            exposure: "09690003".to_string(),
            header: ExposureHeader {
                image_type: Some("ArcLamp".to_string()),
                lamp_thar: Some(1),
                lamp_une: Some(0),
                nframes: Some(12),
                dithpix: Some(12.994),
                date_obs: Some("2013-08-26T21:41:35".to_string()),
                cart_id: Some(1),
                plate_id: Some(6000),
                comment: Some("ThAr calibration".to_string()),
                ..ExposureHeader::default()
            },
            thar_offset: Some(-0.244),
            read_error: None,
        };
        let flat = NightEntry {
            exposure: "09690005".to_string(),
            header: ExposureHeader {
                image_type: Some("QuartzFlat".to_string()),
                ..ExposureHeader::default()
            },
            thar_offset: None,
            read_error: None,
        };

        assert_eq!(
            format_night_line(&thar),
            "21:41 09690003 ArcLamp-Thar    12 A ( 12.99) 1-6000     -0.244 ThAr cal"
        );
        assert_eq!(format_night_line(&flat), "--:-- 09690005 QuartzFlat       - ?          -               -");

        let listing = format_night_listing(56531, Chip::A, &[thar, flat]);
        assert!(listing.starts_with(concat!(
            "Night 56531 (2013-08-27): 2 exposures, ThAr offset on chip a\n",
            "UT    file     type           nfr dither     cart-plt     X-Xo comment\n",
        )));
        assert_eq!(listing.lines().count(), 4);
    }

    #[test]
    fn night_listing_marks_unreadable_files_and_dateless_nights() {
        let broken = NightEntry {
            exposure: "09690099".to_string(),
            header: ExposureHeader::default(),
            thar_offset: None,
            read_error: Some("Invalid exposure JSON".to_string()),
        };
        assert_eq!(format_night_line(&broken), "--:-- 09690099 cannot read file");

        let listing = format_night_listing(u32::MAX, Chip::B, &[broken]);
        assert!(listing.starts_with("Night 4294967295 (-): 1 exposures, ThAr offset on chip b\n"));
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("ArcLamp-Thar", 14), "ArcLamp-Thar");
        assert_eq!(truncate("abcdefgh", 4), "abc.");
    }
}
