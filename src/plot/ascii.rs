//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - profile view: window samples `o`, fitted Gaussian `-`, reference `.`
//! - trend view: center offset per exposure, marked by dither (`A`, `B`, `?`)

use crate::app::pipeline::ProfileRun;
use crate::domain::{Convergence, GaussianProfile};
use crate::io::DriftRow;
use crate::models::evaluate;

/// How a layer is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// Connected polyline; only fills blank cells.
    Line(char),
    /// Individual points; overwrite anything below.
    Points(char),
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub points: Vec<(f64, f64)>,
    pub mark: Mark,
}

/// Render the window samples with the fitted and reference profiles.
pub fn render_profile_plot(run: &ProfileRun, width: usize, height: usize) -> String {
    let window = &run.window;
    let x_min = window.start as f64;
    let x_max = window.end().saturating_sub(1) as f64;
    let n = width.max(2);

    let data: Vec<(f64, f64)> = window
        .pixels()
        .into_iter()
        .zip(window.samples.iter().copied())
        .filter(|(_, y)| y.is_finite())
        .collect();

    let layers = [
        Layer {
            points: sample_profile(&run.result.profile, x_min, x_max, n),
            mark: Mark::Line('-'),
        },
        Layer {
            points: sample_profile(&run.line.profile, x_min, x_max, n),
            mark: Mark::Line('.'),
        },
        Layer {
            points: data,
            mark: Mark::Points('o'),
        },
    ];

    render_layers("pixel", "counts", &layers, (x_min, x_max), width, height)
}

/// Render center offset vs MJD for the converged rows of a drift export.
pub fn render_trend_plot(rows: &[DriftRow], width: usize, height: usize) -> String {
    let mut layers = Vec::new();
    for (glyph, dither) in [('A', "A"), ('B', "B"), ('?', "?")] {
        let points: Vec<(f64, f64)> = rows
            .iter()
            .filter(|r| r.status == Convergence::Converged && r.dither.label() == dither)
            .map(|r| (r.mjd as f64, r.delta_center))
            .collect();
        if !points.is_empty() {
            layers.push(Layer {
                points,
                mark: Mark::Points(glyph),
            });
        }
    }

    let x_range = x_range(&layers).unwrap_or_else(|| {
        let x = rows.first().map(|r| r.mjd as f64).unwrap_or(0.0);
        (x - 0.5, x + 0.5)
    });
    render_layers("mjd", "X-Xo", &layers, x_range, width, height)
}

/// Draw `layers` in order into one grid.
pub fn render_layers(
    x_label: &str,
    y_label: &str,
    layers: &[Layer],
    (x_min, x_max): (f64, f64),
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (y_min, y_max) = y_range(layers).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Lines first (so points can overlay).
    for layer in layers {
        if let Mark::Line(ch) = layer.mark {
            draw_curve(&mut grid, &layer.points, (x_min, x_max), (y_min, y_max), ch);
        }
    }
    for layer in layers {
        if let Mark::Points(ch) = layer.mark {
            for &(x, y) in &layer.points {
                let col = map_x(x, x_min, x_max, width);
                let row = map_y(y, y_min, y_max, height);
                grid[row][col] = ch;
            }
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {x_label}=[{x_min:.3}, {x_max:.3}] | {y_label}=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn sample_profile(profile: &GaussianProfile, x_min: f64, x_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let x = x_min + u * (x_max - x_min);
            (x, evaluate(profile, x))
        })
        .collect()
}

fn x_range(layers: &[Layer]) -> Option<(f64, f64)> {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    for &(x, _) in layers.iter().flat_map(|l| l.points.iter()) {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
    }
    if min_x.is_finite() && max_x.is_finite() && max_x > min_x {
        Some((min_x, max_x))
    } else {
        None
    }
}

fn y_range(layers: &[Layer]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in layers.iter().flat_map(|l| l.points.iter()) {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], (x_min, x_max): (f64, f64), (y_min, y_max): (f64, f64), ch: char) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        if !y.is_finite() {
            prev = None;
            continue;
        }
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        if let Some((c0, r0)) = prev {
            draw_line(grid, c0, r0, col, row, ch);
        } else if grid[row][col] == ' ' {
            grid[row][col] = ch;
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
