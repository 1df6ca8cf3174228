//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - reference spectrum: `.`
//! - computed spectrum: `-` line
//! - residual trajectory: `o`, last point `*`

use crate::domain::Quantity;
use crate::report::Trajectory;
use crate::spectrum::Spectrum;

/// One series on the grid.
pub struct Series<'a> {
    pub points: &'a [(f64, f64)],
    pub marker: char,
    /// Connect consecutive points.
    pub line: bool,
}

/// Reference (dots) and computed (line) spectra on a shared frame.
pub fn render_spectrum_comparison(
    reference: &Spectrum,
    computed: &Spectrum,
    quantity: Quantity,
    title: &str,
    width: usize,
    height: usize,
) -> String {
    let unit = reference.waveunit();
    let reference_points = reference.points(quantity);
    let computed_points: Vec<(f64, f64)> = computed
        .points(quantity)
        .into_iter()
        .map(|(w, v)| (computed.waveunit().convert(w, unit), v))
        .collect();

    let header = format!("{title} | {quantity} vs {}", unit.as_str());
    render_series(
        &header,
        &[
            Series { points: &computed_points, marker: '-', line: true },
            Series { points: &reference_points, marker: '.', line: false },
        ],
        width,
        height,
    )
}

/// Residual per iteration.
pub fn render_trajectory(trajectory: &Trajectory, width: usize, height: usize) -> String {
    let last: Vec<(f64, f64)> = trajectory
        .last()
        .map(|(i, r)| vec![(i as f64, r)])
        .unwrap_or_default();
    render_series(
        "Residual vs iteration",
        &[
            Series { points: trajectory.residuals(), marker: 'o', line: false },
            Series { points: &last, marker: '*', line: false },
        ],
        width,
        height,
    )
}

/// Render series in order; later series overwrite earlier ones.
pub fn render_series(header: &str, series: &[Series<'_>], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let finite = || {
        series
            .iter()
            .flat_map(|s| s.points.iter())
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    };
    let (x_min, x_max) = range(finite().map(|(x, _)| *x)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = range(finite().map(|(_, y)| *y)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    for s in series {
        let mut prev = None;
        for &(x, y) in s.points {
            if !(x.is_finite() && y.is_finite()) {
                prev = None;
                continue;
            }
            let cx = map_x(x, x_min, x_max, width);
            let cy = map_y(y, y_min, y_max, height);
            match prev {
                Some((x0, y0)) if s.line => draw_line(&mut grid, x0, y0, cx, cy, s.marker),
                _ => grid[cy][cx] = s.marker,
            }
            prev = Some((cx, cy));
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{header}\nx=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.4}, {y_max:.4}]\n"
    ));
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
    out
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    if hi > lo { Some((lo, hi)) } else { Some((lo - 0.5, hi + 0.5)) }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
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
        if y0 >= 0 && (y0 as usize) < grid.len() && x0 >= 0 && (x0 as usize) < grid[0].len() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WaveUnit;

    #[test]
    fn comparison_golden_snapshot_small() {
        let reference = Spectrum::new(vec![0.0, 9.0], WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Quantity::TransmittanceNoslit, vec![1.0, 0.0], "")
            .unwrap();
        let computed = Spectrum::new(vec![0.0, 9.0], WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Quantity::TransmittanceNoslit, vec![0.0, 0.0], "")
            .unwrap();

        let txt = render_spectrum_comparison(&reference, &computed, Quantity::TransmittanceNoslit, "T=1K", 10, 5);
        let expected = concat!(
            "T=1K | transmittance_noslit vs cm-1\n",
            "x=[0.000, 9.000] | y=[-0.0500, 1.0500]\n",
            ".\n",
            "\n",
            "\n",
            "\n",
            "---------.\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn trajectory_marks_last_point() {
        let mut t = Trajectory::new(1);
        let entry = |i: usize, r: f64| crate::fit::HistoryEntry {
            index: i,
            values: crate::domain::ParameterVector::new(vec![1.0]),
            outcome: Ok(r),
        };
        t.seed(&[entry(0, 4.0), entry(1, 2.0)]);
        t.push(3, &entry(2, 1.0));
        let txt = render_trajectory(&t, 10, 5);
        assert!(txt.starts_with("Residual vs iteration\n"));
        let grid: String = txt.lines().skip(2).collect();
        assert_eq!(grid.matches('*').count(), 1);
        assert_eq!(grid.matches('o').count(), 2);
    }
}
