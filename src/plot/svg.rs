//! SVG export of a finished fit (`--save-plot`).

use std::path::Path;

use plotters::prelude::*;

use crate::domain::Quantity;
use crate::error::AppError;
use crate::report::Trajectory;
use crate::spectrum::Spectrum;

const FIG_SIZE: (u32, u32) = (900, 700);

/// Reference vs best spectrum on top, residual trajectory below.
pub fn save_fit_svg(
    path: &Path,
    reference: &Spectrum,
    best: &Spectrum,
    quantity: Quantity,
    trajectory: &Trajectory,
) -> Result<(), AppError> {
    draw_fit(path, reference, best, quantity, trajectory)
        .map_err(|e| AppError::new(4, format!("Failed to write plot {}: {e}", path.display())))
}

fn draw_fit(
    path: &Path,
    reference: &Spectrum,
    best: &Spectrum,
    quantity: Quantity,
    trajectory: &Trajectory,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(path, FIG_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (top, bottom) = root.split_vertically(FIG_SIZE.1 * 3 / 5);

    let unit = reference.waveunit();
    let reference_points: Vec<(f64, f64)> = finite(reference.points(quantity));
    let best_points: Vec<(f64, f64)> = finite(
        best.points(quantity)
            .into_iter()
            .map(|(w, v)| (best.waveunit().convert(w, unit), v))
            .collect(),
    );

    let (x0, x1) = span(reference_points.iter().chain(&best_points).map(|p| p.0));
    let (y0, y1) = span(reference_points.iter().chain(&best_points).map(|p| p.1));
    let mut chart = ChartBuilder::on(&top)
        .caption(format!("{quantity}: reference vs best fit"), ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc(format!("wavespace ({})", unit.as_str()))
        .y_desc(quantity.as_str())
        .draw()?;
    chart
        .draw_series(reference_points.iter().map(|&(x, y)| Circle::new((x, y), 2, BLACK.filled())))?
        .label(reference.name().unwrap_or("reference").to_string())
        .legend(|(x, y)| Circle::new((x + 10, y), 3, BLACK.filled()));
    chart
        .draw_series(LineSeries::new(best_points.iter().copied(), &RED))?
        .label("best fit")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    let (t0, t1) = trajectory.x_range(1.0);
    let (r0, r1) = trajectory.residual_range();
    let mut chart = ChartBuilder::on(&bottom)
        .caption("residual per iteration", ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(t0..t1, r0..r1)?;
    chart.configure_mesh().x_desc("iteration").y_desc("residual").draw()?;
    chart.draw_series(LineSeries::new(trajectory.residuals().iter().copied(), &BLUE))?;
    if let Some((i, r)) = trajectory.last() {
        chart.draw_series(std::iter::once(Circle::new((i as f64, r), 4, RED.filled())))?;
    }

    root.present()?;
    Ok(())
}

fn finite(points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.into_iter().filter(|(x, y)| x.is_finite() && y.is_finite()).collect()
}

fn span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        (0.0, 1.0)
    } else if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParameterVector, WaveUnit};
    use crate::fit::HistoryEntry;

    #[test]
    fn writes_svg_document() {
        let reference = Spectrum::new(vec![2284.2, 2284.4, 2284.6], WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Quantity::TransmittanceNoslit, vec![1.0, 0.6, 1.0], "")
            .unwrap();
        let best = reference.clone();
        let mut trajectory = Trajectory::new(1);
        for (i, r) in [0.3, 0.1, 0.02].into_iter().enumerate() {
            let entry = HistoryEntry { index: i, values: ParameterVector::new(vec![500.0]), outcome: Ok(r) };
            trajectory.push(i + 1, &entry);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.svg");
        save_fit_svg(&path, &reference, &best, Quantity::TransmittanceNoslit, &trajectory).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("residual per iteration"));
    }
}
