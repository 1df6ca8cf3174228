//! Plotters-powered series chart widget for Ratatui.
//!
//! Plotters output is drawn into the Ratatui buffer through
//! `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// How a series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStyle {
    Line,
    Dots,
}

/// One series of a [`SeriesChart`].
pub struct ChartSeries<'a> {
    pub points: &'a [(f64, f64)],
    pub color: RGBColor,
    pub style: SeriesStyle,
}

/// A render-only chart description. Bounds are computed by the caller.
pub struct SeriesChart<'a> {
    pub series: Vec<ChartSeries<'a>>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

/// Distinct colors for up to a handful of series.
pub const PALETTE: [RGBColor; 4] = [
    RGBColor(0, 255, 255),
    RGBColor(255, 200, 0),
    RGBColor(0, 255, 0),
    RGBColor(255, 80, 80),
];

impl<'a> Widget for SeriesChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.x_bounds;
        let [y0, y1] = self.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(self.x_label)
                .y_desc(self.y_label)
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            for s in &self.series {
                let finite = s.points.iter().copied().filter(|(x, y)| x.is_finite() && y.is_finite());
                match s.style {
                    SeriesStyle::Line => {
                        chart.draw_series(LineSeries::new(finite, &s.color))?;
                    }
                    // `Circle` radii are mis-scaled by the ratatui backend; pixels render cleanly.
                    SeriesStyle::Dots => {
                        chart.draw_series(finite.map(|(x, y)| Pixel::new((x, y), s.color)))?;
                    }
                }
            }

            Ok(())
        });

        widget.render(area, buf);
    }
}
