//! Ratatui-based live dashboard for a running fit.
//!
//! The dashboard is a [`ProgressReporter`]: the fit drives it. After every
//! redraw it polls the keyboard for 10 ms so the terminal stays responsive, and
//! once the fit is finished it waits for `q` before restoring the terminal.

use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::warn;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
    Terminal,
};

use crate::domain::{FitParameter, FitResult, FitState, Quantity};
use crate::error::AppError;
use crate::fit::{FitHistory, HistoryEntry};
use crate::report::{format_progress_line, ProgressReporter, Trajectory};
use crate::spectrum::Spectrum;

mod plotters_chart;

use plotters_chart::{ChartSeries, SeriesChart, SeriesStyle, PALETTE};

/// Poll after each redraw.
const REDRAW_POLL: Duration = Duration::from_millis(10);

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// Everything the dashboard shows, independent of the terminal.
#[derive(Debug, Default)]
struct Dashboard {
    params: Vec<FitParameter>,
    reference_name: String,
    trajectory: Trajectory,
    reference: Vec<(f64, f64)>,
    computed: Vec<(f64, f64)>,
    spectrum_title: String,
    quantity: Option<Quantity>,
    x_label: String,
    last_line: String,
    status: String,
    finished: bool,
}

impl Dashboard {
    fn start(&mut self, params: &[FitParameter], reference: &Spectrum) {
        self.params = params.to_vec();
        self.trajectory = Trajectory::new(params.len());
        self.reference_name = reference.name().unwrap_or("reference").to_string();
        self.x_label = reference.waveunit().as_str().to_string();
        self.status = "Probing bounds...".to_string();
    }

    fn probes(&mut self, probes: &[HistoryEntry]) {
        self.trajectory.seed(probes);
        if let Some(last) = probes.last() {
            self.last_line = format_progress_line(&self.params, last);
        }
        self.status = "Optimizing...".to_string();
    }

    fn evaluation(&mut self, iteration: usize, entry: &HistoryEntry) {
        self.trajectory.push(iteration, entry);
        self.last_line = format!("#{iteration} {}", format_progress_line(&self.params, entry));
    }

    fn spectrum(&mut self, computed: &Spectrum, reference: &Spectrum, quantity: Quantity, title: &str) {
        let unit = reference.waveunit();
        self.reference = reference.points(quantity);
        self.computed = computed
            .points(quantity)
            .into_iter()
            .map(|(w, v)| (computed.waveunit().convert(w, unit), v))
            .collect();
        self.quantity = Some(quantity);
        self.spectrum_title = title.to_string();
    }

    fn finish(&mut self, result: &FitResult) {
        let state = match result.state {
            FitState::Converged => "converged",
            _ => "failed",
        };
        self.status = match &result.best {
            Some(best) => format!(
                "{state}: {} | best {} (residual {:.4})",
                result.message,
                best.values.display_with(&self.params),
                best.residual
            ),
            None => format!("{state}: {}", result.message),
        };
        self.finished = true;
    }

    /// Spectrum frame over both series, y padded by 5%.
    fn spectrum_bounds(&self) -> ([f64; 2], [f64; 2]) {
        let finite = || {
            self.reference
                .iter()
                .chain(self.computed.iter())
                .filter(|(x, y)| x.is_finite() && y.is_finite())
        };
        let (x0, x1) = finite().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (x, _)| {
            (lo.min(*x), hi.max(*x))
        });
        let (y0, y1) = finite().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, y)| {
            (lo.min(*y), hi.max(*y))
        });
        let x = if x0.is_finite() && x1 > x0 { [x0, x1] } else { [0.0, 1.0] };
        let y = if y0.is_finite() && y1 > y0 {
            let pad = (y1 - y0) * 0.05;
            [y0 - pad, y1 + pad]
        } else if y0.is_finite() {
            [y0 - 0.5, y0 + 0.5]
        } else {
            [0.0, 1.0]
        };
        (x, y)
    }

    /// Parameter names with their chart colors.
    fn legend(&self) -> String {
        const NAMES: [&str; 4] = ["cyan", "yellow", "green", "red"];
        self.params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} ({})", p.param.name(), NAMES[i % NAMES.len()]))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Live dashboard reporter (`--tui`).
pub struct TuiReporter {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    dash: Dashboard,
    _guard: TerminalGuard,
}

impl TuiReporter {
    pub fn new() -> Result<Self, AppError> {
        let guard = TerminalGuard::new()?;
        let backend = CrosstermBackend::new(io::stdout());
        let terminal =
            Terminal::new(backend).map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;
        Ok(Self {
            terminal,
            dash: Dashboard::default(),
            _guard: guard,
        })
    }

    fn redraw(&mut self) {
        let dash = &self.dash;
        if let Err(e) = self.terminal.draw(|f| draw(f, dash)) {
            warn!("terminal draw error: {e}");
            return;
        }
        // Keystrokes during the fit are drained; only `q` at the end matters.
        match event::poll(REDRAW_POLL) {
            Ok(true) => {
                if let Err(e) = event::read() {
                    warn!("event read error: {e}");
                }
            }
            Ok(false) => {}
            Err(e) => warn!("event poll error: {e}"),
        }
    }

    fn wait_for_quit(&mut self) {
        loop {
            match event::poll(Duration::from_millis(100)) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    warn!("event poll error: {e}");
                    return;
                }
            }
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                        return;
                    }
                }
                Ok(Event::Resize(_, _)) => self.redraw(),
                Ok(_) => {}
                Err(e) => {
                    warn!("event read error: {e}");
                    return;
                }
            }
        }
    }
}

impl ProgressReporter for TuiReporter {
    fn on_start(&mut self, params: &[FitParameter], reference: &Spectrum) {
        self.dash.start(params, reference);
        self.redraw();
    }

    fn on_probes(&mut self, _params: &[FitParameter], probes: &[HistoryEntry]) {
        self.dash.probes(probes);
        self.redraw();
    }

    fn on_evaluation(&mut self, iteration: usize, _params: &[FitParameter], entry: &HistoryEntry) {
        self.dash.evaluation(iteration, entry);
        self.redraw();
    }

    fn on_spectrum(&mut self, computed: &Spectrum, reference: &Spectrum, quantity: Quantity, title: &str) {
        self.dash.spectrum(computed, reference, quantity, title);
        self.redraw();
    }

    fn on_finish(&mut self, _params: &[FitParameter], result: &FitResult, _history: &FitHistory) {
        self.dash.finish(result);
        self.redraw();
        self.wait_for_quit();
    }
}

fn draw(frame: &mut ratatui::Frame<'_>, dash: &Dashboard) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
        .split(frame.area());

    draw_header(frame, chunks[0], dash);

    let body = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);
    draw_spectrum(frame, body[0], dash);

    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(body[1]);
    draw_residuals(frame, lower[0], dash);
    draw_parameters(frame, lower[1], dash);

    draw_footer(frame, chunks[2], dash);
}

fn draw_header(frame: &mut ratatui::Frame<'_>, area: Rect, dash: &Dashboard) {
    let lines = vec![
        Line::from(vec![
            Span::styled("sfit", Style::default().fg(Color::Cyan)),
            Span::raw(format!(" - fitting against '{}'", dash.reference_name)),
        ]),
        Line::from(Span::styled(dash.last_line.clone(), Style::default().fg(Color::Gray))),
    ];
    let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(p, area);
}

fn draw_spectrum(frame: &mut ratatui::Frame<'_>, area: Rect, dash: &Dashboard) {
    let title = if dash.spectrum_title.is_empty() {
        "Spectrum".to_string()
    } else {
        format!("Spectrum: {} (reference white, computed cyan)", dash.spectrum_title)
    };
    let block = Block::default().title(title).borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(Clear, inner);

    let Some(quantity) = dash.quantity else {
        let msg = Paragraph::new("Waiting for the first spectrum...").style(Style::default().fg(Color::Yellow));
        frame.render_widget(msg, inner);
        return;
    };

    let (x_bounds, y_bounds) = dash.spectrum_bounds();
    let chart = SeriesChart {
        series: vec![
            ChartSeries {
                points: &dash.reference,
                color: plotters::style::WHITE,
                style: SeriesStyle::Dots,
            },
            ChartSeries {
                points: &dash.computed,
                color: PALETTE[0],
                style: SeriesStyle::Line,
            },
        ],
        x_bounds,
        y_bounds,
        x_label: &dash.x_label,
        y_label: quantity.as_str(),
        fmt_x: fmt_axis_x,
        fmt_y: fmt_axis_y,
    };
    frame.render_widget(chart, inner);
}

fn draw_residuals(frame: &mut ratatui::Frame<'_>, area: Rect, dash: &Dashboard) {
    let block = Block::default().title("Residual").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(Clear, inner);

    let (x0, x1) = dash.trajectory.x_range(10.0);
    let (y0, y1) = dash.trajectory.residual_range();
    let chart = SeriesChart {
        series: vec![ChartSeries {
            points: dash.trajectory.residuals(),
            color: PALETTE[0],
            style: SeriesStyle::Line,
        }],
        x_bounds: [x0, x1],
        y_bounds: [y0, y1],
        x_label: "iteration",
        y_label: "residual",
        fmt_x: fmt_axis_int,
        fmt_y: fmt_axis_y,
    };
    frame.render_widget(chart, inner);
}

fn draw_parameters(frame: &mut ratatui::Frame<'_>, area: Rect, dash: &Dashboard) {
    let block = Block::default().title(dash.legend()).borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(Clear, inner);

    let (x0, x1) = dash.trajectory.x_range(10.0);
    let (y0, y1) = dash.trajectory.parameter_range();
    let series = (0..dash.trajectory.n_params())
        .map(|i| ChartSeries {
            points: dash.trajectory.parameter(i),
            color: PALETTE[i % PALETTE.len()],
            style: SeriesStyle::Line,
        })
        .collect();
    let chart = SeriesChart {
        series,
        x_bounds: [x0, x1],
        y_bounds: [y0, y1],
        x_label: "iteration",
        y_label: "K",
        fmt_x: fmt_axis_int,
        fmt_y: fmt_axis_int,
    };
    frame.render_widget(chart, inner);
}

fn draw_footer(frame: &mut ratatui::Frame<'_>, area: Rect, dash: &Dashboard) {
    let help = if dash.finished { "q quit" } else { "fitting..." };
    let line = Line::from(vec![
        Span::styled(help, Style::default().fg(Color::Gray)),
        Span::raw(" | "),
        Span::styled(dash.status.as_str(), Style::default().fg(Color::Yellow)),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    frame.render_widget(p, area);
}

fn fmt_axis_x(v: f64) -> String {
    format!("{v:.2}")
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.3}")
}

fn fmt_axis_int(v: f64) -> String {
    format!("{v:.0}")
}
