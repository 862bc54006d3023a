//! Text rendering of one panel's series
//!
//! The curve is drawn by ratatui's `Chart` into an off-screen buffer and read
//! back as plain lines, so the result is a pure function of the series and
//! the panel size.

use chrono::{DateTime, Utc};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    symbols,
    text::Span,
    widgets::{Axis, Chart, Dataset, GraphType, Widget},
};

use promviz_core::series::TimeSeriesResult;

pub const MIN_GRAPH_WIDTH: u16 = 20;
pub const MIN_GRAPH_HEIGHT: u16 = 3;
/// Rows reserved for the current value, time span, blank line and caption
const HEADER_ROWS: u16 = 6;
/// Columns reserved around the y-axis labels, on top of the label digits
const LABEL_PADDING: u16 = 7;

/// Rendered content of a populated panel
#[derive(Clone, Debug, PartialEq)]
pub struct GraphText {
    /// Value of the most recent point
    pub current: f64,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Plot rows, top to bottom, followed by the caption
    pub plot: Vec<String>,
}

/// Plot area (width, height) for a panel of the given inner size
pub fn plot_size(values: &[f64], width: u16, height: u16) -> (u16, u16) {
    let abs_max = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let digits = format!("{abs_max:.0}").len() as u16;
    let margin = digits + LABEL_PADDING;

    let graph_width = width.saturating_sub(margin).max(MIN_GRAPH_WIDTH);
    let graph_height = height.saturating_sub(HEADER_ROWS).max(MIN_GRAPH_HEIGHT);
    (graph_width, graph_height)
}

/// Render `series` for a panel whose inner area is `width` x `height`.
/// Returns `None` for an empty series.
pub fn render_graph(name: &str, series: &TimeSeriesResult, width: u16, height: u16) -> Option<GraphText> {
    let points = series.sorted();
    let first = points.first()?;
    let last = points.last()?;

    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let (graph_width, graph_height) = plot_size(&values, width, height);

    let mut plot = plot_lines(&values, graph_width, graph_height);
    plot.push(format!("{name} Time Series"));

    Some(GraphText {
        current: last.value,
        from: first.timestamp,
        to: last.timestamp,
        plot,
    })
}

fn plot_lines(values: &[f64], width: u16, height: u16) -> Vec<String> {
    let data: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, *v))
        .collect();

    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (lo, hi) = match (lo.is_finite(), hi.is_finite()) {
        (true, true) if hi > lo => (lo, hi),
        (true, true) => (lo - 1.0, hi + 1.0),
        _ => (0.0, 1.0),
    };
    let x_max = (values.len().saturating_sub(1) as f64).max(1.0);

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default())
        .data(&data);

    let chart = Chart::new(vec![dataset])
        .x_axis(Axis::default().bounds([0.0, x_max]))
        .y_axis(
            Axis::default()
                .bounds([lo, hi])
                .labels(vec![Span::raw(format!("{lo:.2}")), Span::raw(format!("{hi:.2}"))]),
        );

    let area = Rect::new(0, 0, width, height);
    let mut buf = Buffer::empty(area);
    chart.render(area, &mut buf);

    buf.content
        .chunks(area.width as usize)
        .map(|row| {
            row.iter()
                .map(|cell| cell.symbol())
                .collect::<String>()
                .trim_end()
                .to_string()
        })
        .collect()
}
