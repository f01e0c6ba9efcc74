//! Learning-curve plot
//!
//! Draws evaluation loss, accuracy and MCC against the epoch index as a
//! standalone SVG document. The file is rewritten after every epoch.

use crate::tracking::MetricHistory;
use crate::Result;
use std::fmt::Write;
use std::path::Path;

/// Canvas width in pixels
const WIDTH: f64 = 1000.0;
/// Canvas height in pixels
const HEIGHT: f64 = 600.0;
/// Left/bottom margin holding the axes labels
const MARGIN: f64 = 60.0;
/// Tick count on each axis
const TICKS: usize = 5;

/// Line marker shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Circle,
    Square,
    Triangle,
}

/// One plotted metric.
#[derive(Debug, Clone, Copy)]
struct Curve {
    key: &'static str,
    label: &'static str,
    color: &'static str,
    dash: Option<&'static str>,
    marker: Marker,
}

const CURVES: [Curve; 3] = [
    Curve {
        key: "loss",
        label: "loss",
        color: "lightcoral",
        dash: Some("6 3"),
        marker: Marker::Circle,
    },
    Curve {
        key: "accuracy",
        label: "accuracy",
        color: "steelblue",
        dash: Some("6 3 1 3"),
        marker: Marker::Square,
    },
    Curve {
        key: "mcc",
        label: "MCC",
        color: "seagreen",
        dash: None,
        marker: Marker::Triangle,
    },
];

/// Linear map from data space to the plot area.
#[derive(Debug, Clone, Copy)]
struct Frame {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Frame {
    fn px(&self, x: f64) -> f64 {
        let span = (WIDTH - 2.0 * MARGIN) / (self.x_max - self.x_min);
        (x - self.x_min).mul_add(span, MARGIN)
    }

    fn py(&self, y: f64) -> f64 {
        let span = (HEIGHT - 2.0 * MARGIN) / (self.y_max - self.y_min);
        (self.y_max - y).mul_add(span, MARGIN)
    }
}

/// Render the history as an SVG document.
///
/// An empty history yields a blank canvas with a placeholder message.
///
/// # Example
///
/// ```
/// use discharge_net::plot::render_svg;
/// use discharge_net::tracking::{EpochMetrics, MetricHistory};
///
/// let mut history = MetricHistory::new("run-1");
/// history.push(EpochMetrics::new(0, 0.69, 0.55, 0.1));
/// let svg = render_svg(&history);
/// assert!(svg.starts_with("<svg"));
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn render_svg(history: &MetricHistory) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">
  <rect width="100%" height="100%" fill="white"/>
"#
    );

    if history.is_empty() {
        svg.push_str(
            "  <text x=\"50%\" y=\"50%\" text-anchor=\"middle\" fill=\"#999\">No epochs recorded</text>\n</svg>",
        );
        return svg;
    }

    let epochs: Vec<f64> = history.epochs().iter().map(|m| m.epoch() as f64).collect();
    let series: Vec<(Curve, Vec<f64>)> = CURVES
        .iter()
        .map(|&curve| (curve, history.series(curve.key)))
        .collect();
    let frame = frame(&epochs, &series);

    draw_axes(&mut svg, &frame);
    for (curve, values) in &series {
        draw_curve(&mut svg, &frame, curve, &epochs, values);
    }
    draw_legend(&mut svg);

    svg.push_str("</svg>");
    svg
}

fn frame(epochs: &[f64], series: &[(Curve, Vec<f64>)]) -> Frame {
    let (mut x_min, mut x_max) = bounds(epochs.iter().copied());
    if x_max <= x_min {
        x_min -= 0.5;
        x_max += 0.5;
    }

    let (y_lo, y_hi) = bounds(
        series
            .iter()
            .flat_map(|(_, values)| values.iter().copied())
            .filter(|v| v.is_finite()),
    );
    // MCC can go negative; always keep 0 in view
    let (mut y_min, mut y_max) = (y_lo.min(0.0), y_hi.max(1.0));
    let pad = (y_max - y_min) * 0.05;
    y_min -= pad;
    y_max += pad;

    Frame {
        x_min,
        x_max,
        y_min,
        y_max,
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

#[allow(clippy::cast_precision_loss)]
fn draw_axes(svg: &mut String, frame: &Frame) {
    let (left, right) = (MARGIN, WIDTH - MARGIN);
    let (top, bottom) = (MARGIN, HEIGHT - MARGIN);
    let _ = writeln!(
        svg,
        r#"  <path d="M {left} {top} L {left} {bottom} L {right} {bottom}" fill="none" stroke="black" stroke-width="1"/>"#
    );

    for i in 0..=TICKS {
        let t = i as f64 / TICKS as f64;
        let x_value = (frame.x_max - frame.x_min).mul_add(t, frame.x_min);
        let y_value = (frame.y_max - frame.y_min).mul_add(t, frame.y_min);
        let x = frame.px(x_value);
        let y = frame.py(y_value);
        let _ = writeln!(
            svg,
            r##"  <line x1="{x:.2}" y1="{bottom}" x2="{x:.2}" y2="{:.2}" stroke="black"/>
  <text x="{x:.2}" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="12">{x_value:.1}</text>
  <line x1="{left}" y1="{y:.2}" x2="{right}" y2="{y:.2}" stroke="#e0e0e0"/>
  <text x="{:.2}" y="{:.2}" text-anchor="end" font-family="sans-serif" font-size="12">{y_value:.2}</text>"##,
            bottom + 5.0,
            bottom + 20.0,
            left - 8.0,
            y + 4.0,
        );
    }

    let _ = writeln!(
        svg,
        r#"  <text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="14">Epoch</text>"#,
        WIDTH / 2.0,
        HEIGHT - 15.0
    );
}

fn draw_curve(svg: &mut String, frame: &Frame, curve: &Curve, epochs: &[f64], values: &[f64]) {
    let points: Vec<(f64, f64)> = epochs
        .iter()
        .zip(values)
        .filter(|(_, v)| v.is_finite())
        .map(|(&x, &y)| (frame.px(x), frame.py(y)))
        .collect();
    if points.is_empty() {
        return;
    }

    let mut path = String::new();
    for (i, (x, y)) in points.iter().enumerate() {
        let op = if i == 0 { "M" } else { " L" };
        let _ = write!(path, "{op} {x:.2} {y:.2}");
    }
    let dash = curve
        .dash
        .map(|d| format!(r#" stroke-dasharray="{d}""#))
        .unwrap_or_default();
    let _ = writeln!(
        svg,
        r#"  <path d="{path}" fill="none" stroke="{}" stroke-width="1.5"{dash}/>"#,
        curve.color
    );

    for &(x, y) in &points {
        marker(svg, curve.marker, curve.color, x, y);
    }
}

fn marker(svg: &mut String, shape: Marker, color: &str, x: f64, y: f64) {
    const R: f64 = 4.0;
    let _ = match shape {
        Marker::Circle => writeln!(
            svg,
            r#"  <circle cx="{x:.2}" cy="{y:.2}" r="{R}" fill="{color}"/>"#
        ),
        Marker::Square => writeln!(
            svg,
            r#"  <rect x="{:.2}" y="{:.2}" width="{}" height="{}" fill="{color}"/>"#,
            x - R,
            y - R,
            2.0 * R,
            2.0 * R
        ),
        Marker::Triangle => writeln!(
            svg,
            r#"  <polygon points="{x:.2},{:.2} {:.2},{:.2} {:.2},{:.2}" fill="{color}"/>"#,
            y - R,
            x - R,
            y + R,
            x + R,
            y + R
        ),
    };
}

#[allow(clippy::cast_precision_loss)]
fn draw_legend(svg: &mut String) {
    let x = WIDTH - MARGIN - 130.0;
    let y = MARGIN + 10.0;
    let _ = writeln!(
        svg,
        r#"  <rect x="{x}" y="{y}" width="120" height="70" fill="white" stroke="lightgray"/>"#
    );
    for (i, curve) in CURVES.iter().enumerate() {
        let row = y + 20.0 * i as f64 + 18.0;
        let dash = curve
            .dash
            .map(|d| format!(r#" stroke-dasharray="{d}""#))
            .unwrap_or_default();
        let _ = writeln!(
            svg,
            r#"  <line x1="{:.2}" y1="{row:.2}" x2="{:.2}" y2="{row:.2}" stroke="{}" stroke-width="1.5"{dash}/>
  <text x="{:.2}" y="{:.2}" font-family="sans-serif" font-size="12">{}</text>"#,
            x + 8.0,
            x + 38.0,
            curve.color,
            x + 46.0,
            row + 4.0,
            curve.label
        );
        marker(svg, curve.marker, curve.color, x + 23.0, row);
    }
}

/// Render `history` and write it to `path`, replacing any previous plot.
///
/// The document is written to a sibling temp file first so readers never see
/// a half-written plot.
///
/// # Errors
///
/// Returns IO errors from creating, writing or renaming the file.
pub fn save<P: AsRef<Path>>(path: P, history: &MetricHistory) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, render_svg(history))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
