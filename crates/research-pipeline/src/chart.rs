//! Projection chart artifacts

use crate::error::{ResearchError as Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tracing::debug;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const TICKS: usize = 5;

/// Line chart to draw
#[derive(Debug, Clone, Copy)]
pub struct ChartRequest<'a> {
    pub title: &'a str,
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub points: &'a [(f64, f64)],
}

/// Writes charts to disk
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, chart: &ChartRequest<'_>, path: &Path) -> Result<()>;

    /// File extension of the produced artifacts
    fn extension(&self) -> &str;
}

/// Self-contained SVG line charts
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgChartRenderer;

impl SvgChartRenderer {
    pub fn new() -> Self {
        Self
    }

    /// SVG document for `chart`
    pub fn to_svg(&self, chart: &ChartRequest<'_>) -> Result<String> {
        let mut svg = String::new();
        write_svg(&mut svg, chart).map_err(|_| Error::Other("failed to format chart".into()))?;
        Ok(svg)
    }
}

fn write_svg(svg: &mut impl fmt::Write, chart: &ChartRequest<'_>) -> fmt::Result {
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (x_min, x_max) = bounds(chart.points.iter().map(|p| p.0), 0.0);
    let (y_min, y_max) = bounds(chart.points.iter().map(|p| p.1), 0.05);
    let sx = |x: f64| MARGIN_LEFT + (x - x_min) / (x_max - x_min) * plot_w;
    let sy = |y: f64| MARGIN_TOP + plot_h - (y - y_min) / (y_max - y_min) * plot_h;

    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">"#
    )?;
    writeln!(svg, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##)?;
    writeln!(
        svg,
        r#"<text x="{}" y="28" text-anchor="middle" font-size="16">{}</text>"#,
        WIDTH / 2.0,
        escape_xml(chart.title)
    )?;

    for i in 0..=TICKS {
        let frac = i as f64 / TICKS as f64;
        let y_val = y_min + frac * (y_max - y_min);
        let y = sy(y_val);
        writeln!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#e5e7eb"/>"##,
            MARGIN_LEFT + plot_w
        )?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end">{y_val:.2}</text>"#,
            MARGIN_LEFT - 8.0,
            y + 4.0
        )?;

        let x_val = x_min + frac * (x_max - x_min);
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{x_val:.2}</text>"#,
            sx(x_val),
            MARGIN_TOP + plot_h + 18.0
        )?;
    }

    writeln!(
        svg,
        r##"<line x1="{MARGIN_LEFT}" y1="{MARGIN_TOP}" x2="{MARGIN_LEFT}" y2="{:.1}" stroke="#374151"/>"##,
        MARGIN_TOP + plot_h
    )?;
    writeln!(
        svg,
        r##"<line x1="{MARGIN_LEFT}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="#374151"/>"##,
        MARGIN_TOP + plot_h,
        MARGIN_LEFT + plot_w,
        MARGIN_TOP + plot_h
    )?;
    writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        HEIGHT - 15.0,
        escape_xml(chart.x_label)
    )?;
    writeln!(
        svg,
        r#"<text x="18" y="{:.1}" text-anchor="middle" transform="rotate(-90 18 {:.1})">{}</text>"#,
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0,
        escape_xml(chart.y_label)
    )?;

    let polyline = chart
        .points
        .iter()
        .map(|&(x, y)| format!("{:.1},{:.1}", sx(x), sy(y)))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(
        svg,
        r##"<polyline points="{polyline}" fill="none" stroke="#2563eb" stroke-width="2"/>"##
    )?;
    writeln!(svg, "</svg>")
}

#[async_trait]
impl ChartRenderer for SvgChartRenderer {
    async fn render(&self, chart: &ChartRequest<'_>, path: &Path) -> Result<()> {
        let svg = self.to_svg(chart)?;
        tokio::fs::write(path, svg).await?;
        debug!(path = %path.display(), points = chart.points.len(), "Wrote chart");
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "svg"
    }
}

/// Finite min/max of `values`, padded by `pad` of the range; never empty
fn bounds(values: impl Iterator<Item = f64>, pad: f64) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    let padding = (max - min) * pad;
    (min - padding, max + padding)
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(points: &[(f64, f64)]) -> ChartRequest<'_> {
        ChartRequest {
            title: "AT&T — 5Y Projection (g~8.0%)",
            x_label: "Years",
            y_label: "Projected Price",
            points,
        }
    }

    #[test]
    fn test_svg_contains_title_axes_and_line() {
        let points = [(0.0, 100.0), (0.25, 102.0), (0.5, 104.0)];
        let svg = SvgChartRenderer::new().to_svg(&chart(&points)).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("AT&amp;T — 5Y Projection (g~8.0%)"));
        assert!(svg.contains(">Years<"));
        assert!(svg.contains(">Projected Price<"));
        assert!(svg.contains("<polyline points=\"70.0,"));
    }

    #[test]
    fn test_flat_and_empty_series_do_not_divide_by_zero() {
        let renderer = SvgChartRenderer::new();
        let flat = renderer.to_svg(&chart(&[(0.0, 50.0), (1.0, 50.0)])).unwrap();
        assert!(!flat.contains("NaN"));

        let empty = renderer.to_svg(&chart(&[])).unwrap();
        assert!(!empty.contains("NaN"));
        assert!(!empty.contains("inf"));
    }

    /// Accepts `room` writes, then fails
    struct Cramped {
        room: usize,
    }

    impl fmt::Write for Cramped {
        fn write_str(&mut self, _s: &str) -> fmt::Result {
            if self.room == 0 {
                return Err(fmt::Error);
            }
            self.room -= 1;
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_stops_drawing() {
        let points = [(0.0, 1.0), (1.0, 2.0)];
        let mut out = Cramped { room: 3 };
        assert!(write_svg(&mut out, &chart(&points)).is_err());
        assert_eq!(out.room, 0);

        let mut roomy = Cramped { room: usize::MAX };
        assert!(write_svg(&mut roomy, &chart(&points)).is_ok());
    }

    #[tokio::test]
    async fn test_render_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.svg");

        SvgChartRenderer::new()
            .render(&chart(&[(0.0, 1.0), (1.0, 2.0)]), &path)
            .await
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("<polyline"));
    }

    #[tokio::test]
    async fn test_render_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("chart.svg");
        let result = SvgChartRenderer::new()
            .render(&chart(&[(0.0, 1.0)]), &path)
            .await;
        assert!(result.is_err());
    }
}
