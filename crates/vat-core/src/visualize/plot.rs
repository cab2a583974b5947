//! Self-contained interactive document for the 2-d memory layout: density
//! contour lines from a 30x30 histogram under a scatter of points, drawn as
//! inline SVG. A small inline script adds hover text, wheel zoom and drag
//! pan. The document loads nothing from the network.

use chrono::NaiveDateTime;
use std::fmt::Write;

use crate::types::TIMESTAMP_FORMAT;

pub const PLOT_TITLE: &str = "Memory Embeddings Visualization";
const HOVER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DENSITY_BINS: usize = 30;
const MAX_CONTOUR_LEVELS: usize = 8;
const CONTOUR_COLOR: &str = "#4A90E2";
const POINT_COLOR: &str = "#222222";
const POINT_OPACITY: f64 = 0.7;

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 720.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 60.0;
const TICKS: usize = 5;

/// One projected memory
#[derive(Debug, Clone, PartialEq)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub content: String,
    pub timestamp: String,
}

/// Second-resolution display form of a stored timestamp; unparseable
/// values are shown as stored
fn hover_time(timestamp: &str) -> String {
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map(|t| t.format(HOVER_TIME_FORMAT).to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Escape text for use in XML content and quoted attributes
fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("&#10;"),
            other => out.push(other),
        }
    }
    out
}

/// Data range on one axis, padded so points never sit on the frame
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !min.is_finite() || !max.is_finite() {
            return Self { min: -1.0, max: 1.0 };
        }
        let pad = if max > min { (max - min) * 0.05 } else { 1.0 };
        Self {
            min: min - pad,
            max: max + pad,
        }
    }

    fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Position of `v` in `0.0..=1.0`
    fn unit(&self, v: f64) -> f64 {
        (v - self.min) / self.span()
    }
}

/// Pixel mapping of the plotting area
struct Frame {
    x: Range,
    y: Range,
}

impl Frame {
    fn plot_width() -> f64 {
        WIDTH - MARGIN_LEFT - MARGIN_RIGHT
    }

    fn plot_height() -> f64 {
        HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
    }

    fn px(&self, x: f64) -> f64 {
        MARGIN_LEFT + self.x.unit(x) * Self::plot_width()
    }

    fn py(&self, y: f64) -> f64 {
        MARGIN_TOP + (1.0 - self.y.unit(y)) * Self::plot_height()
    }
}

/// Point counts per bin, zero-padded by one bin on every side so contour
/// lines close around the data. Indexed `[ix][iy]`.
fn density_grid(points: &[PlotPoint], frame: &Frame) -> Vec<Vec<f64>> {
    let mut grid = vec![vec![0.0; DENSITY_BINS + 2]; DENSITY_BINS + 2];
    let bin = |unit: f64| ((unit * DENSITY_BINS as f64) as usize).min(DENSITY_BINS - 1);
    for p in points {
        let ix = bin(frame.x.unit(p.x));
        let iy = bin(frame.y.unit(p.y));
        grid[ix + 1][iy + 1] += 1.0;
    }
    grid
}

/// Evenly spaced levels strictly between zero and the peak count
fn contour_levels(grid: &[Vec<f64>]) -> Vec<f64> {
    let peak = grid.iter().flatten().copied().fold(0.0, f64::max);
    if peak <= 0.0 {
        return Vec::new();
    }
    let count = MAX_CONTOUR_LEVELS.min(peak as usize).max(1);
    (1..=count)
        .map(|k| peak * k as f64 / (count + 1) as f64)
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Bottom,
    Right,
    Top,
    Left,
}

/// Marching squares over `grid` at `level`. Segment ends are in grid units.
fn contour_segments(grid: &[Vec<f64>], level: f64) -> Vec<[(f64, f64); 2]> {
    use Edge::*;

    let mut segments = Vec::new();
    for ix in 0..grid.len().saturating_sub(1) {
        for iy in 0..grid[ix].len().saturating_sub(1) {
            let a = grid[ix][iy];
            let b = grid[ix + 1][iy];
            let c = grid[ix + 1][iy + 1];
            let d = grid[ix][iy + 1];

            let case = (a >= level) as u8
                | ((b >= level) as u8) << 1
                | ((c >= level) as u8) << 2
                | ((d >= level) as u8) << 3;

            let pairs: &[(Edge, Edge)] = match case {
                1 | 14 => &[(Left, Bottom)],
                2 | 13 => &[(Bottom, Right)],
                3 | 12 => &[(Left, Right)],
                4 | 11 => &[(Right, Top)],
                5 => &[(Left, Bottom), (Right, Top)],
                6 | 9 => &[(Bottom, Top)],
                7 | 8 => &[(Left, Top)],
                10 => &[(Bottom, Right), (Left, Top)],
                _ => &[],
            };

            let (x0, y0) = (ix as f64, iy as f64);
            let cross = |v1: f64, v2: f64| {
                if v2 == v1 {
                    0.5
                } else {
                    (level - v1) / (v2 - v1)
                }
            };
            let point = |edge: Edge| match edge {
                Bottom => (x0 + cross(a, b), y0),
                Right => (x0 + 1.0, y0 + cross(b, c)),
                Top => (x0 + cross(d, c), y0 + 1.0),
                Left => (x0, y0 + cross(a, d)),
            };

            for &(from, to) in pairs {
                segments.push([point(from), point(to)]);
            }
        }
    }
    segments
}

fn write_contours(svg: &mut String, points: &[PlotPoint], frame: &Frame) {
    let grid = density_grid(points, frame);
    let levels = contour_levels(&grid);
    let bin_w = frame.x.span() / DENSITY_BINS as f64;
    let bin_h = frame.y.span() / DENSITY_BINS as f64;
    // Padded node k sits at the centre of bin k-1
    let to_px = |(gx, gy): (f64, f64)| {
        (
            frame.px(frame.x.min + (gx - 0.5) * bin_w),
            frame.py(frame.y.min + (gy - 0.5) * bin_h),
        )
    };

    svg.push_str("<g class=\"density\" clip-path=\"url(#plot-area)\" fill=\"none\">\n");
    for (i, level) in levels.iter().enumerate() {
        let segments = contour_segments(&grid, *level);
        if segments.is_empty() {
            continue;
        }
        let mut d = String::new();
        for [from, to] in segments {
            let (x1, y1) = to_px(from);
            let (x2, y2) = to_px(to);
            let _ = write!(d, "M{:.1} {:.1}L{:.1} {:.1}", x1, y1, x2, y2);
        }
        let opacity = 0.35 + 0.65 * (i + 1) as f64 / levels.len() as f64;
        let _ = writeln!(
            svg,
            "<path d=\"{}\" stroke=\"{}\" stroke-opacity=\"{:.2}\" stroke-width=\"1.2\"/>",
            d, CONTOUR_COLOR, opacity
        );
    }
    svg.push_str("</g>\n");
}

fn write_axes(svg: &mut String, frame: &Frame) {
    let left = MARGIN_LEFT;
    let top = MARGIN_TOP;
    let right = WIDTH - MARGIN_RIGHT;
    let bottom = HEIGHT - MARGIN_BOTTOM;

    let _ = writeln!(
        svg,
        "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"white\" stroke=\"#cccccc\"/>",
        left,
        top,
        Frame::plot_width(),
        Frame::plot_height()
    );

    svg.push_str("<g class=\"ticks\" font-size=\"11\" fill=\"#444444\">\n");
    for k in 0..TICKS {
        let t = k as f64 / (TICKS - 1) as f64;
        let xv = frame.x.min + t * frame.x.span();
        let yv = frame.y.min + t * frame.y.span();
        let (x, y) = (frame.px(xv), frame.py(yv));
        let _ = writeln!(
            svg,
            "<line x1=\"{x:.1}\" y1=\"{top:.1}\" x2=\"{x:.1}\" y2=\"{bottom:.1}\" stroke=\"#eeeeee\"/>\
             <text x=\"{x:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{xv:.1}</text>",
            bottom + 16.0
        );
        let _ = writeln!(
            svg,
            "<line x1=\"{left:.1}\" y1=\"{y:.1}\" x2=\"{right:.1}\" y2=\"{y:.1}\" stroke=\"#eeeeee\"/>\
             <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{yv:.1}</text>",
            left - 6.0,
            y + 4.0
        );
    }
    svg.push_str("</g>\n");

    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"13\">Dim 1</text>",
        left + Frame::plot_width() / 2.0,
        HEIGHT - 16.0
    );
    let _ = writeln!(
        svg,
        "<text x=\"18\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"13\" \
         transform=\"rotate(-90 18 {:.1})\">Dim 2</text>",
        top + Frame::plot_height() / 2.0,
        top + Frame::plot_height() / 2.0
    );
    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"32\" text-anchor=\"middle\" font-size=\"18\">{}</text>",
        WIDTH / 2.0,
        PLOT_TITLE
    );
}

fn write_points(svg: &mut String, points: &[PlotPoint], frame: &Frame) {
    let _ = writeln!(
        svg,
        "<g class=\"points\" clip-path=\"url(#plot-area)\" fill=\"{}\" fill-opacity=\"{}\">",
        POINT_COLOR, POINT_OPACITY
    );
    for p in points {
        let _ = writeln!(
            svg,
            "<circle class=\"memory\" cx=\"{:.2}\" cy=\"{:.2}\" r=\"4\" data-c=\"{}\" data-t=\"{}\"/>",
            frame.px(p.x),
            frame.py(p.y),
            escape_xml(&p.content),
            escape_xml(&hover_time(&p.timestamp))
        );
    }
    svg.push_str("</g>\n");
}

/// The inline SVG figure
pub fn render_svg(points: &[PlotPoint]) -> String {
    let frame = Frame {
        x: Range::of(points.iter().map(|p| p.x)),
        y: Range::of(points.iter().map(|p| p.y)),
    };

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg id=\"memory-plot\" xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {w} {h}\" \
         width=\"100%\" height=\"95vh\" font-family=\"sans-serif\">",
        w = WIDTH,
        h = HEIGHT
    );
    let _ = writeln!(
        svg,
        "<defs><clipPath id=\"plot-area\"><rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\"/></clipPath></defs>",
        MARGIN_LEFT,
        MARGIN_TOP,
        Frame::plot_width(),
        Frame::plot_height()
    );
    write_axes(&mut svg, &frame);
    write_contours(&mut svg, points, &frame);
    write_points(&mut svg, points, &frame);
    svg.push_str("</svg>\n");
    svg
}

const VIEWER_STYLE: &str = r#"<style>
body { margin: 0; background: white; }
#tip { position: absolute; display: none; max-width: 420px; padding: 6px 8px;
       background: rgba(255,255,255,0.95); border: 1px solid #999; font: 12px sans-serif;
       pointer-events: none; white-space: pre-wrap; }
circle.memory:hover { fill: #4A90E2; fill-opacity: 1; }
</style>"#;

const VIEWER_SCRIPT: &str = r#"<script>
(function () {
  var svg = document.getElementById("memory-plot");
  var tip = document.getElementById("tip");
  svg.querySelectorAll("circle.memory").forEach(function (dot) {
    dot.addEventListener("mouseenter", function () {
      tip.textContent = "";
      var title = document.createElement("b");
      title.textContent = dot.getAttribute("data-c");
      tip.appendChild(title);
      tip.appendChild(document.createElement("br"));
      tip.appendChild(document.createTextNode(dot.getAttribute("data-t")));
      tip.style.display = "block";
    });
    dot.addEventListener("mousemove", function (e) {
      tip.style.left = (e.pageX + 12) + "px";
      tip.style.top = (e.pageY + 12) + "px";
    });
    dot.addEventListener("mouseleave", function () {
      tip.style.display = "none";
    });
  });

  var view = svg.viewBox.baseVal;
  var home = [view.x, view.y, view.width, view.height];
  var drag = null;
  svg.addEventListener("wheel", function (e) {
    e.preventDefault();
    var k = e.deltaY < 0 ? 0.9 : 1.1;
    var r = svg.getBoundingClientRect();
    var mx = view.x + (e.clientX - r.left) / r.width * view.width;
    var my = view.y + (e.clientY - r.top) / r.height * view.height;
    view.x = mx - (mx - view.x) * k;
    view.y = my - (my - view.y) * k;
    view.width *= k;
    view.height *= k;
  }, { passive: false });
  svg.addEventListener("pointerdown", function (e) {
    drag = { x: e.clientX, y: e.clientY };
  });
  svg.addEventListener("pointermove", function (e) {
    if (!drag) return;
    var r = svg.getBoundingClientRect();
    view.x -= (e.clientX - drag.x) / r.width * view.width;
    view.y -= (e.clientY - drag.y) / r.height * view.height;
    drag = { x: e.clientX, y: e.clientY };
  });
  window.addEventListener("pointerup", function () {
    drag = null;
  });
  svg.addEventListener("dblclick", function () {
    view.x = home[0]; view.y = home[1]; view.width = home[2]; view.height = home[3];
  });
})();
</script>"#;

/// Standalone HTML document with the figure and its viewer inlined
pub fn render_html(points: &[PlotPoint]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>{}</title>", PLOT_TITLE);
    html.push_str(VIEWER_STYLE);
    html.push_str("\n</head>\n<body>\n");
    html.push_str(&render_svg(points));
    html.push_str("<div id=\"tip\"></div>\n");
    html.push_str(VIEWER_SCRIPT);
    html.push_str("\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64, content: &str) -> PlotPoint {
        PlotPoint {
            x,
            y,
            content: content.to_string(),
            timestamp: "2024-03-05T14:07:09.123456".to_string(),
        }
    }

    fn cluster(cx: f64, cy: f64, n: usize) -> Vec<PlotPoint> {
        (0..n)
            .map(|i| {
                let t = i as f64 * 0.7;
                point(cx + t.cos() * 0.3, cy + t.sin() * 0.3, "m")
            })
            .collect()
    }

    #[test]
    fn test_one_marker_per_point() {
        let points = cluster(0.0, 0.0, 12);
        let svg = render_svg(&points);
        assert_eq!(svg.matches("<circle class=\"memory\"").count(), 12);
        assert!(svg.contains(PLOT_TITLE));
        assert!(svg.contains(">Dim 1<"));
        assert!(svg.contains(">Dim 2<"));
    }

    #[test]
    fn test_document_has_no_external_resources() {
        let mut points = cluster(-5.0, 0.0, 20);
        points.extend(cluster(5.0, 3.0, 20));
        let html = render_html(&points);

        assert!(!html.contains("src="));
        assert!(!html.contains("href=\"http"));
        assert!(!html.contains("@import"));
        assert!(html.contains("<svg"));
        assert!(html.contains("addEventListener"));
    }

    #[test]
    fn test_hover_text_is_escaped() {
        let html = render_html(&[point(0.0, 0.0, "bad \"</script><script>alert(1)")]);
        assert_eq!(html.matches("<script>").count(), 1);
        assert_eq!(html.matches("</script>").count(), 1);
        assert!(html.contains("data-c=\"bad &quot;&lt;/script&gt;&lt;script&gt;alert(1)\""));
        assert!(html.contains("data-t=\"2024-03-05 14:07:09\""));
    }

    #[test]
    fn test_hover_time_falls_back_to_raw() {
        assert_eq!(hover_time("yesterday"), "yesterday");
    }

    #[test]
    fn test_dense_regions_get_contours() {
        let mut points = cluster(-5.0, 0.0, 25);
        points.extend(cluster(5.0, 3.0, 25));
        let svg = render_svg(&points);
        assert!(svg.contains(&format!("stroke=\"{}\"", CONTOUR_COLOR)));
    }

    #[test]
    fn test_contour_encloses_single_peak() {
        let mut grid = vec![vec![0.0; 3]; 3];
        grid[1][1] = 4.0;
        let segments = contour_segments(&grid, 2.0);
        assert_eq!(segments.len(), 4);
        for [a, b] in segments {
            for (x, y) in [a, b] {
                assert!((0.5..=1.5).contains(&x));
                assert!((0.5..=1.5).contains(&y));
            }
        }
    }

    #[test]
    fn test_levels_sit_below_peak() {
        let mut grid = vec![vec![0.0; 4]; 4];
        grid[2][2] = 20.0;
        let levels = contour_levels(&grid);
        assert_eq!(levels.len(), MAX_CONTOUR_LEVELS);
        assert!(levels.iter().all(|l| *l > 0.0 && *l < 20.0));
        assert!(contour_levels(&vec![vec![0.0; 4]; 4]).is_empty());
    }

    #[test]
    fn test_single_point_layout() {
        let svg = render_svg(&[point(0.0, 0.0, "only")]);
        assert_eq!(svg.matches("<circle class=\"memory\"").count(), 1);
        assert!(!svg.contains("NaN"));
    }
}
