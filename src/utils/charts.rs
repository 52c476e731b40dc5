//! SVG Chart Generator
//!
//! Generates standalone SVG charts for training curves and confusion
//! matrices. SVG keeps the output dependency-free and viewable in any browser.

use std::fs;
use std::path::Path;

/// Chart styling constants
const PANEL_WIDTH: f64 = 600.0;
const PANEL_HEIGHT: f64 = 420.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 70.0;
const MARGIN_LEFT: f64 = 80.0;

pub const COLOR_PRIMARY: &str = "#3498db";
pub const COLOR_SECONDARY: &str = "#e67e22";
pub const COLOR_MARKER: &str = "#e74c3c";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// A data point for a line chart
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// A data series for charts
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

impl DataSeries {
    /// Series over epoch indices `0..values.len()`
    pub fn from_values(name: &str, values: &[f64], color: &str) -> Self {
        Self {
            name: name.to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &y)| DataPoint { x: i as f64, y })
                .collect(),
            color: color.to_string(),
        }
    }
}

/// Dashed vertical line with a legend entry
#[derive(Debug, Clone)]
pub struct VerticalMarker {
    pub x: f64,
    pub label: String,
}

/// One line-chart panel
#[derive(Debug, Clone)]
pub struct LinePanel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<DataSeries>,
    pub marker: Option<VerticalMarker>,
}

/// Generate a row of line-chart panels in a single SVG file
pub fn generate_line_panels(panels: &[LinePanel], output_path: &Path) -> std::io::Result<()> {
    let width = PANEL_WIDTH * panels.len().max(1) as f64;

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        width, PANEL_HEIGHT, width, PANEL_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        width, PANEL_HEIGHT
    ));

    for (i, panel) in panels.iter().enumerate() {
        render_line_panel(&mut svg, i as f64 * PANEL_WIDTH, panel);
    }

    svg.push_str("</svg>");
    fs::write(output_path, svg)
}

fn render_line_panel(svg: &mut String, offset_x: f64, panel: &LinePanel) {
    let plot_width = PANEL_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = PANEL_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let left = offset_x + MARGIN_LEFT;

    let (x_min, x_max, y_min, y_max) = find_ranges(&panel.series);
    let (y_min, y_max) = padded_range(y_min, y_max);
    let x_span = if x_max > x_min { x_max - x_min } else { 1.0 };

    let to_x = |x: f64| left + ((x - x_min) / x_span) * plot_width;
    let to_y = |y: f64| MARGIN_TOP + plot_height - ((y - y_min) / (y_max - y_min)) * plot_height;

    // Title
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="16" font-weight="bold" fill="{}">{}</text>"#,
        left + plot_width / 2.0, COLOR_TEXT, escape_xml(&panel.title)
    ));

    // Grid lines
    for i in 0..=5 {
        let value = y_min + (i as f64 / 5.0) * (y_max - y_min);
        let y = to_y(value);
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            left, y, left + plot_width, y, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.2}</text>"#,
            left - 8.0, y + 4.0, COLOR_TEXT, value
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        left, MARGIN_TOP + plot_height, left + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        left, MARGIN_TOP, left, MARGIN_TOP + plot_height, COLOR_AXIS
    ));

    // Axis labels
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="13" fill="{}">{}</text>"#,
        left + plot_width / 2.0, PANEL_HEIGHT - 20.0, COLOR_TEXT, escape_xml(&panel.x_label)
    ));
    let label_x = offset_x + 20.0;
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="13" fill="{}" transform="rotate(-90 {} {})">{}</text>"#,
        label_x, PANEL_HEIGHT / 2.0, COLOR_TEXT, label_x, PANEL_HEIGHT / 2.0, escape_xml(&panel.y_label)
    ));

    // X-axis ticks (epochs)
    if let Some(first) = panel.series.first() {
        for point in &first.points {
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="10" fill="{}">{:.0}</text>"#,
                to_x(point.x), MARGIN_TOP + plot_height + 18.0, COLOR_TEXT, point.x
            ));
        }
    }

    for series in &panel.series {
        if series.points.is_empty() {
            continue;
        }

        let mut path = String::new();
        for (i, point) in series.points.iter().enumerate() {
            let cmd = if i == 0 { "M" } else { " L" };
            path.push_str(&format!("{} {} {}", cmd, to_x(point.x), to_y(point.y)));
        }
        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="2.5"/>"#,
            path, series.color
        ));

        for point in &series.points {
            svg.push_str(&format!(
                r#"<circle cx="{}" cy="{}" r="4" fill="{}" stroke="white" stroke-width="1.5"/>"#,
                to_x(point.x), to_y(point.y), series.color
            ));
        }
    }

    if let Some(marker) = &panel.marker {
        let x = to_x(marker.x);
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2" stroke-dasharray="6,4"/>"#,
            x, MARGIN_TOP, x, MARGIN_TOP + plot_height, COLOR_MARKER
        ));
    }

    // Legend
    let legend_x = left + plot_width - 170.0;
    let mut legend_y = MARGIN_TOP + 8.0;
    for series in &panel.series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="14" height="14" fill="{}"/>"#,
            legend_x, legend_y, series.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
            legend_x + 20.0, legend_y + 11.0, COLOR_TEXT, escape_xml(&series.name)
        ));
        legend_y += 20.0;
    }
    if let Some(marker) = &panel.marker {
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2" stroke-dasharray="6,4"/>"#,
            legend_x, legend_y + 7.0, legend_x + 14.0, legend_y + 7.0, COLOR_MARKER
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
            legend_x + 20.0, legend_y + 11.0, COLOR_TEXT, escape_xml(&marker.label)
        ));
    }
}

/// Generate an annotated heatmap (e.g. a confusion matrix)
///
/// `values` is row-major with `row_labels.len()` rows and `col_labels.len()` columns.
pub fn generate_heatmap(
    title: &str,
    x_label: &str,
    y_label: &str,
    row_labels: &[String],
    col_labels: &[String],
    values: &[usize],
    output_path: &Path,
) -> std::io::Result<()> {
    let rows = row_labels.len();
    let cols = col_labels.len();
    let cell = 80.0;
    let left = 160.0;
    let top = 70.0;
    let width = left + cols as f64 * cell + 40.0;
    let height = top + rows as f64 * cell + 110.0;

    let max_value = values.iter().copied().max().unwrap_or(0).max(1) as f64;

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        width, height, width, height
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        width, height
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        width / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    for row in 0..rows {
        for col in 0..cols {
            let value = values.get(row * cols + col).copied().unwrap_or(0);
            let intensity = value as f64 / max_value;
            let x = left + col as f64 * cell;
            let y = top + row as f64 * cell;
            let text_color = if intensity > 0.5 { "white" } else { COLOR_TEXT };

            svg.push_str(&format!(
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" stroke="white" stroke-width="1"/>"#,
                x, y, cell, cell, blues(intensity)
            ));
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
                x + cell / 2.0, y + cell / 2.0 + 5.0, text_color, value
            ));
        }

        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            left - 8.0, top + row as f64 * cell + cell / 2.0 + 4.0, COLOR_TEXT, escape_xml(&row_labels[row])
        ));
    }

    let tick_y = top + rows as f64 * cell + 14.0;
    for (col, label) in col_labels.iter().enumerate() {
        let x = left + col as f64 * cell + cell / 2.0;
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}" transform="rotate(-35 {} {})">{}</text>"#,
            x, tick_y, COLOR_TEXT, x, tick_y, escape_xml(label)
        ));
    }

    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        left + cols as f64 * cell / 2.0, height - 15.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        top + rows as f64 * cell / 2.0, COLOR_TEXT, top + rows as f64 * cell / 2.0, escape_xml(y_label)
    ));

    svg.push_str("</svg>");
    fs::write(output_path, svg)
}

/// White-to-blue colour ramp for `intensity` in [0, 1]
fn blues(intensity: f64) -> String {
    let t = intensity.clamp(0.0, 1.0);
    let lerp = |from: f64, to: f64| (from + (to - from) * t).round() as u8;
    format!("#{:02x}{:02x}{:02x}", lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0))
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for s in series {
        for p in &s.points {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    if !x_min.is_finite() {
        return (0.0, 1.0, 0.0, 1.0);
    }

    (x_min, x_max, y_min, y_max)
}

/// Y range starting at zero when all values are non-negative, with headroom
fn padded_range(y_min: f64, y_max: f64) -> (f64, f64) {
    let low = if y_min >= 0.0 { 0.0 } else { y_min * 1.1 };
    let high = if y_max > low { y_max * 1.05 } else { low + 1.0 };
    (low, high)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_line_panels_with_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curves.svg");

        let panel = LinePanel {
            title: "Model Accuracy".to_string(),
            x_label: "Epoch".to_string(),
            y_label: "Accuracy".to_string(),
            series: vec![
                DataSeries::from_values("Training Accuracy", &[0.5, 0.7, 0.8], COLOR_PRIMARY),
                DataSeries::from_values("Validation Accuracy", &[0.4, 0.6, 0.75], COLOR_SECONDARY),
            ],
            marker: Some(VerticalMarker {
                x: 1.0,
                label: "Fine-tuning starts".to_string(),
            }),
        };

        generate_line_panels(&[panel.clone(), panel], &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Fine-tuning starts"));
        assert!(svg.contains("stroke-dasharray"));
    }

    #[test]
    fn test_heatmap_annotates_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cm.svg");
        let labels = vec!["a&b".to_string(), "c".to_string()];

        generate_heatmap("Confusion Matrix", "Predicted", "True", &labels, &labels, &[3, 1, 0, 7], &path)
            .unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains(">7<"));
        assert!(svg.contains("a&amp;b"));
    }

    #[test]
    fn test_blues_ramp_endpoints() {
        assert_eq!(blues(0.0), "#f7fbff");
        assert_eq!(blues(1.0), "#08306b");
    }

    #[test]
    fn test_empty_series_range() {
        assert_eq!(find_ranges(&[]), (0.0, 1.0, 0.0, 1.0));
    }
}
