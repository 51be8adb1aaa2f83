//! Vector charts drawn straight into report pages.

use std::f32::consts::PI;

use rust_decimal::prelude::ToPrimitive;

use super::aggregate::SeriesPoint;
use super::document::{Align, Font, Page, Rgb};
use super::layout::string_width;

const TITLE_SIZE: f32 = 12.0;
const LABEL_SIZE: f32 = 8.0;
const BLACK: Rgb = (0.0, 0.0, 0.0);
const WHITE: Rgb = (1.0, 1.0, 1.0);
const GRID: Rgb = (0.85, 0.85, 0.85);

/// Categorical palette for pie slices.
const PALETTE: [(u8, u8, u8); 10] = [
    (31, 119, 180),
    (255, 127, 14),
    (44, 160, 44),
    (214, 39, 40),
    (148, 103, 189),
    (140, 86, 75),
    (227, 119, 194),
    (127, 127, 127),
    (188, 189, 34),
    (23, 190, 207),
];

/// Stops of the sequential palette used for bars.
const VIRIDIS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

fn rgb((r, g, b): (u8, u8, u8)) -> Rgb {
    (f32::from(r) / 255.0, f32::from(g) / 255.0, f32::from(b) / 255.0)
}

fn palette(index: usize) -> Rgb {
    rgb(PALETTE[index % PALETTE.len()])
}

/// Sequential colour for position `t` in `0.0..=1.0`.
fn viridis(t: f32) -> Rgb {
    let scaled = t.clamp(0.0, 1.0) * (VIRIDIS.len() - 1) as f32;
    let i = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let f = scaled - i as f32;
    let (a, b) = (rgb(VIRIDIS[i]), rgb(VIRIDIS[i + 1]));
    (a.0 + (b.0 - a.0) * f, a.1 + (b.1 - a.1) * f, a.2 + (b.2 - a.2) * f)
}

/// Box a chart is drawn into, in page millimetres.
#[derive(Debug, Clone, Copy)]
pub struct ChartArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

fn value(point: &SeriesPoint) -> f32 {
    point.value.to_f32().unwrap_or(0.0)
}

fn title(page: &mut Page, area: ChartArea, text: &str) {
    page.set_fill(BLACK);
    page.text_in_box(area.x, area.y, area.width, 8.0, Font::Bold, TITLE_SIZE, Align::Center, text);
}

fn no_data(page: &mut Page, area: ChartArea) {
    page.set_fill(BLACK);
    page.text_in_box(
        area.x,
        area.y + area.height / 2.0,
        area.width,
        8.0,
        Font::Regular,
        LABEL_SIZE,
        Align::Center,
        "No data",
    );
}

/// Point on a circle, angles counter-clockwise from the positive x axis.
fn on_circle(cx: f32, cy: f32, r: f32, angle: f32) -> (f32, f32) {
    (cx + r * angle.cos(), cy - r * angle.sin())
}

/// Append an arc from `start` to `end` (radians, counter-clockwise) as
/// Bézier segments of at most a quarter turn.
fn arc(page: &mut Page, cx: f32, cy: f32, r: f32, start: f32, end: f32) {
    let segments = ((end - start) / (PI / 2.0)).ceil().max(1.0) as usize;
    let step = (end - start) / segments as f32;
    for i in 0..segments {
        let a0 = start + step * i as f32;
        let a1 = a0 + step;
        let k = 4.0 / 3.0 * (step / 4.0).tan();
        let c1 = (
            cx + r * (a0.cos() - k * a0.sin()),
            cy - r * (a0.sin() + k * a0.cos()),
        );
        let c2 = (
            cx + r * (a1.cos() + k * a1.sin()),
            cy - r * (a1.sin() - k * a1.cos()),
        );
        let (x, y) = on_circle(cx, cy, r, a1);
        page.curve_to(c1, c2, x, y);
    }
}

/// Start angle and sweep, in radians, of each positive slice. The first
/// slice starts at 140 degrees and the sweeps add up to a full turn.
fn slice_angles(series: &[SeriesPoint]) -> Vec<(&SeriesPoint, f32, f32)> {
    let positive: Vec<(&SeriesPoint, f32)> = series
        .iter()
        .map(|p| (p, value(p)))
        .filter(|(_, v)| *v > 0.0)
        .collect();
    let total: f32 = positive.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut angle = 140f32.to_radians();
    positive
        .into_iter()
        .map(|(point, v)| {
            let start = angle;
            let sweep = v / total * 2.0 * PI;
            angle += sweep;
            (point, start, sweep)
        })
        .collect()
}

/// Pie chart with percentage labels, first slice starting at 140 degrees.
pub fn pie(page: &mut Page, area: ChartArea, heading: &str, series: &[SeriesPoint]) {
    title(page, area, heading);

    let slices = slice_angles(series);
    if slices.is_empty() {
        no_data(page, area);
        return;
    }

    let cx = area.x + area.width / 2.0;
    let cy = area.y + 10.0 + (area.height - 10.0) / 2.0;
    let r = ((area.height - 10.0) / 2.0 - 10.0).min(area.width / 4.0);

    page.set_stroke(WHITE);
    page.set_line_width(0.3);
    for (i, (point, angle, sweep)) in slices.into_iter().enumerate() {
        page.set_fill(palette(i));
        page.move_to(cx, cy);
        let (sx, sy) = on_circle(cx, cy, r, angle);
        page.line_to(sx, sy);
        arc(page, cx, cy, r, angle, angle + sweep);
        page.close_fill_stroke();

        let mid = angle + sweep / 2.0;
        let label = format!("{} ({:.1}%)", point.label, sweep / (2.0 * PI) * 100.0);
        let (lx, ly) = on_circle(cx, cy, r + 4.0, mid);
        let lx = if mid.cos() < 0.0 {
            lx - string_width(&label, LABEL_SIZE)
        } else {
            lx
        };
        page.set_fill(BLACK);
        page.text(lx, ly + 1.0, Font::Regular, LABEL_SIZE, &label);
    }
    page.set_stroke(BLACK);
}

/// Plot rectangle and vertical scale shared by line and bar charts.
struct Axes {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    max: f32,
}

impl Axes {
    fn new(area: ChartArea, series: &[SeriesPoint]) -> Self {
        let max = series.iter().map(value).fold(0.0f32, f32::max);
        Self {
            left: area.x + 18.0,
            top: area.y + 12.0,
            width: area.width - 22.0,
            height: area.height - 40.0,
            max: if max > 0.0 { max * 1.1 } else { 1.0 },
        }
    }

    fn bottom(&self) -> f32 {
        self.top + self.height
    }

    fn y_of(&self, v: f32) -> f32 {
        self.bottom() - v.max(0.0) / self.max * self.height
    }

    /// Axis lines, horizontal grid, tick labels and the y-axis title.
    fn draw(&self, page: &mut Page, y_label: &str, grid: bool) {
        page.set_line_width(0.2);
        for step in 0..=4 {
            let v = self.max * step as f32 / 4.0;
            let y = self.y_of(v);
            if grid && step > 0 {
                page.set_stroke(GRID);
                page.line(self.left, y, self.left + self.width, y);
            }
            let label = format!("{:.0}", v);
            page.set_fill(BLACK);
            page.text(
                self.left - 1.5 - string_width(&label, LABEL_SIZE),
                y + 1.0,
                Font::Regular,
                LABEL_SIZE,
                &label,
            );
        }
        page.set_stroke(BLACK);
        page.line(self.left, self.top, self.left, self.bottom());
        page.line(self.left, self.bottom(), self.left + self.width, self.bottom());
        page.text_rotated(self.left - 13.0, self.top + self.height / 2.0 + 15.0, 90.0, LABEL_SIZE, y_label);
    }

    /// Category labels under the x axis, rotated 45 degrees.
    fn x_labels(&self, page: &mut Page, centers: &[f32], series: &[SeriesPoint]) {
        page.set_fill(BLACK);
        for (x, point) in centers.iter().zip(series) {
            let width = string_width(&point.label, LABEL_SIZE);
            let run = width * std::f32::consts::FRAC_1_SQRT_2;
            page.text_rotated(x - run, self.bottom() + 3.0 + run, 45.0, LABEL_SIZE, &point.label);
        }
    }
}

/// Line chart with point markers and a light grid.
pub fn line(page: &mut Page, area: ChartArea, heading: &str, y_label: &str, series: &[SeriesPoint]) {
    title(page, area, heading);
    if series.is_empty() {
        no_data(page, area);
        return;
    }

    let axes = Axes::new(area, series);
    axes.draw(page, y_label, true);

    let slot = axes.width / series.len() as f32;
    let centers: Vec<f32> = (0..series.len())
        .map(|i| axes.left + slot * (i as f32 + 0.5))
        .collect();
    let points: Vec<(f32, f32)> = centers
        .iter()
        .zip(series)
        .map(|(x, p)| (*x, axes.y_of(value(p))))
        .collect();

    let color = palette(0);
    page.set_stroke(color);
    page.set_line_width(0.5);
    page.polyline(&points);
    for (x, y) in &points {
        page.fill_rect(x - 0.8, y - 0.8, 1.6, 1.6, color);
    }
    page.set_stroke(BLACK);

    axes.x_labels(page, &centers, series);
}

/// Vertical bar chart, one bar per point.
pub fn bar(page: &mut Page, area: ChartArea, heading: &str, y_label: &str, series: &[SeriesPoint]) {
    title(page, area, heading);
    if series.is_empty() {
        no_data(page, area);
        return;
    }

    let axes = Axes::new(area, series);
    axes.draw(page, y_label, false);

    let slot = axes.width / series.len() as f32;
    let bar_width = slot * 0.8;
    let last = (series.len().max(2) - 1) as f32;
    let mut centers = Vec::with_capacity(series.len());
    for (i, point) in series.iter().enumerate() {
        let center = axes.left + slot * (i as f32 + 0.5);
        let top = axes.y_of(value(point));
        page.fill_rect(
            center - bar_width / 2.0,
            top,
            bar_width,
            axes.bottom() - top,
            viridis(i as f32 / last),
        );
        centers.push(center);
    }

    axes.x_labels(page, &centers, series);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Object;
    use rust_decimal::Decimal;

    fn series(values: &[(&str, i64)]) -> Vec<SeriesPoint> {
        values
            .iter()
            .map(|(label, v)| SeriesPoint {
                label: label.to_string(),
                value: Decimal::from(*v),
            })
            .collect()
    }

    const AREA: ChartArea = ChartArea {
        x: 10.0,
        y: 30.0,
        width: 190.0,
        height: 100.0,
    };

    #[test]
    fn test_viridis_endpoints() {
        assert_eq!(viridis(0.0), rgb(VIRIDIS[0]));
        let end = viridis(1.0);
        let expected = rgb(VIRIDIS[4]);
        assert!((end.0 - expected.0).abs() < 1e-6);
        assert!((end.2 - expected.2).abs() < 1e-6);
    }

    fn count(page: &Page, operator: &str) -> usize {
        page.operations()
            .iter()
            .filter(|op| op.operator == operator)
            .count()
    }

    fn shows_text(page: &Page, text: &str) -> bool {
        page.operations().iter().any(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => op.operator == "Tj" && bytes == text.as_bytes(),
            _ => false,
        })
    }

    #[test]
    fn test_slice_angles_cover_full_turn() {
        let data = series(&[("Food", 120), ("Zero", 0), ("Travel", 80), ("Other", 5)]);

        let slices = slice_angles(&data);

        let labels: Vec<&str> = slices.iter().map(|(p, _, _)| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Food", "Travel", "Other"]);
        assert!((slices[0].1 - 140f32.to_radians()).abs() < 1e-6);
        let total: f32 = slices.iter().map(|(_, _, sweep)| sweep).sum();
        assert!((total - 2.0 * PI).abs() < 1e-4);
        for pair in slices.windows(2) {
            assert!((pair[0].1 + pair[0].2 - pair[1].1).abs() < 1e-5);
        }
        assert!((slices[0].2 / total - 120.0 / 205.0).abs() < 1e-5);
    }

    #[test]
    fn test_pie_fills_one_path_per_slice() {
        let data = series(&[("Food", 120), ("Travel", 80), ("Other", 5)]);
        let mut page = Page::new();

        pie(&mut page, AREA, "Spending by Category", &data);

        assert_eq!(count(&page, "b"), 3);
        assert!(shows_text(&page, "Food (58.5%)"));
        assert!(!shows_text(&page, "No data"));
    }

    #[test]
    fn test_bar_draws_one_bar_per_point() {
        let data = series(&[("Cafe", 120), ("Metro", 80), ("Uber", 5), ("Zomato", 40)]);
        let mut page = Page::new();

        bar(&mut page, AREA, "Spending by Store", "Total", &data);

        assert_eq!(count(&page, "re"), data.len());
        assert_eq!(count(&page, "f"), data.len());
        assert!(shows_text(&page, "Zomato"));
    }

    #[test]
    fn test_line_marks_every_point() {
        let data = series(&[("05/03/2024", 120), ("06/03/2024", 80)]);
        let mut page = Page::new();

        line(&mut page, AREA, "Spending Trends Over Time", "Total", &data);

        assert_eq!(count(&page, "re"), 2);
        assert!(shows_text(&page, "06/03/2024"));
    }

    #[test]
    fn test_empty_series() {
        let mut page = Page::new();
        pie(&mut page, AREA, "Spending by Category", &[]);
        line(&mut page, AREA, "Spending Trends Over Time", "Total", &[]);
        bar(&mut page, AREA, "Spending by Store", "Total", &[]);

        assert_eq!(count(&page, "b"), 0);
        assert_eq!(count(&page, "re"), 0);
        assert!(shows_text(&page, "No data"));

        let mut zero = Page::new();
        pie(&mut zero, AREA, "Spending by Category", &series(&[("Zero", 0)]));
        assert!(shows_text(&zero, "No data"));
    }
}
