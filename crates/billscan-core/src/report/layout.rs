//! Text measurement and table layout with Helvetica metrics.

/// Millimetres per PDF point.
pub const MM_PER_PT: f32 = 25.4 / 72.0;

/// Body font size in points.
pub const BODY_FONT_SIZE: f32 = 10.0;

/// Height of one wrapped text line, in millimetres.
pub const LINE_HEIGHT: f32 = 5.0;

/// Summary table column widths, in millimetres.
pub const COLUMN_WIDTHS: [f32; 6] = [15.0, 50.0, 42.0, 25.0, 30.0, 30.0];

/// Horizontal padding subtracted from a column before wrapping.
pub const CELL_PADDING: f32 = 2.0;

/// Helvetica advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Width used for characters outside the table.
const DEFAULT_WIDTH: u16 = 556;

fn char_width(c: char) -> u16 {
    match c as u32 {
        code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize],
        _ => DEFAULT_WIDTH,
    }
}

/// Rendered width of `text` in millimetres at `font_size` points.
pub fn string_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(char_width(c))).sum();
    units as f32 / 1000.0 * font_size * MM_PER_PT
}

/// Greedily word-wrap `text` into lines no wider than `width` millimetres.
///
/// Words are never split: a word wider than `width` sits on its own line.
/// Explicit newlines start a new line; blank lines are dropped. Text with
/// no words yields a single empty line.
pub fn wrap_text(text: &str, width: f32, font_size: f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{} {}", current, word);
            if string_width(&candidate, font_size) <= width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// A summary-table body row after wrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedRow {
    /// Wrapped lines per column.
    pub cells: Vec<Vec<String>>,
    /// Row height in millimetres.
    pub height: f32,
}

/// Wrap each cell to its column and size the row by its tallest cell.
pub fn layout_row(cells: &[String]) -> WrappedRow {
    let cells: Vec<Vec<String>> = cells
        .iter()
        .zip(COLUMN_WIDTHS)
        .map(|(cell, width)| wrap_text(cell, width - CELL_PADDING, BODY_FONT_SIZE))
        .collect();
    let max_lines = cells.iter().map(Vec::len).max().unwrap_or(1);

    WrappedRow {
        height: LINE_HEIGHT * max_lines as f32,
        cells,
    }
}
