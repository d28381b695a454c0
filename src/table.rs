//! Aligned plain-text tables for the inspection subcommands.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::transform::string_ops::leading_chars;

/// Cells longer than this are cut and marked with an ellipsis.
pub const MAX_CELL_WIDTH: usize = 48;
const MIN_COLUMN_WIDTH: usize = 3;

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let cells = rows
        .iter()
        .map(|row| {
            (0..headers.len())
                .map(|idx| fit_cell(row.get(idx).map(String::as_str).unwrap_or_default()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut widths = headers
        .iter()
        .map(|h| h.chars().count().max(MIN_COLUMN_WIDTH))
        .collect::<Vec<_>>();
    for row in &cells {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers.iter().copied(), &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(separator.iter().map(String::as_str), &widths));
    for row in &cells {
        let _ = writeln!(output, "{}", format_row(row.iter().map(|c| &**c), &widths));
    }
    output
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let line = values
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(value.chars().count());
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

/// Flattens control whitespace and truncates to [`MAX_CELL_WIDTH`] characters.
fn fit_cell(value: &str) -> Cow<'_, str> {
    let flattened: Cow<'_, str> = if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    };
    if flattened.chars().count() <= MAX_CELL_WIDTH {
        return flattened;
    }
    Cow::Owned(format!("{}…", leading_chars(&flattened, MAX_CELL_WIDTH - 1)))
}
