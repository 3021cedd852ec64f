//! @acp:module "Text Tables"
//! @acp:summary "Aligned plain-text tables for human-oriented output"
//! @acp:domain cli
//! @acp:layer presentation

use console::measure_text_width;

/// Column separator width
const GAP: usize = 2;

/// Render headers and rows as an aligned table
///
/// Widths use terminal display width, so CJK text lines up. Missing cells
/// render empty; cells past the header count are ignored.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| measure_text_width(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(measure_text_width(cell));
        }
    }

    let mut out = String::new();
    let header_cells: Vec<&str> = headers.to_vec();
    push_row(&mut out, &header_cells, &widths);

    let total = widths.iter().sum::<usize>() + GAP * (widths.len() - 1);
    out.push_str(&"─".repeat(total));
    out.push('\n');

    for row in rows {
        let cells: Vec<&str> = (0..headers.len())
            .map(|i| row.get(i).map(String::as_str).unwrap_or(""))
            .collect();
        push_row(&mut out, &cells, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[&str], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| pad_right(cell, *width))
        .collect();
    out.push_str(line.join(&" ".repeat(GAP)).trim_end());
    out.push('\n');
}

fn pad_right(s: &str, width: usize) -> String {
    let w = measure_text_width(s);
    if w >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table_alignment() {
        let rows = vec![
            vec!["directory".to_string(), "/pg/data".to_string()],
            vec!["service".to_string(), "postgresql".to_string()],
        ];
        let table = render_table(&["Type", "Name"], &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Type       Name");
        assert_eq!(lines[1], "─".repeat(9 + 2 + 10));
        assert_eq!(lines[2], "directory  /pg/data");
        assert_eq!(lines[3], "service    postgresql");
    }

    #[test]
    fn test_render_table_wide_chars_and_short_rows() {
        let rows = vec![vec!["数据".to_string()]];
        let table = render_table(&["A", "B"], &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "A     B");
        assert_eq!(lines[2], "数据");
    }

    #[test]
    fn test_render_table_without_headers() {
        assert_eq!(render_table(&[], &[]), "");
    }
}
