// src/tables.rs
//
// Column-aligned table detection over extracted PDF text. PDF text
// extraction flattens table cells into runs of spaces; this module
// reconstructs them as header + rows and renders each row as
// "header: value" pairs so the LLM sees the table structure instead of a
// soup of numbers.

use regex::Regex;

/// A detected table: first candidate row is the header.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Minimum consecutive multi-column lines to treat a run as a table
/// (header plus at least one data row).
const MIN_TABLE_LINES: usize = 2;

/// Split a line into cells on runs of 2+ spaces. Returns None unless the
/// line has at least two non-empty cells.
fn split_cells(line: &str, sep: &Regex) -> Option<Vec<String>> {
    let cells: Vec<String> = sep
        .split(line.trim())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if cells.len() >= 2 { Some(cells) } else { None }
}

/// Scan text for runs of consecutive lines with a matching column count.
pub fn detect_tables(text: &str) -> Vec<Table> {
    let sep = Regex::new(r"\s{2,}|\t").unwrap();
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    let mut flush = |run: &mut Vec<Vec<String>>| {
        if run.len() >= MIN_TABLE_LINES {
            let headers = run[0].clone();
            let rows = run[1..].to_vec();
            tables.push(Table { headers, rows });
        }
        run.clear();
    };

    for line in text.lines() {
        match split_cells(line, &sep) {
            Some(cells) => {
                // A new run starts whenever the column count changes.
                if let Some(first) = run.first() {
                    if first.len() != cells.len() {
                        flush(&mut run);
                    }
                }
                run.push(cells);
            }
            None => flush(&mut run),
        }
    }
    flush(&mut run);

    tables
}

/// Render tables as structured text for the LLM prompt: one line per row,
/// each cell labelled with its column header.
pub fn format_tables_for_prompt(tables: &[Table]) -> String {
    let mut out = String::new();
    for (i, table) in tables.iter().enumerate() {
        out.push_str(&format!("=== Table {} ===\n", i + 1));
        for row in &table.rows {
            let pairs: Vec<String> = table
                .headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| format!("{h}: {v}"))
                .collect();
            out.push_str(&pairs.join(", "));
            out.push('\n');
        }
    }
    out
}

/// Append a rendered-tables section to extracted document text, when any
/// tables were detected.
pub fn annotate_with_tables(text: &str) -> String {
    let tables = detect_tables(text);
    if tables.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 256);
    out.push_str(text);
    out.push_str("\n\n=== EXTRACTED TABLES ===\n");
    out.push_str(&format_tables_for_prompt(&tables));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_aligned_table() {
        let text = "\
INVOICE

Description          Qty    Unit Price    Amount
GAME CONSOLE PS5     100    499.00        49900.00
CONTROLLER NS        250    59.00         14750.00

Thank you for your business.";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(
            tables[0].headers,
            vec!["Description", "Qty", "Unit Price", "Amount"]
        );
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[0][1], "100");
    }

    #[test]
    fn test_prose_is_not_a_table() {
        let text = "This invoice covers the shipment of goods.\nPlease remit payment within 30 days.\n";
        assert!(detect_tables(text).is_empty());
    }

    #[test]
    fn test_column_count_change_splits_runs() {
        let text = "\
A    B
1    2
X    Y    Z
p    q    r";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].headers.len(), 2);
        assert_eq!(tables[1].headers.len(), 3);
    }

    #[test]
    fn test_header_only_run_is_discarded() {
        let text = "Col1    Col2\n\nNo data rows followed.";
        assert!(detect_tables(text).is_empty());
    }

    #[test]
    fn test_format_tables_for_prompt() {
        let table = Table {
            headers: vec!["Carton".into(), "Qty".into()],
            rows: vec![vec!["1-6".into(), "120".into()]],
        };
        let rendered = format_tables_for_prompt(&[table]);
        assert!(rendered.contains("=== Table 1 ==="));
        assert!(rendered.contains("Carton: 1-6, Qty: 120"));
    }

    #[test]
    fn test_annotate_passthrough_without_tables() {
        let text = "Plain paragraph.";
        assert_eq!(annotate_with_tables(text), text);
    }

    #[test]
    fn test_annotate_appends_section() {
        let text = "Item    Qty\nCable    4";
        let out = annotate_with_tables(text);
        assert!(out.starts_with(text));
        assert!(out.contains("=== EXTRACTED TABLES ==="));
        assert!(out.contains("Item: Cable, Qty: 4"));
    }
}
