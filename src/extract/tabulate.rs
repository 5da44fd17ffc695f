//! Plain-text table rendering for the tabular projection
//!
//! Output writers (CSV, spreadsheets) live outside this crate; this renderer
//! exists for the CLI's default human-readable view.

use serde_json::{Map, Value};

/// Render rows as an aligned text table with a header line.
pub fn render_table(columns: &[String], rows: &[Map<String, Value>]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let text = cell(row.get(column).unwrap_or(&Value::Null));
                    widths[i] = widths[i].max(text.chars().count());
                    text
                })
                .collect()
        })
        .collect();

    let mut out = String::new();
    push_line(&mut out, columns, &widths);
    let separators: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &separators, &widths);
    for row in &rendered {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aligns_columns_and_renders_null_as_empty() {
        let columns = vec!["name".to_string(), "memory".to_string()];
        let rows = vec![
            serde_json::from_value(json!({"name": "vm-with-long-name", "memory": 4.0})).unwrap(),
            serde_json::from_value(json!({"name": "vm2", "memory": null})).unwrap(),
        ];

        let table = render_table(&columns, &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "name               memory");
        assert_eq!(lines[1], "-----------------  ------");
        assert_eq!(lines[2], "vm-with-long-name  4.0");
        assert_eq!(lines[3], "vm2");
    }
}
