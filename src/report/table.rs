//! Terminal table rendering for stored results.
//!
//! - `render_list` shows one line per stored query with row count and age
//! - `render_results` shows the rows of one query, columns as headers

use crate::query::ResultSet;
use crate::store::StoredQuery;

pub fn render_list(stored: &[StoredQuery]) -> String {
    if stored.is_empty() {
        return String::from("No stored results.\n");
    }

    let mut output = String::new();
    output.push_str(&format!("{:<30} {:>8}  {:<20}\n", "QUERY", "ROWS", "UPDATED"));
    output.push_str(&"-".repeat(60));
    output.push('\n');

    for query in stored {
        let updated = chrono::DateTime::from_timestamp(query.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        output.push_str(&format!(
            "{:<30} {:>8}  {:<20}\n",
            truncate(&query.name, 30),
            query.row_count,
            updated
        ));
    }

    output
}

pub fn render_results(results: &ResultSet) -> String {
    if results.is_empty() {
        return String::from("No rows.\n");
    }

    // union of columns, rows may not all share the same set
    let mut columns: Vec<&String> = results.iter().flat_map(|row| row.keys()).collect();
    columns.sort();
    columns.dedup();

    let widths: Vec<usize> = columns
        .iter()
        .map(|column| {
            results
                .iter()
                .filter_map(|row| row.get(*column))
                .map(|value| value.chars().count().min(40))
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut output = String::new();
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(column, &width)| format!("{:<width$}", truncate(column, 40)))
        .collect();
    output.push_str(header.join("  ").trim_end());
    output.push('\n');
    output.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1)));
    output.push('\n');

    for row in results {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(column, &width)| {
                let value = row.get(*column).map(String::as_str).unwrap_or("");
                format!("{:<width$}", truncate(value, 40))
            })
            .collect();
        output.push_str(cells.join("  ").trim_end());
        output.push('\n');
    }

    output.push_str(&format!("\n{} rows\n", results.len()));
    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::row;

    #[test]
    fn empty_list_message() {
        assert_eq!(render_list(&[]), "No stored results.\n");
    }

    #[test]
    fn list_shows_name_and_count() {
        let output = render_list(&[StoredQuery {
            name: "processes".into(),
            row_count: 12,
            updated_at: 0,
        }]);
        assert!(output.contains("processes"));
        assert!(output.contains("12"));
        assert!(output.contains("1970-01-01 00:00:00"));
    }

    #[test]
    fn results_table_has_header_and_rows() {
        let output = render_results(&vec![
            row([("pid", "1"), ("name", "init")]),
            row([("pid", "22"), ("name", "sshd")]),
        ]);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "name  pid");
        assert_eq!(lines[2], "init  1");
        assert_eq!(lines[3], "sshd  22");
        assert!(output.ends_with("2 rows\n"));
    }

    #[test]
    fn long_values_truncated() {
        let long = "x".repeat(100);
        let output = render_results(&vec![row([("v", long.as_str())])]);
        assert!(output.contains("..."));
        assert!(!output.contains(&long));
    }
}
