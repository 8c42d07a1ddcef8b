//! Terminal rendering for command results.
//!
//! Tables are padded on the plain text and colored afterwards so escape
//! codes never skew column widths.

use crate::core::compare::Difference;
use crate::core::error::EntitiesError;
use crate::core::listing::{headers, row};
use crate::core::record::{Kind, Record};
use colored::Colorize;
use serde::Serialize;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

fn pad(cell: &str, width: usize) -> String {
    format!("{:<width$}", cell, width = width)
}

/// Render `rows` under `header` as a left-aligned table with a bold header.
pub fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(i) {
                Some(w) => *w = (*w).max(len),
                None => widths.push(len),
            }
        }
    }

    let mut out = String::new();
    let head = header
        .iter()
        .zip(&widths)
        .map(|(h, w)| pad(h, *w).bold().to_string())
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(head.trim_end());
    out.push('\n');
    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| pad(cell, *w))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Table of listed records of one kind.
pub fn render_records(kind: Kind, records: &[Record]) -> String {
    let rows: Vec<Vec<String>> = records.iter().map(row).collect();
    render_table(headers(kind), &rows)
}

/// Table of compare results, or a one-line notice when there are none.
pub fn render_differences(differences: &[Difference]) -> String {
    if differences.is_empty() {
        return format!("{}\n", "No differences found.".green());
    }
    let rows: Vec<Vec<String>> = differences
        .iter()
        .map(|d| {
            vec![
                d.kind.to_string(),
                d.name.clone(),
                if d.missing { "yes" } else { "no" }.to_string(),
                compact_line(&d.descr, 80),
            ]
        })
        .collect();
    render_table(&["Kind", "Name", "Missing", "Difference"], &rows)
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, EntitiesError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EntitiesError::ConfigError(format!("cannot encode JSON output: {}", e)))
}
