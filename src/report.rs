//! Report rendering (table, CSV, JSON)

use crate::error::Result;
use crate::evaluator::GrantRecord;
use crate::search::{SearchReport, SearchResult};

/// Column headers after the action column
pub const FIELDS: [&str; 5] = ["Principal", "Type", "Allow Type", "Allowed By", "Trust"];

/// Placeholder for records without a trust summary
const NOT_APPLICABLE: &str = "N/A";

/// Output format for search results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Boxed table per target action
    Table,
    /// Comma-separated rows, one header row per target action
    Csv,
    /// The full report as JSON
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "prettytable" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Invalid output format '{}'. Valid options: table, csv, json",
                s
            )),
        }
    }
}

impl OutputFormat {
    /// Render a report in this format
    pub fn render(&self, report: &SearchReport) -> Result<String> {
        match self {
            OutputFormat::Table => Ok(render_table(&report.results)),
            OutputFormat::Csv => Ok(render_csv(&report.results)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        }
    }
}

fn row(record: &GrantRecord) -> [String; 5] {
    [
        record.principal.name.clone(),
        record.principal.kind.label().to_string(),
        record.policy_kind.label().to_string(),
        record.policy_identifier.clone(),
        record
            .trust
            .clone()
            .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
    ]
}

/// Render one boxed table per target action, preceded by the action name
pub fn render_table(results: &SearchResult) -> String {
    let mut out = String::new();

    for entry in results.iter() {
        let rows: Vec<[String; 5]> = entry.grants.iter().map(row).collect();

        let mut widths = FIELDS.map(str::len);
        for cells in &rows {
            for (width, cell) in widths.iter_mut().zip(cells) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let border = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+");
        let border = format!("+{}+\n", border);

        let line = |cells: &[&str]| {
            let padded: Vec<String> = cells
                .iter()
                .zip(widths.iter())
                .map(|(cell, w)| format!(" {:<width$} ", cell, width = w))
                .collect();
            format!("|{}|\n", padded.join("|"))
        };

        out.push_str(entry.action.as_str());
        out.push('\n');
        out.push_str(&border);
        out.push_str(&line(&FIELDS));
        out.push_str(&border);
        for cells in &rows {
            let cells: Vec<&str> = cells.iter().map(String::as_str).collect();
            out.push_str(&line(&cells));
        }
        if !rows.is_empty() {
            out.push_str(&border);
        }
    }

    out
}

/// Quote a CSV field if it contains a separator, quote or newline
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render CSV: per action a header row `<action>,Principal,...`, then its grants
pub fn render_csv(results: &SearchResult) -> String {
    let mut out = String::new();

    for entry in results.iter() {
        let action = csv_field(entry.action.as_str());
        out.push_str(&action);
        for field in FIELDS {
            out.push(',');
            out.push_str(field);
        }
        out.push('\n');

        for record in &entry.grants {
            out.push_str(&action);
            for cell in row(record) {
                out.push(',');
                out.push_str(&csv_field(&cell));
            }
            out.push('\n');
        }
    }

    out
}
