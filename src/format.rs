/// Pure formatting helpers for CSV output: field escaping and the
/// date/time shapes used in each row.
use chrono::{DateTime, Local};

/// Escape a free-text CSV field by doubling embedded double quotes.
///
/// The writer wraps every field in quotes, so this is the only
/// escaping needed.
pub fn escape_csv_field(value: &str) -> String {
    value.replace('"', "\"\"")
}

/// Wrap an already-escaped value in double quotes.
pub fn quote_field(value: &str) -> String {
    format!("\"{value}\"")
}

/// ISO calendar date, e.g. `2026-08-30`.
pub fn format_date(t: &DateTime<Local>) -> String {
    t.format("%Y-%m-%d").to_string()
}

/// Local wall-clock time, e.g. `14:03:07`.
pub fn format_time(t: &DateTime<Local>) -> String {
    t.format("%H:%M:%S").to_string()
}
