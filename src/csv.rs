//! Append-only CSV time log: path resolution, idempotent header setup with
//! legacy-schema migration, and record appends.
//!
//! The file is the sole persisted entity. Appends only ever add one line;
//! the single rewrite case is the header migration, which uses the atomic
//! write-temp-then-rename pattern so readers never see a partial file.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::format::{escape_csv_field, format_date, format_time, quote_field};
use crate::session::TokenTally;

/// Current schema: 23 columns.
pub const CSV_HEADER: &str = "id,start_date,end_date,user,ticket_name,issue_key,account_key,start_time,end_time,duration_seconds,tokens_used,tokens_remaining,story_points,description,notes,model,agent,tokens_input,tokens_output,tokens_reasoning,tokens_cache_read,tokens_cache_write,cost";

/// Number of columns in the current schema.
pub const CSV_COLUMNS: usize = 23;

/// One finalized session, ready to be formatted as a row.
#[derive(Debug, Clone)]
pub struct CsvRecord {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub user: String,
    pub ticket: Option<String>,
    pub account_key: String,
    pub duration_seconds: i64,
    pub tokens: TokenTally,
    pub description: String,
    pub notes: String,
    pub model: String,
    pub agent: String,
    pub cost: f64,
}

/// Filesystem failures while ensuring or appending to the log.
#[derive(Debug)]
pub enum CsvError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsvError::Io { path, source } => {
                write!(f, "csv file error at {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for CsvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CsvError::Io { source, .. } => Some(source),
        }
    }
}

/// Resolve the configured CSV path.
///
/// `~/` expands to the invoking user's home directory, absolute paths are
/// used verbatim, anything else is relative to the project root.
pub fn resolve_csv_path(configured: &str, project_root: &Path) -> PathBuf {
    let home = std::env::var("HOME").map(PathBuf::from).unwrap_or_default();
    resolve_csv_path_from(configured, project_root, &home)
}

fn resolve_csv_path_from(configured: &str, project_root: &Path, home: &Path) -> PathBuf {
    if let Some(rest) = configured.strip_prefix("~/") {
        return home.join(rest);
    }
    let path = Path::new(configured);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    project_root.join(path)
}

/// Appends finalized session rows to the configured file.
#[derive(Debug)]
pub struct CsvWriter {
    path: PathBuf,
}

impl CsvWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the file exists and carries the current header. Idempotent.
    ///
    /// Legacy files with fewer columns are migrated in one whole-file
    /// rewrite: every narrower row gets padded with empty quoted fields and
    /// the current header goes on top. Files that already carry at least the
    /// current column count under a header are left untouched.
    pub fn ensure_header(&self) -> Result<(), CsvError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CsvError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.write_all(&format!("{CSV_HEADER}\n"));
            }
            Err(e) => {
                return Err(CsvError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            return self.write_all(&format!("{CSV_HEADER}\n"));
        }

        let (has_header, data_lines) = if is_header_line(lines[0]) {
            (true, &lines[1..])
        } else {
            (false, &lines[..])
        };

        if has_header && lines[0] == CSV_HEADER {
            return Ok(());
        }
        if has_header && count_csv_columns(lines[0]) > CSV_COLUMNS {
            // A newer, unknown schema; do not guess at it.
            tracing::warn!(
                path = %self.path.display(),
                "csv file has more columns than this version writes, leaving untouched"
            );
            return Ok(());
        }
        if !has_header
            && data_lines
                .first()
                .is_some_and(|line| count_csv_columns(line) > CSV_COLUMNS)
        {
            tracing::warn!(
                path = %self.path.display(),
                "headerless csv file has more columns than this version writes, leaving untouched"
            );
            return Ok(());
        }

        // Pad narrower legacy rows up to the current column count. Rows that
        // already have enough columns pass through unchanged.
        let mut migrated = String::with_capacity(contents.len() + CSV_HEADER.len() + 64);
        migrated.push_str(CSV_HEADER);
        migrated.push('\n');
        let mut padded = 0usize;
        for line in data_lines {
            let cols = count_csv_columns(line);
            migrated.push_str(line);
            if cols < CSV_COLUMNS {
                for _ in cols..CSV_COLUMNS {
                    migrated.push_str(",\"\"");
                }
                padded += 1;
            }
            migrated.push('\n');
        }

        tracing::info!(
            path = %self.path.display(),
            rows = data_lines.len(),
            padded,
            "migrated csv file to current schema"
        );
        self.write_all(&migrated)
    }

    /// Append one record. Falls back to writing header plus line together
    /// when the file has gone missing since `ensure_header`.
    pub fn write(&self, record: &CsvRecord) -> Result<(), CsvError> {
        let line = format_record(record);
        if !self.path.exists() {
            return self.write_all(&format!("{CSV_HEADER}\n{line}\n"));
        }

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| CsvError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        writeln!(file, "{line}").map_err(|e| CsvError::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Whole-file write via temp file + rename.
    fn write_all(&self, contents: &str) -> Result<(), CsvError> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(format!(".timesmith.csv.tmp.{}", std::process::id()));
        std::fs::write(&tmp_path, contents.as_bytes()).map_err(|e| CsvError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| CsvError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Format one record as a 23-field quoted CSV line.
fn format_record(record: &CsvRecord) -> String {
    let ticket = record.ticket.clone().unwrap_or_default();
    let fields: [String; CSV_COLUMNS] = [
        Uuid::new_v4().to_string(),
        format_date(&record.start),
        format_date(&record.end),
        record.user.clone(),
        ticket.clone(),
        ticket,
        record.account_key.clone(),
        format_time(&record.start),
        format_time(&record.end),
        record.duration_seconds.to_string(),
        record.tokens.used().to_string(),
        String::new(), // tokens_remaining
        String::new(), // story_points
        record.description.clone(),
        record.notes.clone(),
        record.model.clone(),
        record.agent.clone(),
        record.tokens.input.to_string(),
        record.tokens.output.to_string(),
        record.tokens.reasoning.to_string(),
        record.tokens.cache_read.to_string(),
        record.tokens.cache_write.to_string(),
        format!("{:.6}", record.cost),
    ];

    fields
        .iter()
        .map(|field| quote_field(&escape_csv_field(field)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether a line looks like a schema header rather than a data row.
fn is_header_line(line: &str) -> bool {
    line.trim_start_matches('"')
        .split(&[',', '"'][..])
        .next()
        .is_some_and(|first| first == "id")
        && line.contains("start_date")
}

/// Count the columns of a CSV line, honoring quoted fields with `""` escapes.
fn count_csv_columns(line: &str) -> usize {
    let mut columns = 1;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    chars.next(); // escaped quote
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => columns += 1,
            _ => {}
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> CsvRecord {
        let start = Local.with_ymd_and_hms(2026, 8, 30, 9, 0, 0).unwrap();
        CsvRecord {
            start,
            end: start + chrono::Duration::seconds(60),
            user: "dev@example.com".to_string(),
            ticket: Some("PROJ-9".to_string()),
            account_key: "ACCT".to_string(),
            duration_seconds: 60,
            tokens: TokenTally {
                input: 100,
                output: 50,
                reasoning: 0,
                cache_read: 0,
                cache_write: 0,
            },
            description: "3 file edit(s), 2 file read(s)".to_string(),
            notes: "Auto-tracked: edit(3x), read(2x)".to_string(),
            model: "anthropic/claude-sonnet".to_string(),
            agent: "build".to_string(),
            cost: 0.042,
        }
    }

    #[test]
    fn test_header_has_current_column_count() {
        assert_eq!(count_csv_columns(CSV_HEADER), CSV_COLUMNS);
    }

    #[test]
    fn test_path_resolution() {
        let root = Path::new("/work/project");
        let home = Path::new("/home/dev");
        assert_eq!(
            resolve_csv_path_from("~/tracking.csv", root, home),
            PathBuf::from("/home/dev/tracking.csv")
        );
        assert_eq!(
            resolve_csv_path_from("/var/log/tracking.csv", root, home),
            PathBuf::from("/var/log/tracking.csv")
        );
        assert_eq!(
            resolve_csv_path_from("logs/tracking.csv", root, home),
            PathBuf::from("/work/project/logs/tracking.csv")
        );
    }

    #[test]
    fn test_ensure_header_creates_file_and_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/tracking.csv");
        let writer = CsvWriter::new(path.clone());

        writer.ensure_header().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{CSV_HEADER}\n"));

        // Second call leaves the file untouched.
        writer.ensure_header().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
    }

    #[test]
    fn test_ensure_header_fills_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracking.csv");
        std::fs::write(&path, "").unwrap();

        CsvWriter::new(path.clone()).ensure_header().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("{CSV_HEADER}\n")
        );
    }

    #[test]
    fn test_ensure_header_prepends_to_compatible_headerless_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracking.csv");
        let row: Vec<String> = (0..CSV_COLUMNS).map(|i| format!("\"v{i}\"")).collect();
        let row = row.join(",");
        std::fs::write(&path, format!("{row}\n")).unwrap();

        CsvWriter::new(path.clone()).ensure_header().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], row);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_ensure_header_pads_narrow_legacy_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracking.csv");
        // 15-column unheaded legacy file, two rows.
        let row: Vec<String> = (0..15).map(|i| format!("\"v{i}\"")).collect();
        let row = row.join(",");
        std::fs::write(&path, format!("{row}\n{row}\n")).unwrap();

        CsvWriter::new(path.clone()).ensure_header().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        for line in &lines[1..] {
            assert_eq!(count_csv_columns(line), CSV_COLUMNS);
            assert!(line.starts_with(&row));
            assert!(line.ends_with(",\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\""));
        }
    }

    #[test]
    fn test_ensure_header_migrates_narrow_headed_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracking.csv");
        let old_header = CSV_HEADER.split(',').take(15).collect::<Vec<_>>().join(",");
        let row: Vec<String> = (0..15).map(|i| format!("\"v{i}\"")).collect();
        let row = row.join(",");
        std::fs::write(&path, format!("{old_header}\n{row}\n")).unwrap();

        CsvWriter::new(path.clone()).ensure_header().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 2);
        assert_eq!(count_csv_columns(lines[1]), CSV_COLUMNS);
    }

    #[test]
    fn test_ensure_header_leaves_wider_files_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracking.csv");
        let row: Vec<String> = (0..30).map(|i| format!("\"v{i}\"")).collect();
        let original = format!("{}\n", row.join(","));
        std::fs::write(&path, &original).unwrap();

        CsvWriter::new(path.clone()).ensure_header().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_write_appends_quoted_row() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracking.csv");
        let writer = CsvWriter::new(path.clone());
        writer.ensure_header().unwrap();
        writer.write(&record()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let row = lines[1];
        assert_eq!(count_csv_columns(row), CSV_COLUMNS);
        assert!(row.contains("\"2026-08-30\""));
        assert!(row.contains("\"60\""));
        assert!(row.contains("\"150\"")); // tokens_used = input+output+reasoning
        assert!(row.contains("\"PROJ-9\""));
        assert!(row.contains("\"0.042000\""));
    }

    #[test]
    fn test_write_escapes_embedded_quotes_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracking.csv");
        let writer = CsvWriter::new(path.clone());
        writer.ensure_header().unwrap();

        let mut rec = record();
        rec.description = r#"fix the "legacy" parser"#.to_string();
        writer.write(&rec).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(r#""fix the ""legacy"" parser""#));
        // Un-escaping yields the original.
        let field = r#"fix the ""legacy"" parser"#;
        assert_eq!(field.replace("\"\"", "\""), rec.description);
    }

    #[test]
    fn test_write_recreates_missing_file_with_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracking.csv");
        let writer = CsvWriter::new(path.clone());

        // ensure_header never called, file absent
        writer.write(&record()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_count_csv_columns_with_quoted_commas() {
        assert_eq!(count_csv_columns(r#""a","b,c","d"""e""#), 3);
        assert_eq!(count_csv_columns("a,b,c"), 3);
        assert_eq!(count_csv_columns(""), 1);
    }

    #[test]
    fn test_row_ids_are_unique() {
        let a = format_record(&record());
        let b = format_record(&record());
        let id_a = a.split(',').next().unwrap();
        let id_b = b.split(',').next().unwrap();
        assert_ne!(id_a, id_b);
    }
}
