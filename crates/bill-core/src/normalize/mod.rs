//! Normalization of time-tracking exports into canonical entries.
//!
//! Each export format has its own field layout (where the project id lives,
//! what unit durations use, how dates are written). A format is a pair of
//! functions: one that finds the row list in the parsed document and one
//! that maps a single row. Everything downstream only sees [`CanonicalEntry`].
//!
//! A document that is not the expected shape fails the whole file with a
//! [`ParseError`]. Individual rows that cannot be mapped are skipped and
//! counted, so one bad row does not sink an otherwise good export.

mod clockify;
mod toggl;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::amount::div_round_half_up;
use crate::entry::{CanonicalEntry, SourceSystem};
use crate::types::{ClientId, EntryId, ProjectId};

/// A source file could not be read as the declared export format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid file format in {source_name}: {message}")]
pub struct ParseError {
    /// File name (or other label) the content came from.
    pub source_name: String,
    pub message: String,
}

impl ParseError {
    fn new(source_name: &str, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }
}

/// Entries parsed from one export file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedExport {
    pub source_name: String,
    pub source_system: SourceSystem,
    pub entries: Vec<CanonicalEntry>,
    /// Rows that were present but could not be mapped to an entry.
    pub skipped_rows: usize,
}

/// Raw content of one export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub source_name: String,
    pub content: String,
}

/// Row-level mapping failure; logged and counted, never fatal.
type RowResult = Result<CanonicalEntry, String>;

/// Format-specific parsing functions.
struct FormatParser {
    /// Extracts the row list from the parsed document.
    rows: fn(Value) -> Result<Vec<Value>, String>,
    /// Maps a single row. Arguments are the source name and zero-based row index.
    entry: fn(&str, usize, Value) -> RowResult,
}

const fn parser_for(source_system: SourceSystem) -> FormatParser {
    match source_system {
        SourceSystem::Clockify => FormatParser {
            rows: clockify::rows,
            entry: clockify::entry,
        },
        SourceSystem::Toggl => FormatParser {
            rows: toggl::rows,
            entry: toggl::entry,
        },
    }
}

/// Parses an export file of a known format.
///
/// Blank content is an empty export, not an error.
pub fn parse_export(
    source_system: SourceSystem,
    source_name: &str,
    content: &str,
) -> Result<ParsedExport, ParseError> {
    let parser = parser_for(source_system);

    let rows = if content.trim().is_empty() {
        Vec::new()
    } else {
        let document: Value = serde_json::from_str(content)
            .map_err(|err| ParseError::new(source_name, format!("not valid JSON: {err}")))?;
        (parser.rows)(document).map_err(|message| ParseError::new(source_name, message))?
    };

    let mut entries = Vec::with_capacity(rows.len());
    let mut skipped_rows = 0;
    for (index, row) in rows.into_iter().enumerate() {
        match (parser.entry)(source_name, index, row) {
            Ok(entry) => entries.push(entry),
            Err(reason) => {
                skipped_rows += 1;
                tracing::warn!(
                    source = source_name,
                    system = %source_system,
                    row = index + 1,
                    %reason,
                    "skipping unparseable row"
                );
            }
        }
    }

    tracing::debug!(
        source = source_name,
        system = %source_system,
        entries = entries.len(),
        skipped_rows,
        "parsed export"
    );

    Ok(ParsedExport {
        source_name: source_name.to_string(),
        source_system,
        entries,
        skipped_rows,
    })
}

/// Guesses the export format from the document shape.
///
/// Blank content and empty arrays are reported as Clockify, whose native
/// shape is a bare array; they parse to zero entries either way.
pub fn detect_format(content: &str) -> Option<SourceSystem> {
    if content.trim().is_empty() {
        return Some(SourceSystem::Clockify);
    }
    let document: Value = serde_json::from_str(content).ok()?;
    match &document {
        Value::Object(map) if map.get("data").is_some_and(Value::is_array) => {
            Some(SourceSystem::Toggl)
        }
        Value::Object(map) if map.get("timeentries").is_some_and(Value::is_array) => {
            Some(SourceSystem::Clockify)
        }
        Value::Array(rows) => match rows.iter().find(|row| row.is_object()) {
            None if rows.is_empty() => Some(SourceSystem::Clockify),
            None => None,
            Some(row) if row.get("timeInterval").is_some() => Some(SourceSystem::Clockify),
            Some(row) if row.get("dur").is_some() || row.get("pid").is_some() => {
                Some(SourceSystem::Toggl)
            }
            Some(_) => None,
        },
        _ => None,
    }
}

/// Parses an export file, detecting its format first.
pub fn parse_export_auto(source_name: &str, content: &str) -> Result<ParsedExport, ParseError> {
    let source_system = detect_format(content).ok_or_else(|| {
        let known: Vec<_> = SourceSystem::ALL.iter().map(SourceSystem::as_str).collect();
        ParseError::new(
            source_name,
            format!("unrecognized export format (expected one of: {})", known.join(", ")),
        )
    })?;
    parse_export(source_system, source_name, content)
}

/// Parses several files in parallel, preserving input order.
///
/// With `source_system = None` each file's format is detected individually.
/// The first file that fails aborts the batch.
pub fn parse_exports(
    files: &[ExportFile],
    source_system: Option<SourceSystem>,
) -> Result<Vec<ParsedExport>, ParseError> {
    files
        .par_iter()
        .map(|file| match source_system {
            Some(system) => parse_export(system, &file.source_name, &file.content),
            None => parse_export_auto(&file.source_name, &file.content),
        })
        .collect()
}

/// Whole minutes from seconds, rounding half up.
fn minutes_from_seconds(seconds: i64) -> i64 {
    // |seconds / 60| always fits back into i64
    i64::try_from(div_round_half_up(i128::from(seconds), 60)).unwrap_or_default()
}

/// Entry id namespaced by source system, so equal row ids from different
/// trackers stay distinct. Rows without an id get a stable synthetic one from
/// their position.
fn entry_id(
    source_system: SourceSystem,
    source_name: &str,
    index: usize,
    id: Option<String>,
) -> Result<EntryId, String> {
    let id = id.filter(|id| !id.trim().is_empty()).map_or_else(
        || format!("{source_system}:{source_name}:{}", index + 1),
        |id| format!("{source_system}:{id}"),
    );
    EntryId::new(id).map_err(|err| err.to_string())
}

fn project_id(value: Option<String>) -> Option<ProjectId> {
    value.and_then(|v| ProjectId::new(v).ok())
}

fn client_id(value: Option<String>) -> Option<ClientId> {
    value.and_then(|v| ClientId::new(v).ok())
}

fn task_name(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads an identifier that exports write as either a string or a number.
fn id_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
