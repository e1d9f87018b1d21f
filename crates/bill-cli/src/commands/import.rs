//! Import command for storing export files as canonical entries.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use bill_core::{CanonicalEntry, ParsedExport, parse_exports};
use bill_db::Database;
use chrono::{DateTime, Utc};
use clap::Args;

use crate::commands::util::{ExportFormat, read_exports};

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Export format; detected per file by default.
    #[arg(long, value_enum, default_value_t = ExportFormat::Auto)]
    pub format: ExportFormat,

    /// Export files to import.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Counts from one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub parsed: usize,
    pub inserted: usize,
    pub skipped_rows: usize,
}

pub fn run<W: Write>(writer: &mut W, args: &ImportArgs, db: &mut Database) -> Result<ImportSummary> {
    let files = read_exports(&args.files)?;
    let exports = parse_exports(&files, args.format.source_system())?;
    store_exports(writer, &exports, db, Utc::now())
}

fn store_exports<W: Write>(
    writer: &mut W,
    exports: &[ParsedExport],
    db: &mut Database,
    imported_at: DateTime<Utc>,
) -> Result<ImportSummary> {
    for export in exports {
        writeln!(
            writer,
            "{} ({}): {} entries, {} skipped",
            export.source_name,
            export.source_system,
            export.entries.len(),
            export.skipped_rows
        )?;
    }

    let entries: Vec<CanonicalEntry> = exports
        .iter()
        .flat_map(|export| export.entries.iter().cloned())
        .collect();
    let inserted = db.insert_entries(&entries, imported_at)?;
    writeln!(
        writer,
        "Stored {inserted} new entries ({} already present).",
        entries.len() - inserted
    )?;

    Ok(ImportSummary {
        parsed: entries.len(),
        inserted,
        skipped_rows: exports.iter().map(|e| e.skipped_rows).sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    const CLOCKIFY: &str = r#"[
        {"id": "c1", "projectId": "web", "clientId": "acme", "task": {"name": "Design"},
         "timeInterval": {"start": "2025-01-02T09:00:00Z", "end": "2025-01-02T09:16:00Z", "duration": "PT16M"}},
        {"id": "c2", "projectId": "web", "clientId": "acme", "task": {"name": "Design"},
         "timeInterval": {"start": "2025-01-03T09:00:00Z", "duration": "PT40M"}},
        {"id": "c3", "projectId": "web", "clientId": "acme",
         "timeInterval": {"start": "2025-01-04T09:00:00Z", "end": null, "duration": null}}
    ]"#;

    const TOGGL: &str = r#"{"data": [
        {"id": 101, "pid": "api", "client_id": "globex", "task": "Support",
         "start": "2025-01-05T10:00:00+00:00", "dur": 2700000},
        {"id": 102, "pid": "api", "client_id": "globex", "start": "2025-01-06", "dur": -1}
    ]}"#;

    fn write_fixtures(dir: &std::path::Path) -> Vec<PathBuf> {
        let clockify = dir.join("clockify.json");
        let toggl = dir.join("toggl.json");
        std::fs::write(&clockify, CLOCKIFY).unwrap();
        std::fs::write(&toggl, TOGGL).unwrap();
        vec![clockify, toggl]
    }

    #[test]
    fn import_detects_formats_and_stores_entries() {
        let temp = tempfile::tempdir().unwrap();
        let mut db = Database::open_in_memory().unwrap();
        let args = ImportArgs {
            format: ExportFormat::Auto,
            files: write_fixtures(temp.path()),
        };

        let mut output = Vec::new();
        let summary = run(&mut output, &args, &mut db).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                parsed: 3,
                inserted: 3,
                skipped_rows: 2,
            }
        );
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        clockify.json (clockify): 2 entries, 1 skipped
        toggl.json (toggl): 1 entries, 1 skipped
        Stored 3 new entries (0 already present).
        ");

        let january = db.entries_in_month("2025-01".parse().unwrap()).unwrap();
        let minutes: Vec<i64> = january.iter().map(|e| e.minutes).collect();
        assert_eq!(minutes, vec![16, 40, 45]);
    }

    #[test]
    fn reimport_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let mut db = Database::open_in_memory().unwrap();
        let args = ImportArgs {
            format: ExportFormat::Auto,
            files: write_fixtures(temp.path()),
        };

        run(&mut Vec::new(), &args, &mut db).unwrap();
        let summary = run(&mut Vec::new(), &args, &mut db).unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(db.entry_count().unwrap(), 3);
    }

    #[test]
    fn forced_format_rejects_wrong_file() {
        let temp = tempfile::tempdir().unwrap();
        let mut db = Database::open_in_memory().unwrap();
        let args = ImportArgs {
            format: ExportFormat::Clockify,
            files: write_fixtures(temp.path()),
        };

        let err = run(&mut Vec::new(), &args, &mut db).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid file format in toggl.json: expected a JSON array of time entries"
        );
        assert_eq!(db.entry_count().unwrap(), 0);
    }
}
