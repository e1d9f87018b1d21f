//! Toggl detailed-report JSON.
//!
//! Rows carry numeric `pid`/`client_id`, durations in milliseconds (`dur`),
//! and start times with an offset. A negative `dur` marks a running timer.

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;

use super::{
    RowResult, client_id, entry_id, id_text, minutes_from_seconds, project_id, task_name,
};
use crate::entry::{CanonicalEntry, SourceSystem};

#[derive(Debug, Deserialize)]
struct TogglEntry {
    id: Option<Value>,
    pid: Option<Value>,
    client_id: Option<Value>,
    task: Option<String>,
    start: Option<String>,
    dur: Option<i64>,
}

/// Accepts the report envelope `{"data": [...]}` or a bare array.
pub(super) fn rows(document: Value) -> Result<Vec<Value>, String> {
    match document {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err("expected an object with a \"data\" array".to_string()),
        },
        _ => Err("expected an object with a \"data\" array".to_string()),
    }
}

pub(super) fn entry(source_name: &str, index: usize, row: Value) -> RowResult {
    let row: TogglEntry = serde_json::from_value(row).map_err(|err| err.to_string())?;

    let start = row.start.ok_or("missing start")?;
    let date = parse_date(&start)?;
    let dur = row.dur.ok_or("missing dur")?;
    if dur < 0 {
        return Err("timer still running".to_string());
    }

    Ok(CanonicalEntry {
        entry_id: entry_id(
            SourceSystem::Toggl,
            source_name,
            index,
            id_text(row.id.as_ref()),
        )?,
        project_id: project_id(id_text(row.pid.as_ref())),
        client_id: client_id(id_text(row.client_id.as_ref())),
        task_name: task_name(row.task),
        // sub-second remainders never change the rounded minute
        minutes: minutes_from_seconds(dur / 1000),
        date,
        source_system: SourceSystem::Toggl,
    })
}

/// Accepts `2025-01-15T09:00:00+01:00` or a bare `2025-01-15`.
fn parse_date(value: &str) -> Result<NaiveDate, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|err| format!("invalid start {value:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn entry_maps_numeric_ids_and_millis() {
        let row = json!({
            "id": 555,
            "pid": 12,
            "client_id": "c-9",
            "task": null,
            "start": "2025-02-01",
            "dur": 3_630_000
        });
        let entry = entry("feb.json", 0, row).unwrap();
        assert_eq!(entry.entry_id.as_str(), "toggl:555");
        assert_eq!(entry.project_id.unwrap().as_str(), "12");
        assert_eq!(entry.client_id.unwrap().as_str(), "c-9");
        assert!(entry.task_name.is_none());
        assert_eq!(entry.minutes, 61);
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
    }

    #[test]
    fn entry_rounds_half_minutes_up() {
        let row = json!({"pid": 1, "start": "2025-02-01", "dur": 90_999});
        assert_eq!(entry("x", 0, row).unwrap().minutes, 2);

        let row = json!({"pid": 1, "start": "2025-02-01", "dur": 89_999});
        assert_eq!(entry("x", 0, row).unwrap().minutes, 1);
    }

    #[test]
    fn entry_skips_running_and_incomplete_rows() {
        let running = json!({"pid": 1, "start": "2025-02-01", "dur": -1_738_000_000});
        assert_eq!(entry("x", 0, running).unwrap_err(), "timer still running");

        assert!(entry("x", 0, json!({"pid": 1, "dur": 1000})).is_err());
        assert!(entry("x", 0, json!({"pid": 1, "start": "2025-02-01"})).is_err());
        assert!(entry("x", 0, json!({"start": "02/01/2025", "dur": 1000})).is_err());
        assert!(entry("x", 0, json!("not an object")).is_err());
    }

    #[test]
    fn rows_accepts_envelope_and_bare_array() {
        assert_eq!(rows(json!({"data": [{}, {}]})).unwrap().len(), 2);
        assert_eq!(rows(json!([{}])).unwrap().len(), 1);
        assert!(rows(json!({"total_count": 0})).is_err());
    }
}
