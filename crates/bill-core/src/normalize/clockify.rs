//! Clockify detailed-report JSON.
//!
//! Rows carry the project id at the top level or under `project`, durations
//! as ISO-8601 strings (`PT1H30M`), and RFC 3339 start times.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{RowResult, client_id, entry_id, minutes_from_seconds, project_id, task_name};
use crate::entry::{CanonicalEntry, SourceSystem};

/// ISO-8601 durations as Clockify writes them: days and a time part, seconds
/// optionally fractional (fractions are dropped).
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.\d+)?S)?)?$")
        .expect("duration pattern is valid")
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClockifyEntry {
    id: Option<String>,
    project_id: Option<String>,
    client_id: Option<String>,
    project: Option<ClockifyProject>,
    task: Option<ClockifyTask>,
    task_name: Option<String>,
    time_interval: Option<ClockifyInterval>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClockifyProject {
    id: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClockifyTask {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClockifyInterval {
    start: Option<String>,
    end: Option<String>,
    duration: Option<String>,
}

/// Accepts a bare array or the report envelope `{"timeentries": [...]}`.
pub(super) fn rows(document: Value) -> Result<Vec<Value>, String> {
    match document {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("timeentries") {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err("expected a JSON array of time entries".to_string()),
        },
        _ => Err("expected a JSON array of time entries".to_string()),
    }
}

pub(super) fn entry(source_name: &str, index: usize, row: Value) -> RowResult {
    let row: ClockifyEntry = serde_json::from_value(row).map_err(|err| err.to_string())?;

    let interval = row.time_interval.ok_or("missing timeInterval")?;
    let start_text = interval.start.ok_or("missing timeInterval.start")?;
    let start = parse_timestamp(&start_text)?;

    let seconds = match (interval.duration, interval.end) {
        (Some(duration), _) => {
            parse_duration(&duration).ok_or_else(|| format!("invalid duration {duration:?}"))?
        }
        (None, Some(end)) => (parse_timestamp(&end)? - start).num_seconds(),
        (None, None) => return Err("timer still running".to_string()),
    };

    let project = row.project;
    let project_ref = project.as_ref();
    Ok(CanonicalEntry {
        entry_id: entry_id(SourceSystem::Clockify, source_name, index, row.id)?,
        project_id: project_id(
            row.project_id
                .or_else(|| project_ref.and_then(|p| p.id.clone())),
        ),
        client_id: client_id(
            row.client_id
                .or_else(|| project_ref.and_then(|p| p.client_id.clone())),
        ),
        task_name: task_name(row.task.and_then(|t| t.name).or(row.task_name)),
        minutes: minutes_from_seconds(seconds),
        date: start.date_naive(),
        source_system: SourceSystem::Clockify,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(value).map_err(|err| format!("invalid timestamp {value:?}: {err}"))
}

/// Parses an ISO-8601 duration into whole seconds.
fn parse_duration(value: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(value.trim())?;
    if caps.iter().skip(1).all(|group| group.is_none()) {
        return None;
    }
    let field = |i: usize| -> Option<i64> {
        caps.get(i)
            .map_or(Some(0), |m| m.as_str().parse::<i64>().ok())
    };
    let days = field(1)?;
    let hours = field(2)?;
    let minutes = field(3)?;
    let seconds = field(4)?;
    days.checked_mul(86_400)?
        .checked_add(hours.checked_mul(3600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn parse_duration_handles_iso_forms() {
        assert_eq!(parse_duration("PT16M"), Some(960));
        assert_eq!(parse_duration("PT1H30M15S"), Some(5415));
        assert_eq!(parse_duration("PT0S"), Some(0));
        assert_eq!(parse_duration("PT45.7S"), Some(45));
        assert_eq!(parse_duration("P1DT1H"), Some(90_000));
        assert_eq!(parse_duration("P"), None);
        assert_eq!(parse_duration("90"), None);
        assert_eq!(parse_duration("PT1X"), None);
    }

    #[test]
    fn entry_falls_back_to_nested_project_fields() {
        let row = json!({
            "id": "abc",
            "project": {"id": "p-2", "clientId": "globex"},
            "taskName": "  Support  ",
            "timeInterval": {"start": "2025-03-31T23:30:00-02:00", "duration": "PT1H"}
        });
        let entry = entry("march.json", 0, row).unwrap();
        assert_eq!(entry.entry_id.as_str(), "clockify:abc");
        assert_eq!(entry.project_id.unwrap().as_str(), "p-2");
        assert_eq!(entry.client_id.unwrap().as_str(), "globex");
        assert_eq!(entry.task_name.as_deref(), Some("Support"));
        assert_eq!(entry.minutes, 60);
        // date is taken in the entry's own offset
        assert_eq!(entry.date.to_string(), "2025-03-31");
    }

    #[test]
    fn entry_uses_end_when_duration_absent() {
        let row = json!({
            "timeInterval": {"start": "2025-01-02T10:00:00Z", "end": "2025-01-02T10:44:40Z"}
        });
        let entry = entry("jan.json", 4, row).unwrap();
        assert_eq!(entry.minutes, 45);
        assert_eq!(entry.entry_id.as_str(), "clockify:jan.json:5");
        assert!(entry.project_id.is_none());
        assert!(entry.task_name.is_none());
    }

    #[test]
    fn entry_rejects_running_timer_and_bad_rows() {
        let running = json!({"timeInterval": {"start": "2025-01-02T10:00:00Z"}});
        assert_eq!(entry("x", 0, running).unwrap_err(), "timer still running");

        let no_interval = json!({"id": "1"});
        assert!(entry("x", 0, no_interval).is_err());

        let bad_date = json!({"timeInterval": {"start": "yesterday", "duration": "PT1M"}});
        assert!(entry("x", 0, bad_date).is_err());
    }

    #[test]
    fn rows_accepts_envelope() {
        let rows = rows(json!({"timeentries": [{"id": "1"}], "totals": []})).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(super::rows(json!({"entries": []})).is_err());
        assert!(super::rows(json!("text")).is_err());
    }
}
