//! Canonical time entries.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{BillingMonth, ClientId, EntryId, ProjectId};

/// Time-tracking system an entry was exported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSystem {
    Clockify,
    Toggl,
}

impl SourceSystem {
    pub const ALL: [Self; 2] = [Self::Clockify, Self::Toggl];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Clockify => "clockify",
            Self::Toggl => "toggl",
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clockify" => Ok(Self::Clockify),
            "toggl" => Ok(Self::Toggl),
            _ => Err(format!("unknown source system: {s}")),
        }
    }
}

/// A time record normalized to a fixed schema regardless of source system.
///
/// `project_id` and `client_id` are optional because exports may contain
/// entries nobody assigned to a project; those are billed under the
/// unassigned sentinel rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub entry_id: EntryId,
    pub project_id: Option<ProjectId>,
    pub client_id: Option<ClientId>,
    pub task_name: Option<String>,
    pub minutes: i64,
    pub date: NaiveDate,
    pub source_system: SourceSystem,
}

impl CanonicalEntry {
    pub fn billing_month(&self) -> BillingMonth {
        BillingMonth::of(self.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_system_from_str() {
        assert_eq!(
            "clockify".parse::<SourceSystem>().unwrap(),
            SourceSystem::Clockify
        );
        assert_eq!("toggl".parse::<SourceSystem>().unwrap(), SourceSystem::Toggl);
        assert!("harvest".parse::<SourceSystem>().is_err());
    }

    #[test]
    fn entry_serde_roundtrip() {
        let entry = CanonicalEntry {
            entry_id: EntryId::new("e-1").unwrap(),
            project_id: Some(ProjectId::new("p-1").unwrap()),
            client_id: None,
            task_name: Some("Design".to_string()),
            minutes: 45,
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            source_system: SourceSystem::Toggl,
        };

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: CanonicalEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.billing_month().to_string(), "2025-01");
    }
}
