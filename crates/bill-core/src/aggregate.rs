//! Grouping of canonical entries into the Month → Company → Project → Task
//! hierarchy.
//!
//! This step only sums minutes. Every level is keyed by a `BTreeMap`, so the
//! output is identical for any ordering of the same entries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::entry::CanonicalEntry;
use crate::error::BillingError;
use crate::types::{BillingMonth, ClientId, EntryId, ProjectId};

/// Sentinel id for entries without a company or project.
pub const UNASSIGNED: &str = "unassigned";

/// Task name used when an entry has none.
pub const NO_TASK: &str = "No Task";

/// Company grouping key. Companies are the clients being billed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum CompanyKey {
    Client(ClientId),
    Unassigned,
}

impl CompanyKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Client(id) => id.as_str(),
            Self::Unassigned => UNASSIGNED,
        }
    }

    pub const fn client_id(&self) -> Option<&ClientId> {
        match self {
            Self::Client(id) => Some(id),
            Self::Unassigned => None,
        }
    }
}

/// Project grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum ProjectKey {
    Project(ProjectId),
    Unassigned,
}

impl ProjectKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Project(id) => id.as_str(),
            Self::Unassigned => UNASSIGNED,
        }
    }

    pub const fn project_id(&self) -> Option<&ProjectId> {
        match self {
            Self::Project(id) => Some(id),
            Self::Unassigned => None,
        }
    }
}

impl fmt::Display for CompanyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CompanyKey> for String {
    fn from(key: CompanyKey) -> Self {
        key.as_str().to_string()
    }
}

impl From<ProjectKey> for String {
    fn from(key: ProjectKey) -> Self {
        key.as_str().to_string()
    }
}

/// Summed minutes for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTotals {
    pub task_name: String,
    pub actual_minutes: i64,
    pub entry_count: usize,
}

/// Summed minutes for one project, tasks sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTotals {
    pub project: ProjectKey,
    pub tasks: Vec<TaskTotals>,
}

impl ProjectTotals {
    pub fn actual_minutes(&self) -> i64 {
        self.tasks.iter().map(|t| t.actual_minutes).sum()
    }

    pub fn entry_count(&self) -> usize {
        self.tasks.iter().map(|t| t.entry_count).sum()
    }
}

/// Projects billed to one company, sorted by project key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyTotals {
    pub company: CompanyKey,
    pub projects: Vec<ProjectTotals>,
}

/// Companies with activity in one month, sorted by company key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthTotals {
    pub month: BillingMonth,
    pub companies: Vec<CompanyTotals>,
}

impl MonthTotals {
    pub fn actual_minutes(&self) -> i64 {
        self.companies
            .iter()
            .flat_map(|c| &c.projects)
            .map(ProjectTotals::actual_minutes)
            .sum()
    }
}

/// An entry excluded from aggregation because it broke an invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    pub entry_id: EntryId,
    pub reason: String,
}

impl From<RejectedEntry> for BillingError {
    fn from(rejected: RejectedEntry) -> Self {
        Self::InvariantViolation {
            entry_id: rejected.entry_id,
            reason: rejected.reason,
        }
    }
}

/// Output of [`aggregate_entries`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Aggregation {
    /// Months in ascending order.
    pub months: Vec<MonthTotals>,
    /// Rejected entries sorted by id.
    pub rejected: Vec<RejectedEntry>,
}

type TaskMap = BTreeMap<String, (i64, usize)>;

/// A project's tasks and every company its entries named.
#[derive(Default)]
struct ProjectSlot {
    companies: BTreeSet<CompanyKey>,
    tasks: TaskMap,
}

/// Groups entries by month, company, project and task, summing minutes.
///
/// The project is the billing unit: a project logged under several clients
/// (or under a client and no client) is billed once, under the first of
/// those companies in key order, with its tasks merged before rounding.
/// Entries with negative minutes are rejected rather than summed. Entries
/// without a project land under the unassigned company and project.
pub fn aggregate_entries(entries: &[CanonicalEntry]) -> Aggregation {
    let mut months: BTreeMap<BillingMonth, BTreeMap<ProjectKey, ProjectSlot>> = BTreeMap::new();
    let mut rejected = Vec::new();

    for entry in entries {
        if entry.minutes < 0 {
            tracing::warn!(
                entry_id = %entry.entry_id,
                minutes = entry.minutes,
                "rejecting entry with negative duration"
            );
            rejected.push(RejectedEntry {
                entry_id: entry.entry_id.clone(),
                reason: format!("negative duration of {} minutes", entry.minutes),
            });
            continue;
        }

        let (company, project) = match &entry.project_id {
            Some(project_id) => (
                entry
                    .client_id
                    .clone()
                    .map_or(CompanyKey::Unassigned, CompanyKey::Client),
                ProjectKey::Project(project_id.clone()),
            ),
            None => (CompanyKey::Unassigned, ProjectKey::Unassigned),
        };
        let task = entry.task_name.as_deref().unwrap_or(NO_TASK).to_string();

        let slot = months
            .entry(entry.billing_month())
            .or_default()
            .entry(project)
            .or_default();
        slot.companies.insert(company);
        let task = slot.tasks.entry(task).or_default();
        task.0 += entry.minutes;
        task.1 += 1;
    }

    rejected.sort_by(|a, b| a.entry_id.cmp(&b.entry_id).then(a.reason.cmp(&b.reason)));

    let months = months
        .into_iter()
        .map(|(month, projects)| {
            let mut companies: BTreeMap<CompanyKey, Vec<ProjectTotals>> = BTreeMap::new();
            for (project, slot) in projects {
                let split = slot.companies.len() > 1;
                let Some(company) = slot.companies.into_iter().next() else {
                    continue;
                };
                if split {
                    tracing::debug!(
                        %month,
                        %project,
                        %company,
                        "project logged under several companies, billing it once"
                    );
                }
                companies.entry(company).or_default().push(ProjectTotals {
                    project,
                    tasks: slot
                        .tasks
                        .into_iter()
                        .map(|(task_name, (actual_minutes, entry_count))| TaskTotals {
                            task_name,
                            actual_minutes,
                            entry_count,
                        })
                        .collect(),
                });
            }
            MonthTotals {
                month,
                companies: companies
                    .into_iter()
                    .map(|(company, projects)| CompanyTotals { company, projects })
                    .collect(),
            }
        })
        .collect();

    Aggregation { months, rejected }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use chrono::NaiveDate;

    use crate::entry::SourceSystem;

    /// Builds an entry; `date` is `(year, month, day)`.
    pub(crate) fn entry(
        id: &str,
        client: Option<&str>,
        project: Option<&str>,
        task: Option<&str>,
        minutes: i64,
        date: (i32, u32, u32),
    ) -> CanonicalEntry {
        CanonicalEntry {
            entry_id: EntryId::new(id).unwrap(),
            project_id: project.map(|p| ProjectId::new(p).unwrap()),
            client_id: client.map(|c| ClientId::new(c).unwrap()),
            task_name: task.map(String::from),
            minutes,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            source_system: SourceSystem::Clockify,
        }
    }

    fn sample() -> Vec<CanonicalEntry> {
        vec![
            entry("1", Some("acme"), Some("web"), Some("Design"), 16, (2025, 1, 3)),
            entry("2", Some("acme"), Some("web"), Some("Design"), 40, (2025, 1, 9)),
            entry("3", Some("acme"), Some("web"), None, 30, (2025, 1, 9)),
            entry("4", Some("globex"), Some("api"), Some("Build"), 61, (2025, 1, 20)),
            entry("5", None, None, Some("Admin"), 10, (2025, 1, 21)),
            entry("6", Some("acme"), Some("web"), Some("Design"), 25, (2025, 2, 1)),
        ]
    }

    #[test]
    fn groups_by_month_company_project_task() {
        let aggregation = aggregate_entries(&sample());
        assert_eq!(aggregation.months.len(), 2);
        assert!(aggregation.rejected.is_empty());

        let january = &aggregation.months[0];
        assert_eq!(january.month.to_string(), "2025-01");
        let companies: Vec<_> = january.companies.iter().map(|c| c.company.as_str()).collect();
        assert_eq!(companies, ["acme", "globex", UNASSIGNED]);

        let web = &january.companies[0].projects[0];
        assert_eq!(web.project.as_str(), "web");
        assert_eq!(web.tasks.len(), 2);
        assert_eq!(web.tasks[0].task_name, "Design");
        assert_eq!(web.tasks[0].actual_minutes, 56);
        assert_eq!(web.tasks[0].entry_count, 2);
        assert_eq!(web.tasks[1].task_name, NO_TASK);
        assert_eq!(web.actual_minutes(), 86);

        assert_eq!(january.actual_minutes(), 86 + 61 + 10);
        assert_eq!(aggregation.months[1].actual_minutes(), 25);
    }

    #[test]
    fn missing_project_goes_to_unassigned_sentinel() {
        let aggregation = aggregate_entries(&sample());
        let unassigned = aggregation.months[0].companies.last().unwrap();
        assert_eq!(unassigned.company, CompanyKey::Unassigned);
        assert_eq!(unassigned.projects[0].project, ProjectKey::Unassigned);
        assert_eq!(unassigned.projects[0].actual_minutes(), 10);
    }

    #[test]
    fn project_without_client_keeps_project_identity() {
        let entries = [entry("1", None, Some("web"), None, 5, (2025, 1, 1))];
        let aggregation = aggregate_entries(&entries);
        let company = &aggregation.months[0].companies[0];
        assert_eq!(company.company, CompanyKey::Unassigned);
        assert_eq!(company.projects[0].project.as_str(), "web");
    }

    #[test]
    fn aggregation_is_order_independent() {
        let entries = sample();
        let expected = aggregate_entries(&entries);

        let mut reversed = entries.clone();
        reversed.reverse();
        assert_eq!(aggregate_entries(&reversed), expected);

        // every rotation
        for shift in 1..entries.len() {
            let mut rotated = entries.clone();
            rotated.rotate_left(shift);
            assert_eq!(aggregate_entries(&rotated), expected);
        }

        let mut swapped = entries;
        swapped.swap(0, 3);
        swapped.swap(1, 5);
        assert_eq!(aggregate_entries(&swapped), expected);
    }

    #[test]
    fn project_under_several_companies_is_one_billing_unit() {
        let entries = [
            entry("1", Some("globex"), Some("web"), Some("Design"), 10, (2025, 1, 2)),
            entry("2", Some("acme"), Some("web"), Some("Design"), 10, (2025, 1, 3)),
            entry("3", None, Some("web"), None, 5, (2025, 1, 4)),
            entry("4", Some("globex"), Some("api"), None, 30, (2025, 1, 5)),
        ];
        let aggregation = aggregate_entries(&entries);
        let january = &aggregation.months[0];

        let companies: Vec<_> = january.companies.iter().map(|c| c.company.as_str()).collect();
        assert_eq!(companies, ["acme", "globex"]);

        let web = &january.companies[0].projects;
        assert_eq!(web.len(), 1);
        assert_eq!(web[0].project.as_str(), "web");
        assert_eq!(web[0].tasks[0].task_name, "Design");
        assert_eq!(web[0].tasks[0].actual_minutes, 20);
        assert_eq!(web[0].tasks[0].entry_count, 2);
        assert_eq!(web[0].actual_minutes(), 25);

        let api = &january.companies[1].projects;
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].project.as_str(), "api");

        let mut reversed = entries.to_vec();
        reversed.reverse();
        assert_eq!(aggregate_entries(&reversed), aggregation);
    }

    #[test]
    fn negative_minutes_are_rejected_not_summed() {
        let entries = [
            entry("ok", Some("acme"), Some("web"), None, 30, (2025, 1, 1)),
            entry("bad", Some("acme"), Some("web"), None, -15, (2025, 1, 1)),
        ];
        let aggregation = aggregate_entries(&entries);
        assert_eq!(aggregation.months[0].actual_minutes(), 30);
        assert_eq!(aggregation.rejected.len(), 1);
        assert_eq!(aggregation.rejected[0].entry_id.as_str(), "bad");

        let err = BillingError::from(aggregation.rejected[0].clone());
        assert_eq!(
            err.to_string(),
            "invalid entry bad: negative duration of -15 minutes"
        );
    }
}
