//! Reconciliation of recomputed billing against persisted figures.
//!
//! Entries parsed from uploaded exports are run through the same rounding,
//! pricing and limit steps as the primary pipeline, one project at a time,
//! and compared with what the store holds for that month. Nothing is
//! mutated; the result is a [`ValidationReport`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{CompanyKey, ProjectKey, ProjectTotals, RejectedEntry, aggregate_entries};
use crate::amount::{Hours, Money};
use crate::billing::{ProjectBilling, bill_project};
use crate::config::BillingConfig;
use crate::entry::CanonicalEntry;
use crate::types::{BillingMonth, ClientId, ProjectId};

/// Company name used when a client id is absent or unknown.
pub const UNKNOWN_COMPANY: &str = "Unknown";

/// Reference data the reconciliation needs from the system of record.
pub trait ReconcileLookup {
    /// Billing config for the reconciled month, if the project is known.
    fn billing_config(&self, project_id: &ProjectId) -> Option<BillingConfig>;

    fn company_name(&self, client_id: &ClientId) -> Option<String>;
}

/// Prefetched lookup tables.
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    pub configs: HashMap<ProjectId, BillingConfig>,
    pub companies: HashMap<ClientId, String>,
}

impl ReconcileLookup for LookupTables {
    fn billing_config(&self, project_id: &ProjectId) -> Option<BillingConfig> {
        self.configs.get(project_id).cloned()
    }

    fn company_name(&self, client_id: &ClientId) -> Option<String> {
        self.companies.get(client_id).cloned()
    }
}

/// Persisted figures for one project, the values being checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedProjectFigures {
    pub project_id: ProjectId,
    pub client_id: Option<ClientId>,
    pub rounded_hours: Hours,
    pub base_revenue: Money,
    pub billed_revenue: Money,
}

impl ExpectedProjectFigures {
    /// Figures as the primary pipeline would persist them. `None` for the
    /// unassigned project, which has no id to store under.
    pub fn from_billing(billing: &ProjectBilling, client_id: Option<ClientId>) -> Option<Self> {
        Some(Self {
            project_id: billing.project.project_id()?.clone(),
            client_id,
            rounded_hours: billing.rounded_hours,
            base_revenue: billing.base_revenue,
            billed_revenue: billing.billed_revenue,
        })
    }

    const fn is_zero(&self) -> bool {
        self.rounded_hours.is_zero() && self.base_revenue.is_zero() && self.billed_revenue.is_zero()
    }
}

/// Tuning for what counts as a discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Largest difference, in hundredths of an hour or cents, still treated
    /// as a match.
    pub tolerance_hundredths: u64,
    /// Treat projects that exist on only one side as matching when all their
    /// hours and revenue are exactly zero.
    pub suppress_zero_value_orphans: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            tolerance_hundredths: 1,
            suppress_zero_value_orphans: true,
        }
    }
}

impl ReconcileOptions {
    /// Whether two values in hundredths are close enough to count as equal.
    pub const fn within_tolerance(&self, expected: i64, actual: i64) -> bool {
        expected.abs_diff(actual) <= self.tolerance_hundredths
    }
}

/// Which side a project was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Both,
    /// In the uploaded exports but not in the persisted results.
    SourceOnly,
    /// In the persisted results but not in the uploaded exports.
    StoredOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckField {
    RoundedHours,
    BaseRevenue,
    BilledRevenue,
}

impl CheckField {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RoundedHours => "rounded_hours",
            Self::BaseRevenue => "base_revenue",
            Self::BilledRevenue => "billed_revenue",
        }
    }
}

/// One expected-vs-computed comparison. Values are hundredths: hours for
/// `rounded_hours`, cents for the revenue fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationCheck {
    pub field: CheckField,
    pub expected: i64,
    pub actual: i64,
    pub difference: u64,
    pub passed: bool,
}

impl ValidationCheck {
    fn new(field: CheckField, expected: i64, actual: i64, options: &ReconcileOptions) -> Self {
        Self {
            field,
            expected,
            actual,
            difference: expected.abs_diff(actual),
            passed: options.within_tolerance(expected, actual),
        }
    }

    /// Formats a value of this check with two decimals.
    pub fn format_value(&self, value: i64) -> String {
        match self.field {
            CheckField::RoundedHours => Hours::from_hundredths(value).to_string(),
            CheckField::BaseRevenue | CheckField::BilledRevenue => {
                Money::from_cents(value).to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pass,
    Fail,
    /// The unassigned bucket: billed, but never persisted, so not checked.
    Skipped,
}

/// Reconciliation outcome for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectValidationResult {
    pub project: ProjectKey,
    pub company_name: String,
    /// False when the config store had no config for the project.
    pub matched_in_system: bool,
    pub presence: Presence,
    /// Recomputed billing; absent for stored-only projects.
    pub computed: Option<ProjectBilling>,
    pub checks: Vec<ValidationCheck>,
    pub status: ValidationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub total_projects: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unmatched_projects: usize,
    /// Sum of recomputed billed revenue over all reconciled projects.
    pub total_billed_revenue: Money,
    pub entries_considered: usize,
    pub entries_outside_month: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub month: BillingMonth,
    /// Sorted by project key.
    pub projects: Vec<ProjectValidationResult>,
    pub rejected: Vec<RejectedEntry>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn has_discrepancies(&self) -> bool {
        self.summary.failed > 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Figures {
    rounded_hours: i64,
    base_revenue: i64,
    billed_revenue: i64,
}

impl Figures {
    const fn from_expected(expected: &ExpectedProjectFigures) -> Self {
        Self {
            rounded_hours: expected.rounded_hours.hundredths(),
            base_revenue: expected.base_revenue.cents(),
            billed_revenue: expected.billed_revenue.cents(),
        }
    }

    const fn from_billing(billing: &ProjectBilling) -> Self {
        Self {
            rounded_hours: billing.rounded_hours.hundredths(),
            base_revenue: billing.base_revenue.cents(),
            billed_revenue: billing.billed_revenue.cents(),
        }
    }

    const fn is_zero(&self) -> bool {
        self.rounded_hours == 0 && self.base_revenue == 0 && self.billed_revenue == 0
    }
}

fn compare(expected: Figures, actual: Figures, options: &ReconcileOptions) -> Vec<ValidationCheck> {
    vec![
        ValidationCheck::new(
            CheckField::RoundedHours,
            expected.rounded_hours,
            actual.rounded_hours,
            options,
        ),
        ValidationCheck::new(
            CheckField::BaseRevenue,
            expected.base_revenue,
            actual.base_revenue,
            options,
        ),
        ValidationCheck::new(
            CheckField::BilledRevenue,
            expected.billed_revenue,
            actual.billed_revenue,
            options,
        ),
    ]
}

fn status(
    presence: Presence,
    checks: &[ValidationCheck],
    zero_valued: bool,
    options: &ReconcileOptions,
) -> ValidationStatus {
    let orphan_is_noise = options.suppress_zero_value_orphans && zero_valued;
    let passed = match presence {
        Presence::Both => checks.iter().all(|c| c.passed),
        Presence::SourceOnly | Presence::StoredOnly => orphan_is_noise,
    };
    if passed {
        ValidationStatus::Pass
    } else {
        ValidationStatus::Fail
    }
}

fn company_name<L: ReconcileLookup + ?Sized>(lookup: &L, client_id: Option<&ClientId>) -> String {
    client_id
        .and_then(|id| lookup.company_name(id))
        .unwrap_or_else(|| UNKNOWN_COMPANY.to_string())
}

type SourceProjects = BTreeMap<ProjectKey, (CompanyKey, ProjectTotals)>;

/// Source projects keyed by project with the company they are billed to.
///
/// Aggregation already bills a project once per month, so keys are unique
/// for entries within one month.
fn source_projects(entries: &[CanonicalEntry]) -> (SourceProjects, Vec<RejectedEntry>) {
    let aggregation = aggregate_entries(entries);
    let projects = aggregation
        .months
        .into_iter()
        .flat_map(|month| month.companies)
        .flat_map(|company| {
            let key = company.company;
            company
                .projects
                .into_iter()
                .map(move |project| (project.project.clone(), (key.clone(), project)))
        })
        .collect();
    (projects, aggregation.rejected)
}

/// Recomputes billing for `month` from `entries` and checks it against
/// `expected`.
pub fn reconcile<L: ReconcileLookup + ?Sized>(
    entries: &[CanonicalEntry],
    month: BillingMonth,
    lookup: &L,
    expected: &[ExpectedProjectFigures],
    options: &ReconcileOptions,
    generated_at: DateTime<Utc>,
) -> ValidationReport {
    let (in_month, outside): (Vec<CanonicalEntry>, Vec<CanonicalEntry>) = entries
        .iter()
        .cloned()
        .partition(|entry| month.contains(entry.date));
    if !outside.is_empty() {
        tracing::debug!(%month, ignored = outside.len(), "ignoring entries outside the month");
    }

    let mut expected_by_project: BTreeMap<&ProjectId, &ExpectedProjectFigures> = BTreeMap::new();
    for figures in expected {
        if expected_by_project.insert(&figures.project_id, figures).is_some() {
            tracing::warn!(project = %figures.project_id, "duplicate stored figures, keeping the last");
        }
    }

    let (source, rejected) = source_projects(&in_month);
    let mut results = Vec::with_capacity(source.len() + expected_by_project.len());

    for (key, (company, totals)) in &source {
        let config = key.project_id().and_then(|id| lookup.billing_config(id));
        let matched_in_system = config.is_some();
        let config = config.unwrap_or_else(BillingConfig::fallback);
        let computed = bill_project(totals, &config, matched_in_system);
        let actual = Figures::from_billing(&computed);

        if *key == ProjectKey::Unassigned {
            results.push(ProjectValidationResult {
                project: key.clone(),
                company_name: UNKNOWN_COMPANY.to_string(),
                matched_in_system,
                presence: Presence::SourceOnly,
                computed: Some(computed),
                checks: Vec::new(),
                status: ValidationStatus::Skipped,
            });
            continue;
        }

        let stored = key.project_id().and_then(|id| expected_by_project.remove(id));
        let presence = if stored.is_some() {
            Presence::Both
        } else {
            Presence::SourceOnly
        };
        let checks = compare(
            stored.map(Figures::from_expected).unwrap_or_default(),
            actual,
            options,
        );
        let status = status(presence, &checks, actual.is_zero(), options);

        let client_id = company
            .client_id()
            .or_else(|| stored.and_then(|s| s.client_id.as_ref()));
        results.push(ProjectValidationResult {
            project: key.clone(),
            company_name: company_name(lookup, client_id),
            matched_in_system,
            presence,
            computed: Some(computed),
            checks,
            status,
        });
    }

    for stored in expected_by_project.into_values() {
        let checks = compare(Figures::from_expected(stored), Figures::default(), options);
        let status = status(Presence::StoredOnly, &checks, stored.is_zero(), options);
        results.push(ProjectValidationResult {
            project: ProjectKey::Project(stored.project_id.clone()),
            company_name: company_name(lookup, stored.client_id.as_ref()),
            matched_in_system: lookup.billing_config(&stored.project_id).is_some(),
            presence: Presence::StoredOnly,
            computed: None,
            checks,
            status,
        });
    }

    results.sort_by(|a, b| a.project.cmp(&b.project));

    let count = |status: ValidationStatus| results.iter().filter(|r| r.status == status).count();
    let summary = ValidationSummary {
        total_projects: results.len(),
        passed: count(ValidationStatus::Pass),
        failed: count(ValidationStatus::Fail),
        skipped: count(ValidationStatus::Skipped),
        unmatched_projects: results
            .iter()
            .filter(|r| !r.matched_in_system && r.status != ValidationStatus::Skipped)
            .count(),
        total_billed_revenue: results
            .iter()
            .filter_map(|r| r.computed.as_ref())
            .map(|c| c.billed_revenue)
            .sum(),
        entries_considered: in_month.len(),
        entries_outside_month: outside.len(),
        generated_at,
    };

    tracing::debug!(
        %month,
        projects = summary.total_projects,
        failed = summary.failed,
        "reconciliation complete"
    );

    ValidationReport {
        month,
        projects: results,
        rejected,
        summary,
    }
}
